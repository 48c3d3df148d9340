use crate::app::App;
use crate::cmd::MediaArgs;
use crate::config::MAX_CHUNK_SIZE;
use crate::shutdown;
use crate::sync::HistorySync;
use crate::Cli;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Conversations to archive: numeric id, @username or t.me link
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Messages per history page (1-100)
    #[arg(long, default_value_t = MAX_CHUNK_SIZE)]
    pub chunk_size: i32,

    /// Pages per target in this run, 0 for no limit
    #[arg(long, default_value_t = 0)]
    pub max_chunks: u32,

    #[command(flatten)]
    pub media: MediaArgs,
}

pub async fn run(cli: &Cli, args: &SyncArgs) -> Result<()> {
    let config = args.media.config(args.chunk_size, args.max_chunks)?;
    let mut capture = args.media.capture(cli)?;

    let mut app = App::new(cli).await?;
    let remote = app.tg.remote();
    let shutdown = shutdown::global();

    let mut reports = Vec::with_capacity(args.targets.len());
    for target in &args.targets {
        if shutdown.is_triggered() {
            break;
        }
        let report = HistorySync::new(&remote, &mut app.store, &mut capture, config)
            .with_cancel(shutdown.child_token())
            .run(target)
            .await?;
        log::info!(
            "{}: {} of {} messages archived",
            report.name,
            report.messages_written,
            report.messages_total
        );
        reports.push(report);
    }

    match reports.as_slice() {
        [one] => cli.output.emit(one),
        all => cli.output.emit(&all),
    }
}
