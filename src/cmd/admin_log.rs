use crate::app::App;
use crate::cmd::MediaArgs;
use crate::config::MAX_CHUNK_SIZE;
use crate::shutdown;
use crate::sync::AdminLogSync;
use crate::Cli;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct AdminLogArgs {
    /// Channel or supergroup: numeric id, @username or t.me link
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Pages in this run, 0 for no limit
    #[arg(long, default_value_t = 0)]
    pub max_chunks: u32,

    #[command(flatten)]
    pub media: MediaArgs,
}

pub async fn run(cli: &Cli, args: &AdminLogArgs) -> Result<()> {
    let config = args.media.config(MAX_CHUNK_SIZE, args.max_chunks)?;
    let mut capture = args.media.capture(cli)?;

    let mut app = App::new(cli).await?;
    let remote = app.tg.remote();

    let report = AdminLogSync::new(&remote, &mut app.store, &mut capture, config)
        .with_cancel(shutdown::global().child_token())
        .run(&args.target)
        .await?;

    cli.output.emit(&report)
}
