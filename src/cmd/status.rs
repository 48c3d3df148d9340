use crate::app::App;
use crate::model::PeerId;
use crate::Cli;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Only show this conversation (marked peer id)
    #[arg(long, allow_hyphen_values = true)]
    pub chat: Option<i64>,
}

pub async fn run(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let store = App::open_store(&cli.store_dir()).await?;
    let rows = store.status(args.chat.map(PeerId::from_marked)).await?;

    if rows.is_empty() && !cli.output.is_json() {
        if let Some(chat) = args.chat {
            anyhow::bail!("Nothing archived for {}", chat);
        }
        eprintln!("Nothing archived yet.");
        return Ok(());
    }
    cli.output.emit(&rows)
}
