mod app;
mod archive;
mod cmd;
mod config;
mod error;
mod model;
mod naming;
mod out;
mod remote;
mod shutdown;
mod store;
mod sync;
mod tg;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tgexport",
    version,
    about = "Resumable Telegram conversation archiver"
)]
pub struct Cli {
    /// Store directory holding session.db and the archive (default: ~/.tgexport)
    #[arg(long, global = true, default_value = "~/.tgexport")]
    pub store: String,

    /// Output mode: text (default), json, or none
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: out::OutputMode,

    #[command(subcommand)]
    pub command: cmd::Command,
}

impl Cli {
    pub fn store_dir(&self) -> String {
        let s = &self.store;
        if s.starts_with("~/") {
            if let Some(home) = dirs_home() {
                return format!("{}{}", home, &s[1..]);
            }
        }
        s.clone()
    }
}

fn dirs_home() -> Option<String> {
    std::env::var("HOME").ok()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let shutdown = shutdown::ShutdownController::new();
    shutdown::set_global(shutdown.clone());

    // The current page finishes and its cursor is committed before exit.
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            log::info!("Received Ctrl+C, stopping after the current page...");
            shutdown_clone.trigger();
        }
    });

    if let Err(e) = cmd::run(cli).await {
        let msg = format!("{e:#}");
        eprintln!("Error: {msg}");
        std::process::exit(1);
    }
}
