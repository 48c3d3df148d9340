pub mod admin_log;
pub mod status;
pub mod sync;

use crate::config::{self, SyncConfig};
use crate::naming::{TemplateNaming, DEFAULT_TEMPLATE};
use crate::sync::media::MediaCapture;
use crate::sync::rate::RateScheduler;
use crate::Cli;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Archive the message history of one or more conversations
    Sync(sync::SyncArgs),
    /// Archive the admin log of a channel
    AdminLog(admin_log::AdminLogArgs),
    /// Show what has been archived so far
    Status(status::StatusArgs),
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Sync(args) => sync::run(&cli, args).await,
        Command::AdminLog(args) => admin_log::run(&cli, args).await,
        Command::Status(args) => status::run(&cli, args).await,
    }
}

/// Media and pacing flags shared by the archiving commands.
#[derive(Args, Debug, Clone)]
pub struct MediaArgs {
    /// Comma-separated media kinds to download (default: every kind except chatphoto)
    #[arg(long, value_name = "TYPES")]
    pub media_types: Option<String>,

    /// Largest blob to download in bytes, 0 disables downloads
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_size: u64,

    /// Root directory for downloaded media (default: the store directory)
    #[arg(long, value_name = "DIR")]
    pub media_dir: Option<String>,

    /// Relative path template for media files
    #[arg(long, default_value = DEFAULT_TEMPLATE)]
    pub media_template: String,

    /// Minimum milliseconds between remote calls
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,
}

impl MediaArgs {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn config(&self, chunk_size: i32, max_chunks: u32) -> Result<SyncConfig> {
        SyncConfig::new(chunk_size, max_chunks, self.interval())
    }

    pub fn capture(&self, cli: &Cli) -> Result<MediaCapture> {
        let filter = config::media_filter(self.media_types.as_deref(), self.max_size)?;
        let root = self.media_dir.clone().unwrap_or_else(|| cli.store_dir());
        let naming = TemplateNaming::new(root, self.media_template.clone());
        Ok(MediaCapture::new(
            Box::new(naming),
            filter,
            RateScheduler::new(self.interval()),
        ))
    }
}
