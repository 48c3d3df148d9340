pub mod convert;
pub mod remote;

use crate::error::TgErrorContext;
use anyhow::Result;
use grammers_client::{Client, ClientConfiguration};
use grammers_mtsender::SenderPool;
use grammers_session::storages::SqliteSession;
use std::sync::Arc;

pub use remote::TgRemote;

pub const API_ID: i32 = 32529142;

/// A connected Telegram client with its pool runner handle.
pub struct TgClient {
    pub client: Client,
    pool_handle: tokio::task::JoinHandle<()>,
}

impl TgClient {
    /// Connect using an existing SQLite session file. Updates are not needed
    /// for archiving, so the updates channel is dropped.
    pub fn connect(session_path: &str) -> Result<Self> {
        let session = Arc::new(
            SqliteSession::open(session_path)
                .map_err(|e| anyhow::anyhow!("Failed to open session {}: {}", session_path, e))?,
        );

        let pool = SenderPool::new(Arc::clone(&session) as Arc<SqliteSession>, API_ID);
        let client = Client::with_configuration(&pool, client_configuration());

        let SenderPool {
            runner, updates: _, ..
        } = pool;

        let pool_handle = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(TgClient {
            client,
            pool_handle,
        })
    }

    pub async fn ensure_authorized(&self) -> Result<()> {
        if !self.client.is_authorized().await.context_auth_check()? {
            anyhow::bail!(
                "Session is not authorized. Place an authorized grammers session.db in the store directory."
            );
        }
        Ok(())
    }

    pub fn remote(&self) -> TgRemote {
        TgRemote::new(self.client.clone())
    }
}

/// Flood waits are never slept on inside grammers; they surface as
/// `RemoteError::RateLimited` and end the run with the cursor committed.
fn client_configuration() -> ClientConfiguration {
    ClientConfiguration {
        flood_sleep_threshold: 0,
    }
}

impl Drop for TgClient {
    fn drop(&mut self) {
        self.client.disconnect();
        self.pool_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_waits_are_not_slept_on() {
        assert_eq!(client_configuration().flood_sleep_threshold, 0);
    }
}
