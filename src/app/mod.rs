use crate::store::Store;
use crate::tg::TgClient;
use crate::Cli;
use anyhow::Result;

pub struct App {
    pub tg: TgClient,
    pub store: Store,
}

impl App {
    /// Connect with the session in the store directory and open the archive.
    pub async fn new(cli: &Cli) -> Result<Self> {
        let store_dir = cli.store_dir();
        std::fs::create_dir_all(&store_dir)?;

        let session_path = format!("{}/session.db", store_dir);
        let tg = TgClient::connect(&session_path)?;
        tg.ensure_authorized().await?;

        let store = Self::open_store(&store_dir).await?;

        Ok(App {
            tg,
            store,
        })
    }

    /// Open only the archive, for commands that never touch the network.
    pub async fn open_store(store_dir: &str) -> Result<Store> {
        Store::open(store_dir).await
    }
}
