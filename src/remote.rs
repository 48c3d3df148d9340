use crate::error::RemoteError;
use crate::model::{AdminLogPage, Entity, EntityRef, FileLocator, FullEntity, HistoryPage, PeerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The Telegram requests the archiver needs, over an authorized session.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Resolve a chat id, marked peer id or `@username` to its entity.
    async fn resolve(&self, query: &str) -> RemoteResult<Entity>;

    /// One page of history strictly older than `offset_id`, newest first.
    async fn get_history(
        &self,
        target: &EntityRef,
        offset_id: i32,
        offset_date: Option<DateTime<Utc>>,
        limit: i32,
    ) -> RemoteResult<HistoryPage>;

    async fn get_full_entity(&self, entity: &Entity) -> RemoteResult<FullEntity>;

    /// Ids of every current member of a chat or channel. Telegram caps the
    /// member list of very large channels, so those may come back partial.
    async fn get_participants(&self, target: &EntityRef) -> RemoteResult<Vec<PeerId>>;

    /// Admin log events strictly older than `max_id` (0 for the newest).
    async fn get_admin_log(
        &self,
        target: &EntityRef,
        max_id: i64,
        query: &str,
        limit: i32,
    ) -> RemoteResult<AdminLogPage>;

    /// Download a blob to `dest`, returning the number of bytes written.
    async fn download(&self, locator: &FileLocator, dest: &Path) -> RemoteResult<u64>;
}
