//! Walk a channel's admin log from the newest event backwards.
//!
//! The admin log is short-lived on the server side and has no stable paging
//! anchor, so every run walks it from the top and relies on idempotent
//! upserts instead of a resume cursor.

use crate::archive::{AdminEventRecord, Archive, MediaRecord};
use crate::config::SyncConfig;
use crate::model::{AdminLogAction, AdminLogEvent, Entity, Media, MediaKind, Message, PeerId, Photo};
use crate::remote::Remote;
use crate::sync::entities::EntityQueue;
use crate::sync::media::{classify, MediaCapture, PhotoSource};
use crate::sync::rate::RateScheduler;
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
pub struct AdminLogReport {
    pub context_id: PeerId,
    pub name: String,
    pub pages: u32,
    pub events_written: u64,
    pub entities_dumped: usize,
    pub media_downloaded: u64,
    pub media_failed: u64,
}

pub struct AdminLogSync<'a, R: ?Sized, A: ?Sized> {
    remote: &'a R,
    archive: &'a mut A,
    media: &'a mut MediaCapture,
    config: SyncConfig,
    scheduler: RateScheduler,
    queue: EntityQueue,
    cancel: CancellationToken,
}

impl<'a, R, A> AdminLogSync<'a, R, A>
where
    R: Remote + ?Sized,
    A: Archive + ?Sized,
{
    pub fn new(
        remote: &'a R,
        archive: &'a mut A,
        media: &'a mut MediaCapture,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            archive,
            media,
            config,
            scheduler: RateScheduler::new(config.interval),
            queue: EntityQueue::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(&mut self, target: &str) -> Result<AdminLogReport> {
        // Entities are re-resolved on every run.
        self.queue = EntityQueue::new();
        let media_before = self.media.stats();
        let scheduler = self.scheduler;

        let target = scheduler
            .gate(self.remote.resolve(target))
            .await
            .with_context(|| format!("Failed to resolve {}", target))?;
        if !matches!(target, Entity::Channel(_)) {
            anyhow::bail!(
                "{} ({}) is not a channel; only channels have an admin log",
                target.display_name(),
                target.peer_id()
            );
        }
        let context_id = target.peer_id();
        let name = target.display_name();
        log::info!("Starting admin log dump for {} ({})", name, context_id);

        self.queue
            .offer([&target], self.remote, &mut *self.archive, &mut *self.media)
            .await?;

        let mut max_id: i64 = 0;
        let mut pages: u32 = 0;
        let mut written: u64 = 0;
        loop {
            let (rows, min_id) = scheduler.gate(self.sync_page(&target, max_id)).await?;
            self.archive.commit().await?;
            pages += 1;
            written += rows as u64;

            let Some(min_id) = min_id else {
                log::debug!("Received no more admin log events, done.");
                break;
            };
            max_id = min_id;
            log::info!("{}: {} admin log events", name, written);

            if self.config.max_chunks > 0 && pages >= self.config.max_chunks {
                log::debug!("Reached maximum amount of chunks, done.");
                break;
            }
            if self.cancel.is_cancelled() {
                log::info!("Stopping admin log of {} (shutdown requested)", name);
                break;
            }
        }

        log::info!(
            "Done. Retrieving full information about {} missing entities.",
            self.queue.size()
        );
        while !self.queue.is_empty() && !self.cancel.is_cancelled() {
            let start = Instant::now();
            let needed = self
                .queue
                .pop_one(self.remote, &mut *self.archive, &mut *self.media)
                .await?
                .unwrap_or_default();
            self.archive.commit().await?;
            scheduler.pace(start, needed).await;
        }
        self.archive.commit().await?;

        let media_after = self.media.stats();
        Ok(AdminLogReport {
            context_id,
            name,
            pages,
            events_written: written,
            entities_dumped: self.queue.dumped_count(),
            media_downloaded: media_after.downloaded - media_before.downloaded,
            media_failed: media_after.failed - media_before.failed,
        })
    }

    /// Returns the number of events and the lowest event id on the page.
    async fn sync_page(&mut self, target: &Entity, max_id: i64) -> Result<(usize, Option<i64>)> {
        let page = self
            .remote
            .get_admin_log(&target.to_ref(), max_id, "", self.config.chunk_size)
            .await
            .with_context(|| format!("Failed to fetch admin log of {}", target.peer_id()))?;

        self.queue
            .offer(
                page.users.iter().chain(page.chats.iter()),
                self.remote,
                &mut *self.archive,
                &mut *self.media,
            )
            .await?;
        self.queue
            .pop_one(self.remote, &mut *self.archive, &mut *self.media)
            .await?;

        for event in &page.events {
            self.persist_event(target, event).await?;
        }
        Ok((page.events.len(), page.events.iter().map(|e| e.id).min()))
    }

    async fn persist_event(&mut self, context: &Entity, event: &AdminLogEvent) -> Result<()> {
        let (media_id1, media_id2) = match &event.action {
            AdminLogAction::ChangePhoto { prev, new } => (
                self.persist_photo(context, new.as_ref(), Some(event.id)).await?,
                self.persist_photo(context, prev.as_ref(), None).await?,
            ),
            AdminLogAction::EditMessage { prev, new } => (
                self.persist_message_media(new.as_ref()).await?,
                self.persist_message_media(prev.as_ref()).await?,
            ),
            _ => (None, None),
        };
        self.archive
            .upsert_admin_event(&AdminEventRecord::new(
                context.peer_id(),
                event,
                media_id1,
                media_id2,
            ))
            .await
    }

    /// The new photo is named after the event, the previous one after its own id.
    async fn persist_photo(
        &mut self,
        owner: &Entity,
        photo: Option<&Photo>,
        known_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let Some(photo) = photo else {
            return Ok(None);
        };
        let outcome = self
            .media
            .capture_photo(self.remote, PhotoSource::Full(photo), owner, known_id)
            .await?;
        let media = Media::Photo(photo.clone());
        match MediaRecord::from_media(&media, MediaKind::ChatPhoto, outcome.local_path()) {
            Some(record) => Ok(Some(self.archive.upsert_media(&record).await?)),
            None => Ok(None),
        }
    }

    /// Metadata only; edited message blobs are not downloaded.
    async fn persist_message_media(&mut self, msg: Option<&Message>) -> Result<Option<i64>> {
        let Some(media) = msg.and_then(|m| m.media.as_ref()) else {
            return Ok(None);
        };
        match MediaRecord::from_media(media, classify(media), None) {
            Some(record) => Ok(Some(self.archive.upsert_media(&record).await?)),
            None => Ok(None),
        }
    }
}
