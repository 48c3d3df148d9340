//! Resumable archiving of one conversation's message history.
//!
//! Pages are walked newest to oldest. After every page the resume cursor is
//! saved and committed, so an interrupted run re-processes at most one page.
//! A run that reaches the end of history (or the messages a previous run
//! already archived) records the newest archived id as `stop_at`; the next
//! run starts from the top again and stops once it reaches that id.

use crate::archive::{Archive, MediaRecord, MessageRecord, ParticipantDelta};
use crate::config::SyncConfig;
use crate::model::{
    Entity, HistoryItem, Media, MediaKind, Message, PeerId, PeerKind, ResumeCursor,
    ServiceAction, ServiceMessage,
};
use crate::remote::Remote;
use crate::sync::entities::EntityQueue;
use crate::sync::media::{classify, CaptureOutcome, MediaCapture, PhotoSource};
use crate::sync::rate::RateScheduler;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Init,
    Paging,
    DrainingEntities,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub context_id: PeerId,
    pub name: String,
    pub pages: u32,
    /// Message rows written by this run.
    pub messages_written: u64,
    /// Message rows archived for this conversation after the run.
    pub messages_total: u64,
    pub entities_seen: usize,
    pub entities_dumped: usize,
    pub media_downloaded: u64,
    pub media_already_present: u64,
    pub media_failed: u64,
    pub participants_added: usize,
    pub participants_removed: usize,
    pub cursor: ResumeCursor,
    /// The run reached the end of history or previously archived messages.
    pub exhausted: bool,
}

/// Outcome of a single page.
struct PageOutcome {
    rows: usize,
    written: u64,
    min_id: Option<i32>,
    min_date: Option<DateTime<Utc>>,
    total: Option<i32>,
}

pub struct HistorySync<'a, R: ?Sized, A: ?Sized> {
    remote: &'a R,
    archive: &'a mut A,
    media: &'a mut MediaCapture,
    config: SyncConfig,
    scheduler: RateScheduler,
    queue: EntityQueue,
    phase: SyncPhase,
    cancel: CancellationToken,
}

impl<'a, R, A> HistorySync<'a, R, A>
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
            phase: SyncPhase::Init,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop paging (keeping the cursor) once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub async fn run(&mut self, target: &str) -> Result<SyncReport> {
        self.phase = SyncPhase::Init;
        // Entities are re-resolved on every run.
        self.queue = EntityQueue::new();
        let media_before = self.media.stats();
        let scheduler = self.scheduler;

        let target = scheduler
            .gate(self.remote.resolve(target))
            .await
            .with_context(|| format!("Failed to resolve {}", target))?;
        let context_id = target.peer_id();
        let name = target.display_name();

        let mut cursor = self.archive.resume_cursor(context_id).await?;
        let mut found = self.archive.message_count(context_id).await?;
        log::info!(
            "Archiving {} ({}), {} messages already stored",
            name,
            context_id,
            found
        );

        // The conversation itself is always refreshed.
        self.queue
            .offer([&target], self.remote, &mut *self.archive, &mut *self.media)
            .await?;

        let mut delta = ParticipantDelta::default();
        if matches!(target.kind(), PeerKind::Chat | PeerKind::Channel) {
            if let Some(d) = self.sync_participants(&target).await? {
                delta = d;
            }
        }

        self.phase = SyncPhase::Paging;
        let stop_at = cursor.stop_at;
        if cursor.offset_id != 0 {
            log::info!(
                "Resuming at {} ({})",
                cursor
                    .offset_date
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                cursor.offset_id
            );
        }

        let mut pages: u32 = 0;
        let mut written: u64 = 0;
        let mut exhausted = false;
        loop {
            let page = scheduler
                .gate(self.sync_page(&target, &cursor, stop_at))
                .await?;
            pages += 1;
            written += page.written;
            if let Some(min_id) = page.min_id {
                cursor.offset_id = min_id;
            }
            if let Some(min_date) = page.min_date {
                cursor.offset_date = Some(min_date);
            }

            let reached_end = page.rows < self.config.chunk_size as usize;
            if reached_end || (stop_at > 0 && cursor.offset_id <= stop_at) {
                if reached_end {
                    log::debug!("Received less messages than limit, done.");
                } else {
                    log::debug!("Reached already archived messages, done.");
                }
                let newest = self.archive.max_message_id(context_id).await?.unwrap_or(0);
                cursor = ResumeCursor {
                    offset_id: 0,
                    offset_date: None,
                    stop_at: newest.max(stop_at),
                };
                self.archive.save_resume_cursor(context_id, &cursor).await?;
                self.archive.commit().await?;
                exhausted = true;
                break;
            }

            self.archive.save_resume_cursor(context_id, &cursor).await?;
            self.archive.commit().await?;

            found = self.archive.message_count(context_id).await?;
            match page.total {
                Some(total) => log::info!("{}: {}/{} messages", name, found, total),
                None => log::info!("{}: {} messages", name, found),
            }

            if self.config.max_chunks > 0 && pages >= self.config.max_chunks {
                log::debug!("Reached maximum amount of chunks, done.");
                break;
            }
            if self.cancel.is_cancelled() {
                log::info!("Stopping {} after page {} (shutdown requested)", name, pages);
                break;
            }
        }

        self.drain_entities().await?;

        self.phase = SyncPhase::Done;
        self.archive.commit().await?;

        let media_after = self.media.stats();
        Ok(SyncReport {
            context_id,
            name,
            pages,
            messages_written: written,
            messages_total: self.archive.message_count(context_id).await?,
            entities_seen: self.queue.total_seen(),
            entities_dumped: self.queue.dumped_count(),
            media_downloaded: media_after.downloaded - media_before.downloaded,
            media_already_present: media_after.already_present - media_before.already_present,
            media_failed: media_after.failed - media_before.failed,
            participants_added: delta.added.len(),
            participants_removed: delta.removed.len(),
            cursor,
            exhausted,
        })
    }

    async fn sync_participants(&mut self, target: &Entity) -> Result<Option<ParticipantDelta>> {
        log::info!("Getting participants...");
        let result = self
            .scheduler
            .gate(self.remote.get_participants(&target.to_ref()))
            .await;
        match result {
            Ok(ids) => {
                let delta = self
                    .archive
                    .participant_delta(target.peer_id(), &ids)
                    .await?;
                log::info!(
                    "Saved {} new members, {} left the chat.",
                    delta.added.len(),
                    delta.removed.len()
                );
                Ok(Some(delta))
            }
            Err(e) if e.is_permission_denied() => {
                log::info!("Getting participants aborted (not admin).");
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to fetch participants of {}", target.peer_id())
            }),
        }
    }

    async fn sync_page(
        &mut self,
        target: &Entity,
        cursor: &ResumeCursor,
        stop_at: i32,
    ) -> Result<PageOutcome> {
        let context_id = target.peer_id();
        let page = self
            .remote
            .get_history(
                &target.to_ref(),
                cursor.offset_id,
                cursor.offset_date,
                self.config.chunk_size,
            )
            .await
            .with_context(|| format!("Failed to fetch history of {}", context_id))?;
        log::debug!(
            "Fetched {} rows of {} below {}",
            page.messages.len(),
            context_id,
            cursor.offset_id
        );

        let entities: HashMap<PeerId, &Entity> = page
            .users
            .iter()
            .chain(page.chats.iter())
            .map(|e| (e.peer_id(), e))
            .collect();
        self.queue
            .offer(
                page.users.iter().chain(page.chats.iter()),
                self.remote,
                &mut *self.archive,
                &mut *self.media,
            )
            .await?;
        // History and full-info requests share one flood budget, so a single
        // entity per page rides on the page's own interval.
        self.queue
            .pop_one(self.remote, &mut *self.archive, &mut *self.media)
            .await?;

        let mut written = 0;
        for item in &page.messages {
            if item.id() <= stop_at {
                continue;
            }
            match item {
                HistoryItem::Content(msg) => {
                    let sender = msg.sender.and_then(|id| entities.get(&id).copied());
                    self.persist_message(target, msg, sender).await?;
                    written += 1;
                }
                HistoryItem::Service(msg) => {
                    self.persist_service(target, msg).await?;
                    written += 1;
                }
                HistoryItem::Unrecognized { id } => {
                    log::warn!("Skipping unrecognized message {} in {}", id, context_id);
                }
            }
        }

        Ok(PageOutcome {
            rows: page.messages.len(),
            written,
            min_id: page.messages.iter().map(HistoryItem::id).min(),
            min_date: page.messages.iter().filter_map(HistoryItem::date).min(),
            total: page.count,
        })
    }

    async fn persist_message(
        &mut self,
        context: &Entity,
        msg: &Message,
        sender: Option<&Entity>,
    ) -> Result<()> {
        let context_id = context.peer_id();
        let outcome = self
            .media
            .capture_message_media(self.remote, msg, context, sender)
            .await?;
        if let CaptureOutcome::Failed(reason) = &outcome {
            log::warn!(
                "Archiving message {} without its media: {}",
                msg.id,
                reason
            );
        }

        let forward_id = match &msg.forward {
            Some(header) => Some(
                self.archive
                    .upsert_forward(context_id, msg.id, header)
                    .await?,
            ),
            None => None,
        };
        let media_id = match &msg.media {
            Some(media) => self.persist_media(media, classify(media), outcome.local_path()).await?,
            None => None,
        };
        self.archive
            .upsert_message(&MessageRecord::content(context_id, msg, forward_id, media_id))
            .await
    }

    async fn persist_service(&mut self, context: &Entity, msg: &ServiceMessage) -> Result<()> {
        let media_id = match &msg.action {
            ServiceAction::ChatEditPhoto(photo) => {
                let outcome = self
                    .media
                    .capture_photo(self.remote, PhotoSource::Full(photo), context, Some(msg.id as i64))
                    .await?;
                self.persist_media(
                    &Media::Photo(photo.clone()),
                    MediaKind::ChatPhoto,
                    outcome.local_path(),
                )
                .await?
            }
            _ => None,
        };
        self.archive
            .upsert_message(&MessageRecord::service(context.peer_id(), msg, media_id))
            .await
    }

    async fn persist_media(
        &mut self,
        media: &Media,
        kind: MediaKind,
        local_path: Option<String>,
    ) -> Result<Option<i64>> {
        match MediaRecord::from_media(media, kind, local_path) {
            Some(record) => Ok(Some(self.archive.upsert_media(&record).await?)),
            None => Ok(None),
        }
    }

    async fn drain_entities(&mut self) -> Result<()> {
        self.phase = SyncPhase::DrainingEntities;
        log::info!(
            "Done. Retrieving full information about {} missing entities.",
            self.queue.size()
        );
        let scheduler = self.scheduler;
        while !self.queue.is_empty() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "Leaving {} entities unresolved (shutdown requested)",
                    self.queue.size()
                );
                break;
            }
            let start = Instant::now();
            let needed = self
                .queue
                .pop_one(self.remote, &mut *self.archive, &mut *self.media)
                .await?
                .unwrap_or_default();
            self.archive.commit().await?;
            scheduler.pace(start, needed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::model::{ForwardHeader, PeerKind};
    use crate::sync::testing::{
        base_date, basic_chat, channel, downloading_capture, media_capture, message, photo,
        FakeRemote, MemoryArchive,
    };
    use std::time::Duration;

    fn config(max_chunks: u32) -> SyncConfig {
        SyncConfig::new(100, max_chunks, Duration::from_secs(1)).unwrap()
    }

    async fn run_once(
        remote: &FakeRemote,
        archive: &mut MemoryArchive,
        max_chunks: u32,
    ) -> Result<SyncReport> {
        let mut media = media_capture();
        HistorySync::new(remote, archive, &mut media, config(max_chunks))
            .run("news")
            .await
    }

    fn ctx() -> Entity {
        channel(1, "News")
    }

    #[tokio::test(start_paused = true)]
    async fn archives_full_history_in_three_pages() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(remote.history_offsets(), vec![0, 151, 51]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.messages_total, 250);
        assert_eq!(report.messages_written, 250);
        assert!(report.exhausted);
        assert_eq!(report.cursor.stop_at, 250);
        assert_eq!(archive.cursors[&ctx().peer_id()].stop_at, 250);
        assert_eq!(archive.message_ids(ctx().peer_id()), (1..=250).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_after_interruption_without_refetching() {
        let remote = FakeRemote::new(ctx(), 250);
        remote.fail_history_after(1, || RemoteError::Other(anyhow::anyhow!("connection reset")));
        let mut archive = MemoryArchive::default();

        assert!(run_once(&remote, &mut archive, 0).await.is_err());
        assert_eq!(archive.message_ids(ctx().peer_id()).len(), 100);
        let saved = archive.cursors[&ctx().peer_id()];
        assert_eq!(saved.offset_id, 151);
        assert_eq!(saved.stop_at, 0);

        remote.heal_history();
        remote.clear_calls();
        archive.message_writes.clear();
        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(remote.history_offsets()[0], 151);
        assert!(archive.message_writes.iter().all(|id| *id <= 150));
        assert_eq!(report.messages_total, 250);
        assert_eq!(report.cursor.stop_at, 250);
        assert_eq!(archive.message_ids(ctx().peer_id()), (1..=250).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_idempotent() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();
        run_once(&remote, &mut archive, 0).await.unwrap();
        let first: Vec<_> = archive.messages.values().cloned().collect();

        remote.clear_calls();
        archive.message_writes.clear();
        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(remote.history_offsets(), vec![0]);
        assert!(archive.message_writes.is_empty());
        assert_eq!(report.messages_total, 250);
        let second: Vec<_> = archive.messages.values().cloned().collect();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_one_page_after_reaching_previous_stop_at() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();
        run_once(&remote, &mut archive, 0).await.unwrap();

        // The newest page of the next run ends exactly at stop_at + 1.
        remote.grow_to(350);
        remote.clear_calls();
        archive.message_writes.clear();
        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(remote.history_offsets(), vec![0, 251]);
        assert!(archive.message_writes.iter().all(|id| *id > 250));
        assert_eq!(archive.message_writes.len(), 100);
        assert_eq!(report.cursor.stop_at, 350);
        assert_eq!(report.messages_total, 350);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_is_monotonic_within_a_run() {
        let remote = FakeRemote::new(ctx(), 420);
        let mut archive = MemoryArchive::default();

        run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(archive.cursor_log.len(), 5);
        for pair in archive.cursor_log.windows(2) {
            assert!(pair[1].offset_id <= pair[0].offset_id);
            assert!(pair[1].stop_at >= pair[0].stop_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn page_budget_keeps_stop_at() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 1).await.unwrap();

        assert_eq!(report.pages, 1);
        assert!(!report.exhausted);
        assert_eq!(
            report.cursor,
            ResumeCursor {
                offset_id: 151,
                offset_date: Some(base_date() + chrono::Duration::minutes(151)),
                stop_at: 0,
            }
        );
        assert_eq!(archive.cursors[&ctx().peer_id()], report.cursor);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_after_committed_page() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();
        let mut media = media_capture();
        let token = CancellationToken::new();
        token.cancel();

        let report = HistorySync::new(&remote, &mut archive, &mut media, config(0))
            .with_cancel(token)
            .run("news")
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(archive.cursors[&ctx().peer_id()].offset_id, 151);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_download_still_archives_message() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new(ctx(), 3);
        remote.set_media(2, Media::Photo(photo(900)));
        remote.fail_downloads_with(|| RemoteError::Other(anyhow::anyhow!("FILE_REFERENCE_EXPIRED")));
        let mut archive = MemoryArchive::default();
        let mut media = downloading_capture(dir.path());

        let report = HistorySync::new(&remote, &mut archive, &mut media, config(0))
            .run("news")
            .await
            .unwrap();

        assert_eq!(report.media_failed, 1);
        let rows: Vec<_> = archive.messages.values().filter(|m| m.id == 2).collect();
        assert_eq!(rows.len(), 1);
        let media_id = rows[0].media_id.expect("media linked");
        let media_row = archive.media_row(media_id).unwrap();
        assert_eq!(media_row.remote_id, 900);
        assert_eq!(media_row.kind, MediaKind::Photo);
        assert_eq!(media_row.local_path, None);
    }

    #[tokio::test(start_paused = true)]
    async fn downloaded_media_is_linked_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new(ctx(), 3);
        remote.set_media(3, Media::Photo(photo(901)));
        let mut archive = MemoryArchive::default();
        let mut media = downloading_capture(dir.path());

        let report = HistorySync::new(&remote, &mut archive, &mut media, config(0))
            .run("news")
            .await
            .unwrap();

        assert_eq!(report.media_downloaded, 1);
        let row = &archive.messages[&(ctx().peer_id(), 3)];
        let media_row = archive.media_row(row.media_id.unwrap()).unwrap();
        let expected = dir.path().join("photo/3.jpg");
        assert_eq!(media_row.local_path.as_deref(), Some(expected.to_str().unwrap()));
        assert!(expected.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn service_and_unrecognized_rows() {
        let items = vec![
            HistoryItem::Content(message(1, 100)),
            HistoryItem::Service(ServiceMessage {
                id: 2,
                date: base_date(),
                sender: Some(PeerId::user(100)),
                action: ServiceAction::ChatEditPhoto(photo(77)),
            }),
            HistoryItem::Unrecognized { id: 3 },
        ];
        let remote = FakeRemote::with_items(basic_chat(5, "Family"), items);
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        let context = PeerId::new(PeerKind::Chat, 5);
        assert_eq!(archive.message_ids(context), vec![1, 2]);
        let service = &archive.messages[&(context, 2)];
        assert_eq!(service.service_action.as_deref(), Some("chat.editphoto"));
        let media_row = archive.media_row(service.media_id.unwrap()).unwrap();
        assert_eq!(media_row.kind, MediaKind::ChatPhoto);
        assert_eq!(report.messages_written, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_are_linked() {
        let remote = FakeRemote::new(ctx(), 2);
        remote.set_forward(
            2,
            ForwardHeader {
                from_id: Some(PeerId::channel(8)),
                from_name: None,
                date: base_date(),
                channel_post: Some(4),
                post_author: None,
            },
        );
        let mut archive = MemoryArchive::default();

        run_once(&remote, &mut archive, 0).await.unwrap();

        assert!(archive.messages[&(ctx().peer_id(), 2)].forward_id.is_some());
        assert!(archive.messages[&(ctx().peer_id(), 1)].forward_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_every_discovered_entity() {
        let remote = FakeRemote::new(ctx(), 250);
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        // The context channel plus the three senders.
        assert_eq!(report.entities_seen, 4);
        assert_eq!(report.entities_dumped, 4);
        for id in [PeerId::user(100), PeerId::user(101), PeerId::user(102), ctx().peer_id()] {
            assert!(archive.entities.contains_key(&id), "{} not archived", id);
        }
        assert_eq!(
            archive.entities[&ctx().peer_id()].about.as_deref(),
            Some("channel about")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn participants_delta_is_stored() {
        let remote = FakeRemote::new(ctx(), 1);
        remote.set_participants(vec![PeerId::user(100), PeerId::user(101)]);
        let mut archive = MemoryArchive::default();
        run_once(&remote, &mut archive, 0).await.unwrap();

        remote.set_participants(vec![PeerId::user(101), PeerId::user(102)]);
        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(report.participants_added, 1);
        assert_eq!(report.participants_removed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn participants_permission_error_is_skipped() {
        let remote = FakeRemote::new(ctx(), 10);
        remote.fail_participants_with(|| RemoteError::PermissionDenied("CHAT_ADMIN_REQUIRED".into()));
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(report.messages_total, 10);
        assert!(archive.participants.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_aborts_and_keeps_last_cursor() {
        let remote = FakeRemote::new(ctx(), 250);
        remote.fail_history_after(2, || RemoteError::RateLimited { seconds: 60 });
        let mut archive = MemoryArchive::default();

        let err = run_once(&remote, &mut archive, 0).await.unwrap_err();

        assert!(err.downcast_ref::<RemoteError>().unwrap().is_rate_limited());
        assert_eq!(archive.cursors[&ctx().peer_id()].offset_id, 51);
        assert_eq!(archive.message_ids(ctx().peer_id()).len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_reflects_where_the_run_stopped() {
        let remote = FakeRemote::new(ctx(), 150);
        remote.fail_history_after(1, || RemoteError::RateLimited { seconds: 5 });
        let mut archive = MemoryArchive::default();
        let mut media = media_capture();

        let mut sync = HistorySync::new(&remote, &mut archive, &mut media, config(0));
        assert_eq!(sync.phase(), SyncPhase::Init);
        sync.run("news").await.unwrap_err();
        assert_eq!(sync.phase(), SyncPhase::Paging);

        remote.heal_history();
        sync.run("news").await.unwrap();
        assert_eq!(sync.phase(), SyncPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn each_run_resolves_entities_afresh() {
        let remote = FakeRemote::new(ctx(), 3);
        let mut archive = MemoryArchive::default();
        let mut media = media_capture();

        let mut sync = HistorySync::new(&remote, &mut archive, &mut media, config(0));
        let first = sync.run("news").await.unwrap();
        let second = sync.run("news").await.unwrap();

        assert_eq!(first.entities_seen, 4);
        assert_eq!(second.entities_seen, first.entities_seen);
        assert_eq!(second.entities_dumped, first.entities_dumped);
        let context_fetches = remote
            .full_entity_order()
            .into_iter()
            .filter(|id| *id == ctx().peer_id())
            .count();
        assert_eq!(context_fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn history_requests_are_spaced_by_the_interval() {
        let remote = FakeRemote::new(ctx(), 450);
        let mut archive = MemoryArchive::default();

        run_once(&remote, &mut archive, 0).await.unwrap();

        let instants = remote.history_instants();
        assert_eq!(instants.len(), 5);
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_history_finishes_immediately() {
        let remote = FakeRemote::new(ctx(), 0);
        let mut archive = MemoryArchive::default();

        let report = run_once(&remote, &mut archive, 0).await.unwrap();

        assert_eq!(report.pages, 1);
        assert!(report.exhausted);
        assert_eq!(report.cursor, ResumeCursor::default());
    }
}
