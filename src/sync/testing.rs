//! In-memory stand-ins for Telegram and the archive database.

use crate::archive::{
    AdminEventRecord, Archive, EntityRecord, MediaRecord, MessageRecord, ParticipantDelta,
};
use crate::error::RemoteError;
use crate::model::{
    AdminLogEvent, AdminLogPage, Channel, Chat, Entity, EntityRef, FileLocator, ForwardHeader,
    FullEntity, HistoryItem, HistoryPage, Media, Message, PeerId, Photo, ResumeCursor, User,
};
use crate::naming::TemplateNaming;
use crate::remote::{Remote, RemoteResult};
use crate::sync::media::{MediaCapture, MediaFilter};
use crate::sync::rate::RateScheduler;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type ErrorFactory = Box<dyn Fn() -> RemoteError + Send + Sync>;

pub fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn user(id: i64, name: &str) -> Entity {
    Entity::User(User {
        id,
        access_hash: Some(id * 7),
        first_name: Some(name.to_string()),
        last_name: None,
        username: None,
        phone: None,
        bot: false,
        deleted: false,
        min: false,
        photo: None,
    })
}

pub fn channel(id: i64, title: &str) -> Entity {
    Entity::Channel(Channel {
        id,
        access_hash: Some(id * 13),
        title: title.to_string(),
        username: None,
        megagroup: false,
        left: false,
        photo: None,
    })
}

pub fn basic_chat(id: i64, title: &str) -> Entity {
    Entity::Chat(Chat {
        id,
        title: title.to_string(),
        participants_count: 3,
        deactivated: false,
        photo: None,
    })
}

pub fn photo(id: i64) -> Photo {
    Photo {
        id,
        access_hash: id * 3,
        file_reference: vec![1, 2, 3],
        dc_id: 2,
        date: base_date(),
        thumb: "y".to_string(),
        size: Some(1024),
    }
}

pub fn message(id: i32, sender: i64) -> Message {
    Message {
        id,
        date: base_date() + ChronoDuration::minutes(id as i64),
        edit_date: None,
        sender: Some(PeerId::user(sender)),
        outgoing: false,
        text: format!("message {}", id),
        formatting: Vec::new(),
        reply_to: None,
        forward: None,
        media: None,
        views: None,
        post_author: None,
    }
}

/// Media capture that never downloads anything.
pub fn media_capture() -> MediaCapture {
    MediaCapture::new(
        Box::new(TemplateNaming::new("unused", "{id}")),
        MediaFilter::disabled(),
        RateScheduler::new(Duration::from_secs(1)),
    )
}

/// Media capture that downloads every kind into `dir`.
pub fn downloading_capture(dir: &Path) -> MediaCapture {
    MediaCapture::new(
        Box::new(TemplateNaming::new(dir, "{type}/{id}{ext}")),
        MediaFilter::new([], u64::MAX),
        RateScheduler::new(Duration::from_secs(1)),
    )
}

#[derive(Default)]
struct FakeState {
    items: Vec<HistoryItem>,
    events: Vec<AdminLogEvent>,
    participants: Vec<PeerId>,
    history_calls: Vec<(i32, Instant)>,
    admin_log_calls: Vec<i64>,
    full_entity_order: Vec<PeerId>,
    download_calls: usize,
    fail_history_after: Option<usize>,
    history_error: Option<ErrorFactory>,
    download_error: Option<ErrorFactory>,
    full_entity_error: Option<ErrorFactory>,
    participants_error: Option<ErrorFactory>,
}

/// Scripted remote holding a single conversation.
pub struct FakeRemote {
    context: Entity,
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// A conversation with messages `1..=count`, sent by three users.
    pub fn new(context: Entity, count: i32) -> Self {
        let items = (1..=count)
            .map(|id| HistoryItem::Content(message(id, 100 + (id as i64 % 3))))
            .collect();
        Self::with_items(context, items)
    }

    pub fn with_items(context: Entity, items: Vec<HistoryItem>) -> Self {
        Self {
            context,
            state: Mutex::new(FakeState {
                items,
                ..FakeState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Append messages up to `count` (new messages arriving between runs).
    pub fn grow_to(&self, count: i32) {
        let mut state = self.state();
        let start = state.items.iter().map(HistoryItem::id).max().unwrap_or(0) + 1;
        for id in start..=count {
            state
                .items
                .push(HistoryItem::Content(message(id, 100 + (id as i64 % 3))));
        }
    }

    pub fn set_media(&self, id: i32, media: Media) {
        let mut state = self.state();
        for item in state.items.iter_mut() {
            if let HistoryItem::Content(m) = item {
                if m.id == id {
                    m.media = Some(media.clone());
                }
            }
        }
    }

    pub fn set_forward(&self, id: i32, header: ForwardHeader) {
        let mut state = self.state();
        for item in state.items.iter_mut() {
            if let HistoryItem::Content(m) = item {
                if m.id == id {
                    m.forward = Some(header.clone());
                }
            }
        }
    }

    pub fn set_events(&self, events: Vec<AdminLogEvent>) {
        self.state().events = events;
    }

    pub fn set_participants(&self, ids: Vec<PeerId>) {
        self.state().participants = ids;
    }

    /// Serve `pages` history pages, then fail every later call.
    pub fn fail_history_after(&self, pages: usize, err: impl Fn() -> RemoteError + Send + Sync + 'static) {
        let mut state = self.state();
        state.fail_history_after = Some(pages);
        state.history_error = Some(Box::new(err));
    }

    pub fn heal_history(&self) {
        let mut state = self.state();
        state.fail_history_after = None;
        state.history_error = None;
    }

    pub fn fail_downloads_with(&self, err: impl Fn() -> RemoteError + Send + Sync + 'static) {
        self.state().download_error = Some(Box::new(err));
    }

    pub fn fail_full_entity_with(&self, err: impl Fn() -> RemoteError + Send + Sync + 'static) {
        self.state().full_entity_error = Some(Box::new(err));
    }

    pub fn fail_participants_with(&self, err: impl Fn() -> RemoteError + Send + Sync + 'static) {
        self.state().participants_error = Some(Box::new(err));
    }

    /// Offsets of every history request, in order.
    pub fn history_offsets(&self) -> Vec<i32> {
        self.state().history_calls.iter().map(|(o, _)| *o).collect()
    }

    pub fn history_instants(&self) -> Vec<Instant> {
        self.state().history_calls.iter().map(|(_, t)| *t).collect()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.history_calls.clear();
        state.admin_log_calls.clear();
        state.full_entity_order.clear();
        state.download_calls = 0;
    }

    pub fn admin_log_max_ids(&self) -> Vec<i64> {
        self.state().admin_log_calls.clone()
    }

    pub fn full_entity_calls(&self) -> usize {
        self.state().full_entity_order.len()
    }

    pub fn full_entity_order(&self) -> Vec<PeerId> {
        self.state().full_entity_order.clone()
    }

    pub fn download_calls(&self) -> usize {
        self.state().download_calls
    }

    fn senders(&self, messages: &[HistoryItem]) -> Vec<Entity> {
        let ids: BTreeSet<i64> = messages
            .iter()
            .filter_map(|item| match item {
                HistoryItem::Content(m) => m.sender.map(|s| s.bare_id()),
                HistoryItem::Service(m) => m.sender.map(|s| s.bare_id()),
                HistoryItem::Unrecognized { .. } => None,
            })
            .collect();
        ids.into_iter()
            .map(|id| user(id, &format!("user{}", id)))
            .collect()
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn resolve(&self, _query: &str) -> RemoteResult<Entity> {
        Ok(self.context.clone())
    }

    async fn get_history(
        &self,
        _target: &EntityRef,
        offset_id: i32,
        _offset_date: Option<DateTime<Utc>>,
        limit: i32,
    ) -> RemoteResult<HistoryPage> {
        let messages = {
            let mut state = self.state();
            state.history_calls.push((offset_id, Instant::now()));
            if let (Some(after), Some(err)) = (state.fail_history_after, &state.history_error) {
                if state.history_calls.len() > after {
                    return Err(err());
                }
            }
            let mut messages: Vec<HistoryItem> = state
                .items
                .iter()
                .filter(|m| offset_id == 0 || m.id() < offset_id)
                .cloned()
                .collect();
            messages.sort_by_key(|m| std::cmp::Reverse(m.id()));
            messages.truncate(limit.max(0) as usize);
            messages
        };
        let count = self.state().items.len() as i32;
        Ok(HistoryPage {
            users: self.senders(&messages),
            chats: vec![self.context.clone()],
            messages,
            count: Some(count),
        })
    }

    async fn get_full_entity(&self, entity: &Entity) -> RemoteResult<FullEntity> {
        let mut state = self.state();
        if let Some(err) = &state.full_entity_error {
            return Err(err());
        }
        state.full_entity_order.push(entity.peer_id());
        match entity {
            Entity::User(u) => Ok(FullEntity::User {
                user: u.clone(),
                about: Some(format!("about {}", u.id)),
                common_chats_count: 0,
                photo: None,
            }),
            Entity::Channel(c) => Ok(FullEntity::Channel {
                channel: c.clone(),
                about: Some("channel about".to_string()),
                participants_count: Some(10),
                photo: Some(photo(c.id)),
            }),
            other => Err(RemoteError::Other(anyhow::anyhow!(
                "no full info for {}",
                other.peer_id()
            ))),
        }
    }

    async fn get_participants(&self, _target: &EntityRef) -> RemoteResult<Vec<PeerId>> {
        let state = self.state();
        if let Some(err) = &state.participants_error {
            return Err(err());
        }
        Ok(state.participants.clone())
    }

    async fn get_admin_log(
        &self,
        _target: &EntityRef,
        max_id: i64,
        _query: &str,
        limit: i32,
    ) -> RemoteResult<AdminLogPage> {
        let mut state = self.state();
        state.admin_log_calls.push(max_id);
        let mut events: Vec<AdminLogEvent> = state
            .events
            .iter()
            .filter(|e| max_id == 0 || e.id < max_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.id));
        events.truncate(limit.max(0) as usize);
        let users = events
            .iter()
            .map(|e| user(e.user_id, "admin"))
            .collect();
        Ok(AdminLogPage {
            events,
            users,
            chats: vec![self.context.clone()],
        })
    }

    async fn download(&self, _locator: &FileLocator, dest: &Path) -> RemoteResult<u64> {
        let mut state = self.state();
        state.download_calls += 1;
        if let Some(err) = &state.download_error {
            return Err(err());
        }
        let data = b"blob";
        std::fs::write(dest, data).map_err(|e| RemoteError::Other(e.into()))?;
        Ok(data.len() as u64)
    }
}

/// Archive kept in maps, with a log of every cursor and message write.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    pub entities: HashMap<PeerId, EntityRecord>,
    pub messages: BTreeMap<(PeerId, i32), MessageRecord>,
    pub media: Vec<MediaRecord>,
    pub forwards: HashMap<(PeerId, i32), i64>,
    pub admin_events: BTreeMap<(PeerId, i64), AdminEventRecord>,
    pub cursors: HashMap<PeerId, ResumeCursor>,
    pub participants: HashMap<PeerId, BTreeSet<PeerId>>,
    /// Every cursor ever saved, in order.
    pub cursor_log: Vec<ResumeCursor>,
    /// Ids of every message write, in order.
    pub message_writes: Vec<i32>,
    pub commits: usize,
}

impl MemoryArchive {
    pub fn message_ids(&self, context: PeerId) -> Vec<i32> {
        self.messages
            .keys()
            .filter(|(c, _)| *c == context)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn media_row(&self, id: i64) -> Option<&MediaRecord> {
        self.media.get((id - 1) as usize)
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn upsert_entity(&mut self, record: &EntityRecord) -> Result<()> {
        self.entities.insert(record.peer_id, record.clone());
        Ok(())
    }

    async fn upsert_message(&mut self, record: &MessageRecord) -> Result<()> {
        self.message_writes.push(record.id);
        self.messages
            .insert((record.context_id, record.id), record.clone());
        Ok(())
    }

    async fn upsert_media(&mut self, record: &MediaRecord) -> Result<i64> {
        if let Some(pos) = self
            .media
            .iter()
            .position(|m| m.remote_id == record.remote_id && m.kind == record.kind)
        {
            let existing = &mut self.media[pos];
            existing.local_path = record.local_path.clone().or(existing.local_path.take());
            return Ok(pos as i64 + 1);
        }
        self.media.push(record.clone());
        Ok(self.media.len() as i64)
    }

    async fn upsert_forward(
        &mut self,
        context_id: PeerId,
        message_id: i32,
        _header: &ForwardHeader,
    ) -> Result<i64> {
        let next = self.forwards.len() as i64 + 1;
        Ok(*self.forwards.entry((context_id, message_id)).or_insert(next))
    }

    async fn upsert_admin_event(&mut self, record: &AdminEventRecord) -> Result<()> {
        self.admin_events
            .insert((record.context_id, record.id), record.clone());
        Ok(())
    }

    async fn resume_cursor(&mut self, context_id: PeerId) -> Result<ResumeCursor> {
        Ok(self.cursors.get(&context_id).copied().unwrap_or_default())
    }

    async fn save_resume_cursor(&mut self, context_id: PeerId, cursor: &ResumeCursor) -> Result<()> {
        self.cursor_log.push(*cursor);
        self.cursors.insert(context_id, *cursor);
        Ok(())
    }

    async fn message_count(&mut self, context_id: PeerId) -> Result<u64> {
        Ok(self.message_ids(context_id).len() as u64)
    }

    async fn max_message_id(&mut self, context_id: PeerId) -> Result<Option<i32>> {
        Ok(self.message_ids(context_id).into_iter().max())
    }

    async fn participant_delta(
        &mut self,
        context_id: PeerId,
        current: &[PeerId],
    ) -> Result<ParticipantDelta> {
        let current: BTreeSet<PeerId> = current.iter().copied().collect();
        let previous = self.participants.insert(context_id, current.clone()).unwrap_or_default();
        Ok(ParticipantDelta {
            added: current.difference(&previous).copied().collect(),
            removed: previous.difference(&current).copied().collect(),
        })
    }

    async fn commit(&mut self) -> Result<()> {
        self.commits += 1;
        Ok(())
    }
}
