//! Persistence seam for the sync engine.
//!
//! Every write is an idempotent upsert keyed on the natural id of the row, so
//! re-delivering a page after an interruption never duplicates data.

use crate::model::{
    AdminLogEvent, Entity, ForwardHeader, FullEntity, Media, MediaKind, Message, PeerId,
    PeerKind, ResumeCursor, ServiceMessage,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub peer_id: PeerId,
    pub kind: PeerKind,
    pub name: String,
    pub username: Option<String>,
    pub about: Option<String>,
    pub phone: Option<String>,
    pub bot: bool,
    pub megagroup: bool,
    pub participants_count: Option<i32>,
    pub photo_media_id: Option<i64>,
}

impl EntityRecord {
    /// Record built only from a discovery payload.
    pub fn from_entity(entity: &Entity, photo_media_id: Option<i64>) -> Self {
        let (phone, bot, megagroup, participants_count) = match entity {
            Entity::User(u) => (u.phone.clone(), u.bot, false, None),
            Entity::Chat(c) => (None, false, false, Some(c.participants_count)),
            Entity::Channel(c) => (None, false, c.megagroup, None),
            Entity::Unavailable { .. } => (None, false, false, None),
        };
        EntityRecord {
            peer_id: entity.peer_id(),
            kind: entity.kind(),
            name: entity.display_name(),
            username: entity.username().map(str::to_string),
            about: None,
            phone,
            bot,
            megagroup,
            participants_count,
            photo_media_id,
        }
    }

    pub fn from_full(full: &FullEntity, photo_media_id: Option<i64>) -> Self {
        match full {
            FullEntity::User { user, about, .. } => EntityRecord {
                about: about.clone(),
                ..Self::from_entity(&Entity::User(user.clone()), photo_media_id)
            },
            FullEntity::Channel {
                channel,
                about,
                participants_count,
                ..
            } => EntityRecord {
                about: about.clone(),
                participants_count: *participants_count,
                ..Self::from_entity(&Entity::Channel(channel.clone()), photo_media_id)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub remote_id: i64,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub name: Option<String>,
    pub size: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    /// Where the blob lives on disk; `None` when it was not (yet) downloaded.
    pub local_path: Option<String>,
}

impl MediaRecord {
    /// Metadata row for a media item, or `None` when it has no remote id.
    pub fn from_media(media: &Media, kind: MediaKind, local_path: Option<String>) -> Option<Self> {
        match media {
            Media::Photo(p) => Some(MediaRecord {
                remote_id: p.id,
                kind,
                mime_type: Some("image/jpeg".to_string()),
                name: None,
                size: p.size,
                date: Some(p.date),
                local_path,
            }),
            Media::Document(d) => Some(MediaRecord {
                remote_id: d.id,
                kind,
                mime_type: Some(d.mime_type.clone()),
                name: d.file_name().map(str::to_string),
                size: Some(d.size),
                date: Some(d.date),
                local_path,
            }),
            Media::Unsupported { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub context_id: PeerId,
    pub id: i32,
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
    pub sender_id: Option<PeerId>,
    pub outgoing: bool,
    pub text: String,
    /// JSON array of formatted spans, `None` for plain text.
    pub formatting: Option<String>,
    pub reply_to: Option<i32>,
    pub forward_id: Option<i64>,
    pub media_id: Option<i64>,
    pub views: Option<i32>,
    pub post_author: Option<String>,
    /// Namespaced action name for service messages.
    pub service_action: Option<String>,
    pub service_payload: Option<String>,
}

impl MessageRecord {
    pub fn content(
        context_id: PeerId,
        msg: &Message,
        forward_id: Option<i64>,
        media_id: Option<i64>,
    ) -> Self {
        MessageRecord {
            context_id,
            id: msg.id,
            date: msg.date,
            edit_date: msg.edit_date,
            sender_id: msg.sender,
            outgoing: msg.outgoing,
            text: msg.text.clone(),
            formatting: if msg.formatting.is_empty() {
                None
            } else {
                serde_json::to_string(&msg.formatting).ok()
            },
            reply_to: msg.reply_to,
            forward_id,
            media_id,
            views: msg.views,
            post_author: msg.post_author.clone(),
            service_action: None,
            service_payload: None,
        }
    }

    pub fn service(context_id: PeerId, msg: &ServiceMessage, media_id: Option<i64>) -> Self {
        MessageRecord {
            context_id,
            id: msg.id,
            date: msg.date,
            edit_date: None,
            sender_id: msg.sender,
            outgoing: false,
            text: String::new(),
            formatting: None,
            reply_to: None,
            forward_id: None,
            media_id,
            views: None,
            post_author: None,
            service_action: Some(msg.action.name().to_string()),
            service_payload: serde_json::to_string(&msg.action).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminEventRecord {
    pub context_id: PeerId,
    pub id: i64,
    pub date: DateTime<Utc>,
    pub user_id: i64,
    pub action: String,
    pub payload: String,
    pub media_id1: Option<i64>,
    pub media_id2: Option<i64>,
}

impl AdminEventRecord {
    pub fn new(
        context_id: PeerId,
        event: &AdminLogEvent,
        media_id1: Option<i64>,
        media_id2: Option<i64>,
    ) -> Self {
        AdminEventRecord {
            context_id,
            id: event.id,
            date: event.date,
            user_id: event.user_id,
            action: event.action.name().to_string(),
            payload: serde_json::to_string(&event.action).unwrap_or_default(),
            media_id1,
            media_id2,
        }
    }
}

/// Members that joined and left since the previous participant snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantDelta {
    pub added: Vec<PeerId>,
    pub removed: Vec<PeerId>,
}

#[async_trait]
pub trait Archive: Send {
    async fn upsert_entity(&mut self, record: &EntityRecord) -> Result<()>;

    async fn upsert_message(&mut self, record: &MessageRecord) -> Result<()>;

    /// Returns the local media row id.
    async fn upsert_media(&mut self, record: &MediaRecord) -> Result<i64>;

    /// Returns the local forward row id.
    async fn upsert_forward(
        &mut self,
        context_id: PeerId,
        message_id: i32,
        header: &ForwardHeader,
    ) -> Result<i64>;

    async fn upsert_admin_event(&mut self, record: &AdminEventRecord) -> Result<()>;

    async fn resume_cursor(&mut self, context_id: PeerId) -> Result<ResumeCursor>;

    async fn save_resume_cursor(&mut self, context_id: PeerId, cursor: &ResumeCursor)
        -> Result<()>;

    async fn message_count(&mut self, context_id: PeerId) -> Result<u64>;

    async fn max_message_id(&mut self, context_id: PeerId) -> Result<Option<i32>>;

    /// Replace the stored member set with `current` and report the change.
    async fn participant_delta(
        &mut self,
        context_id: PeerId,
        current: &[PeerId],
    ) -> Result<ParticipantDelta>;

    /// Close the current write transaction.
    async fn commit(&mut self) -> Result<()>;
}
