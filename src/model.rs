//! Transport-independent view of what the archiver reads from Telegram.
//!
//! The `tg` module converts raw TL objects into these types; everything in
//! `sync` and `store` only ever sees this module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Offset applied to channel ids so they never collide with chats or users.
const CHANNEL_PEER_OFFSET: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

impl PeerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerKind::User => "user",
            PeerKind::Chat => "chat",
            PeerKind::Channel => "channel",
        }
    }
}

/// Marked id that is unique across users, basic groups and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(i64);

impl PeerId {
    pub fn new(kind: PeerKind, bare_id: i64) -> Self {
        match kind {
            PeerKind::User => PeerId(bare_id),
            PeerKind::Chat => PeerId(-bare_id),
            PeerKind::Channel => PeerId(-(CHANNEL_PEER_OFFSET + bare_id)),
        }
    }

    pub fn user(bare_id: i64) -> Self {
        Self::new(PeerKind::User, bare_id)
    }

    pub fn chat(bare_id: i64) -> Self {
        Self::new(PeerKind::Chat, bare_id)
    }

    pub fn channel(bare_id: i64) -> Self {
        Self::new(PeerKind::Channel, bare_id)
    }

    /// Rebuild a peer id from its stored integer form.
    pub fn from_marked(marked: i64) -> Self {
        PeerId(marked)
    }

    pub fn marked(self) -> i64 {
        self.0
    }

    pub fn kind(&self) -> PeerKind {
        if self.0 >= 0 {
            PeerKind::User
        } else if self.0 <= -CHANNEL_PEER_OFFSET {
            PeerKind::Channel
        } else {
            PeerKind::Chat
        }
    }

    pub fn bare_id(&self) -> i64 {
        match self.kind() {
            PeerKind::User => self.0,
            PeerKind::Chat => -self.0,
            PeerKind::Channel => -self.0 - CHANNEL_PEER_OFFSET,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enough information to address a peer in a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: PeerKind,
    pub id: i64,
    pub access_hash: Option<i64>,
}

impl EntityRef {
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.kind, self.id)
    }
}

/// Small profile photo attached to a user, chat or channel payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePhoto {
    pub photo_id: i64,
    pub dc_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub access_hash: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub bot: bool,
    pub deleted: bool,
    /// Sent without the access hash and most fields.
    pub min: bool,
    pub photo: Option<ProfilePhoto>,
}

impl User {
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{} {}", first, last).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chat {
    pub id: i64,
    pub title: String,
    pub participants_count: i32,
    pub deactivated: bool,
    pub photo: Option<ProfilePhoto>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub id: i64,
    pub access_hash: Option<i64>,
    pub title: String,
    pub username: Option<String>,
    pub megagroup: bool,
    pub left: bool,
    pub photo: Option<ProfilePhoto>,
}

/// Lightweight entity as seen in the `users`/`chats` vectors of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    User(User),
    Chat(Chat),
    Channel(Channel),
    /// Empty or forbidden payloads that cannot be archived.
    Unavailable { peer: PeerKind, id: i64 },
}

impl Entity {
    pub fn kind(&self) -> PeerKind {
        match self {
            Entity::User(_) => PeerKind::User,
            Entity::Chat(_) => PeerKind::Chat,
            Entity::Channel(_) => PeerKind::Channel,
            Entity::Unavailable { peer, .. } => *peer,
        }
    }

    pub fn bare_id(&self) -> i64 {
        match self {
            Entity::User(u) => u.id,
            Entity::Chat(c) => c.id,
            Entity::Channel(c) => c.id,
            Entity::Unavailable { id, .. } => *id,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.kind(), self.bare_id())
    }

    pub fn to_ref(&self) -> EntityRef {
        let access_hash = match self {
            Entity::User(u) => u.access_hash,
            Entity::Channel(c) => c.access_hash,
            Entity::Chat(_) | Entity::Unavailable { .. } => None,
        };
        EntityRef {
            kind: self.kind(),
            id: self.bare_id(),
            access_hash,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Entity::User(u) => u.full_name(),
            Entity::Chat(c) => c.title.clone(),
            Entity::Channel(c) => c.title.clone(),
            Entity::Unavailable { .. } => String::new(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Entity::User(u) => u.username.as_deref(),
            Entity::Channel(c) => c.username.as_deref(),
            Entity::Chat(_) | Entity::Unavailable { .. } => None,
        }
    }

    pub fn profile_photo(&self) -> Option<&ProfilePhoto> {
        match self {
            Entity::User(u) => u.photo.as_ref(),
            Entity::Chat(c) => c.photo.as_ref(),
            Entity::Channel(c) => c.photo.as_ref(),
            Entity::Unavailable { .. } => None,
        }
    }
}

/// Extended record from a dedicated per-entity fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FullEntity {
    User {
        user: User,
        about: Option<String>,
        common_chats_count: i32,
        photo: Option<Photo>,
    },
    Channel {
        channel: Channel,
        about: Option<String>,
        participants_count: Option<i32>,
        photo: Option<Photo>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
    pub id: i64,
    pub access_hash: i64,
    #[serde(skip)]
    pub file_reference: Vec<u8>,
    pub dc_id: i32,
    pub date: DateTime<Utc>,
    /// Type letter of the largest size, used to request that size.
    pub thumb: String,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DocumentAttribute {
    Filename(String),
    Sticker,
    Video { duration: f64 },
    Audio {
        voice: bool,
        title: Option<String>,
        performer: Option<String>,
    },
    Animated,
    ImageSize { w: i32, h: i32 },
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub access_hash: i64,
    #[serde(skip)]
    pub file_reference: Vec<u8>,
    pub dc_id: i32,
    pub date: DateTime<Utc>,
    pub mime_type: String,
    pub size: i64,
    pub attributes: Vec<DocumentAttribute>,
}

impl Document {
    pub fn file_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            DocumentAttribute::Filename(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Media {
    Photo(Photo),
    Document(Document),
    /// Geo points, polls, web pages and similar attachments with no blob.
    Unsupported { name: String },
}

/// Fixed media taxonomy used for filtering and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
    Video,
    Audio,
    Sticker,
    Voice,
    ChatPhoto,
    Unknown,
}

impl MediaKind {
    pub const ALL: [MediaKind; 8] = [
        MediaKind::Photo,
        MediaKind::Document,
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Sticker,
        MediaKind::Voice,
        MediaKind::ChatPhoto,
        MediaKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Sticker => "sticker",
            MediaKind::Voice => "voice",
            MediaKind::ChatPhoto => "chatphoto",
            MediaKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        MediaKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `Remote::download` needs to fetch a blob.
#[derive(Debug, Clone, PartialEq)]
pub enum FileLocator {
    Photo {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb: String,
    },
    Document {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
    },
    PeerPhoto { peer: EntityRef, photo_id: i64 },
}

impl From<&Photo> for FileLocator {
    fn from(photo: &Photo) -> Self {
        FileLocator::Photo {
            id: photo.id,
            access_hash: photo.access_hash,
            file_reference: photo.file_reference.clone(),
            thumb: photo.thumb.clone(),
        }
    }
}

impl From<&Document> for FileLocator {
    fn from(doc: &Document) -> Self {
        FileLocator::Document {
            id: doc.id,
            access_hash: doc.access_hash,
            file_reference: doc.file_reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardHeader {
    pub from_id: Option<PeerId>,
    pub from_name: Option<String>,
    pub date: DateTime<Utc>,
    pub channel_post: Option<i32>,
    pub post_author: Option<String>,
}

/// Styled span of a message's text. Offsets and lengths count UTF-16 code
/// units, as Telegram does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFormat {
    pub offset: i32,
    pub length: i32,
    #[serde(flatten)]
    pub style: FormatStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum FormatStyle {
    Bold,
    Italic,
    Underline,
    Strike,
    Spoiler,
    Blockquote,
    Code,
    Pre { language: String },
    TextUrl { url: String },
    MentionName { user_id: i64 },
    CustomEmoji { document_id: i64 },
    Mention,
    Hashtag,
    Cashtag,
    BotCommand,
    Url,
    Email,
    Phone,
    BankCard,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
    pub sender: Option<PeerId>,
    pub outgoing: bool,
    pub text: String,
    pub formatting: Vec<TextFormat>,
    pub reply_to: Option<i32>,
    pub forward: Option<ForwardHeader>,
    pub media: Option<Media>,
    pub views: Option<i32>,
    pub post_author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServiceAction {
    ChatCreate { title: String, users: Vec<i64> },
    ChatEditTitle { title: String },
    ChatEditPhoto(Photo),
    ChatDeletePhoto,
    ChatAddUser { users: Vec<i64> },
    ChatDeleteUser { user_id: i64 },
    ChatJoinedByLink { inviter_id: i64 },
    ChannelCreate { title: String },
    MigrateTo { channel_id: i64 },
    MigrateFrom { title: String, chat_id: i64 },
    PinMessage,
    HistoryClear,
    ScreenshotTaken,
    PhoneCall { duration: Option<i32> },
    Other(String),
}

impl ServiceAction {
    pub fn name(&self) -> &str {
        match self {
            ServiceAction::ChatCreate { .. } => "chat.create",
            ServiceAction::ChatEditTitle { .. } => "chat.edittitle",
            ServiceAction::ChatEditPhoto(_) => "chat.editphoto",
            ServiceAction::ChatDeletePhoto => "chat.deletephoto",
            ServiceAction::ChatAddUser { .. } => "chat.adduser",
            ServiceAction::ChatDeleteUser { .. } => "chat.deleteuser",
            ServiceAction::ChatJoinedByLink { .. } => "chat.joinedbylink",
            ServiceAction::ChannelCreate { .. } => "channel.create",
            ServiceAction::MigrateTo { .. } => "chat.migrateto",
            ServiceAction::MigrateFrom { .. } => "channel.migratefrom",
            ServiceAction::PinMessage => "pin.message",
            ServiceAction::HistoryClear => "history.clear",
            ServiceAction::ScreenshotTaken => "screenshottaken",
            ServiceAction::PhoneCall { .. } => "phone.call",
            ServiceAction::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMessage {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub sender: Option<PeerId>,
    pub action: ServiceAction,
}

/// One row of a history page.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryItem {
    Content(Message),
    Service(ServiceMessage),
    Unrecognized { id: i32 },
}

impl HistoryItem {
    pub fn id(&self) -> i32 {
        match self {
            HistoryItem::Content(m) => m.id,
            HistoryItem::Service(m) => m.id,
            HistoryItem::Unrecognized { id } => *id,
        }
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            HistoryItem::Content(m) => Some(m.date),
            HistoryItem::Service(m) => Some(m.date),
            HistoryItem::Unrecognized { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<HistoryItem>,
    pub users: Vec<Entity>,
    pub chats: Vec<Entity>,
    /// Total message count reported by the server, when known.
    pub count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AdminLogAction {
    ChangeTitle { prev: String, new: String },
    ChangeAbout { prev: String, new: String },
    ChangeUsername { prev: String, new: String },
    ChangePhoto {
        prev: Option<Photo>,
        new: Option<Photo>,
    },
    EditMessage {
        prev: Option<Message>,
        new: Option<Message>,
    },
    DeleteMessage(Option<Message>),
    UpdatePinned(Option<Message>),
    ParticipantJoin,
    ParticipantLeave,
    ParticipantInvite { user_id: Option<i64> },
    ParticipantToggleBan { user_id: Option<i64> },
    ParticipantToggleAdmin { user_id: Option<i64> },
    ToggleInvites(bool),
    ToggleSignatures(bool),
    TogglePreHistoryHidden(bool),
    ChangeStickerSet,
    Other(String),
}

impl AdminLogAction {
    pub fn name(&self) -> &str {
        match self {
            AdminLogAction::ChangeTitle { .. } => "change.title",
            AdminLogAction::ChangeAbout { .. } => "change.about",
            AdminLogAction::ChangeUsername { .. } => "change.username",
            AdminLogAction::ChangePhoto { .. } => "change.photo",
            AdminLogAction::EditMessage { .. } => "edit.message",
            AdminLogAction::DeleteMessage(_) => "delete.message",
            AdminLogAction::UpdatePinned(_) => "update.pinned",
            AdminLogAction::ParticipantJoin => "participant.join",
            AdminLogAction::ParticipantLeave => "participant.leave",
            AdminLogAction::ParticipantInvite { .. } => "participant.invite",
            AdminLogAction::ParticipantToggleBan { .. } => "participant.toggleban",
            AdminLogAction::ParticipantToggleAdmin { .. } => "participant.toggleadmin",
            AdminLogAction::ToggleInvites(_) => "toggle.invites",
            AdminLogAction::ToggleSignatures(_) => "toggle.signatures",
            AdminLogAction::TogglePreHistoryHidden(_) => "toggle.prehistoryhidden",
            AdminLogAction::ChangeStickerSet => "change.stickerset",
            AdminLogAction::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminLogEvent {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub user_id: i64,
    pub action: AdminLogAction,
}

#[derive(Debug, Clone, Default)]
pub struct AdminLogPage {
    pub events: Vec<AdminLogEvent>,
    pub users: Vec<Entity>,
    pub chats: Vec<Entity>,
}

/// Durable progress marker for one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResumeCursor {
    /// Exclusive upper bound of the next page, 0 to start from the newest.
    pub offset_id: i32,
    pub offset_date: Option<DateTime<Utc>>,
    /// Highest id archived by the last completed pass.
    pub stop_at: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_ids_are_disjoint_per_kind() {
        let user = PeerId::user(42);
        let chat = PeerId::chat(42);
        let channel = PeerId::channel(42);

        assert_eq!(user.marked(), 42);
        assert_eq!(chat.marked(), -42);
        assert_eq!(channel.marked(), -1_000_000_000_042);
        assert_ne!(user, chat);
        assert_ne!(chat, channel);
    }

    #[test]
    fn peer_id_round_trips_kind_and_bare_id() {
        for kind in [PeerKind::User, PeerKind::Chat, PeerKind::Channel] {
            let id = PeerId::new(kind, 1_234_567);
            assert_eq!(id.kind(), kind);
            assert_eq!(id.bare_id(), 1_234_567);
            assert_eq!(PeerId::from_marked(id.marked()), id);
        }
    }

    #[test]
    fn media_kind_parse_matches_names() {
        for kind in MediaKind::ALL {
            assert_eq!(MediaKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::parse("gif"), None);
    }

    #[test]
    fn user_full_name_skips_missing_parts() {
        let user = User {
            id: 1,
            access_hash: None,
            first_name: Some("Ada".into()),
            last_name: None,
            username: None,
            phone: None,
            bot: false,
            deleted: false,
            min: false,
            photo: None,
        };
        assert_eq!(Entity::User(user).display_name(), "Ada");
    }
}
