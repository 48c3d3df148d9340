//! Raw TL objects to the archiver's model types.

use crate::model::{
    AdminLogAction, AdminLogEvent, Channel, Chat, Document, DocumentAttribute, Entity,
    FormatStyle, ForwardHeader, HistoryItem, Media, Message, PeerId, PeerKind, Photo,
    ProfilePhoto, ServiceAction, ServiceMessage, TextFormat, User,
};
use chrono::{DateTime, TimeZone, Utc};
use grammers_client::types::Peer;
use grammers_tl_types as tl;

pub fn date(ts: i32) -> DateTime<Utc> {
    Utc.timestamp_opt(ts as i64, 0).single().unwrap_or_default()
}

pub fn peer_id(peer: &tl::enums::Peer) -> PeerId {
    match peer {
        tl::enums::Peer::User(p) => PeerId::user(p.user_id),
        tl::enums::Peer::Chat(p) => PeerId::chat(p.chat_id),
        tl::enums::Peer::Channel(p) => PeerId::channel(p.channel_id),
    }
}

/// Variant name of a TL enum value, lowercased, e.g. `geolive`.
fn variant_name<T: std::fmt::Debug>(value: &T) -> String {
    format!("{:?}", value)
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

// --- Entities ---

pub fn user(raw: &tl::enums::User) -> Entity {
    match raw {
        tl::enums::User::Empty(u) => Entity::Unavailable {
            peer: PeerKind::User,
            id: u.id,
        },
        tl::enums::User::User(u) => Entity::User(User {
            id: u.id,
            access_hash: u.access_hash,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            username: u.username.clone(),
            phone: u.phone.clone(),
            bot: u.bot,
            deleted: u.deleted,
            min: u.min,
            photo: match &u.photo {
                Some(tl::enums::UserProfilePhoto::Photo(p)) => Some(ProfilePhoto {
                    photo_id: p.photo_id,
                    dc_id: p.dc_id,
                }),
                _ => None,
            },
        }),
    }
}

pub fn chat(raw: &tl::enums::Chat) -> Entity {
    match raw {
        tl::enums::Chat::Empty(c) => Entity::Unavailable {
            peer: PeerKind::Chat,
            id: c.id,
        },
        tl::enums::Chat::Chat(c) => Entity::Chat(Chat {
            id: c.id,
            title: c.title.clone(),
            participants_count: c.participants_count,
            deactivated: c.deactivated,
            photo: chat_photo(&c.photo),
        }),
        tl::enums::Chat::Forbidden(c) => Entity::Unavailable {
            peer: PeerKind::Chat,
            id: c.id,
        },
        tl::enums::Chat::Channel(c) => channel(c),
        tl::enums::Chat::ChannelForbidden(c) => Entity::Unavailable {
            peer: PeerKind::Channel,
            id: c.id,
        },
    }
}

pub fn channel(c: &tl::types::Channel) -> Entity {
    Entity::Channel(Channel {
        id: c.id,
        access_hash: c.access_hash,
        title: c.title.clone(),
        username: c.username.clone(),
        megagroup: c.megagroup,
        left: c.left,
        photo: chat_photo(&c.photo),
    })
}

fn chat_photo(raw: &tl::enums::ChatPhoto) -> Option<ProfilePhoto> {
    match raw {
        tl::enums::ChatPhoto::Photo(p) => Some(ProfilePhoto {
            photo_id: p.photo_id,
            dc_id: p.dc_id,
        }),
        tl::enums::ChatPhoto::Empty => None,
    }
}

/// Entity behind a high-level grammers peer (dialogs, username lookups).
pub fn peer_entity(peer: &Peer) -> Entity {
    match peer {
        Peer::User(u) => user(&u.raw),
        Peer::Group(g) => chat(&g.raw),
        Peer::Channel(c) => channel(&c.raw),
    }
}

// --- Media ---

pub fn photo(raw: &tl::enums::Photo) -> Option<Photo> {
    let tl::enums::Photo::Photo(p) = raw else {
        return None;
    };
    let largest = p
        .sizes
        .iter()
        .filter_map(|size| match size {
            tl::enums::PhotoSize::Size(s) => Some((s.r#type.clone(), s.size as i64)),
            tl::enums::PhotoSize::Progressive(s) => Some((
                s.r#type.clone(),
                s.sizes.iter().copied().max().unwrap_or(0) as i64,
            )),
            _ => None,
        })
        .max_by_key(|(_, size)| *size);
    let (thumb, size) = match largest {
        Some((thumb, size)) => (thumb, Some(size)),
        None => ("x".to_string(), None),
    };
    Some(Photo {
        id: p.id,
        access_hash: p.access_hash,
        file_reference: p.file_reference.clone(),
        dc_id: p.dc_id,
        date: date(p.date),
        thumb,
        size,
    })
}

pub fn document(raw: &tl::enums::Document) -> Option<Document> {
    let tl::enums::Document::Document(d) = raw else {
        return None;
    };
    Some(Document {
        id: d.id,
        access_hash: d.access_hash,
        file_reference: d.file_reference.clone(),
        dc_id: d.dc_id,
        date: date(d.date),
        mime_type: d.mime_type.clone(),
        size: d.size,
        attributes: d.attributes.iter().map(document_attribute).collect(),
    })
}

fn document_attribute(raw: &tl::enums::DocumentAttribute) -> DocumentAttribute {
    match raw {
        tl::enums::DocumentAttribute::Filename(a) => DocumentAttribute::Filename(a.file_name.clone()),
        tl::enums::DocumentAttribute::Sticker(_) => DocumentAttribute::Sticker,
        tl::enums::DocumentAttribute::Video(a) => DocumentAttribute::Video {
            duration: a.duration,
        },
        tl::enums::DocumentAttribute::Audio(a) => DocumentAttribute::Audio {
            voice: a.voice,
            title: a.title.clone(),
            performer: a.performer.clone(),
        },
        tl::enums::DocumentAttribute::Animated => DocumentAttribute::Animated,
        tl::enums::DocumentAttribute::ImageSize(a) => DocumentAttribute::ImageSize { w: a.w, h: a.h },
        _ => DocumentAttribute::Other,
    }
}

pub fn media(raw: &tl::enums::MessageMedia) -> Option<Media> {
    match raw {
        tl::enums::MessageMedia::Empty => None,
        tl::enums::MessageMedia::Photo(m) => Some(
            m.photo
                .as_ref()
                .and_then(photo)
                .map(Media::Photo)
                .unwrap_or_else(|| Media::Unsupported {
                    name: "photo.expired".to_string(),
                }),
        ),
        tl::enums::MessageMedia::Document(m) => Some(
            m.document
                .as_ref()
                .and_then(document)
                .map(Media::Document)
                .unwrap_or_else(|| Media::Unsupported {
                    name: "document.expired".to_string(),
                }),
        ),
        other => Some(Media::Unsupported {
            name: variant_name(other),
        }),
    }
}

// --- Messages ---

pub fn message(m: &tl::types::Message) -> Message {
    // Incoming private messages carry the sender only as the dialog peer.
    let sender = m.from_id.as_ref().map(peer_id).or_else(|| match &m.peer_id {
        tl::enums::Peer::User(_) if !m.out => Some(peer_id(&m.peer_id)),
        _ => None,
    });
    Message {
        id: m.id,
        date: date(m.date),
        edit_date: m.edit_date.map(date),
        sender,
        outgoing: m.out,
        text: m.message.clone(),
        formatting: m.entities.iter().flatten().map(text_format).collect(),
        reply_to: match &m.reply_to {
            Some(tl::enums::MessageReplyHeader::Header(h)) => h.reply_to_msg_id,
            _ => None,
        },
        forward: m.fwd_from.as_ref().map(forward),
        media: m.media.as_ref().and_then(media),
        views: m.views,
        post_author: m.post_author.clone(),
    }
}

pub fn text_format(raw: &tl::enums::MessageEntity) -> TextFormat {
    use tl::enums::MessageEntity as E;
    let (offset, length, style) = match raw {
        E::Bold(e) => (e.offset, e.length, FormatStyle::Bold),
        E::Italic(e) => (e.offset, e.length, FormatStyle::Italic),
        E::Underline(e) => (e.offset, e.length, FormatStyle::Underline),
        E::Strike(e) => (e.offset, e.length, FormatStyle::Strike),
        E::Spoiler(e) => (e.offset, e.length, FormatStyle::Spoiler),
        E::Blockquote(e) => (e.offset, e.length, FormatStyle::Blockquote),
        E::Code(e) => (e.offset, e.length, FormatStyle::Code),
        E::Pre(e) => (
            e.offset,
            e.length,
            FormatStyle::Pre {
                language: e.language.clone(),
            },
        ),
        E::TextUrl(e) => (e.offset, e.length, FormatStyle::TextUrl { url: e.url.clone() }),
        E::MentionName(e) => (
            e.offset,
            e.length,
            FormatStyle::MentionName { user_id: e.user_id },
        ),
        E::InputMessageEntityMentionName(e) => (
            e.offset,
            e.length,
            FormatStyle::MentionName {
                user_id: match &e.user_id {
                    tl::enums::InputUser::User(u) => u.user_id,
                    tl::enums::InputUser::FromMessage(u) => u.user_id,
                    tl::enums::InputUser::Empty | tl::enums::InputUser::UserSelf => 0,
                },
            },
        ),
        E::CustomEmoji(e) => (
            e.offset,
            e.length,
            FormatStyle::CustomEmoji {
                document_id: e.document_id,
            },
        ),
        E::Mention(e) => (e.offset, e.length, FormatStyle::Mention),
        E::Hashtag(e) => (e.offset, e.length, FormatStyle::Hashtag),
        E::Cashtag(e) => (e.offset, e.length, FormatStyle::Cashtag),
        E::BotCommand(e) => (e.offset, e.length, FormatStyle::BotCommand),
        E::Url(e) => (e.offset, e.length, FormatStyle::Url),
        E::Email(e) => (e.offset, e.length, FormatStyle::Email),
        E::Phone(e) => (e.offset, e.length, FormatStyle::Phone),
        E::BankCard(e) => (e.offset, e.length, FormatStyle::BankCard),
        E::Unknown(e) => (e.offset, e.length, FormatStyle::Unknown),
    };
    TextFormat {
        offset,
        length,
        style,
    }
}

fn forward(raw: &tl::enums::MessageFwdHeader) -> ForwardHeader {
    let tl::enums::MessageFwdHeader::Header(h) = raw;
    ForwardHeader {
        from_id: h.from_id.as_ref().map(peer_id),
        from_name: h.from_name.clone(),
        date: date(h.date),
        channel_post: h.channel_post,
        post_author: h.post_author.clone(),
    }
}

pub fn history_item(raw: &tl::enums::Message) -> HistoryItem {
    match raw {
        tl::enums::Message::Empty(m) => HistoryItem::Unrecognized { id: m.id },
        tl::enums::Message::Message(m) => HistoryItem::Content(message(m)),
        tl::enums::Message::Service(m) => HistoryItem::Service(ServiceMessage {
            id: m.id,
            date: date(m.date),
            sender: m.from_id.as_ref().map(peer_id),
            action: service_action(&m.action),
        }),
    }
}

fn content(raw: &tl::enums::Message) -> Option<Message> {
    match raw {
        tl::enums::Message::Message(m) => Some(message(m)),
        _ => None,
    }
}

fn service_action(raw: &tl::enums::MessageAction) -> ServiceAction {
    use tl::enums::MessageAction as A;
    match raw {
        A::ChatCreate(a) => ServiceAction::ChatCreate {
            title: a.title.clone(),
            users: a.users.clone(),
        },
        A::ChatEditTitle(a) => ServiceAction::ChatEditTitle {
            title: a.title.clone(),
        },
        A::ChatEditPhoto(a) => match photo(&a.photo) {
            Some(p) => ServiceAction::ChatEditPhoto(p),
            None => ServiceAction::Other("chat.editphoto".to_string()),
        },
        A::ChatDeletePhoto => ServiceAction::ChatDeletePhoto,
        A::ChatAddUser(a) => ServiceAction::ChatAddUser {
            users: a.users.clone(),
        },
        A::ChatDeleteUser(a) => ServiceAction::ChatDeleteUser { user_id: a.user_id },
        A::ChatJoinedByLink(a) => ServiceAction::ChatJoinedByLink {
            inviter_id: a.inviter_id,
        },
        A::ChannelCreate(a) => ServiceAction::ChannelCreate {
            title: a.title.clone(),
        },
        A::ChatMigrateTo(a) => ServiceAction::MigrateTo {
            channel_id: a.channel_id,
        },
        A::ChannelMigrateFrom(a) => ServiceAction::MigrateFrom {
            title: a.title.clone(),
            chat_id: a.chat_id,
        },
        A::PinMessage => ServiceAction::PinMessage,
        A::HistoryClear => ServiceAction::HistoryClear,
        A::ScreenshotTaken => ServiceAction::ScreenshotTaken,
        A::PhoneCall(a) => ServiceAction::PhoneCall {
            duration: a.duration,
        },
        other => ServiceAction::Other(variant_name(other)),
    }
}

// --- Admin log ---

pub fn admin_event(raw: &tl::enums::ChannelAdminLogEvent) -> AdminLogEvent {
    let tl::enums::ChannelAdminLogEvent::Event(e) = raw;
    AdminLogEvent {
        id: e.id,
        date: date(e.date),
        user_id: e.user_id,
        action: admin_action(&e.action),
    }
}

fn admin_action(raw: &tl::enums::ChannelAdminLogEventAction) -> AdminLogAction {
    use tl::enums::ChannelAdminLogEventAction as A;
    match raw {
        A::ChangeTitle(a) => AdminLogAction::ChangeTitle {
            prev: a.prev_value.clone(),
            new: a.new_value.clone(),
        },
        A::ChangeAbout(a) => AdminLogAction::ChangeAbout {
            prev: a.prev_value.clone(),
            new: a.new_value.clone(),
        },
        A::ChangeUsername(a) => AdminLogAction::ChangeUsername {
            prev: a.prev_value.clone(),
            new: a.new_value.clone(),
        },
        A::ChangePhoto(a) => AdminLogAction::ChangePhoto {
            prev: photo(&a.prev_photo),
            new: photo(&a.new_photo),
        },
        A::ToggleInvites(a) => AdminLogAction::ToggleInvites(a.new_value),
        A::ToggleSignatures(a) => AdminLogAction::ToggleSignatures(a.new_value),
        A::UpdatePinned(a) => AdminLogAction::UpdatePinned(content(&a.message)),
        A::EditMessage(a) => AdminLogAction::EditMessage {
            prev: content(&a.prev_message),
            new: content(&a.new_message),
        },
        A::DeleteMessage(a) => AdminLogAction::DeleteMessage(content(&a.message)),
        A::ParticipantJoin => AdminLogAction::ParticipantJoin,
        A::ParticipantLeave => AdminLogAction::ParticipantLeave,
        A::ParticipantInvite(a) => AdminLogAction::ParticipantInvite {
            user_id: channel_participant_user(&a.participant),
        },
        A::ParticipantToggleBan(a) => AdminLogAction::ParticipantToggleBan {
            user_id: channel_participant_user(&a.new_participant),
        },
        A::ParticipantToggleAdmin(a) => AdminLogAction::ParticipantToggleAdmin {
            user_id: channel_participant_user(&a.new_participant),
        },
        A::ChangeStickerSet(_) => AdminLogAction::ChangeStickerSet,
        A::TogglePreHistoryHidden(a) => AdminLogAction::TogglePreHistoryHidden(a.new_value),
        other => AdminLogAction::Other(variant_name(other)),
    }
}

// --- Participants ---

pub fn channel_participant_user(raw: &tl::enums::ChannelParticipant) -> Option<i64> {
    use tl::enums::ChannelParticipant as P;
    let peer = match raw {
        P::Participant(p) => return Some(p.user_id),
        P::ParticipantSelf(p) => return Some(p.user_id),
        P::Creator(p) => return Some(p.user_id),
        P::Admin(p) => return Some(p.user_id),
        P::Banned(p) => &p.peer,
        P::Left(p) => &p.peer,
    };
    match peer {
        tl::enums::Peer::User(u) => Some(u.user_id),
        _ => None,
    }
}

pub fn chat_participant_user(raw: &tl::enums::ChatParticipant) -> i64 {
    match raw {
        tl::enums::ChatParticipant::Participant(p) => p.user_id,
        tl::enums::ChatParticipant::Creator(p) => p.user_id,
        tl::enums::ChatParticipant::Admin(p) => p.user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_map_to_marked_ids() {
        let channel = tl::enums::Peer::Channel(tl::types::PeerChannel { channel_id: 5 });
        let chat = tl::enums::Peer::Chat(tl::types::PeerChat { chat_id: 5 });
        let user = tl::enums::Peer::User(tl::types::PeerUser { user_id: 5 });

        assert_eq!(peer_id(&channel), PeerId::channel(5));
        assert_eq!(peer_id(&chat).marked(), -5);
        assert_eq!(peer_id(&user).marked(), 5);
    }

    #[test]
    fn unix_timestamps_become_utc() {
        assert_eq!(date(0), Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(date(1_700_000_000).timestamp(), 1_700_000_000);
    }

    #[test]
    fn formatting_entities_keep_their_payload() {
        let bold = tl::enums::MessageEntity::Bold(tl::types::MessageEntityBold {
            offset: 0,
            length: 4,
        });
        let link = tl::enums::MessageEntity::TextUrl(tl::types::MessageEntityTextUrl {
            offset: 5,
            length: 3,
            url: "https://example.org/a,b".into(),
        });
        let pre = tl::enums::MessageEntity::Pre(tl::types::MessageEntityPre {
            offset: 9,
            length: 10,
            language: "rust".into(),
        });
        let mention = tl::enums::MessageEntity::MentionName(tl::types::MessageEntityMentionName {
            offset: 20,
            length: 5,
            user_id: 42,
        });

        assert_eq!(
            text_format(&bold),
            TextFormat { offset: 0, length: 4, style: FormatStyle::Bold }
        );
        assert_eq!(
            text_format(&link).style,
            FormatStyle::TextUrl { url: "https://example.org/a,b".into() }
        );
        assert_eq!(text_format(&pre).style, FormatStyle::Pre { language: "rust".into() });
        assert_eq!(
            (text_format(&mention).offset, text_format(&mention).style),
            (20, FormatStyle::MentionName { user_id: 42 })
        );
    }

    #[test]
    fn formatting_serializes_flat() {
        let spans = vec![
            TextFormat { offset: 0, length: 4, style: FormatStyle::Bold },
            TextFormat { offset: 5, length: 3, style: FormatStyle::TextUrl { url: "https://t.me".into() } },
        ];
        assert_eq!(
            serde_json::to_string(&spans).unwrap(),
            r#"[{"offset":0,"length":4,"style":"bold"},{"offset":5,"length":3,"style":"text_url","url":"https://t.me"}]"#
        );
    }

    #[test]
    fn empty_media_is_none() {
        assert_eq!(media(&tl::enums::MessageMedia::Empty), None);
    }

    #[test]
    fn variant_names_are_lowercase() {
        #[derive(Debug)]
        enum Sample {
            GeoLive(u8),
        }
        assert_eq!(variant_name(&Sample::GeoLive(1)), "geolive");
    }
}
