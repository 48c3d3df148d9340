//! [`Remote`] over a grammers client.

use super::convert;
use crate::error::RemoteError;
use crate::model::{
    AdminLogPage, Entity, EntityRef, FileLocator, FullEntity, HistoryPage, PeerId, PeerKind,
};
use crate::remote::{Remote, RemoteResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grammers_client::types::Downloadable;
use grammers_client::Client;
use grammers_tl_types as tl;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Largest page `channels.getParticipants` serves.
const PARTICIPANTS_PAGE: i32 = 200;

/// An empty search lists every member the server is willing to page through,
/// unlike `ChannelParticipantsRecent` which stops early on large channels.
/// Telegram still caps member lists of big channels at about 10k.
fn participants_filter() -> tl::enums::ChannelParticipantsFilter {
    tl::types::ChannelParticipantsSearch { q: String::new() }.into()
}

pub struct TgRemote {
    client: Client,
}

impl TgRemote {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn invoke<R>(&self, request: &R, what: impl FnOnce() -> String) -> RemoteResult<R::Return>
    where
        R: tl::RemoteCall,
    {
        self.client
            .invoke(request)
            .await
            .map_err(|e| RemoteError::from_invocation(e, what))
    }

    /// Find a dialog by bare or marked id.
    async fn resolve_id(&self, id: i64) -> RemoteResult<Entity> {
        let marked = (id < 0).then(|| PeerId::from_marked(id));
        let mut dialogs = self.client.iter_dialogs();
        loop {
            let dialog = dialogs
                .next()
                .await
                .map_err(|e| RemoteError::from_invocation(e, || "Failed to fetch dialogs".into()))?;
            let Some(dialog) = dialog else {
                break;
            };
            let entity = convert::peer_entity(dialog.peer());
            let found = match marked {
                Some(marked) => entity.peer_id() == marked,
                None => entity.bare_id() == id,
            };
            if found {
                return Ok(entity);
            }
        }
        Err(RemoteError::Other(anyhow::anyhow!(
            "Chat {} not found among your dialogs",
            id
        )))
    }

    async fn resolve_username(&self, username: &str) -> RemoteResult<Entity> {
        let peer = self
            .client
            .resolve_username(username)
            .await
            .map_err(|e| {
                RemoteError::from_invocation(e, || format!("Failed to resolve username @{}", username))
            })?;
        match peer {
            Some(peer) => Ok(convert::peer_entity(&peer)),
            None => Err(RemoteError::Other(anyhow::anyhow!(
                "Username @{} not found",
                username
            ))),
        }
    }

    async fn channel_participants(&self, target: &EntityRef) -> RemoteResult<Vec<PeerId>> {
        let channel = input_channel(target);
        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let request = tl::functions::channels::GetParticipants {
                channel: channel.clone(),
                filter: participants_filter(),
                offset,
                limit: PARTICIPANTS_PAGE,
                hash: 0,
            };
            let result = self
                .invoke(&request, || format!("Failed to list members of {}", target.peer_id()))
                .await?;
            let tl::enums::channels::ChannelParticipants::Participants(page) = result else {
                break;
            };
            let fetched = page.participants.len();
            ids.extend(
                page.participants
                    .iter()
                    .filter_map(convert::channel_participant_user)
                    .map(PeerId::user),
            );
            offset += fetched as i32;
            if fetched < PARTICIPANTS_PAGE as usize || offset >= page.count {
                break;
            }
        }
        Ok(ids)
    }

    async fn chat_participants(&self, target: &EntityRef) -> RemoteResult<Vec<PeerId>> {
        let request = tl::functions::messages::GetFullChat { chat_id: target.id };
        let result = self
            .invoke(&request, || format!("Failed to list members of {}", target.peer_id()))
            .await?;
        let tl::types::messages::ChatFull { full_chat, .. } = result.into();
        let tl::enums::ChatFull::Full(full) = full_chat else {
            return Ok(Vec::new());
        };
        match full.participants {
            tl::enums::ChatParticipants::Participants(p) => Ok(p
                .participants
                .iter()
                .map(|p| PeerId::user(convert::chat_participant_user(p)))
                .collect()),
            tl::enums::ChatParticipants::Forbidden(_) => {
                Err(RemoteError::PermissionDenied("CHAT_FORBIDDEN".to_string()))
            }
        }
    }
}

fn input_peer(target: &EntityRef) -> tl::enums::InputPeer {
    let access_hash = target.access_hash.unwrap_or(0);
    match target.kind {
        PeerKind::User => tl::types::InputPeerUser {
            user_id: target.id,
            access_hash,
        }
        .into(),
        PeerKind::Chat => tl::types::InputPeerChat { chat_id: target.id }.into(),
        PeerKind::Channel => tl::types::InputPeerChannel {
            channel_id: target.id,
            access_hash,
        }
        .into(),
    }
}

fn input_channel(target: &EntityRef) -> tl::enums::InputChannel {
    tl::types::InputChannel {
        channel_id: target.id,
        access_hash: target.access_hash.unwrap_or(0),
    }
    .into()
}

fn input_location(locator: &FileLocator) -> tl::enums::InputFileLocation {
    match locator {
        FileLocator::Photo {
            id,
            access_hash,
            file_reference,
            thumb,
        } => tl::types::InputPhotoFileLocation {
            id: *id,
            access_hash: *access_hash,
            file_reference: file_reference.clone(),
            thumb_size: thumb.clone(),
        }
        .into(),
        FileLocator::Document {
            id,
            access_hash,
            file_reference,
        } => tl::types::InputDocumentFileLocation {
            id: *id,
            access_hash: *access_hash,
            file_reference: file_reference.clone(),
            thumb_size: String::new(),
        }
        .into(),
        FileLocator::PeerPhoto { peer, photo_id } => tl::types::InputPeerPhotoFileLocation {
            big: true,
            peer: input_peer(peer),
            photo_id: *photo_id,
        }
        .into(),
    }
}

impl Downloadable for FileLocator {
    fn to_raw_input_location(&self) -> Option<tl::enums::InputFileLocation> {
        Some(input_location(self))
    }
}

fn history_page(result: tl::enums::messages::Messages) -> HistoryPage {
    let (messages, users, chats, count) = match result {
        tl::enums::messages::Messages::Messages(m) => {
            let count = m.messages.len() as i32;
            (m.messages, m.users, m.chats, Some(count))
        }
        tl::enums::messages::Messages::Slice(m) => (m.messages, m.users, m.chats, Some(m.count)),
        tl::enums::messages::Messages::ChannelMessages(m) => {
            (m.messages, m.users, m.chats, Some(m.count))
        }
        tl::enums::messages::Messages::NotModified(m) => {
            (Vec::new(), Vec::new(), Vec::new(), Some(m.count))
        }
    };
    HistoryPage {
        messages: messages.iter().map(convert::history_item).collect(),
        users: users.iter().map(convert::user).collect(),
        chats: chats.iter().map(convert::chat).collect(),
        count,
    }
}

#[async_trait]
impl Remote for TgRemote {
    async fn resolve(&self, query: &str) -> RemoteResult<Entity> {
        let query = query.trim();
        if let Ok(id) = query.parse::<i64>() {
            return self.resolve_id(id).await;
        }
        let username = query
            .trim_start_matches("https://t.me/")
            .trim_start_matches('@');
        self.resolve_username(username).await
    }

    async fn get_history(
        &self,
        target: &EntityRef,
        offset_id: i32,
        offset_date: Option<DateTime<Utc>>,
        limit: i32,
    ) -> RemoteResult<HistoryPage> {
        let request = tl::functions::messages::GetHistory {
            peer: input_peer(target),
            offset_id,
            offset_date: offset_date.map(|d| d.timestamp() as i32).unwrap_or(0),
            add_offset: 0,
            limit,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };
        let result = self
            .invoke(&request, || format!("Failed to fetch history of {}", target.peer_id()))
            .await?;
        Ok(history_page(result))
    }

    async fn get_full_entity(&self, entity: &Entity) -> RemoteResult<FullEntity> {
        match entity {
            Entity::User(u) => {
                let request = tl::functions::users::GetFullUser {
                    id: tl::types::InputUser {
                        user_id: u.id,
                        access_hash: u.access_hash.unwrap_or(0),
                    }
                    .into(),
                };
                let result = self
                    .invoke(&request, || format!("Failed to get user info for {}", u.id))
                    .await?;
                let tl::types::users::UserFull {
                    full_user, users, ..
                } = result.into();
                let tl::enums::UserFull::Full(full) = full_user;
                let user = users
                    .iter()
                    .map(convert::user)
                    .find_map(|e| match e {
                        Entity::User(fresh) if fresh.id == u.id => Some(fresh),
                        _ => None,
                    })
                    .unwrap_or_else(|| u.clone());
                Ok(FullEntity::User {
                    user,
                    about: full.about.clone(),
                    common_chats_count: full.common_chats_count,
                    photo: full.profile_photo.as_ref().and_then(convert::photo),
                })
            }
            Entity::Channel(c) => {
                let request = tl::functions::channels::GetFullChannel {
                    channel: input_channel(&entity.to_ref()),
                };
                let result = self
                    .invoke(&request, || format!("Failed to get channel info for {}", c.id))
                    .await?;
                let tl::types::messages::ChatFull {
                    full_chat, chats, ..
                } = result.into();
                let channel = chats
                    .iter()
                    .map(convert::chat)
                    .find_map(|e| match e {
                        Entity::Channel(fresh) if fresh.id == c.id => Some(fresh),
                        _ => None,
                    })
                    .unwrap_or_else(|| c.clone());
                let (about, participants_count, photo) = match full_chat {
                    tl::enums::ChatFull::ChannelFull(f) => (
                        Some(f.about).filter(|a| !a.is_empty()),
                        f.participants_count,
                        convert::photo(&f.chat_photo),
                    ),
                    tl::enums::ChatFull::Full(f) => (
                        Some(f.about).filter(|a| !a.is_empty()),
                        None,
                        f.chat_photo.as_ref().and_then(convert::photo),
                    ),
                };
                Ok(FullEntity::Channel {
                    channel,
                    about,
                    participants_count,
                    photo,
                })
            }
            other => Err(RemoteError::Other(anyhow::anyhow!(
                "No full info available for {}",
                other.peer_id()
            ))),
        }
    }

    async fn get_participants(&self, target: &EntityRef) -> RemoteResult<Vec<PeerId>> {
        match target.kind {
            PeerKind::Channel => self.channel_participants(target).await,
            PeerKind::Chat => self.chat_participants(target).await,
            PeerKind::User => Ok(vec![target.peer_id()]),
        }
    }

    async fn get_admin_log(
        &self,
        target: &EntityRef,
        max_id: i64,
        query: &str,
        limit: i32,
    ) -> RemoteResult<AdminLogPage> {
        let request = tl::functions::channels::GetAdminLog {
            channel: input_channel(target),
            q: query.to_string(),
            events_filter: None,
            admins: None,
            max_id,
            min_id: 0,
            limit,
        };
        let result = self
            .invoke(&request, || format!("Failed to fetch admin log of {}", target.peer_id()))
            .await?;
        let tl::types::channels::AdminLogResults {
            events,
            chats,
            users,
            ..
        } = result.into();
        Ok(AdminLogPage {
            events: events.iter().map(convert::admin_event).collect(),
            users: users.iter().map(convert::user).collect(),
            chats: chats.iter().map(convert::chat).collect(),
        })
    }

    async fn download(&self, locator: &FileLocator, dest: &Path) -> RemoteResult<u64> {
        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            RemoteError::Other(
                anyhow::Error::new(e).context(format!("Failed to create {}", dest.display())),
            )
        })?;

        // DownloadIter follows FILE_MIGRATE and exports the authorization to
        // the file's DC on its own.
        let mut download = self.client.iter_download(locator);
        let mut written: u64 = 0;
        loop {
            let chunk = download.next().await.map_err(|e| {
                RemoteError::from_invocation(e, || format!("Failed to download {}", dest.display()))
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| RemoteError::Other(e.into()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| RemoteError::Other(e.into()))?;
        Ok(written)
    }
}
