//! Deferred resolution of entities discovered while paging.
//!
//! History and admin log pages carry lightweight user/chat/channel payloads.
//! Fetching full info for each costs one request, so ids are queued here and
//! resolved one at a time between pages, then drained at the end of a run.

use crate::archive::{Archive, EntityRecord, MediaRecord};
use crate::model::{Entity, FullEntity, Media, MediaKind, PeerId, ProfilePhoto};
use crate::remote::Remote;
use crate::sync::media::{MediaCapture, PhotoSource};
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Recommended pause after a full-info request.
const FULL_INFO_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    Pending,
    Dumped,
}

/// What `offer` does with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Unusable record, or fetching full info is known to fail.
    Drop,
    /// The discovery payload is already complete.
    DumpNow,
    Enqueue,
}

pub fn admission(entity: &Entity) -> Admission {
    match entity {
        Entity::User(u) if u.deleted || u.min => Admission::Drop,
        Entity::User(_) => Admission::Enqueue,
        Entity::Chat(_) => Admission::DumpNow,
        // GetFullChannel on a left channel fails with CHANNEL_PRIVATE.
        Entity::Channel(c) if c.left => Admission::Drop,
        Entity::Channel(_) => Admission::Enqueue,
        Entity::Unavailable { .. } => Admission::Drop,
    }
}

#[derive(Debug, Default)]
pub struct EntityQueue {
    states: HashMap<PeerId, EntityState>,
    pending: VecDeque<Entity>,
    dumped: usize,
}

impl EntityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities waiting for their full-info fetch.
    pub fn size(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn dumped_count(&self) -> usize {
        self.dumped
    }

    pub fn total_seen(&self) -> usize {
        self.states.len()
    }

    pub async fn offer<'e, R, A>(
        &mut self,
        entities: impl IntoIterator<Item = &'e Entity>,
        remote: &R,
        archive: &mut A,
        media: &mut MediaCapture,
    ) -> Result<()>
    where
        R: Remote + ?Sized,
        A: Archive + ?Sized,
    {
        for entity in entities {
            let id = entity.peer_id();
            if self.states.contains_key(&id) {
                continue;
            }
            match admission(entity) {
                Admission::Drop => {
                    log::trace!("Dropping entity {} from the queue", id);
                }
                Admission::DumpNow => {
                    let photo_id =
                        persist_profile_photo(entity, entity.profile_photo(), remote, archive, media)
                            .await?;
                    archive
                        .upsert_entity(&EntityRecord::from_entity(entity, photo_id))
                        .await?;
                    self.states.insert(id, EntityState::Dumped);
                    self.dumped += 1;
                }
                Admission::Enqueue => {
                    self.states.insert(id, EntityState::Pending);
                    self.pending.push_back(entity.clone());
                }
            }
        }
        Ok(())
    }

    /// Resolve the oldest pending entity. Returns the pause recommended
    /// before the next request, or `None` if nothing was pending.
    pub async fn pop_one<R, A>(
        &mut self,
        remote: &R,
        archive: &mut A,
        media: &mut MediaCapture,
    ) -> Result<Option<Duration>>
    where
        R: Remote + ?Sized,
        A: Archive + ?Sized,
    {
        let Some(entity) = self.pending.pop_front() else {
            return Ok(None);
        };
        let id = entity.peer_id();

        // Until the entity row is written the entity stays at the front.
        if let Err(e) = dump_full(&entity, remote, archive, media).await {
            self.pending.push_front(entity);
            return Err(e);
        }

        self.states.insert(id, EntityState::Dumped);
        self.dumped += 1;
        log::debug!("Dumped full info for {} ({} pending)", id, self.pending.len());
        Ok(Some(FULL_INFO_DELAY))
    }

    #[cfg(test)]
    fn is_pending(&self, id: PeerId) -> bool {
        self.states.get(&id) == Some(&EntityState::Pending)
    }

    #[cfg(test)]
    fn is_dumped(&self, id: PeerId) -> bool {
        self.states.get(&id) == Some(&EntityState::Dumped)
    }
}

async fn dump_full<R, A>(
    entity: &Entity,
    remote: &R,
    archive: &mut A,
    media: &mut MediaCapture,
) -> Result<()>
where
    R: Remote + ?Sized,
    A: Archive + ?Sized,
{
    let full = remote.get_full_entity(entity).await.map_err(|e| {
        anyhow::Error::new(e).context(format!("Failed to fetch full info for {}", entity.peer_id()))
    })?;

    let photo = match &full {
        FullEntity::User { photo, .. } | FullEntity::Channel { photo, .. } => photo.as_ref(),
    };
    let mut photo_id = None;
    if let Some(photo) = photo {
        let outcome = media
            .capture_photo(remote, PhotoSource::Full(photo), entity, None)
            .await?;
        let media_photo = Media::Photo(photo.clone());
        if let Some(record) =
            MediaRecord::from_media(&media_photo, MediaKind::ChatPhoto, outcome.local_path())
        {
            photo_id = Some(archive.upsert_media(&record).await?);
        }
    }
    archive
        .upsert_entity(&EntityRecord::from_full(&full, photo_id))
        .await?;
    Ok(())
}

async fn persist_profile_photo<R, A>(
    owner: &Entity,
    photo: Option<&ProfilePhoto>,
    remote: &R,
    archive: &mut A,
    media: &mut MediaCapture,
) -> Result<Option<i64>>
where
    R: Remote + ?Sized,
    A: Archive + ?Sized,
{
    let Some(photo) = photo else {
        return Ok(None);
    };
    let outcome = media
        .capture_photo(remote, PhotoSource::Profile(photo), owner, None)
        .await?;
    let record = MediaRecord {
        remote_id: photo.photo_id,
        kind: MediaKind::ChatPhoto,
        mime_type: Some("image/jpeg".to_string()),
        name: None,
        size: None,
        date: None,
        local_path: outcome.local_path(),
    };
    Ok(Some(archive.upsert_media(&record).await?))
}
