//! Media classification and blob capture.

use crate::model::{DocumentAttribute, Entity, FileLocator, Media, MediaKind, Message, Photo, ProfilePhoto};
use crate::naming::{MediaName, NamingPolicy};
use crate::remote::Remote;
use crate::sync::rate::RateScheduler;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;

/// Map a media payload onto the fixed taxonomy.
///
/// Documents are classified by the first attribute that decides the kind;
/// anything without a deciding attribute is a plain document.
pub fn classify(media: &Media) -> MediaKind {
    match media {
        Media::Photo(_) => MediaKind::Photo,
        Media::Document(doc) => doc
            .attributes
            .iter()
            .find_map(|attr| match attr {
                DocumentAttribute::Sticker => Some(MediaKind::Sticker),
                DocumentAttribute::Video { .. } => Some(MediaKind::Video),
                DocumentAttribute::Audio { voice: true, .. } => Some(MediaKind::Voice),
                DocumentAttribute::Audio { voice: false, .. } => Some(MediaKind::Audio),
                DocumentAttribute::Filename(_)
                | DocumentAttribute::Animated
                | DocumentAttribute::ImageSize { .. }
                | DocumentAttribute::Other => None,
            })
            .unwrap_or(MediaKind::Document),
        Media::Unsupported { .. } => MediaKind::Unknown,
    }
}

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("video/mp4", ".mp4"),
    ("video/quicktime", ".mov"),
    ("video/webm", ".webm"),
    ("audio/mpeg", ".mp3"),
    ("audio/ogg", ".ogg"),
    ("audio/mp4", ".m4a"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/x-tgsticker", ".tgs"),
    ("text/plain", ".txt"),
];

/// File extension (with the dot) to store `media` under.
pub fn extension_for(media: &Media) -> String {
    match media {
        Media::Photo(_) => ".jpg".to_string(),
        Media::Document(doc) => {
            if let Some(ext) = doc
                .file_name()
                .and_then(|n| n.rsplit_once('.'))
                .map(|(_, ext)| ext)
                .filter(|ext| !ext.is_empty() && ext.len() <= 8)
            {
                return format!(".{}", ext.to_lowercase());
            }
            MIME_EXTENSIONS
                .iter()
                .find(|(mime, _)| *mime == doc.mime_type)
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_else(|| ".bin".to_string())
        }
        Media::Unsupported { .. } => ".bin".to_string(),
    }
}

/// Which media kinds get their blobs downloaded.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    kinds: HashSet<MediaKind>,
    max_size: u64,
}

impl MediaFilter {
    /// An empty `kinds` set allows every message media kind. A non-empty set
    /// always lets `unknown` through. `max_size == 0` disables downloads.
    pub fn new(kinds: impl IntoIterator<Item = MediaKind>, max_size: u64) -> Self {
        let mut kinds: HashSet<MediaKind> = kinds.into_iter().collect();
        if !kinds.is_empty() {
            kinds.insert(MediaKind::Unknown);
        }
        Self { kinds, max_size }
    }

    pub fn disabled() -> Self {
        Self::new([], 0)
    }

    pub fn enabled(&self) -> bool {
        self.max_size > 0
    }

    pub fn allows(&self, kind: MediaKind, size: Option<i64>) -> bool {
        if !self.enabled() {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        match size {
            Some(size) => size.max(0) as u64 <= self.max_size,
            None => true,
        }
    }

    /// Profile and chat photos are only fetched when asked for by name.
    pub fn allows_chat_photos(&self) -> bool {
        self.enabled() && self.kinds.contains(&MediaKind::ChatPhoto)
    }
}

/// Result of trying to put one blob on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Downloaded(PathBuf),
    /// The target path already existed, nothing was fetched.
    AlreadyPresent(PathBuf),
    /// Filtered out or nothing downloadable.
    Skipped,
    /// The download failed; the metadata is still archived.
    Failed(String),
}

impl CaptureOutcome {
    pub fn local_path(&self) -> Option<String> {
        match self {
            CaptureOutcome::Downloaded(p) | CaptureOutcome::AlreadyPresent(p) => {
                Some(p.to_string_lossy().into_owned())
            }
            CaptureOutcome::Skipped | CaptureOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub downloaded: u64,
    pub already_present: u64,
    pub failed: u64,
}

/// A photo that belongs to a peer rather than to a message.
#[derive(Debug, Clone, Copy)]
pub enum PhotoSource<'a> {
    /// Full photo from a full-info response or a service action.
    Full(&'a Photo),
    /// Small photo reference from a discovery payload.
    Profile(&'a ProfilePhoto),
}

pub struct MediaCapture {
    naming: Box<dyn NamingPolicy>,
    filter: MediaFilter,
    scheduler: RateScheduler,
    stats: CaptureStats,
}

impl MediaCapture {
    pub fn new(naming: Box<dyn NamingPolicy>, filter: MediaFilter, scheduler: RateScheduler) -> Self {
        Self {
            naming,
            filter,
            scheduler,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Whether this message's attachment passes the configured filter.
    pub fn wants(&self, media: &Media) -> bool {
        let size = match media {
            Media::Photo(p) => p.size,
            Media::Document(d) => Some(d.size),
            Media::Unsupported { .. } => return false,
        };
        self.filter.allows(classify(media), size)
    }

    pub async fn capture_message_media<R: Remote + ?Sized>(
        &mut self,
        remote: &R,
        msg: &Message,
        context: &Entity,
        sender: Option<&Entity>,
    ) -> Result<CaptureOutcome> {
        let Some(media) = msg.media.as_ref() else {
            return Ok(CaptureOutcome::Skipped);
        };
        if !self.wants(media) {
            return Ok(CaptureOutcome::Skipped);
        }
        let locator = match media {
            Media::Photo(p) => FileLocator::from(p),
            Media::Document(d) => FileLocator::from(d),
            Media::Unsupported { .. } => return Ok(CaptureOutcome::Skipped),
        };
        let filename = match media {
            Media::Document(d) => d.file_name().map(str::to_string),
            Media::Photo(_) | Media::Unsupported { .. } => None,
        };
        let name = MediaName {
            id: msg.id as i64,
            context_id: context.peer_id(),
            sender_id: msg.sender,
            kind: classify(media),
            name: context.display_name(),
            sender_name: sender.map(Entity::display_name).unwrap_or_default(),
            filename,
            ext: extension_for(media),
            date: msg.date,
        };
        self.fetch(remote, &locator, &name).await
    }

    /// Download a profile/chat photo. `known_id` names the file after a
    /// message or event id instead of the photo id.
    pub async fn capture_photo<R: Remote + ?Sized>(
        &mut self,
        remote: &R,
        photo: PhotoSource<'_>,
        owner: &Entity,
        known_id: Option<i64>,
    ) -> Result<CaptureOutcome> {
        if !self.filter.allows_chat_photos() {
            return Ok(CaptureOutcome::Skipped);
        }
        // Profile references carry no date, so their names must not depend on one.
        let (locator, photo_id, date, filename): (FileLocator, i64, DateTime<Utc>, String) =
            match photo {
                PhotoSource::Full(p) => (
                    FileLocator::from(p),
                    p.id,
                    p.date,
                    p.date.format("chatphoto_%Y-%m-%d_%H-%M-%S").to_string(),
                ),
                PhotoSource::Profile(p) => (
                    FileLocator::PeerPhoto {
                        peer: owner.to_ref(),
                        photo_id: p.photo_id,
                    },
                    p.photo_id,
                    DateTime::<Utc>::UNIX_EPOCH,
                    format!("chatphoto_{}", p.photo_id),
                ),
            };
        let name = MediaName {
            id: known_id.unwrap_or(photo_id),
            context_id: owner.peer_id(),
            sender_id: Some(owner.peer_id()),
            kind: MediaKind::ChatPhoto,
            name: owner.display_name(),
            sender_name: owner.display_name(),
            filename: Some(filename),
            ext: ".jpg".to_string(),
            date,
        };
        self.fetch(remote, &locator, &name).await
    }

    async fn fetch<R: Remote + ?Sized>(
        &mut self,
        remote: &R,
        locator: &FileLocator,
        name: &MediaName,
    ) -> Result<CaptureOutcome> {
        let path = self.naming.path_for(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::debug!("Skipping existing file {}", path.display());
            self.stats.already_present += 1;
            return Ok(CaptureOutcome::AlreadyPresent(path));
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("Cannot create {}: {}", parent.display(), e);
                self.stats.failed += 1;
                return Ok(CaptureOutcome::Failed(e.to_string()));
            }
        }

        log::info!("Downloading {} to {}", name.kind, path.display());
        match self.scheduler.gate(remote.download(locator, &path)).await {
            Ok(bytes) => {
                log::debug!("Downloaded {} bytes to {}", bytes, path.display());
                self.stats.downloaded += 1;
                Ok(CaptureOutcome::Downloaded(path))
            }
            Err(e) => {
                // A partial file would later be mistaken for a finished one.
                let _ = tokio::fs::remove_file(&path).await;
                if e.is_rate_limited() {
                    return Err(e.into());
                }
                log::warn!("Failed to download {} ({}): {}", path.display(), name.kind, e);
                self.stats.failed += 1;
                Ok(CaptureOutcome::Failed(e.to_string()))
            }
        }
    }
}
