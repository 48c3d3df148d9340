//! Validated run settings built from command-line flags.

use crate::model::MediaKind;
use crate::sync::media::MediaFilter;
use anyhow::Result;
use std::time::Duration;

/// Largest page Telegram serves for `messages.getHistory`.
pub const MAX_CHUNK_SIZE: i32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Messages requested per page.
    pub chunk_size: i32,
    /// Pages per run, 0 for no limit.
    pub max_chunks: u32,
    /// Minimum gap between consecutive remote calls.
    pub interval: Duration,
}

impl SyncConfig {
    pub fn new(chunk_size: i32, max_chunks: u32, interval: Duration) -> Result<Self> {
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            anyhow::bail!(
                "Chunk size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            max_chunks,
            interval,
        })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            max_chunks: 0,
            interval: Duration::from_secs(1),
        }
    }
}

/// Parse a comma-separated media whitelist such as `photo, voice`.
pub fn parse_media_types(list: &str) -> Result<Vec<MediaKind>> {
    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| {
            MediaKind::parse(&s).ok_or_else(|| {
                let valid: Vec<&str> = MediaKind::ALL
                    .iter()
                    .filter(|k| **k != MediaKind::Unknown)
                    .map(|k| k.as_str())
                    .collect();
                anyhow::anyhow!("Unknown media type '{}'. Valid types: {}", s, valid.join(", "))
            })
        })
        .collect()
}

pub fn media_filter(types: Option<&str>, max_size: u64) -> Result<MediaFilter> {
    let kinds = match types {
        Some(list) => parse_media_types(list)?,
        None => Vec::new(),
    };
    Ok(MediaFilter::new(kinds, max_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_media_whitelist() {
        let kinds = parse_media_types(" Photo,voice ,,chatphoto").unwrap();
        assert_eq!(
            kinds,
            vec![MediaKind::Photo, MediaKind::Voice, MediaKind::ChatPhoto]
        );
    }

    #[test]
    fn rejects_unknown_media_type() {
        let err = parse_media_types("photo,gif").unwrap_err();
        assert!(err.to_string().contains("Unknown media type 'gif'"));
    }

    #[test]
    fn chunk_size_is_bounded() {
        assert!(SyncConfig::new(0, 0, Duration::ZERO).is_err());
        assert!(SyncConfig::new(101, 0, Duration::ZERO).is_err());
        assert_eq!(SyncConfig::new(50, 3, Duration::ZERO).unwrap().chunk_size, 50);
    }

    #[test]
    fn empty_whitelist_allows_everything() {
        let filter = media_filter(None, 10).unwrap();
        assert!(filter.allows(MediaKind::Sticker, Some(5)));
        assert!(!filter.allows_chat_photos());
    }
}
