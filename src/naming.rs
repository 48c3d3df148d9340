//! Destination paths for downloaded media.

use crate::model::{MediaKind, PeerId};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;

pub const DEFAULT_TEMPLATE: &str = "usermedia/{name}-{context_id}/{type}-{filename}{ext}";

/// Everything a naming policy may use to place a blob.
#[derive(Debug, Clone)]
pub struct MediaName {
    /// Message id, event id, or photo id for profile photos.
    pub id: i64,
    pub context_id: PeerId,
    pub sender_id: Option<PeerId>,
    pub kind: MediaKind,
    pub name: String,
    pub sender_name: String,
    /// Original file name, if the media carried one.
    pub filename: Option<String>,
    /// Extension including the leading dot.
    pub ext: String,
    pub date: DateTime<Utc>,
}

pub trait NamingPolicy: Send + Sync {
    fn path_for(&self, media: &MediaName) -> PathBuf;
}

/// Template-driven naming. The template is first run through strftime with
/// the media date, then `{placeholder}`s are substituted.
#[derive(Debug, Clone)]
pub struct TemplateNaming {
    root: PathBuf,
    template: String,
}

impl TemplateNaming {
    pub fn new(root: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            template: template.into(),
        }
    }

    fn lookup(&self, media: &MediaName, key: &str) -> String {
        match key {
            "id" => media.id.to_string(),
            "context_id" => media.context_id.to_string(),
            "sender_id" => media.sender_id.map(|s| s.marked()).unwrap_or(0).to_string(),
            "type" => media.kind.as_str().to_string(),
            "name" => non_empty_or_unknown(&media.name),
            "sender_name" => non_empty_or_unknown(&media.sender_name),
            "filename" => media.filename.clone().unwrap_or_else(|| {
                media
                    .date
                    .format(&format!("{}_%Y-%m-%d_%H-%M-%S", media.kind))
                    .to_string()
            }),
            "ext" => media.ext.clone(),
            _ => String::new(),
        }
    }
}

impl NamingPolicy for TemplateNaming {
    fn path_for(&self, media: &MediaName) -> PathBuf {
        let mut dated = String::new();
        if write!(dated, "{}", media.date.format(&self.template)).is_err() {
            // Stray '%' sequences; keep the template verbatim.
            dated = self.template.clone();
        }

        let mut out = String::with_capacity(dated.len());
        let mut rest = dated.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    out.push_str(&sanitize(&self.lookup(media, &after[..close])));
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);

        if !out.ends_with(&media.ext) {
            if out.ends_with('.') {
                out.pop();
            }
            out.push_str(&media.ext);
        }
        self.root.join(out)
    }
}

fn non_empty_or_unknown(s: &str) -> String {
    if s.is_empty() {
        "unknown".to_string()
    } else {
        s.to_string()
    }
}

/// Substituted values must not introduce directories of their own.
fn sanitize(value: &str) -> String {
    if value == "." || value == ".." {
        return "_".to_string();
    }
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
