//! Extraction engine boundary.
//!
//! The engine that turns a URL into metadata or a local media file is a
//! collaborator supplied by the embedding frontend (typically a wrapper
//! around an external extractor process). Both calls block and are only ever
//! invoked on the bounded worker pool. Download progress is handed out
//! through an unbounded channel so the engine can report from whatever
//! thread it likes.

use std::path::PathBuf;

use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::progress::ProgressEvent;

/// Which tracks the requester wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// Video with audio muxed in.
    VideoAudio,
    /// Video track only.
    Video,
    /// Audio track only.
    Audio,
}

impl FormatKind {
    /// Short tag used in callback data.
    pub fn as_tag(&self) -> &'static str {
        match self {
            FormatKind::VideoAudio => "va",
            FormatKind::Video => "v",
            FormatKind::Audio => "a",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "va" => Some(FormatKind::VideoAudio),
            "v" => Some(FormatKind::Video),
            "a" => Some(FormatKind::Audio),
            _ => None,
        }
    }
}

/// Quality ceiling for format resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Best,
    P1080,
    P720,
    P480,
    P360,
}

impl Quality {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080",
            Quality::P720 => "720",
            Quality::P480 => "480",
            Quality::P360 => "360",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "best" => Some(Quality::Best),
            "1080" => Some(Quality::P1080),
            "720" => Some(Quality::P720),
            "480" => Some(Quality::P480),
            "360" => Some(Quality::P360),
            _ => None,
        }
    }
}

/// Kind + quality pair the engine resolves to a concrete format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatSelector {
    pub kind: FormatKind,
    pub quality: Quality,
}

/// How a delivered file should be presented by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Document,
}

/// One selectable format discovered by a probe.
#[derive(Debug, Clone)]
pub struct FormatOption {
    pub kind: FormatKind,
    pub quality: Quality,
    /// Human label for the selection menu ("720p · 42 MB").
    pub label: String,
    pub size_hint: Option<u64>,
    pub height: Option<u32>,
    pub audio_bitrate: Option<u32>,
}

/// Metadata a probe extracts without downloading.
#[derive(Debug, Clone)]
pub struct ProbeInfo {
    pub title: String,
    pub duration_secs: Option<u64>,
    pub page_url: String,
    pub options: Vec<FormatOption>,
}

/// Downloaded media on local disk. Owns its temp dir, so dropping the
/// artifact removes the storage.
#[derive(Debug)]
pub struct Artifact {
    pub dir: TempDir,
    pub path: PathBuf,
    pub size: u64,
    pub kind: MediaKind,
}

/// Outcome of a download call. The artifact is absent when the engine could
/// only resolve a remote link; `direct_url` is a plain link to the media that
/// can stand in for the file itself.
#[derive(Debug)]
pub struct Download {
    pub artifact: Option<Artifact>,
    pub title: String,
    pub direct_url: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("unsupported or malformed URL: {0}")]
    BadUrl(String),
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("extraction worker crashed: {0}")]
    Worker(String),
}

/// Blocking extraction engine. Implementations must be callable from worker
/// threads; they never run on the async scheduler directly.
pub trait MediaExtractor: Send + Sync {
    /// Inspect a URL and report title, duration and available formats.
    fn probe(&self, url: &str) -> Result<ProbeInfo, ExtractError>;

    /// Fetch the media selected by `selector`, reporting byte progress
    /// through `progress` as it goes.
    fn download(
        &self,
        url: &str,
        selector: FormatSelector,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<Download, ExtractError>;
}

/// Validate a URL and normalise it for use as a job/cache key.
pub fn normalize_url(input: &str) -> Result<String, ExtractError> {
    let trimmed = input.trim();
    let parsed =
        Url::parse(trimmed).map_err(|e| ExtractError::BadUrl(format!("{trimmed}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(ExtractError::BadUrl(format!(
            "unsupported scheme {other}: {trimmed}"
        ))),
    }
}

/// Pull the first http(s) URL out of free-form message text.
pub fn first_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|w| w.starts_with("http://") || w.starts_with("https://"))
        .and_then(|w| normalize_url(w).ok())
}
