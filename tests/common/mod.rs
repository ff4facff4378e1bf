//! Shared fakes for orchestration tests: a scripted extraction engine, a
//! recording chat transport and a controllable relay agent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use fetchbot::config::Config;
use fetchbot::extractor::{
    Artifact, Download, ExtractError, FormatKind, FormatOption, FormatSelector, MediaExtractor,
    MediaKind, ProbeInfo, Quality,
};
use fetchbot::progress::{ProgressEvent, ProgressStage};
use fetchbot::render::Locale;
use fetchbot::transport::{
    ChatTransport, FileHandle, MessageRef, RelayTransport, SentMessage, TransportError,
};
use fetchbot::{Orchestrator, SubmitRequest};

/// Config tuned for tests: no cooldown, no ceilings, short relay wait.
pub fn test_config() -> Config {
    Config {
        user_cooldown_secs: 0,
        max_active_jobs: 0,
        max_jobs_per_scope: 0,
        relay_timeout_secs: 1,
        ..Config::default()
    }
}

pub fn probe_info(title: &str) -> ProbeInfo {
    ProbeInfo {
        title: title.to_string(),
        duration_secs: Some(212),
        page_url: "https://example.com/v/1".into(),
        options: vec![FormatOption {
            kind: FormatKind::VideoAudio,
            quality: Quality::Best,
            label: "🎥 Best".into(),
            size_hint: Some(10 * 1024 * 1024),
            height: Some(1080),
            audio_bitrate: None,
        }],
    }
}

/// What the scripted extractor should produce for the next download call.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    /// Reported artifact size; `None` skips the artifact entirely.
    pub artifact_size: Option<u64>,
    pub direct_url: Option<String>,
    pub title: String,
    /// Blocking delay inside the call, so other requests can pile up on the
    /// running job.
    pub hold_ms: u64,
    /// `(bytes_done, bytes_total)` downloading events to emit.
    pub events: Vec<(u64, Option<u64>)>,
    pub fail: Option<ExtractError>,
}

impl Default for DownloadPlan {
    fn default() -> Self {
        Self {
            artifact_size: Some(5 * 1024 * 1024),
            direct_url: None,
            title: "Big Buck Bunny".into(),
            hold_ms: 0,
            events: Vec::new(),
            fail: None,
        }
    }
}

pub struct FakeExtractor {
    pub probe_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub probe_result: Mutex<Result<ProbeInfo, ExtractError>>,
    pub plan: Mutex<DownloadPlan>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            probe_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            probe_result: Mutex::new(Ok(probe_info("Big Buck Bunny"))),
            plan: Mutex::new(DownloadPlan::default()),
        }
    }

    pub fn set_plan(&self, plan: DownloadPlan) {
        *self.plan.lock().unwrap() = plan;
    }

    pub fn set_probe_result(&self, result: Result<ProbeInfo, ExtractError>) {
        *self.probe_result.lock().unwrap() = result;
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }
}

impl MediaExtractor for FakeExtractor {
    fn probe(&self, _url: &str) -> Result<ProbeInfo, ExtractError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe_result.lock().unwrap().clone()
    }

    fn download(
        &self,
        _url: &str,
        _selector: FormatSelector,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<Download, ExtractError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plan.lock().unwrap().clone();
        if plan.hold_ms > 0 {
            std::thread::sleep(Duration::from_millis(plan.hold_ms));
        }
        for (done, total) in &plan.events {
            let _ = progress.send(ProgressEvent {
                stage: ProgressStage::Downloading,
                bytes_done: *done,
                bytes_total: *total,
                rate: Some(1024.0 * 1024.0),
                eta_secs: Some(10),
            });
        }
        if let Some(err) = plan.fail {
            return Err(err);
        }
        let artifact = match plan.artifact_size {
            Some(size) => {
                let dir =
                    tempfile::tempdir().map_err(|e| ExtractError::Download(e.to_string()))?;
                let path = dir.path().join("media.bin");
                std::fs::write(&path, b"test media")
                    .map_err(|e| ExtractError::Download(e.to_string()))?;
                Some(Artifact {
                    dir,
                    path,
                    size,
                    kind: MediaKind::Video,
                })
            }
            None => None,
        };
        Ok(Download {
            artifact,
            title: plan.title,
            direct_url: plan.direct_url,
        })
    }
}

/// Everything the fake chat client observed, in call order.
#[derive(Debug, Clone)]
pub enum Sent {
    Text {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Edit {
        message_id: i64,
        text: String,
    },
    File {
        chat_id: i64,
        message_id: i64,
        caption: String,
        reply_to: Option<i64>,
    },
    Cached {
        chat_id: i64,
        handle: String,
        caption: String,
    },
    Copy {
        from_message: i64,
        to_chat: i64,
        caption: String,
    },
}

pub struct RecordingTransport {
    next_id: AtomicI64,
    pub sent: Mutex<Vec<Sent>>,
    pub fail_send_file: AtomicBool,
    pub fail_send_cached: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            fail_send_file: AtomicBool::new(false),
            fail_send_cached: AtomicBool::new(false),
        }
    }

    fn next_message(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub fn records(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits_for(&self, message_id: i64) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit {
                    message_id: m,
                    text,
                } if m == message_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_edit_for(&self, message_id: i64) -> Option<String> {
        self.edits_for(message_id).pop()
    }

    pub fn files_sent(&self) -> Vec<Sent> {
        self.records()
            .into_iter()
            .filter(|s| matches!(s, Sent::File { .. }))
            .collect()
    }

    pub fn cached_sends(&self) -> usize {
        self.records()
            .iter()
            .filter(|s| matches!(s, Sent::Cached { .. }))
            .count()
    }

    pub fn copies(&self) -> Vec<Sent> {
        self.records()
            .into_iter()
            .filter(|s| matches!(s, Sent::Copy { .. }))
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError> {
        let m = self.next_message(chat_id);
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            message_id: m.message_id,
            text: text.to_string(),
        });
        Ok(m)
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            message_id: message.message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: i64,
        _path: &Path,
        _kind: MediaKind,
        caption: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<SentMessage, TransportError> {
        if self.fail_send_file.load(Ordering::SeqCst) {
            return Err(TransportError::Send("scripted send failure".into()));
        }
        let m = self.next_message(chat_id);
        self.sent.lock().unwrap().push(Sent::File {
            chat_id,
            message_id: m.message_id,
            caption: caption.to_string(),
            reply_to: reply_to.map(|r| r.message_id),
        });
        Ok(SentMessage {
            message: m,
            file_handle: Some(FileHandle(format!("file-{}", m.message_id))),
        })
    }

    async fn send_cached(
        &self,
        chat_id: i64,
        handle: &FileHandle,
        _kind: MediaKind,
        caption: &str,
    ) -> Result<SentMessage, TransportError> {
        if self.fail_send_cached.load(Ordering::SeqCst) {
            return Err(TransportError::Send("scripted cached-send failure".into()));
        }
        let m = self.next_message(chat_id);
        self.sent.lock().unwrap().push(Sent::Cached {
            chat_id,
            handle: handle.0.clone(),
            caption: caption.to_string(),
        });
        Ok(SentMessage {
            message: m,
            file_handle: Some(handle.clone()),
        })
    }

    async fn copy_message(
        &self,
        from: MessageRef,
        to_chat: i64,
        caption: &str,
    ) -> Result<SentMessage, TransportError> {
        let m = self.next_message(to_chat);
        self.sent.lock().unwrap().push(Sent::Copy {
            from_message: from.message_id,
            to_chat,
            caption: caption.to_string(),
        });
        Ok(SentMessage {
            message: m,
            file_handle: Some(FileHandle(format!("copy-{}", m.message_id))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Handoff {
    pub caption: String,
    pub token: String,
    pub path: PathBuf,
    /// Whether the artifact was still on disk at handoff time.
    pub path_existed: bool,
}

pub struct FakeRelay {
    pub handoffs: Mutex<Vec<Handoff>>,
    pub accept: AtomicBool,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self {
            handoffs: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
        }
    }

    pub fn handoff_count(&self) -> usize {
        self.handoffs.lock().unwrap().len()
    }

    pub fn last_handoff(&self) -> Option<Handoff> {
        self.handoffs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RelayTransport for FakeRelay {
    async fn relay_deliver(
        &self,
        path: &Path,
        _kind: MediaKind,
        caption: &str,
        correlation_token: &str,
        _progress: UnboundedSender<ProgressEvent>,
    ) -> Result<(), TransportError> {
        if !self.accept.load(Ordering::SeqCst) {
            return Err(TransportError::Relay("agent offline".into()));
        }
        self.handoffs.lock().unwrap().push(Handoff {
            caption: caption.to_string(),
            token: correlation_token.to_string(),
            path: path.to_path_buf(),
            path_existed: path.exists(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub extractor: Arc<FakeExtractor>,
    pub transport: Arc<RecordingTransport>,
    pub relay: Option<Arc<FakeRelay>>,
}

pub fn harness(config: Config, with_relay: bool) -> Harness {
    let extractor = Arc::new(FakeExtractor::new());
    let transport = Arc::new(RecordingTransport::new());
    let relay = if with_relay {
        Some(Arc::new(FakeRelay::new()))
    } else {
        None
    };

    let extractor_dyn: Arc<dyn MediaExtractor> = extractor.clone();
    let chat_dyn: Arc<dyn ChatTransport> = transport.clone();
    let relay_dyn: Option<Arc<dyn RelayTransport>> =
        relay.clone().map(|r| r as Arc<dyn RelayTransport>);

    let orchestrator = Orchestrator::new(config, extractor_dyn, chat_dyn, relay_dyn);
    Harness {
        orchestrator,
        extractor,
        transport,
        relay,
    }
}

/// A submit request for `url` in `scope`, with distinct origin/status ids.
pub fn request(user_id: i64, scope_id: i64, url: &str, origin_id: i64) -> SubmitRequest {
    SubmitRequest {
        user_id,
        scope_id,
        url: url.to_string(),
        selector: FormatSelector {
            kind: FormatKind::VideoAudio,
            quality: Quality::Best,
        },
        origin: MessageRef {
            chat_id: scope_id,
            message_id: origin_id,
        },
        status: MessageRef {
            chat_id: scope_id,
            message_id: origin_id + 1,
        },
        locale: Locale::En,
    }
}

/// Poll `cond` until it holds or `timeout` passes; true when it held.
pub async fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
