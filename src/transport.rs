//! Chat and relay transport boundaries.
//!
//! The embedding frontend owns the actual platform client; the orchestrator
//! talks to it through these traits. Everything here is async and object
//! safe so implementations can live behind `Arc<dyn ...>`.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::extractor::MediaKind;
use crate::progress::ProgressEvent;
use tokio::sync::mpsc::UnboundedSender;

/// Identifier of one chat-platform message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Platform handle for an uploaded file, reusable for cheap re-sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle(pub String);

/// A sent message plus the file handle the platform assigned, when any.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: MessageRef,
    pub file_handle: Option<FileHandle>,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("edit failed: {0}")]
    Edit(String),
    #[error("relay handoff failed: {0}")]
    Relay(String),
}

/// Primary chat channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError>;

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError>;

    /// Upload a local file into a chat, replying to `reply_to` when given.
    async fn send_file(
        &self,
        chat_id: i64,
        path: &Path,
        kind: MediaKind,
        caption: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<SentMessage, TransportError>;

    /// Re-send a previously uploaded file by its platform handle.
    async fn send_cached(
        &self,
        chat_id: i64,
        handle: &FileHandle,
        kind: MediaKind,
        caption: &str,
    ) -> Result<SentMessage, TransportError>;

    /// Copy an existing message into another chat, replacing its caption.
    async fn copy_message(
        &self,
        from: MessageRef,
        to_chat: i64,
        caption: &str,
    ) -> Result<SentMessage, TransportError>;
}

/// Secondary transport for files above the direct upload ceiling.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Hand a local file to the relay agent. Returns once the handoff is
    /// accepted; delivery completion arrives later through the inbound
    /// stream as a message tagged with `correlation_token`. Upload progress
    /// may be reported through `progress` while the handoff runs.
    async fn relay_deliver(
        &self,
        path: &Path,
        kind: MediaKind,
        caption: &str,
        correlation_token: &str,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<(), TransportError>;
}
