//! Delivery pipeline: direct transport, relay fallback, link fallback.
//!
//! A finished download moves through up to three attempts. Files under the
//! direct ceiling are uploaded straight into the scope's chat. Oversized
//! files go to the relay agent, which uploads them on its own connection;
//! the pipeline parks on a correlation rendezvous until the agent's message
//! arrives and is copied over. When no transport can carry the file, a plain
//! link is the last resort. Success in either file path populates the
//! delivery cache so repeat requests skip extraction entirely.
//!
//! The pipeline owns the artifact for its whole run. Temp storage is purged
//! when the artifact drops at a terminal transition; holding it across the
//! relay rendezvous is what defers cleanup until confirmation or timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::cache::ExpiringCache;
use crate::extractor::{Artifact, Download, MediaKind};
use crate::progress::ProgressEvent;
use crate::registry::JobKey;
use crate::relay::{self, PendingRelays};
use crate::render;
use crate::token;
use crate::transport::{ChatTransport, FileHandle, MessageRef, RelayTransport, TransportError};

/// A completed delivery remembered for repeat requests.
#[derive(Debug, Clone)]
pub enum DeliveryCacheEntry {
    /// The file reached the chat; the platform handle re-sends it cheaply.
    File {
        handle: FileHandle,
        kind: MediaKind,
        caption: String,
    },
    /// Only a plain link was delivered; the caption still names the media.
    Link { url: String, caption: String },
}

/// Terminal result of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// File landed in the scope chat.
    Delivered,
    /// Listeners get the link instead of the file.
    LinkOnly { url: String, caption: String },
    /// Nothing could be delivered.
    Failed,
}

/// Shared collaborators and tunables the pipeline runs against.
#[derive(Clone)]
pub struct DeliveryContext {
    pub chat: Arc<dyn ChatTransport>,
    pub relay: Option<Arc<dyn RelayTransport>>,
    pub pending: Arc<PendingRelays>,
    pub cache: Arc<ExpiringCache<JobKey, DeliveryCacheEntry>>,
    /// Largest file the primary channel accepts, in bytes.
    pub direct_limit: u64,
    pub relay_timeout: Duration,
}

/// Drive one download outcome to a terminal delivery state.
pub async fn deliver(
    ctx: &DeliveryContext,
    key: &JobKey,
    download: Download,
    reply_to: Option<MessageRef>,
    progress: &UnboundedSender<ProgressEvent>,
) -> DeliveryOutcome {
    let Download {
        artifact,
        title,
        direct_url,
    } = download;
    let caption = render::caption_from_title(&title);

    if let Some(artifact) = artifact {
        if artifact.size <= ctx.direct_limit {
            match ctx
                .chat
                .send_file(key.scope_id, &artifact.path, artifact.kind, &caption, reply_to)
                .await
            {
                Ok(sent) => {
                    if let Some(handle) = sent.file_handle {
                        ctx.cache.set(
                            key.clone(),
                            DeliveryCacheEntry::File {
                                handle,
                                kind: artifact.kind,
                                caption,
                            },
                        );
                    }
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => {
                    tracing::warn!(url = %key.url, error = %e, "direct send failed");
                }
            }
        } else {
            tracing::debug!(
                url = %key.url,
                size = artifact.size,
                limit = ctx.direct_limit,
                "artifact above direct ceiling"
            );
        }

        if let Some(relay) = ctx.relay.as_ref() {
            match relay_file(ctx, relay, key, &artifact, &caption, progress).await {
                Ok(()) => return DeliveryOutcome::Delivered,
                Err(e) => {
                    tracing::warn!(url = %key.url, error = %e, "relay delivery failed");
                }
            }
        }
        // Falling through abandons the artifact; temp storage goes with it.
    }

    if let Some(url) = direct_url {
        ctx.cache.set(
            key.clone(),
            DeliveryCacheEntry::Link {
                url: url.clone(),
                caption: caption.clone(),
            },
        );
        return DeliveryOutcome::LinkOnly { url, caption };
    }

    DeliveryOutcome::Failed
}

/// Hand the artifact to the relay agent and wait for its upload to come back
/// through the inbound stream, then copy it into the scope chat.
async fn relay_file(
    ctx: &DeliveryContext,
    relay: &Arc<dyn RelayTransport>,
    key: &JobKey,
    artifact: &Artifact,
    caption: &str,
    progress: &UnboundedSender<ProgressEvent>,
) -> Result<(), TransportError> {
    let correlation = token::mint();
    let confirmation = ctx.pending.register(&correlation);
    let tagged_caption = format!("{caption}\n\n{}", relay::encode_tag(&correlation));

    if let Err(e) = relay
        .relay_deliver(
            &artifact.path,
            artifact.kind,
            &tagged_caption,
            &correlation,
            progress.clone(),
        )
        .await
    {
        ctx.pending.abandon(&correlation);
        return Err(e);
    }

    let receipt = match tokio::time::timeout(ctx.relay_timeout, confirmation).await {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(_)) => {
            ctx.pending.abandon(&correlation);
            return Err(TransportError::Relay("confirmation channel closed".into()));
        }
        Err(_) => {
            ctx.pending.abandon(&correlation);
            return Err(TransportError::Relay(format!(
                "no confirmation within {}s",
                ctx.relay_timeout.as_secs()
            )));
        }
    };

    tracing::debug!(url = %key.url, token = %correlation, "relay confirmed, copying into scope");
    let sent = ctx
        .chat
        .copy_message(receipt.message, key.scope_id, caption)
        .await?;

    if let Some(handle) = sent.file_handle.or(receipt.file_handle) {
        ctx.cache.set(
            key.clone(),
            DeliveryCacheEntry::File {
                handle,
                kind: artifact.kind,
                caption: caption.to_string(),
            },
        );
    }
    Ok(())
}
