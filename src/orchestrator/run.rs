//! One job from download to terminal notification.
//!
//! The job body runs in its own task; a thin supervisor awaits it so a
//! panic anywhere inside still ends in a finalized registry slot and failure
//! notices instead of listeners waiting forever. Finalization snapshots and
//! deregisters the listener set in one step, so every requester lands either
//! in the snapshot (one terminal edit here) or on the fresh-submit path.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::delivery::{self, DeliveryOutcome};
use crate::extractor::{Download, ExtractError, FormatSelector};
use crate::progress::{ProgressEvent, ProgressStage};
use crate::registry::{JobKey, JobRegistry};
use crate::render;
use crate::transport::ChatTransport;

use super::JobContext;

/// Terminal text variant for the listeners of a finished job.
enum Notice {
    Delivered,
    Link { url: String, caption: String },
    Failure,
}

/// Start the background task for a freshly created job.
pub(crate) fn spawn(ctx: JobContext, key: JobKey) {
    tokio::spawn(supervise(ctx, key));
}

async fn supervise(ctx: JobContext, key: JobKey) {
    let body = tokio::spawn(run(ctx.clone(), key.clone()));
    if let Err(e) = body.await {
        tracing::error!(url = %key.url, error = %e, "job task crashed");
        finish(&ctx, &key, Notice::Failure).await;
    }
}

async fn run(ctx: JobContext, key: JobKey) {
    let (tx, rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let forwarder = tokio::spawn(forward_progress(
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.chat),
        key.clone(),
        rx,
    ));

    let _ = tx.send(ProgressEvent {
        stage: ProgressStage::Preparing,
        bytes_done: 0,
        bytes_total: None,
        rate: None,
        eta_secs: None,
    });

    let fetched = fetch(&ctx, &key, &tx).await;

    let notice = match fetched {
        Ok(download) => {
            let _ = tx.send(ProgressEvent {
                stage: ProgressStage::Finished,
                bytes_done: 0,
                bytes_total: None,
                rate: None,
                eta_secs: None,
            });
            let reply_to = ctx.registry.primary_origin(&key);
            match delivery::deliver(&ctx.delivery, &key, download, reply_to, &tx).await {
                DeliveryOutcome::Delivered => Notice::Delivered,
                DeliveryOutcome::LinkOnly { url, caption } => Notice::Link { url, caption },
                DeliveryOutcome::Failed => Notice::Failure,
            }
        }
        Err(e) => {
            tracing::warn!(url = %key.url, error = %e, "extraction failed");
            Notice::Failure
        }
    };

    // Close the progress channel and let the forwarder drain, so no stale
    // progress edit can land after the terminal one.
    drop(tx);
    let _ = forwarder.await;

    finish(&ctx, &key, notice).await;
}

async fn fetch(
    ctx: &JobContext,
    key: &JobKey,
    tx: &UnboundedSender<ProgressEvent>,
) -> Result<Download, ExtractError> {
    let extractor = Arc::clone(&ctx.extractor);
    let url = key.url.clone();
    let selector = FormatSelector {
        kind: key.kind,
        quality: key.quality,
    };
    let progress = tx.clone();
    ctx.limiter
        .run_download(move || extractor.download(&url, selector, progress))
        .await
}

/// Sequentially drain progress events into throttled status-message edits.
/// Render decisions happen under the registry lock; the edits themselves
/// happen after it, so nothing awaits while the lock is held.
async fn forward_progress(
    registry: Arc<JobRegistry>,
    chat: Arc<dyn ChatTransport>,
    key: JobKey,
    mut rx: UnboundedReceiver<ProgressEvent>,
) {
    while let Some(event) = rx.recv().await {
        let pct = event.percent();
        let terminal = event.is_terminal();
        let now = Instant::now();
        let edits = registry.collect_listeners(&key, |listener| {
            listener
                .throttle
                .allow(pct, terminal, now)
                .then(|| (listener.status, render::progress_text(listener.locale, &event)))
        });
        for (status, text) in edits {
            if let Err(e) = chat.edit_text(status, &text).await {
                tracing::debug!(error = %e, "progress edit failed");
            }
        }
    }
}

/// Exactly-once terminal step: snapshot-and-deregister the listeners, push
/// each their notice, release the job's rate-gate slot.
async fn finish(ctx: &JobContext, key: &JobKey, notice: Notice) {
    let Some(listeners) = ctx.registry.finalize(key) else {
        return;
    };
    for listener in &listeners {
        let text = match &notice {
            Notice::Delivered => render::delivered(listener.locale),
            Notice::Link { url, caption } => render::direct_link(listener.locale, caption, url),
            Notice::Failure => render::failure(listener.locale),
        };
        if let Err(e) = ctx.chat.edit_text(listener.status, &text).await {
            tracing::debug!(error = %e, "terminal status edit failed");
        }
    }
    ctx.gate.job_finished(key.scope_id);
}
