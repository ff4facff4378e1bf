//! Service facade: admission, dedup, caching and job startup.
//!
//! The embedding frontend constructs one [`Orchestrator`] with its
//! collaborator implementations and routes inbound traffic into three entry
//! points: [`Orchestrator::prepare`] when a link arrives,
//! [`Orchestrator::submit`] when a format is chosen, and
//! [`Orchestrator::confirm_relay`] when a relay-tagged message shows up.
//! Everything downstream of a created job lives in [`run`].

mod run;

use std::sync::Arc;

use crate::cache::ExpiringCache;
use crate::config::Config;
use crate::delivery::{DeliveryCacheEntry, DeliveryContext};
use crate::extractor::{
    normalize_url, ExtractError, FormatSelector, MediaExtractor, ProbeInfo,
};
use crate::gate::{DenyReason, RateGate};
use crate::limiter::WorkLimiter;
use crate::registry::{Attach, JobKey, JobRegistry, Listener};
use crate::relay::{self, PendingRelays, RelayReceipt};
use crate::render::{self, Locale};
use crate::selection::{SelectionPayload, SelectionStore};
use crate::transport::{ChatTransport, MessageRef, RelayTransport, TransportError};

/// Probe results keyed by normalized URL; failures are cached too so a bad
/// link does not hammer the engine.
pub type ProbeCache = ExpiringCache<String, Result<ProbeInfo, ExtractError>>;

/// One incoming "download this" request, resolved to a concrete format.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: i64,
    pub scope_id: i64,
    /// Normalized resource URL (from [`Orchestrator::prepare`]'s payload).
    pub url: String,
    pub selector: FormatSelector,
    /// The user's message carrying the link; the delivery replies to it.
    pub origin: MessageRef,
    /// The bot's status message for this requester.
    pub status: MessageRef,
    pub locale: Locale,
}

/// What happened to a submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Turned away by the rate gate; the status message already says why.
    Denied(DenyReason),
    /// Served straight from the delivery cache, no job needed.
    CachedDelivery,
    /// Attached to an already-running job for the same key.
    Joined,
    /// A new job was created and its background task started.
    Started,
}

/// Probe outcome plus the token a selection menu can call back with.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub token: String,
    pub payload: SelectionPayload,
}

/// Everything a running job needs, bundled for the spawned tasks.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub registry: Arc<JobRegistry>,
    pub gate: Arc<RateGate>,
    pub limiter: Arc<WorkLimiter>,
    pub extractor: Arc<dyn MediaExtractor>,
    pub chat: Arc<dyn ChatTransport>,
    pub delivery: DeliveryContext,
}

pub struct Orchestrator {
    config: Config,
    registry: Arc<JobRegistry>,
    gate: Arc<RateGate>,
    limiter: Arc<WorkLimiter>,
    probe_cache: Arc<ProbeCache>,
    delivery_cache: Arc<ExpiringCache<JobKey, DeliveryCacheEntry>>,
    selections: SelectionStore,
    pending_relays: Arc<PendingRelays>,
    extractor: Arc<dyn MediaExtractor>,
    chat: Arc<dyn ChatTransport>,
    relay: Option<Arc<dyn RelayTransport>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
        chat: Arc<dyn ChatTransport>,
        relay: Option<Arc<dyn RelayTransport>>,
    ) -> Self {
        let limiter = Arc::new(WorkLimiter::new(
            config.probe_concurrency,
            config.download_concurrency,
            config.worker_threads,
        ));
        let gate = Arc::new(RateGate::new(
            config.user_cooldown(),
            config.max_active_jobs,
            config.max_jobs_per_scope,
        ));
        let probe_cache = Arc::new(ProbeCache::new(
            config.probe_cache_ttl(),
            config.probe_cache_max,
        ));
        let delivery_cache = Arc::new(ExpiringCache::new(
            config.delivery_cache_ttl(),
            config.delivery_cache_max,
        ));
        let selections = SelectionStore::new(config.selection_ttl(), config.selection_max);

        Self {
            registry: Arc::new(JobRegistry::new()),
            gate,
            limiter,
            probe_cache,
            delivery_cache,
            selections,
            pending_relays: Arc::new(PendingRelays::new()),
            extractor,
            chat,
            relay,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Jobs currently in flight; feeds frontend status displays.
    pub fn active_jobs(&self) -> usize {
        self.registry.len()
    }

    /// Probe a URL (cache first) and park the result behind a selection
    /// token for the format menu.
    pub async fn prepare(&self, url: &str) -> Result<Prepared, ExtractError> {
        let url = normalize_url(url)?;

        let probed = match self.probe_cache.get(&url) {
            Some(cached) => {
                tracing::debug!(url = %url, "probe cache hit");
                cached
            }
            None => {
                let extractor = Arc::clone(&self.extractor);
                let probe_url = url.clone();
                let result = self
                    .limiter
                    .run_probe(move || extractor.probe(&probe_url))
                    .await;
                // A crashed worker is not a probe outcome; don't pin it.
                if !matches!(result, Err(ExtractError::Worker(_))) {
                    self.probe_cache.set(url.clone(), result.clone());
                }
                result
            }
        };

        let info = probed?;
        let payload = SelectionPayload {
            url: url.clone(),
            info,
        };
        let token = self.selections.put(payload.clone());
        tracing::debug!(url = %url, token = %token, "selection parked");
        Ok(Prepared { token, payload })
    }

    /// Resolve a selection token from menu callback data.
    pub fn selection(&self, token: &str) -> Option<SelectionPayload> {
        self.selections.get(token)
    }

    /// Admit, dedup and start (or join, or serve from cache) one request.
    pub async fn submit(&self, req: SubmitRequest) -> SubmitOutcome {
        if let Err(reason) = self.gate.admit(req.user_id, req.scope_id) {
            tracing::debug!(user = req.user_id, scope = req.scope_id, reason = %reason, "request denied");
            let text = render::deny_text(req.locale, &reason);
            if let Err(e) = self.chat.edit_text(req.status, &text).await {
                tracing::debug!(error = %e, "deny notice edit failed");
            }
            return SubmitOutcome::Denied(reason);
        }

        let key = JobKey {
            scope_id: req.scope_id,
            url: req.url.clone(),
            kind: req.selector.kind,
            quality: req.selector.quality,
        };

        // A live job is always fresher than the cache, so the cache is only
        // consulted when no job holds the key.
        if !self.registry.contains(&key) {
            if let Some(entry) = self.delivery_cache.get(&key) {
                match self.redeliver(&req, &entry).await {
                    Ok(()) => {
                        tracing::info!(url = %key.url, "served from delivery cache");
                        return SubmitOutcome::CachedDelivery;
                    }
                    Err(e) => {
                        // Stale platform handle; forget it and download anew.
                        tracing::warn!(url = %key.url, error = %e, "cached redelivery failed, evicting");
                        self.delivery_cache.remove(&key);
                    }
                }
            }
        }

        let listener = Listener::new(req.user_id, req.origin, req.status, req.locale);
        match self.registry.attach_or_create(&key, listener) {
            Attach::Joined { position } => {
                tracing::info!(url = %key.url, position, "joined running job");
                let text = render::queued(req.locale, self.registry.len());
                if let Err(e) = self.chat.edit_text(req.status, &text).await {
                    tracing::debug!(error = %e, "queued notice edit failed");
                }
                SubmitOutcome::Joined
            }
            Attach::Created => {
                self.gate.job_started(req.scope_id);
                tracing::info!(
                    url = %key.url,
                    kind = ?req.selector.kind,
                    quality = ?req.selector.quality,
                    "job started"
                );
                run::spawn(self.job_context(), key);
                SubmitOutcome::Started
            }
        }
    }

    /// Match an inbound relay-tagged message back to its waiting delivery.
    /// Returns false when no delivery is waiting on the embedded token.
    pub fn confirm_relay(&self, text_or_caption: &str, receipt: RelayReceipt) -> bool {
        let Some(token) = relay::find_tag(text_or_caption) else {
            return false;
        };
        let confirmed = self.pending_relays.confirm(token, receipt);
        if !confirmed {
            tracing::warn!(token = %token, "relay confirmation for unknown or expired token");
        }
        confirmed
    }

    async fn redeliver(
        &self,
        req: &SubmitRequest,
        entry: &DeliveryCacheEntry,
    ) -> Result<(), TransportError> {
        match entry {
            DeliveryCacheEntry::File {
                handle,
                kind,
                caption,
            } => {
                self.chat
                    .send_cached(req.scope_id, handle, *kind, caption)
                    .await?;
                if let Err(e) = self
                    .chat
                    .edit_text(req.status, &render::delivered(req.locale))
                    .await
                {
                    tracing::debug!(error = %e, "delivered notice edit failed");
                }
                Ok(())
            }
            DeliveryCacheEntry::Link { url, caption } => {
                if let Err(e) = self
                    .chat
                    .edit_text(req.status, &render::direct_link(req.locale, caption, url))
                    .await
                {
                    tracing::debug!(error = %e, "link notice edit failed");
                }
                Ok(())
            }
        }
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            registry: Arc::clone(&self.registry),
            gate: Arc::clone(&self.gate),
            limiter: Arc::clone(&self.limiter),
            extractor: Arc::clone(&self.extractor),
            chat: Arc::clone(&self.chat),
            delivery: DeliveryContext {
                chat: Arc::clone(&self.chat),
                relay: self.relay.clone(),
                pending: Arc::clone(&self.pending_relays),
                cache: Arc::clone(&self.delivery_cache),
                direct_limit: self.config.direct_limit_bytes(),
                relay_timeout: self.config.relay_timeout(),
            },
        }
    }
}
