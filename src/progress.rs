//! Progress events and per-listener update throttling.
//!
//! The engine reports raw byte counts; the orchestrator turns them into
//! status-message edits. Chat platforms rate-limit edits hard, so each
//! listener carries a throttle that suppresses updates which move the
//! percentage less than [`MIN_PCT_STEP`] within [`MIN_INTERVAL`]. Terminal
//! events and the home stretch (>= [`FORCE_PCT`]) always go through.

use std::time::{Duration, Instant};

/// Minimum percentage movement for an un-forced update.
pub const MIN_PCT_STEP: f64 = 2.0;
/// Minimum wall-clock gap for an un-forced update.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Percentage from which every update is pushed.
pub const FORCE_PCT: f64 = 99.0;

/// Stage tag attached to a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Preparing,
    Downloading,
    /// Artifact is being handed to a transport.
    Uploading,
    Finished,
}

/// One raw progress report.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub bytes_done: u64,
    /// Unknown when the source does not declare a length.
    pub bytes_total: Option<u64>,
    /// Bytes per second, when the engine measures one.
    pub rate: Option<f64>,
    pub eta_secs: Option<u64>,
}

impl ProgressEvent {
    /// Completion percentage in [0, 100], or `None` without a usable total.
    pub fn percent(&self) -> Option<f64> {
        match self.bytes_total {
            Some(total) if total > 0 => {
                Some((self.bytes_done as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, ProgressStage::Finished)
    }
}

/// Per-listener edit throttle. A fresh throttle lets the first event pass.
#[derive(Debug)]
pub struct Throttle {
    last_pct: f64,
    last_at: Option<Instant>,
}

impl Throttle {
    pub fn new() -> Self {
        Self {
            last_pct: -(MIN_PCT_STEP + 1.0),
            last_at: None,
        }
    }

    /// Decide whether an update carrying `pct` may be pushed at `now`,
    /// recording it as the last push when allowed. Callers pass `terminal`
    /// for events that must never be suppressed.
    pub fn allow(&mut self, pct: Option<f64>, terminal: bool, now: Instant) -> bool {
        let interval_elapsed = match self.last_at {
            None => true,
            Some(at) => now.duration_since(at) >= MIN_INTERVAL,
        };
        let allowed = terminal
            || match pct {
                None => interval_elapsed,
                Some(p) => {
                    p - self.last_pct >= MIN_PCT_STEP || interval_elapsed || p >= FORCE_PCT
                }
            };
        if allowed {
            if let Some(p) = pct {
                self.last_pct = p;
            }
            self.last_at = Some(now);
        }
        allowed
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}
