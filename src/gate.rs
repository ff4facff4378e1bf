//! Admission control for new jobs.
//!
//! Three independent checks run before a request may create or join work:
//! a global active-job ceiling, a per-scope active-job ceiling, and a
//! per-user cooldown window. A limit of zero disables that check. The
//! cooldown stamp moves on every allowed request; the job counters move only
//! when a job is actually created and when it terminates.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("user in cooldown, {remaining_secs}s remaining")]
    Cooldown { remaining_secs: u64 },
    #[error("scope reached its active job ceiling")]
    ScopeBusy,
    #[error("global active job ceiling reached")]
    GlobalBusy,
}

struct GateInner {
    last_request: HashMap<i64, Instant>,
    active_total: usize,
    active_per_scope: HashMap<i64, usize>,
}

pub struct RateGate {
    cooldown: Duration,
    /// 0 disables the global ceiling.
    max_active: usize,
    /// 0 disables the per-scope ceiling.
    max_per_scope: usize,
    inner: Mutex<GateInner>,
}

impl RateGate {
    pub fn new(cooldown: Duration, max_active: usize, max_per_scope: usize) -> Self {
        Self {
            cooldown,
            max_active,
            max_per_scope,
            inner: Mutex::new(GateInner {
                last_request: HashMap::new(),
                active_total: 0,
                active_per_scope: HashMap::new(),
            }),
        }
    }

    /// Check all limits for a request from `user_id` in `scope_id`, stamping
    /// the user's cooldown window when allowed.
    pub fn admit(&self, user_id: i64, scope_id: i64) -> Result<(), DenyReason> {
        self.admit_at(user_id, scope_id, Instant::now())
    }

    fn admit_at(&self, user_id: i64, scope_id: i64, now: Instant) -> Result<(), DenyReason> {
        let mut inner = self.inner.lock().unwrap();

        if self.max_active > 0 && inner.active_total >= self.max_active {
            return Err(DenyReason::GlobalBusy);
        }
        if self.max_per_scope > 0 {
            let in_scope = inner.active_per_scope.get(&scope_id).copied().unwrap_or(0);
            if in_scope >= self.max_per_scope {
                return Err(DenyReason::ScopeBusy);
            }
        }
        if !self.cooldown.is_zero() {
            if let Some(last) = inner.last_request.get(&user_id) {
                let elapsed = now.duration_since(*last);
                if elapsed < self.cooldown {
                    let remaining = self.cooldown - elapsed;
                    let mut secs = remaining.as_secs();
                    if remaining.subsec_nanos() > 0 {
                        secs += 1;
                    }
                    return Err(DenyReason::Cooldown {
                        remaining_secs: secs,
                    });
                }
            }
        }

        inner.last_request.insert(user_id, now);
        Ok(())
    }

    /// Record a newly created job against the ceilings.
    pub fn job_started(&self, scope_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_total += 1;
        *inner.active_per_scope.entry(scope_id).or_insert(0) += 1;
    }

    /// Release a terminated job from the ceilings.
    pub fn job_finished(&self, scope_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_total = inner.active_total.saturating_sub(1);
        if let Some(count) = inner.active_per_scope.get_mut(&scope_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.active_per_scope.remove(&scope_id);
            }
        }
    }

    /// Jobs currently counted against the global ceiling.
    pub fn active_total(&self) -> usize {
        self.inner.lock().unwrap().active_total
    }
}
