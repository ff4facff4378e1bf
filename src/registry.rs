//! Job identity, listeners and request deduplication.
//!
//! One job exists per (scope, url, kind, quality) key at any time. Requests
//! arriving while a job is live attach as listeners instead of starting new
//! work. The registry lock is only ever held for map mutation and listener
//! iteration; nothing awaits under it. Listener notification therefore runs
//! in two steps: collect render decisions under the lock, push them after it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::extractor::{FormatKind, Quality};
use crate::progress::Throttle;
use crate::render::Locale;
use crate::transport::MessageRef;

/// Identity of one logical piece of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub scope_id: i64,
    pub url: String,
    pub kind: FormatKind,
    pub quality: Quality,
}

/// One requester waiting on a job's outcome.
#[derive(Debug)]
pub struct Listener {
    pub user_id: i64,
    /// The message that carried the link; deliveries reply to it.
    pub origin: MessageRef,
    /// The bot's status message, edited with progress and the terminal notice.
    pub status: MessageRef,
    pub locale: Locale,
    pub throttle: Throttle,
}

impl Listener {
    pub fn new(user_id: i64, origin: MessageRef, status: MessageRef, locale: Locale) -> Self {
        Self {
            user_id,
            origin,
            status,
            locale,
            throttle: Throttle::new(),
        }
    }
}

struct JobSlot {
    listeners: Vec<Listener>,
    started_at: Instant,
}

/// Outcome of an attach attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Attach {
    /// A job for the key was already live; the listener was appended at this
    /// 1-based position.
    Joined { position: usize },
    /// No job existed; the listener seeded a fresh slot and the caller must
    /// start the work.
    Created,
}

pub struct JobRegistry {
    inner: Mutex<HashMap<JobKey, JobSlot>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Attach `listener` to the job for `key`, creating the slot when none
    /// is live.
    pub fn attach_or_create(&self, key: &JobKey, listener: Listener) -> Attach {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(key) {
            Some(slot) => {
                slot.listeners.push(listener);
                Attach::Joined {
                    position: slot.listeners.len(),
                }
            }
            None => {
                inner.insert(
                    key.clone(),
                    JobSlot {
                        listeners: vec![listener],
                        started_at: Instant::now(),
                    },
                );
                Attach::Created
            }
        }
    }

    /// Run `f` over every listener of `key` under the lock, keeping the
    /// non-`None` outputs. Returns an empty vec for unknown keys.
    pub fn collect_listeners<T>(
        &self,
        key: &JobKey,
        mut f: impl FnMut(&mut Listener) -> Option<T>,
    ) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(key) {
            Some(slot) => slot.listeners.iter_mut().filter_map(|l| f(l)).collect(),
            None => Vec::new(),
        }
    }

    /// First listener's origin message, the reply target for deliveries.
    pub fn primary_origin(&self, key: &JobKey) -> Option<MessageRef> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(key)
            .and_then(|slot| slot.listeners.first())
            .map(|l| l.origin)
    }

    /// Atomically deregister `key` and take its listeners for terminal
    /// notification. Returns `None` when the job was already finalized, so
    /// callers can keep completion side effects exactly-once. A request
    /// arriving after this returns starts fresh and finds the delivery cache
    /// instead.
    pub fn finalize(&self, key: &JobKey) -> Option<Vec<Listener>> {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(key).map(|slot| {
            tracing::debug!(
                url = %key.url,
                listeners = slot.listeners.len(),
                elapsed_ms = slot.started_at.elapsed().as_millis() as u64,
                "job finalized"
            );
            slot.listeners
        })
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> JobKey {
        JobKey {
            scope_id: 100,
            url: "https://example.com/v/1".into(),
            kind: FormatKind::VideoAudio,
            quality: Quality::Best,
        }
    }

    fn listener(user_id: i64, message_id: i64) -> Listener {
        Listener::new(
            user_id,
            MessageRef {
                chat_id: 100,
                message_id,
            },
            MessageRef {
                chat_id: 100,
                message_id: message_id + 1,
            },
            Locale::En,
        )
    }

    #[test]
    fn first_attach_creates_then_others_join() {
        let reg = JobRegistry::new();
        assert_eq!(reg.attach_or_create(&key(), listener(1, 10)), Attach::Created);
        assert_eq!(
            reg.attach_or_create(&key(), listener(2, 20)),
            Attach::Joined { position: 2 }
        );
        assert_eq!(
            reg.attach_or_create(&key(), listener(3, 30)),
            Attach::Joined { position: 3 }
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_slots() {
        let reg = JobRegistry::new();
        let other = JobKey {
            quality: Quality::P720,
            ..key()
        };
        assert_eq!(reg.attach_or_create(&key(), listener(1, 10)), Attach::Created);
        assert_eq!(reg.attach_or_create(&other, listener(1, 10)), Attach::Created);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn collect_visits_each_listener_and_keeps_some_outputs() {
        let reg = JobRegistry::new();
        reg.attach_or_create(&key(), listener(1, 10));
        reg.attach_or_create(&key(), listener(2, 20));

        let ids = reg.collect_listeners(&key(), |l| {
            if l.user_id == 2 {
                None
            } else {
                Some(l.user_id)
            }
        });
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn primary_origin_is_the_first_attacher() {
        let reg = JobRegistry::new();
        reg.attach_or_create(&key(), listener(1, 10));
        reg.attach_or_create(&key(), listener(2, 20));
        assert_eq!(reg.primary_origin(&key()).map(|m| m.message_id), Some(10));
    }

    #[test]
    fn finalize_takes_listeners_in_attach_order_exactly_once() {
        let reg = JobRegistry::new();
        reg.attach_or_create(&key(), listener(1, 10));
        reg.attach_or_create(&key(), listener(2, 20));

        let taken = reg.finalize(&key()).unwrap();
        assert_eq!(taken.iter().map(|l| l.user_id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(reg.is_empty());

        assert!(reg.finalize(&key()).is_none());
    }

    #[test]
    fn attach_after_finalize_starts_fresh() {
        let reg = JobRegistry::new();
        reg.attach_or_create(&key(), listener(1, 10));
        reg.finalize(&key());
        assert_eq!(reg.attach_or_create(&key(), listener(2, 20)), Attach::Created);
    }
}
