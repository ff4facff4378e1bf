//! Relay delivery correlation.
//!
//! A relay handoff completes out-of-band: the agent uploads the file on its
//! own connection and the result shows up later as an inbound message. The
//! only thing that travels with the file is an opaque token inside a
//! `rly:{token}` tag; everything else lives in an in-process table mapping
//! tokens to the rendezvous the delivery pipeline parks on.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::token;
use crate::transport::{FileHandle, MessageRef};

const TAG_PREFIX: &str = "rly:";

/// What the frontend observed when a relayed upload arrived.
#[derive(Debug, Clone)]
pub struct RelayReceipt {
    pub message: MessageRef,
    pub file_handle: Option<FileHandle>,
}

/// Build the tag appended to a relayed file's caption.
pub fn encode_tag(token: &str) -> String {
    format!("{TAG_PREFIX}{token}")
}

/// Scan message text or caption for a relay tag and return its token.
pub fn find_tag(text: &str) -> Option<&str> {
    let start = text.find(TAG_PREFIX)? + TAG_PREFIX.len();
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let candidate = &rest[..end];
    if token::looks_like_token(candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Table of handoffs still waiting for their inbound confirmation.
pub struct PendingRelays {
    inner: Mutex<HashMap<String, oneshot::Sender<RelayReceipt>>>,
}

impl PendingRelays {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a token before the handoff and get the receiver its receipt
    /// will arrive on.
    pub fn register(&self, token: &str) -> oneshot::Receiver<RelayReceipt> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(token.to_string(), tx);
        rx
    }

    /// Resolve an inbound receipt. Returns false for tokens that were never
    /// registered or already timed out.
    pub fn confirm(&self, token: &str, receipt: RelayReceipt) -> bool {
        let sender = self.inner.lock().unwrap().remove(token);
        match sender {
            Some(tx) => tx.send(receipt).is_ok(),
            None => false,
        }
    }

    /// Drop a registration whose wait expired.
    pub fn abandon(&self, token: &str) {
        self.inner.lock().unwrap().remove(token);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingRelays {
    fn default() -> Self {
        Self::new()
    }
}
