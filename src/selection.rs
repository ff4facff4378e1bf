//! Format-selection state.
//!
//! Callback-data on menu buttons is size limited, so probe results are
//! parked here under a short token and only the token plus the chosen
//! kind/quality travel through the platform. Payloads expire; a press on a
//! stale menu resolves to nothing and the user is asked to resend the link.

use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::extractor::{FormatKind, FormatSelector, ProbeInfo, Quality};
use crate::token;

/// Probe outcome parked behind a selection menu.
#[derive(Debug, Clone)]
pub struct SelectionPayload {
    /// Normalized URL the probe ran against; becomes part of the job key.
    pub url: String,
    pub info: ProbeInfo,
}

pub struct SelectionStore {
    cache: ExpiringCache<String, SelectionPayload>,
}

impl SelectionStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: ExpiringCache::new(ttl, max_entries),
        }
    }

    /// Park a payload and mint the token that names it.
    pub fn put(&self, payload: SelectionPayload) -> String {
        let token = token::mint();
        self.cache.set(token.clone(), payload);
        token
    }

    /// Resolve a callback token. Reads do not consume the payload; a user
    /// may pick several formats from one menu.
    pub fn get(&self, token: &str) -> Option<SelectionPayload> {
        self.cache.get(&token.to_string())
    }
}

/// Frame a format choice as compact callback data.
pub fn encode_choice(token: &str, selector: FormatSelector) -> String {
    format!(
        "fmt|{token}|{}|{}",
        selector.kind.as_tag(),
        selector.quality.as_tag()
    )
}

/// Parse callback data produced by [`encode_choice`].
pub fn decode_choice(data: &str) -> Option<(String, FormatSelector)> {
    let mut parts = data.split('|');
    if parts.next()? != "fmt" {
        return None;
    }
    let tok = parts.next()?;
    let kind = FormatKind::from_tag(parts.next()?)?;
    let quality = Quality::from_tag(parts.next()?)?;
    if parts.next().is_some() || !token::looks_like_token(tok) {
        return None;
    }
    Some((tok.to_string(), FormatSelector { kind, quality }))
}
