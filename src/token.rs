//! Opaque token minting.
//!
//! Selection menus and relay deliveries are correlated by short tokens that
//! travel through the chat platform (callback data, caption tags). Tokens
//! carry no meaning; they only need to be unique for the lifetime of the
//! process and short enough for callback-data size limits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Hex length of a minted token.
pub const TOKEN_LEN: usize = 16;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Mint a fresh 16-hex-char token, unique within this process.
pub fn mint() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(n.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hasher.finalize();

    hex::encode(&digest[..TOKEN_LEN / 2])
}

/// Check that a string looks like a minted token (length and hex charset).
pub fn looks_like_token(s: &str) -> bool {
    s.len() == TOKEN_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
