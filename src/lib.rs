//! Job orchestration core for a media download chat bot.
//!
//! The frontend supplies the chat client, the extraction engine and an
//! optional relay transport; this crate owns everything between "user sent a
//! link" and "file or link landed in the chat": request dedup with listener
//! fan-out, bounded probe/download concurrency, probe and delivery caches,
//! progress throttling, the delivery fallback chain and per-user rate
//! limiting.

pub mod config;
pub mod logging;

pub mod cache;
pub mod delivery;
pub mod extractor;
pub mod gate;
pub mod limiter;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod relay;
pub mod render;
pub mod selection;
pub mod token;
pub mod transport;

pub use orchestrator::{Orchestrator, Prepared, SubmitOutcome, SubmitRequest};
