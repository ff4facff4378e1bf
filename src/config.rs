//! Configuration: `~/.config/fetchbot/config.toml` plus `FETCHBOT_*`
//! environment overrides.
//!
//! Every knob has a default, so an empty file and an empty environment give
//! a working setup. Values from either source are checked against per-knob
//! bounds; anything non-numeric or out of range is logged and replaced with
//! the default rather than failing startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator tunables loaded from file and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Concurrent metadata probes.
    pub probe_concurrency: usize,
    /// Concurrent downloads.
    pub download_concurrency: usize,
    /// Blocking worker pool size shared by probes and downloads.
    pub worker_threads: usize,
    /// Probe result cache TTL in seconds (0 disables the cache).
    pub probe_cache_ttl_secs: u64,
    /// Probe result cache size bound.
    pub probe_cache_max: usize,
    /// Completed-delivery cache TTL in seconds (0 disables the cache).
    pub delivery_cache_ttl_secs: u64,
    /// Completed-delivery cache size bound.
    pub delivery_cache_max: usize,
    /// Format-selection payload TTL in seconds.
    pub selection_ttl_secs: u64,
    /// Format-selection payload size bound.
    pub selection_max: usize,
    /// Active job ceiling across all scopes (0 = unlimited).
    pub max_active_jobs: usize,
    /// Active job ceiling per scope (0 = unlimited).
    pub max_jobs_per_scope: usize,
    /// Per-user request cooldown in seconds (0 = no cooldown).
    pub user_cooldown_secs: u64,
    /// Largest file the primary channel sends directly, in MB.
    pub direct_limit_mb: u64,
    /// How long a relay handoff may wait for its confirmation, in seconds.
    pub relay_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_concurrency: 4,
            download_concurrency: 2,
            worker_threads: 8,
            probe_cache_ttl_secs: 900,
            probe_cache_max: 128,
            delivery_cache_ttl_secs: 900,
            delivery_cache_max: 256,
            selection_ttl_secs: 1800,
            selection_max: 512,
            max_active_jobs: 16,
            max_jobs_per_scope: 3,
            user_cooldown_secs: 3,
            direct_limit_mb: 48,
            relay_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn probe_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_cache_ttl_secs)
    }

    pub fn delivery_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.delivery_cache_ttl_secs)
    }

    pub fn selection_ttl(&self) -> Duration {
        Duration::from_secs(self.selection_ttl_secs)
    }

    pub fn user_cooldown(&self) -> Duration {
        Duration::from_secs(self.user_cooldown_secs)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn direct_limit_bytes(&self) -> u64 {
        self.direct_limit_mb * 1024 * 1024
    }

    /// Overlay `FETCHBOT_*` environment variables onto this config. Values
    /// only need to parse here; [`Config::clamped`] enforces the ranges.
    pub fn with_env_overrides(mut self) -> Self {
        self.probe_concurrency = env_usize("FETCHBOT_PROBE_CONCURRENCY", self.probe_concurrency);
        self.download_concurrency =
            env_usize("FETCHBOT_DOWNLOAD_CONCURRENCY", self.download_concurrency);
        self.worker_threads = env_usize("FETCHBOT_WORKER_THREADS", self.worker_threads);
        self.probe_cache_ttl_secs =
            env_u64("FETCHBOT_PROBE_CACHE_TTL_SECS", self.probe_cache_ttl_secs);
        self.probe_cache_max = env_usize("FETCHBOT_PROBE_CACHE_MAX", self.probe_cache_max);
        self.delivery_cache_ttl_secs =
            env_u64("FETCHBOT_DELIVERY_CACHE_TTL_SECS", self.delivery_cache_ttl_secs);
        self.delivery_cache_max = env_usize("FETCHBOT_DELIVERY_CACHE_MAX", self.delivery_cache_max);
        self.selection_ttl_secs = env_u64("FETCHBOT_SELECTION_TTL_SECS", self.selection_ttl_secs);
        self.selection_max = env_usize("FETCHBOT_SELECTION_MAX", self.selection_max);
        self.max_active_jobs = env_usize("FETCHBOT_MAX_ACTIVE_JOBS", self.max_active_jobs);
        self.max_jobs_per_scope = env_usize("FETCHBOT_MAX_JOBS_PER_SCOPE", self.max_jobs_per_scope);
        self.user_cooldown_secs = env_u64("FETCHBOT_USER_COOLDOWN_SECS", self.user_cooldown_secs);
        self.direct_limit_mb = env_u64("FETCHBOT_DIRECT_LIMIT_MB", self.direct_limit_mb);
        self.relay_timeout_secs = env_u64("FETCHBOT_RELAY_TIMEOUT_SECS", self.relay_timeout_secs);
        self
    }

    /// Force every knob into its documented range; an out-of-range value
    /// falls back to the default and is logged. Runs last in the load
    /// pipeline, after the environment overlay. Keeps `direct_limit_bytes`
    /// from overflowing and pool sizes inside what the semaphores accept.
    pub fn clamped(mut self) -> Self {
        let defaults = Config::default();
        self.probe_concurrency = clamp_usize(
            "probe_concurrency",
            self.probe_concurrency,
            defaults.probe_concurrency,
            1,
            64,
        );
        self.download_concurrency = clamp_usize(
            "download_concurrency",
            self.download_concurrency,
            defaults.download_concurrency,
            1,
            32,
        );
        self.worker_threads = clamp_usize(
            "worker_threads",
            self.worker_threads,
            defaults.worker_threads,
            1,
            128,
        );
        self.probe_cache_ttl_secs = clamp_u64(
            "probe_cache_ttl_secs",
            self.probe_cache_ttl_secs,
            defaults.probe_cache_ttl_secs,
            0,
            86_400,
        );
        self.probe_cache_max = clamp_usize(
            "probe_cache_max",
            self.probe_cache_max,
            defaults.probe_cache_max,
            1,
            100_000,
        );
        self.delivery_cache_ttl_secs = clamp_u64(
            "delivery_cache_ttl_secs",
            self.delivery_cache_ttl_secs,
            defaults.delivery_cache_ttl_secs,
            0,
            86_400,
        );
        self.delivery_cache_max = clamp_usize(
            "delivery_cache_max",
            self.delivery_cache_max,
            defaults.delivery_cache_max,
            1,
            100_000,
        );
        self.selection_ttl_secs = clamp_u64(
            "selection_ttl_secs",
            self.selection_ttl_secs,
            defaults.selection_ttl_secs,
            0,
            86_400,
        );
        self.selection_max = clamp_usize(
            "selection_max",
            self.selection_max,
            defaults.selection_max,
            1,
            100_000,
        );
        self.max_active_jobs = clamp_usize(
            "max_active_jobs",
            self.max_active_jobs,
            defaults.max_active_jobs,
            0,
            10_000,
        );
        self.max_jobs_per_scope = clamp_usize(
            "max_jobs_per_scope",
            self.max_jobs_per_scope,
            defaults.max_jobs_per_scope,
            0,
            1_000,
        );
        self.user_cooldown_secs = clamp_u64(
            "user_cooldown_secs",
            self.user_cooldown_secs,
            defaults.user_cooldown_secs,
            0,
            3_600,
        );
        self.direct_limit_mb = clamp_u64(
            "direct_limit_mb",
            self.direct_limit_mb,
            defaults.direct_limit_mb,
            1,
            4_000,
        );
        self.relay_timeout_secs = clamp_u64(
            "relay_timeout_secs",
            self.relay_timeout_secs,
            defaults.relay_timeout_secs,
            5,
            3_600,
        );
        self
    }
}

fn env_usize(name: &str, current: usize) -> usize {
    parsed_or(name, std::env::var(name).ok(), current)
}

fn env_u64(name: &str, current: u64) -> u64 {
    parsed_or(name, std::env::var(name).ok(), current)
}

fn parsed_or<T: std::str::FromStr>(name: &str, raw: Option<String>, current: T) -> T {
    match raw {
        Some(s) => match s.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %s, "ignoring non-numeric value");
                current
            }
        },
        None => current,
    }
}

fn clamp_usize(field: &str, value: usize, default: usize, min: usize, max: usize) -> usize {
    if (min..=max).contains(&value) {
        value
    } else {
        tracing::warn!(field, value, default, "config value out of range, using default");
        default
    }
}

fn clamp_u64(field: &str, value: u64, default: u64, min: u64, max: u64) -> u64 {
    if (min..=max).contains(&value) {
        value
    } else {
        tracing::warn!(field, value, default, "config value out of range, using default");
        default
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchbot")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists,
/// then apply environment overrides and clamp everything into range.
pub fn load_or_init() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = Config::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg.with_env_overrides().clamped());
    }

    let data = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&data)?;
    Ok(cfg.with_env_overrides().clamped())
}
