//! Search and corpus configuration.
//!
//! Values come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`SearchConfig::default`]).
//! 2. A TOML file, by default `search.toml` in the platform config directory
//!    (e.g. `~/.config/agent-session-search/search.toml`).
//! 3. `AGENT_SEARCH_*` environment variables (a `.env` file is honored via dotenvy).
//!
//! # Example Configuration
//!
//! ```toml
//! large_file_threshold_bytes = 8388608
//! small_batch_size = 64
//! flush_interval_ms = 100
//! cancel_flush = "discard"
//!
//! [corpus]
//! max_characters = 64000
//! tool_output_limit = 1200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// What happens to staged-but-unflushed results when a run notices it was canceled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelFlushPolicy {
    /// Drop staged results; the canceled snapshot carries no results.
    #[default]
    Discard,
    /// Keep already published results in the canceled snapshot and append the
    /// run's staged hits, unless a newer run has started since.
    Flush,
}

/// Character budgets for corpus text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorpusLimits {
    /// Upper bound on the length (in chars) of one corpus blob.
    pub max_characters: usize,
    /// Per-field cap for message text and tool input.
    pub per_field_limit: usize,
    /// Per-field cap for tool output, usually much smaller than `per_field_limit`.
    pub tool_output_limit: usize,
    /// Maximum number of events sampled from the middle of a session.
    pub middle_sample_cap: usize,
}

impl Default for CorpusLimits {
    fn default() -> Self {
        Self {
            max_characters: 64_000,
            per_field_limit: 4_000,
            tool_output_limit: 1_200,
            middle_sample_cap: 48,
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Sessions at or above this size are scanned one at a time in the large tier.
    pub large_file_threshold_bytes: u64,
    /// Number of small-tier sessions matched per batch.
    pub small_batch_size: usize,
    /// Minimum delay between two staged-result publications.
    pub flush_interval_ms: u64,
    /// Cap on ids taken from the full-text index per query.
    pub result_limit: usize,
    /// Whether housekeeping sessions are returned by index queries.
    pub include_system_sessions: bool,
    /// Persist large sessions after they were hydrated during a scan.
    pub write_back_hydrated: bool,
    pub cancel_flush: CancelFlushPolicy,
    /// Limits hosts pass to [`crate::corpus::build_with`] and
    /// [`crate::corpus::coverage::audit`] when (re)building index text.
    pub corpus: CorpusLimits,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: 8 * 1024 * 1024,
            small_batch_size: 64,
            flush_interval_ms: 100,
            result_limit: 500,
            include_system_sessions: false,
            write_back_hydrated: true,
            cancel_flush: CancelFlushPolicy::Discard,
            corpus: CorpusLimits::default(),
        }
    }
}

impl SearchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Default location of the TOML file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        directories::ProjectDirs::from("com", "dicklesworthstone", "agent-session-search")
            .map(|dirs| dirs.config_dir().join("search.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Parse a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then env overrides, then validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Copy with out-of-range knobs clamped to their smallest usable value.
    pub fn sanitized(&self) -> Self {
        if let Err(e) = self.validate() {
            tracing::warn!(error = %e, "clamping invalid search config");
        }
        Self {
            small_batch_size: self.small_batch_size.max(1),
            large_file_threshold_bytes: self.large_file_threshold_bytes.max(1),
            result_limit: self.result_limit.max(1),
            ..self.clone()
        }
    }

    /// Full layering: file (if present), then env overrides, then validation.
    pub fn load_layered(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().ok(),
        };
        let mut cfg = match path {
            Some(p) if p.exists() => Self::load(&p)
                .with_context(|| format!("loading search config from {}", p.display()))?,
            _ => Self::default(),
        };
        cfg.apply_env();
        cfg.validate().context("validating search config")?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("AGENT_SEARCH_LARGE_FILE_BYTES") {
            self.large_file_threshold_bytes = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_SMALL_BATCH") {
            self.small_batch_size = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_FLUSH_INTERVAL_MS") {
            self.flush_interval_ms = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_RESULT_LIMIT") {
            self.result_limit = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_INCLUDE_SYSTEM") {
            self.include_system_sessions = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_WRITE_BACK") {
            self.write_back_hydrated = v;
        }
        if let Ok(v) = dotenvy::var("AGENT_SEARCH_CANCEL_FLUSH") {
            match v.trim().to_ascii_lowercase().as_str() {
                "flush" => self.cancel_flush = CancelFlushPolicy::Flush,
                "discard" => self.cancel_flush = CancelFlushPolicy::Discard,
                _ => {}
            }
        }
        if let Some(v) = env_parse("AGENT_SEARCH_MAX_CHARACTERS") {
            self.corpus.max_characters = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_PER_FIELD_LIMIT") {
            self.corpus.per_field_limit = v;
        }
        if let Some(v) = env_parse("AGENT_SEARCH_TOOL_OUTPUT_LIMIT") {
            self.corpus.tool_output_limit = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.small_batch_size == 0 {
            return Err(ConfigError::Validation(
                "small_batch_size must be at least 1".into(),
            ));
        }
        if self.large_file_threshold_bytes == 0 {
            return Err(ConfigError::Validation(
                "large_file_threshold_bytes must be positive".into(),
            ));
        }
        if self.result_limit == 0 {
            return Err(ConfigError::Validation(
                "result_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    dotenvy::var(key).ok().and_then(|v| v.trim().parse().ok())
}
