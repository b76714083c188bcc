//! Agent configuration.
//!
//! Sources, later wins: built-in defaults, a TOML file
//! (`<config_dir>/surf-agent/config.toml` unless a path is given), then
//! `SURF_*` environment variables. The binary applies its flags last.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub user_id: String,
    /// Base URL of the plan, vision and memory endpoints.
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub use_memory: bool,
    /// Plans below this confidence are never executed.
    pub confidence_threshold: f64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub step_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub default_wait_ms: u64,
    pub snapshot_limit: usize,
    pub context_limit: usize,
    pub memory_context_limit: usize,
    pub vision_summary_limit: usize,
    pub chrome: ChromeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            user_id: "web-user".into(),
            api_base: "http://localhost:3000".into(),
            api_key: None,
            use_memory: true,
            confidence_threshold: 0.3,
            max_retries: 2,
            retry_backoff_ms: 2000,
            step_delay_ms: 500,
            settle_delay_ms: 300,
            default_wait_ms: 1000,
            snapshot_limit: 100,
            context_limit: 50,
            memory_context_limit: 10,
            vision_summary_limit: 20,
            chrome: ChromeConfig::default(),
        }
    }
}

/// How to reach a browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// DevTools endpoint of an already running Chrome.
    pub debug_url: String,
    pub headless: bool,
    /// Chrome executable used when launching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            debug_url: "http://127.0.0.1:9222".into(),
            headless: false,
            path: None,
            profile_dir: None,
        }
    }
}

impl AgentConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("surf-agent").join("config.toml"))
    }

    /// Loads the file at `path`, or the default location when `None`. A
    /// missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|err| {
            AgentError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|err| AgentError::Config(format!("{}: {err}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| AgentError::Config(err.to_string()))
    }

    /// Applies `SURF_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(user_id) = lookup("SURF_USER_ID") {
            self.user_id = user_id;
        }
        if let Some(api_base) = lookup("SURF_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(api_key) = lookup("SURF_API_KEY") {
            self.api_key = Some(api_key).filter(|key| !key.is_empty());
        }
        if let Some(raw) = lookup("SURF_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_var("SURF_CONFIDENCE_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("SURF_MAX_RETRIES") {
            self.max_retries = parse_var("SURF_MAX_RETRIES", &raw)?;
        }
        if let Some(url) = lookup("SURF_CHROME_URL") {
            self.chrome.debug_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AgentError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        reqwest::Url::parse(&self.api_base).map_err(|err| {
            AgentError::Config(format!("api_base `{}` is not a URL: {err}", self.api_base))
        })?;
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| AgentError::Config(format!("{name}={raw}: {err}")))
}
