use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Store settings. Every field has a default, so an empty file or
/// environment yields a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Name attached to every dispatch span and log record.
    pub name: String,
    /// Install a tracing stage that logs one record per transition.
    pub trace_transitions: bool,
    /// Queue depth at which a warning is logged. Zero disables the warning.
    pub queue_warn_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            trace_transitions: false,
            queue_warn_depth: 1024,
        }
    }
}

impl StoreConfig {
    /// Load from environment variables, reading `.env` first if present.
    ///
    /// `REACTIVE_STORE_NAME`, `REACTIVE_STORE_TRACE` and
    /// `REACTIVE_STORE_QUEUE_WARN_DEPTH` override the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let trace_transitions = match lookup("REACTIVE_STORE_TRACE") {
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .with_context(|| format!("REACTIVE_STORE_TRACE is not a bool: {raw}"))?,
            None => defaults.trace_transitions,
        };

        let queue_warn_depth = match lookup("REACTIVE_STORE_QUEUE_WARN_DEPTH") {
            Some(raw) => raw.trim().parse::<usize>().with_context(|| {
                format!("REACTIVE_STORE_QUEUE_WARN_DEPTH is not a number: {raw}")
            })?,
            None => defaults.queue_warn_depth,
        };

        Ok(Self {
            name: lookup("REACTIVE_STORE_NAME")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.name),
            trace_transitions,
            queue_warn_depth,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    store: StoreConfig,
}

/// Load a store config from the `[store]` table of a TOML file.
pub fn load_config(path: &Path) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse a store config from TOML text with a `[store]` table.
pub fn parse_config(content: &str) -> Result<StoreConfig> {
    let file: FileConfig = toml::from_str(content).context("Invalid store config")?;
    Ok(file.store)
}
