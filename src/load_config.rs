//! `load_config` module: loads the optional YAML config file and injects
//! secrets and overrides from the environment into a [`PublishConfig`].
//!
//! # Responsibilities
//! - Parse the user-supplied YAML into type-safe structs; every key has a default
//! - Inject `DOCS_STORE_TOKEN` (secret) and `DOCS_STORE_URL` (override) from the environment
//! - Reject values the pipeline cannot run with (zero concurrency or hash length, empty static prefix)
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.

use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::PublishConfig;

pub const TOKEN_ENV: &str = "DOCS_STORE_TOKEN";
pub const STORE_URL_ENV: &str = "DOCS_STORE_URL";

/// Loads the config file at `path` (or defaults when `None`) and applies
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<PublishConfig> {
    let mut config = match path {
        Some(path_ref) => {
            info!(config_path = ?path_ref, "Loading configuration from file");
            let config_content = match fs::read_to_string(path_ref) {
                Ok(content) => content,
                Err(e) => {
                    error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                    return Err(anyhow::anyhow!(
                        "Failed to read config file {:?}: {}",
                        path_ref,
                        e
                    ));
                }
            };
            match serde_yaml::from_str::<Option<PublishConfig>>(&config_content) {
                Ok(conf) => {
                    info!(config_path = ?path_ref, "Parsed config YAML successfully");
                    conf.unwrap_or_default()
                }
                Err(e) => {
                    error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                    return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
                }
            }
        }
        None => {
            info!("No config file given, using defaults");
            PublishConfig::default()
        }
    };

    if let Ok(url) = std::env::var(STORE_URL_ENV) {
        info!(store_url = %url, "Store URL overridden from environment");
        config.store.base_url = url;
    }
    config.store.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());

    if config.concurrency == 0 {
        error!("concurrency must be at least 1");
        anyhow::bail!("concurrency must be at least 1");
    }
    if config.hash_len == 0 {
        error!("hash_len must be at least 1");
        anyhow::bail!("hash_len must be at least 1");
    }
    if config.static_prefix.trim_matches('/').is_empty() {
        error!(static_prefix = %config.static_prefix, "static_prefix must name a directory");
        anyhow::bail!("static_prefix must name a directory, got {:?}", config.static_prefix);
    }

    config.trace_loaded();
    Ok(config)
}
