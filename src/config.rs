use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::hash::DEFAULT_HASH_LEN;

/// Everything a publish or check run needs to know, after defaults and
/// environment overrides have been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Root of the documentation tree; logical paths are relative to it.
    pub docs_dir: PathBuf,
    /// Root holding the built theme artifact.
    pub theme_dir: PathBuf,
    /// Upload `theme_file` from `theme_dir` once the docs are done.
    pub publish_theme: bool,
    /// Logical path of the theme artifact under `theme_dir`.
    pub theme_file: String,
    /// Pointer namespace, usually the target id (e.g. `microbit`).
    pub target: String,
    /// Prefix of embeddable assets; these never get pointers.
    pub static_prefix: String,
    /// Top-level paths starting with this are skipped by default.
    pub private_prefix: String,
    /// Upper bound on concurrent uploads and store calls.
    pub concurrency: usize,
    pub hash_len: usize,
    /// Description tag attached to every upload.
    pub description: String,
    pub store: StoreConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            theme_dir: PathBuf::from("built"),
            publish_theme: true,
            theme_file: "/theme.json".to_string(),
            target: "docs".to_string(),
            static_prefix: "/static/".to_string(),
            private_prefix: "/_".to_string(),
            concurrency: 20,
            hash_len: DEFAULT_HASH_LEN,
            description: "#kindupload".to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl PublishConfig {
    pub fn trace_loaded(&self) {
        info!(
            docs_dir = %self.docs_dir.display(),
            target = %self.target,
            theme_dir = %self.theme_dir.display(),
            publish_theme = self.publish_theme,
            concurrency = self.concurrency,
            store_url = %self.store.base_url,
            "Loaded PublishConfig"
        );
        debug!(?self, "PublishConfig loaded (full debug)");
    }
}

/// Where the content store lives.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    /// Bearer token; only ever injected from the environment.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3232/api".to_string(),
            token: None,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
