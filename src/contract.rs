//! # contract: interface to the remote content store
//!
//! This module defines the [`RemoteStore`] trait and the plain data types that
//! cross it. The pipeline only ever talks to the store through this trait, so
//! the HTTP client in [`crate::store`] and the mockall-generated
//! `MockRemoteStore` are interchangeable.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; with the `test-export-mocks` feature
//!   (on by default) integration tests can build a `MockRemoteStore`.
//!
//! ## Errors
//! - All methods return a boxed [`StoreError`]. The pipeline treats every store
//!   error as a per-file failure, never as a run-aborting one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error type for store calls (simple boxed error, as transport varies).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// An object already held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    /// Public location of the stored bytes; embeds the content id as `/pub/<id>`.
    pub bloburl: String,
}

/// Result of a hash lookup. An empty `items` means the store has no match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    pub items: Vec<StoredContent>,
}

/// New content to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    /// Raw bytes; the transport decides how to encode them.
    pub content: Vec<u8>,
    pub content_type: String,
    /// Fixed tag identifying uploads made by this tool.
    pub description: String,
    /// Display name, the basename of the logical path.
    pub name: String,
}

/// Current mapping held by the store for one pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRecord {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub artid: String,
    #[serde(default)]
    pub htmlartid: String,
    #[serde(default)]
    pub scriptid: String,
    #[serde(default)]
    pub releaseid: String,
    #[serde(default)]
    pub redirect: String,
}

/// Pointer write request. Only `path` and `artid` carry data; the legacy link
/// fields are always sent empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPointer {
    pub path: String,
    pub htmlartid: String,
    pub artid: String,
    pub scriptid: String,
    pub releaseid: String,
    pub redirect: String,
}

impl NewPointer {
    pub fn to_content(path: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            htmlartid: String::new(),
            artid: content_id.into(),
            scriptid: String::new(),
            releaseid: String::new(),
            redirect: String::new(),
        }
    }
}

/// Trait for querying and writing the remote content store.
///
/// The implementor owns transport and authentication. The trait is `Send` +
/// `Sync` so one store can serve every concurrent upload of a run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Find existing content by (truncated) content hash.
    async fn lookup_by_hash(&self, hash: &str) -> Result<ContentQuery, StoreError>;

    /// Upload new content and return where the store put it.
    async fn create_content(&self, req: NewContent) -> Result<StoredContent, StoreError>;

    /// Read a pointer. `Ok(None)` when the store has no such pointer.
    async fn get_pointer(&self, pointer_id: &str) -> Result<Option<PointerRecord>, StoreError>;

    /// Create or replace a pointer.
    async fn set_pointer(&self, req: NewPointer) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_store_responses_deserialize() {
        let query: ContentQuery = serde_json::from_str("{}").unwrap();
        assert!(query.items.is_empty());

        let record: PointerRecord =
            serde_json::from_str(r#"{"path":"microbit/a","artid":"abc","kind":"ptr"}"#).unwrap();
        assert_eq!(record.artid, "abc");
        assert!(record.htmlartid.is_empty());
    }

    #[test]
    fn pointer_request_sends_every_legacy_field_empty() {
        let json = serde_json::to_value(NewPointer::to_content("microbit/a", "abc")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "microbit/a",
                "htmlartid": "",
                "artid": "abc",
                "scriptid": "",
                "releaseid": "",
                "redirect": ""
            })
        );
    }
}
