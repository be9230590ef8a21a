//! Pointer publication: the stable mapping from a logical document path to the
//! content id it currently resolves to.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::contract::{NewPointer, RemoteStore, StoreError};

/// What publishing a pointer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerStatus {
    /// The pointer was written and now refers to `content_id`.
    Set { content_id: String },
    /// The pointer already referred to `content_id`; nothing was written.
    AlreadySet { content_id: String },
}

impl PointerStatus {
    pub fn content_id(&self) -> &str {
        match self {
            PointerStatus::Set { content_id } | PointerStatus::AlreadySet { content_id } => {
                content_id
            }
        }
    }
}

/// Logical path for a document: `/<target><path>` with a trailing `.md` removed.
pub fn logical_path(target: &str, doc_path: &str) -> String {
    let stripped = doc_path.strip_suffix(".md").unwrap_or(doc_path);
    format!("/{}{}", target.trim_matches('/'), stripped)
}

/// Store-safe form of a path: anything outside `[A-Za-z0-9_@/]` becomes `-`,
/// leading slashes are dropped.
pub fn sanitize_path(path: &str) -> String {
    let replaced: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '/') {
                c
            } else {
                '-'
            }
        })
        .collect();
    replaced.trim_start_matches('/').to_string()
}

/// Store id of the pointer for `path`.
pub fn pointer_id(path: &str) -> String {
    let path = path.strip_prefix("ptr-").unwrap_or(path);
    let flat = sanitize_path(path).replace('/', "-");
    format!("ptr-{flat}")
}

/// Content id embedded in a blob url as `/pub/<id>`.
pub fn content_id_from_blob_url(url: &str) -> Option<&str> {
    static PUB_ID: OnceLock<Regex> = OnceLock::new();
    let re = PUB_ID.get_or_init(|| Regex::new(r"/pub/([a-z]+)").expect("static regex"));
    re.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Make the pointer for `path` refer to `content_id`, writing only if needed.
///
/// A missing pointer counts as an empty record. A failed read is logged and
/// treated the same way; the write that follows is idempotent on the store.
pub async fn publish_pointer<S>(
    store: &S,
    path: &str,
    content_id: &str,
) -> Result<PointerStatus, StoreError>
where
    S: RemoteStore + ?Sized,
{
    let current = match store.get_pointer(&pointer_id(path)).await {
        Ok(record) => record.unwrap_or_default(),
        Err(e) => {
            warn!(path = %path, error = %e, "Failed to read current pointer, treating as unset");
            Default::default()
        }
    };

    if current.artid == content_id {
        debug!(path = %path, content_id = %content_id, "already set");
        return Ok(PointerStatus::AlreadySet {
            content_id: content_id.to_string(),
        });
    }

    store
        .set_pointer(NewPointer::to_content(sanitize_path(path), content_id))
        .await?;
    info!(path = %path, content_id = %content_id, "set to");
    Ok(PointerStatus::Set {
        content_id: content_id.to_string(),
    })
}
