//! Read-only link check over a set of documents.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::content_type::{content_type, is_text};
use crate::error::PublishError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    /// Document containing the link.
    pub file: String,
    /// Link target as written, without fragment or query.
    pub target: String,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    /// Number of text documents scanned.
    pub checked: usize,
    pub broken: Vec<BrokenLink>,
}

fn link_pattern() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"\]\((/[^)]+)\)").expect("static regex"))
}

fn strip_extension(path: &str) -> &str {
    static EXT: OnceLock<Regex> = OnceLock::new();
    let re = EXT.get_or_init(|| Regex::new(r"(?i)\.[a-z0-9]+$").expect("static regex"));
    match re.find(path) {
        Some(m) if m.start() > 0 => &path[..m.start()],
        _ => path,
    }
}

/// Root-relative markdown link targets in `body`, fragment and query removed.
pub fn link_targets(body: &str) -> Vec<&str> {
    link_pattern()
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let target = m.as_str();
            let end = target.find(|c: char| c == '#' || c == '?').unwrap_or(target.len());
            &target[..end]
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Check every root-relative link of every text document in `paths`.
///
/// A link is valid when it names one of `paths` with its extension stripped
/// (`/guide` for `/guide.md`). Links that spell out the full file name
/// (`/guide.md`, `/static/logo.png`) are accepted as well, a deliberate
/// widening over matching stripped paths only. Non-text documents are counted
/// as known targets only.
pub async fn check_links(docs_dir: &Path, paths: &[String]) -> Result<CheckReport, PublishError> {
    info!(files = paths.len(), "checking docs");
    let mut known: HashSet<&str> = HashSet::new();
    for path in paths {
        known.insert(path.as_str());
        known.insert(strip_extension(path));
    }

    let mut report = CheckReport::default();
    for path in paths {
        if !content_type(path).map(is_text).unwrap_or(false) {
            continue;
        }
        debug!(path = %path, "checking");
        let full = docs_dir.join(path.trim_start_matches('/'));
        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|e| PublishError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let body = String::from_utf8_lossy(&bytes);
        report.checked += 1;

        for target in link_targets(&body) {
            if known.contains(target) {
                continue;
            }
            warn!(file = %path, target = %target, "broken link");
            report.broken.push(BrokenLink {
                file: path.clone(),
                target: target.to_string(),
            });
        }
    }
    info!(
        checked = report.checked,
        broken = report.broken.len(),
        "Link check complete"
    );
    Ok(report)
}
