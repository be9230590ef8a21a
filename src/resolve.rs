//! Discovery and rewriting of static asset references inside text documents.
//!
//! Rewriting is split in two passes around an asynchronous join: first every
//! distinct reference is discovered and handed to the resolver, then, once all
//! of them have settled, the body is rewritten synchronously from the
//! collected results. Both passes use the same pattern over the same body, so
//! they see the same set of matches.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;
use regex::{Captures, Regex};
use tracing::debug;

/// Matches an asset path rooted at the static prefix, optionally preceded by
/// relative segments (`../`, `./`). Capture group 1 is the rooted path.
#[derive(Debug, Clone)]
pub struct ReferencePattern {
    regex: Regex,
}

impl ReferencePattern {
    pub fn new(static_prefix: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(
            r"[./]*({}[A-Za-z0-9_.\-/]+)",
            regex::escape(static_prefix)
        ))?;
        Ok(Self { regex })
    }

    /// Distinct referenced paths, in order of first appearance.
    pub fn references(&self, body: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for caps in self.regex.captures_iter(body) {
            let path = &caps[1];
            if !seen.iter().any(|p: &String| p == path) {
                seen.push(path.to_string());
            }
        }
        seen
    }
}

/// Replace every reference in `body` by the identifier `resolve` yields for it.
///
/// `resolve` is called once per distinct referenced path. All calls are
/// awaited before anything is rewritten; if any of them fails, every error is
/// returned and no rewritten body is produced.
pub async fn resolve_references<F, Fut, E>(
    body: &str,
    pattern: &ReferencePattern,
    mut resolve: F,
) -> Result<String, Vec<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, E>>,
{
    let references = pattern.references(body);
    if references.is_empty() {
        return Ok(body.to_string());
    }
    debug!(count = references.len(), "Resolving embedded references");

    let pending: Vec<_> = references.iter().cloned().map(&mut resolve).collect();
    let settled = join_all(pending).await;

    let mut resolved = HashMap::with_capacity(references.len());
    let mut errors = Vec::new();
    for (reference, result) in references.into_iter().zip(settled) {
        match result {
            Ok(id) => {
                resolved.insert(reference, id);
            }
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let rewritten = pattern.regex.replace_all(body, |caps: &Captures| {
        resolved
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(rewritten.into_owned())
}
