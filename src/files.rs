//! Selection of the documents a run operates on.
//!
//! Logical paths are `/`-rooted and relative to the docs directory, e.g. a
//! file at `docs/reference/basic.md` has the logical path `/reference/basic.md`.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::PublishError;

/// Recursively list every file under `root` as logical paths, sorted.
/// Entries whose name starts with `.` are skipped, directories included.
pub fn list_documents(root: &Path) -> Result<Vec<String>, PublishError> {
    let walk_err = |message: String| PublishError::Walk {
        root: root.display().to_string(),
        message,
    };

    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()));
    for entry in walker {
        let entry = entry.map_err(|e| walk_err(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| walk_err(e.to_string()))?;
        paths.push(logical_path(rel));
    }
    debug!(root = %root.display(), count = paths.len(), "Listed documents");
    Ok(paths)
}

fn is_hidden(name: Option<&str>) -> bool {
    name.map(|n| n.starts_with('.')).unwrap_or(false)
}

fn logical_path(rel: &Path) -> String {
    let mut out = String::new();
    for comp in rel.components() {
        if let Component::Normal(part) = comp {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Documents a run should process.
///
/// Explicit `args` must be paths under `docs_dir` (e.g. `docs/a.md`); any
/// other argument is rejected. Without arguments the whole tree is used,
/// minus paths starting with `private_prefix`.
pub fn select_documents(
    docs_dir: &Path,
    private_prefix: &str,
    args: &[String],
) -> Result<Vec<String>, PublishError> {
    if args.is_empty() {
        let all = list_documents(docs_dir)?;
        let total = all.len();
        let selected: Vec<String> = all
            .into_iter()
            .filter(|p| private_prefix.is_empty() || !p.starts_with(private_prefix))
            .collect();
        info!(
            total,
            selected = selected.len(),
            "Selected documents from tree"
        );
        return Ok(selected);
    }

    args.iter()
        .map(|arg| {
            rooted_arg(docs_dir, arg).ok_or_else(|| PublishError::InvalidPath {
                root: docs_dir.display().to_string(),
                arg: arg.clone(),
            })
        })
        .collect()
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Logical path of `arg` when it names a file strictly inside `docs_dir`.
/// `..` and root components in the remainder are refused.
fn rooted_arg(docs_dir: &Path, arg: &str) -> Option<String> {
    let arg = without_cur_dir(Path::new(arg));
    let rel = arg.strip_prefix(without_cur_dir(docs_dir)).ok()?;
    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(logical_path(rel)).filter(|p| !p.is_empty())
}
