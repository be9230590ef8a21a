//! High-level pipeline: orchestrates read → rewrite → dedup → upload → pointer
//! for every document of a run.
//!
//! This module implements the publish run as a coordinated pipeline that:
//!   - Reads each selected document from the docs tree
//!   - Rewrites static asset references in text documents, uploading each
//!     referenced asset first (see [`crate::resolve`])
//!   - Hashes the final bytes and reuses the store's copy when one exists,
//!     uploading only on a miss
//!   - Points the document's logical path at the resulting content id
//!     (see [`crate::pointer`])
//!   - Aggregates a [`PublishReport`] of what was published, what failed, and
//!     which static assets nothing referenced
//!
//! # Major Types
//! - [`Publisher`]: one run's pipeline; owns the per-run memo and usage marks
//! - [`UploadOutcome`]: result of a single file, shared by every caller
//! - [`PublishReport`]: aggregated output of a run
//!
//! # Concurrency
//! Top-level documents are driven with a fixed bound. Nested uploads started
//! by reference rewriting go through the same memo, and every file read and
//! store call (top-level or nested) holds a permit of one shared semaphore.
//! Permits are never held while waiting on referenced assets.
//!
//! # Error Handling
//! Store failures fail only the file concerned and are collected in the
//! report. Unknown content types, unreadable files and reference cycles are
//! returned as errors and stop the run.
//!
//! # Navigation
//! - Main entrypoint: [`publish`]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::PublishConfig;
use crate::content_type::{content_type, is_text};
use crate::contract::{NewContent, RemoteStore};
use crate::error::PublishError;
use crate::hash::content_hash;
use crate::pointer::{self, content_id_from_blob_url, logical_path, PointerStatus};
use crate::resolve::{resolve_references, ReferencePattern};

/// Which directory a logical path is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceRoot {
    Docs,
    Theme,
}

/// A file of the run, identified by its root and logical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileRef {
    pub root: SourceRoot,
    pub path: String,
}

impl FileRef {
    pub fn docs(path: impl Into<String>) -> Self {
        Self {
            root: SourceRoot::Docs,
            path: path.into(),
        }
    }
}

/// Whether content had to be sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    Uploaded,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub path: String,
    pub blob_url: String,
    pub hash: String,
    pub content: ContentStatus,
    /// `None` for static assets, which are only reachable through references.
    pub pointer: Option<PointerStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: String,
    pub reason: PublishError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Published(PublishedFile),
    Failed(FailedFile),
}

impl UploadOutcome {
    pub fn path(&self) -> &str {
        match self {
            UploadOutcome::Published(f) => &f.path,
            UploadOutcome::Failed(f) => &f.path,
        }
    }
}

/// Pending or completed upload of one file, cloneable by every waiter.
pub type UploadFuture = Shared<BoxFuture<'static, Result<UploadOutcome, PublishError>>>;

/// Pending or completed store write for one content hash.
type StoreFuture = Shared<BoxFuture<'static, Result<(String, ContentStatus), String>>>;

/// Output of a publish run, sorted by path.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub files: Vec<PublishedFile>,
    pub failures: Vec<FailedFile>,
    /// Static assets that were uploaded but never referenced.
    pub unused_assets: Vec<String>,
}

impl PublishReport {
    pub fn uploaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.content == ContentStatus::Uploaded)
            .count()
    }

    pub fn pointers_set(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.pointer, Some(PointerStatus::Set { .. })))
            .count()
    }

    pub fn file(&self, path: &str) -> Option<&PublishedFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mutable state of a single run: created with the [`Publisher`] at run start
/// and cleared when [`publish`] returns.
#[derive(Default)]
struct RunContext {
    /// One upload per file per run.
    uploads: Mutex<HashMap<FileRef, UploadFuture>>,
    /// One store write per content hash per run.
    stored: Mutex<HashMap<String, StoreFuture>>,
    /// Paths consumed as embedded references.
    used: Mutex<HashSet<String>>,
    /// Wait-for edges between documents and the assets they embed.
    waits: Mutex<HashMap<FileRef, HashSet<FileRef>>>,
}

impl RunContext {
    fn mark_used(&self, path: &str) {
        lock(&self.used).insert(path.to_string());
    }

    fn is_used(&self, path: &str) -> bool {
        lock(&self.used).contains(path)
    }

    /// Record that `from` waits on `to`, unless `to` already (transitively)
    /// waits on `from`.
    fn add_wait(&self, from: &FileRef, to: &FileRef) -> Result<(), PublishError> {
        let mut waits = lock(&self.waits);
        if let Some(back) = find_path(&waits, to, from) {
            let mut chain = vec![from.path.clone()];
            chain.extend(back.into_iter().map(|f| f.path));
            return Err(PublishError::ReferenceCycle { chain });
        }
        waits.entry(from.clone()).or_default().insert(to.clone());
        Ok(())
    }

    fn clear(&self) {
        lock(&self.uploads).clear();
        lock(&self.stored).clear();
    }
}

/// Path `start → … → goal` in `graph`, both ends included.
fn find_path(
    graph: &HashMap<FileRef, HashSet<FileRef>>,
    start: &FileRef,
    goal: &FileRef,
) -> Option<Vec<FileRef>> {
    let mut parent: HashMap<&FileRef, &FileRef> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut seen = HashSet::from([start]);
    while let Some(node) = queue.pop_front() {
        if node == goal {
            let mut path = vec![node.clone()];
            let mut cur = node;
            while let Some(prev) = parent.get(cur) {
                path.push((*prev).clone());
                cur = *prev;
            }
            path.reverse();
            return Some(path);
        }
        for next in graph.get(node).into_iter().flatten() {
            if seen.insert(next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

fn display_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// The upload pipeline of one run.
pub struct Publisher<S> {
    config: PublishConfig,
    store: Arc<S>,
    references: ReferencePattern,
    permits: Semaphore,
    ctx: RunContext,
}

impl<S> Publisher<S>
where
    S: RemoteStore + 'static,
{
    pub fn new(config: PublishConfig, store: Arc<S>) -> Result<Arc<Self>, PublishError> {
        let references = ReferencePattern::new(&config.static_prefix)?;
        let permits = Semaphore::new(config.concurrency.max(1));
        Ok(Arc::new(Self {
            config,
            store,
            references,
            permits,
            ctx: RunContext::default(),
        }))
    }

    fn root_dir(&self, root: SourceRoot) -> PathBuf {
        match root {
            SourceRoot::Docs => self.config.docs_dir.clone(),
            SourceRoot::Theme => self.config.theme_dir.clone(),
        }
    }

    fn is_static(&self, file: &FileRef) -> bool {
        file.root == SourceRoot::Docs && file.path.starts_with(&self.config.static_prefix)
    }

    /// Upload `file` once per run. Every call for the same file returns the
    /// same shared outcome, whether it is still pending or already settled.
    pub fn upload(self: &Arc<Self>, file: FileRef) -> UploadFuture {
        let mut uploads = lock(&self.ctx.uploads);
        if let Some(pending) = uploads.get(&file) {
            return pending.clone();
        }
        let this = Arc::clone(self);
        let key = file.clone();
        let fut = async move { this.upload_uncached(key).await }
            .boxed()
            .shared();
        uploads.insert(file, fut.clone());
        fut
    }

    async fn upload_uncached(self: Arc<Self>, file: FileRef) -> Result<UploadOutcome, PublishError> {
        let content_type = content_type(&file.path).ok_or_else(|| {
            PublishError::UnknownContentType {
                path: file.path.clone(),
            }
        })?;
        let bytes = self.read(&file).await?;

        let bytes = if is_text(content_type) {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            match self.rewrite(&file, &body).await {
                Ok(rewritten) => rewritten.into_bytes(),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(self.fail(&file, e)),
            }
        } else {
            bytes
        };

        let hash = content_hash(&bytes, self.config.hash_len);
        let (blob_url, content) = match self.store_content(&file, content_type, &hash, bytes).await {
            Ok(stored) => stored,
            Err(e) => return Ok(self.fail(&file, e)),
        };

        let pointer = if self.is_static(&file) {
            None
        } else {
            match self.point(&file, &blob_url).await {
                Ok(status) => Some(status),
                Err(e) => return Ok(self.fail(&file, e)),
            }
        };

        Ok(UploadOutcome::Published(PublishedFile {
            path: file.path,
            blob_url,
            hash,
            content,
            pointer,
        }))
    }

    fn fail(&self, file: &FileRef, reason: PublishError) -> UploadOutcome {
        error!(path = %file.path, error = %reason, "Failed to publish file");
        UploadOutcome::Failed(FailedFile {
            path: file.path.clone(),
            reason,
        })
    }

    async fn read(&self, file: &FileRef) -> Result<Vec<u8>, PublishError> {
        let full = self.root_dir(file.root).join(file.path.trim_start_matches('/'));
        let _permit = self.permits.acquire().await.ok();
        tokio::fs::read(&full).await.map_err(|e| {
            error!(path = %full.display(), error = ?e, "Failed to read file");
            PublishError::Read {
                path: file.path.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Upload every asset `body` references, then substitute their blob urls.
    async fn rewrite(self: &Arc<Self>, file: &FileRef, body: &str) -> Result<String, PublishError> {
        let references = self.references.references(body);
        if let Some(unknown) = references.iter().find(|r| content_type(r).is_none()) {
            return Err(PublishError::UnknownContentType {
                path: unknown.clone(),
            });
        }

        let result = resolve_references(body, &self.references, |reference| {
            self.resolve_reference(file, FileRef::docs(reference))
        })
        .await;

        result.map_err(|errors| {
            errors
                .into_iter()
                .min_by_key(|e| !e.is_fatal())
                .unwrap_or_else(|| PublishError::UnresolvedReference {
                    path: file.path.clone(),
                    reference: String::new(),
                })
        })
    }

    fn resolve_reference(
        self: &Arc<Self>,
        from: &FileRef,
        target: FileRef,
    ) -> BoxFuture<'static, Result<String, PublishError>> {
        self.ctx.mark_used(&target.path);
        if let Err(e) = self.ctx.add_wait(from, &target) {
            return future::ready(Err(e)).boxed();
        }
        let pending = self.upload(target);
        let from_path = from.path.clone();
        async move {
            match pending.await? {
                UploadOutcome::Published(asset) => Ok(asset.blob_url),
                UploadOutcome::Failed(asset) => Err(PublishError::UnresolvedReference {
                    path: from_path,
                    reference: asset.path,
                }),
            }
        }
        .boxed()
    }

    /// Reuse the store's copy of `hash` or upload `bytes`. Within a run each
    /// hash is written at most once; later files with the same bytes see
    /// [`ContentStatus::AlreadyPresent`].
    async fn store_content(
        self: &Arc<Self>,
        file: &FileRef,
        content_type: &str,
        hash: &str,
        bytes: Vec<u8>,
    ) -> Result<(String, ContentStatus), PublishError> {
        let (pending, first) = {
            let mut stored = lock(&self.ctx.stored);
            match stored.get(hash) {
                Some(pending) => (pending.clone(), false),
                None => {
                    let this = Arc::clone(self);
                    let req = NewContent {
                        content: bytes,
                        content_type: content_type.to_string(),
                        description: self.config.description.clone(),
                        name: display_name(&file.path),
                    };
                    let path = file.path.clone();
                    let key = hash.to_string();
                    let fut = async move { this.lookup_or_create(&path, &key, req).await }
                        .boxed()
                        .shared();
                    stored.insert(hash.to_string(), fut.clone());
                    (fut, true)
                }
            }
        };

        match pending.await {
            Ok((blob_url, status)) if first => Ok((blob_url, status)),
            Ok((blob_url, _)) => {
                debug!(path = %file.path, blob_url = %blob_url, "already present");
                Ok((blob_url, ContentStatus::AlreadyPresent))
            }
            Err(message) => Err(PublishError::Store {
                path: file.path.clone(),
                message,
            }),
        }
    }

    async fn lookup_or_create(
        &self,
        path: &str,
        hash: &str,
        req: NewContent,
    ) -> Result<(String, ContentStatus), String> {
        let _permit = self.permits.acquire().await.ok();
        let existing = self
            .store
            .lookup_by_hash(hash)
            .await
            .map_err(|e| e.to_string())?;
        if let Some(item) = existing.items.into_iter().next() {
            debug!(path = %path, blob_url = %item.bloburl, "already present");
            return Ok((item.bloburl, ContentStatus::AlreadyPresent));
        }
        let created = self
            .store
            .create_content(req)
            .await
            .map_err(|e| e.to_string())?;
        info!(path = %path, blob_url = %created.bloburl, "upload");
        Ok((created.bloburl, ContentStatus::Uploaded))
    }

    async fn point(&self, file: &FileRef, blob_url: &str) -> Result<PointerStatus, PublishError> {
        let content_id =
            content_id_from_blob_url(blob_url).ok_or_else(|| PublishError::UnrecognizedBlobUrl {
                path: file.path.clone(),
                url: blob_url.to_string(),
            })?;
        let path = logical_path(&self.config.target, &file.path);
        let _permit = self.permits.acquire().await.ok();
        pointer::publish_pointer(self.store.as_ref(), &path, content_id)
            .await
            .map_err(|e| PublishError::Store {
                path: file.path.clone(),
                message: e.to_string(),
            })
    }

    /// Static assets of the run that no document referenced.
    fn unused_assets(&self) -> Vec<String> {
        let mut unused: Vec<String> = lock(&self.ctx.uploads)
            .keys()
            .filter(|f| self.is_static(f) && !self.ctx.is_used(&f.path))
            .map(|f| f.path.clone())
            .collect();
        unused.sort();
        unused
    }

    fn report(&self, unused_assets: Vec<String>) -> PublishReport {
        let mut report = PublishReport {
            unused_assets,
            ..Default::default()
        };
        for pending in lock(&self.ctx.uploads).values() {
            match pending.peek() {
                Some(Ok(UploadOutcome::Published(f))) => report.files.push(f.clone()),
                Some(Ok(UploadOutcome::Failed(f))) => report.failures.push(f.clone()),
                Some(Err(_)) | None => {}
            }
        }
        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        report
    }

    async fn run(self: &Arc<Self>, paths: Vec<String>) -> Result<PublishReport, PublishError> {
        let mut uploads = stream::iter(paths)
            .map(|path| self.upload(FileRef::docs(path)))
            .buffer_unordered(self.config.concurrency.max(1));
        while let Some(outcome) = uploads.next().await {
            outcome?;
        }
        drop(uploads);

        let unused = self.unused_assets();
        for path in &unused {
            warn!(path = %path, "unused");
        }

        if self.config.publish_theme {
            let theme = FileRef {
                root: SourceRoot::Theme,
                path: self.config.theme_file.clone(),
            };
            self.upload(theme).await?;
        }

        Ok(self.report(unused))
    }
}

/// Publish `paths` (logical paths under `config.docs_dir`) to `store`.
///
/// Every path's content type is checked before any file is read or uploaded,
/// so an unknown type aborts the run with nothing written.
pub async fn publish<S>(
    config: &PublishConfig,
    store: Arc<S>,
    paths: Vec<String>,
) -> Result<PublishReport, PublishError>
where
    S: RemoteStore + 'static,
{
    info!(files = paths.len(), "Starting publish run");
    if let Some(unknown) = paths.iter().find(|p| content_type(p).is_none()) {
        error!(path = %unknown, "content type not understood");
        return Err(PublishError::UnknownContentType {
            path: unknown.clone(),
        });
    }

    let publisher = Publisher::new(config.clone(), store)?;
    let result = publisher.run(paths).await;
    publisher.ctx.clear();

    match &result {
        Ok(report) => info!(
            files = report.files.len(),
            uploaded = report.uploaded(),
            pointers_set = report.pointers_set(),
            failures = report.failures.len(),
            unused = report.unused_assets.len(),
            "ALL DONE"
        ),
        Err(e) => error!(error = %e, "Publish run aborted"),
    }
    result
}
