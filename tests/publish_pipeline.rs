use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use docs_publish::config::PublishConfig;
use docs_publish::contract::{
    ContentQuery, MockRemoteStore, NewContent, NewPointer, PointerRecord, RemoteStore,
    StoreError, StoredContent,
};
use docs_publish::error::PublishError;
use docs_publish::files::select_documents;
use docs_publish::pointer::PointerStatus;
use docs_publish::publish::{publish, ContentStatus};

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Docs-only run; theme publishing is covered by its own tests.
fn config(root: &Path) -> PublishConfig {
    PublishConfig {
        docs_dir: root.to_path_buf(),
        target: "microbit".into(),
        publish_theme: false,
        ..Default::default()
    }
}

/// Content id derived from a display name: letters only, so it matches `/pub/<id>`.
fn id_for(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

fn blob(id: &str) -> String {
    format!("https://cdn.example/pub/{id}")
}

/// Store that has nothing yet, records every upload and accepts every pointer.
fn empty_store(created: Arc<Mutex<Vec<NewContent>>>) -> MockRemoteStore {
    let mut store = MockRemoteStore::new();
    store
        .expect_lookup_by_hash()
        .returning(|_| Ok(ContentQuery::default()));
    store.expect_create_content().returning(move |req| {
        let id = id_for(&req.name);
        created.lock().unwrap().push(req);
        Ok(StoredContent { bloburl: blob(&id) })
    });
    store.expect_get_pointer().returning(|_| Ok(None));
    store
}

fn scenario_tree() -> TempDir {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.md", b"see ![x](/static/img/x.png)");
    write(dir.path(), "static/img/x.png", &[137, 80, 78, 71, 1, 2, 3]);
    dir
}

#[tokio::test]
async fn embedded_asset_is_uploaded_and_document_rewritten() {
    let dir = scenario_tree();
    let created = Arc::new(Mutex::new(Vec::new()));
    let mut store = empty_store(created.clone());
    store
        .expect_set_pointer()
        .withf(|p: &NewPointer| p.path == "microbit/a" && p.artid == "amd")
        .times(1)
        .returning(|_| Ok(()));

    let paths = vec!["/a.md".to_string(), "/static/img/x.png".to_string()];
    let report = publish(&config(dir.path()), Arc::new(store), paths)
        .await
        .expect("publish should succeed");

    let created = created.lock().unwrap();
    let png_uploads: Vec<_> = created.iter().filter(|c| c.name == "x.png").collect();
    assert_eq!(png_uploads.len(), 1, "x.png must be uploaded exactly once");
    assert_eq!(png_uploads[0].content_type, "image/png");
    assert_eq!(png_uploads[0].description, "#kindupload");

    let doc = created.iter().find(|c| c.name == "a.md").expect("a.md uploaded");
    assert_eq!(
        String::from_utf8(doc.content.clone()).unwrap(),
        format!("see ![x]({})", blob("xpng"))
    );
    assert_eq!(doc.content_type, "text/markdown");

    let a = report.file("/a.md").unwrap();
    assert_eq!(a.content, ContentStatus::Uploaded);
    assert_eq!(
        a.pointer,
        Some(PointerStatus::Set {
            content_id: "amd".into()
        })
    );
    let x = report.file("/static/img/x.png").unwrap();
    assert_eq!(x.pointer, None, "static assets get no pointer");
    assert!(report.unused_assets.is_empty(), "x.png is referenced");
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn unchanged_rerun_writes_nothing() {
    let dir = scenario_tree();
    let mut store = MockRemoteStore::new();
    store.expect_lookup_by_hash().returning(|_| {
        Ok(ContentQuery {
            items: vec![StoredContent {
                bloburl: blob("known"),
            }],
        })
    });
    store.expect_create_content().times(0);
    store.expect_get_pointer().times(1).returning(|_| {
        Ok(Some(PointerRecord {
            artid: "known".into(),
            ..Default::default()
        }))
    });
    store.expect_set_pointer().times(0);

    let paths = vec!["/a.md".to_string(), "/static/img/x.png".to_string()];
    let report = publish(&config(dir.path()), Arc::new(store), paths)
        .await
        .unwrap();

    assert_eq!(report.uploaded(), 0);
    assert_eq!(report.pointers_set(), 0);
    assert_eq!(
        report.file("/a.md").unwrap().pointer,
        Some(PointerStatus::AlreadySet {
            content_id: "known".into()
        })
    );
    assert_eq!(
        report.file("/static/img/x.png").unwrap().content,
        ContentStatus::AlreadyPresent
    );
}

#[tokio::test]
async fn unknown_content_type_aborts_before_any_store_call() {
    let dir = scenario_tree();
    write(dir.path(), "blob.xyz", b"???");
    // No expectations: any store call panics the mock.
    let store = MockRemoteStore::new();

    let paths = vec!["/a.md".to_string(), "/blob.xyz".to_string()];
    let err = publish(&config(dir.path()), Arc::new(store), paths)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PublishError::UnknownContentType {
            path: "/blob.xyz".into()
        }
    );
}

#[tokio::test]
async fn unknown_embedded_content_type_aborts() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.md", b"download /static/firmware.bin here");
    write(dir.path(), "static/firmware.bin", &[0, 1]);
    let store = MockRemoteStore::new();

    let err = publish(&config(dir.path()), Arc::new(store), vec!["/a.md".into()])
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(
        err,
        PublishError::UnknownContentType {
            path: "/static/firmware.bin".into()
        }
    );
}

#[tokio::test]
async fn shared_asset_is_uploaded_once_for_many_documents() {
    let dir = tempdir().unwrap();
    for (name, rel) in [("a", "/static/logo.png"), ("b", "../static/logo.png"), ("c", "./static/logo.png")] {
        write(
            dir.path(),
            &format!("guide/{name}.md"),
            format!("# {name}\n![logo]({rel})\n").as_bytes(),
        );
    }
    write(dir.path(), "static/logo.png", &[1, 2, 3, 4]);

    let created = Arc::new(Mutex::new(Vec::new()));
    let mut store = empty_store(created.clone());
    store.expect_set_pointer().times(3).returning(|_| Ok(()));

    let paths = vec![
        "/guide/a.md".to_string(),
        "/guide/b.md".to_string(),
        "/guide/c.md".to_string(),
    ];
    let report = publish(&config(dir.path()), Arc::new(store), paths)
        .await
        .unwrap();

    let created = created.lock().unwrap();
    assert_eq!(created.iter().filter(|c| c.name == "logo.png").count(), 1);
    for name in ["a", "b", "c"] {
        let doc = created
            .iter()
            .find(|c| c.name == format!("{name}.md"))
            .unwrap();
        let body = String::from_utf8(doc.content.clone()).unwrap();
        assert_eq!(body, format!("# {name}\n![logo]({})\n", blob("logopng")));
        assert!(!body.contains("/static/"), "no unresolved reference left");
    }
    assert!(report.unused_assets.is_empty());
    assert_eq!(report.files.len(), 4);
}

#[tokio::test]
async fn identical_content_under_two_paths_uploads_once() {
    let dir = tempdir().unwrap();
    write(dir.path(), "one.md", b"same bytes");
    write(dir.path(), "two.md", b"same bytes");

    let mut store = MockRemoteStore::new();
    store
        .expect_lookup_by_hash()
        .times(1)
        .returning(|_| Ok(ContentQuery::default()));
    store
        .expect_create_content()
        .times(1)
        .returning(|_| Ok(StoredContent { bloburl: blob("same") }));
    store.expect_get_pointer().returning(|_| Ok(None));
    store
        .expect_set_pointer()
        .withf(|p: &NewPointer| p.artid == "same")
        .times(2)
        .returning(|_| Ok(()));

    let report = publish(
        &config(dir.path()),
        Arc::new(store),
        vec!["/one.md".into(), "/two.md".into()],
    )
    .await
    .unwrap();

    let one = report.file("/one.md").unwrap();
    let two = report.file("/two.md").unwrap();
    assert_eq!(one.blob_url, two.blob_url);
    assert_eq!(report.uploaded(), 1);
    assert_eq!(report.pointers_set(), 2);
}

#[tokio::test]
async fn unreferenced_static_asset_is_reported_once() {
    let dir = tempdir().unwrap();
    write(dir.path(), "index.md", b"![used](/static/used.png)");
    write(dir.path(), "static/used.png", &[1]);
    write(dir.path(), "static/orphan.png", &[2]);
    write(dir.path(), "_drafts/wip.md", b"![o](/static/orphan.png)");

    let created = Arc::new(Mutex::new(Vec::new()));
    let mut store = empty_store(created);
    store.expect_set_pointer().returning(|_| Ok(()));

    let paths = select_documents(dir.path(), "/_", &[]).unwrap();
    assert_eq!(
        paths,
        vec!["/index.md", "/static/orphan.png", "/static/used.png"]
    );
    let report = publish(&config(dir.path()), Arc::new(store), paths)
        .await
        .unwrap();

    assert_eq!(report.unused_assets, vec!["/static/orphan.png".to_string()]);
}

#[tokio::test]
async fn store_failure_only_fails_that_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "good.md", b"good");
    write(dir.path(), "bad.md", b"bad");

    let mut store = MockRemoteStore::new();
    store
        .expect_lookup_by_hash()
        .returning(|_| Ok(ContentQuery::default()));
    store.expect_create_content().returning(|req| {
        if req.name == "bad.md" {
            Err("503 service unavailable".into())
        } else {
            Ok(StoredContent {
                bloburl: blob(&id_for(&req.name)),
            })
        }
    });
    store.expect_get_pointer().returning(|_| Ok(None));
    store
        .expect_set_pointer()
        .withf(|p: &NewPointer| p.path == "microbit/good")
        .times(1)
        .returning(|_| Ok(()));

    let report = publish(
        &config(dir.path()),
        Arc::new(store),
        vec!["/bad.md".into(), "/good.md".into()],
    )
    .await
    .expect("soft failures do not abort the run");

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, "/good.md");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "/bad.md");
    assert_eq!(
        report.failures[0].reason,
        PublishError::Store {
            path: "/bad.md".into(),
            message: "503 service unavailable".into()
        }
    );
}

#[tokio::test]
async fn failed_asset_fails_referencing_document() {
    let dir = scenario_tree();
    let mut store = MockRemoteStore::new();
    store
        .expect_lookup_by_hash()
        .returning(|_| Ok(ContentQuery::default()));
    store
        .expect_create_content()
        .times(1)
        .returning(|_| Err("payload too large".into()));
    store.expect_set_pointer().times(0);

    let report = publish(&config(dir.path()), Arc::new(store), vec!["/a.md".into()])
        .await
        .unwrap();

    assert!(report.files.is_empty());
    let reasons: Vec<_> = report.failures.iter().map(|f| f.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec![
            PublishError::UnresolvedReference {
                path: "/a.md".into(),
                reference: "/static/img/x.png".into()
            },
            PublishError::Store {
                path: "/static/img/x.png".into(),
                message: "payload too large".into()
            },
        ]
    );
}

#[tokio::test]
async fn reference_cycle_aborts_the_run() {
    let dir = tempdir().unwrap();
    write(dir.path(), "index.md", b"<link href=\"/static/a.css\">");
    write(dir.path(), "static/a.css", b"@import url(/static/b.css);");
    write(dir.path(), "static/b.css", b"@import url(/static/a.css);");
    let store = MockRemoteStore::new();

    let err = publish(&config(dir.path()), Arc::new(store), vec!["/index.md".into()])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PublishError::ReferenceCycle {
            chain: vec![
                "/static/b.css".into(),
                "/static/a.css".into(),
                "/static/b.css".into()
            ]
        }
    );
}

#[tokio::test]
async fn default_run_publishes_theme_after_docs() {
    let docs = scenario_tree();
    let built = tempdir().unwrap();
    write(built.path(), "theme.json", br#"{"name":"microbit"}"#);

    let created = Arc::new(Mutex::new(Vec::new()));
    let mut store = empty_store(created.clone());
    store
        .expect_set_pointer()
        .withf(|p: &NewPointer| p.path == "microbit/a" || p.path == "microbit/theme-json")
        .times(2)
        .returning(|_| Ok(()));

    let cfg = PublishConfig {
        docs_dir: docs.path().to_path_buf(),
        theme_dir: built.path().to_path_buf(),
        target: "microbit".into(),
        ..Default::default()
    };
    let report = publish(&cfg, Arc::new(store), vec!["/a.md".into()])
        .await
        .unwrap();

    let theme = report.file("/theme.json").expect("theme published");
    assert_eq!(
        theme.pointer,
        Some(PointerStatus::Set {
            content_id: "themejson".into()
        })
    );
    let created = created.lock().unwrap();
    assert_eq!(created.last().unwrap().name, "theme.json");
    assert_eq!(created.last().unwrap().content_type, "application/json");
}

#[tokio::test]
async fn missing_theme_artifact_aborts_the_run() {
    let docs = scenario_tree();
    let empty_build = tempdir().unwrap();
    let created = Arc::new(Mutex::new(Vec::new()));
    let mut store = empty_store(created);
    store.expect_set_pointer().returning(|_| Ok(()));

    let cfg = PublishConfig {
        docs_dir: docs.path().to_path_buf(),
        theme_dir: empty_build.path().to_path_buf(),
        ..Default::default()
    };
    let err = publish(&cfg, Arc::new(store), vec!["/a.md".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Read { ref path, .. } if path == "/theme.json"));
}

/// Store that tracks how many calls are in flight at once.
#[derive(Default)]
struct CountingStore {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    uploads: AtomicUsize,
}

impl CountingStore {
    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn lookup_by_hash(&self, _hash: &str) -> Result<ContentQuery, StoreError> {
        self.enter().await;
        Ok(ContentQuery::default())
    }

    async fn create_content(&self, _req: NewContent) -> Result<StoredContent, StoreError> {
        self.enter().await;
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        let id = "a".repeat(n + 1);
        Ok(StoredContent { bloburl: blob(&id) })
    }

    async fn get_pointer(&self, _pointer_id: &str) -> Result<Option<PointerRecord>, StoreError> {
        self.enter().await;
        Ok(None)
    }

    async fn set_pointer(&self, _req: NewPointer) -> Result<(), StoreError> {
        self.enter().await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nested_uploads_share_the_concurrency_bound() {
    let dir = tempdir().unwrap();
    let mut body = String::from("# gallery\n");
    for i in 0..12 {
        write(dir.path(), &format!("static/img{i}.png"), &[i as u8, 42]);
        body.push_str(&format!("![{i}](/static/img{i}.png)\n"));
    }
    write(dir.path(), "gallery.md", body.as_bytes());

    let store = Arc::new(CountingStore::default());
    let mut cfg = config(dir.path());
    cfg.concurrency = 2;
    let report = publish(&cfg, store.clone(), vec!["/gallery.md".into()])
        .await
        .unwrap();

    assert_eq!(report.files.len(), 13);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 13);
    let max = store.max_in_flight.load(Ordering::SeqCst);
    assert!(max >= 1 && max <= 2, "max in-flight store calls was {max}");
}
