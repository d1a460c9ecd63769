//! Structural sharing and content addressing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hashfs_cas::{CasResult, ContentHash, ContentStore, MemoryStore};
use hashfs_vfs::resolve::resolve;
use hashfs_vfs::{CasObjects, ObjectStore, TreeFs, TreeFsConfig, VfsOps};

/// Counts `put` calls on top of a memory store.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    puts: AtomicUsize,
}

impl CountingStore {
    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ContentStore for CountingStore {
    fn put(&self, bytes: &[u8]) -> CasResult<ContentHash> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(bytes)
    }

    fn get(&self, hash: &ContentHash) -> CasResult<Option<Vec<u8>>> {
        self.inner.get(hash)
    }

    fn size(&self, hash: &ContentHash) -> CasResult<Option<u64>> {
        self.inner.size(hash)
    }
}

async fn counted_fs() -> (Arc<CountingStore>, TreeFs) {
    let counting = Arc::new(CountingStore::default());
    let objects: Arc<dyn ObjectStore> = Arc::new(CasObjects::new(counting.clone()));
    let fs = TreeFs::open(objects, TreeFsConfig::default(), None)
        .await
        .unwrap();
    (counting, fs)
}

#[tokio::test]
async fn chmod_at_depth_stores_one_directory_per_level() {
    let (counting, fs) = counted_fs().await;
    fs.create_dir("/a", 0o040755).await.unwrap();
    fs.create_dir("/a/b", 0o040755).await.unwrap();
    fs.create_dir("/a/b/c", 0o040755).await.unwrap();

    // parent "/a/b" is depth 2: itself, "/a" and the root
    let before = counting.puts();
    fs.chmod("/a/b/c", 0o700).await.unwrap();
    assert_eq!(counting.puts() - before, 3);
}

#[tokio::test]
async fn siblings_keep_their_hashes() {
    let (_, fs) = counted_fs().await;
    fs.create_dir("/left", 0o040755).await.unwrap();
    fs.create_dir("/right", 0o040755).await.unwrap();
    fs.write_file("/right/r.txt", b"r", 0o100644).await.unwrap();

    let old = fs.snapshot();
    fs.write_file("/left/l.txt", b"l", 0o100644).await.unwrap();
    let new = fs.snapshot();

    let store = fs.store().as_ref();
    let right_old = resolve(store, &old, "/right").await.unwrap();
    let right_new = resolve(store, &new, "/right").await.unwrap();
    assert_eq!(right_old, right_new);

    let left_old = resolve(store, &old, "/left").await.unwrap();
    let left_new = resolve(store, &new, "/left").await.unwrap();
    assert_ne!(left_old.content, left_new.content);
}

#[tokio::test]
async fn identical_subtrees_share_a_hash() {
    let (_, fs) = counted_fs().await;
    for dir in ["/x", "/y"] {
        fs.create_dir(dir, 0o040755).await.unwrap();
        fs.write_file(&format!("{dir}/same.txt"), b"same", 0o100644)
            .await
            .unwrap();
    }

    let root = fs.snapshot();
    let store = fs.store().as_ref();
    let x = resolve(store, &root, "/x").await.unwrap();
    let y = resolve(store, &root, "/y").await.unwrap();
    assert_eq!(x.content, y.content);
}

#[tokio::test]
async fn identical_bytes_share_one_blob() {
    let (_, fs) = counted_fs().await;
    let a = fs.write_file("/a.txt", b"twin", 0o100644).await.unwrap();
    let b = fs.write_file("/b.txt", b"twin", 0o100644).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a, ContentHash::of(b"twin"));

    let names: Vec<_> = fs
        .read_dir("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn undo_returns_to_the_same_root() {
    let (_, fs) = counted_fs().await;
    fs.create_dir("/keep", 0o040755).await.unwrap();
    let before = fs.snapshot();

    fs.create_dir("/tmp", 0o040755).await.unwrap();
    fs.rmdir("/tmp").await.unwrap();

    assert_eq!(fs.snapshot(), before);
}

#[tokio::test]
async fn failed_mutation_stores_nothing() {
    let (counting, fs) = counted_fs().await;
    fs.create_dir("/ro", 0o040555).await.unwrap();
    let before = counting.puts();
    let root = fs.snapshot();

    assert!(fs.create_dir("/ro/sub", 0o040755).await.is_err());
    assert!(fs.create_dir("/missing/sub", 0o040755).await.is_err());
    assert!(fs.rename("/ro", "/ro/inner").await.is_err());

    assert_eq!(counting.puts(), before);
    assert_eq!(fs.snapshot(), root);
}
