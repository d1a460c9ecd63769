//! Mount table composed of copy-on-write and in-memory backends.

use std::sync::Arc;

use hashfs_cas::MemoryStore;
use hashfs_vfs::{
    CasObjects, MemoryBackend, MountTable, ObjectStore, TreeFs, TreeFsConfig, VfsError, VfsOps,
};

fn objects() -> Arc<dyn ObjectStore> {
    Arc::new(CasObjects::from_store(MemoryStore::new()))
}

async fn tree() -> TreeFs {
    TreeFs::open(objects(), TreeFsConfig::default(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn nested_mount_allowed_after_unmount() {
    let table = MountTable::new();
    table.mount("/a", tree().await).await.unwrap();

    assert!(matches!(
        table.mount("/a/b", tree().await).await,
        Err(VfsError::MountConflict { .. })
    ));

    assert!(table.unmount("/a").await);
    table.mount("/a/b", tree().await).await.unwrap();

    let mounts = table.list_mounts().await;
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].path, "/a/b");
    assert!(mounts[0].copy_on_write);
}

#[tokio::test]
async fn paths_are_translated_relative_to_mount() {
    let fs = Arc::new(tree().await);
    let table = MountTable::new();
    table.mount_arc("/data", fs.clone()).await.unwrap();

    table.create_dir("/data/docs", 0o040755).await.unwrap();
    let blob = fs.store().put_blob(b"hello").await.unwrap();
    table
        .create_file("/data/docs", &blob, "readme.txt", 0o100644)
        .await
        .unwrap();

    // visible through the backend without the mount prefix
    assert_eq!(fs.read_file("/docs/readme.txt").await.unwrap(), b"hello");
    assert_eq!(
        table.read_file("/data/docs/readme.txt").await.unwrap(),
        b"hello"
    );

    let listing: Vec<_> = table
        .read_dir("/data")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(listing, vec!["docs"]);
}

#[tokio::test]
async fn mixed_backends() {
    let table = MountTable::new();
    table.mount("/cow", tree().await).await.unwrap();
    table
        .mount("/scratch", MemoryBackend::new(objects()))
        .await
        .unwrap();

    table.create_dir("/cow/a", 0o040755).await.unwrap();
    table.create_dir("/scratch/a", 0o040755).await.unwrap();
    table.symlink("/cow/a", "/scratch/link").await.unwrap();
    assert_eq!(table.readlink("/scratch/link").await.unwrap(), "/cow/a");

    let flags: Vec<_> = table
        .list_mounts()
        .await
        .into_iter()
        .map(|m| (m.path, m.copy_on_write))
        .collect();
    assert_eq!(
        flags,
        vec![("/cow".to_string(), true), ("/scratch".to_string(), false)]
    );

    assert!(matches!(
        table.rename("/cow/a", "/scratch/b").await,
        Err(VfsError::CrossDevice { .. })
    ));
    table.rename("/cow/a", "/cow/b").await.unwrap();
    assert!(table.stat("/cow/b").await.unwrap().mode & 0o040000 != 0);
}

#[tokio::test]
async fn chunked_reads_follow_the_backend() {
    let disabled = TreeFs::open(
        objects(),
        TreeFsConfig::default().with_chunked_reads(false),
        None,
    )
    .await
    .unwrap();
    disabled.write_file("/f", b"abcdef", 0o100644).await.unwrap();

    let table = MountTable::new();
    table.mount("/slow", disabled).await.unwrap();

    assert!(matches!(
        table.read_file_in_chunks("/slow/f", 2, 0).await,
        Err(VfsError::ChunkedReadUnsupported(_))
    ));
    assert_eq!(table.read_file("/slow/f").await.unwrap(), b"abcdef");
}
