use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;

use fatfinder_scan::{
    Entry, EntryTree, FileSystem, FolderSizer, NodeId, ReloadCoordinator, ReloadError,
    ReloadOutcome, ScanConfig, ScanError, SharedTree, WarningKind,
};

#[derive(Debug, Clone, Copy)]
enum Node {
    Dir,
    File(u64),
    Denied,
}

/// In-memory filesystem. `read_dir` of the gated path waits on `gate`.
#[derive(Default)]
struct FakeFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    gate: Mutex<()>,
    gated: RwLock<Option<PathBuf>>,
}

impl FakeFs {
    fn new(entries: &[(&str, Node)]) -> Arc<Self> {
        let fs = Self::default();
        {
            let mut nodes = fs.nodes.write();
            for (path, node) in entries {
                nodes.insert(PathBuf::from(path), *node);
            }
        }
        Arc::new(fs)
    }

    fn gate_on(&self, path: &str) {
        *self.gated.write() = Some(PathBuf::from(path));
    }

    fn node(&self, path: &Path) -> Option<Node> {
        self.nodes.read().get(path).copied()
    }
}

impl FileSystem for FakeFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if self.gated.read().as_deref() == Some(path) {
            drop(self.gate.lock());
        }
        match self.node(path) {
            Some(Node::Dir) => Ok(self
                .nodes
                .read()
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            Some(Node::Denied) => Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Some(Node::File(_)) => Err(io::Error::other("not a directory")),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.node(path), Some(Node::Dir | Node::Denied))
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        match self.node(path) {
            Some(Node::File(size)) => Ok(size),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
        }
    }

    fn modified(&self, _path: &Path) -> io::Result<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH)
    }

    fn exists(&self, path: &Path) -> bool {
        self.node(path).is_some()
    }
}

fn fake_sizer(fs: &Arc<FakeFs>) -> FolderSizer {
    FolderSizer::with_filesystem(ScanConfig::default(), fs.clone()).unwrap()
}

/// /r
///   a/ (x: 100)
///     deep/ (z: 5)
///   b/ (w: 1000)
///   top: 42
fn fake_tree() -> Arc<FakeFs> {
    FakeFs::new(&[
        ("/r", Node::Dir),
        ("/r/a", Node::Dir),
        ("/r/a/x", Node::File(100)),
        ("/r/a/deep", Node::Dir),
        ("/r/a/deep/z", Node::File(5)),
        ("/r/b", Node::Dir),
        ("/r/b/w", Node::File(1000)),
        ("/r/top", Node::File(42)),
    ])
}

fn shared(sizer: &FolderSizer, root: &Path) -> SharedTree {
    let sized = sizer.scan(root, |_, _| {}).unwrap();
    Arc::new(RwLock::new(sized.tree))
}

fn id_of(tree: &SharedTree, path: &str) -> NodeId {
    tree.read().find_by_path(Path::new(path)).unwrap()
}

/// Check the shared tree from another thread until `stop` is set.
/// Returns how many consistent reads it made.
fn spawn_reader(tree: SharedTree, stop: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut reads = 0;
        loop {
            let done = stop.load(Ordering::SeqCst);
            assert_consistent(&tree.read());
            reads += 1;
            if done {
                return reads;
            }
        }
    })
}

fn assert_consistent(tree: &EntryTree) {
    for entry in tree.walk(tree.root()) {
        let Entry::Directory(dir) = entry else {
            continue;
        };
        let files_size: u64 = dir.files.iter().map(|f| tree.file(*f).unwrap().size).sum();
        let subs_size: u64 = dir
            .subfolders
            .iter()
            .map(|s| tree.directory(*s).unwrap().total_size)
            .sum();
        let items = dir.files.len() as u64
            + dir
                .subfolders
                .iter()
                .map(|s| tree.directory(*s).unwrap().num_items + 1)
                .sum::<u64>();

        assert_eq!(dir.files_size, files_size, "files_size of {}", dir.path.display());
        assert_eq!(
            dir.total_size,
            (files_size + subs_size).max(1),
            "total_size of {}",
            dir.path.display()
        );
        assert_eq!(dir.num_items, items, "num_items of {}", dir.path.display());
    }
}

#[test]
fn test_unreadable_subfolder_is_left_out() {
    let fs = FakeFs::new(&[
        ("/r", Node::Dir),
        ("/r/g", Node::File(5)),
        ("/r/locked", Node::Denied),
        ("/r/ok", Node::Dir),
        ("/r/ok/f", Node::File(10)),
    ]);

    let mut events = Vec::new();
    let sized = fake_sizer(&fs)
        .scan(Path::new("/r"), |fraction, _| events.push(fraction))
        .unwrap();

    assert!(sized.tree.find_by_path(Path::new("/r/locked")).is_none());
    assert_eq!(sized.total_size(), 15);
    assert_eq!(sized.num_items(), 3);
    assert_eq!(sized.warnings.len(), 1);
    assert_eq!(sized.warnings[0].kind, WarningKind::PermissionDenied);
    assert_eq!(sized.warnings[0].path, PathBuf::from("/r/locked"));
    // the failed folder still counts towards progress
    assert_eq!(events, vec![0.5, 1.0]);
    assert_consistent(&sized.tree);
}

#[test]
fn test_denied_root_fails_the_scan() {
    let fs = FakeFs::new(&[("/r", Node::Denied)]);
    let result = fake_sizer(&fs).scan(Path::new("/r"), |_, _| {});
    assert!(matches!(result, Err(ScanError::PermissionDenied { .. })));
}

#[test]
fn test_progress_is_monotonic_and_ends_at_one() {
    let fs = FakeFs::new(&[
        ("/r", Node::Dir),
        ("/r/1", Node::Dir),
        ("/r/2", Node::Dir),
        ("/r/3", Node::Dir),
        ("/r/3/f", Node::File(7)),
    ]);

    let mut events = Vec::new();
    fake_sizer(&fs)
        .scan(Path::new("/r"), |fraction, tree| {
            let placeholders = tree
                .root_directory()
                .subfolders
                .iter()
                .filter(|s| tree.directory(**s).unwrap().is_placeholder())
                .count();
            events.push((fraction, placeholders));
        })
        .unwrap();

    let fractions: Vec<f64> = events.iter().map(|e| e.0).collect();
    assert_eq!(fractions.len(), 3);
    assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(fractions.last(), Some(&1.0));
    // snapshots show the not-yet-sized folders as placeholders
    assert_eq!(events.iter().map(|e| e.1).collect::<Vec<_>>(), vec![2, 1, 0]);
}

#[tokio::test]
async fn test_reload_removes_vanished_folder() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("A")).unwrap();
    fs::create_dir(root.join("B")).unwrap();
    fs::write(root.join("A/f"), vec![0u8; 100]).unwrap();
    fs::write(root.join("B/g"), vec![0u8; 200]).unwrap();
    fs::write(root.join("c"), vec![0u8; 50]).unwrap();

    let sizer = FolderSizer::new(ScanConfig::default()).unwrap();
    let tree = shared(&sizer, root);
    let a = tree.read().find_by_path(&root.join("A")).unwrap();
    let b = tree.read().find_by_path(&root.join("B")).unwrap();
    assert_eq!(tree.read().root_directory().total_size, 350);

    fs::remove_dir_all(root.join("B")).unwrap();
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let outcome = coordinator.reload(b).unwrap().join().await.unwrap();

    match outcome {
        ReloadOutcome::Removed { target, freed, .. } => {
            assert_eq!(target, b);
            assert_eq!(freed, 200);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let tree = tree.read();
    assert!(!tree.contains(b));
    assert_eq!(tree.root_directory().total_size, 150);
    assert_eq!(tree.root_directory().num_items, 3);
    assert_eq!(tree.directory(a).unwrap().total_size, 100);
    assert_consistent(&tree);
}

#[tokio::test]
async fn test_reload_splices_in_place() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("A/inner")).unwrap();
    fs::write(root.join("A/inner/f"), vec![0u8; 100]).unwrap();
    fs::write(root.join("top"), vec![0u8; 10]).unwrap();

    let sizer = FolderSizer::new(ScanConfig::default()).unwrap();
    let tree = shared(&sizer, root);
    let a = tree.read().find_by_path(&root.join("A")).unwrap();
    let inner = tree.read().find_by_path(&root.join("A/inner")).unwrap();
    let root_id = tree.read().root();

    fs::write(root.join("A/new"), vec![0u8; 400]).unwrap();
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let mut task = coordinator.reload(inner).unwrap();
    assert!(coordinator.is_reloading(inner));
    while task.progress_rx.recv().await.is_some() {}
    let outcome = task.join().await.unwrap();
    assert!(!coordinator.is_reloading(inner));
    assert!(matches!(outcome, ReloadOutcome::Spliced { target, .. } if target == inner));

    let outcome = coordinator.reload(a).unwrap().join().await.unwrap();
    match outcome {
        ReloadOutcome::Spliced {
            target,
            previous_size,
            total_size,
            num_items,
            warnings,
        } => {
            assert_eq!(target, a);
            assert_eq!(previous_size, 100);
            assert_eq!(total_size, 500);
            assert_eq!(num_items, 3);
            assert!(warnings.is_empty());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let tree = tree.read();
    let a_dir = tree.directory(a).unwrap();
    assert_eq!(a_dir.parent, Some(root_id));
    assert!(tree.root_directory().subfolders.contains(&a));
    // the old inner handle went away with the replaced contents
    assert!(!tree.contains(inner));
    assert_eq!(tree.root_directory().total_size, 510);
    assert_consistent(&tree);
}

#[tokio::test]
async fn test_overlapping_reloads_are_rejected() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let root = tree.read().root();
    let a = id_of(&tree, "/r/a");
    let b = id_of(&tree, "/r/b");
    let deep = id_of(&tree, "/r/a/deep");

    fs.gate_on("/r/a");
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let gate = fs.gate.lock();
    let running = coordinator.reload(a).unwrap();

    assert!(matches!(
        coordinator.reload(a),
        Err(ReloadError::AlreadyReloading(id)) if id == a
    ));
    assert!(matches!(
        coordinator.reload(root),
        Err(ReloadError::Overlapping { target, busy }) if target == root && busy == a
    ));
    assert!(matches!(
        coordinator.reload(deep),
        Err(ReloadError::Overlapping { busy, .. }) if busy == a
    ));
    let disjoint = coordinator.reload(b).unwrap();

    drop(gate);
    running.join().await.unwrap();
    disjoint.join().await.unwrap();

    assert!(!coordinator.is_reloading(a));
    coordinator.reload(a).unwrap().join().await.unwrap();
    assert_eq!(tree.read().root_directory().total_size, 1147);
    assert_consistent(&tree.read());
}

#[tokio::test]
async fn test_cancelled_reload_keeps_tree() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let a = id_of(&tree, "/r/a");
    let before = tree.read().len();

    fs.gate_on("/r/a");
    fs.nodes.write().insert(PathBuf::from("/r/a/more"), Node::File(9000));
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let gate = fs.gate.lock();
    let task = coordinator.reload(a).unwrap();
    task.cancel();
    drop(gate);

    assert!(matches!(
        task.join().await,
        Err(ReloadError::Scan(ScanError::Interrupted))
    ));
    let tree = tree.read();
    assert_eq!(tree.len(), before);
    assert_eq!(tree.root_directory().total_size, 1147);
}

#[tokio::test]
async fn test_target_detached_during_reload() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let a = id_of(&tree, "/r/a");
    let deep = id_of(&tree, "/r/a/deep");

    fs.gate_on("/r/a/deep");
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let gate = fs.gate.lock();
    let task = coordinator.reload(deep).unwrap();
    tree.write().remove(a).unwrap();
    drop(gate);

    assert!(matches!(
        task.join().await,
        Err(ReloadError::TargetDetached(id)) if id == deep
    ));
    assert!(!tree.read().contains(deep));
}

#[tokio::test]
async fn test_reload_rejects_bad_targets() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let top = id_of(&tree, "/r/top");
    let coordinator = ReloadCoordinator::new(tree, sizer);

    assert!(matches!(
        coordinator.reload(top),
        Err(ReloadError::NotADirectory(id)) if id == top
    ));
    assert!(matches!(
        coordinator.reload(NodeId::new(9999, 0)),
        Err(ReloadError::UnknownTarget(_))
    ));
}

#[tokio::test]
async fn test_vanished_root_is_not_removed() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let root = tree.read().root();

    fs.nodes.write().clear();
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    let result = coordinator.reload(root).unwrap().join().await;

    assert!(matches!(
        result,
        Err(ReloadError::Scan(ScanError::PathVanished { .. }))
    ));
    assert_eq!(tree.read().root_directory().total_size, 1147);
}

#[tokio::test]
async fn test_cancel_after_scan_keeps_tree() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let b = id_of(&tree, "/r/b");
    let before = tree.read().len();

    fs.nodes.write().insert(PathBuf::from("/r/b/new"), Node::File(5));
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);

    // hold the worker at the commit: the scan is done once progress closes
    let guard = tree.read();
    let mut task = coordinator.reload(b).unwrap();
    while task.progress_rx.recv().await.is_some() {}
    task.cancel();
    drop(guard);

    assert!(matches!(
        task.join().await,
        Err(ReloadError::Scan(ScanError::Interrupted))
    ));
    let tree = tree.read();
    assert_eq!(tree.len(), before);
    assert_eq!(tree.directory(b).unwrap().total_size, 1000);
    assert_eq!(tree.root_directory().total_size, 1147);
}

#[tokio::test]
async fn test_cancel_after_vanish_check_keeps_tree() {
    let fs = fake_tree();
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let b = id_of(&tree, "/r/b");

    {
        let mut nodes = fs.nodes.write();
        nodes.remove(Path::new("/r/b"));
        nodes.remove(Path::new("/r/b/w"));
    }
    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);

    let guard = tree.read();
    let mut task = coordinator.reload(b).unwrap();
    while task.progress_rx.recv().await.is_some() {}
    task.cancel();
    drop(guard);

    assert!(matches!(
        task.join().await,
        Err(ReloadError::Scan(ScanError::Interrupted))
    ));
    let tree = tree.read();
    assert!(tree.contains(b));
    assert_eq!(tree.root_directory().total_size, 1147);
}

#[tokio::test]
async fn test_readers_never_see_a_half_spliced_branch() {
    let mut entries = vec![
        ("/r".to_string(), Node::Dir),
        ("/r/a".to_string(), Node::Dir),
        ("/r/b".to_string(), Node::Dir),
        ("/r/b/w".to_string(), Node::File(1000)),
    ];
    for i in 0..20 {
        entries.push((format!("/r/a/{i}"), Node::Dir));
        for j in 0..20 {
            entries.push((format!("/r/a/{i}/{j}"), Node::File(1)));
        }
    }
    let entries: Vec<(&str, Node)> = entries.iter().map(|(p, n)| (p.as_str(), *n)).collect();
    let fs = FakeFs::new(&entries);
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let a = id_of(&tree, "/r/a");
    assert_eq!(tree.read().root_directory().total_size, 1400);

    // every file doubles in size and each folder gains one more file
    {
        let mut nodes = fs.nodes.write();
        for i in 0..20 {
            for j in 0..20 {
                nodes.insert(PathBuf::from(format!("/r/a/{i}/{j}")), Node::File(2));
            }
            nodes.insert(PathBuf::from(format!("/r/a/{i}/extra")), Node::File(10));
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(tree.clone(), stop.clone());

    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    for _ in 0..5 {
        let outcome = coordinator.reload(a).unwrap().join().await.unwrap();
        assert!(matches!(outcome, ReloadOutcome::Spliced { total_size: 1000, .. }));
    }

    stop.store(true, Ordering::SeqCst);
    let reads = reader.join().unwrap();
    assert!(reads > 0);

    let tree = tree.read();
    assert_eq!(tree.directory(a).unwrap().total_size, 20 * (40 + 10));
    assert_eq!(tree.root_directory().total_size, 2000);
    assert_consistent(&tree);
}

#[tokio::test]
async fn test_readers_never_see_a_half_removed_branch() {
    let mut entries = vec![("/r".to_string(), Node::Dir), ("/r/keep".to_string(), Node::File(7))];
    for i in 0..30 {
        entries.push((format!("/r/d{i}"), Node::Dir));
        entries.push((format!("/r/d{i}/sub"), Node::Dir));
        for j in 0..10 {
            entries.push((format!("/r/d{i}/sub/{j}"), Node::File(3)));
        }
    }
    let entries: Vec<(&str, Node)> = entries.iter().map(|(p, n)| (p.as_str(), *n)).collect();
    let fs = FakeFs::new(&entries);
    let sizer = fake_sizer(&fs);
    let tree = shared(&sizer, Path::new("/r"));
    let targets: Vec<NodeId> = (0..30).map(|i| id_of(&tree, &format!("/r/d{i}"))).collect();
    assert_eq!(tree.read().root_directory().total_size, 7 + 30 * 30);

    fs.nodes
        .write()
        .retain(|path, _| !path.to_string_lossy().starts_with("/r/d"));

    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(tree.clone(), stop.clone());

    let coordinator = ReloadCoordinator::new(tree.clone(), sizer);
    for target in &targets {
        let outcome = coordinator.reload(*target).unwrap().join().await.unwrap();
        assert!(matches!(outcome, ReloadOutcome::Removed { freed: 30, .. }));
    }

    stop.store(true, Ordering::SeqCst);
    let reads = reader.join().unwrap();
    assert!(reads > 0);

    let tree = tree.read();
    assert_eq!(tree.root_directory().total_size, 7);
    assert_eq!(tree.root_directory().num_items, 1);
    assert_eq!(tree.len(), 2);
    assert_consistent(&tree);
}
