/// Tree integration tests.
///
/// Drive `DirTree` through the same begin/entry/end sequence the scanner
/// uses, without touching the filesystem, and check the aggregate,
/// read-state and dot-entry behaviour a consumer relies on.
use dirstat_core::model::{DirTree, Entry, NodeIndex, ReadOutcome, ReadState};
use dirstat_core::TreeError;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Count descendants of `dir` by walking the tree: (items, sub_dirs, files).
fn walk_counts(tree: &DirTree, dir: NodeIndex) -> (u64, u64, u64) {
    let mut counts = (0, 0, 0);
    let mut stack = tree.children(dir);
    stack.extend(tree.dot_entry(dir).map(|dot| tree.children(dot)).unwrap_or_default());
    while let Some(idx) = stack.pop() {
        counts.0 += 1;
        if tree.node(idx).is_container() {
            counts.1 += 1;
            stack.extend(tree.children(idx));
            if let Some(dot) = tree.dot_entry(idx) {
                stack.extend(tree.children(dot));
            }
        } else {
            counts.2 += 1;
        }
    }
    counts
}

/// Build `depth` levels of `fanout` subdirectories, each holding `files`
/// files, interleaving files and directories the way a real listing would.
/// Every directory is queued before its parent finishes, then read.
fn build_uniform(tree: &mut DirTree, dir: NodeIndex, depth: u32, fanout: u32, files: u32) {
    tree.begin_read(dir).unwrap();
    let mut subdirs = Vec::new();
    for i in 0..fanout.max(files) {
        if i < files {
            tree.attach_child(dir, Entry::file(format!("f{i}"), 10, 1))
                .unwrap();
        }
        if depth > 0 && i < fanout {
            let sub = tree.attach_child(dir, Entry::directory(format!("d{i}"))).unwrap();
            tree.queue_read(sub).unwrap();
            subdirs.push(sub);
        }
    }
    tree.end_read(dir, ReadOutcome::Ok).unwrap();
    for sub in subdirs {
        build_uniform(tree, sub, depth - 1, fanout, files);
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[test]
fn settled_counts_match_a_full_walk() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.queue_read(root).unwrap();
    build_uniform(&mut tree, root, 3, 3, 2);
    assert_eq!(tree.pending_read_jobs(root), 0);
    tree.finalize_all(root).unwrap();

    let mut dirs = vec![root];
    while let Some(dir) = dirs.pop() {
        let (items, sub_dirs, files) = walk_counts(&tree, dir);
        assert_eq!(tree.total_items(dir), items, "items of {dir:?}");
        assert_eq!(tree.total_sub_dirs(dir), sub_dirs, "sub_dirs of {dir:?}");
        assert_eq!(tree.total_files(dir), files, "files of {dir:?}");
        dirs.extend(tree.children(dir).into_iter().filter(|&c| tree.node(c).is_container()));
    }

    // 3 + 9 + 27 directories, two files in each of the 40 directories.
    assert_eq!(tree.total_sub_dirs(root), 39);
    assert_eq!(tree.total_files(root), 80);
    assert_eq!(tree.total_size(root), 800);
}

#[test]
fn repeated_reads_do_no_work() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    build_uniform(&mut tree, root, 2, 2, 2);

    let first = tree.totals(root);
    let recalculated = tree.recalculations();
    for _ in 0..3 {
        assert_eq!(tree.totals(root), first);
    }
    assert_eq!(tree.recalculations(), recalculated);
    assert!(!tree.is_dirty(root));
}

#[test]
fn attaching_dirties_every_ancestor() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let a = tree.attach_child(root, Entry::directory("a")).unwrap();
    tree.begin_read(a).unwrap();
    let b = tree.attach_child(a, Entry::directory("b")).unwrap();
    tree.begin_read(b).unwrap();
    assert_eq!(tree.total_size(root), 0);

    tree.attach_child(b, Entry::file("deep", 42, 1)).unwrap();
    for dir in [b, a, root] {
        assert!(tree.is_dirty(dir), "{dir:?} should be dirty");
    }
    assert_eq!(tree.total_size(root), 42);
    assert_eq!(tree.total_files(a), 1);
    assert_eq!(tree.total_items(root), 3);
}

// ── Concrete scenarios ───────────────────────────────────────────────────────

#[test]
fn file_beside_subdirectory_lands_in_dot_entry() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let a = tree.attach_child(root, Entry::directory("A")).unwrap();
    tree.queue_read(a).unwrap();
    let r1 = tree.attach_child(root, Entry::file("r1", 50, 4)).unwrap();
    tree.end_read(root, ReadOutcome::Ok).unwrap();

    tree.begin_read(a).unwrap();
    tree.attach_child(a, Entry::file("f1", 100, 8)).unwrap();
    tree.end_read(a, ReadOutcome::Ok).unwrap();
    tree.finalize_all(root).unwrap();

    let dot = tree.dot_entry(root).expect("dot entry");
    assert_eq!(tree.children(dot), vec![r1]);
    assert_eq!(tree.total_size(root), 150);
    assert_eq!(tree.total_blocks(root), 12);
    assert_eq!(tree.total_items(root), 3);
    assert_eq!(tree.total_sub_dirs(root), 1);
    assert_eq!(tree.total_files(root), 2);
    assert_eq!(tree.dot_entry(a), None);
}

#[test]
fn dot_entry_collapses_when_subdirectory_goes_away() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let sub = tree.attach_child(root, Entry::directory("sub")).unwrap();
    let file = tree.attach_child(root, Entry::file("file", 5, 1)).unwrap();
    assert!(tree.dot_entry(root).is_some());

    tree.remove_subtree(sub).unwrap();
    tree.end_read(root, ReadOutcome::Ok).unwrap();

    assert_eq!(tree.dot_entry(root), None);
    assert_eq!(tree.children(root), vec![file]);
    assert_eq!(tree.total_sub_dirs(root), 0);
    assert_eq!(tree.total_items(root), 1);
}

#[test]
fn excluded_directory_settles_with_own_size_only() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let a = tree
        .attach_child(root, Entry::directory("A").with_size(4096).with_blocks(8))
        .unwrap();
    tree.queue_read(a).unwrap();
    tree.mark_excluded(a).unwrap();
    assert_eq!(tree.read_state(a), ReadState::Finished);
    assert_eq!(tree.pending_read_jobs(root), 0);
    tree.end_read(root, ReadOutcome::Ok).unwrap();

    assert!(tree.is_finished(a));
    assert!(tree.is_excluded(a));
    assert_eq!(tree.total_items(a), 0);
    assert_eq!(tree.total_size(a), 4096);
    assert_eq!(tree.total_size(root), 4096);
    assert_eq!(tree.total_sub_dirs(root), 1);
    assert_eq!(tree.pending_read_jobs(root), 0);
    assert!(tree.is_finished(root));
}

#[test]
fn aborted_read_keeps_partial_results() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    tree.attach_child(root, Entry::file("one", 1, 1)).unwrap();
    tree.attach_child(root, Entry::file("two", 2, 1)).unwrap();
    tree.end_read(root, ReadOutcome::Aborted).unwrap();

    assert_eq!(tree.read_state(root), ReadState::Aborted);
    assert_eq!(tree.total_items(root), 2);
    assert_eq!(tree.total_size(root), 3);
    assert!(tree.is_finished(root));
}

// ── Read state ───────────────────────────────────────────────────────────────

#[test]
fn every_outcome_releases_its_job() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let outcomes = [ReadOutcome::Ok, ReadOutcome::Error, ReadOutcome::Aborted];
    let dirs: Vec<NodeIndex> = (0..outcomes.len())
        .map(|i| {
            let dir = tree.attach_child(root, Entry::directory(format!("d{i}"))).unwrap();
            tree.begin_read(dir).unwrap();
            dir
        })
        .collect();
    tree.end_read(root, ReadOutcome::Ok).unwrap();
    assert_eq!(tree.pending_read_jobs(root), 3);
    assert!(tree.is_busy(root));

    for (dir, outcome) in dirs.iter().zip(outcomes) {
        tree.end_read(*dir, outcome).unwrap();
    }
    assert_eq!(tree.pending_read_jobs(root), 0);
    assert!(tree.is_finished(root));
    assert_eq!(tree.read_state(dirs[1]), ReadState::Error);
    assert_eq!(tree.read_state(dirs[2]), ReadState::Aborted);
}

#[test]
fn removing_a_busy_subtree_releases_its_jobs() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let a = tree.attach_child(root, Entry::directory("a")).unwrap();
    tree.begin_read(a).unwrap();
    let b = tree.attach_child(a, Entry::directory("b")).unwrap();
    tree.queue_read(b).unwrap();
    tree.end_read(root, ReadOutcome::Ok).unwrap();
    assert_eq!(tree.pending_read_jobs(root), 2);

    assert_eq!(tree.remove_subtree(a), Ok(2));
    assert_eq!(tree.pending_read_jobs(root), 0);
    assert!(tree.is_finished(root));
    assert_eq!(tree.finalize_all(root), Ok(1));
}

#[test]
fn contract_violations_fail_fast() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    tree.begin_read(root).unwrap();
    let file = tree.attach_child(root, Entry::file("f", 1, 1)).unwrap();

    assert_eq!(
        tree.attach_child(file, Entry::file("g", 1, 1)),
        Err(TreeError::NotAContainer(file))
    );
    assert_eq!(tree.begin_read(file), Err(TreeError::NotAContainer(file)));

    tree.end_read(root, ReadOutcome::Ok).unwrap();
    assert_eq!(
        tree.finalize_local(root),
        Err(TreeError::AlreadyFinalized(root))
    );
    tree.finalize_all(root).unwrap();
    assert_eq!(tree.finalize_all(root), Err(TreeError::AlreadyFinalized(root)));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_readers_agree() {
    let mut tree = DirTree::new(Entry::directory("/"));
    let root = tree.root();
    build_uniform(&mut tree, root, 3, 4, 3);
    let expected = {
        // Compute on a second identical tree so `tree` stays fully dirty.
        let mut twin = DirTree::new(Entry::directory("/"));
        let twin_root = twin.root();
        build_uniform(&mut twin, twin_root, 3, 4, 3);
        twin.totals(twin_root)
    };
    assert!(tree.is_dirty(root));

    let shared = Arc::new(RwLock::new(tree));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let tree = shared.read();
                tree.totals(tree.root())
            })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), expected);
    }

    // Each container was summed once no matter how many readers raced.
    let tree = shared.read();
    let containers = 1 + tree.total_sub_dirs(root) + dot_entries(&tree, root);
    assert_eq!(tree.recalculations(), containers);
}

fn dot_entries(tree: &DirTree, dir: NodeIndex) -> u64 {
    let own = u64::from(tree.dot_entry(dir).is_some());
    own + tree
        .children(dir)
        .into_iter()
        .filter(|&c| tree.node(c).is_container())
        .map(|c| dot_entries(tree, c))
        .sum::<u64>()
}

#[test]
fn writer_and_readers_interleave() {
    let shared = Arc::new(RwLock::new(DirTree::new(Entry::directory("/"))));
    let root = shared.read().root();
    shared.write().begin_read(root).unwrap();

    let writer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            for i in 0..200u64 {
                let mut tree = shared.write();
                tree.attach_child(root, Entry::file(format!("f{i}"), 1, 1)).unwrap();
            }
            shared.write().end_read(root, ReadOutcome::Ok).unwrap();
        })
    };
    let reader = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || loop {
            let tree = shared.read();
            let totals = tree.totals(root);
            // Items and size move together; a reader never sees half an attach.
            assert_eq!(totals.items, totals.size);
            if tree.is_finished(root) {
                return totals.items;
            }
        })
    };

    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), 200);
}
