//! End-to-end tests of an index backed by a file.

#![allow(clippy::expect_used)]

use strindex::index::{Index, IndexOptions};
use strindex::store::{FileStore, MemoryStore};
use tempfile::tempdir;

#[test]
fn test_digit_scenario_in_memory() {
    let mut index =
        Index::create(MemoryStore::new(), IndexOptions::with_fanout(3)).expect("create index");

    for digit in [5, 9, 3, 7, 1, 2, 8, 6, 0, 4] {
        let key = digit.to_string();
        index.insert(&key, &format!("value {key}")).expect("insert");
    }

    let stats = index.stats();
    assert_eq!(stats.height, 3);
    assert_eq!(stats.branch_count, 3);
    assert_eq!(stats.leaf_count, 4);
    assert_eq!(stats.node_count, 7);

    for digit in 0..10 {
        let key = digit.to_string();
        assert_eq!(
            index.search(&key).expect("search"),
            Some(format!("value {key}"))
        );
    }
    assert_eq!(index.search("x").expect("search"), None);
}

#[test]
fn test_file_index_survives_reopen() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("words.db");

    {
        let store = FileStore::create(&path).expect("create store");
        let options = IndexOptions {
            id: 1,
            label: "words".to_string(),
            fanout: 4,
        };
        let mut index = Index::create(store, options).expect("create index");
        for i in 0..200 {
            index
                .insert(&format!("word{i:04}"), &(i * 3).to_string())
                .expect("insert");
        }
        index.sync().expect("sync");
    }

    let store = FileStore::open(&path).expect("open store");
    let mut index = Index::open(store).expect("open index");

    assert_eq!(index.label(), "words");
    assert_eq!(index.fanout(), 4);
    assert_eq!(index.len().expect("len"), 200);
    assert_eq!(
        index.search("word0123").expect("search"),
        Some("369".to_string())
    );
    assert!(index.check_invariants().expect("check").is_empty());

    index.insert("word0123", "again").expect("insert duplicate");
    assert_eq!(
        index.search_all("word0123").expect("search_all"),
        vec!["369".to_string(), "again".to_string()]
    );

    let tail: Vec<String> = index
        .cursor_rev()
        .expect("cursor_rev")
        .take(3)
        .map(|entry| entry.expect("entry").0)
        .collect();
    assert_eq!(tail, vec!["word0199", "word0198", "word0197"]);
}

#[test]
fn test_open_rejects_foreign_file() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("other.bin");
    std::fs::write(&path, vec![0xAB; 128]).expect("write file");

    let store = FileStore::open(&path).expect("open store");
    assert!(Index::open(store).is_err());
}
