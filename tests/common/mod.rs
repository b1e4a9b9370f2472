#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;
use vectoria::{Settings, VectorDb};

/// A database rooted in its own temp directory so tests can run in parallel.
pub struct TestDb {
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("collections")
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::with_storage_path(self.root());
        settings.search.workers = 4;
        settings.search.queue_capacity = 64;
        settings
    }

    /// Opens (or reopens) the database over the same directory.
    pub fn open(&self) -> VectorDb {
        VectorDb::open(self.settings()).expect("Failed to open database")
    }
}

/// Sorted ids of a hit list, for tie-insensitive comparisons.
pub fn sorted_ids(hits: &[vectoria::SearchHit]) -> Vec<String> {
    let mut ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    ids.sort();
    ids
}
