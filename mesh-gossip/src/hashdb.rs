// Copyright (c) 2024 Mesh Overlay Contributors

//! [`HashEntry`] and the `HashDbService` collaborator interface (§6): the
//! hash database itself is opaque to this crate, consumed only through this
//! trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Atomic unit of the hash database (§3).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HashEntry {
    /// Strictly increasing per-database sequence number.
    pub seq_id: i64,
    /// Canonical opaque key of the shared file.
    pub flac_key: String,
    /// Lowercase hex SHA-256 of the file content (64 chars).
    pub byte_hash_hex: String,
    /// File size in bytes.
    pub size: i64,
    /// Optional bitfield of implementation-defined flags.
    pub meta_flags: Option<i64>,
}

impl HashEntry {
    /// The `(FlacKey, ByteHash, Size)` content-addressable tuple used for
    /// duplicate detection and consensus grouping.
    pub fn content_key(&self) -> (&str, &str, i64) {
        (&self.flac_key, &self.byte_hash_hex, self.size)
    }
}

/// The hash-database collaborator (§6). An embedder supplies a concrete
/// implementation; this crate only ever calls through the trait.
#[async_trait]
pub trait HashDbService: Send + Sync {
    /// The current (highest) sequence id in the local database, or -1 if empty.
    async fn current_seq_id(&self) -> i64;

    /// Entries with `seq_id > since_seq_id`, ascending by `seq_id`, capped at
    /// `max_entries`.
    async fn entries_since(&self, since_seq_id: i64, max_entries: u32) -> Vec<HashEntry>;

    /// Look up a single entry by `flac_key`.
    async fn lookup(&self, flac_key: &str) -> Option<HashEntry>;

    /// Merge validated entries, dropping duplicates by content key. Returns
    /// the count actually merged (idempotent).
    async fn merge(&self, entries: Vec<HashEntry>) -> usize;
}

/// In-memory reference implementation for tests.
pub mod tests_support {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// An in-memory `HashDbService`, append-only, `SeqId`-ordered.
    pub struct InMemoryHashDb {
        entries: Mutex<Vec<HashEntry>>,
    }

    impl InMemoryHashDb {
        /// Build an empty database.
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }

        /// Seed the database with entries already in `SeqId` order.
        pub async fn seed(&self, entries: Vec<HashEntry>) {
            let mut guard = self.entries.lock().await;
            guard.extend(entries);
            guard.sort_by_key(|e| e.seq_id);
        }
    }

    impl Default for InMemoryHashDb {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HashDbService for InMemoryHashDb {
        async fn current_seq_id(&self) -> i64 {
            self.entries.lock().await.last().map(|e| e.seq_id).unwrap_or(-1)
        }

        async fn entries_since(&self, since_seq_id: i64, max_entries: u32) -> Vec<HashEntry> {
            self.entries
                .lock()
                .await
                .iter()
                .filter(|e| e.seq_id > since_seq_id)
                .take(max_entries as usize)
                .cloned()
                .collect()
        }

        async fn lookup(&self, flac_key: &str) -> Option<HashEntry> {
            self.entries
                .lock()
                .await
                .iter()
                .find(|e| e.flac_key == flac_key)
                .cloned()
        }

        async fn merge(&self, entries: Vec<HashEntry>) -> usize {
            let mut guard = self.entries.lock().await;
            let existing: HashSet<(String, String, i64)> = guard
                .iter()
                .map(|e| (e.flac_key.clone(), e.byte_hash_hex.clone(), e.size))
                .collect();
            let mut merged = 0;
            for entry in entries {
                let key = (
                    entry.flac_key.clone(),
                    entry.byte_hash_hex.clone(),
                    entry.size,
                );
                if !existing.contains(&key) {
                    guard.push(entry);
                    merged += 1;
                }
            }
            guard.sort_by_key(|e| e.seq_id);
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::InMemoryHashDb;
    use super::*;

    fn entry(seq_id: i64, key: &str) -> HashEntry {
        HashEntry {
            seq_id,
            flac_key: key.to_string(),
            byte_hash_hex: "a".repeat(64),
            size: 1000,
            meta_flags: None,
        }
    }

    #[tokio::test]
    async fn current_seq_id_is_minus_one_when_empty() {
        let db = InMemoryHashDb::new();
        assert_eq!(db.current_seq_id().await, -1);
    }

    #[tokio::test]
    async fn entries_since_respects_watermark_and_ordering() {
        let db = InMemoryHashDb::new();
        db.seed(vec![entry(1, "a"), entry(2, "b"), entry(3, "c")])
            .await;
        let result = db.entries_since(1, 10).await;
        assert_eq!(
            result.iter().map(|e| e.seq_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[tokio::test]
    async fn merge_drops_duplicates_by_content_key() {
        let db = InMemoryHashDb::new();
        db.seed(vec![entry(1, "a")]).await;
        let merged = db.merge(vec![entry(2, "a"), entry(3, "b")]).await;
        assert_eq!(merged, 1);
        assert_eq!(db.current_seq_id().await, 3);
    }

    #[tokio::test]
    async fn lookup_finds_by_flac_key() {
        let db = InMemoryHashDb::new();
        db.seed(vec![entry(1, "a")]).await;
        assert!(db.lookup("a").await.is_some());
        assert!(db.lookup("missing").await.is_none());
    }
}
