//! Repository trait for login attempt records.
//!
//! Attempt records live in process memory only. The guard is a
//! defense-in-depth layer in front of the identity provider, which keeps the
//! authoritative rate limits; losing these records on restart is accepted.

use dashmap::{DashMap, mapref::entry::Entry};

use crate::storage::AttemptRecord;

/// Keyed store of [`AttemptRecord`]s.
///
/// # Concurrency
///
/// [`update`](AttemptRepository::update) must apply its closure atomically
/// with respect to other calls for the same identifier, so that concurrent
/// failures are never lost. Implementations may run it under a per-key lock;
/// the closure must therefore not call back into the repository.
pub trait AttemptRepository: Send + Sync + 'static {
    /// Fetch a copy of the record for `identifier`.
    fn get(&self, identifier: &str) -> Option<AttemptRecord>;

    /// Atomically replace the record for `identifier` with `f(current)`.
    ///
    /// Returning `None` from the closure deletes the record. The new value
    /// is returned.
    fn update<F>(&self, identifier: &str, f: F) -> Option<AttemptRecord>
    where
        F: FnOnce(Option<AttemptRecord>) -> Option<AttemptRecord>;

    /// Delete the record, returning what was stored.
    fn remove(&self, identifier: &str) -> Option<AttemptRecord>;

    /// Keep only records for which `keep` returns true.
    ///
    /// Returns the number of records removed.
    fn retain<F>(&self, keep: F) -> usize
    where
        F: FnMut(&AttemptRecord) -> bool;

    /// Number of identifiers currently tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local [`AttemptRepository`] backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryAttemptRepository {
    records: DashMap<String, AttemptRecord>,
}

impl InMemoryAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptRepository for InMemoryAttemptRepository {
    fn get(&self, identifier: &str) -> Option<AttemptRecord> {
        self.records.get(identifier).map(|r| r.value().clone())
    }

    fn update<F>(&self, identifier: &str, f: F) -> Option<AttemptRecord>
    where
        F: FnOnce(Option<AttemptRecord>) -> Option<AttemptRecord>,
    {
        // The entry guard holds the shard lock for the whole read-modify-write.
        match self.records.entry(identifier.to_string()) {
            Entry::Occupied(mut entry) => match f(Some(entry.get().clone())) {
                Some(next) => {
                    entry.insert(next.clone());
                    Some(next)
                }
                None => {
                    entry.remove();
                    None
                }
            },
            Entry::Vacant(entry) => {
                let next = f(None)?;
                entry.insert(next.clone());
                Some(next)
            }
        }
    }

    fn remove(&self, identifier: &str) -> Option<AttemptRecord> {
        self.records.remove(identifier).map(|(_, record)| record)
    }

    fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&AttemptRecord) -> bool,
    {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let kept = keep(record);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
