//! Memoized name → positional index lookup against the player's live lists.
//!
//! Scanning the player's playlists (or the tracks of one playlist) by name
//! is slow over the automation bridge, so the first successful scan for a
//! name stores its position and later lookups return it directly.
//!
//! Cached values are never re-validated against the player: if the player
//! reorders its own objects without a catalog reload, stale indices are used
//! until [`IndexCache::reset`] is called. The reset is triggered by a catalog
//! reload and, as a fallback, after [`FAILURE_RESET_THRESHOLD`] consecutive
//! resolution failures reported through [`IndexCache::record_outcome`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::errors::CueError;

/// Entries kept per level before new names stop being memoized.
pub const DEFAULT_CAPACITY: usize = 256;

/// Consecutive resolution failures after which the cache is dropped.
pub const FAILURE_RESET_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct IndexCache {
    collections: HashMap<String, usize>,
    sub_collections: HashMap<(String, String), usize>,
    capacity: usize,
    consecutive_failures: u32,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            collections: HashMap::new(),
            sub_collections: HashMap::new(),
            capacity,
            consecutive_failures: 0,
        }
    }

    /// Resolves the player index of collection `name`.
    ///
    /// On a miss `scan` is called once to enumerate the player's collection
    /// names; the position of the first exact match is stored.
    pub fn resolve_collection<F>(&mut self, name: &str, scan: F) -> Result<usize, CueError>
    where
        F: FnOnce() -> Result<Vec<String>, CueError>,
    {
        if let Some(&index) = self.collections.get(name) {
            return Ok(index);
        }

        let names = scan()?;
        let Some(index) = position_of(&names, name) else {
            return Err(CueError::CollectionNotFound(name.to_string()));
        };

        debug!(collection = name, index, "Collection index resolved");
        memoize(&mut self.collections, name.to_string(), index, self.capacity);
        Ok(index)
    }

    /// Resolves the player index of sub-collection `name` inside `collection`.
    pub fn resolve_sub_collection<F>(
        &mut self,
        collection: &str,
        name: &str,
        scan: F,
    ) -> Result<usize, CueError>
    where
        F: FnOnce() -> Result<Vec<String>, CueError>,
    {
        let key = (collection.to_string(), name.to_string());
        if let Some(&index) = self.sub_collections.get(&key) {
            return Ok(index);
        }

        let names = scan()?;
        let Some(index) = position_of(&names, name) else {
            return Err(CueError::sub_collection_not_found(collection, name));
        };

        debug!(collection, sub_collection = name, index, "Sub-collection index resolved");
        memoize(&mut self.sub_collections, key, index, self.capacity);
        Ok(index)
    }

    pub fn cached_collection(&self, name: &str) -> Option<usize> {
        self.collections.get(name).copied()
    }

    pub fn cached_sub_collection(&self, collection: &str, name: &str) -> Option<usize> {
        self.sub_collections
            .get(&(collection.to_string(), name.to_string()))
            .copied()
    }

    /// Feeds the failure counter from the result of a whole resolution,
    /// scans and player-side checks included.
    ///
    /// Failures that do not point at a stale index (timeouts, permissions)
    /// leave the counter untouched.
    pub fn record_outcome<T>(&mut self, outcome: &Result<T, CueError>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(err) if err.is_resolution_failure() => self.record_failure(),
            Err(_) => {}
        }
    }

    /// Counts a failed resolution; drops everything once the threshold is hit.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= FAILURE_RESET_THRESHOLD {
            warn!(
                failures = self.consecutive_failures,
                "Repeated index resolution failures, invalidating index cache"
            );
            self.reset();
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Forgets every memoized index.
    pub fn reset(&mut self) {
        self.collections.clear();
        self.sub_collections.clear();
        self.consecutive_failures = 0;
    }

    pub fn len(&self) -> usize {
        self.collections.len() + self.sub_collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn position_of(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|candidate| candidate == name)
}

fn memoize<K>(map: &mut HashMap<K, usize>, key: K, index: usize, capacity: usize)
where
    K: std::hash::Hash + Eq + std::fmt::Debug,
{
    if map.len() >= capacity {
        warn!(key = ?key, capacity, "Index cache full, lookup not memoized");
        return;
    }
    map.insert(key, index);
}
