//! Configured playback hierarchy: Collection → Sub-collection → Item.
//!
//! A [`Catalog`] is built once from a JSON source and never mutated
//! afterwards. Reloading replaces the whole value through [`CatalogStore`],
//! so a resolution running concurrently sees either the old catalog or the
//! new one, never a mix of both.
//!
//! ## File format
//!
//! ```json
//! {
//!   "Tour2021": {
//!     "NightOne": [
//!       {"name": "Song A", "time": 30},
//!       {"name": "Song B", "time": 95}
//!     ]
//!   }
//! }
//! ```
//!
//! Every sub-collection receives a synthetic lead-in item at ordinal 0
//! starting at 0 seconds; configured items follow with ordinals 1..n.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::CueError;

/// Name given to the synthetic item at ordinal 0.
pub const LEAD_IN_NAME: &str = "Intro";

/// Raw item as it appears in the catalog file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ItemSpec {
    pub name: String,
    /// Start offset in seconds from the beginning of the sub-collection.
    pub time: u32,
}

/// Raw catalog file: collection name → sub-collection name → items.
pub type CatalogSource = BTreeMap<String, BTreeMap<String, Vec<ItemSpec>>>;

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    name: String,
    ordinal: usize,
    start_time: u32,
}

impl Item {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    pub fn is_lead_in(&self) -> bool {
        self.ordinal == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubCollection {
    name: String,
    /// Sorted strictly ascending by start time; index == ordinal.
    items: Vec<Item>,
}

impl SubCollection {
    /// Builds a sub-collection from its configured items, prepending the
    /// lead-in entry.
    ///
    /// # Errors
    ///
    /// Fails if a start time is 0 (reserved for the lead-in) or if start
    /// times are not strictly increasing.
    pub fn new(name: &str, specs: &[ItemSpec]) -> Result<Self, CueError> {
        let mut items = Vec::with_capacity(specs.len() + 1);
        items.push(Item {
            name: LEAD_IN_NAME.to_string(),
            ordinal: 0,
            start_time: 0,
        });

        for (i, spec) in specs.iter().enumerate() {
            let previous = items[i].start_time;
            if spec.time <= previous {
                return Err(CueError::catalog(format!(
                    "'{}' in '{}' starts at {}s, which is not after {}s",
                    spec.name, name, spec.time, previous
                )));
            }
            items.push(Item {
                name: spec.name.clone(),
                ordinal: i + 1,
                start_time: spec.time,
            });
        }

        Ok(Self {
            name: name.to_string(),
            items,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false: the lead-in is present in every sub-collection.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, ordinal: usize) -> Option<&Item> {
        self.items.get(ordinal)
    }

    /// Returns the last item whose start time is at or before `position`.
    ///
    /// Positions before every breakpoint (negative or NaN) map to the
    /// lead-in; positions past the last breakpoint map to the final item.
    pub fn item_at(&self, position: f64) -> &Item {
        let after = self
            .items
            .partition_point(|item| f64::from(item.start_time) <= position);
        &self.items[after.saturating_sub(1)]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    name: String,
    sub_collections: BTreeMap<String, SubCollection>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sub_collection(&self, name: &str) -> Option<&SubCollection> {
        self.sub_collections.get(name)
    }

    pub fn sub_collections(&self) -> impl Iterator<Item = &SubCollection> {
        self.sub_collections.values()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    collections: BTreeMap<String, Collection>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_source(source: &CatalogSource) -> Result<Self, CueError> {
        let mut collections = BTreeMap::new();

        for (collection_name, subs) in source {
            let mut sub_collections = BTreeMap::new();
            for (sub_name, specs) in subs {
                let sub = SubCollection::new(sub_name, specs)?;
                sub_collections.insert(sub_name.clone(), sub);
            }
            debug!(
                collection = %collection_name,
                sub_collections = sub_collections.len(),
                "Catalog collection built"
            );
            collections.insert(
                collection_name.clone(),
                Collection {
                    name: collection_name.clone(),
                    sub_collections,
                },
            );
        }

        Ok(Self { collections })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CueError> {
        let source: CatalogSource = serde_json::from_str(json)
            .map_err(|e| CueError::catalog(format!("malformed catalog: {e}")))?;
        Self::from_source(&source)
    }

    /// Reads and validates a catalog file.
    pub fn load(path: &Path) -> Result<Self, CueError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CueError::catalog(format!("cannot read {}: {e}", path.display())))?;
        let catalog = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            collections = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn sub_collection(&self, collection: &str, name: &str) -> Option<&SubCollection> {
        self.collection(collection)?.sub_collection(name)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Holder of the current catalog, swapped wholesale on reload.
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Snapshot of the current catalog. Holding it keeps that version alive
    /// even if a reload happens meanwhile.
    pub fn current(&self) -> Arc<Catalog> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, catalog: Catalog) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(catalog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, time: u32) -> ItemSpec {
        ItemSpec {
            name: name.to_string(),
            time,
        }
    }

    #[test]
    fn test_lead_in_is_prepended() {
        let sub = SubCollection::new("NightOne", &[spec("Song A", 30), spec("Song B", 95)]).unwrap();
        assert_eq!(sub.len(), 3);
        let lead_in = sub.item(0).unwrap();
        assert!(lead_in.is_lead_in());
        assert_eq!(lead_in.name(), LEAD_IN_NAME);
        assert_eq!(lead_in.start_time(), 0);
        assert_eq!(sub.item(2).unwrap().name(), "Song B");
        assert_eq!(sub.item(2).unwrap().ordinal(), 2);
    }

    #[test]
    fn test_rejects_non_increasing_times() {
        assert!(SubCollection::new("x", &[spec("a", 30), spec("b", 30)]).is_err());
        assert!(SubCollection::new("x", &[spec("a", 30), spec("b", 10)]).is_err());
        assert!(SubCollection::new("x", &[spec("a", 0)]).is_err());
    }

    #[test]
    fn test_item_at_boundaries() {
        let sub = SubCollection::new("x", &[spec("a", 30), spec("b", 95)]).unwrap();
        assert_eq!(sub.item_at(-3.0).ordinal(), 0);
        assert_eq!(sub.item_at(0.0).ordinal(), 0);
        assert_eq!(sub.item_at(29.9).ordinal(), 0);
        assert_eq!(sub.item_at(30.0).ordinal(), 1);
        assert_eq!(sub.item_at(94.5).ordinal(), 1);
        assert_eq!(sub.item_at(95.0).ordinal(), 2);
        assert_eq!(sub.item_at(10_000.0).ordinal(), 2);
        assert_eq!(sub.item_at(f64::NAN).ordinal(), 0);
    }

    #[test]
    fn test_from_json() {
        let catalog = Catalog::from_json_str(
            r#"{"Tour2021": {"NightOne": [{"name": "Song A", "time": 30}]}, "Other": {}}"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.sub_collection("Tour2021", "NightOne").is_some());
        assert!(catalog.sub_collection("Tour2021", "NightTwo").is_none());
        assert!(catalog.sub_collection("Missing", "NightOne").is_none());
    }

    #[test]
    fn test_malformed_json_is_a_catalog_error() {
        let err = Catalog::from_json_str(r#"{"Tour2021": ["not", "a", "map"]}"#).unwrap_err();
        assert!(matches!(err, CueError::Catalog(_)));
    }

    #[test]
    fn test_store_swaps_wholesale() {
        let store = CatalogStore::new(Catalog::empty());
        let before = store.current();
        store.replace(
            Catalog::from_json_str(r#"{"A": {"B": [{"name": "s", "time": 5}]}}"#).unwrap(),
        );
        assert!(before.is_empty());
        assert_eq!(store.current().len(), 1);
    }
}
