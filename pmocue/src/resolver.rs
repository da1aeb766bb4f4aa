//! Maps a reported playback position to a catalog item.

use crate::catalog::{Catalog, Item};
use crate::player::LiveSnapshot;

/// The last state published to the UI. Compared by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CurrentlyPlaying {
    pub collection: String,
    pub sub_collection: String,
    pub ordinal: usize,
}

impl CurrentlyPlaying {
    pub fn new(collection: &str, sub_collection: &str, ordinal: usize) -> Self {
        Self {
            collection: collection.to_string(),
            sub_collection: sub_collection.to_string(),
            ordinal,
        }
    }

    /// Looks the item up in `catalog`; `None` if the catalog changed
    /// underneath this value.
    pub fn item<'a>(&self, catalog: &'a Catalog) -> Option<&'a Item> {
        catalog
            .sub_collection(&self.collection, &self.sub_collection)?
            .item(self.ordinal)
    }
}

/// Returns the item playing at `position` seconds, or `None` when the
/// collection or sub-collection is not in the catalog.
pub fn resolve_item<'a>(
    catalog: &'a Catalog,
    collection: &str,
    sub_collection: &str,
    position: f64,
) -> Option<&'a Item> {
    let sub = catalog.sub_collection(collection, sub_collection)?;
    Some(sub.item_at(position))
}

pub fn resolve_current(
    catalog: &Catalog,
    collection: &str,
    sub_collection: &str,
    position: f64,
) -> Option<CurrentlyPlaying> {
    resolve_item(catalog, collection, sub_collection, position)
        .map(|item| CurrentlyPlaying::new(collection, sub_collection, item.ordinal()))
}

/// Resolves what the player reports. The player's current track name is the
/// sub-collection name; any missing piece yields `None`.
pub fn resolve_snapshot(catalog: &Catalog, snapshot: &LiveSnapshot) -> Option<CurrentlyPlaying> {
    let collection = snapshot.collection.as_deref()?;
    let entry = snapshot.entry.as_ref()?;
    let position = snapshot.position?;
    resolve_current(catalog, collection, &entry.name, position)
}
