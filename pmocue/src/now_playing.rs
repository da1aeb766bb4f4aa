//! What the UI shows about the current item.
//!
//! The reconciliation loop builds one [`NowPlayingUpdate`] per change and
//! hands it to the UI context. The UI keeps an [`ActiveMarks`] and applies
//! updates to it; nothing else mutates UI-owned state.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

use crate::catalog::Catalog;
use crate::resolver::CurrentlyPlaying;

pub const NO_COLLECTION: &str = "No Playlist";
pub const NO_SUB_COLLECTION: &str = "No Concert";
pub const NOT_PLAYING: &str = "Not Playing";
pub const PREVIOUS_LABEL: &str = "Previous";
pub const NEXT_LABEL: &str = "Next";
pub const REPLAY_LABEL: &str = "Replay";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlayingView {
    pub collection: String,
    pub sub_collection: String,
    pub item: String,
    pub previous: String,
    pub next: String,
    pub replay: String,
}

impl NowPlayingView {
    pub fn build(catalog: &Catalog, current: Option<&CurrentlyPlaying>) -> Self {
        let mut view = Self {
            collection: NO_COLLECTION.to_string(),
            sub_collection: NO_SUB_COLLECTION.to_string(),
            item: NOT_PLAYING.to_string(),
            previous: PREVIOUS_LABEL.to_string(),
            next: NEXT_LABEL.to_string(),
            replay: REPLAY_LABEL.to_string(),
        };

        let Some(current) = current else {
            return view;
        };
        let Some(sub) = catalog.sub_collection(&current.collection, &current.sub_collection)
        else {
            return view;
        };
        let Some(item) = sub.item(current.ordinal) else {
            return view;
        };

        view.collection = current.collection.clone();
        view.sub_collection = current.sub_collection.clone();
        view.item = item.name().to_string();
        view.replay = format!("{REPLAY_LABEL} {}", item.name());

        if let Some(prev) = current.ordinal.checked_sub(1).and_then(|o| sub.item(o)) {
            view.previous = format!("{PREVIOUS_LABEL} {}", prev.name());
        }
        if let Some(next) = sub.item(current.ordinal + 1) {
            view.next = format!("{NEXT_LABEL} {}", next.name());
        }
        view
    }
}

/// One published transition of the current item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlayingUpdate {
    pub previous: Option<CurrentlyPlaying>,
    pub current: Option<CurrentlyPlaying>,
    pub view: NowPlayingView,
}

/// Sending half of the UI hand-off.
#[derive(Clone, Debug)]
pub struct UiPublisher {
    sender: Sender<NowPlayingUpdate>,
}

impl UiPublisher {
    pub fn new(sender: Sender<NowPlayingUpdate>) -> Self {
        Self { sender }
    }

    /// Publisher plus the receiver the UI context drains.
    pub fn channel() -> (Self, Receiver<NowPlayingUpdate>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    /// Returns false once the UI side is gone.
    pub fn publish(&self, update: NowPlayingUpdate) -> bool {
        match self.sender.send(update) {
            Ok(()) => true,
            Err(_) => {
                debug!("UI receiver dropped, update discarded");
                false
            }
        }
    }
}

/// Which chain (collection, sub-collection, item) the UI shows as active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveMarks {
    collection: Option<String>,
    sub_collection: Option<(String, String)>,
    item: Option<CurrentlyPlaying>,
}

impl ActiveMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &NowPlayingUpdate) {
        self.clear();
        if let Some(current) = &update.current {
            self.collection = Some(current.collection.clone());
            self.sub_collection = Some((current.collection.clone(), current.sub_collection.clone()));
            self.item = Some(current.clone());
        }
    }

    pub fn clear(&mut self) {
        self.collection = None;
        self.sub_collection = None;
        self.item = None;
    }

    pub fn is_collection_active(&self, collection: &str) -> bool {
        self.collection.as_deref() == Some(collection)
    }

    pub fn is_sub_collection_active(&self, collection: &str, sub_collection: &str) -> bool {
        self.sub_collection
            .as_ref()
            .is_some_and(|(c, s)| c == collection && s == sub_collection)
    }

    pub fn is_item_active(&self, item: &CurrentlyPlaying) -> bool {
        self.item.as_ref() == Some(item)
    }

    pub fn active_item(&self) -> Option<&CurrentlyPlaying> {
        self.item.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json_str(
            r#"{"Tour2021": {"NightOne": [{"name": "Song A", "time": 30}, {"name": "Song B", "time": 95}]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_view_without_current_item() {
        let view = NowPlayingView::build(&catalog(), None);
        assert_eq!(view.collection, "No Playlist");
        assert_eq!(view.sub_collection, "No Concert");
        assert_eq!(view.item, "Not Playing");
        assert_eq!(view.next, "Next");
    }

    #[test]
    fn test_view_labels_neighbours() {
        let catalog = catalog();
        let current = CurrentlyPlaying::new("Tour2021", "NightOne", 1);
        let view = NowPlayingView::build(&catalog, Some(&current));
        assert_eq!(view.item, "Song A");
        assert_eq!(view.previous, "Previous Intro");
        assert_eq!(view.next, "Next Song B");
        assert_eq!(view.replay, "Replay Song A");

        let last = CurrentlyPlaying::new("Tour2021", "NightOne", 2);
        let view = NowPlayingView::build(&catalog, Some(&last));
        assert_eq!(view.next, "Next");
    }

    #[test]
    fn test_marks_follow_updates() {
        let catalog = catalog();
        let first = CurrentlyPlaying::new("Tour2021", "NightOne", 1);
        let mut marks = ActiveMarks::new();
        marks.apply(&NowPlayingUpdate {
            previous: None,
            current: Some(first.clone()),
            view: NowPlayingView::build(&catalog, Some(&first)),
        });
        assert!(marks.is_collection_active("Tour2021"));
        assert!(marks.is_sub_collection_active("Tour2021", "NightOne"));
        assert!(marks.is_item_active(&first));

        marks.apply(&NowPlayingUpdate {
            previous: Some(first.clone()),
            current: None,
            view: NowPlayingView::build(&catalog, None),
        });
        assert!(!marks.is_collection_active("Tour2021"));
        assert!(marks.active_item().is_none());
    }
}
