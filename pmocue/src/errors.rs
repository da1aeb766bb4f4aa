use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CueError {
    #[error("External player '{0}' is not running")]
    PlayerNotRunning(String),
    #[error("Automation permission not granted: {0}")]
    PermissionDenied(String),
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),
    #[error("Sub-collection '{1}' not found in collection '{0}'")]
    SubCollectionNotFound(String, String),
    #[error("Item ordinal {0} out of range (sub-collection has {1} items)")]
    ItemOutOfRange(usize, usize),
    #[error("Nothing comes before the lead-in of '{0}'")]
    NoPreviousItem(String),
    // Usually a stale index cache entry
    #[error("Remote index {0} out of range (collection exposes {1} entries)")]
    RemoteIndexOutOfRange(usize, usize),
    #[error("Player object not found: {0}")]
    NoSuchObject(String),
    #[error("Player has no active entry")]
    NoActiveEntry,
    #[error("Operation '{0}' is not supported by this player")]
    NotSupported(String),
    #[error("Automation Error: {0}")]
    Automation(String),
    #[error("Player did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Operation abandoned by its caller")]
    Cancelled,
    #[error("Command queue is closed")]
    QueueClosed,
    #[error("Catalog Error: {0}")]
    Catalog(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl CueError {
    pub fn automation(message: &str) -> Self {
        CueError::Automation(message.to_string())
    }

    pub fn not_supported(operation: &str) -> Self {
        CueError::NotSupported(operation.to_string())
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        CueError::Catalog(message.into())
    }

    pub fn sub_collection_not_found(collection: &str, name: &str) -> Self {
        CueError::SubCollectionNotFound(collection.to_string(), name.to_string())
    }

    /// True for failures that suggest the index cache no longer matches the
    /// player's own ordering.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            CueError::CollectionNotFound(_)
                | CueError::SubCollectionNotFound(_, _)
                | CueError::RemoteIndexOutOfRange(_, _)
                | CueError::NoSuchObject(_)
        )
    }
}
