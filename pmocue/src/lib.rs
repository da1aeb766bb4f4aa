//! # pmocue
//!
//! Cue-point control for an external media player.
//!
//! A [`Catalog`] splits long recordings (a concert in one track) into named
//! items by start time. `pmocue` resolves the player's reported position to
//! the catalog item being played, drives the player to any item, and keeps a
//! single "currently playing" value in sync for the UI.
//!
//! ## Layout
//!
//! - [`catalog`] and [`resolver`]: the item hierarchy and position lookup
//! - [`player`]: traits over the player's automation surface, with the
//!   [`OsaScriptPlayer`] and [`SimulatedPlayer`] backends
//! - [`command_queue`]: serializes every operation against the player
//! - [`controller`]: `play_item` and the previous/next/replay steps
//! - [`reconcile`]: poll timer + player notifications → UI updates
//! - [`window_fit`]: corrective placement of the video window
//! - [`session`]: wires everything into one [`CueSession`]

pub mod catalog;
pub mod command_queue;
pub mod config_ext;
pub mod controller;
pub mod errors;
pub mod features;
pub mod index_cache;
pub mod now_playing;
pub mod osascript;
pub mod player;
pub mod reconcile;
pub mod resolver;
pub mod session;
pub mod shortcuts;
pub mod simulator;
pub mod window_fit;

pub use catalog::{Catalog, CatalogStore, Collection, Item, SubCollection};
pub use command_queue::CommandQueue;
pub use config_ext::CueConfigExt;
pub use controller::{PlayOutcome, PlaybackController, RestartOutcome, Step};
pub use errors::CueError;
pub use features::FeatureToggles;
pub use index_cache::IndexCache;
pub use now_playing::{ActiveMarks, NowPlayingUpdate, NowPlayingView, UiPublisher};
pub use osascript::{OsaScriptPlayer, PlayerInfoWatcher};
pub use player::{
    ActiveEntry, Bounds, MediaPlayer, NotificationSource, PlayState, PlayerLibrary,
    PlayerNotification, PlayerStatus, Point, Size, TransportControl, WindowControl, WindowInfo,
};
pub use reconcile::Reconciler;
pub use resolver::{CurrentlyPlaying, resolve_current, resolve_item};
pub use session::{CueSession, SessionOptions};
pub use shortcuts::{KeyBindings, ShortcutAction};
pub use simulator::{SimulatedNotifications, SimulatedPlayer};
pub use window_fit::{FitGeometry, FitOutcome};
