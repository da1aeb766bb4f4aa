//! Automation surface of the external media player.
//!
//! The player exposes playlists ("collections" on its side) whose tracks
//! are the catalog's sub-collections. Indices used by these traits are
//! 0-based positions in the player's own enumeration; backends translate
//! to whatever numbering their bridge uses.
//!
//! Handles to live player objects are never kept: every call fetches fresh
//! values, and command sequences must read everything they need before the
//! first mutating call (stopping playback reassigns the current track).

use std::fmt;

use crate::errors::CueError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
    FastForwarding,
    Rewinding,
    Unknown,
}

impl PlayState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayState::Playing)
    }

    /// Parses the player's textual state ("playing", "Paused", ...).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "playing" => PlayState::Playing,
            "paused" => PlayState::Paused,
            "stopped" => PlayState::Stopped,
            "fast forwarding" => PlayState::FastForwarding,
            "rewinding" => PlayState::Rewinding,
            _ => PlayState::Unknown,
        }
    }
}

/// The track the player currently has loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveEntry {
    pub index: usize,
    pub name: String,
    pub is_video: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub origin: Point,
    pub size: Size,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            origin: Point { x, y },
            size: Size { width, height },
        }
    }
}

/// Top-level window of the player process.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowInfo {
    pub index: usize,
    pub title: Option<String>,
}

/// Read-only playback queries.
pub trait PlayerStatus {
    fn current_collection(&mut self) -> Result<Option<String>, CueError>;
    fn current_entry(&mut self) -> Result<Option<ActiveEntry>, CueError>;
    fn position(&mut self) -> Result<Option<f64>, CueError>;
    fn play_state(&mut self) -> Result<PlayState, CueError>;
}

/// By-name enumeration of the player's library.
pub trait PlayerLibrary {
    fn collection_names(&mut self) -> Result<Vec<String>, CueError>;
    fn entry_names(&mut self, collection: usize) -> Result<Vec<String>, CueError>;

    fn entry_count(&mut self, collection: usize) -> Result<usize, CueError> {
        Ok(self.entry_names(collection)?.len())
    }
}

/// Mutating transport commands.
pub trait TransportControl {
    fn set_position(&mut self, seconds: f64) -> Result<(), CueError>;
    fn resume(&mut self) -> Result<(), CueError>;
    fn stop(&mut self) -> Result<(), CueError>;
    fn play_entry(
        &mut self,
        collection: usize,
        entry: usize,
        auto_advance: bool,
    ) -> Result<(), CueError>;
    fn reveal_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError>;
    /// Delivers the "activate selection" key press to the player process.
    fn send_activation_key(&mut self) -> Result<(), CueError>;

    /// True when [`TransportControl::start_entry`] switches tracks in one call.
    fn supports_atomic_start(&self) -> bool {
        false
    }

    fn start_entry(&mut self, _collection: usize, _entry: usize) -> Result<(), CueError> {
        Err(CueError::not_supported("start_entry"))
    }
}

/// Accessibility access to the player's windows.
pub trait WindowControl {
    fn main_window_title(&self) -> &str;
    fn windows(&mut self) -> Result<Vec<WindowInfo>, CueError>;
    fn window_position(&mut self, window: &WindowInfo) -> Result<Point, CueError>;
    fn window_size(&mut self, window: &WindowInfo) -> Result<Size, CueError>;
    fn set_window_bounds(&mut self, window: &WindowInfo, bounds: Bounds) -> Result<(), CueError>;
}

pub trait MediaPlayer: PlayerStatus + PlayerLibrary + TransportControl + WindowControl + Send {}

impl<T> MediaPlayer for T where T: PlayerStatus + PlayerLibrary + TransportControl + WindowControl + Send
{}

/// Playback-state transition pushed by the player.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerNotification {
    pub state: PlayState,
    /// Name of the media the player is on, if any.
    pub name: Option<String>,
}

impl PlayerNotification {
    pub fn new(state: PlayState, name: Option<&str>) -> Self {
        Self {
            state,
            name: name.map(str::to_string),
        }
    }
}

/// Push channel of the player's playback-state changes.
pub trait NotificationSource: Send + Sync + fmt::Debug {
    /// Blocks, handing every notification to `sink`, until
    /// [`NotificationSource::close`] is called or `sink` returns false.
    fn listen(&self, sink: &mut dyn FnMut(PlayerNotification) -> bool) -> Result<(), CueError>;

    /// Makes a running [`NotificationSource::listen`] return.
    fn close(&self);
}

/// Everything the reconciliation needs, read in one pass.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSnapshot {
    pub collection: Option<String>,
    pub entry: Option<ActiveEntry>,
    pub position: Option<f64>,
}

pub fn capture_snapshot<P>(player: &mut P) -> Result<LiveSnapshot, CueError>
where
    P: PlayerStatus + ?Sized,
{
    let collection = player.current_collection()?;
    let entry = player.current_entry()?;
    let position = player.position()?;
    Ok(LiveSnapshot {
        collection,
        entry,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_state_from_name() {
        assert_eq!(PlayState::from_name("playing"), PlayState::Playing);
        assert_eq!(PlayState::from_name("Paused\n"), PlayState::Paused);
        assert_eq!(PlayState::from_name("fast forwarding"), PlayState::FastForwarding);
        assert_eq!(PlayState::from_name("kPSP"), PlayState::Unknown);
        assert!(!PlayState::Stopped.is_playing());
    }
}
