//! In-memory stand-in for the external player.
//!
//! `SimulatedPlayer` behaves like a minimal track-based player: revealing a
//! track and pressing the activation key starts it, stopping unloads the
//! current track, and window geometry is stored as-is (optionally clamped to
//! a maximum size, like a window manager keeping an aspect ratio). Every
//! call is appended to a shared journal so callers can assert on the exact
//! command sequence. Clones share the same state.
//!
//! [`SimulatedNotifications`] stands in for the player's notification
//! stream: whatever is sent on its channel is delivered as-is.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::catalog::Catalog;
use crate::errors::CueError;
use crate::player::{
    ActiveEntry, Bounds, NotificationSource, PlayState, PlayerLibrary, PlayerNotification,
    PlayerStatus, Point, Size, TransportControl, WindowControl, WindowInfo,
};

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCall {
    CurrentCollection,
    CurrentEntry,
    Position,
    PlayState,
    CollectionNames,
    EntryNames(usize),
    EntryCount(usize),
    SetPosition(f64),
    Resume,
    Stop,
    PlayEntry {
        collection: usize,
        entry: usize,
        auto_advance: bool,
    },
    RevealEntry {
        collection: usize,
        entry: usize,
    },
    ActivationKey,
    StartEntry {
        collection: usize,
        entry: usize,
    },
    Windows,
    WindowPosition(usize),
    WindowSize(usize),
    SetWindowBounds(usize, Bounds),
}

impl PlayerCall {
    /// True for calls that change the player's state.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            PlayerCall::SetPosition(_)
                | PlayerCall::Resume
                | PlayerCall::Stop
                | PlayerCall::PlayEntry { .. }
                | PlayerCall::RevealEntry { .. }
                | PlayerCall::ActivationKey
                | PlayerCall::StartEntry { .. }
                | PlayerCall::SetWindowBounds(_, _)
        )
    }
}

#[derive(Clone, Debug)]
struct SimEntry {
    name: String,
    is_video: bool,
}

#[derive(Clone, Debug)]
struct SimCollection {
    name: String,
    entries: Vec<SimEntry>,
}

#[derive(Clone, Debug)]
struct SimWindow {
    title: Option<String>,
    bounds: Bounds,
}

#[derive(Debug)]
struct SimState {
    collections: Vec<SimCollection>,
    current: Option<(usize, usize)>,
    revealed: Option<(usize, usize)>,
    position: f64,
    play_state: PlayState,
    windows: Vec<SimWindow>,
    max_window_size: Option<Size>,
    atomic_start: bool,
    latency: Duration,
    calls: Vec<PlayerCall>,
}

#[derive(Clone, Debug)]
pub struct SimulatedPlayer {
    state: Arc<Mutex<SimState>>,
    main_window_title: String,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        let main_window_title = "Music".to_string();
        Self {
            state: Arc::new(Mutex::new(SimState {
                collections: Vec::new(),
                current: None,
                revealed: None,
                position: 0.0,
                play_state: PlayState::Stopped,
                windows: vec![SimWindow {
                    title: Some(main_window_title.clone()),
                    bounds: Bounds::new(0, 0, 1200, 800),
                }],
                max_window_size: None,
                atomic_start: false,
                latency: Duration::ZERO,
                calls: Vec::new(),
            })),
            main_window_title,
        }
    }

    /// Mirrors every catalog collection as a playlist whose tracks are the
    /// sub-collections.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut player = Self::new();
        for collection in catalog.collections() {
            let entries: Vec<&str> = collection.sub_collections().map(|s| s.name()).collect();
            player = player.with_collection(collection.name(), &entries);
        }
        player
    }

    pub fn with_collection(self, name: &str, entries: &[&str]) -> Self {
        self.lock().collections.push(SimCollection {
            name: name.to_string(),
            entries: entries
                .iter()
                .map(|e| SimEntry {
                    name: e.to_string(),
                    is_video: false,
                })
                .collect(),
        });
        self
    }

    pub fn with_video_entries(self) -> Self {
        for collection in self.lock().collections.iter_mut() {
            for entry in collection.entries.iter_mut() {
                entry.is_video = true;
            }
        }
        self
    }

    pub fn with_window(self, title: &str, bounds: Bounds) -> Self {
        self.lock().windows.push(SimWindow {
            title: Some(title.to_string()),
            bounds,
        });
        self
    }

    pub fn with_max_window_size(self, size: Size) -> Self {
        self.lock().max_window_size = Some(size);
        self
    }

    pub fn with_atomic_start(self) -> Self {
        self.lock().atomic_start = true;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Loads `entry` of `collection` as if the user started it in the player.
    pub fn set_playing(&self, collection: usize, entry: usize, position: f64) {
        let mut state = self.lock();
        state.current = Some((collection, entry));
        state.position = position;
        state.play_state = PlayState::Playing;
    }

    pub fn set_play_state(&self, play_state: PlayState) {
        self.lock().play_state = play_state;
    }

    pub fn set_position_externally(&self, position: f64) {
        self.lock().position = position;
    }

    /// Moves or resizes a window as the user would, without journaling.
    pub fn set_window_externally(&self, title: &str, bounds: Bounds) {
        let mut state = self.lock();
        if let Some(window) = state
            .windows
            .iter_mut()
            .find(|w| w.title.as_deref() == Some(title))
        {
            window.bounds = bounds;
        }
    }

    pub fn move_collection_to_front(&self, name: &str) {
        let mut state = self.lock();
        if let Some(i) = state.collections.iter().position(|c| c.name == name) {
            let collection = state.collections.remove(i);
            state.collections.insert(0, collection);
        }
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.lock().calls.clone()
    }

    pub fn commands(&self) -> Vec<PlayerCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_command())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn current(&self) -> Option<(usize, usize)> {
        self.lock().current
    }

    pub fn position_now(&self) -> f64 {
        self.lock().position
    }

    pub fn play_state_now(&self) -> PlayState {
        self.lock().play_state
    }

    pub fn window_bounds(&self, title: &str) -> Option<Bounds> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.title.as_deref() == Some(title))
            .map(|w| w.bounds)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: PlayerCall) -> MutexGuard<'_, SimState> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

impl SimState {
    fn collection(&self, index: usize) -> Result<&SimCollection, CueError> {
        self.collections
            .get(index)
            .ok_or(CueError::RemoteIndexOutOfRange(index, self.collections.len()))
    }

    fn check_entry(&self, collection: usize, entry: usize) -> Result<(), CueError> {
        let count = self.collection(collection)?.entries.len();
        if entry >= count {
            return Err(CueError::RemoteIndexOutOfRange(entry, count));
        }
        Ok(())
    }

    fn start(&mut self, collection: usize, entry: usize) {
        self.current = Some((collection, entry));
        self.position = 0.0;
        self.play_state = PlayState::Playing;
    }

    fn window(&mut self, index: usize) -> Result<&mut SimWindow, CueError> {
        self.windows
            .get_mut(index)
            .ok_or_else(|| CueError::automation("window vanished"))
    }
}

impl PlayerStatus for SimulatedPlayer {
    fn current_collection(&mut self) -> Result<Option<String>, CueError> {
        let state = self.record(PlayerCall::CurrentCollection);
        Ok(state
            .current
            .and_then(|(c, _)| state.collections.get(c))
            .map(|c| c.name.clone()))
    }

    fn current_entry(&mut self) -> Result<Option<ActiveEntry>, CueError> {
        let state = self.record(PlayerCall::CurrentEntry);
        Ok(state.current.and_then(|(c, e)| {
            let entry = state.collections.get(c)?.entries.get(e)?;
            Some(ActiveEntry {
                index: e,
                name: entry.name.clone(),
                is_video: entry.is_video,
            })
        }))
    }

    fn position(&mut self) -> Result<Option<f64>, CueError> {
        let state = self.record(PlayerCall::Position);
        Ok(state.current.map(|_| state.position))
    }

    fn play_state(&mut self) -> Result<PlayState, CueError> {
        Ok(self.record(PlayerCall::PlayState).play_state)
    }
}

impl PlayerLibrary for SimulatedPlayer {
    fn collection_names(&mut self) -> Result<Vec<String>, CueError> {
        let state = self.record(PlayerCall::CollectionNames);
        Ok(state.collections.iter().map(|c| c.name.clone()).collect())
    }

    fn entry_names(&mut self, collection: usize) -> Result<Vec<String>, CueError> {
        let state = self.record(PlayerCall::EntryNames(collection));
        Ok(state
            .collection(collection)?
            .entries
            .iter()
            .map(|e| e.name.clone())
            .collect())
    }

    fn entry_count(&mut self, collection: usize) -> Result<usize, CueError> {
        let state = self.record(PlayerCall::EntryCount(collection));
        Ok(state.collection(collection)?.entries.len())
    }
}

impl TransportControl for SimulatedPlayer {
    fn set_position(&mut self, seconds: f64) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::SetPosition(seconds));
        if state.current.is_some() {
            state.position = seconds;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::Resume);
        if state.current.is_some() {
            state.play_state = PlayState::Playing;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::Stop);
        state.current = None;
        state.position = 0.0;
        state.play_state = PlayState::Stopped;
        Ok(())
    }

    fn play_entry(
        &mut self,
        collection: usize,
        entry: usize,
        auto_advance: bool,
    ) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::PlayEntry {
            collection,
            entry,
            auto_advance,
        });
        state.check_entry(collection, entry)?;
        state.start(collection, entry);
        Ok(())
    }

    fn reveal_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::RevealEntry { collection, entry });
        state.check_entry(collection, entry)?;
        state.revealed = Some((collection, entry));
        Ok(())
    }

    fn send_activation_key(&mut self) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::ActivationKey);
        if let Some((collection, entry)) = state.revealed.take() {
            state.start(collection, entry);
        }
        Ok(())
    }

    fn supports_atomic_start(&self) -> bool {
        self.lock().atomic_start
    }

    fn start_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::StartEntry { collection, entry });
        if !state.atomic_start {
            return Err(CueError::not_supported("start_entry"));
        }
        state.check_entry(collection, entry)?;
        state.start(collection, entry);
        Ok(())
    }
}

impl WindowControl for SimulatedPlayer {
    fn main_window_title(&self) -> &str {
        &self.main_window_title
    }

    fn windows(&mut self) -> Result<Vec<WindowInfo>, CueError> {
        let state = self.record(PlayerCall::Windows);
        Ok(state
            .windows
            .iter()
            .enumerate()
            .map(|(index, w)| WindowInfo {
                index,
                title: w.title.clone(),
            })
            .collect())
    }

    fn window_position(&mut self, window: &WindowInfo) -> Result<Point, CueError> {
        let mut state = self.record(PlayerCall::WindowPosition(window.index));
        Ok(state.window(window.index)?.bounds.origin)
    }

    fn window_size(&mut self, window: &WindowInfo) -> Result<Size, CueError> {
        let mut state = self.record(PlayerCall::WindowSize(window.index));
        Ok(state.window(window.index)?.bounds.size)
    }

    fn set_window_bounds(&mut self, window: &WindowInfo, bounds: Bounds) -> Result<(), CueError> {
        let mut state = self.record(PlayerCall::SetWindowBounds(window.index, bounds));
        let max = state.max_window_size;
        let target = state.window(window.index)?;
        let mut applied = bounds;
        if let Some(max) = max {
            applied.size.width = applied.size.width.min(max.width);
            applied.size.height = applied.size.height.min(max.height);
        }
        target.bounds = applied;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimulatedNotifications {
    events: Receiver<PlayerNotification>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl SimulatedNotifications {
    /// Returns the sending side together with the source to watch.
    pub fn channel() -> (Sender<PlayerNotification>, Self) {
        let (tx, events) = unbounded();
        let (stop_tx, stop_rx) = bounded(1);
        (
            tx,
            Self {
                events,
                stop_tx,
                stop_rx,
            },
        )
    }
}

impl NotificationSource for SimulatedNotifications {
    fn listen(&self, sink: &mut dyn FnMut(PlayerNotification) -> bool) -> Result<(), CueError> {
        loop {
            select! {
                recv(self.events) -> event => match event {
                    Ok(notification) => {
                        if !sink(notification) {
                            return Ok(());
                        }
                    }
                    Err(_) => return Ok(()),
                },
                recv(self.stop_rx) -> _ => return Ok(()),
            }
        }
    }

    fn close(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_stop_when_sink_refuses() {
        let (tx, source) = SimulatedNotifications::channel();
        tx.send(PlayerNotification::new(PlayState::Playing, Some("NightOne")))
            .unwrap();
        tx.send(PlayerNotification::new(PlayState::Paused, Some("NightOne")))
            .unwrap();

        let mut seen = Vec::new();
        source
            .listen(&mut |n| {
                seen.push(n.state);
                false
            })
            .unwrap();
        assert_eq!(seen, vec![PlayState::Playing]);
    }

    #[test]
    fn test_close_ends_listen() {
        let (_tx, source) = SimulatedNotifications::channel();
        source.close();
        source.listen(&mut |_| true).unwrap();
    }
}
