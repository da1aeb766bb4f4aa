//! Transport commands against the external player.
//!
//! The player's automation surface has no single "select track N, seek,
//! play" call. Switching tracks is done by revealing the target track in the
//! player's own UI and delivering an activation key press to the process;
//! issuing seek/play alone does not reliably leave the player playing and
//! focused. Backends that do offer an atomic start use it instead.
//!
//! Each public operation runs as one job on the [`CommandQueue`], so a
//! whole sequence (resolve, compare, switch, seek, resume) is never
//! interleaved with another trigger's commands.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogStore};
use crate::command_queue::CommandQueue;
use crate::errors::CueError;
use crate::features::FeatureToggles;
use crate::index_cache::IndexCache;
use crate::player::{MediaPlayer, PlayerLibrary, PlayerStatus, TransportControl, capture_snapshot};
use crate::resolver::{CurrentlyPlaying, resolve_snapshot};
use crate::window_fit::{FitOutcome, FitScheduler};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayOutcome {
    pub collection_index: usize,
    pub entry_index: usize,
    /// True when the player had to switch to another track.
    pub switched: bool,
    pub position: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RestartOutcome {
    Restarted {
        collection_index: usize,
        entry_index: usize,
        position: f64,
    },
    NotVideo,
    NothingPlaying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Previous,
    Replay,
    Next,
}

impl Step {
    fn apply(self, ordinal: usize) -> Option<usize> {
        match self {
            Step::Previous => ordinal.checked_sub(1),
            Step::Replay => Some(ordinal),
            Step::Next => ordinal.checked_add(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlaybackController {
    queue: CommandQueue,
    catalog: Arc<CatalogStore>,
    cache: Arc<Mutex<IndexCache>>,
    features: Arc<FeatureToggles>,
    fitter: FitScheduler,
}

impl PlaybackController {
    pub fn new(
        queue: CommandQueue,
        catalog: Arc<CatalogStore>,
        cache: Arc<Mutex<IndexCache>>,
        features: Arc<FeatureToggles>,
        fitter: FitScheduler,
    ) -> Self {
        Self {
            queue,
            catalog,
            cache,
            features,
            fitter,
        }
    }

    /// Plays `sub_collection` of `collection` from `offset` seconds.
    ///
    /// This is the entry point of every transport action. If the player is
    /// already on the target track only the position is re-applied.
    pub fn play_item(
        &self,
        collection: &str,
        sub_collection: &str,
        offset: f64,
    ) -> Result<PlayOutcome, CueError> {
        let cache = Arc::clone(&self.cache);
        let collection = collection.to_string();
        let sub_collection = sub_collection.to_string();

        let result = self.queue.run(move |player| {
            start_playback(player, &cache, &collection, &sub_collection, offset)
        });
        self.after_command("play_item", &result);
        result
    }

    /// Plays the item with `ordinal` in the given sub-collection.
    ///
    /// An ordinal outside the sub-collection is rejected before any command
    /// reaches the player.
    pub fn play_ordinal(
        &self,
        collection: &str,
        sub_collection: &str,
        ordinal: usize,
    ) -> Result<PlayOutcome, CueError> {
        let offset = item_offset(&self.catalog.current(), collection, sub_collection, ordinal)?;
        self.play_item(collection, sub_collection, offset)
    }

    pub fn play_previous(&self) -> Result<Option<PlayOutcome>, CueError> {
        self.step(Step::Previous)
    }

    pub fn play_next(&self) -> Result<Option<PlayOutcome>, CueError> {
        self.step(Step::Next)
    }

    pub fn replay_current(&self) -> Result<Option<PlayOutcome>, CueError> {
        self.step(Step::Replay)
    }

    /// Moves relative to the item the player is on right now.
    ///
    /// The current item is re-read from the player's live position rather
    /// than taken from the last published state. `Ok(None)` means nothing
    /// known is playing.
    pub fn step(&self, step: Step) -> Result<Option<PlayOutcome>, CueError> {
        let catalog = self.catalog.current();
        let cache = Arc::clone(&self.cache);

        let result = self.queue.run(move |player| {
            let Some(current) = live_current(player, &catalog)? else {
                debug!(?step, "Nothing known is playing, ignoring step");
                return Ok(None);
            };
            let ordinal = step
                .apply(current.ordinal)
                .ok_or_else(|| CueError::NoPreviousItem(current.sub_collection.clone()))?;
            let offset = item_offset(
                &catalog,
                &current.collection,
                &current.sub_collection,
                ordinal,
            )?;
            start_playback(
                player,
                &cache,
                &current.collection,
                &current.sub_collection,
                offset,
            )
            .map(Some)
        });

        match &result {
            Ok(Some(outcome)) => self.after_command("step", &Ok(*outcome)),
            Ok(None) => {}
            Err(err) => warn!(?step, error = %err, "Step aborted"),
        }
        result
    }

    /// Item currently playing according to the player's live position.
    pub fn live_current(&self) -> Result<Option<CurrentlyPlaying>, CueError> {
        let catalog = self.catalog.current();
        self.queue.run(move |player| live_current(player, &catalog))
    }

    /// Stops and restarts the current video at the same position.
    pub fn resume_video(&self) -> Result<RestartOutcome, CueError> {
        let cache = Arc::clone(&self.cache);
        let result = self
            .queue
            .run(move |player| restart_stuck_video(player, &cache));
        if let Err(err) = &result {
            warn!(error = %err, "Video restart aborted");
        }
        result
    }

    pub fn fit_window(&self) -> Option<FitOutcome> {
        self.fitter.fit_now()
    }

    /// Fits after the configured delay, if auto-fit is on.
    pub fn schedule_fit(&self) {
        if self.features.auto_fit() {
            self.fitter.schedule();
        }
    }

    pub fn features(&self) -> &Arc<FeatureToggles> {
        &self.features
    }

    pub fn reset_index_cache(&self) {
        lock_cache(&self.cache).reset();
    }

    fn after_command(&self, operation: &str, result: &Result<PlayOutcome, CueError>) {
        match result {
            Ok(outcome) => {
                debug!(operation, ?outcome, "Playback command done");
                self.schedule_fit();
            }
            Err(err) => warn!(operation, error = %err, "Playback command aborted"),
        }
    }
}

/// Start offset of `ordinal`, validated against the catalog.
pub fn item_offset(
    catalog: &Catalog,
    collection: &str,
    sub_collection: &str,
    ordinal: usize,
) -> Result<f64, CueError> {
    if catalog.collection(collection).is_none() {
        return Err(CueError::CollectionNotFound(collection.to_string()));
    }
    let sub = catalog
        .sub_collection(collection, sub_collection)
        .ok_or_else(|| CueError::sub_collection_not_found(collection, sub_collection))?;
    let item = sub
        .item(ordinal)
        .ok_or(CueError::ItemOutOfRange(ordinal, sub.len()))?;
    Ok(f64::from(item.start_time()))
}

pub(crate) fn live_current<P>(
    player: &mut P,
    catalog: &Catalog,
) -> Result<Option<CurrentlyPlaying>, CueError>
where
    P: PlayerStatus + ?Sized,
{
    let snapshot = capture_snapshot(player)?;
    Ok(resolve_snapshot(catalog, &snapshot))
}

pub(crate) fn start_playback<P>(
    player: &mut P,
    cache: &Mutex<IndexCache>,
    collection: &str,
    sub_collection: &str,
    offset: f64,
) -> Result<PlayOutcome, CueError>
where
    P: MediaPlayer + ?Sized,
{
    let (collection_index, entry_index) = {
        let mut cache = lock_cache(cache);
        let resolved = resolve_target(player, &mut cache, collection, sub_collection);
        cache.record_outcome(&resolved);
        resolved?
    };

    let active_collection = player.current_collection()?;
    let active_entry = player.current_entry()?;
    let state = player.play_state()?;

    let already_active = active_collection.as_deref() == Some(collection)
        && active_entry.map(|e| e.index) == Some(entry_index);

    if !already_active {
        if player.supports_atomic_start() {
            player.start_entry(collection_index, entry_index)?;
        } else {
            player.reveal_entry(collection_index, entry_index)?;
            player.send_activation_key()?;
        }
    }

    player.set_position(offset)?;

    if !state.is_playing() {
        player.resume()?;
    }

    info!(
        collection,
        sub_collection,
        offset,
        switched = !already_active,
        "Playback started"
    );
    Ok(PlayOutcome {
        collection_index,
        entry_index,
        switched: !already_active,
        position: offset,
    })
}

/// Player indices of the sub-collection's entry, checked against the
/// player's current track count.
fn resolve_target<P>(
    player: &mut P,
    cache: &mut IndexCache,
    collection: &str,
    sub_collection: &str,
) -> Result<(usize, usize), CueError>
where
    P: MediaPlayer + ?Sized,
{
    let collection_index = cache.resolve_collection(collection, || player.collection_names())?;
    let entry_index = cache.resolve_sub_collection(collection, sub_collection, || {
        player.entry_names(collection_index)
    })?;

    let count = player.entry_count(collection_index)?;
    if entry_index >= count {
        warn!(
            collection,
            sub_collection,
            entry_index,
            count,
            "Cached index beyond the player's track list"
        );
        return Err(CueError::RemoteIndexOutOfRange(entry_index, count));
    }
    Ok((collection_index, entry_index))
}

pub(crate) fn restart_stuck_video<P>(
    player: &mut P,
    cache: &Mutex<IndexCache>,
) -> Result<RestartOutcome, CueError>
where
    P: MediaPlayer + ?Sized,
{
    // Stopping reassigns the current track: read everything first.
    let Some(collection) = player.current_collection()? else {
        return Ok(RestartOutcome::NothingPlaying);
    };
    let Some(entry) = player.current_entry()? else {
        return Ok(RestartOutcome::NothingPlaying);
    };
    let position = player.position()?.unwrap_or(0.0);

    if !entry.is_video {
        return Ok(RestartOutcome::NotVideo);
    }

    let collection_index = {
        let mut cache = lock_cache(cache);
        let resolved = cache.resolve_collection(&collection, || player.collection_names());
        cache.record_outcome(&resolved);
        resolved?
    };

    info!(collection = %collection, entry = %entry.name, position, "Restarting stuck video");
    player.stop()?;
    player.play_entry(collection_index, entry.index, false)?;
    player.set_position(position)?;

    Ok(RestartOutcome::Restarted {
        collection_index,
        entry_index: entry.index,
        position,
    })
}

fn lock_cache(cache: &Mutex<IndexCache>) -> MutexGuard<'_, IndexCache> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{PlayerCall, SimulatedPlayer};

    fn catalog() -> Catalog {
        Catalog::from_json_str(
            r#"{"Tour2021": {
                "NightOne": [{"name": "Song A", "time": 30}, {"name": "Song B", "time": 95}],
                "NightTwo": [{"name": "Song C", "time": 12}]
            }}"#,
        )
        .unwrap()
    }

    fn player() -> SimulatedPlayer {
        SimulatedPlayer::new()
            .with_collection("Library", &["Other"])
            .with_collection("Tour2021", &["NightOne", "NightTwo"])
    }

    #[test]
    fn test_switch_reveals_and_activates() {
        let mut player = player();
        let cache = Mutex::new(IndexCache::new());
        let outcome = start_playback(&mut player, &cache, "Tour2021", "NightTwo", 12.0).unwrap();

        assert!(outcome.switched);
        assert_eq!(
            player.commands(),
            vec![
                PlayerCall::RevealEntry {
                    collection: 1,
                    entry: 1
                },
                PlayerCall::ActivationKey,
                PlayerCall::SetPosition(12.0),
                PlayerCall::Resume,
            ]
        );
        assert_eq!(player.current(), Some((1, 1)));
        assert_eq!(player.position_now(), 12.0);
    }

    #[test]
    fn test_same_entry_only_seeks() {
        let mut player = player();
        player.set_playing(1, 0, 40.0);
        let cache = Mutex::new(IndexCache::new());
        let outcome = start_playback(&mut player, &cache, "Tour2021", "NightOne", 95.0).unwrap();

        assert!(!outcome.switched);
        assert_eq!(player.commands(), vec![PlayerCall::SetPosition(95.0)]);
    }

    #[test]
    fn test_paused_player_is_resumed() {
        let mut player = player();
        player.set_playing(1, 0, 40.0);
        player.set_play_state(crate::player::PlayState::Paused);
        let cache = Mutex::new(IndexCache::new());
        start_playback(&mut player, &cache, "Tour2021", "NightOne", 30.0).unwrap();

        assert_eq!(
            player.commands(),
            vec![PlayerCall::SetPosition(30.0), PlayerCall::Resume]
        );
    }

    #[test]
    fn test_atomic_start_skips_keystroke() {
        let mut player = player().with_atomic_start();
        let cache = Mutex::new(IndexCache::new());
        start_playback(&mut player, &cache, "Tour2021", "NightOne", 0.0).unwrap();

        let commands = player.commands();
        assert_eq!(
            commands[0],
            PlayerCall::StartEntry {
                collection: 1,
                entry: 0
            }
        );
        assert!(!commands.contains(&PlayerCall::ActivationKey));
    }

    #[test]
    fn test_stale_index_issues_no_command() {
        let mut player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
        let cache = Mutex::new(IndexCache::new());
        // Memoized while the playlist still had two tracks.
        cache
            .lock()
            .unwrap()
            .resolve_sub_collection("Tour2021", "NightTwo", || {
                Ok(vec!["NightOne".into(), "NightTwo".into()])
            })
            .unwrap();

        let err = start_playback(&mut player, &cache, "Tour2021", "NightTwo", 0.0).unwrap_err();
        assert!(matches!(err, CueError::RemoteIndexOutOfRange(1, 1)));
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_repeated_stale_index_resets_cache() {
        let mut player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
        let cache = Mutex::new(IndexCache::new());
        // Memoized while two other playlists came first.
        cache
            .lock()
            .unwrap()
            .resolve_collection("Tour2021", || {
                Ok(vec!["Library".into(), "Radio".into(), "Tour2021".into()])
            })
            .unwrap();

        for _ in 0..crate::index_cache::FAILURE_RESET_THRESHOLD {
            let err =
                start_playback(&mut player, &cache, "Tour2021", "NightOne", 30.0).unwrap_err();
            assert!(err.is_resolution_failure());
        }
        assert!(player.commands().is_empty());
        assert_eq!(cache.lock().unwrap().cached_collection("Tour2021"), None);

        let outcome = start_playback(&mut player, &cache, "Tour2021", "NightOne", 30.0).unwrap();
        assert_eq!(outcome.collection_index, 0);
        assert_eq!(player.position_now(), 30.0);
    }

    #[test]
    fn test_unknown_collection_issues_no_command() {
        let mut player = player();
        let cache = Mutex::new(IndexCache::new());
        let err = start_playback(&mut player, &cache, "Tour2022", "NightOne", 0.0).unwrap_err();
        assert!(matches!(err, CueError::CollectionNotFound(_)));
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_item_offset_guards_ordinal() {
        let catalog = catalog();
        assert_eq!(item_offset(&catalog, "Tour2021", "NightOne", 2).unwrap(), 95.0);
        assert!(matches!(
            item_offset(&catalog, "Tour2021", "NightOne", 3),
            Err(CueError::ItemOutOfRange(3, 3))
        ));
        assert!(matches!(
            item_offset(&catalog, "Tour2021", "Nope", 0),
            Err(CueError::SubCollectionNotFound(_, _))
        ));
    }

    #[test]
    fn test_restart_snapshots_before_stopping() {
        let mut player = player().with_video_entries();
        player.set_playing(1, 1, 42.5);
        let cache = Mutex::new(IndexCache::new());

        let outcome = restart_stuck_video(&mut player, &cache).unwrap();
        assert_eq!(
            outcome,
            RestartOutcome::Restarted {
                collection_index: 1,
                entry_index: 1,
                position: 42.5
            }
        );
        assert_eq!(
            player.commands(),
            vec![
                PlayerCall::Stop,
                PlayerCall::PlayEntry {
                    collection: 1,
                    entry: 1,
                    auto_advance: false
                },
                PlayerCall::SetPosition(42.5),
            ]
        );
        assert_eq!(player.position_now(), 42.5);
    }

    #[test]
    fn test_restart_ignores_audio() {
        let mut player = player();
        player.set_playing(1, 1, 42.5);
        let cache = Mutex::new(IndexCache::new());
        assert_eq!(
            restart_stuck_video(&mut player, &cache).unwrap(),
            RestartOutcome::NotVideo
        );
        assert!(player.commands().is_empty());
    }
}
