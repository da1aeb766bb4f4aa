use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use pmocue::simulator::PlayerCall;
use pmocue::{
    ActiveMarks, Bounds, Catalog, CueSession, CurrentlyPlaying, FitGeometry, PlayState,
    PlayerNotification, Point, SessionOptions, SimulatedPlayer, Size, UiPublisher,
};

const TOUR: &str = r#"{
    "Tour2021": {
        "NightOne": [
            {"name": "Song A", "time": 30},
            {"name": "Song B", "time": 95}
        ]
    }
}"#;

fn start(player: &SimulatedPlayer) -> (CueSession, crossbeam_channel::Receiver<pmocue::NowPlayingUpdate>) {
    start_with(
        player,
        SessionOptions {
            auto_fit: false,
            poll_interval: Duration::from_millis(20),
            ..SessionOptions::default()
        },
    )
}

fn start_with(
    player: &SimulatedPlayer,
    options: SessionOptions,
) -> (CueSession, crossbeam_channel::Receiver<pmocue::NowPlayingUpdate>) {
    let (publisher, rx) = UiPublisher::channel();
    let session = CueSession::new(
        Box::new(player.clone()),
        Catalog::from_json_str(TOUR).unwrap(),
        options,
        publisher,
    )
    .unwrap();
    (session, rx)
}

#[test]
fn test_next_from_song_a_seeks_to_song_b() {
    let player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
    player.set_playing(0, 0, 40.0);
    let (session, _rx) = start(&player);

    let current = session.controller().live_current().unwrap().unwrap();
    assert_eq!(current, CurrentlyPlaying::new("Tour2021", "NightOne", 1));
    assert_eq!(current.item(&session.catalog()).unwrap().name(), "Song A");

    let outcome = session.controller().play_next().unwrap().unwrap();
    assert_eq!(outcome.position, 95.0);
    assert!(player.commands().contains(&PlayerCall::SetPosition(95.0)));
    assert_eq!(player.position_now(), 95.0);

    session.shutdown();
}

#[test]
fn test_next_past_last_item_issues_nothing() {
    let player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
    player.set_playing(0, 0, 120.0);
    let (session, _rx) = start(&player);

    assert!(session.controller().play_next().is_err());
    assert!(player.commands().is_empty());
}

#[test]
fn test_play_item_switches_through_reveal_and_key() {
    let player = SimulatedPlayer::new()
        .with_collection("Library", &["Misc"])
        .with_collection("Tour2021", &["NightOne"]);
    let (session, _rx) = start(&player);

    let outcome = session.play_item("Tour2021", "NightOne", 30.0).unwrap();
    assert!(outcome.switched);
    assert_eq!(
        player.commands(),
        vec![
            PlayerCall::RevealEntry {
                collection: 1,
                entry: 0
            },
            PlayerCall::ActivationKey,
            PlayerCall::SetPosition(30.0),
            PlayerCall::Resume,
        ]
    );
    assert_eq!(player.play_state_now(), PlayState::Playing);

    // Indices are memoized: a second call does not rescan the library.
    player.clear_calls();
    session.play_item("Tour2021", "NightOne", 95.0).unwrap();
    assert!(!player.calls().contains(&PlayerCall::CollectionNames));
    assert_eq!(player.commands(), vec![PlayerCall::SetPosition(95.0)]);
}

#[test]
fn test_stale_cache_until_reload() {
    let player = SimulatedPlayer::new()
        .with_collection("Library", &["Misc"])
        .with_collection("Tour2021", &["NightOne"]);
    let (session, _rx) = start(&player);
    session.play_item("Tour2021", "NightOne", 0.0).unwrap();

    player.move_collection_to_front("Tour2021");
    player.clear_calls();
    // The cached index now points at "Library", which has one track.
    session.play_item("Tour2021", "NightOne", 0.0).unwrap();
    assert!(player.commands().contains(&PlayerCall::RevealEntry {
        collection: 1,
        entry: 0
    }));

    session.reload_catalog(Catalog::from_json_str(TOUR).unwrap());
    player.clear_calls();
    session.play_item("Tour2021", "NightOne", 0.0).unwrap();
    assert!(player.calls().contains(&PlayerCall::CollectionNames));
    assert!(player.commands().contains(&PlayerCall::RevealEntry {
        collection: 0,
        entry: 0
    }));
    session.shutdown();
}

#[test]
fn test_ui_sees_each_transition_once() {
    let player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
    player.set_playing(0, 0, 40.0);
    let (session, rx) = start(&player);

    session.surface_opened().unwrap();
    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.view.item, "Song A");
    assert_eq!(first.view.next, "Next Song B");

    let mut marks = ActiveMarks::new();
    marks.apply(&first);
    assert!(marks.is_sub_collection_active("Tour2021", "NightOne"));

    // Several ticks while Song A keeps playing publish nothing.
    std::thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err());

    player.set_position_externally(100.0);
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(second.previous, first.current);
    assert_eq!(second.view.item, "Song B");
    marks.apply(&second);
    assert!(marks.is_item_active(&CurrentlyPlaying::new("Tour2021", "NightOne", 2)));

    session.surface_closed();
    assert!(!session.is_polling());
    session.shutdown();
}

#[test]
fn test_notifications_update_without_surface() {
    let player = SimulatedPlayer::new().with_collection("Tour2021", &["NightOne"]);
    player.set_playing(0, 0, 100.0);
    let (session, rx) = start(&player);

    session.notify(PlayerNotification::new(PlayState::Playing, Some("NightOne")));
    let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(update.view.item, "Song B");
    assert!(!session.is_polling());
    session.shutdown();
}

#[test]
fn test_load_catalog_from_file() {
    let player = SimulatedPlayer::new().with_collection("Tour2022", &["NightTwo"]);
    player.set_playing(0, 0, 15.0);
    let (session, rx) = start(&player);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"Tour2022": {{"NightTwo": [{{"name": "Opener", "time": 10}}]}}}}"#
    )
    .unwrap();

    session.load_catalog(file.path()).unwrap();
    let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(update.view.collection, "Tour2022");
    assert_eq!(update.view.item, "Opener");
    assert!(session.catalog().collection("Tour2021").is_none());
}

fn window_writes(player: &SimulatedPlayer) -> Vec<PlayerCall> {
    player
        .commands()
        .into_iter()
        .filter(|c| matches!(c, PlayerCall::SetWindowBounds(_, _)))
        .collect()
}

/// Fits run on their own thread: wait until `count` window writes landed.
fn wait_for_window_writes(player: &SimulatedPlayer, count: usize) -> Vec<PlayerCall> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let writes = window_writes(player);
        if writes.len() >= count || Instant::now() > deadline {
            return writes;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

const SMALL_VIDEO: Bounds = Bounds {
    origin: Point { x: 0, y: 0 },
    size: Size {
        width: 640,
        height: 360,
    },
};

#[test]
fn test_auto_fit_after_play_and_notification() {
    let max = Size {
        width: 1000,
        height: 563,
    };
    let player = SimulatedPlayer::new()
        .with_collection("Tour2021", &["NightOne"])
        .with_window("Video", SMALL_VIDEO)
        .with_max_window_size(max);
    let (session, _rx) = start_with(
        &player,
        SessionOptions {
            auto_fit: true,
            fit_delay: Duration::ZERO,
            ..SessionOptions::default()
        },
    );

    let geometry = FitGeometry::default();
    let expand = PlayerCall::SetWindowBounds(
        1,
        Bounds {
            origin: geometry.anchor,
            size: geometry.reference,
        },
    );
    let center = PlayerCall::SetWindowBounds(
        1,
        Bounds {
            origin: geometry.target_position(max),
            size: max,
        },
    );

    session.play_item("Tour2021", "NightOne", 30.0).unwrap();
    assert_eq!(
        wait_for_window_writes(&player, 2),
        vec![expand.clone(), center.clone()]
    );

    player.clear_calls();
    player.set_window_externally("Video", SMALL_VIDEO);
    session.notify(PlayerNotification::new(PlayState::Playing, Some("NightOne")));
    assert_eq!(wait_for_window_writes(&player, 2), vec![expand, center]);
    session.shutdown();
}

#[test]
fn test_no_fit_when_auto_fit_is_off() {
    let player = SimulatedPlayer::new()
        .with_collection("Tour2021", &["NightOne"])
        .with_window("Video", SMALL_VIDEO);
    let (session, _rx) = start(&player);

    session.play_item("Tour2021", "NightOne", 30.0).unwrap();
    session.notify(PlayerNotification::new(PlayState::Playing, Some("NightOne")));
    thread::sleep(Duration::from_millis(200));
    session.shutdown();

    assert!(window_writes(&player).is_empty());
    assert!(!player.calls().contains(&PlayerCall::Windows));
    assert_eq!(player.window_bounds("Video"), Some(SMALL_VIDEO));
}
