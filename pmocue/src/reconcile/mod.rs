//! Keeps one authoritative "currently playing" value.
//!
//! Two triggers feed the same update routine: a poll timer that runs only
//! while the UI surface is open, and the player's own playback-state
//! notifications, delivered whether or not the surface is visible. Both
//! arrive as [`ReconcileMessage`]s on one channel and are handled in order by
//! the reconciler thread.
//!
//! The update routine never fails. A player that cannot be reached or a
//! position outside the catalog both read as "nothing playing".

mod poll_timer;
mod stuck_video;

pub use poll_timer::PollTimer;
pub use stuck_video::StuckVideoDetector;

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::command_queue::CommandQueue;
use crate::controller::{PlaybackController, RestartOutcome, live_current};
use crate::now_playing::{NowPlayingUpdate, NowPlayingView, UiPublisher};
use crate::player::{NotificationSource, PlayerNotification};
use crate::resolver::CurrentlyPlaying;

#[derive(Debug)]
pub enum ReconcileMessage {
    Tick,
    Notification(PlayerNotification),
    /// Publish even if the value did not change (catalog reload).
    Refresh,
    Shutdown,
}

/// The update routine, without any thread around it.
#[derive(Debug)]
pub struct ReconcileCore {
    queue: CommandQueue,
    catalog: Arc<CatalogStore>,
    publisher: UiPublisher,
    published: Option<CurrentlyPlaying>,
}

impl ReconcileCore {
    pub fn new(queue: CommandQueue, catalog: Arc<CatalogStore>, publisher: UiPublisher) -> Self {
        Self {
            queue,
            catalog,
            publisher,
            published: None,
        }
    }

    pub fn published(&self) -> Option<&CurrentlyPlaying> {
        self.published.as_ref()
    }

    /// Resolves the live state and publishes it if it changed.
    ///
    /// Returns true when an update was handed to the UI.
    pub fn update(&mut self) -> bool {
        self.update_with(false)
    }

    /// Like [`ReconcileCore::update`], but always publishes.
    pub fn force_update(&mut self) -> bool {
        self.update_with(true)
    }

    fn update_with(&mut self, force: bool) -> bool {
        let catalog = self.catalog.current();
        let observed = {
            let catalog = Arc::clone(&catalog);
            match self.queue.run(move |player| live_current(player, &catalog)) {
                Ok(current) => current,
                Err(err) => {
                    debug!(error = %err, "Player state unavailable, treating as idle");
                    None
                }
            }
        };

        if !force && observed == self.published {
            return false;
        }

        let view = NowPlayingView::build(&catalog, observed.as_ref());
        info!(
            collection = %view.collection,
            sub_collection = %view.sub_collection,
            item = %view.item,
            "Now playing"
        );
        let update = NowPlayingUpdate {
            previous: self.published.take(),
            current: observed.clone(),
            view,
        };
        self.published = observed;
        self.publisher.publish(update)
    }
}

struct ReconcileWorker {
    core: ReconcileCore,
    controller: PlaybackController,
    detector: StuckVideoDetector,
}

impl ReconcileWorker {
    fn run(mut self, rx: Receiver<ReconcileMessage>) {
        for message in rx {
            match message {
                ReconcileMessage::Tick => {
                    self.core.update();
                }
                ReconcileMessage::Notification(notification) => {
                    self.on_notification(notification);
                }
                ReconcileMessage::Refresh => {
                    self.core.force_update();
                }
                ReconcileMessage::Shutdown => break,
            }
        }
        debug!("Reconciler exiting");
    }

    fn on_notification(&mut self, notification: PlayerNotification) {
        debug!(state = ?notification.state, name = ?notification.name, "Player notification");
        self.controller.schedule_fit();

        let name = notification.name.as_deref().unwrap_or_default();
        let stuck = self.detector.observe(notification.state, name);
        if stuck && self.controller.features().resume_stuck_video() {
            match self.controller.resume_video() {
                Ok(RestartOutcome::Restarted { position, .. }) => {
                    info!(name, position, "Stuck video restarted")
                }
                Ok(outcome) => debug!(?outcome, "No video to restart"),
                // Already logged by the controller.
                Err(_) => {}
            }
        }

        self.core.update();
    }
}

/// Thread forwarding a [`NotificationSource`] into the reconciler.
#[derive(Debug)]
struct NotificationWatcher {
    source: Arc<dyn NotificationSource>,
    handle: JoinHandle<()>,
}

impl NotificationWatcher {
    fn start(source: Arc<dyn NotificationSource>, tx: Sender<ReconcileMessage>) -> io::Result<Self> {
        let listener = Arc::clone(&source);
        let handle = thread::Builder::new()
            .name("cue-player-events".into())
            .spawn(move || {
                let result = listener.listen(&mut |notification| {
                    tx.send(ReconcileMessage::Notification(notification)).is_ok()
                });
                match result {
                    Ok(()) => debug!("Player notifications stopped"),
                    Err(err) => warn!(error = %err, "Player notifications unavailable"),
                }
            })?;
        Ok(Self { source, handle })
    }

    fn stop(self) {
        self.source.close();
        if self.handle.join().is_err() {
            warn!("Player notification thread panicked");
        }
    }
}

/// Handle on the reconciler thread, its poll timer and its notification
/// watcher.
#[derive(Debug)]
pub struct Reconciler {
    tx: Sender<ReconcileMessage>,
    interval: Duration,
    timer: Mutex<Option<PollTimer>>,
    watcher: Mutex<Option<NotificationWatcher>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Reconciler {
    pub fn spawn(
        core: ReconcileCore,
        controller: PlaybackController,
        interval: Duration,
    ) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let worker = ReconcileWorker {
            core,
            controller,
            detector: StuckVideoDetector::new(),
        };

        let handle = thread::Builder::new()
            .name("cue-reconciler".into())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            tx,
            interval,
            timer: Mutex::new(None),
            watcher: Mutex::new(None),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Starts polling. Calling it while already polling is a no-op.
    pub fn surface_opened(&self) -> io::Result<()> {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_none() {
            *timer = Some(PollTimer::start(self.interval, self.tx.clone())?);
        }
        Ok(())
    }

    pub fn surface_closed(&self) {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn notify(&self, notification: PlayerNotification) {
        self.send(ReconcileMessage::Notification(notification));
    }

    /// Feeds every notification of `source` to the reconciler, replacing
    /// the source watched so far.
    pub fn watch(&self, source: Arc<dyn NotificationSource>) -> io::Result<()> {
        let watcher = NotificationWatcher::start(source, self.tx.clone())?;
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(watcher);
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn refresh(&self) {
        self.send(ReconcileMessage::Refresh);
    }

    /// Stops the timer and the watcher, lets pending messages drain, and
    /// joins the thread.
    pub fn shutdown(&self) {
        self.surface_closed();
        let watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = self.tx.send(ReconcileMessage::Shutdown);
            if handle.join().is_err() {
                warn!("Reconciler thread panicked");
            }
        }
    }

    fn send(&self, message: ReconcileMessage) {
        if self.tx.send(message).is_err() {
            debug!("Reconciler is gone, message dropped");
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
