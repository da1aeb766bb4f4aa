//! Serialized access to the external player.
//!
//! A single worker thread owns the [`MediaPlayer`]. Every logical operation
//! (a whole `play_item`, one reconciliation snapshot, one window fit pass)
//! is sent as one job, so operations coming from the poll timer, player
//! notifications and user actions never interleave against the player.
//!
//! Callers wait at most `timeout` for the job's answer. On timeout the job
//! is cancelled: if it has not started yet it is dropped, and if it is
//! running every further player call it makes fails with
//! [`CueError::Cancelled`]. The call in flight at that moment is not
//! interrupted.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, warn};

use crate::errors::CueError;
use crate::player::{
    ActiveEntry, Bounds, MediaPlayer, PlayState, PlayerLibrary, PlayerStatus, Point, Size,
    TransportControl, WindowControl, WindowInfo,
};

struct Job {
    cancelled: Arc<AtomicBool>,
    run: Box<dyn FnOnce(&mut dyn MediaPlayer) + Send>,
}

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct CommandQueue {
    jobs: Sender<Job>,
    timeout: Duration,
}

impl CommandQueue {
    /// Starts the worker thread that owns `player`.
    ///
    /// The worker exits once every clone of the queue has been dropped.
    pub fn spawn(player: Box<dyn MediaPlayer>, timeout: Duration) -> io::Result<Self> {
        let (jobs, rx) = unbounded::<Job>();

        thread::Builder::new()
            .name("cue-command-queue".into())
            .spawn(move || {
                let mut player = player;
                for job in rx {
                    if job.cancelled.load(Ordering::Acquire) {
                        debug!("Skipping a job abandoned before it started");
                        continue;
                    }
                    let mut guarded = CancellablePlayer {
                        inner: player.as_mut(),
                        cancelled: &job.cancelled,
                    };
                    (job.run)(&mut guarded);
                }
                debug!("Command queue worker exiting");
            })?;

        Ok(Self { jobs, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op` on the worker thread and waits for its result.
    pub fn run<T, F>(&self, op: F) -> Result<T, CueError>
    where
        F: FnOnce(&mut dyn MediaPlayer) -> Result<T, CueError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, answer) = bounded::<Result<T, CueError>>(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let job = Job {
            cancelled: Arc::clone(&cancelled),
            run: Box::new(move |player| {
                // The caller may have timed out and gone away.
                let _ = reply.send(op(player));
            }),
        };

        self.jobs.send(job).map_err(|_| CueError::QueueClosed)?;

        match answer.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Release);
                warn!(timeout = ?self.timeout, "Player operation timed out, cancelled");
                Err(CueError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CueError::QueueClosed),
        }
    }
}

/// View of the player handed to one job: refuses every call once the job
/// has been cancelled.
struct CancellablePlayer<'a> {
    inner: &'a mut dyn MediaPlayer,
    cancelled: &'a AtomicBool,
}

impl CancellablePlayer<'_> {
    fn check(&self) -> Result<(), CueError> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(CueError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl PlayerStatus for CancellablePlayer<'_> {
    fn current_collection(&mut self) -> Result<Option<String>, CueError> {
        self.check()?;
        self.inner.current_collection()
    }

    fn current_entry(&mut self) -> Result<Option<ActiveEntry>, CueError> {
        self.check()?;
        self.inner.current_entry()
    }

    fn position(&mut self) -> Result<Option<f64>, CueError> {
        self.check()?;
        self.inner.position()
    }

    fn play_state(&mut self) -> Result<PlayState, CueError> {
        self.check()?;
        self.inner.play_state()
    }
}

impl PlayerLibrary for CancellablePlayer<'_> {
    fn collection_names(&mut self) -> Result<Vec<String>, CueError> {
        self.check()?;
        self.inner.collection_names()
    }

    fn entry_names(&mut self, collection: usize) -> Result<Vec<String>, CueError> {
        self.check()?;
        self.inner.entry_names(collection)
    }

    fn entry_count(&mut self, collection: usize) -> Result<usize, CueError> {
        self.check()?;
        self.inner.entry_count(collection)
    }
}

impl TransportControl for CancellablePlayer<'_> {
    fn set_position(&mut self, seconds: f64) -> Result<(), CueError> {
        self.check()?;
        self.inner.set_position(seconds)
    }

    fn resume(&mut self) -> Result<(), CueError> {
        self.check()?;
        self.inner.resume()
    }

    fn stop(&mut self) -> Result<(), CueError> {
        self.check()?;
        self.inner.stop()
    }

    fn play_entry(
        &mut self,
        collection: usize,
        entry: usize,
        auto_advance: bool,
    ) -> Result<(), CueError> {
        self.check()?;
        self.inner.play_entry(collection, entry, auto_advance)
    }

    fn reveal_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError> {
        self.check()?;
        self.inner.reveal_entry(collection, entry)
    }

    fn send_activation_key(&mut self) -> Result<(), CueError> {
        self.check()?;
        self.inner.send_activation_key()
    }

    fn supports_atomic_start(&self) -> bool {
        self.inner.supports_atomic_start()
    }

    fn start_entry(&mut self, collection: usize, entry: usize) -> Result<(), CueError> {
        self.check()?;
        self.inner.start_entry(collection, entry)
    }
}

impl WindowControl for CancellablePlayer<'_> {
    fn main_window_title(&self) -> &str {
        self.inner.main_window_title()
    }

    fn windows(&mut self) -> Result<Vec<WindowInfo>, CueError> {
        self.check()?;
        self.inner.windows()
    }

    fn window_position(&mut self, window: &WindowInfo) -> Result<Point, CueError> {
        self.check()?;
        self.inner.window_position(window)
    }

    fn window_size(&mut self, window: &WindowInfo) -> Result<Size, CueError> {
        self.check()?;
        self.inner.window_size(window)
    }

    fn set_window_bounds(&mut self, window: &WindowInfo, bounds: Bounds) -> Result<(), CueError> {
        self.check()?;
        self.inner.set_window_bounds(window, bounds)
    }
}
