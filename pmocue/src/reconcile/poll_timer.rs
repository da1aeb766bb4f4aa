use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use tracing::debug;

use super::ReconcileMessage;

/// Periodic trigger, alive only while the UI surface is open.
///
/// Sends one tick immediately, then one per `interval`, until cancelled or
/// dropped.
#[derive(Debug)]
pub struct PollTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollTimer {
    pub fn start(interval: Duration, ticks: Sender<ReconcileMessage>) -> io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("cue-poll-timer".into())
            .spawn(move || {
                let ticker = tick(interval);
                if ticks.send(ReconcileMessage::Tick).is_ok() {
                    loop {
                        select! {
                            recv(ticker) -> _ => {
                                if ticks.send(ReconcileMessage::Tick).is_err() {
                                    break;
                                }
                            }
                            recv(stopped) -> _ => break,
                        }
                    }
                }
                debug!("Poll timer stopped");
            })?;

        debug!(?interval, "Poll timer started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn cancel(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_ticks_until_cancelled() {
        let (tx, rx) = unbounded();
        let timer = PollTimer::start(Duration::from_millis(10), tx).unwrap();

        for _ in 0..3 {
            let msg = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert!(matches!(msg, ReconcileMessage::Tick));
        }
        timer.cancel();

        // The timer thread owned the only sender.
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_first_tick_is_immediate() {
        let (tx, rx) = unbounded();
        let _timer = PollTimer::start(Duration::from_secs(3600), tx).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }
}
