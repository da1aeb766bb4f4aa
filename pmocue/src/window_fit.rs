//! Corrective placement of the player's video window.
//!
//! The video window is the player's one top-level window that is not its
//! main window. It is moved in two passes: first expanded to the reference
//! size at the anchor (the window manager centers relative to the window's
//! current size, so the size has to be settled first), then re-read and
//! moved so that its center matches the center of the reference frame.
//!
//! Failures here are cosmetic: callers log them and carry on.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::command_queue::CommandQueue;
use crate::errors::CueError;
use crate::player::{Bounds, Point, Size, WindowControl, WindowInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitGeometry {
    /// Top-left corner of the reference frame.
    pub anchor: Point,
    /// Size of the reference frame.
    pub reference: Size,
    /// Pixel distance under which the window counts as already placed.
    pub tolerance: i32,
}

impl Default for FitGeometry {
    fn default() -> Self {
        Self {
            anchor: Point { x: -1075, y: 1463 },
            reference: Size {
                width: 1024,
                height: 745,
            },
            tolerance: 5,
        }
    }
}

impl FitGeometry {
    /// Position that centers a window of `size` in the reference frame.
    pub fn target_position(&self, size: Size) -> Point {
        Point {
            x: self.anchor.x - (size.width - self.reference.width) / 2,
            y: self.anchor.y + (self.reference.height - size.height) / 2,
        }
    }

    pub fn is_fitted(&self, position: Point, size: Size) -> bool {
        let target = self.target_position(size);
        (target.x - position.x).abs() <= self.tolerance
            && (target.y - position.y).abs() <= self.tolerance
    }

    fn expanded(&self) -> Bounds {
        Bounds {
            origin: self.anchor,
            size: self.reference,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitOutcome {
    NoVideoWindow,
    AlreadyFitted,
    Fitted(Bounds),
}

/// Picks the first window whose title differs from the main window's.
pub fn find_video_window<P>(player: &mut P) -> Result<Option<WindowInfo>, CueError>
where
    P: WindowControl + ?Sized,
{
    let main_title = player.main_window_title().to_string();
    Ok(player
        .windows()?
        .into_iter()
        .find(|w| w.title.as_deref() != Some(main_title.as_str())))
}

pub fn fit_window<P>(player: &mut P, geometry: &FitGeometry) -> Result<FitOutcome, CueError>
where
    P: WindowControl + ?Sized,
{
    let Some(window) = find_video_window(player)? else {
        debug!("No video window to fit");
        return Ok(FitOutcome::NoVideoWindow);
    };

    let size = player.window_size(&window)?;
    let position = player.window_position(&window)?;
    if geometry.is_fitted(position, size) {
        debug!(?position, ?size, "Video window already fitted");
        return Ok(FitOutcome::AlreadyFitted);
    }

    player.set_window_bounds(&window, geometry.expanded())?;

    let observed = player.window_size(&window)?;
    let bounds = Bounds {
        origin: geometry.target_position(observed),
        size: observed,
    };
    player.set_window_bounds(&window, bounds)?;

    debug!(?bounds, "Video window fitted");
    Ok(FitOutcome::Fitted(bounds))
}

/// Runs the fit on the command queue after a delay, letting the player's
/// window finish appearing first.
#[derive(Clone, Debug)]
pub struct FitScheduler {
    queue: CommandQueue,
    geometry: FitGeometry,
    delay: Duration,
}

impl FitScheduler {
    pub fn new(queue: CommandQueue, geometry: FitGeometry, delay: Duration) -> Self {
        Self {
            queue,
            geometry,
            delay,
        }
    }

    pub fn geometry(&self) -> FitGeometry {
        self.geometry
    }

    /// Fits now, on the caller's thread. Errors are logged and swallowed.
    pub fn fit_now(&self) -> Option<FitOutcome> {
        let geometry = self.geometry;
        match self.queue.run(move |player| fit_window(player, &geometry)) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(error = %err, "Window fit failed");
                None
            }
        }
    }

    pub fn schedule(&self) {
        let scheduler = self.clone();
        let spawned = thread::Builder::new()
            .name("cue-window-fit".into())
            .spawn(move || {
                thread::sleep(scheduler.delay);
                scheduler.fit_now();
            });
        if let Err(err) = spawned {
            warn!(error = %err, "Cannot schedule window fit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{PlayerCall, SimulatedPlayer};

    #[test]
    fn test_target_position_centers_window() {
        let geometry = FitGeometry::default();
        assert_eq!(
            geometry.target_position(geometry.reference),
            geometry.anchor
        );
        let target = geometry.target_position(Size {
            width: 1000,
            height: 563,
        });
        assert_eq!(target, Point { x: -1063, y: 1554 });
    }

    #[test]
    fn test_fitted_window_is_left_alone() {
        let geometry = FitGeometry::default();
        let size = Size {
            width: 1000,
            height: 563,
        };
        let target = geometry.target_position(size);
        let mut player = SimulatedPlayer::new().with_window(
            "Video",
            Bounds {
                origin: Point {
                    x: target.x + 3,
                    y: target.y - 4,
                },
                size,
            },
        );

        let outcome = fit_window(&mut player, &geometry).unwrap();
        assert_eq!(outcome, FitOutcome::AlreadyFitted);
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_expand_then_center() {
        let geometry = FitGeometry::default();
        let mut player = SimulatedPlayer::new()
            .with_window("Video", Bounds::new(10, 10, 640, 360))
            .with_max_window_size(Size {
                width: 1000,
                height: 563,
            });

        let outcome = fit_window(&mut player, &geometry).unwrap();
        let expected = Bounds::new(-1063, 1554, 1000, 563);
        assert_eq!(outcome, FitOutcome::Fitted(expected));
        assert_eq!(
            player.commands(),
            vec![
                PlayerCall::SetWindowBounds(1, Bounds::new(-1075, 1463, 1024, 745)),
                PlayerCall::SetWindowBounds(1, expected),
            ]
        );
        assert_eq!(player.window_bounds("Video"), Some(expected));
    }

    #[test]
    fn test_only_main_window() {
        let mut player = SimulatedPlayer::new();
        let outcome = fit_window(&mut player, &FitGeometry::default()).unwrap();
        assert_eq!(outcome, FitOutcome::NoVideoWindow);
    }
}
