use crate::player::PlayState;

/// Detects the player replaying an already displayed video.
///
/// The player then shows a blank frame with audio only, and reports two
/// consecutive "playing" transitions for the same media. A new media name
/// is only remembered; it neither triggers nor updates the previous state.
#[derive(Debug)]
pub struct StuckVideoDetector {
    previous_state: PlayState,
    last_name: String,
}

impl Default for StuckVideoDetector {
    fn default() -> Self {
        Self {
            previous_state: PlayState::Playing,
            last_name: String::new(),
        }
    }
}

impl StuckVideoDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one notification; true when a restart is due.
    pub fn observe(&mut self, state: PlayState, name: &str) -> bool {
        if state.is_playing() && name != self.last_name {
            self.last_name = name.to_string();
            return false;
        }

        let stuck = self.previous_state.is_playing() && state.is_playing();
        self.previous_state = state;
        stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_playing_for_same_name_is_stuck() {
        let mut detector = StuckVideoDetector::new();
        assert!(!detector.observe(PlayState::Playing, "NightOne"));
        assert!(detector.observe(PlayState::Playing, "NightOne"));
    }

    #[test]
    fn test_pause_in_between_clears() {
        let mut detector = StuckVideoDetector::new();
        assert!(!detector.observe(PlayState::Playing, "NightOne"));
        assert!(!detector.observe(PlayState::Paused, "NightOne"));
        assert!(!detector.observe(PlayState::Playing, "NightOne"));
        assert!(detector.observe(PlayState::Playing, "NightOne"));
    }

    #[test]
    fn test_new_name_is_only_remembered() {
        let mut detector = StuckVideoDetector::new();
        assert!(!detector.observe(PlayState::Playing, "NightOne"));
        assert!(!detector.observe(PlayState::Playing, "NightTwo"));
        assert!(detector.observe(PlayState::Playing, "NightTwo"));
    }
}
