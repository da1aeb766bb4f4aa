use std::sync::atomic::{AtomicBool, Ordering};

/// Runtime-mutable feature switches shared by the controller and the
/// reconciliation loop.
#[derive(Debug)]
pub struct FeatureToggles {
    auto_fit: AtomicBool,
    resume_stuck_video: AtomicBool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl FeatureToggles {
    pub fn new(auto_fit: bool, resume_stuck_video: bool) -> Self {
        Self {
            auto_fit: AtomicBool::new(auto_fit),
            resume_stuck_video: AtomicBool::new(resume_stuck_video),
        }
    }

    /// Fit the video window after every playback command.
    pub fn auto_fit(&self) -> bool {
        self.auto_fit.load(Ordering::SeqCst)
    }

    pub fn set_auto_fit(&self, enabled: bool) {
        self.auto_fit.store(enabled, Ordering::SeqCst);
    }

    /// Returns the new value.
    pub fn toggle_auto_fit(&self) -> bool {
        !self.auto_fit.fetch_xor(true, Ordering::SeqCst)
    }

    /// Restart a video that the player left blank after a replay.
    pub fn resume_stuck_video(&self) -> bool {
        self.resume_stuck_video.load(Ordering::SeqCst)
    }

    pub fn set_resume_stuck_video(&self, enabled: bool) {
        self.resume_stuck_video.store(enabled, Ordering::SeqCst);
    }

    pub fn toggle_resume_stuck_video(&self) -> bool {
        !self.resume_stuck_video.fetch_xor(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_returns_new_value() {
        let toggles = FeatureToggles::default();
        assert!(toggles.auto_fit());
        assert!(!toggles.toggle_auto_fit());
        assert!(!toggles.auto_fit());
        assert!(toggles.toggle_resume_stuck_video());
        assert!(toggles.resume_stuck_video());
    }
}
