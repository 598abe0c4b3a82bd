//! Continuous-detection filter.
//!
//! Suppresses repeat alerts for the same object drifting through the scene
//! within a short debounce window. A candidate inside the window triggers a
//! post-detection hit test: the controller re-runs the tile kernels over
//! the cached look-ahead frames and compares color histograms of the
//! matched patches; a high average similarity marks the candidate as the
//! same object.

use tracing::info;
use vigil_models::{ChannelConfig, FrameIndex};

/// Average histogram similarity at or above which a candidate is treated
/// as the previous object.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Verdict on one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Emit,
    Suppress,
}

/// First-stage verdict; `Probe` asks the caller to run the hit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreDecision {
    Emit,
    Suppress,
    Probe,
}

/// Debounce state for one channel.
#[derive(Debug)]
pub struct ContinuousFilter {
    channel: u32,
    detect_internal: u64,
    last_detection: Option<FrameIndex>,
    active: bool,
}

impl ContinuousFilter {
    pub fn new(cfg: &ChannelConfig) -> Self {
        Self {
            channel: cfg.index,
            detect_internal: cfg.detect_internal,
            last_detection: None,
            active: false,
        }
    }

    /// Classify a candidate without running the hit test.
    ///
    /// The window check runs before the active-flag short-circuit so that
    /// a suppressed object stops muting the channel once the debounce
    /// window has passed.
    pub fn check(&mut self, index: FrameIndex) -> PreDecision {
        let Some(last) = self.last_detection else {
            self.active = false;
            return PreDecision::Emit;
        };
        let delta = index.saturating_sub(last);
        if delta > self.detect_internal {
            self.active = false;
            return PreDecision::Emit;
        }
        if self.active {
            info!(
                channel = self.channel,
                "Frame [{}] is still in filter window range", index
            );
            return PreDecision::Suppress;
        }
        if delta == 0 {
            // further rectangles confirmed on the frame that just emitted
            return PreDecision::Emit;
        }
        PreDecision::Probe
    }

    /// Resolve a `Probe` with the averaged hit-test similarity.
    ///
    /// `None` means the look-ahead produced no comparable patch pair, which
    /// counts as a new event.
    pub fn resolve(&mut self, index: FrameIndex, average: Option<f64>) -> FilterDecision {
        match average {
            Some(avg) if avg >= SIMILARITY_THRESHOLD => {
                info!(
                    channel = self.channel,
                    "Continuous detection at frame [{}] skipped, similarity {:.2}", index, avg
                );
                self.active = true;
                FilterDecision::Suppress
            }
            _ => FilterDecision::Emit,
        }
    }

    /// Record a confirmed detection.
    pub fn record(&mut self, index: FrameIndex) {
        self.last_detection = Some(index);
    }

    /// Index of the most recent confirmed detection.
    pub fn last_detection(&self) -> Option<FrameIndex> {
        self.last_detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(detect_internal: u64) -> ContinuousFilter {
        ContinuousFilter::new(&ChannelConfig {
            detect_internal,
            ..ChannelConfig::default()
        })
    }

    #[test]
    fn test_first_detection_emits() {
        let mut f = filter(48);
        assert_eq!(f.check(100), PreDecision::Emit);
    }

    #[test]
    fn test_candidate_inside_window_probes() {
        let mut f = filter(48);
        f.record(100);
        assert_eq!(f.check(110), PreDecision::Probe);
    }

    #[test]
    fn test_candidate_past_window_emits() {
        let mut f = filter(48);
        f.record(100);
        assert_eq!(f.check(160), PreDecision::Emit);
    }

    #[test]
    fn test_same_frame_second_rect_emits() {
        let mut f = filter(48);
        f.record(100);
        assert_eq!(f.check(100), PreDecision::Emit);
    }

    #[test]
    fn test_high_similarity_suppresses_and_arms() {
        let mut f = filter(48);
        f.record(100);
        assert_eq!(f.check(110), PreDecision::Probe);
        assert_eq!(f.resolve(110, Some(0.9)), FilterDecision::Suppress);
        // while armed, candidates inside the window short-circuit
        assert_eq!(f.check(120), PreDecision::Suppress);
    }

    #[test]
    fn test_low_similarity_emits() {
        let mut f = filter(48);
        f.record(100);
        assert_eq!(f.resolve(110, Some(0.2)), FilterDecision::Emit);
        assert_eq!(f.resolve(110, None), FilterDecision::Emit);
    }

    #[test]
    fn test_window_expiry_clears_active_flag() {
        let mut f = filter(48);
        f.record(100);
        f.resolve(110, Some(0.9));
        assert_eq!(f.check(120), PreDecision::Suppress);
        // past the window the channel un-mutes
        assert_eq!(f.check(160), PreDecision::Emit);
        f.record(160);
        assert_eq!(f.check(170), PreDecision::Probe);
    }
}
