//! Running tally of looking-vs-total frames.

use serde::Serialize;

/// What a tick without gaze data does to the tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttentionPolicy {
    /// Only results that carry gaze data are counted.
    #[default]
    GazeOnly,
    /// A result with no detected face counts as a not-looking frame.
    CountMissingAsAway,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttentionStats {
    pub total_frames: u64,
    pub attention_frames: u64,
}

impl AttentionStats {
    pub fn record(&mut self, is_looking: bool) {
        self.total_frames += 1;
        if is_looking {
            self.attention_frames += 1;
        }
    }

    /// Attention rate in percent; 0 when nothing has been sampled.
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.attention_frames as f64 / self.total_frames as f64 * 100.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero_percent() {
        let stats = AttentionStats::default();
        assert_eq!(stats.percentage(), 0.0);
    }

    #[test]
    fn test_all_looking() {
        let mut stats = AttentionStats::default();
        for _ in 0..3 {
            stats.record(true);
        }
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.attention_frames, 3);
        assert!((stats.percentage() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed() {
        let mut stats = AttentionStats::default();
        stats.record(true);
        stats.record(false);
        stats.record(false);
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.attention_frames, 1);
        assert!((stats.percentage() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut stats = AttentionStats::default();
        stats.record(true);
        stats.reset();
        assert_eq!(stats, AttentionStats::default());
    }
}
