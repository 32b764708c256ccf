//! The [`MotionEvent`] record emitted by the event tracker.

#[cfg(feature = "serialize")]
use serde::Serialize;

use crate::timecode::{Fps, Timecode};

// `Timecode` and `Fps` derive `Serialize` themselves (see timecode.rs) when
// the `serialize` feature is active.

/// A half-open frame interval `[start, end)` of sustained motion.
///
/// Invariants: `start <= peak_frame < end`; a stream of events is sorted and
/// non-overlapping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct MotionEvent {
    pub start: Timecode,
    pub end: Timecode,
    pub peak_score: f32,
    pub peak_frame: u64,
}

impl MotionEvent {
    pub fn duration_frames(&self) -> u64 {
        self.end.frame().saturating_sub(self.start.frame())
    }

    pub fn start_seconds(&self, fps: Fps) -> f64 {
        self.start.seconds(fps)
    }

    pub fn end_seconds(&self, fps: Fps) -> f64 {
        self.end.seconds(fps)
    }
}
