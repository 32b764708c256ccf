//! The [`Frame`] value that flows between pipeline stages.

use opencv::prelude::*;

use crate::timecode::Timecode;

/// A single decoded, immutable video frame plus its position in the virtual
/// concatenated stream. `opencv::core::Mat` is `Send`, so a `Frame` can cross
/// the bounded channels that connect the pipeline's worker threads.
pub struct Frame {
    pub index: u64,
    pub pixels: Mat,
    pub presentation_time: Timecode,
}

impl Frame {
    pub fn new(index: u64, pixels: Mat, presentation_time: Timecode) -> Self {
        Self {
            index,
            pixels,
            presentation_time,
        }
    }

    pub fn width(&self) -> i32 {
        self.pixels.cols()
    }

    pub fn height(&self) -> i32 {
        self.pixels.rows()
    }
}

/// Per-frame detection output (§3 `DetectionResult`).
#[derive(Clone)]
pub struct DetectionResult {
    pub index: u64,
    pub score: f32,
    pub bounding_box: Option<opencv::core::Rect>,
    /// Post-morphology foreground mask, upscaled back to source resolution.
    /// Carried alongside the score so a sink can write it out as a side
    /// file without the detector needing to know about output config.
    pub mask_preview: Option<Mat>,
}

impl DetectionResult {
    pub fn has_motion(&self, threshold: f32, max_threshold: f32) -> bool {
        self.score >= threshold && self.score <= max_threshold
    }
}
