//! Draws timecode, frame metrics, and a temporally smoothed bounding box
//! onto output frames (§4.6), in the manner of a `put_text`-based overlay.

use opencv::core::{Point, Rect, Scalar};
use opencv::imgproc::{get_text_size, put_text, rectangle, FILLED, FONT_HERSHEY_DUPLEX, LINE_8};
use opencv::prelude::*;

use crate::config::{OverlayConfig, RgbColor};
use crate::error::ScanResult;
use crate::frame::{DetectionResult, Frame};
use crate::timecode::{Fps, Timecode};

fn to_scalar(color: RgbColor) -> Scalar {
    // OpenCV images are BGR.
    Scalar::new(f64::from(color.2), f64::from(color.1), f64::from(color.0), 0.0)
}

/// Exponential-moving-average smoothed bounding box, carried across frames
/// by the overlay renderer (one instance per scan, like the detector's
/// subtractor state).
pub struct BoxSmoother {
    current: Option<(f64, f64, f64, f64)>,
}

impl BoxSmoother {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Advances the smoothed box toward `raw` (or lets it decay toward
    /// nothing, if `raw` is `None`) given the elapsed time `dt` and the
    /// configured smoothing time constant `t`.
    pub fn update(&mut self, raw: Option<Rect>, dt: f64, t: f64) -> Option<Rect> {
        let alpha = if t > 0.0 {
            1.0 - (-dt / t).exp()
        } else {
            1.0
        };
        match (raw, self.current) {
            (Some(r), Some(prev)) => {
                let blended = (
                    alpha * f64::from(r.x) + (1.0 - alpha) * prev.0,
                    alpha * f64::from(r.y) + (1.0 - alpha) * prev.1,
                    alpha * f64::from(r.width) + (1.0 - alpha) * prev.2,
                    alpha * f64::from(r.height) + (1.0 - alpha) * prev.3,
                );
                self.current = Some(blended);
            }
            (Some(r), None) => {
                self.current = Some((f64::from(r.x), f64::from(r.y), f64::from(r.width), f64::from(r.height)));
            }
            (None, Some(prev)) => {
                // Decay size toward zero; once it collapses, drop the box.
                let shrunk = (prev.0, prev.1, prev.2 * (1.0 - alpha), prev.3 * (1.0 - alpha));
                if shrunk.2 < 1.0 || shrunk.3 < 1.0 {
                    self.current = None;
                } else {
                    self.current = Some(shrunk);
                }
            }
            (None, None) => {}
        }
        self.current.map(|(x, y, w, h)| Rect::new(x as i32, y as i32, w as i32, h as i32))
    }
}

impl Default for BoxSmoother {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OverlayRenderer {
    config: OverlayConfig,
    fps: Fps,
    smoother: BoxSmoother,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig, fps: Fps) -> Self {
        Self {
            config,
            fps,
            smoother: BoxSmoother::new(),
        }
    }

    pub fn render(
        &mut self,
        frame: &mut Frame,
        detection: &DetectionResult,
        frame_skip: u32,
    ) -> ScanResult<()> {
        if self.config.time_code {
            let text = frame.presentation_time.format(self.fps);
            self.draw_label(frame, &text, Point::new(self.config.text_margin, 30))?;
        }
        if self.config.frame_metrics {
            let text = format!("frame={}  score={:.2}", frame.index, detection.score);
            let origin = self.right_aligned_origin(frame, &text, 30)?;
            self.draw_label(frame, &text, origin)?;
        }
        if self.config.bounding_box {
            let dt = (f64::from(frame_skip) + 1.0) / self.fps.as_f64().max(1.0);
            let t = self.config.bbox_smooth_time.seconds(self.fps).max(0.0);
            let smoothed = self.smoother.update(detection.bounding_box, dt, t);
            if let Some(rect) = smoothed {
                let min_side = self.config.bbox_min_size * frame.width().max(frame.height()) as f32;
                if rect.width.max(rect.height) as f32 >= min_side {
                    rectangle(
                        &mut frame.pixels,
                        rect,
                        to_scalar(self.config.bbox_color),
                        self.config.bbox_thickness,
                        LINE_8,
                        0,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Computes the top-right-anchored origin `put_text` needs to land
    /// `text`'s right edge `text_margin` pixels from the frame's right edge,
    /// at height `y`.
    fn right_aligned_origin(&self, frame: &Frame, text: &str, y: i32) -> ScanResult<Point> {
        let mut baseline = 0;
        let size = get_text_size(
            text,
            FONT_HERSHEY_DUPLEX,
            self.config.text_font_scale,
            self.config.text_font_thickness,
            &mut baseline,
        )?;
        Ok(Point::new(frame.width() - self.config.text_margin - size.width, y))
    }

    /// Draws `text` on a filled background rectangle (§4.6) at `origin`
    /// (the `put_text` baseline-left convention).
    fn draw_label(&self, frame: &mut Frame, text: &str, origin: Point) -> ScanResult<()> {
        let mut baseline = 0;
        let size = get_text_size(
            text,
            FONT_HERSHEY_DUPLEX,
            self.config.text_font_scale,
            self.config.text_font_thickness,
            &mut baseline,
        )?;
        let pad = 4;
        let bg = Rect::new(
            origin.x - pad,
            origin.y - size.height - pad,
            size.width + pad * 2,
            size.height + baseline + pad * 2,
        );
        rectangle(
            &mut frame.pixels,
            bg,
            to_scalar(self.config.text_bg_color),
            FILLED,
            LINE_8,
            0,
        )?;
        put_text(
            &mut frame.pixels,
            text,
            origin,
            FONT_HERSHEY_DUPLEX,
            self.config.text_font_scale,
            to_scalar(self.config.text_font_color),
            self.config.text_font_thickness,
            LINE_8,
            false,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoother_tracks_raw_box_with_high_alpha() {
        let mut smoother = BoxSmoother::new();
        let first = smoother.update(Some(Rect::new(0, 0, 10, 10)), 1.0, 0.001);
        assert_eq!(first, Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn smoother_decays_to_none_when_raw_disappears() {
        let mut smoother = BoxSmoother::new();
        smoother.update(Some(Rect::new(0, 0, 10, 10)), 1.0, 1.0);
        let mut last = Some(Rect::new(0, 0, 10, 10));
        for _ in 0..50 {
            last = smoother.update(None, 1.0, 1.0);
            if last.is_none() {
                break;
            }
        }
        assert!(last.is_none());
    }

    #[test]
    fn timecode_formats_for_overlay_text() {
        let fps = Fps::new(30, 1);
        let tc = Timecode::from_frames(90);
        assert_eq!(tc.format(fps), "00:00:03.000");
    }
}
