//! Plain-data configuration records. Parsing the on-disk `key = value` file
//! and the CLI surface is the job of an external, out-of-scope collaborator;
//! this crate only validates already-constructed records.

use std::path::PathBuf;

use crate::error::{ScanError, ScanResult};
use crate::region::Region;
use crate::timecode::Timecode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Mog2,
    Cnt,
    Mog2Gpu,
}

impl Default for DetectorKind {
    fn default() -> Self {
        DetectorKind::Mog2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelSize {
    Auto,
    Fixed(u32),
}

impl Default for KernelSize {
    fn default() -> Self {
        KernelSize::Auto
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub threshold: f32,
    pub max_threshold: f32,
    pub variance_threshold: f32,
    pub learning_rate: f32,
    pub kernel_size: KernelSize,
    pub downscale_factor: KernelSize,
    pub frame_skip: u32,
    pub max_area: f32,
    pub max_width: f32,
    pub max_height: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Mog2,
            threshold: 0.15,
            max_threshold: 255.0,
            variance_threshold: 16.0,
            learning_rate: -1.0,
            kernel_size: KernelSize::Auto,
            downscale_factor: KernelSize::Auto,
            frame_skip: 0,
            max_area: 1.0,
            max_width: 1.0,
            max_height: 1.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self, gpu_available: bool) -> ScanResult<()> {
        if self.kind == DetectorKind::Mog2Gpu && !gpu_available {
            return Err(ScanError::ConfigInvalid(
                "MOG2_GPU requires a GPU-enabled build".into(),
            ));
        }
        if self.threshold > self.max_threshold {
            return Err(ScanError::ConfigInvalid(
                "threshold must not exceed max-threshold".into(),
            ));
        }
        if let KernelSize::Fixed(size) = self.kernel_size {
            if size != 0 && size % 2 == 0 {
                return Err(ScanError::ConfigInvalid(
                    "kernel-size must be odd or zero".into(),
                ));
            }
        }
        if let KernelSize::Fixed(0) = self.downscale_factor {
            return Err(ScanError::ConfigInvalid(
                "downscale-factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolves the auto downscale factor against the source resolution (§4.4).
    pub fn resolve_downscale(&self, height: i32) -> i32 {
        match self.downscale_factor {
            KernelSize::Fixed(v) => v as i32,
            KernelSize::Auto => {
                if height <= 480 {
                    1
                } else if height <= 720 {
                    2
                } else if height <= 1080 {
                    3
                } else {
                    4
                }
            }
        }
    }

    /// Resolves the auto morphology kernel size against the working
    /// (post-downscale) resolution.
    pub fn resolve_kernel_size(&self, working_height: i32) -> i32 {
        let base = match self.kernel_size {
            KernelSize::Fixed(v) => return v as i32,
            KernelSize::Auto => {
                if working_height <= 480 {
                    3
                } else if working_height <= 720 {
                    5
                } else {
                    7
                }
            }
        };
        base
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub min_event_length: Timecode,
    pub time_before_event: Timecode,
    pub time_post_event: Timecode,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(0),
            time_post_event: Timecode::from_frames(0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RgbColor(pub u8, pub u8, pub u8);

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub time_code: bool,
    pub frame_metrics: bool,
    pub bounding_box: bool,
    pub bbox_color: RgbColor,
    pub bbox_thickness: i32,
    pub bbox_smooth_time: Timecode,
    pub bbox_min_size: f32,
    pub text_margin: i32,
    pub text_font_scale: f64,
    pub text_font_thickness: i32,
    pub text_font_color: RgbColor,
    pub text_bg_color: RgbColor,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            time_code: true,
            frame_metrics: false,
            bounding_box: true,
            bbox_color: RgbColor(255, 0, 0),
            bbox_thickness: 2,
            bbox_smooth_time: Timecode::from_frames(0),
            bbox_min_size: 0.0,
            text_margin: 10,
            text_font_scale: 1.0,
            text_font_thickness: 2,
            text_font_color: RgbColor(255, 255, 255),
            text_bg_color: RgbColor(0, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    ScanOnly,
    NativeSingle,
    NativePerEvent,
    ExternalPerEvent,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::ScanOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalMode {
    Reencode,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailMode {
    None,
    HighScore,
}

impl Default for ThumbnailMode {
    fn default() -> Self {
        ThumbnailMode::None
    }
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub output_dir: PathBuf,
    pub opencv_codec: [u8; 4],
    pub external_mode: ExternalMode,
    pub ffmpeg_input_args: Vec<String>,
    pub ffmpeg_output_args: Vec<String>,
    pub mask_output: bool,
    pub thumbnails: ThumbnailMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::ScanOnly,
            output_dir: PathBuf::from("."),
            opencv_codec: *b"mp4v",
            external_mode: ExternalMode::Reencode,
            ffmpeg_input_args: Vec::new(),
            ffmpeg_output_args: Vec::new(),
            mask_output: false,
            thumbnails: ThumbnailMode::None,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> ScanResult<()> {
        if self.mask_output && self.mode != OutputMode::NativeSingle && self.mode != OutputMode::NativePerEvent {
            return Err(ScanError::ConfigInvalid(
                "mask-output requires a native output mode".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub inputs: Vec<PathBuf>,
    pub region: Region,
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
    pub use_pts: bool,
}

impl ScanConfig {
    pub fn validate(&self, gpu_available: bool) -> ScanResult<()> {
        if self.inputs.is_empty() {
            return Err(ScanError::ConfigInvalid("no input files given".into()));
        }
        if self.output.mode == OutputMode::ExternalPerEvent && self.inputs.len() > 1 {
            return Err(ScanError::ConfigInvalid(
                "external-encoder output does not support multiple input files".into(),
            ));
        }
        self.detector.validate(gpu_available)?;
        self.output.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_threshold_above_max() {
        let mut cfg = DetectorConfig::default();
        cfg.threshold = 200.0;
        cfg.max_threshold = 100.0;
        assert!(cfg.validate(true).is_err());
    }

    #[test]
    fn rejects_mog2_gpu_without_gpu_build() {
        let mut cfg = DetectorConfig::default();
        cfg.kind = DetectorKind::Mog2Gpu;
        assert!(cfg.validate(false).is_err());
        assert!(cfg.validate(true).is_ok());
    }

    #[test]
    fn rejects_even_kernel_size() {
        let mut cfg = DetectorConfig::default();
        cfg.kernel_size = KernelSize::Fixed(4);
        assert!(cfg.validate(true).is_err());
    }

    #[test]
    fn auto_downscale_matches_resolution_bands() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.resolve_downscale(480), 1);
        assert_eq!(cfg.resolve_downscale(720), 2);
        assert_eq!(cfg.resolve_downscale(1080), 3);
        assert_eq!(cfg.resolve_downscale(2160), 4);
    }
}
