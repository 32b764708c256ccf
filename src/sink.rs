//! Output sinks (§4.7): discard, native OpenCV writer (single file or one
//! per event), or an external encoder process driven with `-ss`/`-t`.
//!
//! The native writer follows the `VideoWriter`/`fourcc`/`release`-on-drop
//! shape of a typical OpenCV recorder; the external mode follows the
//! `-ss <start> -t <duration> ... -y` invocation shape of an ffmpeg-driving
//! subprocess wrapper.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{VideoWriter, VideoWriterTrait};

use crate::config::{ExternalMode, OutputConfig, OutputMode};
use crate::error::{ScanError, ScanResult};
use crate::event::MotionEvent;
use crate::frame::{DetectionResult, Frame};
use crate::timecode::Fps;

/// Inserts `.mask` before the final extension, e.g. `clip.mp4` -> `clip.mask.mp4`.
fn mask_sibling_path(path: &Path) -> PathBuf {
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => path.with_file_name(format!(
            "{}.mask.{}",
            stem.to_string_lossy(),
            ext.to_string_lossy()
        )),
        _ => path.with_extension("mask"),
    }
}

fn fourcc(codec: [u8; 4]) -> ScanResult<i32> {
    VideoWriter::fourcc(
        codec[0] as i8 as std::os::raw::c_char,
        codec[1] as i8 as std::os::raw::c_char,
        codec[2] as i8 as std::os::raw::c_char,
        codec[3] as i8 as std::os::raw::c_char,
    )
    .map_err(ScanError::from)
}

struct NativeWriter {
    writer: VideoWriter,
    path: PathBuf,
    frames_written: u64,
}

impl NativeWriter {
    fn create(path: PathBuf, codec: [u8; 4], fps: f64, width: i32, height: i32) -> ScanResult<Self> {
        let size = opencv::core::Size::new(width, height);
        let path_str = path.to_str().ok_or_else(|| {
            ScanError::ConfigInvalid(format!("output path is not valid UTF-8: {path:?}"))
        })?;
        let writer = VideoWriter::new(path_str, fourcc(codec)?, fps, size, true)
            .map_err(|e| ScanError::EncoderFailed(e.to_string()))?;
        Ok(Self {
            writer,
            path,
            frames_written: 0,
        })
    }

    fn write(&mut self, frame: &Frame) -> ScanResult<()> {
        self.writer
            .write(&frame.pixels)
            .map_err(|e| ScanError::EncoderFailed(e.to_string()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self) -> ScanResult<Option<PathBuf>> {
        self.writer.release().map_err(ScanError::from)?;
        if self.frames_written == 0 {
            let _ = std::fs::remove_file(&self.path);
            Ok(None)
        } else {
            Ok(Some(self.path))
        }
    }
}

/// Writes the post-morphology foreground mask (§4.7 `mask_output`) as a
/// grayscale side video, one per native writer it accompanies.
struct MaskWriter {
    writer: VideoWriter,
    path: PathBuf,
    frames_written: u64,
}

impl MaskWriter {
    fn create(path: PathBuf, codec: [u8; 4], fps: f64, width: i32, height: i32) -> ScanResult<Self> {
        let size = opencv::core::Size::new(width, height);
        let path_str = path.to_str().ok_or_else(|| {
            ScanError::ConfigInvalid(format!("output path is not valid UTF-8: {path:?}"))
        })?;
        let writer = VideoWriter::new(path_str, fourcc(codec)?, fps, size, false)
            .map_err(|e| ScanError::EncoderFailed(e.to_string()))?;
        Ok(Self {
            writer,
            path,
            frames_written: 0,
        })
    }

    fn write(&mut self, mask: &Mat) -> ScanResult<()> {
        self.writer
            .write(mask)
            .map_err(|e| ScanError::EncoderFailed(e.to_string()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self) -> ScanResult<Option<PathBuf>> {
        self.writer.release().map_err(ScanError::from)?;
        if self.frames_written == 0 {
            let _ = std::fs::remove_file(&self.path);
            Ok(None)
        } else {
            Ok(Some(self.path))
        }
    }
}

/// Drives one of the §4.7 output variants across the life of a scan.
pub enum OutputSink {
    ScanOnly,
    NativeSingle {
        writer: Option<NativeWriter>,
        output_path: PathBuf,
        codec: [u8; 4],
        fps: f64,
        size: (i32, i32),
        mask_output: bool,
        mask_writer: Option<MaskWriter>,
    },
    NativePerEvent {
        current: Option<NativeWriter>,
        mask_current: Option<MaskWriter>,
        stem: String,
        output_dir: PathBuf,
        extension: String,
        codec: [u8; 4],
        fps: f64,
        size: (i32, i32),
        next_index: u32,
        mask_output: bool,
    },
    ExternalPerEvent {
        input: PathBuf,
        output_dir: PathBuf,
        mode: ExternalMode,
        extra_input_args: Vec<String>,
        extra_output_args: Vec<String>,
        extension: String,
        next_index: u32,
    },
}

impl OutputSink {
    pub fn new(
        config: &OutputConfig,
        inputs: &[PathBuf],
        fps: Fps,
        width: i32,
        height: i32,
    ) -> ScanResult<Self> {
        let stem = inputs[0]
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string();
        match config.mode {
            OutputMode::ScanOnly => Ok(OutputSink::ScanOnly),
            OutputMode::NativeSingle => {
                if inputs.len() > 1 {
                    return Err(ScanError::ConfigInvalid(
                        "native-single output requires exactly one input file".into(),
                    ));
                }
                let output_path = config.output_dir.join(format!("{stem}.mp4"));
                Ok(OutputSink::NativeSingle {
                    writer: None,
                    output_path,
                    codec: config.opencv_codec,
                    fps: fps.as_f64(),
                    size: (width, height),
                    mask_output: config.mask_output,
                    mask_writer: None,
                })
            }
            OutputMode::NativePerEvent => Ok(OutputSink::NativePerEvent {
                current: None,
                mask_current: None,
                stem,
                output_dir: config.output_dir.clone(),
                extension: "mp4".to_string(),
                codec: config.opencv_codec,
                fps: fps.as_f64(),
                size: (width, height),
                next_index: 1,
                mask_output: config.mask_output,
            }),
            OutputMode::ExternalPerEvent => {
                if inputs.len() != 1 {
                    return Err(ScanError::ConfigInvalid(
                        "external-encoder output does not support multiple input files".into(),
                    ));
                }
                Ok(OutputSink::ExternalPerEvent {
                    input: inputs[0].clone(),
                    output_dir: config.output_dir.clone(),
                    mode: config.external_mode,
                    extra_input_args: config.ffmpeg_input_args.clone(),
                    extra_output_args: config.ffmpeg_output_args.clone(),
                    extension: "mp4".to_string(),
                    next_index: 1,
                })
            }
        }
    }

    /// Called when the tracker opens an event's first frame.
    pub fn on_event_start(&mut self) -> ScanResult<()> {
        match self {
            OutputSink::NativeSingle { writer, output_path, codec, fps, size, mask_output, mask_writer } => {
                if writer.is_none() {
                    *writer = Some(NativeWriter::create(
                        output_path.clone(),
                        *codec,
                        *fps,
                        size.0,
                        size.1,
                    )?);
                    if *mask_output && mask_writer.is_none() {
                        *mask_writer = Some(MaskWriter::create(
                            mask_sibling_path(output_path),
                            *codec,
                            *fps,
                            size.0,
                            size.1,
                        )?);
                    }
                }
            }
            OutputSink::NativePerEvent {
                current,
                mask_current,
                stem,
                output_dir,
                extension,
                codec,
                fps,
                size,
                next_index,
                mask_output,
            } => {
                let path = output_dir.join(format!("{stem}.DSME_{next_index:04}.{extension}"));
                if *mask_output {
                    *mask_current = Some(MaskWriter::create(
                        mask_sibling_path(&path),
                        *codec,
                        *fps,
                        size.0,
                        size.1,
                    )?);
                }
                *current = Some(NativeWriter::create(path, *codec, *fps, size.0, size.1)?);
            }
            OutputSink::ScanOnly | OutputSink::ExternalPerEvent { .. } => {}
        }
        Ok(())
    }

    /// Writes one in-event frame (native sinks only; external mode re-cuts
    /// from the original input and never sees individual frames) and, when
    /// `mask_output` is enabled, the frame's post-morphology mask alongside it.
    pub fn write_frame(&mut self, frame: &Frame, detection: &DetectionResult) -> ScanResult<()> {
        match self {
            OutputSink::NativeSingle { writer: Some(w), mask_writer, .. } => {
                w.write(frame)?;
                if let (Some(mw), Some(mask)) = (mask_writer.as_mut(), detection.mask_preview.as_ref()) {
                    mw.write(mask)?;
                }
                Ok(())
            }
            OutputSink::NativePerEvent { current: Some(w), mask_current, .. } => {
                w.write(frame)?;
                if let (Some(mw), Some(mask)) = (mask_current.as_mut(), detection.mask_preview.as_ref()) {
                    mw.write(mask)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Called when the tracker closes an event. For native sinks, finalizes
    /// the per-event writer(s) (video, and mask if enabled); for the
    /// external sink, invokes the encoder over the original input with
    /// `-ss`/`-t`. Returns every output file produced for this event.
    pub fn on_event_end(&mut self, event: &MotionEvent, fps: Fps) -> ScanResult<Vec<PathBuf>> {
        match self {
            OutputSink::ScanOnly | OutputSink::NativeSingle { .. } => Ok(Vec::new()),
            OutputSink::NativePerEvent { current, mask_current, next_index, .. } => {
                let writer = current.take();
                let mask_writer = mask_current.take();
                *next_index += 1;
                let mut outputs = Vec::new();
                if let Some(w) = writer {
                    outputs.extend(w.finish()?);
                }
                if let Some(mw) = mask_writer {
                    outputs.extend(mw.finish()?);
                }
                Ok(outputs)
            }
            OutputSink::ExternalPerEvent {
                input,
                output_dir,
                mode,
                extra_input_args,
                extra_output_args,
                extension,
                next_index,
            } => {
                let output_path =
                    output_dir.join(format!("event_{next_index:04}.{extension}"));
                *next_index += 1;
                run_external_encoder(
                    input,
                    &output_path,
                    event,
                    fps,
                    *mode,
                    extra_input_args,
                    extra_output_args,
                )?;
                Ok(vec![output_path])
            }
        }
    }

    /// Finalizes any still-open writer(s) at end of stream.
    pub fn finish(self) -> ScanResult<Vec<PathBuf>> {
        match self {
            OutputSink::NativeSingle { writer, mask_writer, .. } => {
                let mut outputs = Vec::new();
                if let Some(w) = writer {
                    outputs.extend(w.finish()?);
                }
                if let Some(mw) = mask_writer {
                    outputs.extend(mw.finish()?);
                }
                Ok(outputs)
            }
            OutputSink::NativePerEvent { current, mask_current, .. } => {
                let mut outputs = Vec::new();
                if let Some(w) = current {
                    outputs.extend(w.finish()?);
                }
                if let Some(mw) = mask_current {
                    outputs.extend(mw.finish()?);
                }
                Ok(outputs)
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn run_external_encoder(
    input: &Path,
    output_path: &Path,
    event: &MotionEvent,
    fps: Fps,
    mode: ExternalMode,
    extra_input_args: &[String],
    extra_output_args: &[String],
) -> ScanResult<()> {
    let encoder_path = which_encoder()?;
    let start = event.start_seconds(fps);
    let duration = (event.end_seconds(fps) - start).max(0.0);

    let mut args: Vec<String> = vec!["-ss".into(), format!("{start:.3}"), "-t".into(), format!("{duration:.3}")];
    args.extend(extra_input_args.iter().cloned());
    args.push("-i".into());
    args.push(input.to_string_lossy().into_owned());

    match mode {
        ExternalMode::Copy => {
            args.push("-c".into());
            args.push("copy".into());
        }
        ExternalMode::Reencode => {
            args.extend(extra_output_args.iter().cloned());
        }
    }
    args.push("-nostdin".into());
    args.push("-y".into());
    args.push(output_path.to_string_lossy().into_owned());

    let status = Command::new(&encoder_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ScanError::EncoderFailed(e.to_string()))?;

    if !status.status.success() {
        return Err(ScanError::EncoderFailed(format!(
            "encoder exited with {}: {}",
            status.status,
            String::from_utf8_lossy(&status.stderr)
        )));
    }
    Ok(())
}

fn which_encoder() -> ScanResult<PathBuf> {
    let candidate = "ffmpeg";
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate_path = dir.join(candidate);
            if candidate_path.is_file() {
                return Ok(candidate_path);
            }
        }
    }
    Err(ScanError::EncoderUnavailable(
        "ffmpeg not found on PATH".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::Timecode;

    #[test]
    fn external_mode_reencode_builds_expected_args_shape() {
        let event = MotionEvent {
            start: Timecode::from_frames(30),
            end: Timecode::from_frames(90),
            peak_score: 10.0,
            peak_frame: 45,
        };
        let fps = Fps::new(30, 1);
        assert_eq!(event.start_seconds(fps), 1.0);
        assert_eq!(event.end_seconds(fps), 3.0);
    }
}
