//! Reads frames from an ordered list of input files and presents them as a
//! single virtual contiguous stream (§4.3).
//!
//! The per-file decode loop (stream selection, frame-threaded decoder setup,
//! `send_packet`/`receive_frame` draining) follows the same shape as a
//! straightforward `ffmpeg-next` decode loop: open the best video stream,
//! configure frame threading on the decoder context before constructing the
//! decoder, then alternate packet-feeding and frame-draining until EOF.

use std::path::{Path, PathBuf};

use ffmpeg::{format, media::Type, threading, threading::Config as ThreadingConfig};
use log::warn;
use opencv::core::{Mat, CV_8UC3};
use opencv::prelude::*;

use crate::error::{ScanError, ScanResult};
use crate::frame::Frame;
use crate::timecode::{Fps, Timecode};

const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 5;

pub struct Metadata {
    pub width: i32,
    pub height: i32,
    pub fps: Fps,
    pub total_frames_estimate: u64,
}

struct OpenFile {
    path: PathBuf,
    input_ctx: format::context::Input,
    decoder: ffmpeg::codec::decoder::Video,
    stream_index: usize,
    stream_time_base: (i32, i32),
    scaler: ffmpeg::software::scaling::Context,
    receiving_frames: bool,
    receiving_eof_frames: bool,
}

/// Presents an ordered list of video files as one virtual stream of frames
/// with a continuously increasing index.
pub struct VideoSource {
    paths: Vec<PathBuf>,
    next_path_index: usize,
    current: Option<OpenFile>,
    metadata: Option<Metadata>,
    global_index: u64,
    use_pts: bool,
    consecutive_failures: u32,
    /// Set by `seek` while catching up from the nearest preceding keyframe
    /// to the requested target; cleared once a frame at or past the target
    /// presentation time is reached.
    seeking_to_seconds: Option<f64>,
}

impl VideoSource {
    pub fn new(paths: Vec<PathBuf>, use_pts: bool) -> ScanResult<Self> {
        if paths.is_empty() {
            return Err(ScanError::ConfigInvalid("no input files given".into()));
        }
        for path in &paths {
            if !path.exists() {
                return Err(ScanError::InputNotFound(path.clone()));
            }
        }
        Ok(Self {
            paths,
            next_path_index: 0,
            current: None,
            metadata: None,
            global_index: 0,
            use_pts,
            consecutive_failures: 0,
            seeking_to_seconds: None,
        })
    }

    /// Opens the first input file and establishes the canonical resolution
    /// and framerate that every subsequent file must match.
    pub fn open(&mut self) -> ScanResult<Metadata> {
        ffmpeg::init().map_err(ScanError::from)?;
        let first = self.open_next_file()?;
        let metadata = Metadata {
            width: first.decoder.width() as i32,
            height: first.decoder.height() as i32,
            fps: first_fps(&first),
            total_frames_estimate: estimate_total_frames(&first),
        };
        self.metadata = Some(Metadata {
            width: metadata.width,
            height: metadata.height,
            fps: metadata.fps,
            total_frames_estimate: metadata.total_frames_estimate,
        });
        self.current = Some(first);
        Ok(metadata)
    }

    fn open_next_file(&mut self) -> ScanResult<OpenFile> {
        let path = self.paths[self.next_path_index].clone();
        self.next_path_index += 1;
        open_file(&path)
    }

    /// Positions the virtual stream so the next `read()` returns the frame at
    /// `target_index` (§4.3). Seeks the current input to the nearest
    /// preceding keyframe and flushes the decoder; containers that cannot
    /// seek exactly fall back to decoding sequentially from that keyframe,
    /// with intervening frames discarded internally until `target_index` is
    /// reached. Seeking across a file boundary or before `open()` is not
    /// supported.
    pub fn seek(&mut self, target_index: u64) -> ScanResult<()> {
        let fps = self
            .metadata
            .as_ref()
            .ok_or_else(|| ScanError::Internal("seek() called before open()".into()))?
            .fps;
        let target_seconds = target_index as f64 / fps.as_f64().max(f64::MIN_POSITIVE);

        let file = self
            .current
            .as_mut()
            .ok_or_else(|| ScanError::Internal("seek() called with no open input file".into()))?;

        // `Input::seek` takes a timestamp in `AV_TIME_BASE` (microseconds),
        // not the video stream's own time base.
        let ts = (target_seconds * 1_000_000.0) as i64;
        file.input_ctx.seek(ts, ..ts).map_err(ScanError::from)?;
        file.decoder.flush();
        file.receiving_frames = false;
        file.receiving_eof_frames = false;

        self.global_index = target_index;
        self.consecutive_failures = 0;
        self.seeking_to_seconds = Some(target_seconds);
        Ok(())
    }

    /// Reads the next frame of the virtual stream, opening subsequent input
    /// files seamlessly and validating that they match the canonical
    /// resolution/framerate established by `open`.
    pub fn read(&mut self) -> ScanResult<Option<Frame>> {
        loop {
            if self.current.is_none() {
                if self.next_path_index >= self.paths.len() {
                    return Ok(None);
                }
                let next = self.open_next_file()?;
                self.validate_matches(&next)?;
                self.current = Some(next);
            }

            let path = self.current.as_ref().unwrap().path.clone();
            let fps = self.metadata.as_ref().map(|m| m.fps);
            match decode_one(self.current.as_mut().unwrap()) {
                Ok(Some((mat, pts))) => {
                    if let Some(target) = self.seeking_to_seconds {
                        match pts {
                            Some(pts) if pts + 1e-6 < target => continue,
                            _ => self.seeking_to_seconds = None,
                        }
                    }
                    self.consecutive_failures = 0;
                    let index = self.global_index;
                    self.global_index += 1;
                    let presentation_time = match (self.use_pts, pts, fps) {
                        (true, Some(pts), Some(fps)) if fps.as_f64() > 0.0 => {
                            Timecode::from_seconds(pts, fps)
                        }
                        _ => Timecode::from_frames(index),
                    };
                    return Ok(Some(Frame::new(index, mat, presentation_time)));
                }
                Ok(None) => {
                    // Current file exhausted; advance to the next one.
                    self.current = None;
                    continue;
                }
                Err(_) => {
                    self.consecutive_failures += 1;
                    self.global_index += 1;
                    warn!(
                        "skipping undecodable frame in {path:?} ({}/{MAX_CONSECUTIVE_DECODE_FAILURES} consecutive failures)",
                        self.consecutive_failures
                    );
                    if self.consecutive_failures > MAX_CONSECUTIVE_DECODE_FAILURES {
                        return Err(ScanError::DecodeFailure {
                            path,
                            frame: self.global_index,
                            reason: format!(
                                "{MAX_CONSECUTIVE_DECODE_FAILURES} consecutive frames failed to decode"
                            ),
                        });
                    }
                    continue;
                }
            }
        }
    }

    fn validate_matches(&self, next: &OpenFile) -> ScanResult<()> {
        let metadata = self.metadata.as_ref().expect("open() called before read()");
        let width = next.decoder.width() as i32;
        let height = next.decoder.height() as i32;
        if (width, height) != (metadata.width, metadata.height) {
            return Err(ScanError::ResolutionMismatch {
                expected: (metadata.width as u32, metadata.height as u32),
                got: (width as u32, height as u32),
                path: next.path.clone(),
            });
        }
        let fps = first_fps(next);
        if fps != metadata.fps {
            return Err(ScanError::FramerateMismatch {
                expected: metadata.fps.as_f64(),
                got: fps.as_f64(),
                path: next.path.clone(),
            });
        }
        Ok(())
    }
}

fn first_fps(file: &OpenFile) -> Fps {
    let stream = file
        .input_ctx
        .streams()
        .best(Type::Video)
        .expect("stream index was validated at open");
    let rate = stream.avg_frame_rate();
    Fps::new(rate.numerator().max(1) as u32, rate.denominator().max(1) as u32)
}

fn estimate_total_frames(first: &OpenFile) -> u64 {
    first
        .input_ctx
        .streams()
        .best(Type::Video)
        .map(|s| s.frames() as u64)
        .unwrap_or(0)
}

fn open_file(path: &Path) -> ScanResult<OpenFile> {
    let mut input_ctx = format::input(&path).map_err(ScanError::from)?;
    let (stream_index, stream_time_base) = {
        let stream = input_ctx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| ScanError::DecodeFailure {
                path: path.to_path_buf(),
                frame: 0,
                reason: "no video stream found".into(),
            })?;
        let tb = stream.time_base();
        (stream.index(), (tb.numerator(), tb.denominator()))
    };
    let parameters = input_ctx
        .streams()
        .best(Type::Video)
        .expect("checked above")
        .parameters();
    let mut decoder_context =
        ffmpeg::codec::context::Context::from_parameters(parameters).map_err(ScanError::from)?;

    // Threading must be configured on the context before the decoder is
    // constructed, otherwise it stays single-threaded.
    decoder_context.set_threading(ThreadingConfig {
        count: 0,
        kind: threading::Type::Frame,
        safe: false,
    });

    let decoder = decoder_context.decoder().video().map_err(ScanError::from)?;

    let scaler = ffmpeg::software::scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::format::Pixel::BGR24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(ScanError::from)?;

    Ok(OpenFile {
        path: path.to_path_buf(),
        input_ctx,
        decoder,
        stream_index,
        stream_time_base,
        scaler,
        receiving_frames: false,
        receiving_eof_frames: false,
    })
}

/// Drains one decoded frame out of `file`, converting it to a BGR `Mat`.
/// Returns `Ok(None)` at end of file. The second tuple element is the
/// frame's presentation time in seconds, when the container provides one.
fn decode_one(file: &mut OpenFile) -> ScanResult<Option<(Mat, Option<f64>)>> {
    let mut raw = ffmpeg::frame::Video::empty();
    loop {
        if file.receiving_frames {
            match file.decoder.receive_frame(&mut raw) {
                Ok(()) => return Ok(Some(to_bgr_mat(file, &raw)?)),
                Err(_) => {
                    file.receiving_frames = false;
                }
            }
        } else if file.receiving_eof_frames {
            return match file.decoder.receive_frame(&mut raw) {
                Ok(()) => Ok(Some(to_bgr_mat(file, &raw)?)),
                Err(_) => Ok(None),
            };
        }

        let mut found_packet = false;
        for (stream, packet) in file.input_ctx.packets() {
            if stream.index() != file.stream_index {
                continue;
            }
            file.decoder.send_packet(&packet).map_err(ScanError::from)?;
            file.receiving_frames = true;
            found_packet = true;
            break;
        }
        if !found_packet {
            file.decoder.send_eof().map_err(ScanError::from)?;
            file.receiving_eof_frames = true;
        }
    }
}

fn to_bgr_mat(file: &mut OpenFile, raw: &ffmpeg::frame::Video) -> ScanResult<(Mat, Option<f64>)> {
    let mut bgr = ffmpeg::frame::Video::empty();
    file.scaler.run(raw, &mut bgr).map_err(ScanError::from)?;
    let width = bgr.width() as i32;
    let height = bgr.height() as i32;
    let stride = bgr.stride(0) as usize;
    let data = bgr.data(0);
    let mut mat = unsafe { Mat::new_rows_cols(height, width, CV_8UC3)? };
    for row in 0..height as usize {
        let src = &data[row * stride..row * stride + (width as usize * 3)];
        let dst = mat.at_row_mut::<u8>(row as i32)?;
        dst.copy_from_slice(src);
    }
    let (num, den) = file.stream_time_base;
    let pts_seconds = raw
        .pts()
        .filter(|_| den != 0)
        .map(|pts| pts as f64 * num as f64 / den as f64);
    Ok((mat, pts_seconds))
}
