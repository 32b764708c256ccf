//! Three-worker pipeline orchestrator (§4.8, §5): decode → detect → encode,
//! connected by bounded `crossbeam_channel` queues and a shared atomic
//! cancel flag polled at every queue wait.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, warn};

use crate::config::ScanConfig;
use crate::detector::MotionDetector;
use crate::error::{ScanError, ScanResult};
use crate::event::MotionEvent;
use crate::frame::{DetectionResult, Frame};
use crate::overlay::OverlayRenderer;
use crate::sink::OutputSink;
use crate::timecode::scale_for_skip;
use crate::tracker::EventTracker;
use crate::video_source::VideoSource;

const QUEUE_CAPACITY: usize = 4;
const QUEUE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub frames_processed: u64,
    pub total_estimate: u64,
    pub events_so_far: u64,
}

/// Observer invoked from the orchestrator thread; must not block.
pub type ProgressObserver = Box<dyn FnMut(Progress) + Send>;

enum EncoderMessage {
    Frame {
        frame: Frame,
        detection: DetectionResult,
        event_open: bool,
    },
    EventClosed(MotionEvent),
}

pub struct RunOutcome {
    pub events: Vec<MotionEvent>,
    pub outputs: Vec<PathBuf>,
    /// Set when `cancel` was observed before the stream ran to completion.
    /// Cancellation is a sentinel, not a failure (§7): `events`/`outputs`
    /// are exactly what was produced before the cut, and are valid.
    pub canceled: bool,
}

/// Runs the full decode/detect/encode pipeline described in §4.8 to
/// completion, driving three worker threads. `cancel` may be shared with a
/// caller that wants to interrupt the scan (e.g. a signal handler).
pub fn run(
    config: ScanConfig,
    cancel: Arc<AtomicBool>,
    mut on_progress: Option<ProgressObserver>,
) -> ScanResult<RunOutcome> {
    let ScanConfig {
        inputs,
        region,
        detector: detector_config,
        tracker: tracker_config,
        overlay: overlay_config,
        output: output_config,
        use_pts,
    } = config;

    let mut source = VideoSource::new(inputs.clone(), use_pts)?;
    let metadata = source.open()?;
    let fps = metadata.fps;
    let frame_skip = detector_config.frame_skip;

    let region_mask = if region.is_empty() {
        None
    } else {
        Some(region.build_mask(metadata.width, metadata.height)?)
    };

    let detector = MotionDetector::new(
        detector_config,
        metadata.width,
        metadata.height,
        region_mask,
    )?;
    let mut sink = OutputSink::new(&output_config, &inputs, fps, metadata.width, metadata.height)?;
    let overlay_enabled = overlay_config.time_code || overlay_config.frame_metrics || overlay_config.bounding_box;
    let mut overlay = if overlay_enabled {
        Some(OverlayRenderer::new(overlay_config, fps))
    } else {
        None
    };

    let (decoded_tx, decoded_rx) = bounded::<Frame>(QUEUE_CAPACITY);
    let (encoder_tx, encoder_rx) = bounded::<EncoderMessage>(QUEUE_CAPACITY);

    let decoder_cancel = Arc::clone(&cancel);
    let decoder_handle =
        thread::spawn(move || decoder_worker(source, frame_skip, decoded_tx, decoder_cancel));

    let detector_cancel = Arc::clone(&cancel);
    let tracker = EventTracker::new(&tracker_config, frame_skip);
    let detector_handle =
        thread::spawn(move || detector_worker(decoded_rx, encoder_tx, detector, tracker, detector_cancel));

    // Pre-roll (`B`) reaches back across frames already seen by the encoder
    // loop; rather than re-seeking the source, a bounded ring buffer of
    // recently-seen idle frames is flushed into the sink the moment an
    // event opens (§9 design note).
    let preroll_depth =
        (scale_for_skip(tracker_config.time_before_event.frame(), frame_skip) as usize).saturating_add(1);
    let mut preroll: VecDeque<(Frame, DetectionResult)> = VecDeque::with_capacity(preroll_depth);

    let mut events = Vec::new();
    let mut outputs = Vec::new();
    let mut frames_processed: u64 = 0;
    let total_estimate = metadata.total_frames_estimate;
    let mut writer_open = false;

    loop {
        match encoder_rx.recv_timeout(QUEUE_TIMEOUT) {
            Ok(EncoderMessage::Frame { mut frame, detection, event_open }) => {
                frames_processed += 1;
                if event_open {
                    if !writer_open {
                        sink.on_event_start()?;
                        writer_open = true;
                        for (mut buffered, buffered_detection) in preroll.drain(..) {
                            if let Some(renderer) = overlay.as_mut() {
                                renderer.render(&mut buffered, &buffered_detection, frame_skip)?;
                            }
                            sink.write_frame(&buffered, &buffered_detection)?;
                        }
                    }
                    if let Some(renderer) = overlay.as_mut() {
                        renderer.render(&mut frame, &detection, frame_skip)?;
                    }
                    sink.write_frame(&frame, &detection)?;
                } else {
                    if preroll.len() == preroll_depth {
                        preroll.pop_front();
                    }
                    if preroll_depth > 0 {
                        preroll.push_back((frame, detection));
                    }
                }
                if let Some(observer) = on_progress.as_mut() {
                    observer(Progress {
                        frames_processed,
                        total_estimate,
                        events_so_far: events.len() as u64,
                    });
                }
            }
            Ok(EncoderMessage::EventClosed(event)) => {
                writer_open = false;
                debug!(
                    "event closed: [{}, {}) peak={:.2} at frame {}",
                    event.start, event.end, event.peak_score, event.peak_frame
                );
                outputs.extend(sink.on_event_end(&event, fps)?);
                events.push(event);
            }
            Err(RecvTimeoutError::Timeout) => {
                if decoder_handle.is_finished() && detector_handle.is_finished() {
                    warn!("encoder queue drained after both workers exited without a disconnect");
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    decoder_handle
        .join()
        .map_err(|_| ScanError::Internal("decoder thread panicked".into()))??;
    detector_handle
        .join()
        .map_err(|_| ScanError::Internal("detector thread panicked".into()))??;

    outputs.extend(sink.finish()?);

    let canceled = cancel.load(Ordering::Relaxed);
    Ok(RunOutcome { events, outputs, canceled })
}

fn decoder_worker(
    mut source: VideoSource,
    frame_skip: u32,
    tx: Sender<Frame>,
    cancel: Arc<AtomicBool>,
) -> ScanResult<()> {
    let mut skip_counter: u32 = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let frame = match source.read()? {
            Some(frame) => frame,
            None => return Ok(()),
        };
        if skip_counter > 0 {
            skip_counter -= 1;
            continue;
        }
        skip_counter = frame_skip;

        if send_blocking(&tx, frame, &cancel).is_err() {
            return Ok(());
        }
    }
}

/// Retries `send_timeout` until it succeeds, the receiver disconnects, or
/// cancellation is observed. `Err(())` means the value was dropped because
/// the channel disconnected or the scan was canceled.
fn send_blocking<T>(tx: &Sender<T>, value: T, cancel: &Arc<AtomicBool>) -> Result<(), ()> {
    let mut value = value;
    loop {
        match tx.send_timeout(value, QUEUE_TIMEOUT) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => {
                if cancel.load(Ordering::Relaxed) {
                    return Err(());
                }
                value = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(()),
        }
    }
}

fn detector_worker(
    rx: crossbeam_channel::Receiver<Frame>,
    tx: Sender<EncoderMessage>,
    mut detector: MotionDetector,
    mut tracker: EventTracker,
    cancel: Arc<AtomicBool>,
) -> ScanResult<()> {
    loop {
        let frame = match rx.recv_timeout(QUEUE_TIMEOUT) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                if cancel.load(Ordering::Relaxed) {
                    return Ok(());
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let detection = detector.process(&frame)?;
        // The detector has already applied the threshold gate and zeroed
        // the score on any frame that failed it or the size filters.
        let has_motion = detection.score > 0.0;
        let index = frame.index;
        let closed = tracker.push(index, has_motion, detection.score);
        // `is_in_event` reflects the post-push state: false both for
        // candidate frames still building toward `min_event_length` and for
        // the frame that closes an event (excluded from `[start, end)`).
        let event_open = tracker.is_in_event();

        if send_blocking(
            &tx,
            EncoderMessage::Frame { frame, detection, event_open },
            &cancel,
        )
        .is_err()
        {
            return Ok(());
        }

        if let Some(event) = closed {
            if send_blocking(&tx, EncoderMessage::EventClosed(event), &cancel).is_err() {
                return Ok(());
            }
        }

        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
    }

    if let Some(event) = tracker.finish() {
        let _ = send_blocking(&tx, EncoderMessage::EventClosed(event), &cancel);
    }
    Ok(())
}
