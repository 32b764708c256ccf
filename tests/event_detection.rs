//! Integration tests over synthetic, in-memory motion sequences (no real
//! video fixture) exercising the tracker and timecode modules together, the
//! way a caller assembling `ScanConfig` values would.

use dvrscan::config::TrackerConfig;
use dvrscan::timecode::{Fps, Timecode};
use dvrscan::tracker::track_sequence;

/// Concrete scenario 5: with `frame_skip = 1` the decoder worker only
/// forwards every other source frame, so the detector only ever sees
/// already-thinned indices; a burst that alternates motion/no-motion on
/// the *source* timeline reads back as continuous motion on the forwarded
/// timeline. `P = 15` scales down to `ceil(15/2) = 8`.
#[test]
fn scenario_5_frame_skip_scales_tracker_windows() {
    let config = TrackerConfig {
        min_event_length: Timecode::from_frames(2),
        time_before_event: Timecode::from_frames(0),
        time_post_event: Timecode::from_frames(15),
    };
    // Forwarded frame indices step by 2 (frame_skip = 1), matching what the
    // decoder worker would hand to the detector: source frames 100..150 are
    // "on", everything else "off".
    let motion: Vec<(u64, bool, f32)> = (0..300)
        .step_by(2)
        .map(|i| (i, (100..150).contains(&i), if (100..150).contains(&i) { 42.0 } else { 0.0 }))
        .collect();

    let events = track_sequence(&config, 1, &motion);
    assert_eq!(events.len(), 1);
    assert!(events[0].peak_frame >= 100 && events[0].peak_frame < 150);
    assert!(events[0].duration_frames() > 0);
}

#[test]
fn full_stream_of_motion_yields_one_event_spanning_it() {
    let config = TrackerConfig {
        min_event_length: Timecode::from_frames(1),
        time_before_event: Timecode::from_frames(0),
        time_post_event: Timecode::from_frames(0),
    };
    let motion: Vec<(u64, bool, f32)> = (0..60).map(|i| (i, true, 10.0)).collect();
    let events = track_sequence(&config, 0, &motion);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start, Timecode::from_frames(0));
    assert_eq!(events[0].end, Timecode::from_frames(60));
}

#[test]
fn zero_length_input_yields_no_events() {
    let config = TrackerConfig::default();
    let events = track_sequence(&config, 0, &[]);
    assert!(events.is_empty());
}

#[test]
fn event_timecodes_format_and_reparse_at_30fps() {
    let config = TrackerConfig {
        min_event_length: Timecode::from_frames(2),
        time_before_event: Timecode::from_frames(0),
        time_post_event: Timecode::from_frames(0),
    };
    let motion: Vec<(u64, bool, f32)> = (0..10).map(|i| (i, i >= 3 && i < 6, 5.0)).collect();
    let events = track_sequence(&config, 0, &motion);
    assert_eq!(events.len(), 1);

    let fps = Fps::new(30, 1);
    let formatted = events[0].start.format(fps);
    let reparsed = Timecode::parse(&formatted, fps).unwrap();
    assert_eq!(reparsed, events[0].start);
}
