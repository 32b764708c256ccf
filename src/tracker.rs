//! Turns a stream of per-frame motion scores into [`MotionEvent`]s (§4.5).

use crate::config::TrackerConfig;
use crate::event::MotionEvent;
use crate::timecode::{scale_for_skip, Timecode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InEvent,
}

struct Candidate {
    start: u64,
    peak_score: f32,
    peak_frame: u64,
    streak: u64,
    frames_since_motion: u64,
}

/// Drives the `IDLE`/`IN_EVENT` state machine over `(frame_index, has_motion)`
/// pairs, in strictly increasing frame order.
pub struct EventTracker {
    state: State,
    candidate: Option<Candidate>,
    min_event_length: u64,
    time_before_event: u64,
    time_post_event: u64,
    last_emitted_end: Option<u64>,
    last_index_seen: Option<u64>,
}

impl EventTracker {
    pub fn new(config: &TrackerConfig, frame_skip: u32) -> Self {
        let l = scale_for_skip(config.min_event_length.frame(), frame_skip);
        let p = scale_for_skip(config.time_post_event.frame(), frame_skip);
        // Pre-roll reaches back across already-decoded frames, so it is left
        // in original-frame units rather than scaled by `frame_skip`.
        let b = config.time_before_event.frame();
        Self {
            state: State::Idle,
            candidate: None,
            min_event_length: l.max(1),
            time_before_event: b,
            time_post_event: p,
            last_emitted_end: None,
            last_index_seen: None,
        }
    }

    /// Feeds one processed frame's motion verdict into the state machine.
    /// Returns a freshly closed event, if any.
    pub fn push(&mut self, frame_index: u64, has_motion: bool, score: f32) -> Option<MotionEvent> {
        self.last_index_seen = Some(frame_index);
        match self.state {
            State::Idle => {
                if has_motion {
                    self.open_candidate(frame_index, score);
                    if self.candidate_streak() >= self.min_event_length {
                        self.state = State::InEvent;
                    }
                } else {
                    // A no-motion frame before the streak reaches `L` abandons
                    // the candidate entirely.
                    self.candidate = None;
                }
                None
            }
            State::InEvent => {
                let candidate = self.candidate.as_mut().expect("InEvent implies a candidate");
                if has_motion {
                    candidate.frames_since_motion = 0;
                    if score > candidate.peak_score {
                        candidate.peak_score = score;
                        candidate.peak_frame = frame_index;
                    }
                    None
                } else {
                    candidate.frames_since_motion += 1;
                    if candidate.frames_since_motion >= self.time_post_event {
                        self.close_event(frame_index)
                    } else {
                        None
                    }
                }
            }
        }
    }

    /// Whether the tracker currently considers itself inside an event, i.e.
    /// the frame just pushed belongs to `[event.start, event.end)`. `false`
    /// for frames still building toward `min_event_length` and for the
    /// frame that closes an event (its index becomes the event's exclusive
    /// end).
    pub fn is_in_event(&self) -> bool {
        self.state == State::InEvent
    }

    /// Closes any still-open event at end of stream.
    pub fn finish(mut self) -> Option<MotionEvent> {
        match self.state {
            State::InEvent => {
                let end_index = self.last_index_seen.unwrap_or(0) + 1;
                self.close_event(end_index)
            }
            State::Idle => None,
        }
    }

    fn open_candidate(&mut self, frame_index: u64, score: f32) {
        if self.candidate.is_some() {
            let candidate = self.candidate.as_mut().unwrap();
            candidate.streak += 1;
            if score > candidate.peak_score {
                candidate.peak_score = score;
                candidate.peak_frame = frame_index;
            }
            return;
        }
        let earliest = self
            .last_emitted_end
            .map(|end| frame_index.saturating_sub(self.time_before_event).max(end))
            .unwrap_or_else(|| frame_index.saturating_sub(self.time_before_event));
        self.candidate = Some(Candidate {
            start: earliest,
            peak_score: score,
            peak_frame: frame_index,
            streak: 1,
            frames_since_motion: 0,
        });
    }

    fn candidate_streak(&self) -> u64 {
        self.candidate.as_ref().map(|c| c.streak).unwrap_or(0)
    }

    fn close_event(&mut self, end_index: u64) -> Option<MotionEvent> {
        let candidate = self.candidate.take()?;
        self.state = State::Idle;
        self.last_emitted_end = Some(end_index);
        Some(MotionEvent {
            start: Timecode::from_frames(candidate.start),
            end: Timecode::from_frames(end_index),
            peak_score: candidate.peak_score,
            peak_frame: candidate.peak_frame,
        })
    }
}

/// Drives an [`EventTracker`] over a pre-recorded sequence, used by tests and
/// by the synchronous scan controller.
pub fn track_sequence(
    config: &TrackerConfig,
    frame_skip: u32,
    motion: &[(u64, bool, f32)],
) -> Vec<MotionEvent> {
    let mut tracker = EventTracker::new(config, frame_skip);
    let mut events = Vec::new();
    for &(index, has_motion, score) in motion {
        if let Some(event) = tracker.push(index, has_motion, score) {
            events.push(event);
        }
    }
    if let Some(event) = tracker.finish() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion_run(start: u64, end: u64, total: u64) -> Vec<(u64, bool, f32)> {
        (0..total)
            .map(|i| (i, i >= start && i < end, if i >= start && i < end { 50.0 } else { 0.0 }))
            .collect()
    }

    #[test]
    fn scenario_1_single_burst_with_preroll_and_postroll() {
        let config = TrackerConfig {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(15),
            time_post_event: Timecode::from_frames(15),
        };
        let motion = motion_run(100, 150, 300);
        let events = track_sequence(&config, 0, &motion);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start.frame(), 85);
        assert_eq!(events[0].end.frame(), 164);
        assert!(events[0].peak_frame >= 100 && events[0].peak_frame < 149);
    }

    #[test]
    fn scenario_2_single_spike_below_min_length_is_dropped() {
        let config = TrackerConfig {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(0),
            time_post_event: Timecode::from_frames(0),
        };
        let motion = motion_run(100, 101, 300);
        let events = track_sequence(&config, 0, &motion);
        assert!(events.is_empty());
    }

    #[test]
    fn scenario_3_bursts_separated_past_post_roll_yield_two_events() {
        let config = TrackerConfig {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(0),
            time_post_event: Timecode::from_frames(10),
        };
        let mut motion = motion_run(100, 121, 300);
        for (idx, has_motion, score) in motion.iter_mut() {
            if *idx >= 135 && *idx < 160 {
                *has_motion = true;
                *score = 50.0;
            }
        }
        let events = track_sequence(&config, 0, &motion);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn scenario_4_bursts_within_post_roll_merge() {
        let config = TrackerConfig {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(0),
            time_post_event: Timecode::from_frames(15),
        };
        let mut motion = motion_run(100, 121, 300);
        for (idx, has_motion, score) in motion.iter_mut() {
            if *idx >= 130 && *idx < 151 {
                *has_motion = true;
                *score = 50.0;
            }
        }
        let events = track_sequence(&config, 0, &motion);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn scenario_6_empty_stream_yields_no_events() {
        let config = TrackerConfig::default();
        let events = track_sequence(&config, 0, &[]);
        assert!(events.is_empty());
    }

    #[test]
    fn events_are_ordered_and_non_overlapping() {
        let config = TrackerConfig {
            min_event_length: Timecode::from_frames(2),
            time_before_event: Timecode::from_frames(5),
            time_post_event: Timecode::from_frames(5),
        };
        let mut motion = motion_run(50, 70, 300);
        for (idx, has_motion, score) in motion.iter_mut() {
            if *idx >= 150 && *idx < 170 {
                *has_motion = true;
                *score = 50.0;
            }
        }
        let events = track_sequence(&config, 0, &motion);
        assert_eq!(events.len(), 2);
        assert!(events[0].end.frame() <= events[1].start.frame());
    }
}
