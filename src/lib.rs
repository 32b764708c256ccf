//! Detects motion events in fixed-framerate video and extracts them to clips.
//!
//! The pipeline reads one or more video files as a single virtual stream
//! ([`video_source`]), scores each frame for motion against a background
//! model ([`detector`]), folds those scores into discrete events with
//! pre-/post-roll ([`tracker`]), optionally burns in an overlay
//! ([`overlay`]), and writes the result to a native or external sink
//! ([`sink`]). [`controller::run`] composes all of it behind one call.

pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod event;
pub mod frame;
#[cfg(feature = "devel")]
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod region;
pub mod sink;
pub mod timecode;
pub mod tracker;
pub mod video_source;

pub use config::ScanConfig;
pub use controller::{run, run_cancelable, ScanOutcome};
pub use error::{ScanError, ScanResult};
pub use event::MotionEvent;
