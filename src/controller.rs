//! Public scan controller (§4.9): validates configuration, composes the
//! pipeline, and runs it to completion or cancellation.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::info;

use crate::config::ScanConfig;
use crate::error::ScanResult;
use crate::event::MotionEvent;
use crate::pipeline::{self, ProgressObserver};

/// Result of a completed (or canceled) scan. Cancellation is a sentinel, not
/// a failure (§7): `events`/`outputs` are always whatever was actually
/// produced, even when `canceled` is set.
pub struct ScanOutcome {
    pub events: Vec<MotionEvent>,
    pub outputs: Vec<PathBuf>,
    pub canceled: bool,
}

/// Handle for requesting cancellation of an in-flight [`run`].
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Validates `config`, then runs the decode/detect/encode pipeline to
/// completion. Re-entrant (may be called repeatedly with fresh configs) but
/// each call owns its own pipeline state; do not call `run` concurrently
/// from multiple threads against the same `ScanConfig`'s input files.
pub fn run(config: ScanConfig, gpu_available: bool) -> ScanResult<ScanOutcome> {
    run_cancelable(config, gpu_available, Arc::new(AtomicBool::new(false)), None)
}

/// Like [`run`], but exposes a [`CancelHandle`] the caller can use to
/// request early termination (e.g. from a signal handler) and a progress
/// observer invoked once per decoded frame.
pub fn run_cancelable(
    config: ScanConfig,
    gpu_available: bool,
    cancel: Arc<AtomicBool>,
    on_progress: Option<ProgressObserver>,
) -> ScanResult<ScanOutcome> {
    config.validate(gpu_available)?;
    info!(
        "starting scan over {} input file(s)",
        config.inputs.len()
    );

    let outcome = pipeline::run(config, cancel, on_progress)?;

    if outcome.canceled {
        info!(
            "scan canceled: {} event(s), {} output file(s) produced before the cut",
            outcome.events.len(),
            outcome.outputs.len()
        );
    } else {
        info!(
            "scan complete: {} event(s), {} output file(s)",
            outcome.events.len(),
            outcome.outputs.len()
        );
    }
    Ok(ScanOutcome {
        events: outcome.events,
        outputs: outcome.outputs,
        canceled: outcome.canceled,
    })
}

/// Returns a handle that can cancel a scan started with [`run_cancelable`]
/// using this same atomic flag.
pub fn cancel_handle(cancel: Arc<AtomicBool>) -> CancelHandle {
    CancelHandle(cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, DetectorKind};

    #[test]
    fn rejects_invalid_config_before_touching_the_pipeline() {
        let mut config = ScanConfig {
            inputs: vec![],
            region: Default::default(),
            detector: DetectorConfig::default(),
            tracker: Default::default(),
            overlay: Default::default(),
            output: Default::default(),
            use_pts: false,
        };
        assert!(run(config.clone(), true).is_err());

        config.inputs.push(PathBuf::from("/nonexistent/input.mp4"));
        config.detector.kind = DetectorKind::Mog2Gpu;
        assert!(run(config, false).is_err());
    }
}
