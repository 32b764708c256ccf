use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while validating configuration or running a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("resolution mismatch: expected {expected:?}, got {got:?} in {path:?}")]
    ResolutionMismatch {
        expected: (u32, u32),
        got: (u32, u32),
        path: PathBuf,
    },

    #[error("framerate mismatch: expected {expected}, got {got} in {path:?}")]
    FramerateMismatch {
        expected: f64,
        got: f64,
        path: PathBuf,
    },

    #[error("decode failure in {path:?} at frame {frame}: {reason}")]
    DecodeFailure {
        path: PathBuf,
        frame: u64,
        reason: String,
    },

    #[error("invalid region: {0}")]
    RegionInvalid(String),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("encoder failed: {0}")]
    EncoderFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("opencv error: {0}")]
    OpenCv(String),

    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),
}

impl From<opencv::Error> for ScanError {
    fn from(e: opencv::Error) -> Self {
        ScanError::OpenCv(e.to_string())
    }
}

impl From<ffmpeg::Error> for ScanError {
    fn from(e: ffmpeg::Error) -> Self {
        ScanError::Ffmpeg(e.to_string())
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
