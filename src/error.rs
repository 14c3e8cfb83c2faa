//! Error types for the stft-duplex crate.

use std::fmt;

/// Errors that can abort [`DuplexPipeline::start`](crate::DuplexPipeline::start).
///
/// Nothing on the steady-state audio path returns errors; once the pipeline
/// is running, degraded conditions surface as diagnostic counters instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No capture stream has been set.
    NoInputStream,
    /// No playback stream has been set.
    NoOutputStream,
    /// The stream geometry cannot drive the fixed-rate graph.
    InvalidConfig(String),
    /// A device stream or the processing thread refused to start.
    StreamStart {
        /// Which piece failed: `"capture"`, `"playback"`, or `"processing"`.
        stream: &'static str,
        reason: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoInputStream => write!(f, "no input stream set"),
            EngineError::NoOutputStream => write!(f, "no output stream set"),
            EngineError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            EngineError::StreamStart { stream, reason } => {
                write!(f, "failed to start {} stream: {}", stream, reason)
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Status reported by a device stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Backend-specific failure with a textual description.
    Backend(String),
    /// The device went away.
    Disconnected,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Backend(msg) => write!(f, "stream backend error: {}", msg),
            StreamError::Disconnected => write!(f, "stream device disconnected"),
        }
    }
}

impl std::error::Error for StreamError {}
