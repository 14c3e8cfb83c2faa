//! Device-stream collaborators consumed by the pipeline.
//!
//! The pipeline does not open audio devices itself; it drives two opaque
//! stream handles. [`CaptureStream`] supplies interleaved f32 bursts
//! through a blocking timed read; [`PlaybackStream`] owns a device callback
//! and services it by pulling rendered audio through the [`PlaybackTap`]
//! handed to `request_start`.

use std::time::Duration;

use crate::core::types::Channels;
use crate::error::StreamError;
use crate::pipeline::PlaybackTap;

#[cfg(feature = "cpal-backend")]
pub mod cpal_backend;

/// Fixed geometry of an opened device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: Channels,
    /// Device-native processing quantum in frames.
    pub frames_per_burst: usize,
    pub sample_rate: u32,
}

/// Blocking capture side of a duplex device pair.
///
/// Implementations are moved onto the processing thread, hence the `Send`
/// bound.
pub trait CaptureStream: Send {
    fn info(&self) -> StreamInfo;

    fn request_start(&mut self) -> Result<(), StreamError>;

    fn request_stop(&mut self) -> Result<(), StreamError>;

    /// Reads up to `frames` interleaved frames into `dst`, waiting at most
    /// `timeout`.
    ///
    /// A timeout is not an error: implementations return `Ok` with however
    /// many frames arrived, possibly zero.
    fn read(
        &mut self,
        dst: &mut [f32],
        frames: usize,
        timeout: Duration,
    ) -> Result<usize, StreamError>;
}

/// Callback-driven playback side of a duplex device pair.
pub trait PlaybackStream {
    fn info(&self) -> StreamInfo;

    /// Starts the device. The stream takes ownership of `tap` and must
    /// service its realtime callback with [`PlaybackTap::pull_to`].
    fn request_start(&mut self, tap: PlaybackTap) -> Result<(), StreamError>;

    fn request_stop(&mut self) -> Result<(), StreamError>;
}
