#![forbid(unsafe_code)]
//! Low-latency full-duplex audio pipeline with an STFT processing core.
//!
//! `stft-duplex` captures 48 kHz stereo audio, downconverts it to a 16 kHz
//! mono stream, runs a streaming short-time Fourier transform with
//! overlap-add reconstruction (an identity transform today;
//! [`SpectralTransform`] is the extension point), upconverts the result
//! back to 48 kHz stereo, and feeds a playback device, all against a
//! realtime callback deadline. The capture thread and the playback callback
//! communicate exclusively through lock-free single-producer/
//! single-consumer rings; the steady-state path never allocates.
//!
//! # Quick start
//!
//! The spectral core can be used on its own:
//!
//! ```
//! use stft_duplex::{StftEngine, HOP_SIZE};
//!
//! let mut engine = StftEngine::new();
//! let hop = [0.0f32; HOP_SIZE];
//! engine.push_time_domain(&hop);
//!
//! // Every completed hop makes exactly one hop of output available.
//! let mut out = [0.0f32; HOP_SIZE];
//! assert_eq!(engine.pop_time_domain(&mut out), HOP_SIZE);
//! ```
//!
//! # Full pipeline
//!
//! Hand [`DuplexPipeline`] a [`CaptureStream`] and a [`PlaybackStream`]
//! (the `cpal-backend` feature provides implementations over the default
//! devices), then `start()`:
//!
//! ```no_run
//! # fn main() -> Result<(), stft_duplex::EngineError> {
//! # let (capture, playback): (Box<dyn stft_duplex::CaptureStream>,
//! #     Box<dyn stft_duplex::PlaybackStream>) = unimplemented!();
//! let mut pipeline = stft_duplex::DuplexPipeline::new();
//! pipeline.set_input_stream(capture);
//! pipeline.set_output_stream(playback);
//! pipeline.start()?;
//! // ... audio flows until ...
//! pipeline.stop();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod stft;

pub use crate::core::resample::{Downsampler3, Upsampler3};
pub use crate::core::spsc::{spsc_ring, RingConsumer, RingProducer};
pub use crate::core::types::{Channels, Sample};
pub use crate::device::{CaptureStream, PlaybackStream, StreamInfo};
pub use crate::error::{EngineError, StreamError};
pub use crate::pipeline::diagnostics::FlowCounters;
pub use crate::pipeline::{DuplexPipeline, PlaybackTap};
pub use crate::stft::{IdentityTransform, SpectralTransform, StftEngine, FFT_SIZE, HOP_SIZE};
