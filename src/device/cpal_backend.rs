//! cpal-backed implementations of the device-stream traits.
//!
//! Both streams are built against the default host devices at a forced
//! 48 kHz rate. The cpal streams start flowing as soon as they are opened;
//! `request_start`/`request_stop` gate the audio through an atomic flag, so
//! the trait lifecycle maps onto cpal without device teardown. The capture
//! callback feeds an SPSC bridge ring that the pipeline's blocking `read`
//! polls; the playback callback pulls straight from the [`PlaybackTap`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use log::error;

use crate::core::spsc::{spsc_ring, RingConsumer};
use crate::core::types::Channels;
use crate::device::{CaptureStream, PlaybackStream, StreamInfo};
use crate::error::StreamError;
use crate::pipeline::PlaybackTap;

/// Sample rate requested from both devices.
const DEVICE_SAMPLE_RATE: u32 = 48_000;
/// Bridge ring capacity: ~2 seconds of stereo audio at 48 kHz.
const BRIDGE_CAPACITY_FRAMES: usize = DEVICE_SAMPLE_RATE as usize * 2;
/// Poll interval of the blocking capture read.
const READ_POLL_INTERVAL: Duration = Duration::from_micros(500);

fn backend_err(context: &str, err: impl std::fmt::Display) -> StreamError {
    StreamError::Backend(format!("{}: {}", context, err))
}

/// Keeps the cpal capture stream alive.
///
/// The stream object itself cannot cross threads, so it stays with the
/// opener while the [`CpalCapture`] handle moves onto the processing
/// thread. Dropping the driver tears the device down.
pub struct CpalCaptureDriver {
    _stream: cpal::Stream,
}

/// [`CaptureStream`] over the default cpal input device.
pub struct CpalCapture {
    info: StreamInfo,
    bridge: RingConsumer,
    active: Arc<AtomicBool>,
}

/// Opens the default input device at 48 kHz.
///
/// Mono devices are duplicated to stereo and wider layouts are folded to
/// their first two channels, so the handle always reports a stereo stream.
/// Returns the pipeline-facing handle plus the driver guard that must stay
/// alive for as long as capture runs.
pub fn open_default_capture(
    frames_per_burst: usize,
) -> Result<(CpalCapture, CpalCaptureDriver), StreamError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| StreamError::Backend("no input device found".into()))?;
    let default_config = device
        .default_input_config()
        .map_err(|e| backend_err("default input config", e))?;
    let device_channels = default_config.channels() as usize;

    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: SampleRate(DEVICE_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let (mut producer, bridge) = spsc_ring(BRIDGE_CAPACITY_FRAMES, 2);
    let active = Arc::new(AtomicBool::new(false));
    let active_cb = Arc::clone(&active);
    let mut stereo_buf = vec![0.0f32; 4096 * 2];

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !active_cb.load(Ordering::Relaxed) {
                    return;
                }
                if device_channels == 2 {
                    let frames = data.len() / 2;
                    let _ = producer.write_interleaved(data, frames);
                    return;
                }
                // Adapt mono or wider layouts to stereo, one chunk at a time.
                let max_frames = stereo_buf.len() / 2;
                for chunk in data.chunks(max_frames * device_channels) {
                    let frames = chunk.len() / device_channels;
                    for i in 0..frames {
                        let frame = &chunk[i * device_channels..(i + 1) * device_channels];
                        let left = frame[0];
                        let right = if device_channels > 1 { frame[1] } else { left };
                        stereo_buf[i * 2] = left;
                        stereo_buf[i * 2 + 1] = right;
                    }
                    let _ = producer.write_interleaved(&stereo_buf, frames);
                }
            },
            move |err| {
                error!("capture stream error: {}", err);
            },
            None,
        )
        .map_err(|e| backend_err("build input stream", e))?;
    stream.play().map_err(|e| backend_err("start input stream", e))?;

    let capture = CpalCapture {
        info: StreamInfo {
            channels: Channels::Stereo,
            frames_per_burst,
            sample_rate: DEVICE_SAMPLE_RATE,
        },
        bridge,
        active,
    };
    Ok((capture, CpalCaptureDriver { _stream: stream }))
}

impl CaptureStream for CpalCapture {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn request_start(&mut self) -> Result<(), StreamError> {
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), StreamError> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    fn read(
        &mut self,
        dst: &mut [f32],
        frames: usize,
        timeout: Duration,
    ) -> Result<usize, StreamError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.bridge.available_to_read() >= frames {
                return Ok(self.bridge.read_interleaved(dst, frames));
            }
            if Instant::now() >= deadline {
                // Timed out: hand over whatever arrived.
                return Ok(self.bridge.read_interleaved(dst, frames));
            }
            thread::sleep(READ_POLL_INTERVAL);
        }
    }
}

/// [`PlaybackStream`] over the default cpal output device.
///
/// The output stream is built lazily in `request_start`, because its
/// callback owns the [`PlaybackTap`] handed over there.
pub struct CpalPlayback {
    device: cpal::Device,
    config: StreamConfig,
    info: StreamInfo,
    active: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
}

/// Opens the default output device at 48 kHz stereo.
pub fn open_default_playback(frames_per_burst: usize) -> Result<CpalPlayback, StreamError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| StreamError::Backend("no output device found".into()))?;
    let config = StreamConfig {
        channels: 2,
        sample_rate: SampleRate(DEVICE_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    Ok(CpalPlayback {
        device,
        config,
        info: StreamInfo {
            channels: Channels::Stereo,
            frames_per_burst,
            sample_rate: DEVICE_SAMPLE_RATE,
        },
        active: Arc::new(AtomicBool::new(false)),
        stream: None,
    })
}

impl PlaybackStream for CpalPlayback {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn request_start(&mut self, tap: PlaybackTap) -> Result<(), StreamError> {
        let active = Arc::clone(&self.active);
        let mut tap = tap;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !active.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let frames = data.len() / tap.channels();
                    tap.pull_to(data, frames);
                },
                move |err| {
                    error!("playback stream error: {}", err);
                },
                None,
            )
            .map_err(|e| backend_err("build output stream", e))?;
        stream
            .play()
            .map_err(|e| backend_err("start output stream", e))?;
        self.active.store(true, Ordering::Release);
        self.stream = Some(stream);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), StreamError> {
        self.active.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| backend_err("stop output stream", e))?;
        }
        Ok(())
    }
}
