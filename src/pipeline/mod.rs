//! End-to-end duplex pipeline: capture, 3:1 downmix, STFT, 1:3 upmix,
//! playback.
//!
//! [`DuplexPipeline`] owns the device streams, the lock-free rings, all DSP
//! state, and the processing thread. The capture read and every DSP stage
//! run on that one thread; the playback device's realtime callback touches
//! nothing but the [`PlaybackTap`] it was handed at start.

pub mod diagnostics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::core::resample::{Downsampler3, Upsampler3};
use crate::core::spsc::{spsc_ring, RingConsumer, RingProducer};
use crate::core::types::Channels;
use crate::device::{CaptureStream, PlaybackStream};
use crate::error::EngineError;
use crate::stft::{StftEngine, HOP_SIZE};
use self::diagnostics::FlowCounters;

/// Stereo ring capacity divisor: `sample_rate / 5` frames, about 200 ms.
const RING_CAPACITY_DIVISOR: u32 = 5;
/// Fixed 48 kHz to 16 kHz rate ratio.
const RATE_RATIO: usize = 3;
/// Silent bursts written to the output ring before the devices start.
const PRIME_BURSTS: usize = 20;
/// Blocking capture read timeout.
const CAPTURE_READ_TIMEOUT: Duration = Duration::from_millis(10);
/// Underflows are not counted during this window after start.
const WARMUP: Duration = Duration::from_millis(300);
/// Spacing of the periodic diagnostics record.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Consumer end of the rendered-audio ring, driven from the playback
/// device's realtime callback.
///
/// [`pull_to`](Self::pull_to) never blocks, locks, allocates, or logs.
pub struct PlaybackTap {
    output: RingConsumer,
    counters: Arc<FlowCounters>,
    started_at: Instant,
    channels: usize,
}

impl PlaybackTap {
    /// Frames currently queued for playback.
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.output.available_to_read()
    }

    /// Samples per frame of the output stream.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fills `out` with `num_frames` interleaved frames.
    ///
    /// Any shortfall against the ring is zero-filled so the device never
    /// receives garbage; outside the warm-up window the deficit is added to
    /// the underflow counter. Always returns `num_frames`. `out` must hold
    /// at least `num_frames * channels` samples.
    pub fn pull_to(&mut self, out: &mut [f32], num_frames: usize) -> usize {
        let ch = self.channels;
        let mut total = 0usize;
        while total < num_frames {
            let got = self
                .output
                .read_interleaved(&mut out[total * ch..num_frames * ch], num_frames - total);
            if got == 0 {
                break;
            }
            total += got;
        }
        if total < num_frames {
            out[total * ch..num_frames * ch].fill(0.0);
            if self.started_at.elapsed() >= WARMUP {
                self.counters.add_underflow((num_frames - total) as u64);
            }
        }
        num_frames
    }
}

/// Working buffers sized once at start; the processing loop never resizes
/// or reallocates them.
struct Scratch {
    /// One capture burst, stereo interleaved.
    tmp_in: Vec<f32>,
    /// One burst read back out of the input ring.
    tmp_xfer: Vec<f32>,
    l48: Vec<f32>,
    r48: Vec<f32>,
    l16: Vec<f32>,
    r16: Vec<f32>,
    mono16: Vec<f32>,
    hop_in: Vec<f32>,
    hop_out: Vec<f32>,
    /// One hop upsampled back to 48 kHz.
    up48: Vec<f32>,
    /// One upsampled hop duplicated to stereo, interleaved.
    tmp_out: Vec<f32>,
}

impl Scratch {
    fn new(fpb: usize) -> Self {
        Self {
            tmp_in: vec![0.0; fpb * 2],
            tmp_xfer: vec![0.0; fpb * 2],
            l48: vec![0.0; fpb],
            r48: vec![0.0; fpb],
            l16: vec![0.0; fpb / RATE_RATIO],
            r16: vec![0.0; fpb / RATE_RATIO],
            mono16: vec![0.0; fpb / RATE_RATIO],
            hop_in: vec![0.0; HOP_SIZE],
            hop_out: vec![0.0; HOP_SIZE],
            up48: vec![0.0; HOP_SIZE * RATE_RATIO],
            tmp_out: vec![0.0; HOP_SIZE * RATE_RATIO * 2],
        }
    }
}

fn deinterleave_stereo(interleaved: &[f32], left: &mut [f32], right: &mut [f32]) {
    for (i, pair) in interleaved.chunks_exact(2).enumerate() {
        left[i] = pair[0];
        right[i] = pair[1];
    }
}

/// Owner of the duplex dataflow: device streams, rings, DSP state, and the
/// processing thread.
pub struct DuplexPipeline {
    capture: Option<Box<dyn CaptureStream>>,
    playback: Option<Box<dyn PlaybackStream>>,
    running: Arc<AtomicBool>,
    counters: Arc<FlowCounters>,
    worker: Option<JoinHandle<Box<dyn CaptureStream>>>,
}

impl DuplexPipeline {
    pub fn new() -> Self {
        Self {
            capture: None,
            playback: None,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(FlowCounters::default()),
            worker: None,
        }
    }

    /// Sets the capture stream. Must be called before `start`.
    pub fn set_input_stream(&mut self, stream: Box<dyn CaptureStream>) {
        self.capture = Some(stream);
    }

    /// Sets the playback stream. Must be called before `start`.
    pub fn set_output_stream(&mut self, stream: Box<dyn PlaybackStream>) {
        self.playback = Some(stream);
    }

    /// Cumulative over/underflow counters.
    pub fn counters(&self) -> &FlowCounters {
        &self.counters
    }

    /// Brings the pipeline up.
    ///
    /// Reads the burst geometry from the playback stream, sizes every ring
    /// and scratch buffer, primes the output ring with silence, starts
    /// capture then playback (rolling capture back if playback refuses),
    /// and spawns the processing thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::InvalidConfig("pipeline already running".into()));
        }
        let playback = self.playback.as_mut().ok_or(EngineError::NoOutputStream)?;
        let capture_info = self
            .capture
            .as_ref()
            .ok_or(EngineError::NoInputStream)?
            .info();

        let info = playback.info();
        if info.channels != Channels::Stereo {
            return Err(EngineError::InvalidConfig(format!(
                "playback stream must be stereo, got {:?}",
                info.channels
            )));
        }
        if capture_info.channels != Channels::Stereo {
            return Err(EngineError::InvalidConfig(format!(
                "capture stream must be stereo, got {:?}",
                capture_info.channels
            )));
        }
        if info.frames_per_burst == 0 || info.frames_per_burst % RATE_RATIO != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "frames_per_burst must be a positive multiple of {}, got {}",
                RATE_RATIO, info.frames_per_burst
            )));
        }
        if capture_info.sample_rate != info.sample_rate {
            return Err(EngineError::InvalidConfig(format!(
                "capture at {} Hz but playback at {} Hz",
                capture_info.sample_rate, info.sample_rate
            )));
        }

        let fpb = info.frames_per_burst;
        let sr = info.sample_rate;
        let channels = info.channels.count();
        let stereo_capacity = (sr / RING_CAPACITY_DIVISOR) as usize;
        let mono_capacity = stereo_capacity / RATE_RATIO;

        let (in_prod, in_cons) = spsc_ring(stereo_capacity, channels);
        let (mono_prod, mono_cons) = spsc_ring(mono_capacity, 1);
        let (mut out_prod, out_cons) = spsc_ring(stereo_capacity, channels);
        let scratch = Scratch::new(fpb);

        // Prime the output ring so the first callbacks have audio to pull.
        for _ in 0..PRIME_BURSTS {
            let _ = out_prod.write_interleaved(&scratch.tmp_in, fpb);
        }

        let started_at = Instant::now();
        let tap = PlaybackTap {
            output: out_cons,
            counters: Arc::clone(&self.counters),
            started_at,
            channels,
        };

        let mut capture = self.capture.take().ok_or(EngineError::NoInputStream)?;
        if let Err(err) = capture.request_start() {
            self.capture = Some(capture);
            return Err(EngineError::StreamStart {
                stream: "capture",
                reason: err.to_string(),
            });
        }
        info!("capture stream started ({} Hz, {} frames per burst)", sr, fpb);

        if let Err(err) = playback.request_start(tap) {
            // Best-effort rollback of the already-started capture stream.
            if let Err(stop_err) = capture.request_stop() {
                warn!("rollback of capture stream failed: {}", stop_err);
            }
            self.capture = Some(capture);
            return Err(EngineError::StreamStart {
                stream: "playback",
                reason: err.to_string(),
            });
        }
        info!("playback stream started");

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            capture,
            in_prod,
            in_cons,
            mono_prod,
            mono_cons,
            out_prod,
            down_left: Downsampler3::new(),
            down_right: Downsampler3::new(),
            up_mono: Upsampler3::new(),
            engine: StftEngine::new(),
            scratch,
            fpb,
            counters: Arc::clone(&self.counters),
            running: Arc::clone(&self.running),
        };
        match thread::Builder::new()
            .name("duplex-io".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                if let Err(stop_err) = playback.request_stop() {
                    warn!("stopping playback after spawn failure failed: {}", stop_err);
                }
                Err(EngineError::StreamStart {
                    stream: "processing",
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Tears the pipeline down.
    ///
    /// Publishes the stop flag, joins the processing thread (which hands the
    /// capture stream back), and issues best-effort stop requests on both
    /// streams. Ring contents are discarded, not drained. Safe to call when
    /// not running.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(handle) = self.worker.take() {
                match handle.join() {
                    Ok(capture) => self.capture = Some(capture),
                    Err(_) => warn!("processing thread panicked"),
                }
            }
        }
        if let Some(playback) = self.playback.as_mut() {
            if let Err(err) = playback.request_stop() {
                warn!("request_stop on playback stream failed: {}", err);
            }
        }
        if let Some(capture) = self.capture.as_mut() {
            if let Err(err) = capture.request_stop() {
                warn!("request_stop on capture stream failed: {}", err);
            }
        }
    }
}

impl Default for DuplexPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DuplexPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the processing thread.
struct Worker {
    capture: Box<dyn CaptureStream>,
    in_prod: RingProducer,
    in_cons: RingConsumer,
    mono_prod: RingProducer,
    mono_cons: RingConsumer,
    out_prod: RingProducer,
    down_left: Downsampler3,
    down_right: Downsampler3,
    up_mono: Upsampler3,
    engine: StftEngine,
    scratch: Scratch,
    fpb: usize,
    counters: Arc<FlowCounters>,
    running: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) -> Box<dyn CaptureStream> {
        let mut last_stats = Instant::now();
        let mut last_hops = 0u64;
        let mut last_pushed = 0u64;
        let mut last_popped = 0u64;

        while self.running.load(Ordering::Acquire) {
            let got = match self
                .capture
                .read(&mut self.scratch.tmp_in, self.fpb, CAPTURE_READ_TIMEOUT)
            {
                Ok(frames) => frames,
                Err(err) => {
                    debug!("capture read failed: {}", err);
                    0
                }
            };

            if got > 0 {
                let wrote = self.in_prod.write_interleaved(&self.scratch.tmp_in, got);
                if wrote < got {
                    self.counters.add_overflow((got - wrote) as u64);
                }
                while self
                    .in_cons
                    .available_to_read()
                    .min(self.out_prod.available_to_write())
                    >= self.fpb
                {
                    self.transfer_one_burst();
                }
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                last_stats = Instant::now();
                let hops = self.engine.hops_processed();
                let pushed = self.engine.frames_pushed();
                let popped = self.engine.frames_popped();
                debug!(
                    "in_ring={} out_ring={} overflows={} underflows={} | stft hops +{} (total {}), push +{}, pop +{}",
                    self.in_cons.available_to_read(),
                    self.out_prod.capacity_frames() - self.out_prod.available_to_write(),
                    self.counters.overflows(),
                    self.counters.underflows(),
                    hops - last_hops,
                    hops,
                    pushed - last_pushed,
                    popped - last_popped,
                );
                last_hops = hops;
                last_pushed = pushed;
                last_popped = popped;
            }
        }

        self.capture
    }

    /// Moves one burst through the full 48k -> 16k -> STFT -> 48k chain.
    fn transfer_one_burst(&mut self) {
        let fpb = self.fpb;
        let read = self.in_cons.read_interleaved(&mut self.scratch.tmp_xfer, fpb);
        if read != fpb {
            return;
        }

        deinterleave_stereo(
            &self.scratch.tmp_xfer[..fpb * 2],
            &mut self.scratch.l48,
            &mut self.scratch.r48,
        );
        let left = self
            .down_left
            .process(&self.scratch.l48[..fpb], &mut self.scratch.l16);
        let right = self
            .down_right
            .process(&self.scratch.r48[..fpb], &mut self.scratch.r16);
        let frames16 = left.min(right);

        for i in 0..frames16 {
            self.scratch.mono16[i] = 0.5 * (self.scratch.l16[i] + self.scratch.r16[i]);
        }
        let wrote = self.mono_prod.write_interleaved(&self.scratch.mono16, frames16);
        if wrote < frames16 {
            self.counters.add_overflow((frames16 - wrote) as u64);
        }

        // Feed the spectral core hop by hop; each hop comes straight back
        // out, up to 48 kHz, and into the output ring.
        while self.mono_cons.available_to_read() >= HOP_SIZE {
            let _ = self
                .mono_cons
                .read_interleaved(&mut self.scratch.hop_in, HOP_SIZE);
            self.engine.push_time_domain(&self.scratch.hop_in);
            let produced = self.engine.pop_time_domain(&mut self.scratch.hop_out);
            if produced != HOP_SIZE {
                continue;
            }

            let up = self
                .up_mono
                .process(&self.scratch.hop_out, &mut self.scratch.up48);
            for (i, &sample) in self.scratch.up48[..up].iter().enumerate() {
                self.scratch.tmp_out[i * 2] = sample;
                self.scratch.tmp_out[i * 2 + 1] = sample;
            }
            let wrote = self.out_prod.write_interleaved(&self.scratch.tmp_out, up);
            if wrote < up {
                self.counters.add_overflow((up - wrote) as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_buffers_sized_from_burst() {
        let scratch = Scratch::new(288);
        assert_eq!(scratch.tmp_in.len(), 576);
        assert_eq!(scratch.l48.len(), 288);
        assert_eq!(scratch.l16.len(), 96);
        assert_eq!(scratch.mono16.len(), 96);
        assert_eq!(scratch.up48.len(), 288);
        assert_eq!(scratch.tmp_out.len(), 576);
    }

    #[test]
    fn deinterleave_splits_pairs() {
        let interleaved = [1.0f32, -1.0, 2.0, -2.0, 3.0, -3.0];
        let mut left = [0.0f32; 3];
        let mut right = [0.0f32; 3];
        deinterleave_stereo(&interleaved, &mut left, &mut right);
        assert_eq!(left, [1.0, 2.0, 3.0]);
        assert_eq!(right, [-1.0, -2.0, -3.0]);
    }
}
