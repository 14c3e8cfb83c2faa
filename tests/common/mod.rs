#![allow(dead_code)]

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stft_duplex::{
    CaptureStream, Channels, PlaybackStream, PlaybackTap, StreamError, StreamInfo,
};

/// Generates interleaved stereo frames with identical channels.
pub fn gen_stereo_sine(freq_hz: f64, sr: u32, frames: usize, amp: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let sample = (amp as f64 * (2.0 * PI * freq_hz * i as f64 / sr as f64).sin()) as f32;
        out.push(sample);
        out.push(sample);
    }
    out
}

/// Deterministic unit-range white noise (xorshift64).
pub fn white_noise(n: usize, mut seed: u64) -> Vec<f32> {
    (0..n)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (((seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0) as f32
        })
        .collect()
}

pub fn rms(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = signal.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_sq / signal.len() as f64).sqrt()
}

/// Least-squares fit of `a*cos + b*sin` at `freq_hz`.
///
/// Returns `(amplitude, residual_rms)`: the fitted sinusoid amplitude and
/// the RMS of everything the fit does not explain.
pub fn sine_fit(signal: &[f32], freq_hz: f64, sr: f64) -> (f64, f64) {
    let w = 2.0 * PI * freq_hz / sr;
    let mut cc = 0.0f64;
    let mut ss = 0.0f64;
    let mut cs = 0.0f64;
    let mut xc = 0.0f64;
    let mut xs = 0.0f64;
    for (i, &x) in signal.iter().enumerate() {
        let c = (w * i as f64).cos();
        let s = (w * i as f64).sin();
        let xv = x as f64;
        cc += c * c;
        ss += s * s;
        cs += c * s;
        xc += xv * c;
        xs += xv * s;
    }
    let det = cc * ss - cs * cs;
    if det.abs() < 1e-12 {
        return (0.0, rms(signal));
    }
    let a = (xc * ss - xs * cs) / det;
    let b = (xs * cc - xc * cs) / det;

    let mut residual_sq = 0.0f64;
    for (i, &x) in signal.iter().enumerate() {
        let model = a * (w * i as f64).cos() + b * (w * i as f64).sin();
        let diff = x as f64 - model;
        residual_sq += diff * diff;
    }
    (
        (a * a + b * b).sqrt(),
        (residual_sq / signal.len() as f64).sqrt(),
    )
}

/// Capture stream fed from a prerecorded interleaved stereo signal.
///
/// Reads are paced to the sample rate, like a real blocking device; once
/// the signal is exhausted, reads sleep out their timeout and return zero
/// frames.
pub struct MockCapture {
    info: StreamInfo,
    data: Vec<f32>,
    pos_frames: usize,
    stopped: Arc<AtomicBool>,
}

impl MockCapture {
    pub fn new(data: Vec<f32>, frames_per_burst: usize, sample_rate: u32) -> Self {
        Self {
            info: StreamInfo {
                channels: Channels::Stereo,
                frames_per_burst,
                sample_rate,
            },
            data,
            pos_frames: 0,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn silence(seconds: f64, frames_per_burst: usize, sample_rate: u32) -> Self {
        let frames = (seconds * sample_rate as f64) as usize;
        Self::new(vec![0.0; frames * 2], frames_per_burst, sample_rate)
    }

    /// Flag that flips when `request_stop` is called.
    pub fn stop_witness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

impl CaptureStream for MockCapture {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn request_start(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), StreamError> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }

    fn read(
        &mut self,
        dst: &mut [f32],
        frames: usize,
        timeout: Duration,
    ) -> Result<usize, StreamError> {
        let total_frames = self.data.len() / 2;
        if self.pos_frames >= total_frames {
            thread::sleep(timeout);
            return Ok(0);
        }
        let got = frames.min(total_frames - self.pos_frames);
        thread::sleep(Duration::from_secs_f64(
            got as f64 / self.info.sample_rate as f64,
        ));
        dst[..got * 2]
            .copy_from_slice(&self.data[self.pos_frames * 2..(self.pos_frames + got) * 2]);
        self.pos_frames += got;
        Ok(got)
    }
}

pub type TapSlot = Arc<Mutex<Option<PlaybackTap>>>;

/// Playback stream that parks the tap for the test to drive directly.
pub struct MockPlayback {
    info: StreamInfo,
    slot: TapSlot,
}

impl MockPlayback {
    pub fn new(frames_per_burst: usize, sample_rate: u32) -> (Self, TapSlot) {
        Self::with_channels(Channels::Stereo, frames_per_burst, sample_rate)
    }

    pub fn with_channels(
        channels: Channels,
        frames_per_burst: usize,
        sample_rate: u32,
    ) -> (Self, TapSlot) {
        let slot: TapSlot = Arc::new(Mutex::new(None));
        (
            Self {
                info: StreamInfo {
                    channels,
                    frames_per_burst,
                    sample_rate,
                },
                slot: Arc::clone(&slot),
            },
            slot,
        )
    }
}

impl PlaybackStream for MockPlayback {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn request_start(&mut self, tap: PlaybackTap) -> Result<(), StreamError> {
        *self.slot.lock().unwrap() = Some(tap);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Playback stream whose start always fails, for rollback testing.
pub struct RefusingPlayback {
    info: StreamInfo,
}

impl RefusingPlayback {
    pub fn new(frames_per_burst: usize, sample_rate: u32) -> Self {
        Self {
            info: StreamInfo {
                channels: Channels::Stereo,
                frames_per_burst,
                sample_rate,
            },
        }
    }
}

impl PlaybackStream for RefusingPlayback {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn request_start(&mut self, _tap: PlaybackTap) -> Result<(), StreamError> {
        Err(StreamError::Backend("device refused to start".into()))
    }

    fn request_stop(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Takes the tap parked by [`MockPlayback`]; panics if `start` never
/// delivered one.
pub fn take_tap(slot: &TapSlot) -> PlaybackTap {
    slot.lock()
        .unwrap()
        .take()
        .expect("pipeline start should have delivered the playback tap")
}
