//! Streaming STFT engine with overlap-add reconstruction.
//!
//! Fixed geometry: 512-point FFT, 96-sample hop, 480 samples of analysis
//! content per frame (384 rolling history plus one hop), left-padded with
//! 32 zeros so the content sits at the tail of the FFT grid. The same
//! symmetric Hann window is applied on analysis and synthesis; emitted
//! samples are divided by the accumulated squared-window energy so the
//! reconstruction has unit gain once steady state is reached.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::core::window::{apply_window, hann_window};
use crate::stft::transform::{IdentityTransform, SpectralTransform};

/// Zero-valued complex number, used for FFT buffer initialization.
const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// FFT length of one analysis frame.
pub const FFT_SIZE: usize = 512;
/// Step in samples between successive analysis frames.
pub const HOP_SIZE: usize = 96;
/// Rolling history carried between frames.
const HIST_SIZE: usize = 384;
/// Samples of real signal in each frame: the rolling history plus one hop.
pub const ANALYSIS_SIZE: usize = HIST_SIZE + HOP_SIZE;
/// Leading zeros that pad the analysis content to the tail of the FFT grid.
const PAD_SIZE: usize = FFT_SIZE - ANALYSIS_SIZE;
/// Overlap-add accumulator capacity in samples (power of two; hundreds of
/// hops of headroom over the 512-sample frame support).
const OLA_CAPACITY: usize = 1 << 15;
const OLA_MASK: usize = OLA_CAPACITY - 1;
/// Window-energy floor below which an output sample is emitted as zero.
const NORM_EPSILON: f32 = 1e-8;

/// Streaming overlap-add STFT processor for mono 16 kHz audio.
///
/// Feed samples with [`push_time_domain`](Self::push_time_domain); every
/// completed 96-sample hop runs one analysis/synthesis pass and makes
/// exactly 96 more output samples available to
/// [`pop_time_domain`](Self::pop_time_domain). Single-threaded by design:
/// the same owner pushes and pops.
pub struct StftEngine {
    /// Hann(512), shared by analysis and synthesis.
    window: Vec<f32>,
    /// Staging buffer for the currently accumulating hop.
    hop_buf: Vec<f32>,
    hop_fill: usize,
    /// Rolling history forming the overlap tail of the next frame.
    hist: Vec<f32>,
    /// Assembled 512-sample time-domain frame.
    frame: Vec<f32>,
    /// Reusable complex FFT buffer.
    fft_buffer: Vec<Complex<f32>>,
    /// Scratch for in-place FFT execution.
    fft_scratch: Vec<Complex<f32>>,
    /// Circular overlap-add accumulator.
    ola: Vec<f32>,
    /// Accumulated squared-window energy matching `ola`.
    norm: Vec<f32>,
    ola_write: usize,
    ola_read: usize,
    /// Samples ready to pop.
    avail: usize,
    pushed: u64,
    popped: u64,
    hops: u64,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    transform: Box<dyn SpectralTransform>,
}

impl StftEngine {
    /// Creates an engine with the identity spectral stage.
    pub fn new() -> Self {
        Self::with_transform(Box::new(IdentityTransform))
    }

    /// Creates an engine with a custom spectral stage.
    ///
    /// The surrounding analysis/synthesis contract is independent of the
    /// transform; swapping it changes only the spectrum handed between the
    /// forward and inverse FFT.
    pub fn with_transform(transform: Box<dyn SpectralTransform>) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(FFT_SIZE);
        let fft_inverse = planner.plan_fft_inverse(FFT_SIZE);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());

        Self {
            window: hann_window(FFT_SIZE),
            hop_buf: vec![0.0; HOP_SIZE],
            hop_fill: 0,
            hist: vec![0.0; HIST_SIZE],
            frame: vec![0.0; FFT_SIZE],
            fft_buffer: vec![COMPLEX_ZERO; FFT_SIZE],
            fft_scratch: vec![COMPLEX_ZERO; scratch_len],
            ola: vec![0.0; OLA_CAPACITY],
            norm: vec![0.0; OLA_CAPACITY],
            ola_write: 0,
            ola_read: 0,
            avail: 0,
            pushed: 0,
            popped: 0,
            hops: 0,
            fft_forward,
            fft_inverse,
            transform,
        }
    }

    /// Appends mono 16 kHz samples to the engine.
    ///
    /// Every time the staging buffer fills to one hop, a full
    /// analysis/synthesis pass runs and 96 more output samples become
    /// available. Does not allocate.
    pub fn push_time_domain(&mut self, samples: &[f32]) {
        self.pushed += samples.len() as u64;
        let mut idx = 0;
        while idx < samples.len() {
            let take = (HOP_SIZE - self.hop_fill).min(samples.len() - idx);
            self.hop_buf[self.hop_fill..self.hop_fill + take]
                .copy_from_slice(&samples[idx..idx + take]);
            self.hop_fill += take;
            idx += take;

            if self.hop_fill == HOP_SIZE {
                self.process_one_hop();
                self.hop_fill = 0;

                // Roll the history: drop one hop, append the hop just analyzed.
                self.hist.copy_within(HOP_SIZE.., 0);
                self.hist[HIST_SIZE - HOP_SIZE..].copy_from_slice(&self.hop_buf);
            }
        }
    }

    /// Pops up to `out.len()` normalized output samples.
    ///
    /// Emitted samples divide the accumulated overlap-add value by the
    /// accumulated squared-window energy; positions whose energy is at or
    /// below the floor come out as zero. Consumed ring cells are zeroed so
    /// the accumulator can wrap safely. Returns the number written.
    pub fn pop_time_domain(&mut self, out: &mut [f32]) -> usize {
        let want = out.len().min(self.avail);
        for (i, sample) in out[..want].iter_mut().enumerate() {
            let idx = (self.ola_read + i) & OLA_MASK;
            let energy = self.norm[idx];
            *sample = if energy > NORM_EPSILON {
                self.ola[idx] / energy
            } else {
                0.0
            };
            self.ola[idx] = 0.0;
            self.norm[idx] = 0.0;
        }
        self.ola_read = (self.ola_read + want) & OLA_MASK;
        self.avail -= want;
        self.popped += want as u64;
        want
    }

    /// Samples currently available to pop.
    #[inline]
    pub fn available(&self) -> usize {
        self.avail
    }

    /// Total samples accepted by `push_time_domain`.
    #[inline]
    pub fn frames_pushed(&self) -> u64 {
        self.pushed
    }

    /// Total samples handed out by `pop_time_domain`.
    #[inline]
    pub fn frames_popped(&self) -> u64 {
        self.popped
    }

    /// Total analysis/synthesis passes run.
    #[inline]
    pub fn hops_processed(&self) -> u64 {
        self.hops
    }

    /// Realized group delay in samples at 16 kHz.
    ///
    /// Output sample `i` reproduces input sample `i - latency_samples()`
    /// once `i` is past the delay: 384 samples of history plus the
    /// 32-sample leading pad.
    #[inline]
    pub fn latency_samples(&self) -> usize {
        HIST_SIZE + PAD_SIZE
    }

    /// One full analysis/synthesis pass over the staged hop.
    fn process_one_hop(&mut self) {
        // Assemble the frame: leading zeros, then history, then the new hop.
        self.frame[..PAD_SIZE].fill(0.0);
        self.frame[PAD_SIZE..PAD_SIZE + HIST_SIZE].copy_from_slice(&self.hist);
        self.frame[PAD_SIZE + HIST_SIZE..].copy_from_slice(&self.hop_buf);

        // Analysis window, then pack to complex.
        apply_window(&mut self.frame, &self.window);
        for (bin, &sample) in self.fft_buffer.iter_mut().zip(self.frame.iter()) {
            *bin = Complex::new(sample, 0.0);
        }

        self.fft_forward
            .process_with_scratch(&mut self.fft_buffer, &mut self.fft_scratch);
        self.transform.process(&mut self.fft_buffer);
        self.fft_inverse
            .process_with_scratch(&mut self.fft_buffer, &mut self.fft_scratch);

        // rustfft leaves the inverse unscaled; fold 1/N into the synthesis
        // windowing, then overlap-add.
        let inv_n = 1.0 / FFT_SIZE as f32;
        for i in 0..FFT_SIZE {
            let idx = (self.ola_write + i) & OLA_MASK;
            self.ola[idx] += self.fft_buffer[i].re * inv_n * self.window[i];
            self.norm[idx] += self.window[i] * self.window[i];
        }
        self.ola_write = (self.ola_write + HOP_SIZE) & OLA_MASK;
        self.avail += HOP_SIZE;
        self.hops += 1;
    }
}

impl Default for StftEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_available_before_first_hop() {
        let mut engine = StftEngine::new();
        engine.push_time_domain(&[0.1; HOP_SIZE - 1]);
        assert_eq!(engine.available(), 0);
        let mut out = [0.0f32; HOP_SIZE];
        assert_eq!(engine.pop_time_domain(&mut out), 0);
        assert_eq!(engine.hops_processed(), 0);
    }

    #[test]
    fn each_hop_yields_exactly_one_hop_of_output() {
        let mut engine = StftEngine::new();
        let hop = [0.5f32; HOP_SIZE];
        let mut out = [0.0f32; HOP_SIZE];
        for expected_hops in 1..=8u64 {
            engine.push_time_domain(&hop);
            assert_eq!(engine.hops_processed(), expected_hops);
            assert_eq!(engine.pop_time_domain(&mut out), HOP_SIZE);
        }
    }

    #[test]
    fn counters_track_push_and_pop_totals() {
        let mut engine = StftEngine::new();
        engine.push_time_domain(&[0.0; 250]);
        assert_eq!(engine.frames_pushed(), 250);
        assert_eq!(engine.hops_processed(), 250 / HOP_SIZE as u64);
        assert_eq!(engine.available(), 2 * HOP_SIZE);

        let mut out = [0.0f32; 50];
        assert_eq!(engine.pop_time_domain(&mut out), 50);
        assert_eq!(engine.frames_popped(), 50);
        assert!(engine.frames_popped() <= engine.frames_pushed());
    }

    #[test]
    fn early_output_is_finite_and_guarded() {
        // Right after construction the accumulator holds only warm-up
        // content: no NaN, no Inf, and positions whose window energy sits
        // at or below the floor come out as exact zeros. Samples just past
        // the floor divide FFT round-off by a tiny energy, so they are only
        // near-silent.
        let mut engine = StftEngine::new();
        engine.push_time_domain(&[1.0; HOP_SIZE]);
        let mut out = [f32::NAN; HOP_SIZE];
        assert_eq!(engine.pop_time_domain(&mut out), HOP_SIZE);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        for (i, &sample) in out.iter().enumerate() {
            assert!(sample.is_finite(), "sample {} not finite: {}", i, sample);
            assert!(
                sample.abs() < 0.05,
                "warm-up sample {} should be near-silent, got {}",
                i,
                sample
            );
        }
    }

    #[test]
    fn muting_transform_silences_steady_state() {
        struct Mute;
        impl SpectralTransform for Mute {
            fn process(&mut self, spectrum: &mut [Complex<f32>]) {
                spectrum.fill(Complex::new(0.0, 0.0));
            }
        }

        let mut engine = StftEngine::with_transform(Box::new(Mute));
        let mut out = [0.0f32; HOP_SIZE];
        for i in 0..40 {
            let hop: Vec<f32> = (0..HOP_SIZE)
                .map(|j| ((i * HOP_SIZE + j) as f32 * 0.37).sin())
                .collect();
            engine.push_time_domain(&hop);
            assert_eq!(engine.pop_time_domain(&mut out), HOP_SIZE);
        }
        for &sample in &out {
            assert!(sample.abs() < 1e-5, "muted output leaked: {}", sample);
        }
    }
}
