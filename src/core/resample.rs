//! Fixed-ratio 3:1 and 1:3 mono sample-rate converters.
//!
//! The pipeline runs its spectral core at 16 kHz while the devices run at
//! 48 kHz; these converters bridge the fixed 3x gap in each direction.

/// Decimates mono audio by three using a three-tap mean.
///
/// Each output sample is the average of one whole input triplet. The flat
/// passband of the mean filter is adequate for the current identity
/// spectral stage; a polyphase FIR can replace the body without changing
/// the interface.
#[derive(Debug, Default)]
pub struct Downsampler3;

impl Downsampler3 {
    pub fn new() -> Self {
        Self
    }

    /// Converts whole input triplets into output samples.
    ///
    /// Produces `min(input.len() / 3, output.len())` samples and returns
    /// that count. Callers supply inputs whose length is a multiple of
    /// three; a ragged tail is ignored.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> usize {
        let produced = (input.len() / 3).min(output.len());
        for (g, out) in output[..produced].iter_mut().enumerate() {
            let triplet = &input[g * 3..g * 3 + 3];
            *out = (triplet[0] + triplet[1] + triplet[2]) * (1.0 / 3.0);
        }
        produced
    }

    /// Clears continuity state (none is kept in the decimating direction).
    pub fn reset(&mut self) {}
}

/// Interpolates mono audio up by three.
///
/// Each input sample expands into three outputs on a straight line toward
/// the next input sample; the final sample of a block repeats with zero
/// step. Interpolation is per-block: the first output of a block is the
/// block's first input, not a continuation of the previous block's tail.
#[derive(Debug, Default)]
pub struct Upsampler3 {
    // Tail retained for a leading-tap continuity fix at block boundaries.
    #[allow(dead_code)]
    prev_sample: f32,
    #[allow(dead_code)]
    has_prev: bool,
}

impl Upsampler3 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands `input` threefold into `output`.
    ///
    /// Returns the number of samples written: `3 * input.len()`, clipped to
    /// whole output triplets when `output` is shorter.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> usize {
        if input.is_empty() {
            return 0;
        }
        let produced_max = (input.len() * 3).min(output.len());
        let mut out_idx = 0usize;

        for (i, &x0) in input.iter().enumerate() {
            if out_idx + 3 > produced_max {
                break;
            }
            let x1 = if i + 1 < input.len() { input[i + 1] } else { x0 };
            let d = (x1 - x0) * (1.0 / 3.0);
            output[out_idx] = x0;
            output[out_idx + 1] = x0 + d;
            output[out_idx + 2] = x0 + 2.0 * d;
            out_idx += 3;
        }

        self.prev_sample = input[input.len() - 1];
        self.has_prev = true;
        out_idx
    }

    /// Clears continuity state.
    pub fn reset(&mut self) {
        self.prev_sample = 0.0;
        self.has_prev = false;
    }
}
