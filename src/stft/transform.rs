//! Spectral-domain processing hook for the STFT engine.

use rustfft::num_complex::Complex;

/// Frequency-domain stage applied between the forward and inverse FFT.
///
/// Implementations receive the full complex spectrum of one analysis frame
/// and may rewrite it in place. The call sits on the realtime processing
/// path: implementations must not allocate or block.
pub trait SpectralTransform: Send {
    fn process(&mut self, spectrum: &mut [Complex<f32>]);
}

/// Passes the spectrum through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl SpectralTransform for IdentityTransform {
    #[inline]
    fn process(&mut self, _spectrum: &mut [Complex<f32>]) {}
}
