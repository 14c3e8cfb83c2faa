//! Short-time Fourier transform core: windowed analysis, a pluggable
//! spectral stage, and overlap-add synthesis at fixed 512/96 geometry.

pub mod engine;
pub mod transform;

pub use engine::{StftEngine, ANALYSIS_SIZE, FFT_SIZE, HOP_SIZE};
pub use transform::{IdentityTransform, SpectralTransform};
