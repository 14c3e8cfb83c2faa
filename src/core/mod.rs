//! Core primitives: sample types, windows, rate converters, and the
//! lock-free frame ring.

pub mod resample;
pub mod spsc;
pub mod types;
pub mod window;
