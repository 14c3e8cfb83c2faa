//! Window functions for spectral analysis.

use std::f64::consts::PI;

/// Generates a symmetric (non-periodic) Hann window.
///
/// `w[n] = 0.5 * (1 - cos(2*pi*n / (size - 1)))`, so the first and last
/// samples are exactly zero. The overlap-add normalization curve depends on
/// this convention; the periodic variant would change it at the window
/// boundary.
pub fn hann_window(size: usize) -> Vec<f32> {
    match size {
        0 => return vec![],
        1 => return vec![1.0],
        _ => {}
    }
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = (2.0 * PI * i as f64) / (n - 1.0);
            (0.5 * (1.0 - x.cos())) as f32
        })
        .collect()
}

/// Applies a window function to a slice in-place.
#[inline]
pub fn apply_window(data: &mut [f32], window: &[f32]) {
    for (sample, &w) in data.iter_mut().zip(window.iter()) {
        *sample *= w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_properties() {
        let w = hann_window(512);
        assert_eq!(w.len(), 512);
        // Symmetric convention: endpoints are exactly zero
        assert!(w[0].abs() < 1e-9);
        assert!(w[511].abs() < 1e-9);
        // Middle should be near 1.0
        assert!((w[256] - 1.0).abs() < 0.01);
        // Symmetric
        for i in 0..256 {
            assert!((w[i] - w[511 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hann_window_degenerate_sizes() {
        assert!(hann_window(0).is_empty());
        assert_eq!(hann_window(1), vec![1.0]);
    }

    #[test]
    fn test_apply_window() {
        let window = vec![0.5, 1.0, 0.5];
        let mut data = vec![2.0, 3.0, 4.0];
        apply_window(&mut data, &window);
        assert_eq!(data, vec![1.0, 3.0, 2.0]);
    }
}
