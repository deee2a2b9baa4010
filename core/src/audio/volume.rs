//! Perceptual loudness estimation.
//!
//! The same RMS mapping drives UI feedback for both the microphone signal
//! (while listening) and the playback signal (while speaking).

/// Root-mean-square volume of a sample window: `sqrt(sum(s_i^2) / n)`.
///
/// Pure and O(n). Callers must guarantee a non-empty window; a full-scale
/// constant signal maps to 1.0, silence to 0.0.
pub fn compute_volume(samples: &[f32]) -> f32 {
    debug_assert!(!samples.is_empty(), "volume window must be non-empty");
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
