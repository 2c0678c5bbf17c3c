//! Compressor
//!
//! The unit does not touch the signal; it pushes a gain that the patch
//! multiplies in with `mulp`, so the same detector can key other signals.
//!
//! # Detector
//!
//! Tracks signal power (`x²`, summed over channels) with a one-pole smoother
//! whose coefficient is `2^(-24·attack)` while the power rises and
//! `2^(-24·release)` while it falls.
//!
//! # Gain Computer
//!
//! ```text
//!   level ≤ threshold²   gain = 1
//!   level > threshold²   gain = (threshold² / level)^(ratio / 2)
//! ```
//!
//! then divided by `invgain`, which acts as makeup gain.

use super::nonlinear_map;

#[derive(Debug, Clone, Copy)]
pub struct CompressorParams {
    pub attack: f32,
    pub release: f32,
    pub invgain: f32,
    pub threshold: f32,
    pub ratio: f32,
}

impl CompressorParams {
    pub fn from_slice(p: &[f32]) -> Self {
        Self {
            attack: p[0],
            release: p[1],
            invgain: p[2],
            threshold: p[3],
            ratio: p[4],
        }
    }
}

/// Updates the power follower in `level` with `power` and returns the gain
/// before makeup. The caller divides by `invgain` and checks it for zero.
pub fn gain(level: &mut f32, power: f32, params: &CompressorParams) -> f32 {
    let rate = if power < *level { params.release } else { params.attack };
    *level += (power - *level) * nonlinear_map(rate);
    let threshold2 = params.threshold * params.threshold;
    if *level > threshold2 {
        (f64::from(threshold2 / *level)).powf(f64::from(params.ratio / 2.0)) as f32
    } else {
        1.0
    }
}
