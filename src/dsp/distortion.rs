//! Distortion / Waveshaping
//!
//! Everything here is a memoryless transfer function, except sample-and-hold.
//!
//! # The Waveshaper
//!
//! ```text
//!   f(x) = x·a / (1 - a + (2a - 1)·|x|)
//! ```
//!
//! `a` is the drive, 0..1. At `a = 0.5` the denominator is constant and
//! `f(x) = x`. Above 0.5 the curve bends toward a square, below it toward a
//! spike. `f(±1) = ±1` for every drive, so full-scale input stays full-scale.
//!
//! ```text
//!    a = 0.9        a = 0.5        a = 0.1
//!   1 ┤  ______    1 ┤     ╱      1 ┤       │
//!     │ ╱            │   ╱          │      ╱
//!   0 ┼╱           0 ┼ ╱          0 ┼ ____╱
//!     └─────→        └─────→        └─────→
//! ```
//!
//! Oscillators and noise run their raw output through the same curve via
//! their `shape` parameter.
//!
//! # The Others
//!
//! - crush quantises to steps of `2^(-24·r)`.
//! - clip is a hard clamp to `[-1, 1]`.
//! - hold is sample-and-hold at a rate of `holdfreq²` holds per sample.
//! - dbgain maps 0..1 to -40..+40 dB.

use super::nonlinear_map;

#[inline]
pub fn waveshape(x: f32, amount: f32) -> f32 {
    x * amount / (1.0 - amount + (2.0 * amount - 1.0) * x.abs())
}

#[inline]
pub fn crush(x: f32, resolution: f32) -> f32 {
    let n = nonlinear_map(resolution);
    ((f64::from(x / n)).round() * f64::from(n)) as f32
}

#[inline]
pub fn clip(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}

/// Linear gain of a `dbgain` unit: `2^((2d - 1)·log2(100))`.
#[inline]
pub fn db_gain(decibels: f32) -> f32 {
    (f64::from(decibels * 2.0 - 1.0) * 6.643856189774724).exp2() as f32
}

/// Sample-and-hold for one channel. `phase` and `held` are the channel's
/// state words.
#[inline]
pub fn hold(phase: &mut f32, held: &mut f32, x: f32, holdfreq: f32) -> f32 {
    let mut p = *phase - holdfreq * holdfreq;
    if p <= 0.0 {
        *held = x;
        p += 1.0;
    }
    *phase = p;
    *held
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_drive_is_identity() {
        for x in [-1.0, -0.3, 0.0, 0.25, 0.9] {
            assert!((waveshape(x, 0.5) - x).abs() < 1e-6, "x = {x}");
        }
    }

    #[test]
    fn full_scale_is_a_fixed_point() {
        for a in [0.1, 0.3, 0.7, 0.95] {
            assert!((waveshape(1.0, a) - 1.0).abs() < 1e-5);
            assert!((waveshape(-1.0, a) + 1.0).abs() < 1e-5);
        }
        assert!(waveshape(0.2, 0.9) > 0.2, "high drive pushes toward square");
        assert!(waveshape(0.2, 0.1) < 0.2, "low drive pulls toward zero");
    }

    #[test]
    fn crush_quantises() {
        // 2^(-24·0.125) = 1/8
        assert_eq!(crush(0.3, 0.125), 0.25);
        assert_eq!(crush(-0.2, 0.125), -0.25);
        assert_eq!(crush(0.3, 0.0), 0.0, "step of 1 rounds small values away");
    }

    #[test]
    fn db_gain_endpoints() {
        assert!((db_gain(0.5) - 1.0).abs() < 1e-6);
        assert!((db_gain(1.0) - 100.0).abs() < 1e-3);
        assert!((db_gain(0.0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn hold_repeats_until_the_phase_wraps() {
        let (mut phase, mut held) = (0.0, 0.0);
        // 0.5² = 0.25: a new value every four samples after the first
        let out: Vec<f32> = (1..=8)
            .map(|i| hold(&mut phase, &mut held, i as f32, 0.5))
            .collect();
        assert_eq!(out, vec![1.0, 1.0, 1.0, 4.0, 4.0, 4.0, 4.0, 8.0]);
    }
}
