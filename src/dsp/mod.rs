//! Fixed-size DSP primitives executed by the stack machine.
//!
//! Every primitive keeps its state in the 8-float state area of a unit slot
//! (see [`crate::synth::voice::UnitSlot`]), except delay lines, which are too
//! big and live in the synth. Parameters arrive already normalised: the raw
//! byte divided by 128 plus whatever modulation was sent to the unit.
//!
//! Stereo units run the same code once per channel; channel `i` uses state
//! words `i` and `2 + i` so mono and stereo variants share a layout.

/// Feed-forward compressor gain computer.
pub mod compressor;
/// Multi-tap feedback delay line with damping and DC blocking.
pub mod delay;
/// Waveshaper, bit crusher, clipper and sample-and-hold.
pub mod distortion;
/// Exponential-rate linear ADSR.
pub mod envelope;
/// State-variable filter and peaking bell EQ.
pub mod filter;
/// Multiplicative congruential noise.
pub mod noise;
/// Sine, trisaw, pulse, gate and sample-playback oscillators.
pub mod oscillator;

pub use envelope::EnvelopeStage;

/// Maps a 0..1 parameter to a per-sample rate: `2^(-24·v)`.
///
/// 0 is instantaneous, 1 is about 2^24 samples (six minutes at 44.1 kHz).
#[inline]
pub fn nonlinear_map(value: f32) -> f32 {
    (-24.0 * f64::from(value)).exp2() as f32
}

/// Zeroes subnormal values so recursive state decays to exactly 0 instead of
/// crawling through the slow denormal range.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.is_subnormal() {
        0.0
    } else {
        x
    }
}

/// Playback speed control. Advances a fractional time accumulator by
/// `2^(input·64/29) - 1` extra samples and returns the whole samples to add
/// to the song clock on top of the regular one per sample. The result is
/// never below -1, so the clock never runs backwards.
#[inline]
pub fn speed(accumulator: &mut f32, input: f32) -> i32 {
    let r = *accumulator + ((f64::from(input) * 2.206896551724138).exp2() - 1.0) as f32;
    let whole = (r + 1.5) as i32 - 1;
    *accumulator = r - whole as f32;
    whole
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonlinear_map_endpoints() {
        assert_eq!(nonlinear_map(0.0), 1.0);
        assert!((nonlinear_map(0.5) - 2f32.powi(-12)).abs() < 1e-9);
        assert!(nonlinear_map(1.0) < 1e-7);
    }

    #[test]
    fn speed_zero_input_is_one_sample_per_sample() {
        let mut acc = 0.0;
        let total: i32 = (0..100).map(|_| speed(&mut acc, 0.0)).sum();
        assert_eq!(total, 0, "neutral speed adds no extra time");
    }

    #[test]
    fn speed_doubles_time_at_full_octave() {
        let mut acc = 0.0;
        // 29/64 of input is one octave up
        let input = 1.0 / 2.206896551724138;
        let total: i32 = (0..100).map(|_| speed(&mut acc, input as f32)).sum();
        assert!((99..=101).contains(&total), "got {total} extra samples");
    }

    #[test]
    fn subnormals_are_flushed() {
        assert_eq!(flush_denormal(f32::MIN_POSITIVE / 4.0), 0.0);
        assert_eq!(flush_denormal(1e-20), 1e-20);
    }
}
