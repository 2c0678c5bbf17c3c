//! Delay lines
//!
//! A delay unit owns one line per delay time and channel. Every line is a
//! 65 536-sample ring indexed by the synth's global time truncated to 16 bits,
//! so all lines share one write position and no per-line cursor is needed.
//!
//! ```text
//!               ┌──────────────── feedback · damp(tap) ◄──┐
//!               ↓                                         │
//!   in ─ pregain² ─► (+) ─► ring[t] ··· ring[t - delay] ──┴─► (+) ─► DC block ─► out
//!   in ─ dry ────────────────────────────────────────────────┘
//! ```
//!
//! A unit with several delay times sums all taps of a channel into one
//! output; the DC blocker state of the channel lives in its last line.

use super::flush_denormal;
use crate::util::ring::DelayRing;

/// Pole of the one-pole DC blocking highpass.
const DC_POLE: f32 = 0.99609375;

#[derive(Debug, Default)]
pub struct DelayLine {
    pub ring: DelayRing,
    damp_state: f32,
    dc_in: f32,
    dc_filtered: f32,
}

impl DelayLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the sample written `delay` samples before `time`, then writes
    /// the damped feedback plus new input at `time`. Returns the tap.
    #[inline]
    pub fn tap(&mut self, time: u16, delay: f32, input: f32, feedback: f32, damp: f32) -> f32 {
        let delayed = self.ring.read(time.wrapping_sub((delay + 0.5) as u16));
        self.damp_state = flush_denormal(damp * self.damp_state + (1.0 - damp) * delayed);
        self.ring.write(time, feedback * self.damp_state + input);
        delayed
    }

    /// `y[n] = x[n] - x[n-1] + 0.996·y[n-1]`
    #[inline]
    pub fn dc_block(&mut self, input: f32) -> f32 {
        self.dc_filtered = flush_denormal(input + (DC_POLE * self.dc_filtered - self.dc_in));
        self.dc_in = input;
        self.dc_filtered
    }

    pub fn reset(&mut self) {
        self.ring.reset();
        self.damp_state = 0.0;
        self.dc_in = 0.0;
        self.dc_filtered = 0.0;
    }
}

/// Normalised delay parameters.
#[derive(Debug, Clone, Copy)]
pub struct DelayParams {
    pub pregain: f32,
    pub dry: f32,
    pub feedback: f32,
    pub damp: f32,
}

impl DelayParams {
    pub fn from_slice(p: &[f32]) -> Self {
        Self {
            pregain: p[0],
            dry: p[1],
            feedback: p[2],
            damp: p[3],
        }
    }
}

/// Delay in samples for a note-tracked line: one octave up halves it.
#[inline]
pub fn track_note(delay: f32, note: u8) -> f32 {
    delay / (f64::from(note) * 0.083333333333).exp2() as f32
}

/// Runs one channel of a delay unit through `lines`, one line per delay
/// time, and returns the DC blocked sum of the dry signal and every tap.
pub fn process_channel(
    lines: &mut [DelayLine],
    delays: &[f32],
    time: u16,
    input: f32,
    params: &DelayParams,
) -> f32 {
    let pregained = params.pregain * params.pregain * input;
    let mut output = params.dry * input;
    for (line, &delay) in lines.iter_mut().zip(delays) {
        output += line.tap(time, delay, pregained, params.feedback, params.damp);
    }
    match lines.last_mut() {
        Some(line) => line.dc_block(output),
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(feedback: f32) -> DelayParams {
        DelayParams {
            pregain: 1.0,
            dry: 0.0,
            feedback,
            damp: 0.0,
        }
    }

    #[test]
    fn impulse_comes_back_after_the_delay() {
        let mut line = [DelayLine::new()];
        let p = params(0.0);
        let mut out = Vec::new();
        for t in 0..20u16 {
            let x = if t == 0 { 1.0 } else { 0.0 };
            out.push(process_channel(&mut line, &[10.0], t, x, &p));
        }
        assert_eq!(out[..10].iter().filter(|v| v.abs() > 0.0).count(), 0);
        assert!(out[10] > 0.99, "impulse should arrive at sample 10, got {}", out[10]);
    }

    #[test]
    fn feedback_repeats_and_decays() {
        let mut line = [DelayLine::new()];
        let p = params(0.5);
        let mut out = Vec::new();
        for t in 0..35u16 {
            let x = if t == 0 { 1.0 } else { 0.0 };
            out.push(process_channel(&mut line, &[10.0], t, x, &p));
        }
        assert!(out[20].abs() > 0.4 && out[20].abs() < 0.6, "echo at half level");
        assert!(out[30].abs() < out[20].abs());
    }

    #[test]
    fn ring_wraps_at_sixteen_bits() {
        let mut line = DelayLine::new();
        line.ring.write(65530, 0.75);
        let tapped = line.tap(4, 10.0, 0.0, 0.0, 0.0);
        assert_eq!(tapped, 0.75);
    }

    #[test]
    fn dc_is_removed() {
        let mut line = DelayLine::new();
        let mut y = 0.0;
        for _ in 0..10_000 {
            y = line.dc_block(1.0);
        }
        assert!(y.abs() < 1e-3, "constant input should decay to zero, got {y}");
    }

    #[test]
    fn octave_up_halves_the_delay() {
        assert!((track_note(1000.0, 12) - 500.0).abs() < 1e-2);
    }
}
