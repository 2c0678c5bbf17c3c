use std::f64::consts::PI;

use crate::SAMPLE_RATE;

/*
State-variable filter
=====================

Chamberlin topology, two integrators in a loop:

    low  += f·band
    high  = in - low - r·band
    band += f·high

with f = frequency² and r = resonance (0 is maximal resonance, 1 is flat).
All three responses come out of the same update; the flag byte picks which
ones are summed into the output:

| flag   | adds   | parameter           |
| ------ | ------ | ------------------- |
| `0x40` | +low   | `lowpass = 1`       |
| `0x20` | +band  | `bandpass = 1`      |
| `0x10` | +high  | `highpass = 1`      |
| `0x08` | -band  | `bandpass = -1`     |
| `0x04` | -high  | `highpass = -1`     |

low + high with the band removed is a notch; low - high is an allpass-ish
phase shifter.

Channel i keeps `low` in state word i and `band` in state word 2 + i.
*/

/// Output mix of a filter unit, as packed into its trailer byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterFlags(pub u8);

impl FilterFlags {
    pub const LOWPASS: u8 = 0x40;
    pub const BANDPASS: u8 = 0x20;
    pub const HIGHPASS: u8 = 0x10;
    pub const NEG_BANDPASS: u8 = 0x08;
    pub const NEG_HIGHPASS: u8 = 0x04;

    /// From the `lowpass` flag and the signed `bandpass` / `highpass`
    /// parameters.
    pub fn new(lowpass: i32, bandpass: i32, highpass: i32) -> Self {
        let mut flags = 0;
        if lowpass == 1 {
            flags |= Self::LOWPASS;
        }
        match bandpass {
            1 => flags |= Self::BANDPASS,
            -1 => flags |= Self::NEG_BANDPASS,
            _ => {}
        }
        match highpass {
            1 => flags |= Self::HIGHPASS,
            -1 => flags |= Self::NEG_HIGHPASS,
            _ => {}
        }
        FilterFlags(flags)
    }

    pub fn lowpass(self) -> i32 {
        i32::from(self.0 & Self::LOWPASS != 0)
    }

    pub fn bandpass(self) -> i32 {
        i32::from(self.0 & Self::BANDPASS != 0) - i32::from(self.0 & Self::NEG_BANDPASS != 0)
    }

    pub fn highpass(self) -> i32 {
        i32::from(self.0 & Self::HIGHPASS != 0) - i32::from(self.0 & Self::NEG_HIGHPASS != 0)
    }
}

/// One sample of the state-variable filter for one channel.
#[inline]
pub fn svf(
    low: &mut f32,
    band: &mut f32,
    input: f32,
    frequency: f32,
    resonance: f32,
    flags: FilterFlags,
) -> f32 {
    let f = frequency * frequency;
    *low += f * *band;
    let high = input - *low - resonance * *band;
    *band += f * high;

    let mut output = 0.0;
    if flags.0 & FilterFlags::LOWPASS != 0 {
        output += *low;
    }
    if flags.0 & FilterFlags::BANDPASS != 0 {
        output += *band;
    }
    if flags.0 & FilterFlags::HIGHPASS != 0 {
        output += high;
    }
    if flags.0 & FilterFlags::NEG_BANDPASS != 0 {
        output -= *band;
    }
    if flags.0 & FilterFlags::NEG_HIGHPASS != 0 {
        output -= high;
    }
    output
}

/// Peaking EQ coefficients, normalised so that `a0 = 1`.
///
/// ```text
///   frequency 0..1 → 32 Hz..16 kHz, exponentially
///   bandwidth 0..1 → Q 0.1..10
///   gain      0..1 → -12..+12 dB
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BellCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a2: f32,
}

impl BellCoefficients {
    pub fn new(frequency: f32, bandwidth: f32, gain: f32) -> Self {
        let hz = 32.0 * (16000.0f64 / 32.0).powf(f64::from(frequency));
        let omega = 2.0 * PI * hz / f64::from(SAMPLE_RATE);
        let q = f64::from(bandwidth * 9.9) + 0.1;
        let alpha = (omega.sin() / (2.0 * q)) as f32;
        let db = f64::from(gain * 24.0 - 12.0);
        let a = 10f64.powf(db / 20.0) as f32;
        let den = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / den,
            b1: (-2.0 * omega.cos() as f32) / den,
            b2: (1.0 - alpha * a) / den,
            a2: (1.0 - alpha / a) / den,
        }
    }

    /// Transposed direct form II. For a peaking EQ `a1 == b1`, which lets the
    /// two state words share the `b1` term.
    #[inline]
    pub fn process(&self, z1: &mut f32, z2: &mut f32, input: f32) -> f32 {
        let output = self.b0 * input + *z1;
        *z1 = self.b1 * input - self.b1 * output + *z2;
        *z2 = self.b2 * input - self.a2 * output;
        output
    }
}
