//! Oscillators
//!
//! One phase accumulator per channel and unison copy, advanced each sample by
//!
//! ```text
//!   2^((64·(2·transpose - 1) + detune + note) / 12) · 0.000092696138
//! ```
//!
//! which puts note 69 at 220 Hz, an octave below MIDI pitch. LFOs ignore the note and use a much
//! smaller constant. The accumulated phase is read through one of five
//! waveforms, selected by the flag byte the encoder packs:
//!
//! | flag   | waveform | `color` means                       |
//! | ------ | -------- | ----------------------------------- |
//! | `0x40` | sine     | duty: sine squeezed into `[0,c)`    |
//! | `0x20` | trisaw   | peak position: 0 saw, 0.5 triangle |
//! | `0x10` | pulse    | pulse width                         |
//! | `0x04` | gate     | low byte of a 16-step on/off mask   |
//! | `0x80` | sample   | index into the sample-offset table  |
//!
//! plus `0x08` for LFO mode and the unison count (0..=3) in the low two bits.

use std::f64::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::distortion::waveshape;

const NOTE_SCALE: f64 = 0.000092696138;
const LFO_SCALE: f64 = 0.000038;
const SEMITONE: f64 = 0.083333333333;
/// Sample playback rate relative to the phase accumulator.
const SAMPLE_RATE_SCALE: f32 = 84.28074964676522;
const GATE_SMOOTHING: f32 = 0.99609375;
const UNISON_PHASE_SHIFT: f32 = 0.08333333;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Trisaw,
    Pulse,
    Gate,
    Sample,
}

impl Waveform {
    /// From the `type` parameter of an oscillator unit.
    pub fn from_param(value: i32) -> Option<Self> {
        match value {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::Trisaw),
            2 => Some(Waveform::Pulse),
            3 => Some(Waveform::Gate),
            4 => Some(Waveform::Sample),
            _ => None,
        }
    }

    pub fn to_param(self) -> i32 {
        self as i32
    }
}

/// The oscillator's trailing flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillatorFlags(pub u8);

impl OscillatorFlags {
    pub const SAMPLE: u8 = 0x80;
    pub const SINE: u8 = 0x40;
    pub const TRISAW: u8 = 0x20;
    pub const PULSE: u8 = 0x10;
    pub const LFO: u8 = 0x08;
    pub const GATE: u8 = 0x04;
    pub const UNISON_MASK: u8 = 0x03;

    pub fn new(waveform: Option<Waveform>, lfo: bool, unison: u8) -> Self {
        let mut flags = match waveform {
            Some(Waveform::Sine) => Self::SINE,
            Some(Waveform::Trisaw) => Self::TRISAW,
            Some(Waveform::Pulse) => Self::PULSE,
            Some(Waveform::Gate) => Self::GATE,
            Some(Waveform::Sample) => Self::SAMPLE,
            None => 0,
        };
        if lfo {
            flags |= Self::LFO;
        }
        OscillatorFlags(flags.wrapping_add(unison))
    }

    /// Waveform bit with the highest priority wins, as in rendering.
    pub fn waveform(self) -> Option<Waveform> {
        let f = self.0;
        if f & Self::SAMPLE != 0 {
            Some(Waveform::Sample)
        } else if f & Self::SINE != 0 {
            Some(Waveform::Sine)
        } else if f & Self::TRISAW != 0 {
            Some(Waveform::Trisaw)
        } else if f & Self::PULSE != 0 {
            Some(Waveform::Pulse)
        } else if f & Self::GATE != 0 {
            Some(Waveform::Gate)
        } else {
            None
        }
    }

    pub fn lfo(self) -> bool {
        self.0 & Self::LFO != 0
    }

    pub fn unison(self) -> u8 {
        self.0 & Self::UNISON_MASK
    }
}

/// Where a sample oscillator finds its waveform in the sample bank.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SampleOffset {
    pub start: u32,
    pub loop_start: u16,
    pub loop_length: u16,
}

/// A sample oscillator's view of the bank.
#[derive(Debug, Clone, Copy)]
pub struct Sampler<'a> {
    pub offset: SampleOffset,
    pub bank: &'a [i16],
}

impl Sampler<'_> {
    /// Reads the bank at `phase`, looping the `[loop_start, loop_start +
    /// loop_length)` region. Reads outside the bank are silent.
    fn read(&self, phase: f32) -> f32 {
        let mut index = (phase * SAMPLE_RATE_SCALE + 0.5) as i64;
        let loop_start = i64::from(self.offset.loop_start);
        let loop_length = i64::from(self.offset.loop_length.max(1));
        if index >= loop_start {
            index = (index - loop_start) % loop_length + loop_start;
        }
        index += i64::from(self.offset.start);
        usize::try_from(index)
            .ok()
            .and_then(|i| self.bank.get(i))
            .map_or(0.0, |&s| f32::from(s) / 32767.0)
    }
}

/// Normalised oscillator parameters.
#[derive(Debug, Clone, Copy)]
pub struct OscillatorParams {
    pub transpose: f32,
    pub detune: f32,
    pub phase: f32,
    pub color: f32,
    pub shape: f32,
    pub gain: f32,
}

impl OscillatorParams {
    pub fn from_slice(p: &[f32]) -> Self {
        Self {
            transpose: p[0],
            detune: p[1],
            phase: p[2],
            color: p[3],
            shape: p[4],
            gain: p[5],
        }
    }
}

/// Everything besides the parameters that one oscillator sample depends on.
#[derive(Debug, Clone, Copy)]
pub struct OscillatorInput<'a> {
    pub flags: OscillatorFlags,
    pub note: u8,
    /// Accumulated `frequency` port modulation, added to the phase increment.
    pub frequency: f32,
    /// Raw color and shape bytes; together the 16-step gate mask.
    pub gate_mask: u16,
    pub sampler: Option<Sampler<'a>>,
}

/// Renders one sample for `channels` channels. Channel 0 comes first in the
/// returned array.
pub fn next_sample(
    state: &mut [f32; 8],
    params: &OscillatorParams,
    input: &OscillatorInput<'_>,
    channels: usize,
) -> [f32; 2] {
    let flags = input.flags;
    let lfo = flags.lfo();
    let unison = usize::from(flags.unison());
    // the unison phase offsets accumulate across channels
    let mut phase_offset = params.phase;
    let mut detune_stereo = params.detune * 2.0 - 1.0;
    let mut out = [0.0f32; 2];

    for (i, slot) in out.iter_mut().enumerate().take(channels) {
        let mut detune = detune_stereo;
        let mut output = 0.0f32;
        for j in 0..=unison {
            let var = i + j * 2;
            let mut pitch = f64::from(64.0 * (params.transpose * 2.0 - 1.0) + detune);
            if !lfo {
                pitch += f64::from(input.note);
            }
            let mut omega = (pitch * SEMITONE).exp2();
            omega *= if lfo { LFO_SCALE } else { NOTE_SCALE };
            omega += f64::from(input.frequency);
            state[var] += omega as f32;

            let amplitude = match (flags.waveform(), input.sampler) {
                (Some(Waveform::Sample), Some(sampler)) => sampler.read(state[var] + phase_offset),
                (Some(Waveform::Sample), None) => 0.0,
                (waveform, _) => {
                    state[var] -= ((state[var] + 1.0) as i32 - 1) as f32;
                    let mut phase = state[var] + phase_offset;
                    phase -= (phase as i32) as f32;
                    let mut color = params.color;
                    match waveform {
                        Some(Waveform::Sine) => {
                            if phase < color {
                                (TAU * f64::from(phase / color)).sin() as f32
                            } else {
                                0.0
                            }
                        }
                        Some(Waveform::Trisaw) => {
                            if phase >= color {
                                phase = 1.0 - phase;
                                color = 1.0 - color;
                            }
                            phase / color * 2.0 - 1.0
                        }
                        Some(Waveform::Pulse) => {
                            if phase >= color {
                                -1.0
                            } else {
                                1.0
                            }
                        }
                        Some(Waveform::Gate) => {
                            let step = ((phase * 16.0 + 0.5) as i32) & 15;
                            let bit = f32::from((input.gate_mask >> step) as u8 & 1);
                            let smoothed = bit + GATE_SMOOTHING * (state[4 + i] - bit);
                            state[4 + i] = smoothed;
                            smoothed
                        }
                        _ => 0.0,
                    }
                }
            };

            if flags.waveform() == Some(Waveform::Gate) {
                output += amplitude * params.gain;
            } else {
                output += waveshape(amplitude, params.shape) * params.gain;
            }
            if j < unison {
                phase_offset += UNISON_PHASE_SHIFT;
            }
            detune = -detune * 0.5;
        }
        *slot = output;
        detune_stereo = -detune_stereo;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(note: u8) -> (OscillatorParams, OscillatorInput<'static>) {
        (
            OscillatorParams {
                transpose: 0.5,
                detune: 0.5,
                phase: 0.0,
                color: 1.0,
                shape: 0.5,
                gain: 1.0,
            },
            OscillatorInput {
                flags: OscillatorFlags::new(Some(Waveform::Sine), false, 0),
                note,
                frequency: 0.0,
                gate_mask: 0,
                sampler: None,
            },
        )
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
    }

    #[test]
    fn note_69_is_close_to_220_hz() {
        let (params, input) = sine(69);
        let mut state = [0.0; 8];
        let samples: Vec<f32> = (0..44100)
            .map(|_| next_sample(&mut state, &params, &input, 1)[0])
            .collect();
        let hz = zero_crossings(&samples);
        assert!((218..=222).contains(&hz), "expected ~220 Hz, got {hz}");
    }

    #[test]
    fn octave_doubles_frequency() {
        let (params, mut input) = sine(57);
        let mut state = [0.0; 8];
        let low: Vec<f32> = (0..44100)
            .map(|_| next_sample(&mut state, &params, &input, 1)[0])
            .collect();
        input.note = 69;
        state = [0.0; 8];
        let high: Vec<f32> = (0..44100)
            .map(|_| next_sample(&mut state, &params, &input, 1)[0])
            .collect();
        let ratio = zero_crossings(&high) as f32 / zero_crossings(&low) as f32;
        assert!((ratio - 2.0).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn pulse_is_bipolar_and_bounded() {
        let (mut params, mut input) = sine(60);
        params.color = 0.5;
        input.flags = OscillatorFlags::new(Some(Waveform::Pulse), false, 2);
        let mut state = [0.0; 8];
        for _ in 0..2000 {
            let [l, _] = next_sample(&mut state, &params, &input, 1);
            assert!(l.abs() <= 3.0 + 1e-5, "three unison copies at unit gain");
        }
    }

    #[test]
    fn sample_playback_loops() {
        let bank: Vec<i16> = (0..16).map(|i| i * 1000).collect();
        let (params, mut input) = sine(60);
        input.flags = OscillatorFlags::new(Some(Waveform::Sample), false, 0);
        input.sampler = Some(Sampler {
            offset: SampleOffset {
                start: 4,
                loop_start: 2,
                loop_length: 4,
            },
            bank: &bank,
        });
        let sampler = input.sampler.as_ref().map(|s| *s);
        let s = sampler.expect("sampler");
        assert_eq!(s.read(0.0), 4000.0 / 32767.0);
        // index 7 → 2 + (7 - 2) % 4 = 3, then +4
        assert_eq!(s.read(7.0 / SAMPLE_RATE_SCALE), 7000.0 / 32767.0);
        let mut state = [0.0; 8];
        let [v, _] = next_sample(&mut state, &params, &input, 1);
        assert!(v.abs() <= 1.0);
    }

    #[test]
    fn flags_round_trip() {
        let f = OscillatorFlags::new(Some(Waveform::Gate), true, 3);
        assert_eq!(f.0, 0x04 | 0x08 | 3);
        assert_eq!(f.waveform(), Some(Waveform::Gate));
        assert!(f.lfo());
        assert_eq!(f.unison(), 3);
    }
}
