//! One sample of the stack machine.
//!
//! Every voice runs its instrument's commands from the top. Each unit reads
//! its parameter bytes, adds whatever modulation arrived in its ports since
//! the last sample, and then works on the signal stack. Opcodes are the
//! catalogue ids, i.e. byte code encoded with [`AllFeatures`].
//!
//! Stereo signals sit on the stack as two cells; for units that transform
//! the stack in place, the top cell is channel 0.
//!
//! [`AllFeatures`]: crate::AllFeatures

use super::voice::UnitSlot;
use super::SynthState;
use crate::catalogue::UnitKind;
use crate::dsp::compressor::{self, CompressorParams};
use crate::dsp::delay::{self, DelayParams};
use crate::dsp::distortion::{clip, crush, db_gain, hold, waveshape};
use crate::dsp::envelope::{self, EnvelopeParams};
use crate::dsp::filter::{svf, BellCoefficients, FilterFlags};
use crate::dsp::oscillator::{
    self, OscillatorFlags, OscillatorInput, OscillatorParams, Sampler, Waveform,
};
use crate::dsp::{flush_denormal, speed};
use crate::encode::{EncodedPatch, SendAddress};
use crate::error::SynthError;
use crate::{MAX_STACK, MAX_UNITS, MAX_VOICES, SYNC_INTERVAL};

/// Most delay lines one channel of a delay unit can address.
const MAX_TAPS: usize = 128;

/// What one sample produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Frame {
    pub left: f32,
    pub right: f32,
    /// Song time added by `speed` units on top of the regular one sample.
    pub extra_time: i32,
}

/// Where the interpreter is in the byte code.
struct Cursor {
    command: usize,
    value: usize,
    voice: usize,
    unit: usize,
    delay_line: usize,
}

pub(super) fn render_sample(
    state: &mut SynthState,
    code: &EncodedPatch,
    samples: &[i16],
) -> Result<Frame, SynthError> {
    if code.num_voices > MAX_VOICES {
        return Err(SynthError::TooManyVoices {
            voices: code.num_voices,
        });
    }
    let mut at = Cursor {
        command: 0,
        value: 0,
        voice: 0,
        unit: 0,
        delay_line: 0,
    };
    let (mut instr_command, mut instr_value) = (0, 0);
    let mut extra_time = 0;
    let mut remaining = code.num_voices;
    state.stack.clear();

    while remaining > 0 {
        let command = *code
            .commands
            .get(at.command)
            .ok_or(SynthError::CommandsEnded)?;
        at.command += 1;
        if command >> 1 == 0 {
            if !state.stack.is_empty() {
                return Err(SynthError::StackImbalance {
                    voice: at.voice,
                    depth: state.stack.depth(),
                });
            }
            remaining -= 1;
            if remaining > 0 {
                at.voice += 1;
                at.unit = 0;
            }
            if code.polyphony_bitmask & (1 << remaining) != 0 {
                at.command = instr_command;
                at.value = instr_value;
            } else {
                instr_command = at.command;
                instr_value = at.value;
            }
            continue;
        }
        extra_time += execute(state, code, samples, &mut at, command)?;
        at.unit += 1;
    }

    let (left, right) = (state.outputs[0], state.outputs[1]);
    if left.is_nan() || right.is_nan() {
        return Err(SynthError::NotANumber);
    }
    state.outputs[0] = 0.0;
    state.outputs[1] = 0.0;
    Ok(Frame {
        left,
        right,
        extra_time,
    })
}

/// Runs one unit and returns the song time it added.
fn execute(
    state: &mut SynthState,
    code: &EncodedPatch,
    samples: &[i16],
    at: &mut Cursor,
    command: u8,
) -> Result<i32, SynthError> {
    let (voice, unit) = (at.voice, at.unit);
    let kind =
        UnitKind::from_id(command >> 1).ok_or(SynthError::InvalidOpcode { opcode: command })?;
    if unit >= MAX_UNITS {
        return Err(SynthError::TooManyUnits { voice });
    }
    let stereo = command & 1 == 1;
    let channels = if stereo { 2 } else { 1 };

    let count = kind.transform_count();
    let operand_end = at.value + count;
    let trailer_end = operand_end + kind.trailer_len();
    let operands = code
        .values
        .get(at.value..operand_end)
        .ok_or(SynthError::ValuesEnded)?;
    let trailer = code
        .values
        .get(operand_end..trailer_end)
        .ok_or(SynthError::ValuesEnded)?;
    at.value = trailer_end;

    let send_address = match kind {
        UnitKind::Send => u16::from_le_bytes([trailer[0], trailer[1]]),
        _ => 0,
    };
    let usage = kind.stack_use(stereo, send_address & SendAddress::POP != 0);
    if state.stack.depth() < usage.inputs {
        return Err(SynthError::StackUnderflow { voice, unit });
    }
    if state.stack.depth() as isize + usage.change() > MAX_STACK as isize {
        return Err(SynthError::StackOverflow { voice, unit });
    }

    let mut params = [0.0f32; 8];
    {
        let slot = &mut state.voices[voice].units[unit];
        for (i, &byte) in operands.iter().enumerate() {
            params[i] = f32::from(byte) / 128.0 + slot.ports[i];
            slot.ports[i] = 0.0;
        }
    }
    let invalid = SynthError::InvalidOperand { voice, unit };
    let stack = &mut state.stack;
    let mut extra_time = 0;

    match kind {
        UnitKind::Add | UnitKind::Mul => {
            let op = |a: f32, b: f32| if kind == UnitKind::Add { a + b } else { a * b };
            for i in 0..channels {
                let other = stack.peek(i + channels);
                stack.update(i, |x| op(x, other));
            }
        }
        UnitKind::Addp | UnitKind::Mulp => {
            let op = |a: f32, b: f32| if kind == UnitKind::Addp { a + b } else { a * b };
            for i in 0..channels {
                let top = stack.peek(i);
                stack.update(i + channels, |x| op(x, top));
            }
            stack.discard(channels);
        }
        UnitKind::Xch => {
            for i in 0..channels {
                stack.swap(i, i + channels);
            }
        }
        UnitKind::Push => {
            let copies = [stack.peek(channels - 1), stack.peek(0)];
            for &x in &copies[2 - channels..] {
                stack.push(x);
            }
        }
        UnitKind::Pop => stack.discard(channels),
        UnitKind::Loadval => {
            for _ in 0..channels {
                stack.push(params[0] * 2.0 - 1.0);
            }
        }
        UnitKind::Loadnote => {
            let note = f32::from(state.voices[voice].note) / 64.0 - 1.0;
            for _ in 0..channels {
                stack.push(note);
            }
        }
        UnitKind::Receive => {
            let slot = &mut state.voices[voice].units[unit];
            for i in (0..channels).rev() {
                stack.push(slot.ports[i]);
                slot.ports[i] = 0.0;
            }
        }
        UnitKind::Distort => {
            for i in 0..channels {
                stack.update(i, |x| waveshape(x, params[0]));
            }
        }
        UnitKind::Gain => {
            for i in 0..channels {
                stack.update(i, |x| x * params[0]);
            }
        }
        UnitKind::Invgain => {
            if params[0] == 0.0 {
                return Err(SynthError::DivideByZero { voice, unit });
            }
            for i in 0..channels {
                stack.update(i, |x| x / params[0]);
            }
        }
        UnitKind::Dbgain => {
            let gain = db_gain(params[0]);
            for i in 0..channels {
                stack.update(i, |x| x * gain);
            }
        }
        UnitKind::Clip => {
            for i in 0..channels {
                stack.update(i, clip);
            }
        }
        UnitKind::Crush => {
            for i in 0..channels {
                stack.update(i, |x| crush(x, params[0]));
            }
        }
        UnitKind::Hold => {
            let slot = &mut state.voices[voice].units[unit];
            for i in 0..channels {
                let (mut phase, mut held) = (slot.state[i], slot.state[2 + i]);
                let out = hold(&mut phase, &mut held, stack.peek(i), params[0]);
                slot.state[i] = phase;
                slot.state[2 + i] = held;
                stack.set(i, out);
            }
        }
        UnitKind::Pan => {
            if !stereo {
                stack.push(stack.peek(0));
            }
            stack.update(1, |x| x * params[0]);
            stack.update(0, |x| x * (1.0 - params[0]));
        }
        UnitKind::Out => {
            for i in 0..channels {
                state.outputs[i] += params[0] * stack.peek(i);
            }
            stack.discard(channels);
        }
        UnitKind::Outaux => {
            for i in 0..channels {
                state.outputs[i] += params[0] * stack.peek(i);
                state.outputs[2 + i] += params[1] * stack.peek(i);
            }
            stack.discard(channels);
        }
        UnitKind::Aux => {
            let channel = usize::from(trailer[0]);
            if channel + channels > state.outputs.len() {
                return Err(invalid);
            }
            for i in 0..channels {
                state.outputs[channel + i] += params[0] * stack.peek(i);
            }
            stack.discard(channels);
        }
        UnitKind::In => {
            let channel = usize::from(trailer[0]);
            if channel + channels > state.outputs.len() {
                return Err(invalid);
            }
            for i in (0..channels).rev() {
                stack.push(state.outputs[channel + i]);
                state.outputs[channel + i] = 0.0;
            }
        }
        UnitKind::Speed => {
            let slot = &mut state.voices[voice].units[unit];
            extra_time = speed(&mut slot.state[0], stack.peek(0));
            stack.discard(1);
        }
        UnitKind::Sync => {
            if state.global_time % SYNC_INTERVAL == 0 {
                if let Some(syncs) = state.syncs.as_mut() {
                    syncs.push(stack.peek(0));
                }
            }
        }
        UnitKind::Envelope => {
            let v = &mut state.voices[voice];
            let gate = v.sustain;
            let params = EnvelopeParams::from_slice(&params);
            let out = envelope::next_sample(&mut v.units[unit].state, gate, &params);
            for _ in 0..channels {
                stack.push(out);
            }
        }
        UnitKind::Noise => {
            for _ in 0..channels {
                let x = waveshape(state.rng.next_f32(), params[0]) * params[1];
                stack.push(x);
            }
        }
        UnitKind::Oscillator => {
            let flags = OscillatorFlags(trailer[0]);
            let sampler = if flags.waveform() == Some(Waveform::Sample) {
                let offset = *code
                    .sample_offsets
                    .get(usize::from(operands[3]))
                    .ok_or(invalid)?;
                if offset.loop_length == 0 {
                    return Err(SynthError::DivideByZero { voice, unit });
                }
                Some(Sampler { offset, bank: samples })
            } else {
                None
            };
            let v = &mut state.voices[voice];
            let slot = &mut v.units[unit];
            let input = OscillatorInput {
                flags,
                note: v.note,
                frequency: slot.ports[6],
                gate_mask: u16::from(operands[3]) | u16::from(operands[4]) << 8,
                sampler,
            };
            slot.ports[6] = 0.0;
            let out = oscillator::next_sample(
                &mut slot.state,
                &OscillatorParams::from_slice(&params),
                &input,
                channels,
            );
            for &x in &out[..channels] {
                stack.push(x);
            }
        }
        UnitKind::Filter => {
            let flags = FilterFlags(trailer[0]);
            let slot = &mut state.voices[voice].units[unit];
            for i in 0..channels {
                let (mut low, mut band) = (slot.state[i], slot.state[2 + i]);
                let out = svf(&mut low, &mut band, stack.peek(i), params[0], params[1], flags);
                slot.state[i] = flush_denormal(low);
                slot.state[2 + i] = flush_denormal(band);
                stack.set(i, out);
            }
        }
        UnitKind::Belleq => {
            let bell = BellCoefficients::new(params[0], params[1], params[2]);
            let slot = &mut state.voices[voice].units[unit];
            for i in 0..channels {
                let (mut z1, mut z2) = (slot.state[i], slot.state[2 + i]);
                let out = bell.process(&mut z1, &mut z2, stack.peek(i));
                slot.state[i] = flush_denormal(z1);
                slot.state[2 + i] = flush_denormal(z2);
                stack.set(i, out);
            }
        }
        UnitKind::Compressor => {
            let cp = CompressorParams::from_slice(&params);
            if cp.invgain == 0.0 {
                return Err(SynthError::DivideByZero { voice, unit });
            }
            let power: f32 = (0..channels).map(|i| stack.peek(i) * stack.peek(i)).sum();
            let slot = &mut state.voices[voice].units[unit];
            let gain = compressor::gain(&mut slot.state[0], power, &cp) / cp.invgain;
            for _ in 0..channels {
                stack.push(gain);
            }
        }
        UnitKind::Delay => {
            let dp = DelayParams::from_slice(&params);
            let mut index = usize::from(trailer[0]);
            let taps = usize::from(trailer[1]).div_ceil(2);
            let tracking = trailer[1] & 1 == 0;
            let v = &mut state.voices[voice];
            let modulation = v.units[unit].ports[4] * 32767.0;
            v.units[unit].ports[4] = 0.0;
            let time = state.global_time as u16;
            let mut delays = [0.0f32; MAX_TAPS];
            // channel 0 is the lower of the two cells
            for ch in 0..channels {
                let times = code.delay_times.get(index..index + taps).ok_or(invalid)?;
                let lines = state
                    .delay_lines
                    .get_mut(at.delay_line..at.delay_line + taps)
                    .ok_or(invalid)?;
                for (d, &t) in delays.iter_mut().zip(times) {
                    let base = f32::from(t) + modulation;
                    *d = if tracking { delay::track_note(base, v.note) } else { base };
                }
                let offset = channels - 1 - ch;
                let input = stack.peek(offset);
                let out = delay::process_channel(lines, &delays[..taps], time, input, &dp);
                stack.set(offset, out);
                index += taps;
                at.delay_line += taps;
            }
        }
        UnitKind::Send => {
            let amount = params[0] * 2.0 - 1.0;
            if let Some(target) = SendAddress::decode(send_address) {
                let target_voice = target.voice.unwrap_or(voice);
                let slot: Option<&mut UnitSlot> = state
                    .voices
                    .get_mut(target_voice)
                    .and_then(|v| v.units.get_mut(target.unit));
                if let Some(slot) = slot {
                    for i in 0..channels {
                        if let Some(port) = slot.ports.get_mut(target.port + i) {
                            *port += stack.peek(i) * amount;
                        }
                    }
                }
            }
            if send_address & SendAddress::POP != 0 {
                stack.discard(channels);
            }
        }
    }
    Ok(extra_time)
}
