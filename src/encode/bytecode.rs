use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::delay_table::{self, DelayTable};
use super::features::FeatureSet;
use crate::catalogue::UnitKind;
use crate::dsp::filter::FilterFlags;
use crate::dsp::oscillator::{OscillatorFlags, SampleOffset, Waveform};
use crate::error::EncodeError;
use crate::{Patch, Unit, MAX_COMMANDS, MAX_UNITS, MAX_VALUES, MAX_VOICES};

/// A patch flattened into the form the stack machine executes.
///
/// `commands` holds one byte per unit (`opcode << 1 | stereo`) and a 0 at
/// the end of each instrument. The renderer runs an instrument's commands
/// once per voice, rewinding as long as the polyphony mask says the next
/// voice belongs to the same instrument. `values` holds the parameter bytes
/// of each unit followed by its trailer.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedPatch {
    pub commands: Vec<u8>,
    pub values: Vec<u8>,
    pub delay_times: Vec<u16>,
    pub sample_offsets: Vec<SampleOffset>,
    /// Bit `num_voices - 1 - v` is set when voice `v + 1` plays the same
    /// instrument as voice `v`.
    pub polyphony_bitmask: u32,
    pub num_voices: usize,
    /// Delay lines consumed per sample, over all voices.
    pub num_delay_lines: usize,
}

impl EncodedPatch {
    /// Voices of each instrument, read back from the polyphony mask.
    pub fn voices_per_instrument(&self) -> Vec<usize> {
        self.instrument_voices().collect()
    }

    /// [`voices_per_instrument`](Self::voices_per_instrument) without
    /// allocating.
    pub fn instrument_voices(&self) -> impl Iterator<Item = usize> + '_ {
        let mut count = 0;
        (0..self.num_voices).filter_map(move |v| {
            count += 1;
            let bit = self.num_voices - 1 - v;
            if bit >= 32 || self.polyphony_bitmask & (1 << bit) == 0 {
                Some(std::mem::take(&mut count))
            } else {
                None
            }
        })
    }
}

/// Where a `send` writes, packed into 16 bits.
///
/// ```text
///   15      14..10        9..4          3     2..0
///   global  voice (abs)   unit + 1      pop   port
/// ```
///
/// Global addresses carry an extra offset of `0x10`, so the renderer
/// subtracts `0x8010` before splitting the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAddress {
    /// Absolute voice for global sends, `None` for the sending voice.
    pub voice: Option<usize>,
    pub unit: usize,
    pub port: usize,
    pub pop: bool,
}

impl SendAddress {
    pub const GLOBAL: u16 = 0x8000;
    pub const POP: u16 = 0x8;
    pub const VOICE_STRIDE: u16 = 0x400;
    /// Written for sends whose target does not exist: the last port of one
    /// of the last unit slots of the last voice.
    pub const MISSING: u16 = 0xFFF7;
    const GLOBAL_BIAS: u16 = 0x8010;
    const UNIT_MASK: u16 = 0x3F0;
    const PORT_MASK: u16 = 0x7;

    pub fn decode(addr: u16) -> Option<Self> {
        let pop = addr & Self::POP != 0;
        let port = usize::from(addr & Self::PORT_MASK);
        let (voice, rest) = if addr & Self::GLOBAL != 0 {
            let rest = addr.wrapping_sub(Self::GLOBAL_BIAS);
            (Some(usize::from(rest >> 10)), rest)
        } else {
            (None, addr)
        };
        let unit = usize::from((rest & Self::UNIT_MASK) >> 4).checked_sub(1)?;
        Some(Self { voice, unit, port, pop })
    }

    pub fn is_missing(addr: u16) -> bool {
        addr | Self::POP == Self::MISSING | Self::POP
    }

    fn local_label(unit_no: usize) -> u16 {
        ((unit_no as u16) + 1) << 4
    }

    fn global_label(unit_no: usize, first_voice: usize) -> u16 {
        Self::local_label(unit_no) + 16 + (first_voice as u16) * 1024
    }
}

/// Mask with `num_voices - 1` ones followed by a zero per instrument.
pub fn polyphony_bitmask(patch: &Patch) -> u32 {
    let mut mask = 0u32;
    for instr in patch.iter() {
        for _ in 1..instr.num_voices {
            mask = (mask << 1) | 1;
        }
        mask <<= 1;
    }
    mask
}

struct Builder<'a, F> {
    patch: &'a Patch,
    features: &'a F,
    delays: DelayTable,
    out: EncodedPatch,
    sample_index: HashMap<SampleOffset, usize>,
    local_addrs: HashMap<i32, u16>,
    local_fixups: HashMap<i32, Vec<usize>>,
    global_addrs: HashMap<i32, u16>,
    global_fixups: HashMap<i32, Vec<usize>>,
    voice_no: usize,
    unit_no: usize,
}

/// Encodes `patch` for a renderer with the given features. `bpm` converts
/// beat-synced delay times to samples.
pub fn encode<F: FeatureSet>(
    patch: &Patch,
    features: &F,
    bpm: i32,
) -> Result<EncodedPatch, EncodeError> {
    let total = patch.num_voices();
    if total > MAX_VOICES {
        return Err(EncodeError::TooManyVoices { total });
    }
    if let Some(id) = patch.duplicate_id() {
        return Err(EncodeError::DuplicateUnitId { id });
    }
    let mut b = Builder {
        patch,
        features,
        delays: delay_table::construct(patch, bpm),
        out: EncodedPatch {
            polyphony_bitmask: polyphony_bitmask(patch),
            num_voices: total,
            ..EncodedPatch::default()
        },
        sample_index: HashMap::new(),
        local_addrs: HashMap::new(),
        local_fixups: HashMap::new(),
        global_addrs: HashMap::new(),
        global_fixups: HashMap::new(),
        voice_no: 0,
        unit_no: 0,
    };
    b.out.delay_times = std::mem::take(&mut b.delays.times);

    for (i, instr) in patch.iter().enumerate() {
        if instr.num_voices < 1 {
            return Err(EncodeError::ZeroVoices { instrument: i });
        }
        let mut lines_per_voice = 0;
        for (u, unit) in instr.units.iter().enumerate() {
            if !unit.is_active() {
                continue;
            }
            let kind = unit.kind().ok_or_else(|| EncodeError::UnknownUnitType {
                instrument: i,
                unit: u,
                name: unit.unit_type.clone(),
            })?;
            let opcode = features
                .opcode(kind)
                .ok_or(EncodeError::UnsupportedUnit { kind })?;
            if kind == UnitKind::Delay {
                if !delay_table::has_delay_lines(unit) {
                    continue;
                }
                lines_per_voice += crate::patch::delay_lines_of(unit);
            }
            if unit.id != 0 {
                b.label(unit.id);
            }
            b.unit(i, u, unit, kind, opcode)?;
            if b.unit_no > MAX_UNITS {
                return Err(EncodeError::TooManyUnits {
                    instrument: i,
                    count: b.unit_no,
                });
            }
        }
        b.out.num_delay_lines += lines_per_voice * instr.num_voices;
        b.finish_instrument(instr.num_voices);
    }
    let leftovers: Vec<usize> = b.global_fixups.drain().flat_map(|(_, p)| p).collect();
    b.point_at_missing(&leftovers);

    let out = b.out;
    check_capacity(&out)?;
    for warning in patch.warnings() {
        log::warn!("{warning}");
    }
    log::debug!(
        "encoded {} voices: {} commands, {} values, {} delay times, {} samples",
        out.num_voices,
        out.commands.len(),
        out.values.len(),
        out.delay_times.len(),
        out.sample_offsets.len()
    );
    Ok(out)
}

/// Byte code streams must fit the interpreter's fixed buffers.
fn check_capacity(out: &EncodedPatch) -> Result<(), EncodeError> {
    if out.commands.len() > MAX_COMMANDS {
        return Err(EncodeError::CapacityExceeded {
            stream: "command",
            len: out.commands.len(),
            cap: MAX_COMMANDS,
        });
    }
    if out.values.len() > MAX_VALUES {
        return Err(EncodeError::CapacityExceeded {
            stream: "value",
            len: out.values.len(),
            cap: MAX_VALUES,
        });
    }
    Ok(())
}

impl<F: FeatureSet> Builder<'_, F> {
    fn op(&mut self, opcode: u8, unit: &Unit) {
        self.out.commands.push(opcode << 1 | u8::from(unit.is_stereo()));
        self.unit_no += 1;
    }

    fn operand(&mut self, value: i32) {
        self.out.values.push(value.clamp(0, 255) as u8);
    }

    fn param_operands(&mut self, unit: &Unit, kind: UnitKind) {
        for param in kind.transformed_params() {
            self.operand(unit.param(param.name));
        }
    }

    fn unit(
        &mut self,
        instrument: usize,
        index: usize,
        unit: &Unit,
        kind: UnitKind,
        opcode: u8,
    ) -> Result<(), EncodeError> {
        match kind {
            UnitKind::Oscillator => {
                let waveform = Waveform::from_param(unit.param("type"));
                let color = if waveform == Some(Waveform::Sample) {
                    self.sample_index(unit)? as i32
                } else {
                    unit.param("color")
                };
                let unison = unit.param("unison").clamp(0, 3) as u8;
                let flags = OscillatorFlags::new(waveform, unit.param("lfo") == 1, unison);
                self.op(opcode, unit);
                for name in ["transpose", "detune", "phase"] {
                    self.operand(unit.param(name));
                }
                self.operand(color);
                for name in ["shape", "gain"] {
                    self.operand(unit.param(name));
                }
                self.out.values.push(flags.0);
            }
            UnitKind::Delay => {
                let lines = crate::patch::delay_lines_of(unit);
                let count = if unit.is_stereo() { lines / 2 } else { lines };
                let table_index = self.delays.indices[instrument][index];
                if table_index > 255 {
                    return Err(EncodeError::DelayTableTooLarge { index: table_index });
                }
                // odd counts mark tracking off, so a byte holds 128 lines at most
                let tracking = (unit.param("notetracking") & 1) as usize;
                let taps = u8::try_from(count * 2 - 1 + tracking).map_err(|_| {
                    EncodeError::TooManyDelayLines {
                        instrument,
                        unit: index,
                        count,
                    }
                })?;
                self.op(opcode, unit);
                self.param_operands(unit, kind);
                self.operand(table_index as i32);
                self.out.values.push(taps);
            }
            UnitKind::Aux | UnitKind::In => {
                self.op(opcode, unit);
                self.param_operands(unit, kind);
                self.operand(unit.param("channel"));
            }
            UnitKind::Filter => {
                let flags = FilterFlags::new(
                    unit.param("lowpass"),
                    unit.param("bandpass"),
                    unit.param("highpass"),
                );
                self.op(opcode, unit);
                self.param_operands(unit, kind);
                self.out.values.push(flags.0);
            }
            UnitKind::Send => self.send(instrument, index, unit, opcode)?,
            _ => {
                self.op(opcode, unit);
                self.param_operands(unit, kind);
            }
        }
        Ok(())
    }

    fn send(
        &mut self,
        instrument: usize,
        index: usize,
        unit: &Unit,
        opcode: u8,
    ) -> Result<(), EncodeError> {
        let target = unit.param("target");
        let voice = unit.param("voice");
        let pop = unit.param("sendpop") == 1;
        let port = (unit.param("port") & 7) as u16;

        let Some((target_instr, _)) = self.patch.find_unit(target) else {
            self.op(opcode, unit);
            self.param_operands(unit, UnitKind::Send);
            let addr = if pop {
                SendAddress::MISSING | SendAddress::POP
            } else {
                SendAddress::MISSING
            };
            self.out.values.extend_from_slice(&addr.to_le_bytes());
            return Ok(());
        };

        let available = self.patch[target_instr].num_voices;
        if voice < 0 || voice as usize > available {
            return Err(EncodeError::SendVoiceOutOfRange {
                instrument,
                unit: index,
                voice,
                available,
            });
        }

        if target_instr == instrument && voice == 0 {
            let addr = if pop { port | SendAddress::POP } else { port };
            self.op(opcode, unit);
            self.param_operands(unit, UnitKind::Send);
            self.local_ref(target, addr);
            return Ok(());
        }

        // voice 0 on a global send means every voice of the target
        let (first, last) = if voice > 0 {
            (voice as usize - 1, voice as usize)
        } else {
            (0, available)
        };
        let mut addr = SendAddress::GLOBAL + port + (first as u16) * SendAddress::VOICE_STRIDE;
        for v in first..last {
            self.op(opcode, unit);
            self.param_operands(unit, UnitKind::Send);
            // only the last copy pops
            if v == last - 1 && pop {
                addr += SendAddress::POP;
            }
            self.global_ref(target, addr);
            addr = addr.wrapping_add(SendAddress::VOICE_STRIDE);
        }
        Ok(())
    }

    fn sample_index(&mut self, unit: &Unit) -> Result<usize, EncodeError> {
        let offset = SampleOffset {
            start: unit.param("samplestart").max(0) as u32,
            loop_start: unit.param("loopstart").clamp(0, 65535) as u16,
            // a zero-length loop would divide by zero while rendering
            loop_length: unit.param("looplength").clamp(1, 65535) as u16,
        };
        let next = self.out.sample_offsets.len();
        let index = *self.sample_index.entry(offset).or_insert(next);
        if index == next {
            self.out.sample_offsets.push(offset);
        }
        if index > 255 {
            return Err(EncodeError::TooManySamples { count: index + 1 });
        }
        Ok(index)
    }

    fn local_ref(&mut self, id: i32, addr: u16) {
        let addr = match self.local_addrs.get(&id) {
            Some(&label) => addr.wrapping_add(label),
            None => {
                let position = self.out.values.len();
                self.local_fixups.entry(id).or_default().push(position);
                addr
            }
        };
        self.out.values.extend_from_slice(&addr.to_le_bytes());
    }

    fn global_ref(&mut self, id: i32, addr: u16) {
        let addr = match self.global_addrs.get(&id) {
            Some(&label) => addr.wrapping_add(label),
            None => {
                let position = self.out.values.len();
                self.global_fixups.entry(id).or_default().push(position);
                addr
            }
        };
        self.out.values.extend_from_slice(&addr.to_le_bytes());
    }

    /// Records where the unit about to be emitted lives, and patches every
    /// earlier send that pointed at it.
    fn label(&mut self, id: i32) {
        let local = SendAddress::local_label(self.unit_no);
        let global = SendAddress::global_label(self.unit_no, self.voice_no);
        if let Some(positions) = self.local_fixups.remove(&id) {
            self.fix_up(&positions, local);
        }
        if let Some(positions) = self.global_fixups.remove(&id) {
            self.fix_up(&positions, global);
        }
        self.local_addrs.insert(id, local);
        self.global_addrs.insert(id, global);
    }

    fn fix_up(&mut self, positions: &[usize], delta: u16) {
        for &pos in positions {
            let stored = u16::from_le_bytes([self.out.values[pos], self.out.values[pos + 1]]);
            let fixed = stored.wrapping_add(delta);
            self.out.values[pos..pos + 2].copy_from_slice(&fixed.to_le_bytes());
        }
    }

    /// Sends whose target never got emitted write into unused workspace.
    fn point_at_missing(&mut self, positions: &[usize]) {
        for &pos in positions {
            let pop = self.out.values[pos] as u16 & SendAddress::POP;
            let addr = SendAddress::MISSING | pop;
            self.out.values[pos..pos + 2].copy_from_slice(&addr.to_le_bytes());
        }
    }

    fn finish_instrument(&mut self, num_voices: usize) {
        self.out.commands.push(0);
        self.unit_no = 0;
        self.voice_no += num_voices;
        self.local_addrs.clear();
        let leftovers: Vec<usize> = self.local_fixups.drain().flat_map(|(_, p)| p).collect();
        self.point_at_missing(&leftovers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::AllFeatures;
    use crate::Instrument;

    fn encode_all(patch: &Patch) -> EncodedPatch {
        encode(patch, &AllFeatures, 100).expect("patch should encode")
    }

    fn op(kind: UnitKind, stereo: bool) -> u8 {
        kind.id() << 1 | u8::from(stereo)
    }

    #[test]
    fn simple_instrument() {
        let patch = Patch(vec![Instrument::new(
            "beep",
            1,
            vec![
                Unit::new(UnitKind::Envelope),
                Unit::new(UnitKind::Oscillator),
                Unit::new(UnitKind::Mulp),
                Unit::new(UnitKind::Out).with_param("stereo", 0),
            ],
        )]);
        let e = encode_all(&patch);
        assert_eq!(
            e.commands,
            vec![
                op(UnitKind::Envelope, false),
                op(UnitKind::Oscillator, false),
                op(UnitKind::Mulp, false),
                op(UnitKind::Out, false),
                0
            ]
        );
        assert_eq!(
            e.values,
            vec![64, 64, 64, 64, 64, 64, 64, 0, 64, 64, 64, 0x40, 64]
        );
        assert_eq!(e.num_voices, 1);
        assert_eq!(e.polyphony_bitmask, 0);
    }

    #[test]
    fn polyphony_mask_marks_instrument_boundaries() {
        let patch = Patch(vec![
            Instrument::new("a", 3, vec![]),
            Instrument::new("b", 2, vec![]),
            Instrument::new("c", 4, vec![]),
        ]);
        assert_eq!(polyphony_bitmask(&patch), 0b1101_0111_0);
        let e = encode_all(&patch);
        assert_eq!(e.voices_per_instrument(), vec![3, 2, 4]);
        assert_eq!(e.commands, vec![0, 0, 0]);
    }

    #[test]
    fn local_forward_send_is_fixed_up() {
        let patch = Patch(vec![Instrument::new(
            "a",
            1,
            vec![
                Unit::new(UnitKind::Loadval),
                Unit::new(UnitKind::Send)
                    .with_param("target", 9)
                    .with_param("port", 1),
                Unit::new(UnitKind::Filter).with_id(9),
                Unit::new(UnitKind::Pop),
            ],
        )]);
        let e = encode_all(&patch);
        // loadval 1 byte, send amount 1 byte, then the address
        let addr = u16::from_le_bytes([e.values[2], e.values[3]]);
        assert_eq!(addr, (3 << 4) | 1 | SendAddress::POP);
        let decoded = SendAddress::decode(addr).expect("valid address");
        assert_eq!(
            decoded,
            SendAddress {
                voice: None,
                unit: 2,
                port: 1,
                pop: true
            }
        );
    }

    #[test]
    fn global_send_to_all_voices_fans_out() {
        let patch = Patch(vec![
            Instrument::new("lead", 1, vec![Unit::new(UnitKind::Pop)]),
            Instrument::new(
                "pad",
                2,
                vec![
                    Unit::new(UnitKind::Oscillator).with_id(5),
                    Unit::new(UnitKind::Pop),
                ],
            ),
            Instrument::new(
                "mod",
                1,
                vec![
                    Unit::new(UnitKind::Loadval),
                    Unit::new(UnitKind::Send)
                        .with_param("target", 5)
                        .with_param("port", 6),
                ],
            ),
        ]);
        let e = encode_all(&patch);
        let send = op(UnitKind::Send, false);
        assert_eq!(e.commands.iter().filter(|&&c| c == send).count(), 2);
        let values = &e.values[e.values.len() - 6..];
        let first = SendAddress::decode(u16::from_le_bytes([values[1], values[2]]));
        let second = SendAddress::decode(u16::from_le_bytes([values[4], values[5]]));
        assert_eq!(
            first,
            Some(SendAddress {
                voice: Some(1),
                unit: 0,
                port: 6,
                pop: false
            })
        );
        assert_eq!(
            second,
            Some(SendAddress {
                voice: Some(2),
                unit: 0,
                port: 6,
                pop: true
            })
        );
    }

    #[test]
    fn missing_target_writes_nowhere_useful() {
        let patch = Patch(vec![Instrument::new(
            "a",
            1,
            vec![
                Unit::new(UnitKind::Loadval),
                Unit::new(UnitKind::Send).with_param("target", 42),
            ],
        )]);
        let e = encode_all(&patch);
        let addr = u16::from_le_bytes([e.values[2], e.values[3]]);
        assert_eq!(addr, 0xFFFF);
        assert!(SendAddress::is_missing(addr));
    }

    #[test]
    fn delay_trailer_holds_index_and_count() {
        let patch = Patch(vec![Instrument::new(
            "a",
            2,
            vec![
                Unit::new(UnitKind::Loadval).with_param("stereo", 1),
                Unit::new(UnitKind::Delay)
                    .with_param("stereo", 1)
                    .with_param("notetracking", 1)
                    .with_var_args(vec![100, 200, 300, 400]),
                Unit::new(UnitKind::Out),
            ],
        )]);
        let e = encode_all(&patch);
        assert_eq!(e.delay_times, vec![100, 200, 300, 400]);
        // loadval 1, delay 4 params, then index and 2·2 - 1 + 1
        assert_eq!(&e.values[5..7], &[0, 4]);
        assert_eq!(e.num_delay_lines, 8);
    }

    #[test]
    fn sample_oscillators_share_offsets() {
        let sample = |start| {
            Unit::new(UnitKind::Oscillator)
                .with_param("type", 4)
                .with_param("samplestart", start)
                .with_param("loopstart", 10)
                .with_param("looplength", 0)
        };
        let patch = Patch(vec![Instrument::new(
            "drums",
            1,
            vec![sample(500), sample(900), sample(500), Unit::new(UnitKind::Addp), Unit::new(UnitKind::Addp), Unit::new(UnitKind::Pop)],
        )]);
        let e = encode_all(&patch);
        assert_eq!(e.sample_offsets.len(), 2);
        assert_eq!(e.sample_offsets[0].loop_length, 1);
        // color byte of the third oscillator is sample index 0
        assert_eq!(e.values[14 + 3], 0);
        assert_eq!(e.values[7 + 3], 1);
        assert_eq!(e.values[6], 0x80);
    }

    #[test]
    fn structural_errors() {
        let too_many = Patch(vec![Instrument::new("a", 33, vec![])]);
        assert_eq!(
            encode(&too_many, &AllFeatures, 100),
            Err(EncodeError::TooManyVoices { total: 33 })
        );
        let zero = Patch(vec![Instrument::new("a", 0, vec![])]);
        assert_eq!(
            encode(&zero, &AllFeatures, 100),
            Err(EncodeError::ZeroVoices { instrument: 0 })
        );
        let unknown = Patch(vec![Instrument::new(
            "a",
            1,
            vec![Unit {
                unit_type: "reverb".into(),
                ..Unit::default()
            }],
        )]);
        assert!(matches!(
            encode(&unknown, &AllFeatures, 100),
            Err(EncodeError::UnknownUnitType { .. })
        ));
        let units = vec![Unit::new(UnitKind::Push); 64];
        let long = Patch(vec![Instrument::new("a", 1, units)]);
        assert!(matches!(
            encode(&long, &AllFeatures, 100),
            Err(EncodeError::TooManyUnits { count: 64, .. })
        ));
        let bad_voice = Patch(vec![
            Instrument::new("a", 1, vec![Unit::new(UnitKind::Pop).with_id(1)]),
            Instrument::new(
                "b",
                1,
                vec![Unit::new(UnitKind::Send)
                    .with_param("target", 1)
                    .with_param("voice", 2)],
            ),
        ]);
        assert!(matches!(
            encode(&bad_voice, &AllFeatures, 100),
            Err(EncodeError::SendVoiceOutOfRange { voice: 2, available: 1, .. })
        ));
    }

    #[test]
    fn repeated_unit_ids_are_rejected() {
        let patch = Patch(vec![
            Instrument::new("a", 1, vec![Unit::new(UnitKind::Loadnote).with_id(7), Unit::new(UnitKind::Pop)]),
            Instrument::new("b", 1, vec![Unit::new(UnitKind::Loadnote).with_id(7), Unit::new(UnitKind::Pop)]),
        ]);
        assert_eq!(
            encode(&patch, &AllFeatures, 100),
            Err(EncodeError::DuplicateUnitId { id: 7 })
        );
    }

    #[test]
    fn streams_past_their_caps_are_rejected() {
        let mut out = EncodedPatch {
            commands: vec![0; MAX_COMMANDS],
            values: vec![0; MAX_VALUES],
            ..EncodedPatch::default()
        };
        assert_eq!(check_capacity(&out), Ok(()));
        out.values.push(0);
        assert_eq!(
            check_capacity(&out),
            Err(EncodeError::CapacityExceeded {
                stream: "value",
                len: MAX_VALUES + 1,
                cap: MAX_VALUES,
            })
        );
        out.commands.push(0);
        assert!(matches!(
            check_capacity(&out),
            Err(EncodeError::CapacityExceeded { stream: "command", .. })
        ));
    }

    #[test]
    fn delay_line_count_must_fit_its_byte() {
        let delay = |lines: usize, tracking: i32| {
            let patch = Patch(vec![Instrument::new(
                "echo",
                1,
                vec![
                    Unit::new(UnitKind::Loadnote),
                    Unit::new(UnitKind::Delay)
                        .with_param("notetracking", tracking)
                        .with_var_args(vec![100; lines]),
                    Unit::new(UnitKind::Pop),
                ],
            )]);
            encode(&patch, &AllFeatures, 100)
        };
        let e = delay(128, 0).expect("128 untracked lines fit");
        assert_eq!(e.values.last(), Some(&255));
        assert_eq!(
            delay(128, 1),
            Err(EncodeError::TooManyDelayLines {
                instrument: 0,
                unit: 1,
                count: 128,
            })
        );
        assert!(matches!(
            delay(129, 0),
            Err(EncodeError::TooManyDelayLines { count: 129, .. })
        ));
    }

    #[test]
    fn empty_and_disabled_units_produce_no_code() {
        let mut disabled = Unit::new(UnitKind::Loadval);
        disabled.disabled = true;
        let patch = Patch(vec![Instrument::new(
            "a",
            1,
            vec![Unit::default(), disabled, Unit::new(UnitKind::Loadnote), Unit::new(UnitKind::Pop)],
        )]);
        let e = encode_all(&patch);
        assert_eq!(
            e.commands,
            vec![op(UnitKind::Loadnote, false), op(UnitKind::Pop, false), 0]
        );
        assert!(e.values.is_empty());
    }
}
