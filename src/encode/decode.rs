use std::collections::BTreeMap;

use super::bytecode::{EncodedPatch, SendAddress};
use super::features::FeatureSet;
use crate::catalogue::UnitKind;
use crate::dsp::filter::FilterFlags;
use crate::dsp::oscillator::{OscillatorFlags, Waveform};
use crate::error::DecodeError;
use crate::{Instrument, Patch, Unit};

/// A send whose target can only be named once every unit exists.
struct PendingSend {
    instrument: usize,
    unit: usize,
    addr: u16,
}

/// Rebuilds a structured patch from byte code.
///
/// Parameters that the encoder drops (ids, names, disabled units, unused
/// delay times) cannot come back, but encoding the result with the same
/// feature set reproduces `encoded` byte for byte. Units targeted by sends
/// get fresh ids.
pub fn decode<F: FeatureSet>(encoded: &EncodedPatch, features: &F) -> Result<Patch, DecodeError> {
    let voices = encoded.voices_per_instrument();
    let mut patch = Patch::default();
    let mut pending = Vec::new();
    let mut values = encoded.values.iter().copied();
    let mut position = 0;
    let mut next = |n: usize, position: usize| -> Result<Vec<u8>, DecodeError> {
        let taken: Vec<u8> = values.by_ref().take(n).collect();
        if taken.len() < n {
            return Err(DecodeError::ValuesEnded { position });
        }
        Ok(taken)
    };

    let mut units = Vec::new();
    for &command in &encoded.commands {
        if command == 0 {
            let index = patch.len();
            let num_voices = voices.get(index).copied().ok_or(DecodeError::VoiceMaskMismatch {
                instruments: index + 1,
                voices: encoded.num_voices as u32,
            })?;
            patch.push(Instrument::new(
                format!("instrument {index}"),
                num_voices,
                std::mem::take(&mut units),
            ));
            position += 1;
            continue;
        }
        let kind = features.kind(command >> 1).ok_or(DecodeError::UnknownOpcode {
            position,
            opcode: command,
        })?;
        let mut unit = Unit {
            unit_type: kind.name().to_string(),
            ..Unit::default()
        };
        unit.parameters.set("stereo", i32::from(command & 1));
        let params = next(kind.transform_count(), position)?;
        for (param, value) in kind.transformed_params().zip(params) {
            unit.parameters.set(param.name, i32::from(value));
        }
        match kind {
            UnitKind::Oscillator => {
                let flags = OscillatorFlags(next(1, position)?[0]);
                let waveform = flags.waveform();
                unit.parameters.set("type", waveform.map_or(-1, Waveform::to_param));
                unit.parameters.set("lfo", i32::from(flags.lfo()));
                unit.parameters.set("unison", i32::from(flags.unison()));
                if waveform == Some(Waveform::Sample) {
                    let index = usize::try_from(unit.param("color")).unwrap_or(usize::MAX);
                    let offset = encoded
                        .sample_offsets
                        .get(index)
                        .ok_or(DecodeError::SampleIndexOutOfRange { index })?;
                    unit.parameters.set("samplestart", offset.start as i32);
                    unit.parameters.set("loopstart", i32::from(offset.loop_start));
                    unit.parameters.set("looplength", i32::from(offset.loop_length));
                }
            }
            UnitKind::Filter => {
                let flags = FilterFlags(next(1, position)?[0]);
                unit.parameters.set("lowpass", flags.lowpass());
                unit.parameters.set("bandpass", flags.bandpass());
                unit.parameters.set("highpass", flags.highpass());
            }
            UnitKind::Aux | UnitKind::In => {
                unit.parameters.set("channel", i32::from(next(1, position)?[0]));
            }
            UnitKind::Delay => {
                let trailer = next(2, position)?;
                let index = usize::from(trailer[0]);
                let count = usize::from(trailer[1]).div_ceil(2);
                let lines = count * if unit.is_stereo() { 2 } else { 1 };
                let times = encoded
                    .delay_times
                    .get(index..index + lines)
                    .ok_or(DecodeError::DelayIndexOutOfRange { index })?;
                unit.parameters.set("notetracking", i32::from(trailer[1] % 2 == 0));
                unit.var_args = times.iter().map(|&t| i32::from(t)).collect();
            }
            UnitKind::Send => {
                let trailer = next(2, position)?;
                pending.push(PendingSend {
                    instrument: patch.len(),
                    unit: units.len(),
                    addr: u16::from_le_bytes([trailer[0], trailer[1]]),
                });
            }
            _ => {}
        }
        units.push(unit);
        position += 1;
    }
    if patch.len() != voices.len() {
        return Err(DecodeError::VoiceMaskMismatch {
            instruments: patch.len(),
            voices: encoded.num_voices as u32,
        });
    }
    resolve_sends(&mut patch, &pending);
    Ok(patch)
}

fn resolve_sends(patch: &mut Patch, pending: &[PendingSend]) {
    let mut ids: BTreeMap<(usize, usize), i32> = BTreeMap::new();
    for send in pending {
        let decoded = if SendAddress::is_missing(send.addr) {
            None
        } else {
            SendAddress::decode(send.addr)
        };
        let pop = send.addr & SendAddress::POP != 0;
        let target = decoded.and_then(|addr| {
            let (instrument, voice) = match addr.voice {
                Some(v) => {
                    let instrument = patch.instrument_for_voice(v)?;
                    (instrument, v - patch.first_voice_for_instrument(instrument) + 1)
                }
                None => (send.instrument, 0),
            };
            patch[instrument].units.get(addr.unit)?;
            Some((instrument, addr.unit, voice, addr.port))
        });

        let unit = &mut patch[send.instrument].units[send.unit];
        unit.parameters.set("sendpop", i32::from(pop));
        let Some((instrument, index, voice, port)) = target else {
            unit.parameters.set("target", 0);
            unit.parameters.set("voice", 0);
            unit.parameters.set("port", 0);
            continue;
        };
        let next_id = ids.len() as i32 + 1;
        let id = *ids.entry((instrument, index)).or_insert(next_id);
        unit.parameters.set("target", id);
        unit.parameters.set("voice", voice as i32);
        unit.parameters.set("port", port as i32);
        patch[instrument].units[index].id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode, AllFeatures, NecessaryFeatures};

    fn round_trip<F: FeatureSet>(patch: &Patch, features: &F) {
        let first = encode(patch, features, 120).expect("encode");
        let decoded = decode(&first, features).expect("decode");
        let second = encode(&decoded, features, 120).expect("re-encode");
        assert_eq!(first, second);
    }

    fn synth_patch() -> Patch {
        Patch(vec![
            Instrument::new(
                "lead",
                2,
                vec![
                    Unit::new(UnitKind::Envelope).with_id(1),
                    Unit::new(UnitKind::Oscillator)
                        .with_id(2)
                        .with_param("type", 1)
                        .with_param("unison", 2),
                    Unit::new(UnitKind::Mulp),
                    Unit::new(UnitKind::Filter)
                        .with_param("lowpass", 0)
                        .with_param("bandpass", -1)
                        .with_param("highpass", 1),
                    Unit::new(UnitKind::Delay)
                        .with_param("notetracking", 1)
                        .with_var_args(vec![1000, 1500]),
                    Unit::new(UnitKind::Pan),
                    Unit::new(UnitKind::Outaux),
                ],
            ),
            Instrument::new(
                "mod",
                1,
                vec![
                    Unit::new(UnitKind::Oscillator).with_param("lfo", 1),
                    Unit::new(UnitKind::Send)
                        .with_param("target", 2)
                        .with_param("port", 6),
                    Unit::new(UnitKind::Send)
                        .with_param("target", 2)
                        .with_param("voice", 2)
                        .with_param("sendpop", 0),
                    Unit::new(UnitKind::Send).with_param("target", 77),
                    Unit::new(UnitKind::In).with_param("channel", 2),
                    Unit::new(UnitKind::Out),
                ],
            ),
        ])
    }

    #[test]
    fn encoding_survives_decoding() {
        round_trip(&synth_patch(), &AllFeatures);
    }

    #[test]
    fn necessary_features_round_trip() {
        let patch = synth_patch();
        let features = NecessaryFeatures::from_patch(&patch);
        round_trip(&patch, &features);
    }

    #[test]
    fn sends_get_fresh_ids() {
        let encoded = encode(&synth_patch(), &AllFeatures, 120).expect("encode");
        let decoded = decode(&encoded, &AllFeatures).expect("decode");
        let osc = &decoded[0].units[1];
        assert_ne!(osc.id, 0, "send target needs an id");
        let sends: Vec<&Unit> = decoded[1]
            .units
            .iter()
            .filter(|u| u.kind() == Some(UnitKind::Send))
            .collect();
        // voice 0 fans out over both voices of "lead"
        assert_eq!(sends.len(), 4);
        assert_eq!(sends[0].param("voice"), 1);
        assert_eq!(sends[1].param("voice"), 2);
        assert_eq!(sends[1].param("sendpop"), 1);
        assert_eq!(sends[3].param("target"), 0, "missing target stays missing");
        assert_eq!(decoded[0].units[3].param("bandpass"), -1);
        assert_eq!(decoded[0].units[4].var_args, vec![1000, 1500]);
        assert_eq!(decoded[0].units[4].param("notetracking"), 1);
    }

    #[test]
    fn malformed_streams_are_rejected() {
        let mut encoded = encode(&synth_patch(), &AllFeatures, 120).expect("encode");
        encoded.values.truncate(3);
        assert!(matches!(
            decode(&encoded, &AllFeatures),
            Err(DecodeError::ValuesEnded { .. })
        ));

        let bad = EncodedPatch {
            commands: vec![0x7F, 0],
            num_voices: 1,
            ..EncodedPatch::default()
        };
        assert_eq!(
            decode(&bad, &AllFeatures),
            Err(DecodeError::UnknownOpcode { position: 0, opcode: 0x7F })
        );

        let mismatch = EncodedPatch {
            commands: vec![0, 0],
            num_voices: 1,
            ..EncodedPatch::default()
        };
        assert!(matches!(
            decode(&mismatch, &AllFeatures),
            Err(DecodeError::VoiceMaskMismatch { .. })
        ));
    }
}
