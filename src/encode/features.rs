use std::collections::{BTreeMap, BTreeSet};

use crate::catalogue::UnitKind;
use crate::Patch;

/// Which opcodes and parameter values a target renderer supports, and how
/// opcodes are numbered for it.
///
/// Opcode ids start at 1; 0 is the end-of-instrument sentinel. The command
/// byte of a unit is `id << 1 | stereo`.
pub trait FeatureSet {
    fn opcode(&self, kind: UnitKind) -> Option<u8>;

    fn kind(&self, opcode: u8) -> Option<UnitKind>;

    /// Supported unit kinds in opcode order.
    fn instructions(&self) -> Vec<UnitKind>;

    fn supports_param_value(&self, kind: UnitKind, param: &str, value: i32) -> bool;

    fn supports_param_value_other_than(&self, kind: UnitKind, param: &str, value: i32) -> bool;

    fn supports_modulation(&self, kind: UnitKind, param: &str) -> bool;

    fn supports_polyphony(&self) -> bool;

    fn supports_global_send(&self) -> bool;

    /// Modulation port number of a parameter, which is the same for every
    /// feature set.
    fn input_number(&self, kind: UnitKind, param: &str) -> Option<usize> {
        kind.port_index(param)
    }
}

/// Every unit kind with every parameter value. Opcode ids follow the
/// catalogue; this is what [`Synth`](crate::Synth) executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllFeatures;

impl FeatureSet for AllFeatures {
    fn opcode(&self, kind: UnitKind) -> Option<u8> {
        Some(kind.id())
    }

    fn kind(&self, opcode: u8) -> Option<UnitKind> {
        UnitKind::from_id(opcode)
    }

    fn instructions(&self) -> Vec<UnitKind> {
        UnitKind::ALL.to_vec()
    }

    fn supports_param_value(&self, _: UnitKind, _: &str, _: i32) -> bool {
        true
    }

    fn supports_param_value_other_than(&self, _: UnitKind, _: &str, _: i32) -> bool {
        true
    }

    fn supports_modulation(&self, _: UnitKind, _: &str) -> bool {
        true
    }

    fn supports_polyphony(&self) -> bool {
        true
    }

    fn supports_global_send(&self) -> bool {
        true
    }
}

/// Only what a particular patch uses. Opcodes are numbered in order of
/// first use, which keeps the renderer's jump table as small as possible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NecessaryFeatures {
    instructions: Vec<UnitKind>,
    param_values: BTreeMap<(UnitKind, &'static str), BTreeSet<i32>>,
    modulated: BTreeSet<(UnitKind, &'static str)>,
    global_send: bool,
    polyphony: bool,
}

impl NecessaryFeatures {
    pub fn from_patch(patch: &Patch) -> Self {
        let mut features = Self::default();
        for (i, instr) in patch.iter().enumerate() {
            for unit in instr.units.iter().filter(|u| u.is_active()) {
                let Some(kind) = unit.kind() else {
                    continue;
                };
                if !features.instructions.contains(&kind) {
                    features.instructions.push(kind);
                }
                for param in kind.params() {
                    features
                        .param_values
                        .entry((kind, param.name))
                        .or_default()
                        .insert(unit.param(param.name));
                }
                if kind != UnitKind::Send {
                    continue;
                }
                let Some((t, u)) = patch.find_unit(unit.param("target")) else {
                    continue;
                };
                let Some(target_kind) = patch[t].units[u].kind() else {
                    continue;
                };
                let port = usize::try_from(unit.param("port")).ok();
                let Some(param) = port.and_then(|p| target_kind.port_param(p)) else {
                    continue;
                };
                if t != i || unit.param("voice") > 0 {
                    features.global_send = true;
                }
                features.modulated.insert((target_kind, param.name));
            }
            if instr.num_voices > 1 {
                features.polyphony = true;
            }
        }
        features
    }
}

impl FeatureSet for NecessaryFeatures {
    fn opcode(&self, kind: UnitKind) -> Option<u8> {
        let index = self.instructions.iter().position(|&k| k == kind)?;
        u8::try_from(index + 1).ok()
    }

    fn kind(&self, opcode: u8) -> Option<UnitKind> {
        let index = usize::from(opcode).checked_sub(1)?;
        self.instructions.get(index).copied()
    }

    fn instructions(&self) -> Vec<UnitKind> {
        self.instructions.clone()
    }

    fn supports_param_value(&self, kind: UnitKind, param: &str, value: i32) -> bool {
        self.param_values
            .iter()
            .find(|((k, p), _)| *k == kind && *p == param)
            .is_some_and(|(_, values)| values.contains(&value))
    }

    fn supports_param_value_other_than(&self, kind: UnitKind, param: &str, value: i32) -> bool {
        self.param_values
            .iter()
            .find(|((k, p), _)| *k == kind && *p == param)
            .is_some_and(|(_, values)| values.iter().any(|&v| v != value))
    }

    fn supports_modulation(&self, kind: UnitKind, param: &str) -> bool {
        self.modulated.iter().any(|(k, p)| *k == kind && *p == param)
    }

    fn supports_polyphony(&self) -> bool {
        self.polyphony
    }

    fn supports_global_send(&self) -> bool {
        self.global_send
    }
}
