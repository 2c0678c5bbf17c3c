use crate::catalogue::UnitKind;
use crate::patch::delay_lines_of;
use crate::util::super_array::find_super_array;
use crate::{Patch, Unit, SAMPLE_RATE};

/// Delay times of every delay unit packed into one table, with overlapping
/// runs shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayTable {
    pub times: Vec<u16>,
    /// `indices[instrument][unit]` is where the unit's times start; 0 for
    /// units without delay lines.
    pub indices: Vec<Vec<usize>>,
}

/// Delay times of `unit` in samples: the variable arguments that actually
/// become delay lines, converted from 48ths of a beat when the unit syncs
/// to tempo.
pub fn delay_times(unit: &Unit, bpm: i32) -> Vec<i32> {
    let used = &unit.var_args[..delay_lines_of(unit)];
    if unit.param("notetracking") != 2 {
        return used.to_vec();
    }
    let bpm = i64::from(bpm.max(1));
    used.iter()
        .map(|&t| {
            let samples = i64::from(SAMPLE_RATE) * 60 * i64::from(t) / 48 / bpm;
            samples.min(65535) as i32
        })
        .collect()
}

pub fn has_delay_lines(unit: &Unit) -> bool {
    unit.is_active() && unit.kind() == Some(UnitKind::Delay) && delay_lines_of(unit) > 0
}

pub fn construct(patch: &Patch, bpm: i32) -> DelayTable {
    let mut runs = Vec::new();
    let mut slots = Vec::new();
    for (i, instr) in patch.iter().enumerate() {
        for (u, unit) in instr.units.iter().enumerate() {
            if has_delay_lines(unit) {
                slots.push((i, u));
                runs.push(delay_times(unit, bpm));
            }
        }
    }
    let (table, starts) = find_super_array(&runs);
    let mut indices: Vec<Vec<usize>> = patch.iter().map(|i| vec![0; i.units.len()]).collect();
    for ((i, u), start) in slots.into_iter().zip(starts) {
        indices[i][u] = start;
    }
    DelayTable {
        times: table.into_iter().map(|t| t.clamp(0, 65535) as u16).collect(),
        indices,
    }
}
