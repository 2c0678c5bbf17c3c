use std::fmt;

use super::Patch;
use crate::catalogue::UnitKind;

/// Things that encode fine but probably do not do what the author meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchWarning {
    /// The send writes into unused workspace instead.
    MissingSendTarget { instrument: usize, unit: usize, target: i32 },
    /// Source and target may render on different threads and see
    /// modulation one sample late.
    CrossThreadSend { instrument: usize, unit: usize, target_instrument: usize },
    UnusedThread { thread: usize },
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchWarning::MissingSendTarget { instrument, unit, target } => write!(
                f,
                "send (instrument {instrument}, unit {unit}) targets missing unit id {target}"
            ),
            PatchWarning::CrossThreadSend { instrument, unit, target_instrument } => write!(
                f,
                "send (instrument {instrument}, unit {unit}) crosses threads to instrument {target_instrument}"
            ),
            PatchWarning::UnusedThread { thread } => write!(f, "thread {thread} renders no instruments"),
        }
    }
}

impl Patch {
    pub fn warnings(&self) -> Vec<PatchWarning> {
        let mut warnings = Vec::new();
        for (i, instr) in self.iter().enumerate() {
            for (u, unit) in instr.units.iter().enumerate() {
                if !unit.is_active() || unit.kind() != Some(UnitKind::Send) {
                    continue;
                }
                let target = unit.param("target");
                match self.find_unit(target) {
                    None => warnings.push(PatchWarning::MissingSendTarget {
                        instrument: i,
                        unit: u,
                        target,
                    }),
                    Some((t, _)) if self[t].thread_mask() != instr.thread_mask() => {
                        warnings.push(PatchWarning::CrossThreadSend {
                            instrument: i,
                            unit: u,
                            target_instrument: t,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        let used = self.iter().fold(0u32, |acc, i| acc | i.thread_mask());
        for thread in 0..self.num_threads() {
            if used & (1 << thread) == 0 {
                warnings.push(PatchWarning::UnusedThread { thread });
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instrument, Unit};

    #[test]
    fn reports_missing_targets_and_thread_crossings() {
        let mut patch = Patch(vec![
            Instrument::new(
                "a",
                1,
                vec![
                    Unit::new(UnitKind::Loadval),
                    Unit::new(UnitKind::Send).with_param("target", 99),
                    Unit::new(UnitKind::Loadval),
                    Unit::new(UnitKind::Send).with_param("target", 5),
                ],
            ),
            Instrument::new("b", 1, vec![Unit::new(UnitKind::Gain).with_id(5)]),
        ]);
        patch[1].thread_mask_m1 = 3;
        let warnings = patch.warnings();
        assert_eq!(
            warnings,
            vec![
                PatchWarning::MissingSendTarget { instrument: 0, unit: 1, target: 99 },
                PatchWarning::CrossThreadSend { instrument: 0, unit: 3, target_instrument: 1 },
                PatchWarning::UnusedThread { thread: 1 },
            ]
        );
    }
}
