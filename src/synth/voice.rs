use crate::MAX_UNITS;

/// Workspace of one unit in one voice: eight words of DSP state and eight
/// modulation ports that sends accumulate into.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitSlot {
    pub state: [f32; 8],
    pub ports: [f32; 8],
}

/// One voice: the note it plays, whether the key is still held, and a slot
/// per unit of its instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub note: u8,
    pub sustain: bool,
    pub units: [UnitSlot; MAX_UNITS],
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            note: 0,
            sustain: false,
            units: [UnitSlot::default(); MAX_UNITS],
        }
    }
}

impl Voice {
    /// A freshly triggered voice: every unit state and port zeroed.
    pub fn triggered(note: u8) -> Self {
        Self {
            note,
            sustain: true,
            ..Self::default()
        }
    }

    pub fn reset_units(&mut self) {
        self.units = [UnitSlot::default(); MAX_UNITS];
    }
}
