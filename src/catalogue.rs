//! The unit catalogue: every DSP unit kind the engine knows, with its
//! parameters, modulation ports and stack effect.
//!
//! This table is the only place these facts live. The encoder reads the
//! parameter order from it, the interpreter checks stack depth against
//! [`UnitKind::stack_use`], and editors can use [`UnitKind::default_parameters`]
//! to populate new units.
//!
//! Opcode ids are assigned by alphabetical order of the unit names, starting
//! from 1; 0 is reserved for the end-of-instrument sentinel.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a parameter value should be interpreted by an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Boolean,
    Enumerated(&'static [&'static str]),
    TargetId,
}

/// One declared parameter of a unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitParameter {
    pub name: &'static str,
    pub min: i32,
    pub max: i32,
    pub neutral: i32,
    /// Stored in the patch and editable.
    pub can_set: bool,
    /// Has a modulation port that `send` units can write to.
    pub can_modulate: bool,
    pub kind: ParamKind,
}

impl UnitParameter {
    const fn new(name: &'static str, min: i32, max: i32, kind: ParamKind) -> Self {
        Self {
            name,
            min,
            max,
            neutral: 0,
            can_set: true,
            can_modulate: false,
            kind,
        }
    }

    const fn knob(name: &'static str) -> Self {
        Self {
            can_modulate: true,
            ..Self::new(name, 0, 128, ParamKind::Integer)
        }
    }

    const fn centered(name: &'static str) -> Self {
        Self {
            neutral: 64,
            ..Self::knob(name)
        }
    }

    const fn port(name: &'static str) -> Self {
        Self {
            can_set: false,
            can_modulate: true,
            ..Self::new(name, 0, 0, ParamKind::Integer)
        }
    }

    const fn flag(name: &'static str) -> Self {
        Self::new(name, 0, 1, ParamKind::Boolean)
    }

    const fn int(name: &'static str, min: i32, max: i32) -> Self {
        Self::new(name, min, max, ParamKind::Integer)
    }

    const fn choice(name: &'static str, names: &'static [&'static str]) -> Self {
        Self::new(name, 0, names.len() as i32 - 1, ParamKind::Enumerated(names))
    }

    /// Parameters that are written into the value stream as one byte each.
    pub fn is_transformed(&self) -> bool {
        self.can_set && self.can_modulate
    }

    pub fn clamp(&self, value: i32) -> i32 {
        if self.min > self.max {
            return value;
        }
        value.clamp(self.min, self.max)
    }
}

/// Number of stack cells a unit consumes and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackUse {
    pub inputs: usize,
    pub outputs: usize,
}

impl StackUse {
    const fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }

    /// Net change of the stack depth.
    pub fn change(&self) -> isize {
        self.outputs as isize - self.inputs as isize
    }
}

pub const OSCILLATOR_TYPES: &[&str] = &["sine", "trisaw", "pulse", "gate", "sample"];
pub const CHANNEL_NAMES: &[&str] = &[
    "left",
    "right",
    "aux1 left",
    "aux1 right",
    "aux2 left",
    "aux2 right",
    "aux3 left",
];
pub const NOTE_TRACKING_NAMES: &[&str] = &["fixed", "pitch", "BPM"];

const STEREO: UnitParameter = UnitParameter::flag("stereo");

const STACK_ONLY: &[UnitParameter] = &[STEREO];
const NO_PARAMS: &[UnitParameter] = &[];

const AUX: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("gain"),
    UnitParameter::choice("channel", CHANNEL_NAMES),
];
const BELLEQ: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("frequency"),
    UnitParameter::knob("bandwidth"),
    UnitParameter::centered("gain"),
];
const COMPRESSOR: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("attack"),
    UnitParameter::knob("release"),
    UnitParameter::knob("invgain"),
    UnitParameter::knob("threshold"),
    UnitParameter::knob("ratio"),
];
const CRUSH: &[UnitParameter] = &[STEREO, UnitParameter::knob("resolution")];
const DBGAIN: &[UnitParameter] = &[STEREO, UnitParameter::centered("decibels")];
const DELAY: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("pregain"),
    UnitParameter::knob("dry"),
    UnitParameter::knob("feedback"),
    UnitParameter::knob("damp"),
    UnitParameter::choice("notetracking", NOTE_TRACKING_NAMES),
    UnitParameter::port("delaytime"),
];
const DISTORT: &[UnitParameter] = &[STEREO, UnitParameter::centered("drive")];
const ENVELOPE: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("attack"),
    UnitParameter::knob("decay"),
    UnitParameter::knob("sustain"),
    UnitParameter::knob("release"),
    UnitParameter::knob("gain"),
];
const FILTER: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("frequency"),
    UnitParameter::centered("resonance"),
    UnitParameter::flag("lowpass"),
    UnitParameter::int("bandpass", -1, 1),
    UnitParameter::int("highpass", -1, 1),
];
const GAIN: &[UnitParameter] = &[STEREO, UnitParameter::knob("gain")];
const HOLD: &[UnitParameter] = &[STEREO, UnitParameter::knob("holdfreq")];
const IN: &[UnitParameter] = &[STEREO, UnitParameter::choice("channel", CHANNEL_NAMES)];
const INVGAIN: &[UnitParameter] = &[STEREO, UnitParameter::knob("invgain")];
const LOADVAL: &[UnitParameter] = &[STEREO, UnitParameter::centered("value")];
const NOISE: &[UnitParameter] = &[
    STEREO,
    UnitParameter::centered("shape"),
    UnitParameter::knob("gain"),
];
const OSCILLATOR: &[UnitParameter] = &[
    STEREO,
    UnitParameter::centered("transpose"),
    UnitParameter::centered("detune"),
    UnitParameter::knob("phase"),
    UnitParameter::knob("color"),
    UnitParameter::centered("shape"),
    UnitParameter::knob("gain"),
    UnitParameter::port("frequency"),
    UnitParameter::choice("type", OSCILLATOR_TYPES),
    UnitParameter::flag("lfo"),
    UnitParameter::int("unison", 0, 3),
    UnitParameter::int("samplestart", 0, 1_720_329),
    UnitParameter::int("loopstart", 0, 65535),
    UnitParameter::int("looplength", 0, 65535),
];
const OUT: &[UnitParameter] = &[STEREO, UnitParameter::knob("gain")];
const OUTAUX: &[UnitParameter] = &[
    STEREO,
    UnitParameter::knob("outgain"),
    UnitParameter::knob("auxgain"),
];
const PAN: &[UnitParameter] = &[STEREO, UnitParameter::centered("panning")];
const RECEIVE: &[UnitParameter] = &[
    STEREO,
    UnitParameter::port("left"),
    UnitParameter::port("right"),
];
const SEND: &[UnitParameter] = &[
    STEREO,
    UnitParameter::centered("amount"),
    UnitParameter::int("voice", 0, crate::MAX_VOICES as i32),
    UnitParameter::new("target", 0, i32::MAX, ParamKind::TargetId),
    UnitParameter::int("port", 0, 7),
    UnitParameter::flag("sendpop"),
];

macro_rules! unit_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Every unit kind, in opcode order.
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum UnitKind {
            $($variant),*
        }

        impl UnitKind {
            pub const ALL: &'static [UnitKind] = &[$(UnitKind::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(UnitKind::$variant => $name),*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(UnitKind::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

unit_kinds! {
    Add => "add",
    Addp => "addp",
    Aux => "aux",
    Belleq => "belleq",
    Clip => "clip",
    Compressor => "compressor",
    Crush => "crush",
    Dbgain => "dbgain",
    Delay => "delay",
    Distort => "distort",
    Envelope => "envelope",
    Filter => "filter",
    Gain => "gain",
    Hold => "hold",
    In => "in",
    Invgain => "invgain",
    Loadnote => "loadnote",
    Loadval => "loadval",
    Mul => "mul",
    Mulp => "mulp",
    Noise => "noise",
    Oscillator => "oscillator",
    Out => "out",
    Outaux => "outaux",
    Pan => "pan",
    Pop => "pop",
    Push => "push",
    Receive => "receive",
    Send => "send",
    Speed => "speed",
    Sync => "sync",
    Xch => "xch",
}

impl UnitKind {
    /// Opcode id of this kind in the full feature set.
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_id(id: u8) -> Option<Self> {
        let index = usize::from(id).checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    pub fn params(self) -> &'static [UnitParameter] {
        use UnitKind::*;
        match self {
            Add | Addp | Clip | Loadnote | Mul | Mulp | Pop | Push | Xch => STACK_ONLY,
            Aux => AUX,
            Belleq => BELLEQ,
            Compressor => COMPRESSOR,
            Crush => CRUSH,
            Dbgain => DBGAIN,
            Delay => DELAY,
            Distort => DISTORT,
            Envelope => ENVELOPE,
            Filter => FILTER,
            Gain => GAIN,
            Hold => HOLD,
            In => IN,
            Invgain => INVGAIN,
            Loadval => LOADVAL,
            Noise => NOISE,
            Oscillator => OSCILLATOR,
            Out => OUT,
            Outaux => OUTAUX,
            Pan => PAN,
            Receive => RECEIVE,
            Send => SEND,
            Speed | Sync => NO_PARAMS,
        }
    }

    pub fn param(self, name: &str) -> Option<&'static UnitParameter> {
        self.params().iter().find(|p| p.name == name)
    }

    /// Parameters emitted into the value stream, in stream order.
    pub fn transformed_params(self) -> impl Iterator<Item = &'static UnitParameter> {
        self.params().iter().filter(|p| p.is_transformed())
    }

    pub fn transform_count(self) -> usize {
        self.transformed_params().count()
    }

    /// Modulation ports, indexed by port number.
    pub fn ports(self) -> impl Iterator<Item = &'static UnitParameter> {
        self.params().iter().filter(|p| p.can_modulate)
    }

    pub fn port_index(self, name: &str) -> Option<usize> {
        self.ports().position(|p| p.name == name)
    }

    pub fn port_param(self, port: usize) -> Option<&'static UnitParameter> {
        self.ports().nth(port)
    }

    /// Bytes following the parameter bytes in the value stream.
    pub fn trailer_len(self) -> usize {
        match self {
            UnitKind::Oscillator | UnitKind::Filter | UnitKind::Aux | UnitKind::In => 1,
            UnitKind::Send | UnitKind::Delay => 2,
            _ => 0,
        }
    }

    /// `speed` and `sync` only operate on a single signal.
    pub fn supports_stereo(self) -> bool {
        !matches!(self, UnitKind::Speed | UnitKind::Sync)
    }

    /// Stack effect of one execution. `pops` only matters for `send`.
    pub fn stack_use(self, stereo: bool, pops: bool) -> StackUse {
        use UnitKind::*;
        let n = if stereo && self.supports_stereo() { 2 } else { 1 };
        match self {
            Add | Mul | Xch => StackUse::new(2 * n, 2 * n),
            Addp | Mulp => StackUse::new(2 * n, n),
            Push => StackUse::new(n, 2 * n),
            Pop | Out | Outaux | Aux => StackUse::new(n, 0),
            Envelope | Oscillator | Noise | Loadnote | Loadval | Receive | In => {
                StackUse::new(0, n)
            }
            Distort | Hold | Crush | Gain | Invgain | Dbgain | Filter | Clip | Delay | Belleq => {
                StackUse::new(n, n)
            }
            Compressor => StackUse::new(n, 2 * n),
            Pan => StackUse::new(n, 2),
            Speed => StackUse::new(1, 0),
            Sync => StackUse::new(1, 1),
            Send if pops => StackUse::new(n, 0),
            Send => StackUse::new(n, n),
        }
    }

    /// Parameter values a freshly inserted unit of this kind starts with.
    pub fn default_parameters(self) -> &'static [(&'static str, i32)] {
        use UnitKind::*;
        match self {
            Envelope => &[
                ("stereo", 0),
                ("attack", 64),
                ("decay", 64),
                ("sustain", 64),
                ("release", 64),
                ("gain", 64),
            ],
            Oscillator => &[
                ("stereo", 0),
                ("transpose", 64),
                ("detune", 64),
                ("phase", 0),
                ("color", 64),
                ("shape", 64),
                ("gain", 64),
                ("type", 0),
            ],
            Noise => &[("stereo", 0), ("shape", 64), ("gain", 64)],
            Loadval => &[("stereo", 0), ("value", 64)],
            Pan => &[("stereo", 0), ("panning", 64)],
            Gain => &[("stereo", 0), ("gain", 64)],
            Invgain => &[("stereo", 0), ("invgain", 64)],
            Dbgain => &[("stereo", 0), ("decibels", 64)],
            Crush => &[("stereo", 0), ("resolution", 64)],
            Hold => &[("stereo", 0), ("holdfreq", 64)],
            Distort => &[("stereo", 0), ("drive", 64)],
            Filter => &[
                ("stereo", 0),
                ("frequency", 64),
                ("resonance", 64),
                ("lowpass", 1),
                ("bandpass", 0),
                ("highpass", 0),
            ],
            Out => &[("stereo", 1), ("gain", 64)],
            Outaux => &[("stereo", 1), ("outgain", 64), ("auxgain", 64)],
            Aux => &[("stereo", 1), ("gain", 64), ("channel", 2)],
            In => &[("stereo", 1), ("channel", 2)],
            Delay => &[
                ("stereo", 0),
                ("pregain", 40),
                ("dry", 128),
                ("feedback", 96),
                ("damp", 0),
                ("notetracking", 2),
            ],
            Compressor => &[
                ("stereo", 0),
                ("attack", 64),
                ("release", 64),
                ("invgain", 64),
                ("threshold", 64),
                ("ratio", 64),
            ],
            Send => &[
                ("stereo", 0),
                ("amount", 64),
                ("voice", 0),
                ("target", 0),
                ("port", 0),
                ("sendpop", 1),
            ],
            Belleq => &[("stereo", 0), ("frequency", 64), ("bandwidth", 64), ("gain", 64)],
            Speed | Sync => &[],
            Add | Addp | Clip | Loadnote | Mul | Mulp | Pop | Push | Receive | Xch => {
                &[("stereo", 0)]
            }
        }
    }

    /// Variable arguments a freshly inserted unit starts with.
    pub fn default_var_args(self) -> &'static [i32] {
        match self {
            UnitKind::Delay => &[48],
            _ => &[],
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnitKind(pub String);

impl fmt::Display for UnknownUnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown unit type \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownUnitKind {}

impl FromStr for UnitKind {
    type Err = UnknownUnitKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitKind::from_name(s).ok_or_else(|| UnknownUnitKind(s.to_string()))
    }
}
