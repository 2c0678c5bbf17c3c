use std::fmt;

use crate::catalogue::UnitKind;

/// Structural problems found while turning a [`Patch`](crate::Patch) into byte code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    TooManyVoices { total: usize },
    ZeroVoices { instrument: usize },
    TooManyUnits { instrument: usize, count: usize },
    UnknownUnitType { instrument: usize, unit: usize, name: String },
    UnsupportedUnit { kind: UnitKind },
    DuplicateUnitId { id: i32 },
    SendVoiceOutOfRange { instrument: usize, unit: usize, voice: i32, available: usize },
    TooManySamples { count: usize },
    DelayTableTooLarge { index: usize },
    TooManyDelayLines { instrument: usize, unit: usize, count: usize },
    CapacityExceeded { stream: &'static str, len: usize, cap: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::TooManyVoices { total } => {
                write!(f, "patch uses {total} voices, at most {} are supported", crate::MAX_VOICES)
            }
            EncodeError::ZeroVoices { instrument } => {
                write!(f, "instrument {instrument} must have at least 1 voice")
            }
            EncodeError::TooManyUnits { instrument, count } => write!(
                f,
                "instrument {instrument} has {count} units, at most {} are supported",
                crate::MAX_UNITS
            ),
            EncodeError::UnknownUnitType { instrument, unit, name } => {
                write!(f, "unknown unit type \"{name}\" (instrument {instrument}, unit {unit})")
            }
            EncodeError::UnsupportedUnit { kind } => {
                write!(f, "feature set does not support unit type \"{}\"", kind.name())
            }
            EncodeError::DuplicateUnitId { id } => write!(f, "unit id {id} is used more than once"),
            EncodeError::SendVoiceOutOfRange { instrument, unit, voice, available } => write!(
                f,
                "send (instrument {instrument}, unit {unit}) targets voice {voice} but the target instrument has {available}"
            ),
            EncodeError::TooManySamples { count } => {
                write!(f, "patch uses {count} distinct samples, at most 256 are supported")
            }
            EncodeError::DelayTableTooLarge { index } => {
                write!(f, "delay time index {index} does not fit in a byte")
            }
            EncodeError::TooManyDelayLines { instrument, unit, count } => write!(
                f,
                "delay (instrument {instrument}, unit {unit}) has {count} lines per channel, more than one byte can count"
            ),
            EncodeError::CapacityExceeded { stream, len, cap } => {
                write!(f, "{stream} stream has {len} bytes, cap is {cap}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Problems found while reading byte code back into a structured patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { position: usize, opcode: u8 },
    ValuesEnded { position: usize },
    VoiceMaskMismatch { instruments: usize, voices: u32 },
    SampleIndexOutOfRange { index: usize },
    DelayIndexOutOfRange { index: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { position, opcode } => {
                write!(f, "unknown opcode {opcode:#04x} at command {position}")
            }
            DecodeError::ValuesEnded { position } => {
                write!(f, "value stream ended prematurely at command {position}")
            }
            DecodeError::VoiceMaskMismatch { instruments, voices } => write!(
                f,
                "{instruments} instruments in the command stream do not match the {voices} voices of the polyphony mask"
            ),
            DecodeError::SampleIndexOutOfRange { index } => {
                write!(f, "sample offset index {index} is out of range")
            }
            DecodeError::DelayIndexOutOfRange { index } => {
                write!(f, "delay time index {index} is out of range")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Problems with the arrangement itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    TooManyPatterns { count: usize },
    MissingPattern { track: usize, position: usize, pattern: i32 },
    TooManyVoices { score: usize, patch: usize },
    NoTracks,
    InvalidTempo { bpm: i32, rows_per_beat: i32 },
    InvalidLength { rows_per_pattern: i32, length: i32 },
}

impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreError::TooManyPatterns { count } => {
                write!(f, "score needs {count} distinct patterns, at most 256 are supported")
            }
            ScoreError::MissingPattern { track, position, pattern } => write!(
                f,
                "track {track} references non-existent pattern {pattern} at order position {position}"
            ),
            ScoreError::TooManyVoices { score, patch } => {
                write!(f, "tracks use {score} voices but the patch only has {patch}")
            }
            ScoreError::NoTracks => write!(f, "song contains no tracks"),
            ScoreError::InvalidTempo { bpm, rows_per_beat } => {
                write!(f, "invalid tempo: {bpm} BPM with {rows_per_beat} rows per beat")
            }
            ScoreError::InvalidLength { rows_per_pattern, length } => write!(
                f,
                "invalid score dimensions: {rows_per_pattern} rows per pattern, length {length}"
            ),
        }
    }
}

impl std::error::Error for ScoreError {}

/// The stack machine stopped while executing a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthError {
    StackUnderflow { voice: usize, unit: usize },
    StackOverflow { voice: usize, unit: usize },
    StackImbalance { voice: usize, depth: usize },
    DivideByZero { voice: usize, unit: usize },
    NotANumber,
    InvalidOpcode { opcode: u8 },
    /// A trailer byte points outside the delay, sample or workspace tables.
    InvalidOperand { voice: usize, unit: usize },
    TooManyVoices { voices: usize },
    TooManyUnits { voice: usize },
    CommandsEnded,
    ValuesEnded,
    Faulted,
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::StackUnderflow { voice, unit } => {
                write!(f, "stack underflow (voice {voice}, unit {unit})")
            }
            SynthError::StackOverflow { voice, unit } => {
                write!(f, "stack overflow (voice {voice}, unit {unit})")
            }
            SynthError::StackImbalance { voice, depth } => {
                write!(f, "stack not empty at end of voice {voice}: {depth} signals left")
            }
            SynthError::DivideByZero { voice, unit } => {
                write!(f, "divide by zero (voice {voice}, unit {unit})")
            }
            SynthError::NotANumber => write!(f, "NaN detected in output"),
            SynthError::InvalidOpcode { opcode } => write!(f, "invalid opcode {opcode:#04x}"),
            SynthError::InvalidOperand { voice, unit } => {
                write!(f, "operand out of range (voice {voice}, unit {unit})")
            }
            SynthError::TooManyVoices { voices } => {
                write!(f, "byte code uses {voices} voices, at most {} are supported", crate::MAX_VOICES)
            }
            SynthError::TooManyUnits { voice } => write!(
                f,
                "voice {voice} runs more than {} units",
                crate::MAX_UNITS
            ),
            SynthError::CommandsEnded => write!(f, "command stream ended prematurely"),
            SynthError::ValuesEnded => write!(f, "value stream ended prematurely"),
            SynthError::Faulted => write!(f, "synth is in an error state, update or rebuild it"),
        }
    }
}

impl std::error::Error for SynthError {}

/// A failed render call, with what was produced before the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderError {
    pub error: SynthError,
    pub samples: usize,
    pub time: i32,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render failed after {} samples: {}", self.samples, self.error)
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// In-place update of a running synth is not possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    Encode(EncodeError),
    DelayLinesChanged { old: usize, new: usize },
    TooManyVoices { voices: usize },
    /// There is no synth to update, e.g. after a panic.
    NoSynth,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Encode(e) => write!(f, "{e}"),
            UpdateError::DelayLinesChanged { old, new } => write!(
                f,
                "delay line count changed from {old} to {new}, the synth must be rebuilt"
            ),
            UpdateError::TooManyVoices { voices } => write!(
                f,
                "byte code uses {voices} voices, at most {} are supported",
                crate::MAX_VOICES
            ),
            UpdateError::NoSynth => write!(f, "no synth to update, send a new one"),
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodeError> for UpdateError {
    fn from(e: EncodeError) -> Self {
        UpdateError::Encode(e)
    }
}

/// Offline or realtime song playback failed.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayError {
    Encode(EncodeError),
    Score(ScoreError),
    Render(RenderError),
    RowNeverAdvances { row: usize },
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayError::Encode(e) => write!(f, "patch: {e}"),
            PlayError::Score(e) => write!(f, "score: {e}"),
            PlayError::Render(e) => write!(f, "{e}"),
            PlayError::RowNeverAdvances { row } => {
                write!(f, "row {row} never advances, speed modulation is too slow")
            }
        }
    }
}

impl std::error::Error for PlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlayError::Encode(e) => Some(e),
            PlayError::Score(e) => Some(e),
            PlayError::Render(e) => Some(e),
            PlayError::RowNeverAdvances { .. } => None,
        }
    }
}

impl From<EncodeError> for PlayError {
    fn from(e: EncodeError) -> Self {
        PlayError::Encode(e)
    }
}

impl From<ScoreError> for PlayError {
    fn from(e: ScoreError) -> Self {
        PlayError::Score(e)
    }
}

impl From<RenderError> for PlayError {
    fn from(e: RenderError) -> Self {
        PlayError::Render(e)
    }
}

/// Reading or writing audio data.
#[derive(Debug)]
pub enum AudioError {
    Io(std::io::Error),
    Wav(hound::Error),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::Io(e) => write!(f, "audio i/o: {e}"),
            AudioError::Wav(e) => write!(f, "wav: {e}"),
        }
    }
}

impl std::error::Error for AudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AudioError::Io(e) => Some(e),
            AudioError::Wav(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for AudioError {
    fn from(e: std::io::Error) -> Self {
        AudioError::Io(e)
    }
}

impl From<hound::Error> for AudioError {
    fn from(e: hound::Error) -> Self {
        AudioError::Wav(e)
    }
}

/// Loading or saving a song file.
#[cfg(feature = "serde")]
#[derive(Debug)]
pub enum SongFileError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
    UnknownFormat { extension: String },
}

#[cfg(feature = "serde")]
impl fmt::Display for SongFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongFileError::Io(e) => write!(f, "song file: {e}"),
            SongFileError::Yaml(e) => write!(f, "yaml: {e}"),
            SongFileError::Json(e) => write!(f, "json: {e}"),
            SongFileError::UnknownFormat { extension } => {
                write!(f, "unknown song file extension \"{extension}\", expected yml, yaml or json")
            }
        }
    }
}

#[cfg(feature = "serde")]
impl std::error::Error for SongFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SongFileError::Io(e) => Some(e),
            SongFileError::Yaml(e) => Some(e),
            SongFileError::Json(e) => Some(e),
            SongFileError::UnknownFormat { .. } => None,
        }
    }
}

#[cfg(feature = "serde")]
impl From<std::io::Error> for SongFileError {
    fn from(e: std::io::Error) -> Self {
        SongFileError::Io(e)
    }
}

#[cfg(feature = "serde")]
impl From<serde_yaml::Error> for SongFileError {
    fn from(e: serde_yaml::Error) -> Self {
        SongFileError::Yaml(e)
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for SongFileError {
    fn from(e: serde_json::Error) -> Self {
        SongFileError::Json(e)
    }
}

/// A patch or synth could not be handed to the realtime player.
#[derive(Debug)]
pub enum SendError {
    Encode(EncodeError),
    /// The message queue is full; the message comes back.
    QueueFull(crate::player::PlayerMessage),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Encode(e) => write!(f, "{e}"),
            SendError::QueueFull(_) => write!(f, "player message queue is full"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Encode(e) => Some(e),
            SendError::QueueFull(_) => None,
        }
    }
}

impl From<EncodeError> for SendError {
    fn from(e: EncodeError) -> Self {
        SendError::Encode(e)
    }
}
