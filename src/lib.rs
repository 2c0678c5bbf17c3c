pub mod catalogue; // Unit kinds, parameters and stack effects
pub mod dsp;
pub mod encode; // Patch byte code, score compaction
pub mod error;
pub mod io;
pub mod patch;
pub mod player; // Song sequencing, realtime playback
pub mod score;
pub mod synth; // Voice workspaces and the stack machine
pub mod util;

pub use catalogue::UnitKind;
pub use encode::{AllFeatures, EncodedPatch, EncodedScore, FeatureSet, NecessaryFeatures};
pub use patch::{Instrument, ParamMap, Patch, Unit};
pub use score::{Order, Pattern, Score, Song, SongPos, Track};
pub use synth::{Rendered, Synth};

/// Fixed output rate of the engine.
pub const SAMPLE_RATE: u32 = 44_100;
/// Voices available to a patch, summed over all instruments.
pub const MAX_VOICES: usize = 32;
/// Units that fit in one voice workspace.
pub const MAX_UNITS: usize = 63;
/// Deepest the signal stack may grow, in cells.
pub const MAX_STACK: usize = 8;
/// Historical caps on the encoded streams.
pub const MAX_COMMANDS: usize = 2048;
pub const MAX_VALUES: usize = 16384;
/// Distance in samples between two sync records.
pub const SYNC_INTERVAL: u32 = 256;
