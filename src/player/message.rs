use std::fmt;
use std::ops::Range;

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer};

use crate::encode::EncodedPatch;
use crate::error::{RenderError, UpdateError};
use crate::player::sequencer::Loop;
use crate::score::SongPos;
use crate::{Score, Synth, MAX_VOICES};

/// Opaque handle of a manually played note, chosen by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId(pub u32);

/// Control messages into the audio thread. Payloads are allocated by the
/// sender; the player only moves them, and hands back what they replace as
/// [`PlayerEvent::Retired`].
#[derive(Debug)]
pub enum PlayerMessage {
    /// Byte code of an edited patch, swapped into the running synth in
    /// place, with the mutes of the patch. Rejected when the delay lines
    /// differ or there is no synth; send a new synth then.
    ReplacePatch { code: Box<EncodedPatch>, muted: u32 },
    /// A synth built off the audio thread, with the mutes of its patch.
    ReplaceSynth { synth: Box<Synth>, muted: u32 },
    ReplaceScore(Box<Score>),
    SetSamplesPerRow(usize),
    SetLoop(Loop),
    Play(SongPos),
    Stop,
    TriggerManual {
        id: NoteId,
        voices: Range<usize>,
        note: u8,
    },
    ReleaseManual(NoteId),
    /// Drops the synth; the player renders silence until a new patch or
    /// synth arrives.
    Panic,
}

/// Snapshot of the player for meters and position displays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
    pub position: SongPos,
    pub playing: bool,
    /// The song ended and its tail has been rendered.
    pub finished: bool,
    /// No synth: output is silent.
    pub panic: bool,
    pub voice_levels: [f32; MAX_VOICES],
    /// Status updates that did not fit in the channel so far.
    pub dropped: u64,
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// Rendering failed; the synth was dropped.
    RenderFailed(RenderError),
    /// The byte code could not be swapped in; the old patch keeps playing.
    PatchRejected(UpdateError),
    /// The synth did not fill the buffer within the allowed render calls.
    Stalled { calls: usize },
}

impl Alert {
    pub fn priority(&self) -> AlertPriority {
        match self {
            Alert::RenderFailed(_) | Alert::Stalled { .. } => AlertPriority::Error,
            Alert::PatchRejected(_) => AlertPriority::Warning,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::RenderFailed(err) => write!(f, "{err}; output muted until a new patch"),
            Alert::PatchRejected(err) => write!(f, "patch rejected: {err}"),
            Alert::Stalled { calls } => {
                write!(f, "synth did not fill the buffer in {calls} render calls")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertPriority {
    Warning,
    Error,
}

/// Something the player let go of, to be freed off the audio thread.
#[derive(Debug)]
pub enum Retired {
    Synth(Box<Synth>),
    Code(Box<EncodedPatch>),
    Score(Box<Score>),
}

/// Messages out of the audio thread.
#[derive(Debug)]
pub enum PlayerEvent {
    Status(PlayerStatus),
    Alert(Alert),
    Retired(Retired),
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<PlayerMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<PlayerMessage> {
    fn pop(&mut self) -> Option<PlayerMessage> {
        Consumer::pop(self).ok()
    }
}

/// Non-blocking outlet for player events. Returns `false` when the event
/// did not fit and was dropped in place.
pub trait EventSender {
    fn try_send(&mut self, event: PlayerEvent) -> bool;
}

#[cfg(feature = "rtrb")]
impl EventSender for Producer<PlayerEvent> {
    fn try_send(&mut self, event: PlayerEvent) -> bool {
        self.push(event).is_ok()
    }
}

impl MessageReceiver for std::collections::VecDeque<PlayerMessage> {
    fn pop(&mut self) -> Option<PlayerMessage> {
        self.pop_front()
    }
}

impl EventSender for Vec<PlayerEvent> {
    fn try_send(&mut self, event: PlayerEvent) -> bool {
        self.push(event);
        true
    }
}
