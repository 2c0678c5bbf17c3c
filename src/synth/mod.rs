//! The synthesizer: 32 voices running encoded byte code on a stack machine.
//!
//! A [`Synth`] owns everything a render touches (voice workspaces, delay
//! lines, the noise seed, the sample bank), so any number of them can run
//! side by side. Nothing is allocated while rendering.
//!
//! ```text
//!   trigger / release ──► voices[0..32] ──┐
//!                                         ├──► stack machine ──► [left, right]
//!   EncodedPatch ─────────────────────────┘         │
//!                                                   └──► speed: song time
//! ```

mod interpreter;
pub mod stack;
pub mod voice;

use std::sync::Arc;

use crate::dsp::delay::DelayLine;
use crate::dsp::noise::Rng;
use crate::encode::{encode, AllFeatures, EncodedPatch};
use crate::error::{EncodeError, RenderError, SynthError, UpdateError};
use crate::{Patch, MAX_VOICES, SYNC_INTERVAL};

pub use stack::Stack;
pub use voice::{UnitSlot, Voice};

/// Result of a successful [`Synth::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rendered {
    /// Frames written to the buffer.
    pub samples: usize,
    /// Song time advanced, which `speed` units make differ from `samples`.
    pub time: i32,
}

#[derive(Debug)]
struct SynthState {
    voices: Vec<Voice>,
    /// Master left/right followed by three aux pairs.
    outputs: [f32; 8],
    rng: Rng,
    global_time: u32,
    delay_lines: Vec<DelayLine>,
    stack: Stack,
    /// Captured sync values, when capture is on.
    syncs: Option<Vec<f32>>,
}

impl SynthState {
    fn new(delay_lines: usize) -> Self {
        Self {
            voices: vec![Voice::default(); MAX_VOICES],
            outputs: [0.0; 8],
            rng: Rng::default(),
            global_time: 0,
            delay_lines: (0..delay_lines).map(|_| DelayLine::new()).collect(),
            stack: Stack::new(),
            syncs: None,
        }
    }
}

pub struct Synth {
    code: EncodedPatch,
    samples: Arc<[i16]>,
    state: SynthState,
    num_syncs: usize,
    faulted: bool,
}

impl std::fmt::Debug for Synth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synth")
            .field("num_voices", &self.code.num_voices)
            .field("num_delay_lines", &self.code.num_delay_lines)
            .field("global_time", &self.state.global_time)
            .field("faulted", &self.faulted)
            .finish()
    }
}

impl Synth {
    /// Encodes `patch` and builds a synth for it. `bpm` sets beat-synced
    /// delay times.
    pub fn new(patch: &Patch, bpm: i32) -> Result<Self, EncodeError> {
        let code = encode(patch, &AllFeatures, bpm)?;
        let num_syncs = patch.num_syncs();
        Ok(Self::build(code, num_syncs))
    }

    /// A synth for byte code that was encoded with [`AllFeatures`].
    pub fn from_encoded(code: EncodedPatch) -> Result<Self, SynthError> {
        if code.num_voices > MAX_VOICES {
            return Err(SynthError::TooManyVoices {
                voices: code.num_voices,
            });
        }
        let num_syncs = count_syncs(&code);
        Ok(Self::build(code, num_syncs))
    }

    fn build(code: EncodedPatch, num_syncs: usize) -> Self {
        Self {
            state: SynthState::new(code.num_delay_lines),
            code,
            samples: Arc::from(Vec::new()),
            num_syncs,
            faulted: false,
        }
    }

    /// Sample bank that `sample` oscillators read, as 16-bit PCM.
    pub fn with_samples(mut self, samples: Arc<[i16]>) -> Self {
        self.samples = samples;
        self
    }

    pub fn encoded(&self) -> &EncodedPatch {
        &self.code
    }

    pub fn num_voices(&self) -> usize {
        self.code.num_voices
    }

    /// Sync units executed per sample, over all voices.
    pub fn num_syncs(&self) -> usize {
        self.num_syncs
    }

    /// Restarts `voice` with `note`. Every unit of the voice starts from
    /// zeroed state; delay lines keep ringing.
    pub fn trigger(&mut self, voice: usize, note: u8) {
        if let Some(v) = self.state.voices.get_mut(voice) {
            *v = Voice::triggered(note);
        }
    }

    pub fn release(&mut self, voice: usize) {
        if let Some(v) = self.state.voices.get_mut(voice) {
            v.sustain = false;
        }
    }

    pub fn voice(&self, voice: usize) -> Option<&Voice> {
        self.state.voices.get(voice)
    }

    /// Swaps in a new version of the patch without silencing the synth.
    ///
    /// Voice state is kept when only parameter values changed, and reset
    /// when the commands differ. A different number of delay lines cannot be
    /// swapped in place; build a new synth instead. A successful update also
    /// clears a previous render error.
    pub fn update(&mut self, patch: &Patch, bpm: i32) -> Result<(), UpdateError> {
        let mut code = encode(patch, &AllFeatures, bpm)?;
        self.swap_encoded(&mut code)
    }

    /// [`update`](Self::update) with byte code encoded elsewhere. On success
    /// `code` holds the replaced byte code, so the caller decides where it
    /// is freed; on error both are left untouched. Does not allocate.
    pub fn swap_encoded(&mut self, code: &mut EncodedPatch) -> Result<(), UpdateError> {
        if code.num_voices > MAX_VOICES {
            return Err(UpdateError::TooManyVoices {
                voices: code.num_voices,
            });
        }
        if code.num_delay_lines != self.code.num_delay_lines {
            return Err(UpdateError::DelayLinesChanged {
                old: self.code.num_delay_lines,
                new: code.num_delay_lines,
            });
        }
        if code.commands != self.code.commands {
            for v in &mut self.state.voices {
                v.reset_units();
            }
        }
        self.num_syncs = count_syncs(code);
        std::mem::swap(&mut self.code, code);
        self.faulted = false;
        Ok(())
    }

    /// Starts recording sync values. Every [`SYNC_INTERVAL`] samples the
    /// record gets the sample time followed by one value per sync unit.
    pub fn capture_syncs(&mut self, capture: bool) {
        self.state.syncs = capture.then(Vec::new);
    }

    /// Takes the sync values recorded so far.
    pub fn take_syncs(&mut self) -> Vec<f32> {
        self.state
            .syncs
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Renders into `buffer` until it is full or `max_time` of song time has
    /// passed. Callers loop, since one sample can advance time by any amount
    /// when `speed` units are active.
    ///
    /// Only the master pair of outputs reaches the buffer; aux outputs carry
    /// over to the next sample for `in` units to read. On error the frames
    /// rendered so far stay in the buffer and the synth refuses to render
    /// until it is updated.
    pub fn render(
        &mut self,
        buffer: &mut [[f32; 2]],
        max_time: i32,
    ) -> Result<Rendered, RenderError> {
        let mut done = Rendered::default();
        if self.faulted {
            return Err(RenderError {
                error: SynthError::Faulted,
                samples: 0,
                time: 0,
            });
        }
        while done.time < max_time && done.samples < buffer.len() {
            if self.num_syncs > 0 && self.state.global_time % SYNC_INTERVAL == 0 {
                if let Some(syncs) = self.state.syncs.as_mut() {
                    syncs.push(self.state.global_time as f32);
                }
            }
            let result = interpreter::render_sample(&mut self.state, &self.code, &self.samples);
            let frame = match result {
                Ok(frame) => frame,
                Err(error) => {
                    self.faulted = true;
                    return Err(RenderError {
                        error,
                        samples: done.samples,
                        time: done.time,
                    });
                }
            };
            buffer[done.samples] = [frame.left, frame.right];
            done.samples += 1;
            done.time += 1 + frame.extra_time;
            self.state.global_time = self.state.global_time.wrapping_add(1);
        }
        Ok(done)
    }
}

/// Sync units run per sample, read from byte code.
fn count_syncs(code: &EncodedPatch) -> usize {
    let sync = crate::UnitKind::Sync.id();
    let per_instrument = code
        .commands
        .split(|&c| c == 0)
        .map(|instr| instr.iter().filter(|&&c| c >> 1 == sync).count());
    code.instrument_voices()
        .zip(per_instrument)
        .map(|(voices, syncs)| voices * syncs)
        .sum()
}
