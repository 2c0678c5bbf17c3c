//! Song playback.
//!
//! [`play`] renders a whole song offline. [`Player`] is the realtime side:
//! it lives on the audio thread, takes [`PlayerMessage`]s through a
//! single-producer/single-consumer queue, and reports [`PlayerEvent`]s back
//! through another one without ever blocking. Nothing on the audio thread
//! encodes, builds a synth, frees one, or logs: the handle prepares patches
//! and synths, and whatever the player replaces comes back to it as
//! [`Retired`] to be dropped there.
//!
//! ```text
//!  control thread                      audio thread
//!  ──────────────                      ────────────
//!  PlayerHandle ──PlayerMessage──▶ Player::process(buffer)
//!        ▲                               │ Sequencer ─▶ Synth
//!        └─────────PlayerEvent───────────┘
//! ```

pub mod message;
pub mod sequencer;

use std::ops::Range;

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer, PushError, RingBuffer};

#[cfg(feature = "rtrb")]
use crate::encode::{encode, AllFeatures};
use crate::encode::EncodedPatch;
#[cfg(feature = "rtrb")]
use crate::error::SendError;
use crate::error::{EncodeError, UpdateError};
use crate::score::SongPos;
use crate::{Patch, Score, Song, Synth, MAX_VOICES, SAMPLE_RATE};

pub use message::{
    Alert, AlertPriority, EventSender, MessageReceiver, NoteId, PlayerEvent, PlayerMessage,
    PlayerStatus, Retired,
};
pub use sequencer::{play, Loop, NoteTarget, RenderOptions, Sequencer, SongAudio};

/// Render calls one `process` may take to fill its buffer.
const MAX_RENDER_CALLS: usize = 10_000;

/// Time constant of the voice level meters, in samples.
const LEVEL_DECAY: f64 = 15_000.0;

/// Realtime player settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub message_capacity: usize,
    pub status_capacity: usize,
    /// Samples between periodic status updates.
    pub status_interval: usize,
    /// Samples rendered after the song ends before it counts as finished.
    pub tail_samples: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            message_capacity: 256,
            status_capacity: 256,
            status_interval: 4410,
            tail_samples: SAMPLE_RATE as usize,
        }
    }
}

impl PlayerConfig {
    pub fn message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = capacity;
        self
    }

    pub fn status_capacity(mut self, capacity: usize) -> Self {
        self.status_capacity = capacity;
        self
    }

    pub fn status_interval(mut self, samples: usize) -> Self {
        self.status_interval = samples;
        self
    }

    pub fn tail_samples(mut self, samples: usize) -> Self {
        self.tail_samples = samples;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Owner {
    #[default]
    Nobody,
    Track,
    Manual(NoteId),
}

#[derive(Debug, Clone, Copy, Default)]
struct VoiceMeter {
    owner: Owner,
    sustain: bool,
    since_event: usize,
    level: f32,
}

/// Routes notes to the synth, if there is one, and keeps the meters in step.
struct Voices<'a> {
    synth: Option<&'a mut Synth>,
    meters: &'a mut [VoiceMeter; MAX_VOICES],
    muted: u32,
}

impl<'a> Voices<'a> {
    fn new(
        synth: &'a mut Option<Box<Synth>>,
        meters: &'a mut [VoiceMeter; MAX_VOICES],
        muted: u32,
    ) -> Self {
        Self {
            synth: synth.as_deref_mut(),
            meters,
            muted,
        }
    }

    fn start(&mut self, voice: usize, note: u8, owner: Owner) {
        let Some(synth) = self.synth.as_deref_mut() else {
            return;
        };
        if voice >= MAX_VOICES || self.muted & (1 << voice) != 0 {
            return;
        }
        self.meters[voice] = VoiceMeter {
            owner,
            sustain: true,
            since_event: 0,
            level: 1.0,
        };
        synth.trigger(voice, note);
    }

    fn stop(&mut self, voice: usize) {
        let Some(synth) = self.synth.as_deref_mut() else {
            return;
        };
        if let Some(meter) = self.meters.get_mut(voice) {
            meter.sustain = false;
            meter.since_event = 0;
        }
        synth.release(voice);
    }

    /// A voice for a manual note: released voices first, then the one that
    /// has sounded longest.
    fn pick(&self, voices: Range<usize>) -> Option<usize> {
        voices
            .filter(|&v| v < MAX_VOICES)
            .max_by_key(|&v| (!self.meters[v].sustain, self.meters[v].since_event))
    }
}

impl NoteTarget for Voices<'_> {
    fn trigger(&mut self, voice: usize, note: u8) {
        self.start(voice, note, Owner::Track);
    }

    fn release(&mut self, voice: usize) {
        self.stop(voice);
    }
}

/// Voices of muted instruments, as a bit mask.
pub fn muted_voices(patch: &Patch) -> u32 {
    patch
        .iter()
        .enumerate()
        .filter(|(_, instr)| instr.mute)
        .flat_map(|(i, instr)| {
            let first = patch.first_voice_for_instrument(i);
            first..first + instr.num_voices
        })
        .filter(|&v| v < MAX_VOICES)
        .fold(0, |mask, v| mask | 1 << v)
}

/// The audio-thread half of realtime playback.
pub struct Player<R, S> {
    receiver: R,
    sender: S,
    config: PlayerConfig,
    synth: Option<Box<Synth>>,
    muted: u32,
    sequencer: Sequencer,
    playing: bool,
    /// Tail samples still to render after the song ended.
    tail_left: Option<usize>,
    finished: bool,
    meters: [VoiceMeter; MAX_VOICES],
    since_status: usize,
    dropped: u64,
}

#[cfg(feature = "rtrb")]
impl Player<Consumer<PlayerMessage>, Producer<PlayerEvent>> {
    /// A player and the handle that controls it from another thread.
    pub fn new(config: PlayerConfig) -> (Self, PlayerHandle) {
        let (tx, receiver) = RingBuffer::new(config.message_capacity);
        let (sender, rx) = RingBuffer::new(config.status_capacity);
        (Self::with_channels(receiver, sender, config), PlayerHandle { tx, rx })
    }
}

impl<R: MessageReceiver, S: EventSender> Player<R, S> {
    pub fn with_channels(receiver: R, sender: S, config: PlayerConfig) -> Self {
        let song = Song::default();
        let samples_per_row = song.samples_per_row();
        Self {
            receiver,
            sender,
            config,
            synth: None,
            muted: 0,
            sequencer: Sequencer::new(song.score, samples_per_row),
            playing: false,
            tail_left: None,
            finished: false,
            meters: [VoiceMeter::default(); MAX_VOICES],
            since_status: 0,
            dropped: 0,
        }
    }

    /// Builds the synth and loads the score and tempo of `song`. Meant to be
    /// called before the player moves to the audio thread.
    pub fn load(&mut self, song: &Song) -> Result<(), EncodeError> {
        self.synth = Some(Box::new(Synth::new(&song.patch, song.bpm)?));
        self.muted = muted_voices(&song.patch);
        self.sequencer.set_score(song.score.clone());
        self.sequencer.set_samples_per_row(song.samples_per_row());
        Ok(())
    }

    /// Plays the song again from the start when it ends.
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.sequencer = self.sequencer.with_repeat(repeat);
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn status(&self) -> PlayerStatus {
        let mut voice_levels = [0.0; MAX_VOICES];
        for (level, meter) in voice_levels.iter_mut().zip(&self.meters) {
            *level = meter.level;
        }
        PlayerStatus {
            position: self.sequencer.position(),
            playing: self.playing,
            finished: self.finished,
            panic: self.synth.is_none(),
            voice_levels,
            dropped: self.dropped,
        }
    }

    /// Fills `buffer` with audio, applying pending messages first.
    pub fn process(&mut self, buffer: &mut [[f32; 2]]) {
        self.drain_messages();
        let mut done = 0;
        let mut calls = 0;
        while done < buffer.len() {
            if calls == MAX_RENDER_CALLS {
                self.retire_synth();
                buffer[done..].fill([0.0; 2]);
                self.alert(Alert::Stalled { calls });
                break;
            }
            calls += 1;
            if self.playing && self.sequencer.row_due() {
                self.advance_row();
            }
            let max_time = if self.playing {
                self.sequencer.time_left()
            } else {
                i32::MAX
            };
            let rest = &mut buffer[done..];
            let result = self.synth.as_mut().map(|synth| synth.render(rest, max_time));
            let (samples, time) = match result {
                Some(Ok(rendered)) => (rendered.samples, rendered.time),
                Some(Err(err)) => {
                    self.retire_synth();
                    self.alert(Alert::RenderFailed(err));
                    (err.samples, err.time)
                }
                None => {
                    let n = rest.len().min(usize::try_from(max_time).unwrap_or(0));
                    rest[..n].fill([0.0; 2]);
                    (n, n as i32)
                }
            };
            if self.playing {
                self.sequencer.advance_time(time);
            }
            self.rendered(samples);
            done += samples;
        }
        if self.since_status >= self.config.status_interval {
            self.send_status();
        }
    }

    fn drain_messages(&mut self) {
        while let Some(message) = self.receiver.pop() {
            self.handle(message);
        }
    }

    fn handle(&mut self, message: PlayerMessage) {
        match message {
            PlayerMessage::ReplacePatch { code, muted } => self.replace_patch(code, muted),
            PlayerMessage::ReplaceSynth { synth, muted } => {
                self.retire_synth();
                self.synth = Some(synth);
                self.muted = muted;
                self.release_muted();
            }
            PlayerMessage::ReplaceScore(score) => self.replace_score(score),
            PlayerMessage::SetSamplesPerRow(samples) => {
                self.sequencer.set_samples_per_row(samples)
            }
            PlayerMessage::SetLoop(region) => self.sequencer.set_loop(region),
            PlayerMessage::Play(pos) => {
                let mut voices = Voices::new(&mut self.synth, &mut self.meters, self.muted);
                self.sequencer.release_all(&mut voices);
                self.sequencer.start_at(pos);
                self.playing = true;
                self.finished = false;
                self.tail_left = None;
            }
            PlayerMessage::Stop => self.stop(),
            PlayerMessage::TriggerManual { id, voices, note } => {
                self.release_manual(id);
                let mut target = Voices::new(&mut self.synth, &mut self.meters, self.muted);
                if let Some(voice) = target.pick(voices) {
                    target.start(voice, note, Owner::Manual(id));
                }
            }
            PlayerMessage::ReleaseManual(id) => self.release_manual(id),
            PlayerMessage::Panic => self.retire_synth(),
        }
    }

    fn replace_patch(&mut self, mut code: Box<EncodedPatch>, muted: u32) {
        let result = match self.synth.as_deref_mut() {
            Some(synth) => synth.swap_encoded(&mut code),
            None => Err(UpdateError::NoSynth),
        };
        self.retire(Retired::Code(code));
        match result {
            Ok(()) => {
                self.muted = muted;
                self.release_muted();
            }
            Err(err) => self.alert(Alert::PatchRejected(err)),
        }
    }

    fn replace_score(&mut self, mut score: Box<Score>) {
        let new = std::mem::take(&mut *score);
        *score = self.sequencer.set_score(new);
        self.retire(Retired::Score(score));
    }

    fn release_muted(&mut self) {
        let muted = self.muted;
        let mut voices = Voices::new(&mut self.synth, &mut self.meters, muted);
        for voice in (0..MAX_VOICES).filter(|v| muted & (1 << v) != 0) {
            voices.stop(voice);
        }
    }

    fn release_manual(&mut self, id: NoteId) {
        let mut voices = Voices::new(&mut self.synth, &mut self.meters, self.muted);
        for voice in 0..MAX_VOICES {
            let meter = voices.meters[voice];
            if meter.sustain && meter.owner == Owner::Manual(id) {
                voices.stop(voice);
            }
        }
    }

    fn stop(&mut self) {
        self.playing = false;
        let mut voices = Voices::new(&mut self.synth, &mut self.meters, self.muted);
        self.sequencer.release_all(&mut voices);
    }

    fn advance_row(&mut self) {
        let mut voices = Voices::new(&mut self.synth, &mut self.meters, self.muted);
        if self.sequencer.step_row(&mut voices) {
            self.send_status();
            return;
        }
        self.stop();
        self.tail_left = Some(self.config.tail_samples);
        self.rendered(0);
    }

    /// Book-keeping after `samples` frames: meters decay, the tail runs out,
    /// and status is due.
    fn rendered(&mut self, samples: usize) {
        let alpha = (-(samples as f64) / LEVEL_DECAY).exp() as f32;
        for meter in &mut self.meters {
            meter.since_event = meter.since_event.saturating_add(samples);
            meter.level = if meter.sustain {
                (meter.level - 0.5) * alpha + 0.5
            } else {
                meter.level * alpha
            };
        }
        self.since_status += samples;
        if let Some(left) = self.tail_left {
            let left = left.saturating_sub(samples);
            if left == 0 {
                self.tail_left = None;
                self.finished = true;
                self.send_status();
            } else {
                self.tail_left = Some(left);
            }
        }
    }

    fn send_status(&mut self) {
        self.since_status = 0;
        let status = self.status();
        if !self.sender.try_send(PlayerEvent::Status(status)) {
            self.dropped += 1;
        }
    }

    fn alert(&mut self, alert: Alert) {
        if !self.sender.try_send(PlayerEvent::Alert(alert)) {
            self.dropped += 1;
        }
    }

    fn retire_synth(&mut self) {
        if let Some(synth) = self.synth.take() {
            self.retire(Retired::Synth(synth));
        }
    }

    fn retire(&mut self, retired: Retired) {
        if !self.sender.try_send(PlayerEvent::Retired(retired)) {
            self.dropped += 1;
        }
    }
}

/// The control-thread half of realtime playback. Every call returns at once.
#[cfg(feature = "rtrb")]
pub struct PlayerHandle {
    tx: Producer<PlayerMessage>,
    rx: Consumer<PlayerEvent>,
}

#[cfg(feature = "rtrb")]
impl PlayerHandle {
    /// Queues `message`, handing it back when the queue is full.
    pub fn send(&mut self, message: PlayerMessage) -> Result<(), PlayerMessage> {
        if let Err(PushError::Full(message)) = self.tx.push(message) {
            return Err(message);
        }
        Ok(())
    }

    pub fn try_recv(&mut self) -> Option<PlayerEvent> {
        self.rx.pop().ok()
    }

    /// Events received so far.
    pub fn events(&mut self) -> impl Iterator<Item = PlayerEvent> + '_ {
        std::iter::from_fn(|| self.rx.pop().ok())
    }

    pub fn play(&mut self, from: SongPos) -> Result<(), PlayerMessage> {
        log::info!("play from pattern {} row {}", from.order_row, from.pattern_row);
        self.send(PlayerMessage::Play(from))
    }

    pub fn stop(&mut self) -> Result<(), PlayerMessage> {
        log::info!("stop");
        self.send(PlayerMessage::Stop)
    }

    pub fn set_loop(&mut self, region: Loop) -> Result<(), PlayerMessage> {
        log::info!("loop {} patterns from {}", region.length, region.start);
        self.send(PlayerMessage::SetLoop(region))
    }

    /// Silences the player until a new synth arrives.
    pub fn panic(&mut self) -> Result<(), PlayerMessage> {
        log::info!("panic");
        self.send(PlayerMessage::Panic)
    }

    /// Encodes an edited patch here and sends it to be swapped in place.
    /// If the player answers with [`Alert::PatchRejected`], follow up with
    /// [`replace_synth`](Self::replace_synth).
    pub fn replace_patch(&mut self, patch: &Patch, bpm: i32) -> Result<(), SendError> {
        let code = encode(patch, &AllFeatures, bpm)?;
        for warning in patch.warnings() {
            log::warn!("{warning}");
        }
        self.send(PlayerMessage::ReplacePatch {
            code: Box::new(code),
            muted: muted_voices(patch),
        })
        .map_err(SendError::QueueFull)
    }

    /// Builds a fresh synth for `patch` here and sends it over. All voices
    /// start silent.
    pub fn replace_synth(&mut self, patch: &Patch, bpm: i32) -> Result<(), SendError> {
        let synth = Synth::new(patch, bpm)?;
        log::debug!("sending a new synth with {} voices", synth.num_voices());
        self.send(PlayerMessage::ReplaceSynth {
            synth: Box::new(synth),
            muted: muted_voices(patch),
        })
        .map_err(SendError::QueueFull)
    }

    pub fn trigger(
        &mut self,
        id: NoteId,
        voices: Range<usize>,
        note: u8,
    ) -> Result<(), PlayerMessage> {
        self.send(PlayerMessage::TriggerManual { id, voices, note })
    }

    pub fn release(&mut self, id: NoteId) -> Result<(), PlayerMessage> {
        self.send(PlayerMessage::ReleaseManual(id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::encode::AllFeatures;
    use crate::error::SynthError;
    use crate::{Instrument, Track, Unit, UnitKind};

    type TestPlayer = Player<VecDeque<PlayerMessage>, Vec<PlayerEvent>>;

    fn tone(voices: usize) -> Instrument {
        Instrument::new(
            "tone",
            voices,
            vec![
                Unit::new(UnitKind::Envelope),
                Unit::new(UnitKind::Oscillator),
                Unit::new(UnitKind::Mulp),
                Unit::new(UnitKind::Pan),
                Unit::new(UnitKind::Out),
            ],
        )
    }

    fn song(patch: Vec<Instrument>, tracks: Vec<Track>) -> Song {
        Song {
            bpm: 120,
            rows_per_beat: 4,
            score: Score {
                rows_per_pattern: 2,
                length: 1,
                tracks,
            },
            patch: Patch(patch),
        }
    }

    fn player(song: &Song, config: PlayerConfig) -> TestPlayer {
        let mut player = Player::with_channels(VecDeque::new(), Vec::new(), config);
        player.load(song).expect("load");
        player
    }

    fn note(player: &TestPlayer, voice: usize) -> (u8, bool) {
        let v = player
            .synth
            .as_ref()
            .and_then(|s| s.voice(voice))
            .expect("voice");
        (v.note, v.sustain)
    }

    #[test]
    fn playing_walks_rows_and_reports_status() {
        let s = song(vec![tone(2)], vec![Track::new(2, vec![0], vec![vec![60, 64]])]);
        let spr = s.samples_per_row();
        let mut player = player(&s, PlayerConfig::default());
        player.handle(PlayerMessage::Play(SongPos::default()));
        let mut buffer = vec![[0.0f32; 2]; 2 * spr];
        player.process(&mut buffer);

        assert!(player.is_playing());
        assert_eq!(player.status().position, SongPos::new(0, 1));
        assert_eq!(note(&player, 1), (60, false), "released by the next note");
        assert_eq!(note(&player, 0), (64, true));
        assert!(buffer.iter().flatten().any(|x| x.abs() > 0.01));
        let statuses = player
            .sender
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Status(_)))
            .count();
        assert!(statuses >= 2, "one per row");
    }

    #[test]
    fn manual_notes_prefer_released_then_oldest_voices() {
        let s = song(vec![tone(3)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        let trigger = |player: &mut TestPlayer, id: u32, note: u8| {
            player.handle(PlayerMessage::TriggerManual {
                id: NoteId(id),
                voices: 0..3,
                note,
            })
        };
        trigger(&mut player, 1, 60);
        trigger(&mut player, 2, 62);
        trigger(&mut player, 3, 64);
        assert_eq!(note(&player, 2), (60, true));
        assert_eq!(note(&player, 1), (62, true));
        assert_eq!(note(&player, 0), (64, true));

        player.process(&mut [[0.0; 2]; 100]);
        player.handle(PlayerMessage::ReleaseManual(NoteId(2)));
        assert_eq!(note(&player, 1), (62, false));
        trigger(&mut player, 4, 66);
        assert_eq!(note(&player, 1), (66, true), "the released voice");
        trigger(&mut player, 5, 68);
        assert_eq!(note(&player, 2), (68, true), "the oldest voice");
    }

    #[test]
    fn retriggering_an_id_releases_its_previous_voice() {
        let s = song(vec![tone(2)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        for n in [60, 62] {
            player.handle(PlayerMessage::TriggerManual {
                id: NoteId(7),
                voices: 0..2,
                note: n,
            });
            player.process(&mut [[0.0; 2]; 10]);
        }
        assert_eq!(note(&player, 1), (60, false));
        assert_eq!(note(&player, 0), (62, true));
    }

    #[test]
    fn muted_instruments_are_not_triggered() {
        let mut muted = tone(1);
        muted.mute = true;
        let s = song(vec![muted, tone(1)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        for voice in 0..2 {
            player.handle(PlayerMessage::TriggerManual {
                id: NoteId(voice as u32),
                voices: voice..voice + 1,
                note: 60,
            });
        }
        assert_eq!(note(&player, 0), (0, false));
        assert_eq!(note(&player, 1), (60, true));
    }

    #[test]
    fn render_failure_drops_the_synth_and_goes_silent() {
        let broken = Instrument::new("pop", 1, vec![Unit::new(UnitKind::Pop)]);
        let s = song(vec![broken], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        let mut buffer = vec![[1.0f32; 2]; 64];
        player.process(&mut buffer);

        assert!(buffer.iter().flatten().all(|&x| x == 0.0));
        assert!(player.status().panic);
        let alert = player.sender.iter().find_map(|e| match e {
            PlayerEvent::Alert(Alert::RenderFailed(err)) => Some(err.error),
            _ => None,
        });
        assert_eq!(alert, Some(SynthError::StackUnderflow { voice: 0, unit: 0 }));
    }

    #[test]
    fn song_end_runs_the_tail_then_finishes() {
        let s = song(vec![tone(1)], vec![Track::new(1, vec![0], vec![vec![60, 1]])]);
        let spr = s.samples_per_row();
        let mut player = player(&s, PlayerConfig::default().tail_samples(100));
        player.handle(PlayerMessage::Play(SongPos::default()));
        player.process(&mut vec![[0.0f32; 2]; 2 * spr]);
        assert!(player.is_playing());
        assert!(!player.status().finished);

        player.process(&mut vec![[0.0f32; 2]; 150]);
        assert!(!player.is_playing());
        assert!(player.status().finished);
        assert_eq!(note(&player, 0), (60, false), "released at the end");
    }

    fn encoded(patch: &Patch) -> Box<EncodedPatch> {
        Box::new(crate::encode::encode(patch, &AllFeatures, 120).expect("encode"))
    }

    fn retired(player: &TestPlayer) -> (usize, usize, usize) {
        player.sender.iter().fold((0, 0, 0), |(synths, codes, scores), e| match e {
            PlayerEvent::Retired(Retired::Synth(_)) => (synths + 1, codes, scores),
            PlayerEvent::Retired(Retired::Code(_)) => (synths, codes + 1, scores),
            PlayerEvent::Retired(Retired::Score(_)) => (synths, codes, scores + 1),
            _ => (synths, codes, scores),
        })
    }

    fn rejection(player: &TestPlayer) -> Option<UpdateError> {
        player.sender.iter().rev().find_map(|e| match e {
            PlayerEvent::Alert(Alert::PatchRejected(err)) => Some(err.clone()),
            _ => None,
        })
    }

    #[test]
    fn edited_byte_code_is_swapped_in_and_the_old_one_handed_back() {
        let s = song(vec![tone(1)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        let original = player.synth.as_ref().expect("synth").encoded().clone();
        let mut louder = tone(1);
        louder.units[3] = Unit::new(UnitKind::Pan).with_param("panning", 0);
        player.handle(PlayerMessage::ReplacePatch {
            code: encoded(&Patch(vec![louder])),
            muted: 0,
        });
        assert!(!player.status().panic);
        assert_eq!(rejection(&player), None);
        let handed_back = player.sender.iter().find_map(|e| match e {
            PlayerEvent::Retired(Retired::Code(code)) => Some(code.as_ref().clone()),
            _ => None,
        });
        assert_eq!(handed_back, Some(original));
    }

    #[test]
    fn patches_the_synth_cannot_take_are_rejected() {
        let s = song(vec![tone(1)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        let mut echo = tone(1);
        echo.units.insert(
            4,
            Unit::new(UnitKind::Delay)
                .with_param("stereo", 1)
                .with_var_args(vec![100, 101]),
        );
        player.handle(PlayerMessage::ReplacePatch {
            code: encoded(&Patch(vec![echo.clone()])),
            muted: 0,
        });
        assert_eq!(
            rejection(&player),
            Some(UpdateError::DelayLinesChanged { old: 0, new: 2 })
        );
        assert!(!player.status().panic, "the old patch keeps playing");
        assert_eq!(retired(&player), (0, 1, 0), "rejected code comes back too");

        let fresh = Synth::new(&Patch(vec![echo]), 120).expect("encode");
        player.handle(PlayerMessage::ReplaceSynth {
            synth: Box::new(fresh),
            muted: 0,
        });
        assert_eq!(player.synth.as_ref().map(|s| s.encoded().num_delay_lines), Some(2));
        assert_eq!(retired(&player), (1, 1, 0), "the replaced synth is handed back");
    }

    #[test]
    fn after_a_panic_only_a_new_synth_helps() {
        let s = song(vec![tone(1)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        player.handle(PlayerMessage::Panic);
        assert!(player.status().panic);
        assert_eq!(retired(&player), (1, 0, 0));
        player.process(&mut [[0.0; 2]; 16]);

        player.handle(PlayerMessage::ReplacePatch {
            code: encoded(&s.patch),
            muted: 0,
        });
        assert_eq!(rejection(&player), Some(UpdateError::NoSynth));
        assert!(player.status().panic);

        let fresh = Synth::new(&s.patch, 120).expect("encode");
        player.handle(PlayerMessage::ReplaceSynth {
            synth: Box::new(fresh),
            muted: 0,
        });
        assert!(!player.status().panic);
    }

    #[test]
    fn replaced_scores_are_handed_back() {
        let s = song(vec![tone(1)], vec![Track::new(1, vec![0], vec![vec![60]])]);
        let mut player = player(&s, PlayerConfig::default());
        let mut edited = s.score.clone();
        edited.tracks[0].patterns[0].set(1, 62);
        player.handle(PlayerMessage::ReplaceScore(Box::new(edited.clone())));
        assert_eq!(player.sequencer.score(), &edited);
        let old = player.sender.iter().find_map(|e| match e {
            PlayerEvent::Retired(Retired::Score(score)) => Some(score.as_ref().clone()),
            _ => None,
        });
        assert_eq!(old, Some(s.score.clone()));
    }

    thread_local! {
        static LOGGED: std::cell::Cell<usize> = std::cell::Cell::new(0);
    }

    /// Counts records from the current thread only, so parallel tests do
    /// not interfere.
    struct CountingLogger;

    impl log::Log for CountingLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, _: &log::Record) {
            LOGGED.with(|n| n.set(n.get() + 1));
        }

        fn flush(&self) {}
    }

    static LOGGER: CountingLogger = CountingLogger;

    #[test]
    fn the_audio_path_never_logs() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
        let s = song(vec![tone(1)], vec![Track::new(1, vec![0], vec![vec![60, 0]])]);
        let spr = s.samples_per_row();
        let mut player = player(&s, PlayerConfig::default().tail_samples(10));
        let code = encoded(&s.patch);
        let fresh = Synth::new(&s.patch, 120).expect("encode");
        LOGGED.with(|n| n.set(0));

        player.handle(PlayerMessage::Play(SongPos::default()));
        player.process(&mut vec![[0.0f32; 2]; spr + 1]);
        player.handle(PlayerMessage::ReplacePatch { code, muted: 0 });
        player.handle(PlayerMessage::ReplaceScore(Box::new(s.score.clone())));
        player.handle(PlayerMessage::Panic);
        player.handle(PlayerMessage::ReplaceSynth {
            synth: Box::new(fresh),
            muted: 0,
        });
        player.process(&mut vec![[0.0f32; 2]; 2 * spr]);
        player.handle(PlayerMessage::Stop);
        assert_eq!(LOGGED.with(|n| n.get()), 0);

        log::info!("counted");
        assert_eq!(LOGGED.with(|n| n.get()), 1, "logger is installed");
    }

    #[test]
    fn level_meters_decay() {
        let s = song(vec![tone(1)], Vec::new());
        let mut player = player(&s, PlayerConfig::default());
        player.handle(PlayerMessage::TriggerManual {
            id: NoteId(1),
            voices: 0..1,
            note: 60,
        });
        player.handle(PlayerMessage::ReleaseManual(NoteId(1)));
        player.process(&mut vec![[0.0f32; 2]; 15_000]);
        let level = player.status().voice_levels[0];
        assert!((level - (-1.0f32).exp()).abs() < 1e-3, "{level}");
    }
}
