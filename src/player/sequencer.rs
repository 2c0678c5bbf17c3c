//! Walks a score row by row, turning note bytes into voice triggers and
//! releases, and renders whole songs offline.

use crate::error::PlayError;
use crate::score::{SongPos, HOLD};
use crate::{Score, Song, Synth, MAX_VOICES};

/// Render calls a single row may take before the song is considered stuck.
const MAX_ROW_RENDER_CALLS: usize = 100;

/// Repeated region of the order list, in patterns. Zero length disables it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loop {
    pub start: usize,
    pub length: usize,
}

impl Loop {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn is_active(&self) -> bool {
        self.length > 0
    }

    /// First order row after the loop.
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Whatever plays the notes the sequencer reads.
pub trait NoteTarget {
    fn trigger(&mut self, voice: usize, note: u8);
    fn release(&mut self, voice: usize);
}

impl NoteTarget for Synth {
    fn trigger(&mut self, voice: usize, note: u8) {
        Synth::trigger(self, voice, note);
    }

    fn release(&mut self, voice: usize) {
        Synth::release(self, voice);
    }
}

/// Score playback state: position, row timing and the voice each track
/// last triggered.
#[derive(Debug, Clone)]
pub struct Sequencer {
    score: Score,
    samples_per_row: usize,
    /// Row that plays once the current one has elapsed; `None` past the end.
    next: Option<SongPos>,
    current: SongPos,
    row_time: usize,
    cursors: Vec<usize>,
    loop_region: Loop,
    repeat: bool,
}

impl Sequencer {
    pub fn new(score: Score, samples_per_row: usize) -> Self {
        let mut sequencer = Self {
            cursors: Vec::with_capacity(MAX_VOICES),
            score,
            samples_per_row,
            next: Some(SongPos::default()),
            current: SongPos::default(),
            row_time: samples_per_row,
            loop_region: Loop::default(),
            repeat: false,
        };
        sequencer.reset_cursors();
        sequencer
    }

    /// Builds a sequencer for `song` at its own tempo.
    pub fn for_song(song: &Song) -> Self {
        Self::new(song.score.clone(), song.samples_per_row())
    }

    /// Wraps to the start instead of finishing at the end of the song.
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    /// Row currently sounding.
    pub fn position(&self) -> SongPos {
        self.current
    }

    pub fn samples_per_row(&self) -> usize {
        self.samples_per_row
    }

    pub fn set_samples_per_row(&mut self, samples_per_row: usize) {
        self.samples_per_row = samples_per_row;
    }

    pub fn loop_region(&self) -> Loop {
        self.loop_region
    }

    pub fn set_loop(&mut self, loop_region: Loop) {
        self.loop_region = loop_region;
    }

    /// Swaps the score, keeping the position when it still exists, and
    /// returns the old one. Voice cursors restart when the track layout
    /// changed.
    pub fn set_score(&mut self, score: Score) -> Score {
        let layout_changed = score.tracks.len() != self.score.tracks.len()
            || score
                .tracks
                .iter()
                .zip(&self.score.tracks)
                .any(|(a, b)| a.num_voices != b.num_voices);
        let old = std::mem::replace(&mut self.score, score);
        if layout_changed {
            self.reset_cursors();
        }
        self.next = self.next.map(|pos| pos.clamp(&self.score));
        old
    }

    /// Plays `pos` next, as soon as [`step_row`](Self::step_row) is called.
    pub fn start_at(&mut self, pos: SongPos) {
        self.next = Some(pos.clamp(&self.score));
        self.row_time = self.samples_per_row;
    }

    /// Whether the current row has used up its time.
    pub fn row_due(&self) -> bool {
        self.row_time >= self.samples_per_row
    }

    /// Song time left in the current row, as a render limit.
    pub fn time_left(&self) -> i32 {
        i32::try_from(self.samples_per_row.saturating_sub(self.row_time)).unwrap_or(i32::MAX)
    }

    /// Row time elapsed so far.
    pub fn row_time(&self) -> usize {
        self.row_time
    }

    pub fn advance_time(&mut self, time: i32) {
        self.row_time = self
            .row_time
            .saturating_add(usize::try_from(time).unwrap_or(0));
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }

    /// Starts the next row: holds leave a track alone, anything else
    /// releases the track's voice, and note-ons move to the next voice of
    /// the track and trigger it. Returns `false` once the song has ended.
    pub fn step_row(&mut self, target: &mut impl NoteTarget) -> bool {
        let Some(pos) = self.next else {
            return false;
        };
        let mut first = 0;
        for (track, cursor) in self.score.tracks.iter().zip(self.cursors.iter_mut()) {
            let voices = first..first + track.num_voices;
            first = voices.end;
            let note = track.note(pos);
            if note == HOLD || voices.is_empty() {
                continue;
            }
            target.release(*cursor);
            if note > HOLD {
                *cursor += 1;
                if *cursor >= voices.end {
                    *cursor = voices.start;
                }
                target.trigger(*cursor, note);
            }
        }
        self.current = pos;
        self.next = self.following(pos);
        self.row_time = 0;
        true
    }

    /// Releases every voice the score plays on.
    pub fn release_all(&self, target: &mut impl NoteTarget) {
        for voice in 0..self.score.num_voices() {
            target.release(voice);
        }
    }

    fn following(&self, pos: SongPos) -> Option<SongPos> {
        let mut next = SongPos::new(pos.order_row, pos.pattern_row + 1);
        if next.pattern_row >= self.score.rows_per_pattern {
            next = SongPos::new(pos.order_row + 1, 0);
            let region = self.loop_region;
            if region.is_active() && next.order_row == region.end() {
                return Some(SongPos::new(region.start, 0).clamp(&self.score));
            }
        }
        if next.order_row < self.score.length {
            Some(next)
        } else if self.repeat {
            Some(SongPos::default())
        } else {
            None
        }
    }

    /// Allocates only for scores with more than [`MAX_VOICES`] tracks.
    fn reset_cursors(&mut self) {
        self.cursors.clear();
        let mut first = 0;
        for track in &self.score.tracks {
            self.cursors.push(first);
            first += track.num_voices;
        }
    }
}

/// Offline rendering choices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Release all voices when the song ends, before the tail.
    pub release_at_end: bool,
    /// Frames rendered after the last row.
    pub tail_samples: usize,
}

impl RenderOptions {
    pub fn release_at_end(mut self, release: bool) -> Self {
        self.release_at_end = release;
        self
    }

    pub fn tail_samples(mut self, samples: usize) -> Self {
        self.tail_samples = samples;
        self
    }
}

/// A rendered song.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongAudio {
    pub frames: Vec<[f32; 2]>,
    /// Per sync interval: the song position in rows, then one value per
    /// sync unit.
    pub syncs: Vec<f32>,
}

/// Renders `song` from start to end.
pub fn play(song: &Song, options: RenderOptions) -> Result<SongAudio, PlayError> {
    song.validate()?;
    let mut synth = Synth::new(&song.patch, song.bpm)?;
    let num_syncs = synth.num_syncs();
    synth.capture_syncs(num_syncs > 0);
    let mut sequencer = Sequencer::for_song(song);
    let samples_per_row = sequencer.samples_per_row();
    let rows = song.score.length_in_rows();

    let mut out = SongAudio {
        frames: Vec::with_capacity(rows * samples_per_row + options.tail_samples),
        syncs: Vec::new(),
    };
    let mut buffer = vec![[0.0f32; 2]; samples_per_row.max(1)];
    while sequencer.step_row(&mut synth) {
        let row = sequencer.position().to_row(song.score.rows_per_pattern);
        let mut calls = 0;
        while !sequencer.row_due() {
            calls += 1;
            if calls > MAX_ROW_RENDER_CALLS {
                return Err(PlayError::RowNeverAdvances { row });
            }
            let call_start = out.frames.len();
            let row_time = sequencer.row_time();
            let rendered = synth.render(&mut buffer, sequencer.time_left())?;
            out.frames.extend_from_slice(&buffer[..rendered.samples]);
            for record in synth.take_syncs().chunks(1 + num_syncs) {
                let offset = record[0] - call_start as f32;
                out.syncs
                    .push((offset + row_time as f32) / samples_per_row as f32 + row as f32);
                out.syncs.extend_from_slice(&record[1..]);
            }
            sequencer.advance_time(rendered.time);
        }
    }
    log::debug!("rendered {rows} rows into {} frames", out.frames.len());

    if options.release_at_end {
        sequencer.release_all(&mut synth);
    }
    let mut remaining = options.tail_samples;
    while remaining > 0 {
        let chunk = remaining.min(buffer.len());
        let rendered = synth.render(&mut buffer[..chunk], i32::MAX)?;
        out.frames.extend_from_slice(&buffer[..rendered.samples]);
        remaining -= rendered.samples;
    }
    synth.take_syncs();
    Ok(out)
}
