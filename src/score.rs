//! The arrangement: tracks of note patterns, and the song that ties a score
//! to a patch and a tempo.
//!
//! Note bytes: `0` releases the track's voice, `1` holds whatever is
//! sounding, and `2..=255` trigger a note.

use std::ops::{Deref, DerefMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{error::ScoreError, Patch, SAMPLE_RATE};

pub const RELEASE: u8 = 0;
pub const HOLD: u8 = 1;

/// Fastest tempo a song may ask for.
pub const MAX_BPM: i32 = 999;
pub const MAX_ROWS_PER_BEAT: i32 = 32;

#[cfg(feature = "serde")]
fn is_false(v: &bool) -> bool {
    !*v
}

/// Note bytes of one pattern. Reads past the end are holds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern(pub Vec<u8>);

impl Pattern {
    pub fn get(&self, row: usize) -> u8 {
        self.0.get(row).copied().unwrap_or(HOLD)
    }

    /// Writes `note` at `row`, padding with holds.
    pub fn set(&mut self, row: usize, note: u8) {
        if self.0.len() <= row {
            self.0.resize(row + 1, HOLD);
        }
        self.0[row] = note;
    }
}

impl Deref for Pattern {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Pattern {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for Pattern {
    fn from(notes: Vec<u8>) -> Self {
        Pattern(notes)
    }
}

/// Pattern index per song position. `-1`, or a read past the end, is silent.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Order(pub Vec<i32>);

impl Order {
    pub fn get(&self, position: usize) -> i32 {
        self.0.get(position).copied().unwrap_or(-1)
    }

    pub fn set(&mut self, position: usize, pattern: i32) {
        if self.0.len() <= position {
            self.0.resize(position + 1, -1);
        }
        self.0[position] = pattern;
    }
}

impl Deref for Order {
    type Target = Vec<i32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<i32>> for Order {
    fn from(order: Vec<i32>) -> Self {
        Order(order)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    #[cfg_attr(feature = "serde", serde(rename = "numvoices", alias = "NumVoices"))]
    pub num_voices: usize,
    /// Display hint for editors; playback ignores it.
    #[cfg_attr(
        feature = "serde",
        serde(alias = "Effect", default, skip_serializing_if = "is_false")
    )]
    pub effect: bool,
    #[cfg_attr(feature = "serde", serde(alias = "Order", default))]
    pub order: Order,
    #[cfg_attr(feature = "serde", serde(alias = "Patterns", default))]
    pub patterns: Vec<Pattern>,
}

impl Track {
    pub fn new(num_voices: usize, order: Vec<i32>, patterns: Vec<Vec<u8>>) -> Self {
        Self {
            num_voices,
            effect: false,
            order: Order(order),
            patterns: patterns.into_iter().map(Pattern).collect(),
        }
    }

    /// Note at a song position. Silent order entries and missing patterns
    /// read as holds.
    pub fn note(&self, pos: SongPos) -> u8 {
        usize::try_from(self.order.get(pos.order_row))
            .ok()
            .and_then(|p| self.patterns.get(p))
            .map_or(HOLD, |p| p.get(pos.pattern_row))
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    #[cfg_attr(feature = "serde", serde(rename = "rowsperpattern", alias = "RowsPerPattern"))]
    pub rows_per_pattern: usize,
    /// Song length in patterns.
    #[cfg_attr(feature = "serde", serde(alias = "Length"))]
    pub length: usize,
    #[cfg_attr(feature = "serde", serde(alias = "Tracks", default))]
    pub tracks: Vec<Track>,
}

impl Score {
    pub fn num_voices(&self) -> usize {
        self.tracks.iter().map(|t| t.num_voices).sum()
    }

    pub fn first_voice_for_track(&self, track: usize) -> usize {
        self.tracks.iter().take(track).map(|t| t.num_voices).sum()
    }

    pub fn length_in_rows(&self) -> usize {
        self.rows_per_pattern * self.length
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.rows_per_pattern == 0 || self.length == 0 {
            return Err(ScoreError::InvalidLength {
                rows_per_pattern: self.rows_per_pattern as i32,
                length: self.length as i32,
            });
        }
        for (t, track) in self.tracks.iter().enumerate() {
            for (position, &pattern) in track.order.iter().enumerate() {
                let exists = usize::try_from(pattern).map_or(true, |p| p < track.patterns.len());
                if !exists {
                    return Err(ScoreError::MissingPattern { track: t, position, pattern });
                }
            }
        }
        Ok(())
    }
}

/// A position in the song: which order entry and which row inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SongPos {
    pub order_row: usize,
    pub pattern_row: usize,
}

impl SongPos {
    pub fn new(order_row: usize, pattern_row: usize) -> Self {
        Self { order_row, pattern_row }
    }

    pub fn from_row(row: usize, rows_per_pattern: usize) -> Self {
        let rpp = rows_per_pattern.max(1);
        Self {
            order_row: row / rpp,
            pattern_row: row % rpp,
        }
    }

    pub fn to_row(self, rows_per_pattern: usize) -> usize {
        self.order_row * rows_per_pattern + self.pattern_row
    }

    /// Clamps into the song, so the last row of the last pattern is the
    /// furthest reachable position.
    pub fn clamp(self, score: &Score) -> Self {
        let total = score.length_in_rows();
        if total == 0 {
            return Self::default();
        }
        let row = self.to_row(score.rows_per_pattern).min(total - 1);
        Self::from_row(row, score.rows_per_pattern)
    }

    /// Wraps around the end of the song.
    pub fn wrap(self, score: &Score) -> Self {
        let total = score.length_in_rows();
        if total == 0 {
            return Self::default();
        }
        Self::from_row(self.to_row(score.rows_per_pattern) % total, score.rows_per_pattern)
    }
}

/// A complete song: tempo, arrangement and instruments.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    #[cfg_attr(feature = "serde", serde(alias = "BPM"))]
    pub bpm: i32,
    #[cfg_attr(feature = "serde", serde(rename = "rowsperbeat", alias = "RowsPerBeat"))]
    pub rows_per_beat: i32,
    #[cfg_attr(feature = "serde", serde(alias = "Score"))]
    pub score: Score,
    #[cfg_attr(feature = "serde", serde(alias = "Patch", default))]
    pub patch: Patch,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            bpm: 100,
            rows_per_beat: 4,
            score: Score {
                rows_per_pattern: 16,
                length: 1,
                tracks: Vec::new(),
            },
            patch: Patch::default(),
        }
    }
}

impl Song {
    /// Samples per row at the fixed engine rate, never less than one.
    pub fn samples_per_row(&self) -> usize {
        let rows_per_minute = (i64::from(self.bpm) * i64::from(self.rows_per_beat)).max(1);
        (i64::from(SAMPLE_RATE) * 60 / rows_per_minute).max(1) as usize
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if !(1..=MAX_BPM).contains(&self.bpm) || !(1..=MAX_ROWS_PER_BEAT).contains(&self.rows_per_beat)
        {
            return Err(ScoreError::InvalidTempo {
                bpm: self.bpm,
                rows_per_beat: self.rows_per_beat,
            });
        }
        if self.score.tracks.is_empty() {
            return Err(ScoreError::NoTracks);
        }
        if self.score.num_voices() > self.patch.num_voices() {
            return Err(ScoreError::TooManyVoices {
                score: self.score.num_voices(),
                patch: self.patch.num_voices(),
            });
        }
        self.score.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score() -> Score {
        Score {
            rows_per_pattern: 4,
            length: 3,
            tracks: vec![
                Track::new(1, vec![0, -1, 1], vec![vec![64, 1], vec![0, 70, 1, 0]]),
                Track::new(2, vec![0], vec![vec![80]]),
            ],
        }
    }

    #[test]
    fn reads_past_the_end_hold() {
        let score = score();
        let t = &score.tracks[0];
        assert_eq!(t.note(SongPos::new(0, 0)), 64);
        assert_eq!(t.note(SongPos::new(0, 3)), HOLD, "short pattern pads with holds");
        assert_eq!(t.note(SongPos::new(1, 0)), HOLD, "-1 order entry is silent");
        assert_eq!(t.note(SongPos::new(2, 1)), 70);
        assert_eq!(score.tracks[1].note(SongPos::new(2, 0)), HOLD, "short order");
    }

    #[test]
    fn song_positions_clamp_and_wrap() {
        let score = score();
        assert_eq!(SongPos::from_row(9, 4), SongPos::new(2, 1));
        assert_eq!(SongPos::new(2, 1).to_row(4), 9);
        assert_eq!(SongPos::new(5, 0).clamp(&score), SongPos::new(2, 3));
        assert_eq!(SongPos::new(3, 1).wrap(&score), SongPos::new(0, 1));
        assert_eq!(score.first_voice_for_track(1), 1);
        assert_eq!(score.num_voices(), 3);
    }

    #[test]
    fn missing_pattern_is_reported() {
        let mut score = score();
        assert_eq!(score.validate(), Ok(()));
        score.tracks[1].order.set(2, 4);
        assert_eq!(
            score.validate(),
            Err(ScoreError::MissingPattern { track: 1, position: 2, pattern: 4 })
        );
    }

    #[test]
    fn samples_per_row_uses_fixed_rate() {
        let song = Song {
            bpm: 120,
            ..Song::default()
        };
        assert_eq!(song.samples_per_row(), 5512);
        assert_eq!(Song::default().samples_per_row(), 6615);
    }

    #[test]
    fn extreme_tempos_are_rejected_without_overflow() {
        let mut song = Song {
            bpm: 100_000,
            rows_per_beat: 100_000,
            ..Song::default()
        };
        assert_eq!(song.samples_per_row(), 1);
        assert_eq!(
            song.validate(),
            Err(ScoreError::InvalidTempo { bpm: 100_000, rows_per_beat: 100_000 })
        );
        song.bpm = i32::MIN;
        assert_eq!(song.samples_per_row(), 2_646_000);
        song.bpm = MAX_BPM;
        song.rows_per_beat = MAX_ROWS_PER_BEAT + 1;
        assert!(matches!(song.validate(), Err(ScoreError::InvalidTempo { .. })));
    }

    #[test]
    fn pattern_set_pads_with_holds() {
        let mut p = Pattern::default();
        p.set(2, 64);
        assert_eq!(p.0, vec![1, 1, 64]);
    }
}
