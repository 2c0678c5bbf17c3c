#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::score::{SongPos, HOLD, RELEASE};
use crate::Score;

/// Note value that can be either a release or a hold without being heard.
const DONT_CARE: i32 = -1;

/// A score with one pattern table shared by every track.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedScore {
    pub patterns: Vec<Vec<u8>>,
    /// Per track, one pattern index per song position.
    pub sequences: Vec<Vec<u8>>,
}

impl EncodedScore {
    pub fn pattern_length(&self) -> usize {
        self.patterns.first().map_or(0, Vec::len)
    }

    pub fn sequence_length(&self) -> usize {
        self.sequences.first().map_or(0, Vec::len)
    }

    pub fn total_rows(&self) -> usize {
        self.pattern_length() * self.sequence_length()
    }

    /// Note a track plays at an absolute row.
    pub fn note(&self, track: usize, row: usize) -> Option<u8> {
        let len = self.pattern_length();
        if len == 0 {
            return None;
        }
        let pattern = *self.sequences.get(track)?.get(row / len)?;
        self.patterns.get(usize::from(pattern))?.get(row % len).copied()
    }
}

/// Every track as one linear note sequence. After a release, further
/// releases and holds are don't-cares up to the next note-on.
fn flatten(score: &Score) -> Vec<Vec<i32>> {
    let rows = score.length_in_rows();
    score
        .tracks
        .iter()
        .map(|track| {
            let mut released = false;
            (0..rows)
                .map(|row| {
                    let note = track.note(SongPos::from_row(row, score.rows_per_pattern));
                    if released && note <= HOLD {
                        return DONT_CARE;
                    }
                    released = note == RELEASE;
                    i32::from(note)
                })
                .collect()
        })
        .collect()
}

/// Whether `table` could stand in for `chunk` without changing what is heard.
fn compatible(table: &[i32], chunk: &[i32]) -> bool {
    table.iter().zip(chunk).all(|(&n, &c)| {
        let differ = n > DONT_CARE && c > DONT_CARE && n != c;
        let drops_note = (n == DONT_CARE && c > 1) || (n > 1 && c == DONT_CARE);
        !(differ || drops_note)
    })
}

/// Splits `track` into chunks of `length`. A short last chunk releases a
/// note that is still sounding and cares about nothing after that.
fn chunks(track: &[i32], length: usize) -> impl Iterator<Item = Vec<i32>> + '_ {
    track.chunks(length).map(move |c| {
        let mut chunk = c.to_vec();
        if chunk.len() < length {
            let pad = if chunk.last().is_some_and(|&n| n > 0) {
                RELEASE.into()
            } else {
                DONT_CARE
            };
            chunk.push(pad);
            chunk.resize(length, DONT_CARE);
        }
        chunk
    })
}

/// Merges the per-track pattern tables of `score` into one global table.
///
/// Chunks go to the first compatible table entry, which takes over every
/// value the chunk cares about; otherwise they are appended. Don't-cares
/// left at the end become releases.
pub fn compact(score: &Score) -> Result<EncodedScore, ScoreError> {
    let length = score.rows_per_pattern;
    if length == 0 {
        return Err(ScoreError::InvalidLength {
            rows_per_pattern: 0,
            length: score.length as i32,
        });
    }
    let mut table: Vec<Vec<i32>> = Vec::new();
    let mut sequences = Vec::with_capacity(score.tracks.len());
    for track in flatten(score) {
        let mut sequence = Vec::new();
        for chunk in chunks(&track, length) {
            let index = match table.iter().position(|p| compatible(p, &chunk)) {
                Some(j) => {
                    for (slot, &n) in table[j].iter_mut().zip(&chunk) {
                        if n != DONT_CARE {
                            *slot = n;
                        }
                    }
                    j
                }
                None => {
                    table.push(chunk);
                    table.len() - 1
                }
            };
            let index = u8::try_from(index)
                .map_err(|_| ScoreError::TooManyPatterns { count: index + 1 })?;
            sequence.push(index);
        }
        sequences.push(sequence);
    }
    let patterns: Vec<Vec<u8>> = table
        .into_iter()
        .map(|p| p.into_iter().map(|n| n.max(0) as u8).collect())
        .collect();
    log::debug!(
        "compacted {} tracks into {} patterns of {} rows",
        sequences.len(),
        patterns.len(),
        length
    );
    Ok(EncodedScore { patterns, sequences })
}
