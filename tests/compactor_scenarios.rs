use sointu::encode::{compact, EncodedScore};
use sointu::score::SongPos;
use sointu::{Score, Track};

fn score(tracks: [[[u8; 8]; 2]; 2]) -> Score {
    Score {
        rows_per_pattern: 8,
        length: 2,
        tracks: tracks
            .iter()
            .map(|patterns| {
                Track::new(1, vec![0, 1], patterns.iter().map(|p| p.to_vec()).collect())
            })
            .collect(),
    }
}

fn expect(score: &Score, patterns: &[[u8; 8]], sequences: &[[u8; 2]]) {
    let encoded = compact(score).expect("compact");
    let want = EncodedScore {
        patterns: patterns.iter().map(|p| p.to_vec()).collect(),
        sequences: sequences.iter().map(|s| s.to_vec()).collect(),
    };
    assert_eq!(encoded, want);
    assert_sound(score, &encoded);
}

/// Every note that can be heard survives compaction.
fn assert_sound(score: &Score, encoded: &EncodedScore) {
    for (t, track) in score.tracks.iter().enumerate() {
        let mut released = false;
        for row in 0..score.length_in_rows() {
            let note = track.note(SongPos::from_row(row, score.rows_per_pattern));
            if released && note <= 1 {
                continue;
            }
            released = note == 0;
            assert_eq!(encoded.note(t, row), Some(note), "track {t} row {row}");
        }
    }
}

#[test]
fn identical_patterns_are_reused() {
    let s = score([
        [[64, 1, 1, 1, 0, 0, 0, 0], [72, 0, 0, 0, 0, 0, 0, 0]],
        [[64, 1, 1, 1, 0, 0, 0, 0], [84, 0, 0, 0, 0, 0, 0, 0]],
    ]);
    expect(
        &s,
        &[
            [64, 1, 1, 1, 0, 0, 0, 0],
            [72, 0, 0, 0, 0, 0, 0, 0],
            [84, 0, 0, 0, 0, 0, 0, 0],
        ],
        &[[0, 1], [0, 2]],
    );
}

#[test]
fn holds_after_a_release_are_dropped() {
    let s = score([
        [[64, 1, 1, 1, 0, 1, 0, 0], [72, 0, 1, 0, 1, 0, 0, 0]],
        [[64, 1, 1, 1, 0, 0, 1, 0], [84, 0, 0, 0, 1, 1, 0, 0]],
    ]);
    expect(
        &s,
        &[
            [64, 1, 1, 1, 0, 0, 0, 0],
            [72, 0, 0, 0, 0, 0, 0, 0],
            [84, 0, 0, 0, 0, 0, 0, 0],
        ],
        &[[0, 1], [0, 2]],
    );
}

#[test]
fn dont_care_rows_merge_into_other_patterns() {
    let s = score([
        [[64, 1, 1, 1, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0, 0, 0]],
        [[64, 1, 1, 1, 1, 1, 1, 1], [1, 1, 1, 0, 0, 0, 0, 0]],
    ]);
    expect(
        &s,
        &[
            [64, 1, 1, 1, 0, 0, 0, 0],
            [1, 1, 1, 0, 0, 0, 0, 0],
            [64, 1, 1, 1, 1, 1, 1, 1],
        ],
        &[[0, 1], [2, 1]],
    );
}

#[test]
fn compaction_is_sound_for_irregular_scores() {
    let s = Score {
        rows_per_pattern: 5,
        length: 4,
        tracks: vec![
            Track::new(2, vec![0, 1, -1, 0], vec![vec![60, 1, 0, 1, 1], vec![1, 1, 62]]),
            Track::new(1, vec![1, 1, 0], vec![vec![0, 0, 0, 0, 0], vec![70, 0, 71, 0, 72]]),
            Track::new(1, vec![0, 0, 0, 0], vec![vec![80, 1, 1, 1, 1]]),
        ],
    };
    let encoded = compact(&s).expect("compact");
    assert_eq!(encoded.sequence_length(), 4);
    assert_eq!(encoded.pattern_length(), 5);
    assert_sound(&s, &encoded);
}
