//! Packing several integer sequences into one short array in which each of
//! them appears as a contiguous run.
//!
//! Used to build the delay-time table: two delay units with the same delay
//! times, or with overlapping ones, share table entries.
//!
//! ```text
//!   [3, 4, 5]          overlap of 1 ("3")
//!   [1, 2, 3]    ──▶   [1, 2, 3, 4, 5]     indices [2, 0]
//! ```
//!
//! Finding the shortest such array is the shortest-common-superstring
//! problem, which is NP-hard. This is the usual greedy approximation: merge
//! the pair with the largest overlap until one array is left. Above
//! `MAX_MERGES` candidates the pair search itself is too slow, so the first
//! two arrays are merged instead until the problem is small again.

const MAX_MERGES: usize = 1000;

/// Returns `(start, overlap)`: how far into `a` the sequence `b` can be
/// placed so that the overlapping part matches, and how long that part is.
fn overlap(a: &[i32], b: &[i32]) -> (usize, usize) {
    let mut min_shift = a.len();
    for shift in (0..a.len()).rev() {
        let end = a.len().min(b.len() + shift);
        if (shift..end).all(|k| a[k] == b[k - shift]) {
            min_shift = shift;
        }
    }
    (min_shift, (a.len() - min_shift).min(b.len()))
}

/// Finds a short array containing every input as a contiguous slice, and
/// where each input starts in it. Empty inputs start at 0.
pub fn find_super_array(arrays: &[Vec<i32>]) -> (Vec<i32>, Vec<usize>) {
    find_super_array_bounded(arrays, MAX_MERGES)
}

fn find_super_array_bounded(arrays: &[Vec<i32>], max_merges: usize) -> (Vec<i32>, Vec<usize>) {
    // slice[k]: which working array input k currently lives in
    let mut slice: Vec<Option<usize>> = Vec::with_capacity(arrays.len());
    let mut starts = vec![0usize; arrays.len()];
    let mut working: Vec<Vec<i32>> = Vec::new();
    for array in arrays {
        if array.is_empty() {
            slice.push(None);
        } else {
            slice.push(Some(working.len()));
            working.push(array.clone());
        }
    }
    if working.is_empty() {
        return (Vec::new(), starts);
    }

    while working.len() > 1 {
        let (i, j, shift, overlapping) = if working.len() < max_merges {
            let mut best: Option<(usize, usize, usize, usize)> = None;
            for i in 0..working.len() {
                for j in 0..working.len() {
                    if i == j {
                        continue;
                    }
                    let (shift, o) = overlap(&working[i], &working[j]);
                    if best.map_or(true, |(_, _, _, best_o)| o > best_o) {
                        best = Some((i, j, shift, o));
                    }
                }
            }
            match best {
                Some(b) => b,
                None => break,
            }
        } else {
            let (shift, o) = overlap(&working[0], &working[1]);
            (0, 1, shift, o)
        };

        for k in 0..slice.len() {
            if let Some(s) = slice[k] {
                let mut s = s;
                if s == j {
                    s = i;
                    starts[k] += shift;
                }
                if s > j {
                    s -= 1;
                }
                slice[k] = Some(s);
            }
        }
        let merged = working.remove(j);
        let i = if i > j { i - 1 } else { i };
        if overlapping < merged.len() {
            working[i].extend_from_slice(&merged[overlapping..]);
        }
    }

    (working.swap_remove(0), starts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_at(haystack: &[i32], needle: &[i32], start: usize) -> bool {
        haystack.get(start..start + needle.len()) == Some(needle)
    }

    #[test]
    fn merges_overlapping_tails() {
        let (sup, idx) = find_super_array(&[vec![3, 4, 5], vec![1, 2, 3]]);
        assert_eq!(sup, vec![1, 2, 3, 4, 5]);
        assert_eq!(idx, vec![2, 0]);
    }

    #[test]
    fn contained_arrays_are_absorbed() {
        let (sup, idx) = find_super_array(&[vec![1, 2, 3, 4], vec![3, 4, 1], vec![2, 3, 4, 5]]);
        assert_eq!(sup, vec![3, 4, 1, 2, 3, 4, 5]);
        assert_eq!(idx, vec![2, 0, 3]);
    }

    #[test]
    fn identical_arrays_share_storage() {
        let (sup, idx) = find_super_array(&[vec![48, 96], vec![48, 96], vec![]]);
        assert_eq!(sup, vec![48, 96]);
        assert_eq!(idx, vec![0, 0, 0]);
    }

    #[test]
    fn every_input_is_found_at_its_index() {
        let inputs = vec![
            vec![1103, 1589],
            vec![1589, 1103, 7],
            vec![7],
            vec![500, 600, 700],
            vec![600, 700, 1103],
        ];
        let (sup, idx) = find_super_array(&inputs);
        for (input, &start) in inputs.iter().zip(&idx) {
            assert!(contains_at(&sup, input, start), "{input:?} not at {start} in {sup:?}");
        }
        let total: usize = inputs.iter().map(Vec::len).sum();
        assert!(sup.len() < total);
    }

    #[test]
    fn large_inputs_fall_back_to_pairwise_merging() {
        let inputs: Vec<Vec<i32>> = (0..40).map(|i| vec![i % 7, i % 5, i % 3]).collect();
        let (sup, idx) = find_super_array_bounded(&inputs, 8);
        for (input, &start) in inputs.iter().zip(&idx) {
            assert!(contains_at(&sup, input, start));
        }
    }
}
