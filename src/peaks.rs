// src/peaks.rs
use std::collections::VecDeque;

use crate::config::EngineConfig;

/// One cell of the constellation: a time/frequency local maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peak {
    pub time: u32,
    pub freq: u32,
}

/// Sliding maximum over a centered window of `2 * radius + 1` cells,
/// clamped at the edges. Monotonic-deque formulation, O(n).
fn sliding_max(values: &[f32], radius: usize, out: &mut Vec<f32>) {
    out.clear();
    let n = values.len();
    if n == 0 {
        return;
    }
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut next = 0usize;
    for i in 0..n {
        let hi = (i + radius).min(n - 1);
        while next <= hi {
            while deque.back().is_some_and(|&b| values[b] <= values[next]) {
                deque.pop_back();
            }
            deque.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(radius);
        while deque.front().is_some_and(|&f| f < lo) {
            deque.pop_front();
        }
        out.push(values[deque[0]]);
    }
}

/// True when a cell of the same magnitude occurs earlier (in (time, freq)
/// traversal order) inside the cell's neighborhood window.
fn has_earlier_equal(
    spectrogram: &[Vec<f32>],
    t: usize,
    f: usize,
    radius: usize,
    magnitude: f32,
) -> bool {
    let f_lo = f.saturating_sub(radius);
    let f_hi = (f + radius).min(spectrogram[0].len() - 1);
    for nt in t.saturating_sub(radius)..=t {
        let row = &spectrogram[nt];
        let end = if nt == t { f } else { f_hi + 1 };
        for cell in &row[f_lo..end] {
            if *cell == magnitude {
                return true;
            }
        }
    }
    false
}

/// Extracts the peak constellation of a spectrogram: cells that are strict
/// local maxima over a Chebyshev neighborhood of `cfg.peak_neighborhood`
/// and at least `cfg.amp_min` dB loud. Within a cluster of equal-magnitude
/// cells, the first one in (time, freq) order wins.
///
/// The neighborhood maximum is computed as a separable sliding max (per
/// frame, then per bin), so the scan stays linear in the grid size.
pub fn find_peaks(spectrogram: &[Vec<f32>], cfg: &EngineConfig) -> Vec<Peak> {
    let mut peaks: Vec<Peak> = Vec::new();
    if spectrogram.is_empty() || spectrogram[0].is_empty() {
        return peaks;
    }

    let num_frames = spectrogram.len();
    let num_bins = spectrogram[0].len();
    let radius = cfg.peak_neighborhood;

    // Pass 1: maximum along the frequency axis of each frame.
    let mut row_max: Vec<Vec<f32>> = Vec::with_capacity(num_frames);
    for frame in spectrogram {
        let mut maxima = Vec::with_capacity(num_bins);
        sliding_max(frame, radius, &mut maxima);
        row_max.push(maxima);
    }

    // Pass 2: maximum along the time axis of pass 1 yields the full
    // neighborhood maximum of every cell.
    let mut neighborhood_max = vec![vec![0.0f32; num_bins]; num_frames];
    let mut column = Vec::with_capacity(num_frames);
    let mut column_max = Vec::with_capacity(num_frames);
    for f in 0..num_bins {
        column.clear();
        column.extend(row_max.iter().map(|row| row[f]));
        sliding_max(&column, radius, &mut column_max);
        for t in 0..num_frames {
            neighborhood_max[t][f] = column_max[t];
        }
    }

    for t in 0..num_frames {
        for f in 0..num_bins {
            let magnitude = spectrogram[t][f];
            if magnitude < cfg.amp_min {
                continue;
            }
            if magnitude < neighborhood_max[t][f] {
                continue;
            }
            if has_earlier_equal(spectrogram, t, f, radius, magnitude) {
                continue;
            }
            peaks.push(Peak {
                time: t as u32,
                freq: f as u32,
            });
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(radius: usize) -> EngineConfig {
        EngineConfig {
            peak_neighborhood: radius,
            ..EngineConfig::default()
        }
    }

    fn grid(frames: usize, bins: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; bins]; frames]
    }

    #[test]
    fn lone_loud_cell_is_a_peak() {
        let mut s = grid(10, 10);
        s[4][6] = 42.0;
        assert_eq!(find_peaks(&s, &cfg(2)), vec![Peak { time: 4, freq: 6 }]);
    }

    #[test]
    fn cells_below_floor_are_ignored() {
        let mut s = grid(10, 10);
        s[4][6] = 9.9;
        assert!(find_peaks(&s, &cfg(2)).is_empty());
    }

    #[test]
    fn weaker_neighbor_loses_to_louder_one() {
        let mut s = grid(10, 10);
        s[4][4] = 50.0;
        s[5][5] = 40.0;
        assert_eq!(find_peaks(&s, &cfg(2)), vec![Peak { time: 4, freq: 4 }]);
    }

    #[test]
    fn equal_cells_in_one_neighborhood_keep_only_the_first() {
        let mut s = grid(10, 10);
        s[4][4] = 50.0;
        s[4][5] = 50.0;
        s[5][3] = 50.0;
        assert_eq!(find_peaks(&s, &cfg(2)), vec![Peak { time: 4, freq: 4 }]);
    }

    #[test]
    fn cells_beyond_the_radius_are_independent() {
        let mut s = grid(12, 12);
        s[2][2] = 50.0;
        s[2][8] = 50.0;
        s[9][2] = 50.0;
        let peaks = find_peaks(&s, &cfg(2));
        assert_eq!(peaks.len(), 3);
    }

    #[test]
    fn edge_cells_can_be_peaks() {
        let mut s = grid(6, 6);
        s[0][0] = 30.0;
        s[5][5] = 30.0;
        assert_eq!(find_peaks(&s, &cfg(2)).len(), 2);
    }

    #[test]
    fn sliding_max_matches_naive_scan() {
        let values = [1.0f32, 5.0, 2.0, 2.0, 7.0, 0.0, 3.0, 3.0, 1.0];
        let mut fast = Vec::new();
        sliding_max(&values, 2, &mut fast);
        for i in 0..values.len() {
            let lo = i.saturating_sub(2);
            let hi = (i + 2).min(values.len() - 1);
            let naive = values[lo..=hi].iter().cloned().fold(f32::MIN, f32::max);
            assert_eq!(fast[i], naive, "window around {i}");
        }
    }
}
