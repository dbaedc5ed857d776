// src/spectrogram.rs
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

use crate::config::EngineConfig;

/// Floor applied before taking the log so silent bins stay finite.
const LOG_EPSILON: f32 = 1e-10;

fn hann_window(window_size: usize) -> Vec<f32> {
    let mut window = Vec::with_capacity(window_size);
    if window_size == 0 {
        return window;
    }
    if window_size == 1 {
        window.push(1.0);
        return window;
    }
    for i in 0..window_size {
        window.push(0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()));
    }
    window
}

/// Short-time log-magnitude spectrogram of one PCM channel.
///
/// The result is indexed `[frame][bin]` with `window_size / 2 + 1` bins per
/// frame. Frame `t` covers samples `[t * hop, t * hop + window_size)`; a
/// trailing stretch shorter than one window is discarded.
pub fn compute(samples: &[f32], cfg: &EngineConfig) -> Vec<Vec<f32>> {
    let window_size = cfg.window_size;
    let hop_size = cfg.hop_size();
    if samples.len() < window_size || hop_size == 0 {
        return vec![];
    }

    let num_frames = (samples.len() - window_size) / hop_size + 1;
    let num_bins = window_size / 2 + 1;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); window_size];
    let window_values = hann_window(window_size);

    let mut frames: Vec<Vec<f32>> = Vec::with_capacity(num_frames);
    for i in 0..num_frames {
        let start = i * hop_size;
        let chunk = &samples[start..start + window_size];

        for (j, sample) in chunk.iter().enumerate() {
            buffer[j] = Complex::new(*sample * window_values[j], 0.0);
        }

        fft.process(&mut buffer);

        let mut magnitudes: Vec<f32> = Vec::with_capacity(num_bins);
        for k in 0..num_bins {
            let db = 10.0 * buffer[k].norm().max(LOG_EPSILON).log10();
            magnitudes.push(if db.is_finite() { db } else { 0.0 });
        }
        frames.push(magnitudes);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EngineConfig {
        EngineConfig {
            window_size: 512,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn too_short_input_yields_no_frames() {
        let cfg = test_config();
        assert!(compute(&vec![0.0; cfg.window_size - 1], &cfg).is_empty());
    }

    #[test]
    fn frame_count_and_bin_count_follow_geometry() {
        let cfg = test_config();
        let hop = cfg.hop_size();
        // Three full windows plus a partial tail that must be dropped.
        let samples = vec![0.0f32; cfg.window_size + 2 * hop + hop / 2];
        let frames = compute(&samples, &cfg);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), cfg.window_size / 2 + 1);
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let cfg = test_config();
        let bin = 32usize;
        let freq = bin as f32 * cfg.sample_rate as f32 / cfg.window_size as f32;
        let samples: Vec<f32> = (0..cfg.window_size * 2)
            .map(|i| 10_000.0 * (2.0 * PI * freq * i as f32 / cfg.sample_rate as f32).sin())
            .collect();
        let frames = compute(&samples, &cfg);
        let frame = &frames[0];
        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(loudest, bin);
    }

    #[test]
    fn silence_maps_to_finite_magnitudes() {
        let cfg = test_config();
        let frames = compute(&vec![0.0f32; cfg.window_size], &cfg);
        assert!(frames[0].iter().all(|m| m.is_finite()));
    }
}
