// src/config.rs

/// Sampling rate the engine fingerprints at. Channels decoded at another
/// rate are resampled to this before analysis.
pub const DEFAULT_FS: u32 = 44100;

/// FFT window size in samples.
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// Fraction of each window shared with the next one.
pub const DEFAULT_OVERLAP_RATIO: f32 = 0.5;

/// Chebyshev radius (in grid cells) a peak must dominate.
pub const PEAK_NEIGHBORHOOD_SIZE: usize = 20;

/// Minimum magnitude (dB) for a cell to qualify as a peak.
pub const DEFAULT_AMP_MIN: f32 = 10.0;

/// How many later peaks each anchor is paired with.
pub const DEFAULT_FAN_VALUE: usize = 15;

/// Allowed frame distance between an anchor and its target peak.
pub const MIN_HASH_TIME_DELTA: u32 = 0;
pub const MAX_HASH_TIME_DELTA: u32 = 200;

/// Width of a stored fingerprint hash: the leading bytes of the SHA-1
/// digest of the peak-pair descriptor.
pub const FINGERPRINT_HASH_BYTES: usize = 10;

/// Default number of ranked results returned by recognition.
pub const DEFAULT_TOPN: usize = 5;

/// Tunables for the fingerprinting pipeline. The defaults reproduce the
/// constants above; tests shrink the windows to keep fixtures small.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub overlap_ratio: f32,
    pub peak_neighborhood: usize,
    pub amp_min: f32,
    pub fan_value: usize,
    pub min_hash_time_delta: u32,
    pub max_hash_time_delta: u32,
}

impl EngineConfig {
    /// Samples between the starts of adjacent frames.
    pub fn hop_size(&self) -> usize {
        (self.window_size as f32 * (1.0 - self.overlap_ratio)) as usize
    }

    /// Converts a frame offset into seconds.
    pub fn offset_to_seconds(&self, offset: i64) -> f64 {
        offset as f64 * self.window_size as f64 * (1.0 - self.overlap_ratio as f64)
            / self.sample_rate as f64
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_FS,
            window_size: DEFAULT_WINDOW_SIZE,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
            peak_neighborhood: PEAK_NEIGHBORHOOD_SIZE,
            amp_min: DEFAULT_AMP_MIN,
            fan_value: DEFAULT_FAN_VALUE,
            min_hash_time_delta: MIN_HASH_TIME_DELTA,
            max_hash_time_delta: MAX_HASH_TIME_DELTA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hop_is_half_window() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.hop_size(), DEFAULT_WINDOW_SIZE / 2);
    }

    #[test]
    fn offset_seconds_uses_hop_duration() {
        let cfg = EngineConfig::default();
        let one_frame = cfg.offset_to_seconds(1);
        assert!((one_frame - 2048.0 / 44100.0).abs() < 1e-9);
        assert_eq!(cfg.offset_to_seconds(0), 0.0);
    }
}
