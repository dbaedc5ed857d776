// src/hashing.rs
use std::collections::HashSet;

use sha1::{Digest, Sha1};

use crate::config::{EngineConfig, FINGERPRINT_HASH_BYTES};
use crate::peaks::{self, Peak};
use crate::spectrogram;

/// Truncated SHA-1 of a peak-pair descriptor. Raw bytes everywhere inside
/// the crate; hex only at the CLI and test boundaries.
pub type HashBytes = [u8; FINGERPRINT_HASH_BYTES];

/// One fingerprint of a clip: a pair hash anchored at the earlier peak's
/// time frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub hash: HashBytes,
    pub offset: u32,
}

/// Pairs each anchor peak with the next `cfg.fan_value` peaks in (time,
/// freq) order and hashes every pair whose frame distance passes the
/// `min..=max` gate. The descriptor is `"f_a|f_b|dt"` and the stored hash
/// is the leading bytes of its SHA-1. The result carries no duplicates.
pub fn hash_peaks(peaks: &[Peak], cfg: &EngineConfig) -> Vec<Fingerprint> {
    let mut sorted: Vec<Peak> = peaks.to_vec();
    sorted.sort_unstable_by_key(|p| (p.time, p.freq));

    let mut seen: HashSet<Fingerprint> = HashSet::new();
    let mut fingerprints: Vec<Fingerprint> = Vec::new();

    for (i, anchor) in sorted.iter().enumerate() {
        for target in sorted.iter().skip(i + 1).take(cfg.fan_value) {
            let dt = target.time - anchor.time;
            if dt < cfg.min_hash_time_delta || dt > cfg.max_hash_time_delta {
                continue;
            }

            let descriptor = format!("{}|{}|{}", anchor.freq, target.freq, dt);
            let digest = Sha1::digest(descriptor.as_bytes());
            let mut hash: HashBytes = [0; FINGERPRINT_HASH_BYTES];
            hash.copy_from_slice(&digest[..FINGERPRINT_HASH_BYTES]);

            let fingerprint = Fingerprint {
                hash,
                offset: anchor.time,
            };
            if seen.insert(fingerprint) {
                fingerprints.push(fingerprint);
            }
        }
    }
    fingerprints
}

/// Full single-channel pipeline: spectrogram, peak constellation, pair
/// hashes. Samples are integer PCM widened to float.
pub fn fingerprint_channel(samples: &[i16], cfg: &EngineConfig) -> Vec<Fingerprint> {
    let floats: Vec<f32> = samples.iter().map(|&s| s as f32).collect();
    let frames = spectrogram::compute(&floats, cfg);
    let constellation = peaks::find_peaks(&frames, cfg);
    hash_peaks(&constellation, cfg)
}
