// src/matching.rs
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::store::{Store, TrackId, TrackMeta, TrackRecord};

/// One ranked recognition result.
#[derive(Debug, Clone)]
pub struct TrackMatch {
    pub track_id: TrackId,
    pub meta: TrackMeta,
    pub file_sha1: [u8; 20],
    /// Distinct hashes in the query clip.
    pub input_hashes: u32,
    /// Hashes stored for the track at ingest time.
    pub fingerprinted_hashes: u32,
    /// Distinct query hashes that hit this track.
    pub hashes_matched: u32,
    pub input_confidence: f64,
    pub fingerprinted_confidence: f64,
    /// Best alignment, in frames: stored offset minus query offset.
    pub offset: i64,
    pub offset_seconds: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Resolves a raw match stream into ranked tracks.
///
/// A true match shows many hashes agreeing on one time delta, so each
/// track is scored by the multiplicity of its most common `Δoffset`
/// (smallest delta on ties). Tracks are ranked by that score and the top
/// `topn` are enriched with stored metadata and confidence ratios.
pub fn align_matches<S: Store>(
    store: &mut S,
    matches: &[(TrackId, i64)],
    unique_counts: &HashMap<TrackId, u32>,
    query_hash_count: u32,
    topn: usize,
    cfg: &EngineConfig,
) -> Result<Vec<TrackMatch>, StoreError> {
    let mut multiplicity: HashMap<(TrackId, i64), u32> = HashMap::new();
    for &(track_id, delta) in matches {
        *multiplicity.entry((track_id, delta)).or_insert(0) += 1;
    }

    let mut best: HashMap<TrackId, (i64, u32)> = HashMap::new();
    for (&(track_id, delta), &count) in &multiplicity {
        let entry = best.entry(track_id).or_insert((delta, count));
        if count > entry.1 || (count == entry.1 && delta < entry.0) {
            *entry = (delta, count);
        }
    }

    let mut ranked: Vec<(TrackId, i64, u32)> = best
        .into_iter()
        .map(|(track_id, (delta, count))| (track_id, delta, count))
        .collect();
    // Score descending; equal scores fall back to track id so the ranking
    // is deterministic regardless of map iteration order.
    ranked.sort_unstable_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    ranked.truncate(topn);

    if ranked.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<TrackId> = ranked.iter().map(|(id, _, _)| *id).collect();
    let records: HashMap<TrackId, TrackRecord> = store
        .get_tracks_by_ids(&ids)?
        .into_iter()
        .map(|record| (record.track_id, record))
        .collect();

    let mut results = Vec::with_capacity(ranked.len());
    for (track_id, delta, _) in ranked {
        let Some(record) = records.get(&track_id) else {
            continue;
        };
        let matched = unique_counts.get(&track_id).copied().unwrap_or(0);
        let input_confidence = if query_hash_count == 0 {
            0.0
        } else {
            round_to(matched as f64 / query_hash_count as f64, 2)
        };
        let fingerprinted_confidence = if record.total_hashes == 0 {
            0.0
        } else {
            round_to(matched as f64 / record.total_hashes as f64, 2)
        };

        results.push(TrackMatch {
            track_id,
            meta: record.meta.clone(),
            file_sha1: record.file_sha1,
            input_hashes: query_hash_count,
            fingerprinted_hashes: record.total_hashes,
            hashes_matched: matched,
            input_confidence,
            fingerprinted_confidence,
            offset: delta,
            offset_seconds: round_to(cfg.offset_to_seconds(delta), 5),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Fingerprint;
    use crate::store::SqliteStore;

    fn store_with_tracks(total_hashes: &[u32]) -> (SqliteStore, Vec<TrackId>) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.setup().unwrap();
        let mut ids = Vec::new();
        for (i, &total) in total_hashes.iter().enumerate() {
            let meta = TrackMeta {
                name: format!("track-{i}"),
                ..TrackMeta::default()
            };
            let id = store.insert_track(&meta, &[i as u8; 20], total).unwrap();
            store.set_track_fingerprinted(id).unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    fn fp(byte: u8, offset: u32) -> Fingerprint {
        Fingerprint {
            hash: [byte; 10],
            offset,
        }
    }

    #[test]
    fn empty_match_stream_yields_no_results() {
        let (mut store, _) = store_with_tracks(&[10]);
        let results =
            align_matches(&mut store, &[], &HashMap::new(), 42, 5, &EngineConfig::default())
                .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn most_aligned_track_ranks_first() {
        let (mut store, ids) = store_with_tracks(&[10, 10]);
        // Track 0: three matches agreeing on delta 7. Track 1: three matches
        // scattered over deltas, best multiplicity 2.
        let matches = vec![
            (ids[0], 7),
            (ids[0], 7),
            (ids[0], 7),
            (ids[1], 3),
            (ids[1], 3),
            (ids[1], 9),
        ];
        let counts = HashMap::from([(ids[0], 3u32), (ids[1], 3u32)]);
        let results =
            align_matches(&mut store, &matches, &counts, 10, 5, &EngineConfig::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].track_id, ids[0]);
        assert_eq!(results[0].offset, 7);
        assert_eq!(results[1].track_id, ids[1]);
        assert_eq!(results[1].offset, 3);
    }

    #[test]
    fn tied_multiplicities_pick_the_smallest_delta() {
        let (mut store, ids) = store_with_tracks(&[10]);
        let matches = vec![(ids[0], 12), (ids[0], 12), (ids[0], 4), (ids[0], 4)];
        let counts = HashMap::from([(ids[0], 4u32)]);
        let results =
            align_matches(&mut store, &matches, &counts, 8, 5, &EngineConfig::default()).unwrap();
        assert_eq!(results[0].offset, 4);
    }

    #[test]
    fn topn_truncates_the_ranking() {
        let (mut store, ids) = store_with_tracks(&[5, 5, 5, 5]);
        let mut matches = Vec::new();
        let mut counts = HashMap::new();
        for (rank, &id) in ids.iter().enumerate() {
            for _ in 0..(ids.len() - rank) {
                matches.push((id, 1));
            }
            counts.insert(id, (ids.len() - rank) as u32);
        }
        let results =
            align_matches(&mut store, &matches, &counts, 20, 2, &EngineConfig::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].track_id, ids[0]);
        assert_eq!(results[1].track_id, ids[1]);
    }

    #[test]
    fn confidences_stay_in_unit_range_and_round() {
        let (mut store, ids) = store_with_tracks(&[3]);
        let matches = vec![(ids[0], 0)];
        let counts = HashMap::from([(ids[0], 1u32)]);
        let results =
            align_matches(&mut store, &matches, &counts, 3, 5, &EngineConfig::default()).unwrap();
        let m = &results[0];
        assert!((0.0..=1.0).contains(&m.input_confidence));
        assert!((0.0..=1.0).contains(&m.fingerprinted_confidence));
        assert_eq!(m.input_confidence, 0.33);
        assert_eq!(m.fingerprinted_confidence, 0.33);
    }

    #[test]
    fn zero_stored_hashes_report_zero_confidence() {
        let (mut store, ids) = store_with_tracks(&[0]);
        let matches = vec![(ids[0], 0)];
        let counts = HashMap::from([(ids[0], 0u32)]);
        let results =
            align_matches(&mut store, &matches, &counts, 4, 5, &EngineConfig::default()).unwrap();
        assert_eq!(results[0].fingerprinted_confidence, 0.0);
    }

    #[test]
    fn offset_seconds_scale_with_the_hop() {
        let (mut store, ids) = store_with_tracks(&[10]);
        let matches = vec![(ids[0], 431)];
        let counts = HashMap::from([(ids[0], 1u32)]);
        let cfg = EngineConfig::default();
        let results = align_matches(&mut store, &matches, &counts, 1, 5, &cfg).unwrap();
        let expected = 431.0 * 2048.0 / 44100.0;
        assert!((results[0].offset_seconds - expected).abs() < 1e-4);
    }

    #[test]
    fn match_lookup_counts_unique_hashes_per_track() {
        let (mut store, ids) = store_with_tracks(&[4]);
        // Same hash stored at two offsets: two match rows, one unique hash.
        store
            .insert_hashes(ids[0], &[fp(1, 0), fp(1, 50), fp(2, 10)])
            .unwrap();
        let lookup = store.return_matches(&[fp(1, 0), fp(2, 0)]).unwrap();
        assert_eq!(lookup.matches.len(), 3);
        assert_eq!(lookup.unique_counts[&ids[0]], 2);
    }
}
