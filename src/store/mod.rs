// src/store/mod.rs
use std::collections::HashMap;

use crate::error::StoreError;
use crate::hashing::Fingerprint;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Row identifier assigned by the store on track insertion.
pub type TrackId = i64;

/// Descriptive fields of a track. Everything except the display name is
/// optional: tags are frequently missing and the engine degrades to
/// filename-derived values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMeta {
    pub name: String,
    pub singer: Option<String>,
    pub album: Option<String>,
    pub publisher: Option<String>,
    pub publictime: Option<String>,
    pub length: Option<f64>,
}

/// A persisted track as read back from the store.
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub track_id: TrackId,
    pub meta: TrackMeta,
    pub file_sha1: [u8; 20],
    pub total_hashes: u32,
    pub date_created: String,
}

/// Output of a fingerprint lookup: the raw `(track, stored − query)`
/// match stream plus, per track, how many distinct query hashes matched
/// at least one stored row. Both come out of a single scan.
#[derive(Debug, Default)]
pub struct MatchLookup {
    pub matches: Vec<(TrackId, i64)>,
    pub unique_counts: HashMap<TrackId, u32>,
}

/// Persistence contract of the engine.
///
/// Writes must uphold the schema invariants: `(track_id, offset, hash)` is
/// unique and duplicate insertions are silently dropped; hash rows belong
/// to exactly one track and disappear when it is deleted; a track stays
/// invisible to listings until it is flagged fingerprinted.
pub trait Store {
    /// Idempotent schema creation.
    fn setup(&mut self) -> Result<(), StoreError>;

    /// Inserts a track with `fingerprinted = false`; returns its id.
    fn insert_track(
        &mut self,
        meta: &TrackMeta,
        file_sha1: &[u8; 20],
        total_hashes: u32,
    ) -> Result<TrackId, StoreError>;

    /// Bulk-inserts fingerprints for a track, dropping duplicates.
    fn insert_hashes(
        &mut self,
        track_id: TrackId,
        hashes: &[Fingerprint],
    ) -> Result<(), StoreError>;

    /// Marks a track's hash set as completely loaded.
    fn set_track_fingerprinted(&mut self, track_id: TrackId) -> Result<(), StoreError>;

    /// Removes tracks left behind by interrupted ingests; returns how many
    /// rows went away.
    fn delete_unfingerprinted(&mut self) -> Result<usize, StoreError>;

    /// Deletes tracks by id; their hash rows cascade.
    fn delete_tracks_by_id(&mut self, ids: &[TrackId]) -> Result<(), StoreError>;

    /// All fully fingerprinted tracks.
    fn get_tracks(&mut self) -> Result<Vec<TrackRecord>, StoreError>;

    fn get_tracks_by_ids(&mut self, ids: &[TrackId]) -> Result<Vec<TrackRecord>, StoreError>;

    fn get_num_fingerprints(&mut self) -> Result<u64, StoreError>;

    fn get_num_fingerprinted_tracks(&mut self) -> Result<u64, StoreError>;

    /// Looks up every stored row whose hash occurs in `query` (duplicate
    /// query hashes collapse to one lookup) and yields the match stream
    /// described on [`MatchLookup`].
    fn return_matches(&mut self, query: &[Fingerprint]) -> Result<MatchLookup, StoreError>;
}
