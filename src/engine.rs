// src/engine.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::decoder;
use crate::error::{DecodeError, EngineError, StoreError};
use crate::hashing::{self, Fingerprint};
use crate::matching::{self, TrackMatch};
use crate::metadata;
use crate::store::{Store, TrackId, TrackMeta, TrackRecord};
use crate::timer::Span;

/// Everything a worker produces for one file, before any store write.
pub struct FileFingerprint {
    pub path: PathBuf,
    pub hashes: Vec<Fingerprint>,
    pub file_sha1: [u8; 20],
    pub meta: TrackMeta,
}

/// Outcome of a directory ingest. The batch counts as successful when at
/// least one file made it in.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of a recognition query.
pub struct Recognition {
    pub results: Vec<TrackMatch>,
    pub query_hashes: u32,
}

/// Decodes and fingerprints one file without touching any store: the
/// CPU-bound half of an ingest, safe to run on a worker thread.
pub fn fingerprint_file(
    path: &Path,
    limit: Option<f32>,
    cfg: &EngineConfig,
) -> Result<FileFingerprint, EngineError> {
    let _span = Span::enter("fingerprint_file");
    let decoded = decoder::decode(path, limit, cfg.sample_rate)?;

    let channel_count = decoded.channels.len();
    let mut set: HashSet<Fingerprint> = HashSet::new();
    for (index, channel) in decoded.channels.iter().enumerate() {
        log::debug!(
            "fingerprinting channel {}/{} of {}",
            index + 1,
            channel_count,
            path.display()
        );
        set.extend(hashing::fingerprint_channel(channel, cfg));
    }

    Ok(FileFingerprint {
        path: path.to_path_buf(),
        hashes: set.into_iter().collect(),
        file_sha1: decoded.file_sha1,
        meta: metadata::extract(path),
    })
}

/// The recognition engine: fingerprint extraction in front, a [`Store`]
/// behind. All store writes flow through this type on one thread.
pub struct Engine<S: Store> {
    store: S,
    config: EngineConfig,
    limit: Option<f32>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            limit: None,
        }
    }

    /// Restrict fingerprinting to the first `limit` seconds of every file.
    /// `None` or a negative value means the whole track.
    pub fn with_limit(mut self, limit: Option<f32>) -> Self {
        self.limit = limit.filter(|l| *l >= 0.0);
        self
    }

    pub fn setup(&mut self) -> Result<(), StoreError> {
        self.store.setup()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// SHA-1 content keys of every fully fingerprinted track.
    fn fingerprinted_hashes(&mut self) -> Result<HashSet<[u8; 20]>, StoreError> {
        Ok(self
            .store
            .get_tracks()?
            .into_iter()
            .map(|track| track.file_sha1)
            .collect())
    }

    /// Persists one worker product: track row, hash rows, fingerprinted
    /// flag, strictly in that order.
    fn persist(&mut self, product: &FileFingerprint) -> Result<TrackId, StoreError> {
        let track_id = self.store.insert_track(
            &product.meta,
            &product.file_sha1,
            product.hashes.len() as u32,
        )?;
        self.store.insert_hashes(track_id, &product.hashes)?;
        self.store.set_track_fingerprinted(track_id)?;
        Ok(track_id)
    }

    /// Fingerprints a single file and stores it. Returns `None` when the
    /// file's content hash is already in the store.
    pub fn ingest_file(&mut self, path: &Path) -> Result<Option<TrackId>, EngineError> {
        let _span = Span::enter("ingest_file");
        let file_sha1 = decoder::unique_hash(path).map_err(DecodeError::from)?;
        if self.fingerprinted_hashes()?.contains(&file_sha1) {
            log::info!("{} already fingerprinted, skipping", path.display());
            return Ok(None);
        }
        let product = fingerprint_file(path, self.limit, &self.config)?;
        Ok(Some(self.persist(&product)?))
    }

    /// Walks `path` for files with one of `extensions` and ingests every
    /// file whose content is not yet in the store. Fingerprinting runs on
    /// `nprocs` worker threads (logical CPU count when `None`); all store
    /// writes happen here, in result-arrival order.
    pub fn ingest_directory(
        &mut self,
        path: &Path,
        extensions: &[&str],
        nprocs: Option<usize>,
    ) -> Result<BatchSummary, EngineError> {
        let _span = Span::enter("ingest_directory");
        let workers = nprocs
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);

        let mut known = self.fingerprinted_hashes()?;
        let mut summary = BatchSummary::default();

        let mut jobs: Vec<PathBuf> = Vec::new();
        for (file, _) in decoder::find_files(path, extensions).map_err(DecodeError::from)? {
            match decoder::unique_hash(&file) {
                Ok(hash) if known.contains(&hash) => {
                    log::info!("{} already fingerprinted, skipping", file.display());
                    summary.skipped += 1;
                }
                Ok(_) => jobs.push(file),
                Err(e) => {
                    log::warn!("cannot read {}: {e}", file.display());
                    summary.failed += 1;
                }
            }
        }

        if jobs.is_empty() {
            return Ok(summary);
        }
        log::info!("fingerprinting {} file(s) on {workers} worker(s)", jobs.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| EngineError::Pool(e.to_string()))?;

        type WorkerResult = Result<FileFingerprint, (PathBuf, EngineError)>;
        let (sender, receiver) = mpsc::channel::<WorkerResult>();
        let limit = self.limit;
        let config = self.config.clone();
        pool.spawn(move || {
            jobs.into_par_iter().for_each_with(sender, |sender, file| {
                let result =
                    fingerprint_file(&file, limit, &config).map_err(|e| (file.clone(), e));
                let _ = sender.send(result);
            });
        });

        // Workers only fingerprint; this loop is the single store writer.
        for result in receiver {
            match result {
                Ok(product) => {
                    if known.contains(&product.file_sha1) {
                        log::info!(
                            "{} duplicates an already ingested track, skipping",
                            product.path.display()
                        );
                        summary.skipped += 1;
                        continue;
                    }
                    match self.persist(&product) {
                        Ok(track_id) => {
                            log::info!(
                                "ingested {} as track {track_id} ({} hashes)",
                                product.path.display(),
                                product.hashes.len()
                            );
                            summary.ingested += 1;
                            known = self.fingerprinted_hashes()?;
                        }
                        Err(e) if e.is_transient() => {
                            log::warn!(
                                "store rejected {} transiently: {e}",
                                product.path.display()
                            );
                            summary.failed += 1;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err((file, e)) => {
                    log::warn!("failed fingerprinting {}: {e}", file.display());
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Fingerprints a clip and resolves it against the store.
    pub fn recognize_file(
        &mut self,
        path: &Path,
        topn: usize,
    ) -> Result<Recognition, EngineError> {
        let _span = Span::enter("recognize_file");
        let decoded = decoder::decode(path, self.limit, self.config.sample_rate)?;

        let mut set: HashSet<Fingerprint> = HashSet::new();
        for channel in &decoded.channels {
            set.extend(hashing::fingerprint_channel(channel, &self.config));
        }
        let query: Vec<Fingerprint> = set.into_iter().collect();
        let query_hashes = query.len() as u32;

        let lookup = self.store.return_matches(&query)?;
        let results = matching::align_matches(
            &mut self.store,
            &lookup.matches,
            &lookup.unique_counts,
            query_hashes,
            topn,
            &self.config,
        )?;

        Ok(Recognition {
            results,
            query_hashes,
        })
    }

    pub fn get_tracks(&mut self) -> Result<Vec<TrackRecord>, StoreError> {
        self.store.get_tracks()
    }

    pub fn delete_tracks_by_id(&mut self, ids: &[TrackId]) -> Result<(), StoreError> {
        self.store.delete_tracks_by_id(ids)
    }

    pub fn delete_unfingerprinted(&mut self) -> Result<usize, StoreError> {
        self.store.delete_unfingerprinted()
    }

    pub fn num_fingerprints(&mut self) -> Result<u64, StoreError> {
        self.store.get_num_fingerprints()
    }

    pub fn num_fingerprinted_tracks(&mut self) -> Result<u64, StoreError> {
        self.store.get_num_fingerprinted_tracks()
    }
}
