// src/store/sqlite.rs
use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, OpenFlags, params, params_from_iter};

use crate::error::StoreError;
use crate::hashing::{Fingerprint, HashBytes};
use crate::store::{MatchLookup, Store, TrackId, TrackMeta, TrackRecord};

/// Hashes per `IN (...)` lookup, kept under SQLite's host-parameter limit.
const MATCH_CHUNK_SIZE: usize = 500;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracks (
        track_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        fingerprinted INTEGER NOT NULL DEFAULT 0,
        file_sha1 BLOB NOT NULL,
        total_hashes INTEGER NOT NULL DEFAULT 0,
        publisher TEXT,
        length REAL,
        singer TEXT,
        album TEXT,
        publictime TEXT,
        date_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        date_modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS fingerprints (
        hash BLOB NOT NULL,
        track_id INTEGER NOT NULL,
        offset INTEGER NOT NULL,
        FOREIGN KEY (track_id) REFERENCES tracks (track_id) ON DELETE CASCADE,
        UNIQUE (track_id, offset, hash)
    );
    CREATE INDEX IF NOT EXISTS ix_fingerprints_hash ON fingerprints (hash);
";

const TRACK_COLUMNS: &str = "track_id, name, publisher, length, singer, album, publictime, \
                             file_sha1, total_hashes, date_created";

/// SQLite-backed [`Store`]. A single connection serves the coordinator;
/// workers never touch it.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Private scratch database, used by the tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRecord> {
        let sha1_blob: Vec<u8> = row.get(7)?;
        let mut file_sha1 = [0u8; 20];
        if sha1_blob.len() == 20 {
            file_sha1.copy_from_slice(&sha1_blob);
        }
        Ok(TrackRecord {
            track_id: row.get(0)?,
            meta: TrackMeta {
                name: row.get(1)?,
                publisher: row.get(2)?,
                length: row.get(3)?,
                singer: row.get(4)?,
                album: row.get(5)?,
                publictime: row.get(6)?,
            },
            file_sha1,
            total_hashes: row.get::<_, i64>(8)? as u32,
            date_created: row.get(9)?,
        })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(inner, _) => match inner.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Transient(e.to_string())
                }
                _ => StoreError::Permanent(e.to_string()),
            },
            _ => StoreError::Permanent(e.to_string()),
        }
    }
}

impl Store for SqliteStore {
    fn setup(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn insert_track(
        &mut self,
        meta: &TrackMeta,
        file_sha1: &[u8; 20],
        total_hashes: u32,
    ) -> Result<TrackId, StoreError> {
        self.conn.execute(
            "INSERT INTO tracks (name, file_sha1, total_hashes, publisher, length, singer, album, publictime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                meta.name,
                file_sha1.as_slice(),
                total_hashes,
                meta.publisher,
                meta.length,
                meta.singer,
                meta.album,
                meta.publictime,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_hashes(
        &mut self,
        track_id: TrackId,
        hashes: &[Fingerprint],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO fingerprints (hash, track_id, offset) VALUES (?1, ?2, ?3)",
            )?;
            for fingerprint in hashes {
                stmt.execute(params![
                    fingerprint.hash.as_slice(),
                    track_id,
                    fingerprint.offset
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn set_track_fingerprinted(&mut self, track_id: TrackId) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE tracks
             SET fingerprinted = 1, date_modified = CURRENT_TIMESTAMP
             WHERE track_id = ?1",
            params![track_id],
        )?;
        Ok(())
    }

    fn delete_unfingerprinted(&mut self) -> Result<usize, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE fingerprinted = 0", [])?;
        Ok(deleted)
    }

    fn delete_tracks_by_id(&mut self, ids: &[TrackId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM tracks WHERE track_id IN ({placeholders})");
        self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(())
    }

    fn get_tracks(&mut self) -> Result<Vec<TrackRecord>, StoreError> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE fingerprinted = 1");
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn get_tracks_by_ids(&mut self, ids: &[TrackId]) -> Result<Vec<TrackRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE track_id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map(params_from_iter(ids.iter()), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn get_num_fingerprints(&mut self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_num_fingerprinted_tracks(&mut self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE fingerprinted = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn return_matches(&mut self, query: &[Fingerprint]) -> Result<MatchLookup, StoreError> {
        // Collapse duplicate query hashes: one lookup, one offset each.
        let mut mapper: HashMap<HashBytes, u32> = HashMap::new();
        for fingerprint in query {
            mapper.entry(fingerprint.hash).or_insert(fingerprint.offset);
        }

        let keys: Vec<HashBytes> = mapper.keys().copied().collect();
        let mut lookup = MatchLookup::default();
        let mut counted: HashSet<(TrackId, HashBytes)> = HashSet::new();

        for chunk in keys.chunks(MATCH_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT hash, track_id, offset FROM fingerprints WHERE hash IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(chunk.iter().map(|h| h.as_slice())),
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, TrackId>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?;
            for row in rows {
                let (hash_blob, track_id, stored_offset) = row?;
                let hash: HashBytes = hash_blob
                    .try_into()
                    .map_err(|_| StoreError::Permanent("malformed hash blob".into()))?;
                let query_offset = mapper[&hash];
                if counted.insert((track_id, hash)) {
                    *lookup.unique_counts.entry(track_id).or_insert(0) += 1;
                }
                lookup
                    .matches
                    .push((track_id, stored_offset - query_offset as i64));
            }
        }
        Ok(lookup)
    }
}
