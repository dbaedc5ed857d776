//! Audio fingerprinting and recognition: builds a persistent index of
//! time-localized spectral hashes over a reference corpus, then identifies
//! unknown clips by alignment-voted lookups against that index.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod matching;
pub mod metadata;
pub mod peaks;
pub mod spectrogram;
pub mod store;
pub mod timer;

pub use config::EngineConfig;
pub use engine::{BatchSummary, Engine, Recognition};
pub use matching::TrackMatch;
pub use store::{SqliteStore, Store};
