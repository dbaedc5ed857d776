// src/main.rs
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use resona::config::DEFAULT_TOPN;
use resona::{Engine, EngineConfig, SqliteStore};

#[derive(Parser)]
#[command(name = "resona")]
#[command(about = "Fingerprint audio tracks and recognize clips against them", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "resona.sqlite")]
    db: PathBuf,

    /// Only fingerprint the first N seconds of each file
    #[arg(long)]
    limit: Option<f32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema (idempotent)
    Setup,
    /// Fingerprint a single audio file
    Ingest { file: PathBuf },
    /// Fingerprint every matching file under a directory
    IngestDir {
        dir: PathBuf,
        /// Extensions to pick up, comma separated
        #[arg(long, value_delimiter = ',', default_value = "mp3,wav,flac,ogg,m4a")]
        ext: Vec<String>,
        /// Worker threads (defaults to the logical CPU count)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Identify a clip against the fingerprinted corpus
    Recognize {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOPN)]
        topn: usize,
    },
    /// List fingerprinted tracks
    List,
    /// Show corpus counters
    Stats,
    /// Delete tracks (and their fingerprints) by id
    Delete { ids: Vec<i64> },
    /// Remove tracks left behind by interrupted ingests
    PurgeOrphans,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let store = SqliteStore::open(&cli.db)?;
    let mut engine = Engine::new(store, EngineConfig::default()).with_limit(cli.limit);
    engine.setup()?;

    match cli.command {
        Command::Setup => {
            println!("schema ready in {}", cli.db.display());
        }
        Command::Ingest { file } => match engine.ingest_file(&file)? {
            Some(track_id) => println!("ingested {} as track {track_id}", file.display()),
            None => println!("{} already fingerprinted", file.display()),
        },
        Command::IngestDir { dir, ext, jobs } => {
            let extensions: Vec<&str> = ext.iter().map(String::as_str).collect();
            let summary = engine.ingest_directory(&dir, &extensions, jobs)?;
            println!(
                "ingested {}, skipped {}, failed {}",
                summary.ingested, summary.skipped, summary.failed
            );
            if summary.ingested == 0 && summary.failed > 0 {
                bail!("no file could be ingested");
            }
        }
        Command::Recognize { file, topn } => {
            let recognition = engine.recognize_file(&file, topn)?;
            if recognition.results.is_empty() {
                println!("no match ({} query hashes)", recognition.query_hashes);
            }
            for (rank, m) in recognition.results.iter().enumerate() {
                println!(
                    "#{rank} track {id} \"{name}\"{singer} \
                     matched {matched}/{input} (input {ic:.2}, track {fc:.2}) \
                     at {secs:.3}s [sha1 {sha1}]",
                    rank = rank + 1,
                    id = m.track_id,
                    name = m.meta.name,
                    singer = m
                        .meta
                        .singer
                        .as_deref()
                        .map(|s| format!(" by {s}"))
                        .unwrap_or_default(),
                    matched = m.hashes_matched,
                    input = m.input_hashes,
                    ic = m.input_confidence,
                    fc = m.fingerprinted_confidence,
                    secs = m.offset_seconds,
                    sha1 = hex::encode(m.file_sha1),
                );
            }
        }
        Command::List => {
            for track in engine.get_tracks()? {
                println!(
                    "{id}\t{name}\t{singer}\t{hashes} hashes\t{sha1}",
                    id = track.track_id,
                    name = track.meta.name,
                    singer = track.meta.singer.as_deref().unwrap_or("-"),
                    hashes = track.total_hashes,
                    sha1 = hex::encode(track.file_sha1),
                );
            }
        }
        Command::Stats => {
            println!(
                "{} fingerprinted track(s), {} fingerprint(s)",
                engine.num_fingerprinted_tracks()?,
                engine.num_fingerprints()?
            );
        }
        Command::Delete { ids } => {
            engine.delete_tracks_by_id(&ids)?;
            println!("deleted {} track(s)", ids.len());
        }
        Command::PurgeOrphans => {
            let removed = engine.delete_unfingerprinted()?;
            println!("removed {removed} orphaned track(s)");
        }
    }
    Ok(())
}
