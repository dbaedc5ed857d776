// src/metadata.rs
use std::fs::File;
use std::path::Path;

use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;

use crate::store::TrackMeta;

/// Best-effort track metadata. Tag failures never abort an ingest: the
/// filename stem supplies the display name (and sometimes the singer)
/// whenever the container carries no title.
///
/// Stem precedence when no title tag exists:
/// 1. stems with an `[mqms…]` marker: marker stripped, `singer-title`;
/// 2. stems ending in a run of digits after a `-`: digits stripped,
///    underscores to spaces, `title-singer`;
/// 3. any other `-`-separated stem: `singer-title`;
/// 4. otherwise the whole stem is the title.
pub fn extract(path: &Path) -> TrackMeta {
    let mut meta = TrackMeta::default();
    if let Err(e) = read_tags(path, &mut meta) {
        log::debug!("no readable tags in {}: {e}", path.display());
    }
    if meta.name.is_empty() {
        let (name, singer) = stem_heuristics(&file_stem(path));
        meta.name = name;
        if let Some(singer) = singer {
            meta.singer = Some(singer);
        }
    }
    meta
}

fn read_tags(path: &Path, meta: &mut TrackMeta) -> Result<(), SymphoniaError> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(extension);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    if let Some(track) = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
    {
        if let (Some(frames), Some(rate)) =
            (track.codec_params.n_frames, track.codec_params.sample_rate)
        {
            meta.length = Some(frames as f64 / rate as f64);
        }
    }

    if let Some(revision) = probed.format.metadata().current() {
        for tag in revision.tags() {
            apply_tag(tag, meta);
        }
    }
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            for tag in revision.tags() {
                apply_tag(tag, meta);
            }
        }
    }
    Ok(())
}

fn apply_tag(tag: &Tag, meta: &mut TrackMeta) {
    let value = tag.value.to_string();
    if value.is_empty() {
        return;
    }
    match tag.std_key {
        Some(StandardTagKey::TrackTitle) if meta.name.is_empty() => meta.name = value,
        Some(StandardTagKey::Artist) if meta.singer.is_none() => meta.singer = Some(value),
        Some(StandardTagKey::Album) if meta.album.is_none() => meta.album = Some(value),
        Some(StandardTagKey::Label) if meta.publisher.is_none() => meta.publisher = Some(value),
        Some(StandardTagKey::Date | StandardTagKey::OriginalDate)
            if meta.publictime.is_none() =>
        {
            meta.publictime = Some(value)
        }
        _ => {}
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem_heuristics(stem: &str) -> (String, Option<String>) {
    let stem = stem.trim();

    if stem.contains("[mqms") {
        let cleaned = strip_mqms_markers(stem);
        let parts: Vec<&str> = cleaned.split('-').collect();
        if parts.len() == 2 {
            return (parts[1].trim().to_string(), Some(parts[0].trim().to_string()));
        }
        return (cleaned.trim().to_string(), None);
    }

    if stem.contains('-') {
        let last = stem.rsplit('-').next().unwrap_or_default();
        if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
            let raw = stem
                .trim_end_matches(|c: char| c.is_ascii_digit())
                .replace('_', " ");
            let raw = raw.trim_matches('-');
            let parts: Vec<&str> = raw.split('-').collect();
            if parts.len() == 2 {
                // Download-suffixed names come as `title-singer-digits`.
                return (parts[0].trim().to_string(), Some(parts[1].trim().to_string()));
            }
            return (raw.trim().to_string(), None);
        }
    }

    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() >= 2 {
        (parts[1].trim().to_string(), Some(parts[0].trim().to_string()))
    } else {
        (stem.to_string(), None)
    }
}

fn strip_mqms_markers(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut rest = stem;
    while let Some(start) = rest.find("[mqms") {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
