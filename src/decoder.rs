// src/decoder.rs
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rubato::{FftFixedIn, Resampler};
use sha1::{Digest, Sha1};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Input block size fed to the resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// A decoded audio file: one integer PCM vector per channel, the rate the
/// samples ended up at, and the SHA-1 of the file's raw bytes.
pub struct Decoded {
    pub channels: Vec<Vec<i16>>,
    pub sample_rate: u32,
    pub file_sha1: [u8; 20],
}

/// Decodes `path` into per-channel PCM. Channels are truncated to
/// `limit_seconds` when given, and resampled to `engine_rate` when the
/// file's native rate differs.
pub fn decode(
    path: &Path,
    limit_seconds: Option<f32>,
    engine_rate: u32,
) -> Result<Decoded, DecodeError> {
    let file_sha1 = unique_hash(path)?;

    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| DecodeError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let native_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::NoAudioTrack(path.to_path_buf()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let sample_limit = limit_seconds
        .filter(|l| *l >= 0.0)
        .map(|l| (l as f64 * native_rate as f64) as usize);

    let mut channels: Vec<Vec<i16>> = Vec::new();
    loop {
        if let Some(limit) = sample_limit {
            if channels.first().is_some_and(|c| c.len() >= limit) {
                break;
            }
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("skipping undecodable packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }

        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
    }

    if channels.is_empty() || channels[0].is_empty() {
        return Err(DecodeError::NoAudioTrack(path.to_path_buf()));
    }
    if let Some(limit) = sample_limit {
        for channel in &mut channels {
            channel.truncate(limit);
        }
    }

    let (channels, sample_rate) = if native_rate != engine_rate {
        (resample(channels, native_rate, engine_rate)?, engine_rate)
    } else {
        (channels, native_rate)
    };

    Ok(Decoded {
        channels,
        sample_rate,
        file_sha1,
    })
}

/// Converts every channel from `from_rate` to `to_rate` with an FFT-based
/// polyphase resampler, feeding fixed-size chunks and draining the
/// resampler's internal delay line at the end.
fn resample(
    channels: Vec<Vec<i16>>,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<i16>>, DecodeError> {
    let channel_count = channels.len();
    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        2,
        channel_count,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let input: Vec<Vec<f32>> = channels
        .iter()
        .map(|c| c.iter().map(|&s| s as f32).collect())
        .collect();
    let total = input[0].len();
    let mut output: Vec<Vec<i16>> = vec![Vec::new(); channel_count];

    let mut pos = 0usize;
    while pos < total {
        let need = resampler.input_frames_next();
        let blocks = if total - pos >= need {
            let chunk: Vec<&[f32]> = input.iter().map(|c| &c[pos..pos + need]).collect();
            pos += need;
            resampler.process(&chunk, None)
        } else {
            let chunk: Vec<&[f32]> = input.iter().map(|c| &c[pos..]).collect();
            pos = total;
            resampler.process_partial(Some(chunk.as_slice()), None)
        }
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
        append_blocks(&mut output, blocks);
    }

    let tail = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    append_blocks(&mut output, tail);

    Ok(output)
}

fn append_blocks(output: &mut [Vec<i16>], blocks: Vec<Vec<f32>>) {
    for (channel, block) in output.iter_mut().zip(blocks) {
        channel.extend(
            block
                .into_iter()
                .map(|s| s.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16),
        );
    }
}

/// Recursively lists files under `path` whose extension matches one of
/// `extensions`, case-insensitively. Returns (path, lowercased extension)
/// pairs in directory-walk order.
pub fn find_files(path: &Path, extensions: &[&str]) -> std::io::Result<Vec<(PathBuf, String)>> {
    let allowed: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let mut found = Vec::new();
    walk(path, &allowed, &mut found)?;
    Ok(found)
}

fn walk(
    dir: &Path,
    allowed: &[String],
    found: &mut Vec<(PathBuf, String)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, allowed, found)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_ascii_lowercase();
            if allowed.iter().any(|a| *a == ext) {
                found.push((path, ext));
            }
        }
    }
    Ok(())
}

/// SHA-1 over the file's raw bytes, the content identity used for ingest
/// deduplication.
pub fn unique_hash(path: &Path) -> std::io::Result<[u8; 20]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn write_wav(path: &Path, sample_rate: u32, channels: &[Vec<i16>]) {
        let spec = hound::WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..channels[0].len() {
            for channel in channels {
                writer.write_sample(channel[i]).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn sine(freq: f32, seconds: f32, rate: u32, amplitude: f32) -> Vec<i16> {
        (0..(seconds * rate as f32) as usize)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f32 / rate as f32).sin()) as i16)
            .collect()
    }

    #[test]
    fn decodes_stereo_wav_into_two_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let left = sine(440.0, 1.0, 44100, 12_000.0);
        let right = sine(880.0, 1.0, 44100, 12_000.0);
        write_wav(&path, 44100, &[left.clone(), right.clone()]);

        let decoded = decode(&path, None, 44100).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.channels.len(), 2);
        assert_eq!(decoded.channels[0].len(), left.len());
        assert_eq!(decoded.channels[0], left);
        assert_eq!(decoded.channels[1], right);
    }

    #[test]
    fn limit_truncates_each_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 44100, &[sine(440.0, 2.0, 44100, 12_000.0)]);

        let decoded = decode(&path, Some(0.5), 44100).unwrap();
        assert_eq!(decoded.channels[0].len(), 22050);
    }

    #[test]
    fn off_rate_audio_is_resampled_to_the_engine_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone22k.wav");
        write_wav(&path, 22050, &[sine(440.0, 1.0, 22050, 12_000.0)]);

        let decoded = decode(&path, None, 44100).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        // The polyphase stages eat a little of the tail; the length must
        // still land near the doubled duration, far from the input's 22050.
        let len = decoded.channels[0].len() as f64;
        assert!((len - 44100.0).abs() < 4096.0, "resampled length {len}");
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, b"this is not audio at all").unwrap();
        assert!(decode(&path, None, 44100).is_err());
    }

    #[test]
    fn find_files_recurses_and_ignores_extension_case() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.WAV"), b"x").unwrap();
        std::fs::write(dir.path().join("nested/b.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"x").unwrap();

        let mut found = find_files(dir.path(), &["wav", "mp3"]).unwrap();
        found.sort();
        let exts: Vec<&str> = found.iter().map(|(_, e)| e.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(exts.contains(&"wav") && exts.contains(&"mp3"));
    }

    #[test]
    fn unique_hash_matches_known_sha1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        let digest = unique_hash(&path).unwrap();
        assert_eq!(hex::encode(digest), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
