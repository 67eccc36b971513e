//! Audio preparation ahead of publishing.
//!
//! WAV recordings are measured from their header and transcoded to MP3 with
//! the external `lame` encoder. MP3 files are published as they are and
//! measured by walking their frames. A caller-supplied duration overrides
//! either measurement. Tagging and encoder quality are left to the encoder.

mod wav;

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::feed::EpisodeDuration;
use crate::util::has_extension;

/// Encoder binary looked up on `PATH` when none is configured.
pub const DEFAULT_ENCODER: &str = "lame";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("Audio file '{0}' must be a WAV or MP3")]
    UnsupportedFormat(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a usable WAV file: {reason}")]
    InvalidWav { path: PathBuf, reason: String },

    #[error("Could not measure MP3 '{path}': {reason}")]
    InvalidMp3 { path: PathBuf, reason: String },

    #[error("Encoder '{0}' could not be found. Install LAME (brew install lame / apt-get install lame) or pass its path")]
    EncoderNotFound(String),

    #[error("Encoder failed on '{path}' ({status}): {stderr}")]
    EncoderFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },
}

/// An MP3 ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAudio {
    pub mp3_path: PathBuf,
    pub duration: EpisodeDuration,
}

/// Validates `input` and turns it into a publishable MP3.
///
/// `duration` overrides whatever would be measured. `encoder` is the encoder
/// binary name or path, defaulting to [`DEFAULT_ENCODER`].
pub fn prepare(
    input: &Path,
    duration: Option<EpisodeDuration>,
    encoder: Option<&str>,
) -> Result<PreparedAudio, AudioError> {
    if !input.is_file() {
        return Err(AudioError::NotFound(input.to_path_buf()));
    }

    let name = input.to_string_lossy();
    if has_extension(&name, &["mp3"]) {
        let duration = match duration {
            Some(duration) => duration,
            None => mp3_duration_of(input)?,
        };
        return Ok(PreparedAudio {
            mp3_path: input.to_path_buf(),
            duration,
        });
    }
    if !has_extension(&name, &["wav"]) {
        return Err(AudioError::UnsupportedFormat(input.to_path_buf()));
    }

    let duration = match duration {
        Some(duration) => duration,
        None => EpisodeDuration::from_secs_f64(wav::duration_secs(input)?),
    };

    let encoder = find_encoder(encoder.unwrap_or(DEFAULT_ENCODER))?;
    let mp3_path = transcode(&encoder, input)?;

    Ok(PreparedAudio { mp3_path, duration })
}

fn mp3_duration_of(path: &Path) -> Result<EpisodeDuration, AudioError> {
    let invalid = |reason: String| AudioError::InvalidMp3 {
        path: path.to_path_buf(),
        reason,
    };
    let measured = mp3_duration::from_path(path).map_err(|e| invalid(e.to_string()))?;
    if measured.is_zero() {
        return Err(invalid("no audio frames found".to_string()));
    }
    tracing::debug!(path = %path.display(), secs = measured.as_secs_f64(), "Measured MP3");
    Ok(EpisodeDuration::from_secs_f64(measured.as_secs_f64()))
}

/// Resolves a bare program name against `PATH`; anything containing a path
/// separator is taken as given.
fn find_encoder(program: &str) -> Result<PathBuf, AudioError> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(AudioError::EncoderNotFound(program.to_string()))
        };
    }

    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|path| path.is_file())
        })
        .ok_or_else(|| AudioError::EncoderNotFound(program.to_string()))
}

fn transcode(encoder: &Path, wav: &Path) -> Result<PathBuf, AudioError> {
    let mp3 = wav.with_extension("mp3");
    if mp3.exists() {
        tracing::warn!(path = %mp3.display(), "MP3 already exists, overwriting");
    }

    tracing::info!(input = %wav.display(), output = %mp3.display(), "Transcoding to MP3");

    // Arguments are passed individually; no shell is involved.
    let output = Command::new(encoder)
        .args(["-V2", "-h", "--quiet"])
        .arg(wav)
        .arg(&mp3)
        .output()
        .map_err(|source| AudioError::Io {
            path: encoder.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(AudioError::EncoderFailed {
            path: wav.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(mp3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare(&dir.path().join("nope.wav"), None, None).unwrap_err();
        assert!(matches!(err, AudioError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.flac");
        std::fs::write(&path, b"fLaC").unwrap();
        let err = prepare(&path, None, None).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_mp3_passes_through_with_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.MP3");
        std::fs::write(&path, b"ID3").unwrap();
        let duration = EpisodeDuration::from_secs(330);

        let prepared = prepare(&path, Some(duration), None).unwrap();
        assert_eq!(
            prepared,
            PreparedAudio {
                mp3_path: path,
                duration
            }
        );
    }

    /// `frames` MPEG-1 Layer III frames at 128 kbps, 44.1 kHz, no padding.
    /// Each frame is 417 bytes and 1152 samples long.
    fn mp3_bytes(frames: usize) -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x44]);
        frame.repeat(frames)
    }

    #[test]
    fn test_mp3_duration_is_measured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.mp3");
        // 383 frames * 1152 / 44100 is just over 10 seconds
        std::fs::write(&path, mp3_bytes(383)).unwrap();

        let prepared = prepare(&path, None, None).unwrap();
        assert_eq!(prepared.mp3_path, path);
        assert_eq!(prepared.duration.to_string(), "0:00:10");
    }

    #[test]
    fn test_unreadable_mp3_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.mp3");
        std::fs::write(&path, b"not an mpeg stream at all").unwrap();
        let err = prepare(&path, None, None).unwrap_err();
        assert!(matches!(err, AudioError::InvalidMp3 { .. }), "{err:?}");
    }

    #[test]
    fn test_missing_encoder_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.wav");
        std::fs::write(&path, wav::tests::wav_bytes(1000, 1000, &[])).unwrap();
        let encoder = dir.path().join("no-such-lame");

        let err = prepare(&path, None, Some(&encoder.to_string_lossy())).unwrap_err();
        assert!(matches!(err, AudioError::EncoderNotFound(_)));
    }

    #[cfg(unix)]
    fn fake_encoder(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-lame");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_wav_is_measured_and_transcoded() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("episode.wav");
        // 330 seconds at 1000 bytes/s
        std::fs::write(&wav_path, wav::tests::wav_bytes(1000, 330_000, &[])).unwrap();
        // lame -V2 -h --quiet <in> <out>
        let encoder = fake_encoder(dir.path(), "#!/bin/sh\ncp \"$4\" \"$5\"\n");

        let prepared = prepare(&wav_path, None, Some(&encoder.to_string_lossy())).unwrap();

        assert_eq!(prepared.mp3_path, dir.path().join("episode.mp3"));
        assert_eq!(prepared.duration.to_string(), "0:05:30");
        assert!(prepared.mp3_path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("episode.wav");
        std::fs::write(&wav_path, wav::tests::wav_bytes(1000, 1000, &[])).unwrap();
        let encoder = fake_encoder(dir.path(), "#!/bin/sh\necho 'bad input' >&2\nexit 3\n");

        let err = prepare(&wav_path, None, Some(&encoder.to_string_lossy())).unwrap_err();
        match err {
            AudioError::EncoderFailed { stderr, .. } => assert_eq!(stderr, "bad input"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
