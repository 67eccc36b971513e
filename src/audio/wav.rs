use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::AudioError;

/// Duration of a RIFF/WAVE file in seconds, from the `fmt ` byte rate and the
/// `data` chunk size. Samples are never read.
pub fn duration_secs(path: &Path) -> Result<f64, AudioError> {
    let file = std::fs::File::open(path).map_err(|source| AudioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_duration(std::io::BufReader::new(file)).map_err(|reason| AudioError::InvalidWav {
        path: path.to_path_buf(),
        reason,
    })
}

fn read_duration<R: Read + Seek>(mut reader: R) -> Result<f64, String> {
    let mut header = [0u8; 12];
    reader
        .read_exact(&mut header)
        .map_err(|_| "file too short for a RIFF header".to_string())?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".to_string());
    }

    let mut byte_rate: Option<u32> = None;
    loop {
        let mut chunk = [0u8; 8];
        if reader.read_exact(&mut chunk).is_err() {
            return Err("no data chunk found".to_string());
        }
        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        match &id {
            b"fmt " => {
                let mut fmt = [0u8; 16];
                if size < 16 {
                    return Err("fmt chunk too small".to_string());
                }
                reader
                    .read_exact(&mut fmt)
                    .map_err(|_| "truncated fmt chunk".to_string())?;
                byte_rate = Some(u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]));
                skip(&mut reader, i64::from(size) - 16 + i64::from(size % 2))?;
            }
            b"data" => {
                let rate = byte_rate.ok_or_else(|| "data chunk before fmt chunk".to_string())?;
                if rate == 0 {
                    return Err("byte rate is zero".to_string());
                }
                return Ok(f64::from(size) / f64::from(rate));
            }
            // Chunks are word aligned; odd sizes carry a pad byte
            _ => skip(&mut reader, i64::from(size) + i64::from(size % 2))?,
        }
    }
}

fn skip<R: Seek>(reader: &mut R, bytes: i64) -> Result<(), String> {
    reader
        .seek(SeekFrom::Current(bytes))
        .map(|_| ())
        .map_err(|e| e.to_string())
}
