//! Audio file I/O
//!
//! WAV loading and saving through `hound`. Integer PCM is normalised to
//! [-1, 1) on load; the file's own sample rate and channel count are kept.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};

use crate::engine::buffer::{deinterleave, AudioBuffer};
use crate::error::{AudioPrepError, Result};

/// Output sample format for [`save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24 (integer PCM) or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::pcm16()
    }
}

impl ExportFormat {
    /// 16-bit integer PCM
    pub fn pcm16() -> Self {
        ExportFormat { bit_depth: 16 }
    }

    /// 24-bit integer PCM
    pub fn pcm24() -> Self {
        ExportFormat { bit_depth: 24 }
    }

    /// 32-bit IEEE float
    pub fn float32() -> Self {
        ExportFormat { bit_depth: 32 }
    }
}

/// Load a WAV file as a channels-first buffer
///
/// # Errors
/// * `Decode` - If the file does not exist or is not a readable WAV file
/// * `UnsupportedFormat` - If the integer bit depth is not 8, 16, 24 or 32
pub fn load(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(AudioPrepError::Decode {
            path: path.display().to_string(),
            reason: "file not found".to_string(),
            source: None,
        });
    }

    let reader = WavReader::open(path).map_err(|e| AudioPrepError::Decode {
        path: path.display().to_string(),
        reason: format!("failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    debug!(
        "{}: {} channel(s), {} Hz, {}-bit {:?}",
        path.display(),
        channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    if channels == 0 {
        return Err(AudioPrepError::Decode {
            path: path.display().to_string(),
            reason: "header declares zero channels".to_string(),
            source: None,
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)
        .map_err(|e| match e {
            AudioPrepError::Decode { reason, source, .. } => AudioPrepError::Decode {
                path: path.display().to_string(),
                reason,
                source,
            },
            other => other,
        })?;

    let buffer = AudioBuffer::from_channels(deinterleave(&interleaved, channels), spec.sample_rate)
        .map_err(|e| AudioPrepError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })?;

    info!(
        "Loaded {} ({}x{} @ {} Hz)",
        path.display(),
        buffer.num_channels(),
        buffer.num_frames(),
        buffer.sample_rate()
    );
    Ok(buffer)
}

/// Write a buffer to a WAV file at the buffer's own sample rate
pub fn save(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    if !matches!(format.bit_depth, 16 | 24 | 32) {
        return Err(AudioPrepError::UnsupportedFormat {
            format: format!("{}-bit audio (only 16, 24, 32 supported)", format.bit_depth),
        });
    }

    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;
    let interleaved = buffer.to_interleaved();

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(hound_to_io)?;
            }
        }
        _ => unreachable!("bit depth validated above"),
    }

    writer.finalize().map_err(hound_to_io)?;
    info!("Saved {} ({}-bit)", path.display(), format.bit_depth);
    Ok(())
}

fn hound_to_io(e: hound::Error) -> AudioPrepError {
    match e {
        hound::Error::IoError(io) => AudioPrepError::Io(io),
        other => AudioPrepError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    fn decode_err(e: hound::Error) -> AudioPrepError {
        AudioPrepError::Decode {
            path: String::new(),
            reason: format!("failed to read samples: {}", e),
            source: Some(Box::new(e)),
        }
    }

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        SampleFormat::Int => {
            let full_scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(AudioPrepError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            if bits_per_sample == 8 {
                reader
                    .samples::<i8>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(decode_err)
            } else if bits_per_sample == 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(decode_err)
            } else {
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v as f64 / full_scale as f64) as f32))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(decode_err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_stereo_16bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let original = AudioBuffer::stereo_sine_wave(440.0, 880.0, 0.25, 44100).unwrap();
        save(&original, &path, ExportFormat::pcm16()).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.num_channels(), 2);
        assert_eq!(loaded.num_frames(), original.num_frames());
        assert_eq!(loaded.sample_rate(), 44100);

        for ch in 0..2 {
            let orig = original.channel(ch).unwrap();
            let back = loaded.channel(ch).unwrap();
            for (o, b) in orig.iter().zip(back) {
                assert!((o - b).abs() < 1e-3, "Sample mismatch: {} vs {}", o, b);
            }
        }
    }

    #[test]
    fn test_round_trip_float32_is_lossless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");

        let original = AudioBuffer::sine_wave(1000.0, 0.1, 16000).unwrap();
        save(&original, &path, ExportFormat::float32()).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_round_trip_24bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pcm24.wav");

        let original = AudioBuffer::sine_wave(220.0, 0.1, 22050).unwrap();
        save(&original, &path, ExportFormat::pcm24()).unwrap();
        let loaded = load(&path).unwrap();

        for (o, b) in original.iter_samples().zip(loaded.iter_samples()) {
            assert!((o - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Path::new("/nonexistent/path/audio.wav"));
        match result {
            Err(AudioPrepError::Decode { path, .. }) => assert!(path.contains("nonexistent")),
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not a RIFF header").unwrap();

        let err = load(&path).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_save_rejects_unknown_bit_depth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        let buffer = AudioBuffer::silence(1, 10, 8000).unwrap();
        let err = save(&buffer, &path, ExportFormat { bit_depth: 12 }).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }
}
