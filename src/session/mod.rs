//! Session: one loaded waveform and the operations run against it
//!
//! A session owns the source buffer and never modifies it. Pipelines and
//! round trips produce new signals; the walkthrough replays the whole
//! preprocessing tour (spectrograms, resampling, mu-law, Kaldi features)
//! and reports every stage's output shape.

mod fidelity;

pub use fidelity::{FidelityReport, ZeroPolicy};

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::dsp::{
    ChannelPermute, DownmixMono, KaldiFbank, KaldiOptions, KaldiSpectrogram, MelSpectrogram,
    MuLawEncoding, MuLawExpanding, Normalize, Pipeline, Resample, SelectChannel, Spectrogram,
    Transform, WindowType,
};
use crate::engine::{self, AudioBuffer, Layout, Signal};
use crate::error::{AudioPrepError, Result};

/// FFT size the walkthrough's Kaldi framing is derived from
const WALKTHROUGH_N_FFT: f32 = 400.0;

/// Where a session's buffer came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub path: PathBuf,
    /// SHA-256 of the file bytes, lowercase hex
    pub sha256: String,
    pub loaded_at: DateTime<Utc>,
}

/// Summary statistics of a waveform
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveformStats {
    pub channels: usize,
    pub frames: usize,
    pub sample_rate: u32,
    pub layout: Layout,
    pub duration_secs: f64,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Output shape of one walkthrough stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub shape: Vec<usize>,
    pub sample_rate: u32,
}

impl StageSummary {
    fn new(stage: &str, signal: &Signal) -> Self {
        let sample_rate = match signal {
            Signal::Waveform(buffer) => buffer.sample_rate(),
            Signal::Features(map) => map.sample_rate(),
        };
        Self {
            stage: stage.to_string(),
            shape: signal.shape(),
            sample_rate,
        }
    }
}

/// Everything the walkthrough computed, ready to print or serialize
#[derive(Debug, Clone, Serialize)]
pub struct WalkthroughReport {
    pub source: Option<SourceInfo>,
    pub stats: WaveformStats,
    pub stages: Vec<StageSummary>,
    pub fidelity: FidelityReport,
}

/// A loaded waveform plus provenance
#[derive(Debug, Clone)]
pub struct Session {
    buffer: AudioBuffer,
    source: Option<SourceInfo>,
}

impl Session {
    /// Load a WAV file and fingerprint it
    pub fn open(path: &Path) -> Result<Self> {
        let buffer = engine::load(path)?;
        let sha256 = file_checksum(path)?;
        info!(
            "Opened session on {} ({} ch, {} frames, {} Hz)",
            path.display(),
            buffer.num_channels(),
            buffer.num_frames(),
            buffer.sample_rate()
        );
        Ok(Self {
            buffer,
            source: Some(SourceInfo {
                path: path.to_path_buf(),
                sha256,
                loaded_at: Utc::now(),
            }),
        })
    }

    /// Wrap an in-memory buffer
    pub fn from_buffer(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            source: None,
        }
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn stats(&self) -> WaveformStats {
        let b = &self.buffer;
        WaveformStats {
            channels: b.num_channels(),
            frames: b.num_frames(),
            sample_rate: b.sample_rate(),
            layout: b.layout(),
            duration_secs: b.duration(),
            min: b.min(),
            max: b.max(),
            mean: b.mean(),
        }
    }

    /// Apply a pipeline to the session's buffer
    pub fn run(&self, pipeline: &Pipeline) -> Result<Signal> {
        pipeline.apply_buffer(&self.buffer)
    }

    /// Encode then expand with mu-law and measure the loss
    pub fn mu_law_round_trip(
        &self,
        quantization_channels: u32,
    ) -> Result<(AudioBuffer, FidelityReport)> {
        round_trip(&self.buffer, quantization_channels)
    }

    /// Kaldi framing of `n_fft` samples with half-frame hop, Hanning window, no dither
    pub fn kaldi_options(&self) -> KaldiOptions {
        let rate = self.buffer.sample_rate() as f32;
        let frame_length_ms = WALKTHROUGH_N_FFT / rate * 1000.0;
        KaldiOptions {
            channel: 0,
            dither: 0.0,
            window_type: WindowType::Hanning,
            frame_length_ms,
            frame_shift_ms: frame_length_ms / 2.0,
            remove_dc_offset: false,
            round_to_power_of_two: false,
            sample_frequency: rate,
        }
    }

    /// Replay the full preprocessing tour on this buffer
    pub fn walkthrough(&self) -> Result<WalkthroughReport> {
        let input: Signal = self.buffer.clone().into();
        let rate = self.buffer.sample_rate();
        let new_rate = rate / 10;
        if new_rate == 0 {
            return Err(AudioPrepError::invalid_parameter(
                "walkthrough",
                format!("cannot resample {} Hz down by a factor of 10", rate),
            ));
        }

        let mut stages = vec![StageSummary::new("waveform", &input)];
        let mut record = |stage: &str, signal: Signal| {
            info!("{}: shape {:?}", stage, signal.shape());
            stages.push(StageSummary::new(stage, &signal));
        };

        record("spectrogram", Spectrogram::default().apply(&input)?);
        record("mel_spectrogram", MelSpectrogram::default().apply(&input)?);

        let single_channel = Pipeline::new()
            .then(SelectChannel::new(0))
            .then(Resample::new(rate, new_rate));
        record("resample_channel_0", single_channel.apply(&input)?);

        let downmix = Pipeline::new()
            .then(ChannelPermute)
            .then(DownmixMono::default())
            .then(ChannelPermute)
            .then(Resample::new(rate, new_rate));
        record("downmix_resample", downmix.apply(&input)?);

        let stats = self.stats();
        let source = if self.buffer.is_normalized() {
            self.buffer.clone()
        } else {
            warn!(
                "walkthrough: samples span [{}, {}], normalizing before mu-law",
                stats.min, stats.max
            );
            Normalize
                .apply(&input)?
                .into_waveform()
                .ok_or_else(|| AudioPrepError::InvalidBuffer {
                    reason: "normalize produced a feature map".to_string(),
                })?
        };
        let encoded = MuLawEncoding::default().apply_buffer(&source)?;
        let reconstructed = MuLawExpanding::default().apply(&encoded)?;
        let fidelity = match &reconstructed {
            Signal::Waveform(r) => FidelityReport::compare(&source, r)?,
            Signal::Features(_) => {
                return Err(AudioPrepError::InvalidBuffer {
                    reason: "mu-law expanding produced a feature map".to_string(),
                })
            }
        };
        record("mu_law_encoding", encoded);
        record("mu_law_expanding", reconstructed);
        info!("mu-law round trip: {}", fidelity);

        let options = self.kaldi_options();
        record("kaldi_spectrogram", KaldiSpectrogram::new(options).apply(&input)?);
        record("kaldi_fbank", KaldiFbank::new(options).apply(&input)?);

        Ok(WalkthroughReport {
            source: self.source.clone(),
            stats,
            stages,
            fidelity,
        })
    }
}

fn round_trip(buffer: &AudioBuffer, quantization_channels: u32) -> Result<(AudioBuffer, FidelityReport)> {
    let pipeline = Pipeline::new()
        .then(MuLawEncoding::new(quantization_channels))
        .then(MuLawExpanding::new(quantization_channels));
    let reconstructed = pipeline
        .apply_buffer(buffer)?
        .into_waveform()
        .ok_or_else(|| AudioPrepError::InvalidBuffer {
            reason: "mu-law round trip produced a feature map".to_string(),
        })?;
    let report = FidelityReport::compare(buffer, &reconstructed)?;
    Ok((reconstructed, report))
}

/// SHA-256 of a file's bytes
fn file_checksum(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{save, ExportFormat};
    use tempfile::TempDir;

    fn stereo_session() -> Session {
        let buffer = AudioBuffer::stereo_sine_wave(440.0, 660.0, 0.5, 16000)
            .unwrap()
            .map_samples(|s| s * 0.5)
            .unwrap();
        Session::from_buffer(buffer)
    }

    #[test]
    fn test_stats() {
        let session = Session::from_buffer(
            AudioBuffer::from_channels(vec![vec![-0.5, 0.0, 1.0, 0.5]], 8000).unwrap(),
        );
        let stats = session.stats();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.min, -0.5);
        assert_eq!(stats.max, 1.0);
        assert!((stats.mean - 0.25).abs() < 1e-6);
        assert!(session.source().is_none());
    }

    #[test]
    fn test_open_records_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        save(stereo_session().buffer(), &path, ExportFormat::default()).unwrap();

        let session = Session::open(&path).unwrap();
        let source = session.source().unwrap();
        assert_eq!(source.path, path);
        assert_eq!(source.sha256.len(), 64);
        assert_eq!(source.sha256, file_checksum(&path).unwrap());
        assert_eq!(session.buffer().num_channels(), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let err = Session::open(Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_mu_law_round_trip() {
        let (reconstructed, report) = stereo_session().mu_law_round_trip(256).unwrap();
        assert_eq!(reconstructed.shape(), (2, 8000));
        // Both sines start at 0.0; those two NaN ratios sort last
        assert!(report.median_relative_error < 0.5);
        assert!(report.median_relative_error > 0.0);
    }

    #[test]
    fn test_kaldi_options_frame_n_fft_samples() {
        let options = stereo_session().kaldi_options();
        let framing = options.framing("test").unwrap();
        assert_eq!(framing.window_size, 400);
        assert_eq!(framing.window_shift, 200);
        assert_eq!(framing.padded_size, 400);
    }

    #[test]
    fn test_walkthrough_stage_shapes() {
        let report = stereo_session().walkthrough().unwrap();
        let shape_of = |name: &str| {
            report
                .stages
                .iter()
                .find(|s| s.stage == name)
                .map(|s| s.shape.clone())
                .unwrap()
        };
        assert_eq!(shape_of("waveform"), vec![2, 8000]);
        assert_eq!(shape_of("spectrogram"), vec![2, 41, 201]);
        assert_eq!(shape_of("mel_spectrogram"), vec![2, 41, 128]);
        assert_eq!(shape_of("resample_channel_0"), vec![1, 800]);
        assert_eq!(shape_of("downmix_resample"), vec![1, 800]);
        assert_eq!(shape_of("mu_law_encoding"), vec![2, 8000]);
        // 1 + (8000 - 400) / 200 frames
        assert_eq!(shape_of("kaldi_spectrogram"), vec![1, 39, 201]);
        assert_eq!(shape_of("kaldi_fbank"), vec![1, 39, 23]);
        assert!(report.fidelity.median_relative_error < 0.5);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["sample_rate"], 16000);
    }

    #[test]
    fn test_walkthrough_normalizes_loud_input() {
        let loud = AudioBuffer::sine_wave(300.0, 0.25, 8000)
            .unwrap()
            .map_samples(|s| s * 3.0)
            .unwrap();
        let report = Session::from_buffer(loud).walkthrough().unwrap();
        assert!(report.fidelity.median_relative_error < 0.5);
    }
}
