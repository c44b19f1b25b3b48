//! Spectral transforms
//!
//! - `Spectrogram`: centred STFT (reflect padding, periodic Hann window)
//! - `MelScale`: HTK triangular filterbank over a linear spectrogram
//! - `MelSpectrogram`: the two above in one stage
//! - `SpectrogramToDb`: power/magnitude to decibels
//! - `Mfcc`: mel spectrogram, log compression, orthonormal DCT-II
//!
//! Feature maps are laid out channels × frames × bins.

use std::f32::consts::PI;

use log::debug;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_features, expect_waveform, Transform};
use crate::engine::{FeatureKind, FeatureMap, FrequencyAxis, Layout, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

/// Floor applied before taking logarithms of power/magnitude values
const AMIN: f32 = 1e-10;

/// Offset used by MFCC when `log_mels` is set
const LOG_MEL_OFFSET: f32 = 1e-6;

/// Dynamic range kept by MFCC's decibel conversion
const MFCC_TOP_DB: f32 = 80.0;

// ============================================================================
// Spectrum type
// ============================================================================

/// Whether a spectrogram holds |X| or |X|^2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumType {
    Magnitude,
    #[default]
    Power,
}

impl SpectrumType {
    fn kind(self) -> FeatureKind {
        match self {
            SpectrumType::Magnitude => FeatureKind::Magnitude,
            SpectrumType::Power => FeatureKind::Power,
        }
    }

    fn db_multiplier(self) -> f32 {
        match self {
            SpectrumType::Magnitude => 20.0,
            SpectrumType::Power => 10.0,
        }
    }
}

// ============================================================================
// Spectrogram
// ============================================================================

/// Short-time Fourier transform of every channel
///
/// # Parameters
/// - `n_fft`: FFT size; output has `n_fft / 2 + 1` bins (default 400)
/// - `win_length`: Hann window length, centred in the FFT frame (default `n_fft`)
/// - `hop_length`: frame advance (default `win_length / 2`)
/// - `pad`: zeros added to both ends of the signal before framing
/// - `power`: magnitude or power output
/// - `normalized`: divide by the window's L2 norm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spectrogram {
    pub n_fft: usize,
    pub win_length: Option<usize>,
    pub hop_length: Option<usize>,
    pub pad: usize,
    pub power: SpectrumType,
    pub normalized: bool,
}

impl Default for Spectrogram {
    fn default() -> Self {
        Self {
            n_fft: 400,
            win_length: None,
            hop_length: None,
            pad: 0,
            power: SpectrumType::Power,
            normalized: false,
        }
    }
}

impl Spectrogram {
    pub fn new(n_fft: usize) -> Self {
        Self {
            n_fft,
            ..Self::default()
        }
    }

    pub fn with_hop_length(mut self, hop_length: usize) -> Self {
        self.hop_length = Some(hop_length);
        self
    }

    pub fn with_win_length(mut self, win_length: usize) -> Self {
        self.win_length = Some(win_length);
        self
    }

    pub fn with_power(mut self, power: SpectrumType) -> Self {
        self.power = power;
        self
    }

    pub fn win_length(&self) -> usize {
        self.win_length.unwrap_or(self.n_fft)
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length.unwrap_or(self.win_length() / 2)
    }

    /// Frames produced for a signal of `num_samples` (before `pad`)
    ///
    /// A signal too short to fill one centred window yields 0.
    pub fn num_frames(&self, num_samples: usize) -> Result<usize> {
        self.validate()?;
        let padded = num_samples + 2 * self.pad + 2 * (self.n_fft / 2);
        Ok(padded
            .checked_sub(self.n_fft)
            .map_or(0, |room| 1 + room / self.hop_length()))
    }

    fn validate(&self) -> Result<()> {
        let win = self.win_length();
        if self.n_fft == 0 || win == 0 || win > self.n_fft || self.hop_length() == 0 {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                format!(
                    "need 0 < win_length ({}) <= n_fft ({}) and hop_length > 0 ({})",
                    win,
                    self.n_fft,
                    self.hop_length()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn compute(&self, input: &Signal) -> Result<FeatureMap> {
        self.validate()?;
        let buffer = expect_waveform(input, self.name())?;
        if buffer.layout() != Layout::ChannelsFirst {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                "expected channels-first (CL) input",
            ));
        }
        let padded_len = buffer.num_frames() + 2 * self.pad;
        if padded_len <= self.n_fft / 2 {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "signal of {} frames is too short for reflect padding of {}",
                    padded_len,
                    self.n_fft / 2
                ),
            ));
        }

        let window = centered_hann(self.win_length(), self.n_fft);
        let norm = if self.normalized {
            window.iter().map(|w| w * w).sum::<f32>().sqrt()
        } else {
            1.0
        };
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let data = buffer
            .channels()
            .iter()
            .map(|channel| {
                let mut padded = vec![0.0; self.pad];
                padded.extend_from_slice(channel);
                padded.resize(padded_len, 0.0);
                stft_frames(&padded, self.n_fft, self.hop_length(), &window, fft.as_ref())
                    .into_iter()
                    .map(|frame| {
                        frame
                            .into_iter()
                            .map(|c| {
                                let mag = c.norm() / norm;
                                match self.power {
                                    SpectrumType::Magnitude => mag,
                                    SpectrumType::Power => mag * mag,
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let map = FeatureMap::new(
            data,
            buffer.sample_rate(),
            self.power.kind(),
            FrequencyAxis::Linear,
        )?;
        debug!("spectrogram: {:?} -> {:?}", buffer.shape(), map.shape());
        Ok(map)
    }
}

impl Transform for Spectrogram {
    impl_transform_common!("spectrogram");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        Ok(self.compute(input)?.into())
    }
}

// ============================================================================
// MelScale
// ============================================================================

/// Project a linear-frequency spectrogram onto `n_mels` HTK mel bands
///
/// `sample_rate` defaults to the rate recorded on the input; when set it must
/// match it. `f_max` defaults to Nyquist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelScale {
    pub n_mels: usize,
    pub sample_rate: Option<u32>,
    pub f_min: f32,
    pub f_max: Option<f32>,
}

impl Default for MelScale {
    fn default() -> Self {
        Self {
            n_mels: 128,
            sample_rate: None,
            f_min: 0.0,
            f_max: None,
        }
    }
}

impl MelScale {
    pub fn new(n_mels: usize) -> Self {
        Self {
            n_mels,
            ..Self::default()
        }
    }

    pub(crate) fn compute(&self, map: &FeatureMap) -> Result<FeatureMap> {
        if map.axis() != FrequencyAxis::Linear
            || !matches!(map.kind(), FeatureKind::Power | FeatureKind::Magnitude)
        {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "expected a linear power or magnitude spectrogram, got {:?} on a {:?} axis",
                    map.kind(),
                    map.axis()
                ),
            ));
        }
        let sample_rate = resolve_rate(self.name(), self.sample_rate, map.sample_rate())?;
        let f_max = self.f_max.unwrap_or((sample_rate / 2) as f32);
        if self.n_mels == 0 || self.f_min < 0.0 || self.f_min >= f_max {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                format!(
                    "need n_mels > 0 and 0 <= f_min ({}) < f_max ({})",
                    self.f_min, f_max
                ),
            ));
        }

        let fb = mel_filterbank(map.num_bins(), self.f_min, f_max, self.n_mels, sample_rate);
        let data = map
            .data()
            .iter()
            .map(|channel| channel.iter().map(|frame| apply_filterbank(frame, &fb)).collect())
            .collect();
        FeatureMap::new(data, map.sample_rate(), map.kind(), FrequencyAxis::Mel)
    }
}

impl Transform for MelScale {
    impl_transform_common!("mel_scale");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let map = expect_features(input, self.name())?;
        Ok(self.compute(map)?.into())
    }
}

// ============================================================================
// MelSpectrogram
// ============================================================================

/// `Spectrogram` followed by `MelScale`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelSpectrogram {
    pub spectrogram: Spectrogram,
    pub mel: MelScale,
}

impl MelSpectrogram {
    pub fn new(spectrogram: Spectrogram, mel: MelScale) -> Self {
        Self { spectrogram, mel }
    }

    pub(crate) fn compute(&self, input: &Signal) -> Result<FeatureMap> {
        let spec = self.spectrogram.compute(input)?;
        self.mel.compute(&spec)
    }
}

impl Transform for MelSpectrogram {
    impl_transform_common!("mel_spectrogram");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        Ok(self.compute(input)?.into())
    }
}

// ============================================================================
// SpectrogramToDb
// ============================================================================

/// Convert a power or magnitude spectrogram to decibels
///
/// `10 * log10(x)` for power, `20 * log10(x)` for magnitude, with `x` floored
/// at 1e-10. With `top_db`, values more than `top_db` below the map's maximum
/// are raised to that floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramToDb {
    pub stype: SpectrumType,
    pub top_db: Option<f32>,
}

impl SpectrogramToDb {
    pub fn new(stype: SpectrumType, top_db: Option<f32>) -> Self {
        Self { stype, top_db }
    }

    pub(crate) fn compute(&self, map: &FeatureMap) -> Result<FeatureMap> {
        if map.kind() != self.stype.kind() {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!("configured for {:?} input, got {:?}", self.stype, map.kind()),
            ));
        }
        if let Some(top_db) = self.top_db {
            if !(top_db >= 0.0) {
                return Err(AudioPrepError::invalid_parameter(
                    self.name(),
                    format!("top_db must be non-negative, got {}", top_db),
                ));
            }
        }

        let multiplier = self.stype.db_multiplier();
        let db: Vec<Vec<Vec<f32>>> = map
            .data()
            .iter()
            .map(|channel| {
                channel
                    .iter()
                    .map(|frame| frame.iter().map(|&x| multiplier * x.max(AMIN).log10()).collect())
                    .collect()
            })
            .collect();
        let mut out = FeatureMap::new(db, map.sample_rate(), FeatureKind::Decibels, map.axis())?;

        if let Some(top_db) = self.top_db {
            let floor = out.max() - top_db;
            let clamped = out
                .data()
                .iter()
                .map(|c| c.iter().map(|f| f.iter().map(|&v| v.max(floor)).collect()).collect())
                .collect();
            out = FeatureMap::new(clamped, out.sample_rate(), out.kind(), out.axis())?;
        }
        Ok(out)
    }
}

impl Transform for SpectrogramToDb {
    impl_transform_common!("spectrogram_to_db");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let map = expect_features(input, self.name())?;
        Ok(self.compute(map)?.into())
    }
}

// ============================================================================
// Mfcc
// ============================================================================

/// Mel-frequency cepstral coefficients
///
/// Mel power spectrogram, then decibels (top_db 80) or `ln(x + 1e-6)` when
/// `log_mels` is set, then an orthonormal DCT-II keeping `n_mfcc` coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mfcc {
    pub n_mfcc: usize,
    pub log_mels: bool,
    pub mel_spectrogram: MelSpectrogram,
}

impl Default for Mfcc {
    fn default() -> Self {
        Self {
            n_mfcc: 40,
            log_mels: false,
            mel_spectrogram: MelSpectrogram::default(),
        }
    }
}

impl Mfcc {
    pub fn new(n_mfcc: usize) -> Self {
        Self {
            n_mfcc,
            ..Self::default()
        }
    }
}

impl Transform for Mfcc {
    impl_transform_common!("mfcc");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let n_mels = self.mel_spectrogram.mel.n_mels;
        if self.n_mfcc == 0 || self.n_mfcc > n_mels {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                format!("n_mfcc ({}) must be in 1..={} (n_mels)", self.n_mfcc, n_mels),
            ));
        }
        if self.mel_spectrogram.spectrogram.power != SpectrumType::Power {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                "mel spectrogram must produce power values",
            ));
        }

        let mel = self.mel_spectrogram.compute(input)?;
        let log_mel = if self.log_mels {
            let data = mel
                .data()
                .iter()
                .map(|c| {
                    c.iter()
                        .map(|f| f.iter().map(|&x| (x + LOG_MEL_OFFSET).ln()).collect())
                        .collect()
                })
                .collect();
            FeatureMap::new(data, mel.sample_rate(), FeatureKind::Decibels, FrequencyAxis::Mel)?
        } else {
            SpectrogramToDb::new(SpectrumType::Power, Some(MFCC_TOP_DB)).compute(&mel)?
        };

        let dct = dct_ortho(n_mels, self.n_mfcc);
        let data = log_mel
            .data()
            .iter()
            .map(|channel| {
                channel
                    .iter()
                    .map(|frame| {
                        dct.iter()
                            .map(|basis| basis.iter().zip(frame).map(|(b, x)| b * x).sum())
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Ok(FeatureMap::new(data, mel.sample_rate(), FeatureKind::Cepstral, FrequencyAxis::Mel)?.into())
    }
}

// ============================================================================
// Shared kernels
// ============================================================================

fn resolve_rate(transform: &str, configured: Option<u32>, actual: u32) -> Result<u32> {
    match configured {
        Some(rate) if rate != actual => Err(AudioPrepError::config_mismatch(
            transform,
            format!("configured for {} Hz, input is {} Hz", rate, actual),
        )),
        _ => Ok(actual),
    }
}

/// Periodic Hann window of `win_length`, zero-padded symmetrically to `n_fft`
fn centered_hann(win_length: usize, n_fft: usize) -> Vec<f32> {
    let left = (n_fft - win_length) / 2;
    let mut window = vec![0.0; n_fft];
    for n in 0..win_length {
        window[left + n] = 0.5 * (1.0 - (2.0 * PI * n as f32 / win_length as f32).cos());
    }
    window
}

/// Centred STFT with reflect padding; returns the non-negative frequency bins
fn stft_frames(
    signal: &[f32],
    n_fft: usize,
    hop_length: usize,
    window: &[f32],
    fft: &dyn rustfft::Fft<f32>,
) -> Vec<Vec<Complex<f32>>> {
    let half = n_fft / 2;
    let n = signal.len() as isize;
    let num_frames = 1 + (signal.len() + 2 * half - n_fft) / hop_length;

    (0..num_frames)
        .map(|frame_idx| {
            let start = (frame_idx * hop_length) as isize - half as isize;
            let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                .map(|i| {
                    let mut idx = start + i as isize;
                    if idx < 0 {
                        idx = -idx;
                    }
                    if idx >= n {
                        idx = 2 * (n - 1) - idx;
                    }
                    Complex::new(signal[idx as usize] * window[i], 0.0)
                })
                .collect();
            fft.process(&mut buffer);
            buffer.truncate(n_fft / 2 + 1);
            buffer
        })
        .collect()
}

fn hz_to_mel_htk(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz_htk(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular HTK filterbank, `[n_mels][n_freqs]`, without area normalisation
pub(crate) fn mel_filterbank(
    n_freqs: usize,
    f_min: f32,
    f_max: f32,
    n_mels: usize,
    sample_rate: u32,
) -> Vec<Vec<f32>> {
    let nyquist = (sample_rate / 2) as f32;
    let all_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| {
            if n_freqs > 1 {
                nyquist * i as f32 / (n_freqs - 1) as f32
            } else {
                0.0
            }
        })
        .collect();

    let m_min = hz_to_mel_htk(f_min);
    let m_max = hz_to_mel_htk(f_max);
    let f_pts: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz_htk(m_min + (m_max - m_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (f_pts[m], f_pts[m + 1], f_pts[m + 2]);
            all_freqs
                .iter()
                .map(|&f| {
                    let up = (f - left) / (center - left);
                    let down = (right - f) / (right - center);
                    up.min(down).max(0.0)
                })
                .collect()
        })
        .collect()
}

pub(crate) fn apply_filterbank(frame: &[f32], filterbank: &[Vec<f32>]) -> Vec<f32> {
    filterbank
        .iter()
        .map(|filter| frame.iter().zip(filter).map(|(s, w)| s * w).sum())
        .collect()
}

/// Orthonormal DCT-II basis, `[n_mfcc][n_mels]`
fn dct_ortho(n_mels: usize, n_mfcc: usize) -> Vec<Vec<f32>> {
    let n = n_mels as f32;
    (0..n_mfcc)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_mels)
                .map(|i| scale * (PI / n * (i as f32 + 0.5) * k as f32).cos())
                .collect()
        })
        .collect()
}
