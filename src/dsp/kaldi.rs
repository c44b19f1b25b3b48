//! Kaldi-compatible feature extraction
//!
//! `KaldiSpectrogram` and `KaldiFbank` reproduce Kaldi's `compute-spectrogram-feats`
//! and `compute-fbank-feats` framing on one channel of a waveform: snip-edges
//! framing, raw log energy, pre-emphasis 0.97 and an energy floor of zero.
//!
//! Every framing option is required. There are no hidden defaults, so a
//! config states exactly what it computes.

use std::f64::consts::PI;

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_waveform, Transform};
use crate::engine::{AudioBuffer, FeatureKind, FeatureMap, FrequencyAxis, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

const PREEMPHASIS_COEFFICIENT: f32 = 0.97;
const BLACKMAN_COEFFICIENT: f64 = 0.42;
const EPSILON: f32 = f32::EPSILON;

/// Seed for the dither noise generator, fixed so runs are reproducible
const DITHER_SEED: u64 = 0x6b61_6c64;

/// Frame sizes derived from milliseconds within this slack round up, so
/// lengths such as `400 / rate * 1000` ms land on 400 samples.
const FRAME_SIZE_SLACK: f64 = 1e-4;

// ============================================================================
// Options
// ============================================================================

/// Analysis window applied to each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hamming,
    Hanning,
    Povey,
    Rectangular,
    Blackman,
}

impl WindowType {
    /// Symmetric window of `size` samples
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        let a = 2.0 * PI / (size.max(2) - 1) as f64;
        (0..size)
            .map(|n| {
                let n = n as f64;
                let hann = 0.5 - 0.5 * (a * n).cos();
                let w = match self {
                    WindowType::Hanning => hann,
                    WindowType::Hamming => 0.54 - 0.46 * (a * n).cos(),
                    WindowType::Povey => hann.powf(0.85),
                    WindowType::Rectangular => 1.0,
                    WindowType::Blackman => {
                        BLACKMAN_COEFFICIENT - 0.5 * (a * n).cos()
                            + (0.5 - BLACKMAN_COEFFICIENT) * (2.0 * a * n).cos()
                    }
                };
                w as f32
            })
            .collect()
    }
}

/// Framing options shared by the Kaldi transforms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KaldiOptions {
    /// Channel of the input buffer to analyse
    pub channel: usize,
    /// Standard deviation of the Gaussian dither added to each frame (0 disables)
    pub dither: f32,
    pub window_type: WindowType,
    pub frame_length_ms: f32,
    pub frame_shift_ms: f32,
    /// Subtract each frame's mean before analysis
    pub remove_dc_offset: bool,
    /// Zero-pad frames to the next power of two before the FFT
    pub round_to_power_of_two: bool,
    /// Must equal the input buffer's sample rate
    pub sample_frequency: f32,
}

/// Frame geometry in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub window_size: usize,
    pub window_shift: usize,
    pub padded_size: usize,
}

impl Framing {
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.window_size {
            0
        } else {
            1 + (num_samples - self.window_size) / self.window_shift
        }
    }
}

fn ms_to_samples(sample_frequency: f32, ms: f32) -> usize {
    let exact = sample_frequency as f64 * ms as f64 * 0.001;
    let rounded = exact.round();
    if (exact - rounded).abs() < FRAME_SIZE_SLACK {
        rounded as usize
    } else {
        exact.trunc() as usize
    }
}

impl KaldiOptions {
    /// Window and shift sizes, rejecting options that cannot frame anything
    pub fn framing(&self, transform: &str) -> Result<Framing> {
        let finite_positive = |v: f32| v.is_finite() && v > 0.0;
        if !finite_positive(self.sample_frequency)
            || !finite_positive(self.frame_length_ms)
            || !finite_positive(self.frame_shift_ms)
            || !(self.dither >= 0.0)
        {
            return Err(AudioPrepError::invalid_parameter(
                transform,
                "sample_frequency, frame_length_ms and frame_shift_ms must be positive; dither non-negative",
            ));
        }

        let window_size = ms_to_samples(self.sample_frequency, self.frame_length_ms);
        let window_shift = ms_to_samples(self.sample_frequency, self.frame_shift_ms);
        if window_size < 2 || window_shift == 0 {
            return Err(AudioPrepError::invalid_parameter(
                transform,
                format!(
                    "frame of {} samples with shift {} is too small",
                    window_size, window_shift
                ),
            ));
        }
        let padded_size = if self.round_to_power_of_two {
            window_size.next_power_of_two()
        } else {
            window_size
        };
        Ok(Framing {
            window_size,
            window_shift,
            padded_size,
        })
    }

    /// Check the buffer against these options and pull out the analysed channel
    fn select<'a>(&self, transform: &str, buffer: &'a AudioBuffer) -> Result<&'a [f32]> {
        if self.sample_frequency != buffer.sample_rate() as f32 {
            return Err(AudioPrepError::config_mismatch(
                transform,
                format!(
                    "sample_frequency is {} Hz, buffer is {} Hz",
                    self.sample_frequency,
                    buffer.sample_rate()
                ),
            ));
        }
        buffer.channel(self.channel).ok_or_else(|| {
            AudioPrepError::config_mismatch(
                transform,
                format!(
                    "channel {} requested from a {}-channel buffer",
                    self.channel,
                    buffer.num_channels()
                ),
            )
        })
    }
}

/// Windowed frames ready for the FFT, with each frame's raw log energy
struct Frames {
    frames: Vec<Vec<f32>>,
    log_energy: Vec<f32>,
    framing: Framing,
}

fn extract_frames(options: &KaldiOptions, transform: &str, buffer: &AudioBuffer) -> Result<Frames> {
    let framing = options.framing(transform)?;
    let samples = options.select(transform, buffer)?;
    if framing.window_size > samples.len() {
        return Err(AudioPrepError::config_mismatch(
            transform,
            format!(
                "frame of {} samples is longer than the {}-sample signal",
                framing.window_size,
                samples.len()
            ),
        ));
    }

    let window = options.window_type.coefficients(framing.window_size);
    let mut rng = StdRng::seed_from_u64(DITHER_SEED);
    let num_frames = framing.num_frames(samples.len());
    let mut frames = Vec::with_capacity(num_frames);
    let mut log_energy = Vec::with_capacity(num_frames);

    for i in 0..num_frames {
        let start = i * framing.window_shift;
        let mut frame = samples[start..start + framing.window_size].to_vec();

        if options.dither > 0.0 {
            for s in frame.iter_mut() {
                *s += options.dither * gaussian(&mut rng);
            }
        }
        if options.remove_dc_offset {
            let mean = frame.iter().sum::<f32>() / frame.len() as f32;
            frame.iter_mut().for_each(|s| *s -= mean);
        }

        let energy: f32 = frame.iter().map(|s| s * s).sum();
        log_energy.push(energy.max(EPSILON).ln());

        for j in (1..frame.len()).rev() {
            frame[j] -= PREEMPHASIS_COEFFICIENT * frame[j - 1];
        }
        frame[0] -= PREEMPHASIS_COEFFICIENT * frame[0];

        for (s, w) in frame.iter_mut().zip(&window) {
            *s *= w;
        }
        frame.resize(framing.padded_size, 0.0);
        frames.push(frame);
    }

    debug!(
        "{}: {} frames of {} samples (shift {}, fft {})",
        transform, num_frames, framing.window_size, framing.window_shift, framing.padded_size
    );
    Ok(Frames {
        frames,
        log_energy,
        framing,
    })
}

/// Standard normal sample (Box-Muller)
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// `|FFT|^2` of each frame, non-negative bins only
fn power_spectrum(frames: &[Vec<f32>], padded_size: usize) -> Vec<Vec<f32>> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(padded_size);
    frames
        .iter()
        .map(|frame| {
            let mut buffer: Vec<Complex<f32>> =
                frame.iter().map(|&s| Complex::new(s, 0.0)).collect();
            fft.process(&mut buffer);
            buffer[..padded_size / 2 + 1]
                .iter()
                .map(|c| c.norm_sqr())
                .collect()
        })
        .collect()
}

// ============================================================================
// KaldiSpectrogram
// ============================================================================

/// Log power spectrum per frame; bin 0 holds the frame's raw log energy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KaldiSpectrogram {
    pub options: KaldiOptions,
}

impl KaldiSpectrogram {
    pub fn new(options: KaldiOptions) -> Self {
        Self { options }
    }
}

impl Transform for KaldiSpectrogram {
    impl_transform_common!("kaldi_spectrogram");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let Frames {
            frames,
            log_energy,
            framing,
        } = extract_frames(&self.options, self.name(), buffer)?;

        let data: Vec<Vec<f32>> = power_spectrum(&frames, framing.padded_size)
            .into_iter()
            .zip(log_energy)
            .map(|(bins, energy)| {
                let mut out: Vec<f32> = bins.into_iter().map(|p| p.max(EPSILON).ln()).collect();
                out[0] = energy;
                out
            })
            .collect();

        Ok(FeatureMap::new(
            vec![data],
            buffer.sample_rate(),
            FeatureKind::LogPower,
            FrequencyAxis::Linear,
        )?
        .into())
    }
}

// ============================================================================
// KaldiFbank
// ============================================================================

/// Mel filterbank settings for `KaldiFbank`
///
/// `high_freq <= 0` is an offset from Nyquist, so the default 0 means Nyquist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelBanksOptions {
    pub num_mel_bins: usize,
    pub low_freq: f32,
    pub high_freq: f32,
    /// Prepend the frame's log energy as an extra column
    pub use_energy: bool,
}

impl Default for MelBanksOptions {
    fn default() -> Self {
        Self {
            num_mel_bins: 23,
            low_freq: 20.0,
            high_freq: 0.0,
            use_energy: false,
        }
    }
}

/// Log mel filterbank energies per frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KaldiFbank {
    pub options: KaldiOptions,
    #[serde(default)]
    pub mel_banks: MelBanksOptions,
}

impl KaldiFbank {
    pub fn new(options: KaldiOptions) -> Self {
        Self {
            options,
            mel_banks: MelBanksOptions::default(),
        }
    }

    pub fn with_mel_banks(mut self, mel_banks: MelBanksOptions) -> Self {
        self.mel_banks = mel_banks;
        self
    }
}

impl Transform for KaldiFbank {
    impl_transform_common!("kaldi_fbank");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let Frames {
            frames,
            log_energy,
            framing,
        } = extract_frames(&self.options, self.name(), buffer)?;
        let banks = kaldi_mel_banks(
            self.name(),
            &self.mel_banks,
            framing.padded_size,
            self.options.sample_frequency,
        )?;

        let data: Vec<Vec<f32>> = power_spectrum(&frames, framing.padded_size)
            .iter()
            .zip(log_energy)
            .map(|(spectrum, energy)| {
                let mut out = Vec::with_capacity(banks.len() + 1);
                if self.mel_banks.use_energy {
                    out.push(energy);
                }
                out.extend(banks.iter().map(|bank| {
                    let e: f32 = bank.iter().zip(spectrum).map(|(w, p)| w * p).sum();
                    e.max(EPSILON).ln()
                }));
                out
            })
            .collect();

        Ok(FeatureMap::new(
            vec![data],
            buffer.sample_rate(),
            FeatureKind::LogPower,
            FrequencyAxis::Mel,
        )?
        .into())
    }
}

fn kaldi_mel(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

/// Kaldi triangular mel banks, `[num_mel_bins][padded_size / 2 + 1]`
///
/// Triangles are built in the mel domain over the first `padded_size / 2`
/// FFT bins; the Nyquist bin always gets weight 0.
fn kaldi_mel_banks(
    transform: &str,
    options: &MelBanksOptions,
    padded_size: usize,
    sample_frequency: f32,
) -> Result<Vec<Vec<f32>>> {
    let nyquist = 0.5 * sample_frequency as f64;
    let low = options.low_freq as f64;
    let high = if options.high_freq <= 0.0 {
        nyquist + options.high_freq as f64
    } else {
        options.high_freq as f64
    };
    if options.num_mel_bins < 3 || low < 0.0 || low >= nyquist || high <= 0.0 || high > nyquist || low >= high {
        return Err(AudioPrepError::invalid_parameter(
            transform,
            format!(
                "need at least 3 mel bins and 0 <= low_freq ({}) < high_freq ({}) <= nyquist ({})",
                low, high, nyquist
            ),
        ));
    }

    let num_fft_bins = padded_size / 2;
    let bin_width = sample_frequency as f64 / padded_size as f64;
    let mel_low = kaldi_mel(low);
    let mel_high = kaldi_mel(high);
    let delta = (mel_high - mel_low) / (options.num_mel_bins + 1) as f64;

    Ok((0..options.num_mel_bins)
        .map(|m| {
            let left = mel_low + m as f64 * delta;
            let center = left + delta;
            let right = center + delta;
            let mut bank: Vec<f32> = (0..num_fft_bins)
                .map(|k| {
                    let mel = kaldi_mel(bin_width * k as f64);
                    let up = (mel - left) / (center - left);
                    let down = (right - mel) / (right - center);
                    up.min(down).max(0.0) as f32
                })
                .collect();
            bank.push(0.0);
            bank
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn options(round: bool) -> KaldiOptions {
        KaldiOptions {
            channel: 0,
            dither: 0.0,
            window_type: WindowType::Hamming,
            frame_length_ms: 25.0,
            frame_shift_ms: 10.0,
            remove_dc_offset: false,
            round_to_power_of_two: round,
            sample_frequency: 16000.0,
        }
    }

    fn features(signal: Signal) -> FeatureMap {
        signal.into_features().unwrap()
    }

    #[test]
    fn test_framing() {
        let framing = options(true).framing("test").unwrap();
        assert_eq!(
            framing,
            Framing {
                window_size: 400,
                window_shift: 160,
                padded_size: 512
            }
        );
        assert_eq!(framing.num_frames(16000), 98);
        assert_eq!(framing.num_frames(400), 1);
        assert_eq!(framing.num_frames(399), 0);

        let unrounded = options(false).framing("test").unwrap();
        assert_eq!(unrounded.padded_size, 400);
    }

    #[test]
    fn test_frame_length_from_sample_count() {
        let opts = KaldiOptions {
            sample_frequency: 44100.0,
            frame_length_ms: 400.0 / 44100.0 * 1000.0,
            frame_shift_ms: 200.0 / 44100.0 * 1000.0,
            ..options(false)
        };
        let framing = opts.framing("test").unwrap();
        assert_eq!(framing.window_size, 400);
        assert_eq!(framing.window_shift, 200);
    }

    #[test]
    fn test_windows() {
        let hann = WindowType::Hanning.coefficients(5);
        assert_abs_diff_eq!(hann[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hann[2], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hann[4], 0.0, epsilon = 1e-6);

        let hamming = WindowType::Hamming.coefficients(5);
        assert_abs_diff_eq!(hamming[0], 0.08, epsilon = 1e-6);

        let povey = WindowType::Povey.coefficients(5);
        assert_abs_diff_eq!(povey[1], 0.5_f32.powf(0.85), epsilon = 1e-6);

        let blackman = WindowType::Blackman.coefficients(5);
        assert_abs_diff_eq!(blackman[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(blackman[2], 1.0, epsilon = 1e-6);

        assert!(WindowType::Rectangular.coefficients(7).iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_spectrogram_shape_and_peak() {
        let tone = AudioBuffer::sine_wave(1000.0, 1.0, 16000).unwrap();
        let spec = features(KaldiSpectrogram::new(options(true)).apply_buffer(&tone).unwrap());
        assert_eq!(spec.shape(), (1, 98, 257));
        assert_eq!(spec.kind(), FeatureKind::LogPower);

        // 16000 / 512 = 31.25 Hz per bin
        let frame = &spec.channel(0).unwrap()[40];
        let peak = frame[1..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i + 1)
            .unwrap();
        assert_eq!(peak, 32);
    }

    #[test]
    fn test_spectrogram_bin_zero_is_log_energy() {
        let tone = AudioBuffer::sine_wave(440.0, 0.1, 16000).unwrap();
        let spec = features(KaldiSpectrogram::new(options(false)).apply_buffer(&tone).unwrap());
        let raw = &tone.channel(0).unwrap()[160..560];
        let energy: f32 = raw.iter().map(|s| s * s).sum();
        assert_abs_diff_eq!(spec.channel(0).unwrap()[1][0], energy.ln(), epsilon = 1e-3);
    }

    #[test]
    fn test_silence_floors_at_epsilon() {
        let silence = AudioBuffer::silence(1, 4000, 16000).unwrap();
        let spec = features(KaldiSpectrogram::new(options(true)).apply_buffer(&silence).unwrap());
        let floor = EPSILON.ln();
        assert!(spec.data()[0].iter().flatten().all(|&v| v == floor));

        let fbank = features(KaldiFbank::new(options(true)).apply_buffer(&silence).unwrap());
        assert!(fbank.data()[0].iter().flatten().all(|&v| v == floor));
    }

    #[test]
    fn test_dither_is_deterministic() {
        let tone = AudioBuffer::sine_wave(300.0, 0.2, 16000).unwrap();
        let dithered = KaldiSpectrogram::new(KaldiOptions {
            dither: 1.0,
            ..options(true)
        });
        let a = dithered.apply_buffer(&tone).unwrap();
        let b = dithered.apply_buffer(&tone).unwrap();
        assert_eq!(a.as_features(), b.as_features());

        let clean = KaldiSpectrogram::new(options(true)).apply_buffer(&tone).unwrap();
        assert_ne!(a.as_features(), clean.as_features());
    }

    #[test]
    fn test_fbank_shape() {
        let tone = AudioBuffer::sine_wave(1000.0, 1.0, 16000).unwrap();
        let fbank = features(KaldiFbank::new(options(true)).apply_buffer(&tone).unwrap());
        assert_eq!(fbank.shape(), (1, 98, 23));
        assert_eq!(fbank.axis(), FrequencyAxis::Mel);

        let with_energy = KaldiFbank::new(options(true)).with_mel_banks(MelBanksOptions {
            num_mel_bins: 40,
            use_energy: true,
            ..MelBanksOptions::default()
        });
        let out = features(with_energy.apply_buffer(&tone).unwrap());
        assert_eq!(out.shape(), (1, 98, 41));
    }

    #[test]
    fn test_mel_banks_cover_range() {
        let banks = kaldi_mel_banks("test", &MelBanksOptions::default(), 512, 16000.0).unwrap();
        assert_eq!(banks.len(), 23);
        assert!(banks.iter().all(|b| b.len() == 257 && b[256] == 0.0));
        // Below low_freq nothing is picked up
        assert!(banks.iter().all(|b| b[0] == 0.0));
        assert!(banks.iter().all(|b| b.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn test_rejections() {
        let tone = AudioBuffer::sine_wave(440.0, 0.1, 16000).unwrap();

        let wrong_rate = KaldiOptions {
            sample_frequency: 8000.0,
            ..options(true)
        };
        let err = KaldiSpectrogram::new(wrong_rate).apply_buffer(&tone).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_MISMATCH");

        let wrong_channel = KaldiOptions {
            channel: 1,
            ..options(true)
        };
        let err = KaldiFbank::new(wrong_channel).apply_buffer(&tone).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_MISMATCH");

        let too_long = KaldiOptions {
            frame_length_ms: 200.0,
            ..options(true)
        };
        let err = KaldiSpectrogram::new(too_long).apply_buffer(&tone).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_MISMATCH");

        // Rejected from the frame check, before any filterbank is built
        let huge_frame = KaldiOptions {
            frame_length_ms: 1_000_000.0,
            ..options(true)
        };
        let err = KaldiFbank::new(huge_frame).apply_buffer(&tone).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_MISMATCH");

        let too_short = KaldiOptions {
            frame_length_ms: 0.1,
            ..options(true)
        };
        let err = KaldiSpectrogram::new(too_short).apply_buffer(&tone).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        let bad_banks = KaldiFbank::new(options(true)).with_mel_banks(MelBanksOptions {
            low_freq: 9000.0,
            ..MelBanksOptions::default()
        });
        assert_eq!(
            bad_banks.apply_buffer(&tone).unwrap_err().error_code(),
            "INVALID_PARAMETER"
        );
    }

    // === Hand-computed values on an 8-sample signal at 1 kHz ===

    const RAMP: [f32; 8] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    const WIGGLE: [f32; 8] = [0.5, -1.0, 0.25, 2.0, -0.75, 1.5, 0.0, -0.5];

    fn tiny_options(window_type: WindowType, frame_samples: usize, round: bool) -> KaldiOptions {
        KaldiOptions {
            channel: 0,
            dither: 0.0,
            window_type,
            frame_length_ms: frame_samples as f32,
            frame_shift_ms: 2.0,
            remove_dc_offset: false,
            round_to_power_of_two: round,
            sample_frequency: 1000.0,
        }
    }

    fn tiny_buffer(samples: &[f32]) -> AudioBuffer {
        AudioBuffer::from_channels(vec![samples.to_vec()], 1000).unwrap()
    }

    /// Per frame: raw energy and `|DFT|^2` of the preemphasized, windowed,
    /// zero-padded frame, by direct summation
    fn reference_frames(
        samples: &[f32],
        size: usize,
        padded: usize,
        hann: bool,
    ) -> Vec<(f64, Vec<f64>)> {
        let num_frames = 1 + (samples.len() - size) / 2;
        (0..num_frames)
            .map(|f| {
                let raw: Vec<f64> = samples[2 * f..2 * f + size].iter().map(|&s| s as f64).collect();
                let energy: f64 = raw.iter().map(|s| s * s).sum();
                let mut x: Vec<f64> = (0..size)
                    .map(|n| {
                        let previous = if n == 0 { raw[0] } else { raw[n - 1] };
                        let w = if hann {
                            0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / (size - 1) as f64).cos()
                        } else {
                            1.0
                        };
                        (raw[n] - 0.97 * previous) * w
                    })
                    .collect();
                x.resize(padded, 0.0);
                let power = (0..=padded / 2)
                    .map(|k| {
                        let (mut re, mut im) = (0.0, 0.0);
                        for (n, v) in x.iter().enumerate() {
                            let phase = -2.0 * std::f64::consts::PI * (k * n) as f64 / padded as f64;
                            re += v * phase.cos();
                            im += v * phase.sin();
                        }
                        re * re + im * im
                    })
                    .collect();
                (energy, power)
            })
            .collect()
    }

    fn reference_spectrogram(samples: &[f32], size: usize, padded: usize, hann: bool) -> Vec<Vec<f32>> {
        reference_frames(samples, size, padded, hann)
            .into_iter()
            .map(|(energy, power)| {
                let mut row: Vec<f32> = power.iter().map(|&p| (p as f32).max(EPSILON).ln()).collect();
                row[0] = (energy as f32).ln();
                row
            })
            .collect()
    }

    fn assert_rows_close(actual: &[Vec<f32>], expected: &[Vec<f32>]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_eq!(a.len(), e.len());
            for (x, y) in a.iter().zip(e) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_spectrogram_rectangular_ramp_values() {
        // Preemphasized ramp frames differ only in the first sample, so every
        // frame has |X1|^2 = 1.03^2 + 0.06^2 and |X2|^2 = 1.03^2
        let expected = vec![
            vec![30.0_f32.ln(), 1.0645_f32.ln(), 1.0609_f32.ln()],
            vec![86.0_f32.ln(), 1.0645_f32.ln(), 1.0609_f32.ln()],
            vec![174.0_f32.ln(), 1.0645_f32.ln(), 1.0609_f32.ln()],
        ];
        for round in [false, true] {
            let spec = features(
                KaldiSpectrogram::new(tiny_options(WindowType::Rectangular, 4, round))
                    .apply_buffer(&tiny_buffer(&RAMP))
                    .unwrap(),
            );
            assert_eq!(spec.shape(), (1, 3, 3));
            assert_rows_close(spec.channel(0).unwrap(), &expected);
        }
    }

    #[test]
    fn test_spectrogram_hanning_ramp_values() {
        // A 3-point symmetric Hann window is [0, 1, 0]: only the preemphasized
        // middle sample a survives and every bin is a^2
        let a2 = [1.0609_f32, 1.1881, 1.3225];
        let energy = [14.0_f32, 50.0, 110.0];

        let unpadded = features(
            KaldiSpectrogram::new(tiny_options(WindowType::Hanning, 3, false))
                .apply_buffer(&tiny_buffer(&RAMP))
                .unwrap(),
        );
        let expected: Vec<Vec<f32>> = (0..3).map(|f| vec![energy[f].ln(), a2[f].ln()]).collect();
        assert_rows_close(unpadded.channel(0).unwrap(), &expected);

        let padded = features(
            KaldiSpectrogram::new(tiny_options(WindowType::Hanning, 3, true))
                .apply_buffer(&tiny_buffer(&RAMP))
                .unwrap(),
        );
        let expected: Vec<Vec<f32>> = (0..3)
            .map(|f| vec![energy[f].ln(), a2[f].ln(), a2[f].ln()])
            .collect();
        assert_rows_close(padded.channel(0).unwrap(), &expected);
    }

    #[test]
    fn test_spectrogram_matches_direct_dft() {
        let buffer = tiny_buffer(&WIGGLE);
        for (window_type, hann) in [(WindowType::Rectangular, false), (WindowType::Hanning, true)] {
            for (size, round, padded) in [(4, false, 4), (4, true, 4), (3, false, 3), (3, true, 4)] {
                let spec = features(
                    KaldiSpectrogram::new(tiny_options(window_type, size, round))
                        .apply_buffer(&buffer)
                        .unwrap(),
                );
                let expected = reference_spectrogram(&WIGGLE, size, padded, hann);
                assert_rows_close(spec.channel(0).unwrap(), &expected);
            }
        }
    }

    fn tiny_mel_banks() -> MelBanksOptions {
        MelBanksOptions {
            num_mel_bins: 3,
            low_freq: 20.0,
            high_freq: 0.0,
            use_energy: false,
        }
    }

    /// Triangle weights on a 1127 ln(1 + f/700) mel axis between 20 Hz and
    /// 500 Hz, with the Nyquist bin left out
    fn reference_weights(padded: usize) -> Vec<Vec<f64>> {
        let mel = |f: f64| 1127.0 * (1.0 + f / 700.0).ln();
        let (low, high) = (mel(20.0), mel(500.0));
        let delta = (high - low) / 4.0;
        (0..3)
            .map(|m| {
                let left = low + m as f64 * delta;
                let (center, right) = (left + delta, left + 2.0 * delta);
                (0..=padded / 2)
                    .map(|k| {
                        if k == padded / 2 {
                            return 0.0;
                        }
                        let x = mel(1000.0 * k as f64 / padded as f64);
                        if x > left && x <= center {
                            (x - left) / delta
                        } else if x > center && x < right {
                            (right - x) / delta
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_fbank_hanning_ramp_values() {
        // Every power bin is a^2; only the 250 Hz bin falls inside a triangle,
        // split 0.8293 / 0.1707 between the upper two banks
        let fbank = features(
            KaldiFbank::new(tiny_options(WindowType::Hanning, 3, true))
                .with_mel_banks(tiny_mel_banks())
                .apply_buffer(&tiny_buffer(&RAMP))
                .unwrap(),
        );
        assert_eq!(fbank.shape(), (1, 3, 3));
        let a2 = [1.0609_f32, 1.1881, 1.3225];
        let expected: Vec<Vec<f32>> = a2
            .iter()
            .map(|&p| vec![EPSILON.ln(), (p * 0.829_312).ln(), (p * 0.170_688).ln()])
            .collect();
        assert_rows_close(fbank.channel(0).unwrap(), &expected);
    }

    #[test]
    fn test_fbank_matches_direct_dft() {
        let buffer = tiny_buffer(&WIGGLE);
        for (window_type, hann) in [(WindowType::Rectangular, false), (WindowType::Hanning, true)] {
            for (size, round, padded) in [(4, false, 4), (4, true, 4), (3, true, 4)] {
                let fbank = features(
                    KaldiFbank::new(tiny_options(window_type, size, round))
                        .with_mel_banks(MelBanksOptions {
                            use_energy: true,
                            ..tiny_mel_banks()
                        })
                        .apply_buffer(&buffer)
                        .unwrap(),
                );
                let weights = reference_weights(padded);
                let expected: Vec<Vec<f32>> = reference_frames(&WIGGLE, size, padded, hann)
                    .into_iter()
                    .map(|(energy, power)| {
                        let mut row = vec![(energy as f32).ln()];
                        row.extend(weights.iter().map(|bank| {
                            let e: f64 = bank.iter().zip(&power).map(|(w, p)| w * p).sum();
                            (e as f32).max(EPSILON).ln()
                        }));
                        row
                    })
                    .collect();
                assert_rows_close(fbank.channel(0).unwrap(), &expected);
            }
        }
    }

    #[test]
    fn test_options_require_every_field() {
        let json = r#"{"channel": 0, "dither": 0.0, "window_type": "povey"}"#;
        assert!(serde_json::from_str::<KaldiOptions>(json).is_err());

        let full = serde_json::to_string(&options(true)).unwrap();
        let parsed: KaldiOptions = serde_json::from_str(&full).unwrap();
        assert_eq!(parsed, options(true));
    }
}
