//! Amplitude and length transforms: Scale, PadTrim, Normalize

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_waveform, Transform};
use crate::engine::{AudioBuffer, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

/// Full scale of a 32-bit integer sample
pub const INT32_FULL_SCALE: f32 = 2_147_483_648.0;

// ============================================================================
// Scale
// ============================================================================

/// Divide every sample by `factor`
///
/// The default factor maps 32-bit integer samples stored as floats onto
/// [-1, 1]. `Scale::new(k)` followed by `Scale::new(k).inverse()` is the
/// identity up to float rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scale {
    pub factor: f32,
}

impl Scale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    /// Scale that undoes this one
    pub fn inverse(&self) -> Self {
        Self {
            factor: 1.0 / self.factor,
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::new(INT32_FULL_SCALE)
    }
}

impl Transform for Scale {
    impl_transform_common!("scale");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        if !self.factor.is_finite() || self.factor == 0.0 {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                format!("factor must be finite and non-zero, got {}", self.factor),
            ));
        }
        let factor = self.factor;
        Ok(buffer.map_samples(|s| s / factor)?.into())
    }
}

// ============================================================================
// PadTrim
// ============================================================================

/// Pad with `fill_value` or truncate the frame axis to exactly `max_len` frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PadTrim {
    pub max_len: usize,
    #[serde(default)]
    pub fill_value: f32,
}

impl PadTrim {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            fill_value: 0.0,
        }
    }

    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }
}

impl Transform for PadTrim {
    impl_transform_common!("pad_trim");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        debug!(
            "pad_trim: {} -> {} frames",
            buffer.num_frames(),
            self.max_len
        );
        let samples = buffer
            .channels()
            .iter()
            .map(|channel| {
                let mut out: Vec<f32> = channel.iter().copied().take(self.max_len).collect();
                out.resize(self.max_len, self.fill_value);
                out
            })
            .collect();
        Ok(AudioBuffer::with_layout(samples, buffer.sample_rate(), buffer.layout())?.into())
    }
}

// ============================================================================
// Normalize
// ============================================================================

/// Remove the mean, then scale so the largest deviation is exactly 1
///
/// A constant buffer becomes all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Normalize;

impl Transform for Normalize {
    impl_transform_common!("normalize");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let mean = buffer.mean();
        let max_dev = buffer
            .iter_samples()
            .map(|s| (s - mean).abs())
            .fold(0.0_f32, f32::max);
        debug!("normalize: mean {:.6}, max deviation {:.6}", mean, max_dev);

        if max_dev == 0.0 {
            return Ok(buffer.map_samples(|_| 0.0)?.into());
        }
        Ok(buffer.map_samples(|s| (s - mean) / max_dev)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Layout;
    use approx::assert_abs_diff_eq;

    fn waveform(signal: Signal) -> AudioBuffer {
        signal.into_waveform().unwrap()
    }

    #[test]
    fn test_scale_and_inverse_is_identity() {
        let buffer = AudioBuffer::stereo_sine_wave(440.0, 660.0, 0.05, 16000).unwrap();
        for k in [2.0_f32, 0.3, 32768.0, -7.5] {
            let scale = Scale::new(k);
            let scaled = scale.apply_buffer(&buffer).unwrap();
            let restored = waveform(scale.inverse().apply(&scaled).unwrap());
            for (a, b) in buffer.iter_samples().zip(restored.iter_samples()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_default_scale_maps_int32_range() {
        let buffer = AudioBuffer::from_channels(vec![vec![INT32_FULL_SCALE, -1073741824.0]], 8000).unwrap();
        let out = waveform(Scale::default().apply_buffer(&buffer).unwrap());
        assert_eq!(out.channel(0).unwrap(), &[1.0, -0.5]);
    }

    #[test]
    fn test_scale_rejects_zero_factor() {
        let buffer = AudioBuffer::silence(1, 4, 8000).unwrap();
        let err = Scale::new(0.0).apply_buffer(&buffer).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_pad_trim_pads_and_trims() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 8000).unwrap();

        let padded = waveform(PadTrim::new(5).with_fill_value(-1.0).apply_buffer(&buffer).unwrap());
        assert_eq!(padded.channel(0).unwrap(), &[1.0, 2.0, 3.0, -1.0, -1.0]);
        assert_eq!(padded.channel(1).unwrap(), &[4.0, 5.0, 6.0, -1.0, -1.0]);

        let trimmed = waveform(PadTrim::new(2).apply_buffer(&buffer).unwrap());
        assert_eq!(trimmed.channel(1).unwrap(), &[4.0, 5.0]);
    }

    #[test]
    fn test_pad_trim_keeps_layout() {
        let buffer = AudioBuffer::silence(2, 3, 8000)
            .unwrap()
            .relabeled(Layout::FramesFirst);
        let out = waveform(PadTrim::new(10).apply_buffer(&buffer).unwrap());
        assert_eq!(out.shape(), (10, 2));
    }

    #[test]
    fn test_normalize_range() {
        let buffer = AudioBuffer::from_channels(vec![vec![2.0, 4.0, 6.0, 8.0]], 8000).unwrap();
        let out = waveform(Normalize.apply_buffer(&buffer).unwrap());
        assert_abs_diff_eq!(out.mean(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.max(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.min(), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_constant_buffer() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.5; 8]], 8000).unwrap();
        let out = waveform(Normalize.apply_buffer(&buffer).unwrap());
        assert!(out.iter_samples().all(|s| s == 0.0));
    }

    #[test]
    fn test_rejects_feature_input() {
        use crate::engine::{FeatureKind, FeatureMap, FrequencyAxis};
        let map = FeatureMap::new(vec![vec![vec![1.0]]], 8000, FeatureKind::Power, FrequencyAxis::Linear).unwrap();
        let err = Scale::default().apply(&Signal::Features(map)).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_MISMATCH");
    }
}
