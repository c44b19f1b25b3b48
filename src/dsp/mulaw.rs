//! Mu-law companding
//!
//! Codes use a sign-magnitude layout over `quantization_channels` values:
//! the lower half holds non-negative samples, the upper half negative ones,
//! and the magnitude is quantised on the curve `ln(1 + mu|x|) / ln(1 + mu)`
//! with `mu = quantization_channels - 1`. Zero maps to code 0 and back to
//! exactly 0.0.
//!
//! Encoded buffers carry the integer codes as `f32` samples.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_waveform, Transform};
use crate::engine::{AudioBuffer, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

pub const DEFAULT_QUANTIZATION_CHANNELS: u32 = 256;

fn default_quantization_channels() -> u32 {
    DEFAULT_QUANTIZATION_CHANNELS
}

/// Companding curve parameters shared by the encoder and the expander
#[derive(Debug, Clone, Copy)]
struct Companding {
    mu: f32,
    half: u32,
    levels: f32,
}

impl Companding {
    fn new(transform: &str, quantization_channels: u32) -> Result<Self> {
        if quantization_channels < 4 || quantization_channels % 2 != 0 {
            return Err(AudioPrepError::invalid_parameter(
                transform,
                format!(
                    "quantization_channels must be even and at least 4, got {}",
                    quantization_channels
                ),
            ));
        }
        let half = quantization_channels / 2;
        Ok(Self {
            mu: (quantization_channels - 1) as f32,
            half,
            levels: (half - 1) as f32,
        })
    }

    fn encode(&self, x: f32) -> u32 {
        let magnitude = (self.mu * x.abs()).ln_1p() / self.mu.ln_1p();
        let step = (magnitude * self.levels).round() as u32;
        if x < 0.0 && step > 0 {
            self.half + step
        } else {
            step
        }
    }

    fn decode(&self, code: u32) -> f32 {
        let (sign, step) = if code >= self.half {
            (-1.0, code - self.half)
        } else {
            (1.0, code)
        };
        let magnitude = step as f32 / self.levels;
        sign * ((self.mu.ln_1p() * magnitude).exp() - 1.0) / self.mu
    }
}

// ============================================================================
// MuLawEncoding
// ============================================================================

/// Compress samples in [-1, 1] to mu-law codes
///
/// Samples outside [-1, 1] are rejected; run `Normalize` first when the
/// source is not already in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuLawEncoding {
    #[serde(default = "default_quantization_channels")]
    pub quantization_channels: u32,
}

impl MuLawEncoding {
    pub fn new(quantization_channels: u32) -> Self {
        Self {
            quantization_channels,
        }
    }
}

impl Default for MuLawEncoding {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTIZATION_CHANNELS)
    }
}

impl Transform for MuLawEncoding {
    impl_transform_common!("mu_law_encoding");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let curve = Companding::new(self.name(), self.quantization_channels)?;
        if !buffer.is_normalized() {
            warn!(
                "mu_law_encoding: input spans [{}, {}], normalize first",
                buffer.min(),
                buffer.max()
            );
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "samples must lie in [-1, 1], got [{}, {}]",
                    buffer.min(),
                    buffer.max()
                ),
            ));
        }
        debug!(
            "mu_law_encoding: {:?} with {} channels",
            buffer.shape(),
            self.quantization_channels
        );
        Ok(buffer.map_samples(|s| curve.encode(s) as f32)?.into())
    }
}

// ============================================================================
// MuLawExpanding
// ============================================================================

/// Expand mu-law codes back to samples in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuLawExpanding {
    #[serde(default = "default_quantization_channels")]
    pub quantization_channels: u32,
}

impl MuLawExpanding {
    pub fn new(quantization_channels: u32) -> Self {
        Self {
            quantization_channels,
        }
    }
}

impl Default for MuLawExpanding {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTIZATION_CHANNELS)
    }
}

impl Transform for MuLawExpanding {
    impl_transform_common!("mu_law_expanding");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer: &AudioBuffer = expect_waveform(input, self.name())?;
        let curve = Companding::new(self.name(), self.quantization_channels)?;
        let limit = self.quantization_channels as f32;
        if let Some(bad) = buffer
            .iter_samples()
            .find(|&c| c < 0.0 || c >= limit || c.fract() != 0.0)
        {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "expected integer codes in [0, {}), found {}",
                    self.quantization_channels, bad
                ),
            ));
        }
        Ok(buffer.map_samples(|c| curve.decode(c as u32))?.into())
    }
}
