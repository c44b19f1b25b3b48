//! Sample rate conversion
//!
//! Band-limited sinc interpolation through `rubato`, tuned the way Kaldi's
//! `LinearResample` is: a Hann-windowed sinc whose cutoff sits at 99% of the
//! lower Nyquist frequency, `lowpass_filter_width` zero crossings per side.
//! The output is aligned to the input (filter delay removed) and sized to
//! Kaldi's frame count.
//!
//! Resampling works on one channel at a time. Multi-channel input has to be
//! downmixed or split (`SelectChannel`) first.

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_waveform, Transform};
use crate::engine::{AudioBuffer, Layout, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

/// Zero crossings of the sinc kept on each side of the filter centre
pub const DEFAULT_LOWPASS_FILTER_WIDTH: usize = 6;

/// Cutoff as a fraction of the lower Nyquist frequency
const ROLLOFF: f32 = 0.99;

/// Sub-sample positions of the tabulated sinc
const OVERSAMPLING_FACTOR: usize = 256;

fn default_lowpass_filter_width() -> usize {
    DEFAULT_LOWPASS_FILTER_WIDTH
}

/// Convert a single-channel, channels-first buffer from `source_rate` to `target_rate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resample {
    pub source_rate: u32,
    pub target_rate: u32,
    #[serde(default = "default_lowpass_filter_width")]
    pub lowpass_filter_width: usize,
}

impl Resample {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            source_rate,
            target_rate,
            lowpass_filter_width: DEFAULT_LOWPASS_FILTER_WIDTH,
        }
    }

    fn check(&self, buffer: &AudioBuffer) -> Result<()> {
        if self.source_rate == 0 || self.target_rate == 0 || self.lowpass_filter_width == 0 {
            return Err(AudioPrepError::invalid_parameter(
                self.name(),
                "rates and filter width must be positive",
            ));
        }
        if buffer.layout() != Layout::ChannelsFirst {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                "expected channels-first (CL) input; permute first",
            ));
        }
        if buffer.num_channels() != 1 {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "operates on a single channel, got {}; downmix or select a channel first",
                    buffer.num_channels()
                ),
            ));
        }
        if buffer.sample_rate() != self.source_rate {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "configured for {} Hz input, buffer is {} Hz",
                    self.source_rate,
                    buffer.sample_rate()
                ),
            ));
        }
        Ok(())
    }

    /// Sinc length in input samples covering `lowpass_filter_width` zero
    /// crossings on each side, rounded up to a multiple of 8
    fn sinc_len(&self) -> usize {
        let ratio = self.target_rate as f32 / self.source_rate as f32;
        let cutoff = ROLLOFF * ratio.min(1.0);
        let taps = (2.0 * self.lowpass_filter_width as f32 / cutoff).ceil() as usize;
        taps.div_ceil(8).max(1) * 8
    }

    fn interpolation_parameters(&self) -> SincInterpolationParameters {
        SincInterpolationParameters {
            sinc_len: self.sinc_len(),
            f_cutoff: ROLLOFF,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: OVERSAMPLING_FACTOR,
            window: WindowFunction::Hann,
        }
    }

    /// Run the whole channel through one `SincFixedIn` chunk, flush the
    /// filter tail with zeros, then drop the filter delay
    fn resample_channel(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let expected = output_frame_count(samples.len(), self.source_rate, self.target_rate);
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let ratio = self.target_rate as f64 / self.source_rate as f64;
        let mut resampler = SincFixedIn::<f32>::new(
            ratio,
            1.0,
            self.interpolation_parameters(),
            samples.len(),
            1,
        )
        .map_err(|e| AudioPrepError::invalid_parameter(self.name(), e.to_string()))?;

        let delay = resampler.output_delay();
        let needed = delay + expected;

        let mut output = resampler
            .process(&[samples], None)
            .map_err(|e| AudioPrepError::invalid_parameter(self.name(), e.to_string()))?
            .swap_remove(0);

        while output.len() < needed {
            let tail = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| AudioPrepError::invalid_parameter(self.name(), e.to_string()))?;
            let tail = tail.into_iter().next().unwrap_or_default();
            if tail.is_empty() {
                break;
            }
            output.extend(tail);
        }

        let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
        aligned.resize(expected, 0.0);
        Ok(aligned)
    }
}

impl Transform for Resample {
    impl_transform_common!("resample");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        self.check(buffer)?;

        if self.source_rate == self.target_rate {
            return Ok(buffer.clone().into());
        }

        let samples = buffer.channel(0).unwrap_or_default();
        let output = self.resample_channel(samples)?;
        debug!(
            "resample: {} Hz -> {} Hz, {} -> {} frames (sinc_len {})",
            self.source_rate,
            self.target_rate,
            samples.len(),
            output.len(),
            self.sinc_len()
        );

        Ok(AudioBuffer::from_channels(vec![output], self.target_rate)?.into())
    }
}

/// Number of output frames for `input_frames` at the given rates
///
/// Every output sample whose time lies strictly inside the input interval is
/// produced, which works out to `ceil(input_frames * target / source)`.
pub fn output_frame_count(input_frames: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    (input_frames as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize
}
