//! Audio Buffer
//!
//! Immutable waveform value shared by every transform. Samples are stored
//! channel-major (one `Vec<f32>` per channel) regardless of the logical
//! orientation; the [`Layout`] tag records which orientation callers see.

use serde::{Deserialize, Serialize};

use crate::error::{AudioPrepError, Result};

// ============================================================================
// Layout
// ============================================================================

/// Logical orientation of a waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Channels × frames ("CL"), as produced by [`crate::engine::load`]
    #[default]
    ChannelsFirst,
    /// Frames × channels ("LC")
    FramesFirst,
}

impl Layout {
    /// The opposite orientation
    pub fn transposed(self) -> Self {
        match self {
            Layout::ChannelsFirst => Layout::FramesFirst,
            Layout::FramesFirst => Layout::ChannelsFirst,
        }
    }

    /// Short label used in logs and reports
    pub fn label(self) -> &'static str {
        match self {
            Layout::ChannelsFirst => "CL",
            Layout::FramesFirst => "LC",
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Rectangular multi-channel waveform
///
/// # Invariants
/// - at least one channel
/// - every channel holds the same number of frames
/// - every sample is finite
/// - sample rate is non-zero
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<Vec<f32>>,
    sample_rate: u32,
    layout: Layout,
}

impl AudioBuffer {
    /// Create a channels-first buffer from per-channel sample vectors
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        Self::with_layout(samples, sample_rate, Layout::ChannelsFirst)
    }

    /// Create a buffer from per-channel vectors with an explicit orientation
    pub fn with_layout(samples: Vec<Vec<f32>>, sample_rate: u32, layout: Layout) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioPrepError::InvalidBuffer {
                reason: "sample rate must be positive".to_string(),
            });
        }
        let Some(first) = samples.first() else {
            return Err(AudioPrepError::InvalidBuffer {
                reason: "buffer has no channels".to_string(),
            });
        };
        let frames = first.len();
        if let Some((ch, data)) = samples.iter().enumerate().find(|(_, c)| c.len() != frames) {
            return Err(AudioPrepError::InvalidBuffer {
                reason: format!(
                    "channel {} has {} frames, channel 0 has {}",
                    ch,
                    data.len(),
                    frames
                ),
            });
        }
        if samples.iter().flatten().any(|s| !s.is_finite()) {
            return Err(AudioPrepError::InvalidBuffer {
                reason: "buffer contains NaN or infinite samples".to_string(),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
            layout,
        })
    }

    /// Create a channels-first buffer from interleaved samples [L0, R0, L1, R1, ...]
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Result<Self> {
        if num_channels == 0 || samples.len() % num_channels != 0 {
            return Err(AudioPrepError::InvalidBuffer {
                reason: format!(
                    "sample count {} is not divisible by channel count {}",
                    samples.len(),
                    num_channels
                ),
            });
        }
        Self::from_channels(deinterleave(samples, num_channels), sample_rate)
    }

    /// Create a silent buffer
    pub fn silence(num_channels: usize, num_frames: usize, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![vec![0.0; num_frames]; num_channels], sample_rate)
    }

    /// Create a mono sine wave at unity amplitude
    pub fn sine_wave(frequency: f32, duration_secs: f32, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![sine(frequency, duration_secs, sample_rate)], sample_rate)
    }

    /// Create a stereo buffer with a different sine in each channel
    pub fn stereo_sine_wave(
        freq_left: f32,
        freq_right: f32,
        duration_secs: f32,
        sample_rate: u32,
    ) -> Result<Self> {
        Self::from_channels(
            vec![
                sine(freq_left, duration_secs, sample_rate),
                sine(freq_right, duration_secs, sample_rate),
            ],
            sample_rate,
        )
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames per channel
    pub fn num_frames(&self) -> usize {
        self.samples[0].len()
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Logical orientation
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Dimensions in layout order: (channels, frames) or (frames, channels)
    pub fn shape(&self) -> (usize, usize) {
        match self.layout {
            Layout::ChannelsFirst => (self.num_channels(), self.num_frames()),
            Layout::FramesFirst => (self.num_frames(), self.num_channels()),
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel
    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        self.samples.get(channel).map(|c| c.as_slice())
    }

    /// All channels, channel-major
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.samples
    }

    /// Iterate over every sample, channel by channel
    pub fn iter_samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().flat_map(|c| c.iter().copied())
    }

    /// Interleaved copy of the samples [L0, R0, L1, R1, ...]
    pub fn to_interleaved(&self) -> Vec<f32> {
        interleave(&self.samples)
    }

    /// Same samples with a different logical orientation
    pub fn relabeled(&self, layout: Layout) -> Self {
        Self {
            samples: self.samples.clone(),
            sample_rate: self.sample_rate,
            layout,
        }
    }

    /// New buffer with every sample mapped through `f`, keeping rate and layout
    pub fn map_samples(&self, f: impl Fn(f32) -> f32) -> Result<Self> {
        let samples = self
            .samples
            .iter()
            .map(|c| c.iter().map(|&s| f(s)).collect())
            .collect();
        Self::with_layout(samples, self.sample_rate, self.layout)
    }

    /// Smallest sample value (0.0 for an empty buffer)
    pub fn min(&self) -> f32 {
        self.iter_samples().reduce(f32::min).unwrap_or(0.0)
    }

    /// Largest sample value (0.0 for an empty buffer)
    pub fn max(&self) -> f32 {
        self.iter_samples().reduce(f32::max).unwrap_or(0.0)
    }

    /// Mean sample value across all channels
    pub fn mean(&self) -> f32 {
        let total = self.num_channels() * self.num_frames();
        if total == 0 {
            return 0.0;
        }
        let sum: f64 = self.iter_samples().map(|s| s as f64).sum();
        (sum / total as f64) as f32
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.iter_samples().map(f32::abs).fold(0.0, f32::max)
    }

    /// Whether every sample lies in [-1, 1]
    pub fn is_normalized(&self) -> bool {
        self.iter_samples().all(|s| (-1.0..=1.0).contains(&s))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    (0..num_frames)
        .map(|i| (angular_freq * i as f32).sin())
        .collect()
}

/// De-interleave samples from [L,R,L,R,...] to [[L,L,...], [R,R,...]]
pub(crate) fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut result = vec![Vec::with_capacity(frames); channels];

    for (i, sample) in samples.iter().enumerate() {
        result[i % channels].push(*sample);
    }

    result
}

/// Interleave channels from [[L,L,...], [R,R,...]] to [L,R,L,R,...]
pub(crate) fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = channels.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut result = Vec::with_capacity(frames * channels.len());

    for frame in 0..frames {
        for channel in channels {
            result.push(channel[frame]);
        }
    }

    result
}
