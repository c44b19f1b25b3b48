//! Channel-axis transforms: SelectChannel, DownmixMono, ChannelPermute
//!
//! Which axis is "channel" depends on the buffer's [`Layout`]:
//! - `ChannelsFirst` (CL): shape is (channels, frames)
//! - `FramesFirst` (LC): shape is (frames, channels)
//!
//! `DownmixMono` declares the orientation it expects and rejects the other
//! one, so pipelines spell out their permutes (`ChannelPermute`) explicitly.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::transform::{expect_waveform, Transform};
use crate::engine::{AudioBuffer, Layout, Signal};
use crate::error::{AudioPrepError, Result};
use crate::impl_transform_common;

// ============================================================================
// SelectChannel
// ============================================================================

/// Extract a single channel as a 1-channel, channels-first buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectChannel {
    pub channel: usize,
}

impl SelectChannel {
    pub fn new(channel: usize) -> Self {
        Self { channel }
    }
}

impl Transform for SelectChannel {
    impl_transform_common!("select_channel");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let data = buffer.channel(self.channel).ok_or_else(|| {
            AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "channel {} requested from a {}-channel buffer",
                    self.channel,
                    buffer.num_channels()
                ),
            )
        })?;
        Ok(AudioBuffer::from_channels(vec![data.to_vec()], buffer.sample_rate())?.into())
    }
}

// ============================================================================
// DownmixMono
// ============================================================================

/// Average across the channel axis
///
/// With `channels_first = false` (the default) the input must be frames-first
/// (LC); with `channels_first = true` it must be channels-first (CL). The
/// output keeps the input layout and has exactly one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownmixMono {
    pub channels_first: bool,
}

impl DownmixMono {
    pub fn new(channels_first: bool) -> Self {
        Self { channels_first }
    }

    fn expected_layout(&self) -> Layout {
        if self.channels_first {
            Layout::ChannelsFirst
        } else {
            Layout::FramesFirst
        }
    }
}

impl Transform for DownmixMono {
    impl_transform_common!("downmix_mono");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let expected = self.expected_layout();
        if buffer.layout() != expected {
            return Err(AudioPrepError::config_mismatch(
                self.name(),
                format!(
                    "configured for {} input, got {} buffer of shape {:?}",
                    expected.label(),
                    buffer.layout().label(),
                    buffer.shape()
                ),
            ));
        }

        let channels = buffer.channels();
        let count = channels.len() as f32;
        let mono: Vec<f32> = (0..buffer.num_frames())
            .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / count)
            .collect();
        debug!(
            "downmix_mono: {} channels -> 1 ({} frames)",
            channels.len(),
            mono.len()
        );

        Ok(AudioBuffer::with_layout(vec![mono], buffer.sample_rate(), buffer.layout())?.into())
    }
}

// ============================================================================
// ChannelPermute
// ============================================================================

/// Swap between frames-first (LC) and channels-first (CL) orientation
///
/// Samples are untouched; applying it twice restores the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPermute;

impl Transform for ChannelPermute {
    impl_transform_common!("channel_permute");

    fn apply(&self, input: &Signal) -> Result<Signal> {
        let buffer = expect_waveform(input, self.name())?;
        let layout = buffer.layout().transposed();
        debug!(
            "channel_permute: {} -> {}",
            buffer.layout().label(),
            layout.label()
        );
        Ok(buffer.relabeled(layout).into())
    }
}
