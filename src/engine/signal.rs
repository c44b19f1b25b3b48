//! Pipeline values
//!
//! A pipeline moves a [`Signal`] from stage to stage: a waveform until a
//! spectral transform turns it into a [`FeatureMap`].

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{AudioPrepError, Result};

/// What the values of a feature map represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// |X|
    Magnitude,
    /// |X|^2
    Power,
    /// Decibels of a magnitude or power map
    Decibels,
    /// Natural log of power (Kaldi features)
    LogPower,
    /// Cepstral coefficients (MFCC)
    Cepstral,
}

/// Frequency scale of the bin axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyAxis {
    Linear,
    Mel,
}

/// Rectangular channels × frames × bins feature array
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    data: Vec<Vec<Vec<f32>>>,
    sample_rate: u32,
    kind: FeatureKind,
    axis: FrequencyAxis,
}

impl FeatureMap {
    /// Build a feature map, checking that it is rectangular
    pub fn new(
        data: Vec<Vec<Vec<f32>>>,
        sample_rate: u32,
        kind: FeatureKind,
        axis: FrequencyAxis,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(AudioPrepError::InvalidBuffer {
                reason: "feature map has no channels".to_string(),
            });
        }
        let frames = data[0].len();
        let bins = data[0].first().map_or(0, Vec::len);
        let ragged = data
            .iter()
            .any(|ch| ch.len() != frames || ch.iter().any(|f| f.len() != bins));
        if ragged {
            return Err(AudioPrepError::InvalidBuffer {
                reason: "feature map is not rectangular".to_string(),
            });
        }
        Ok(Self {
            data,
            sample_rate,
            kind,
            axis,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    pub fn num_frames(&self) -> usize {
        self.data[0].len()
    }

    /// Bins (or coefficients) per frame
    pub fn num_bins(&self) -> usize {
        self.data[0].first().map_or(0, Vec::len)
    }

    /// (channels, frames, bins)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_channels(), self.num_frames(), self.num_bins())
    }

    /// Rate of the waveform these features were computed from
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn axis(&self) -> FrequencyAxis {
        self.axis
    }

    /// Frames of one channel
    pub fn channel(&self, channel: usize) -> Option<&[Vec<f32>]> {
        self.data.get(channel).map(|c| c.as_slice())
    }

    pub fn data(&self) -> &[Vec<Vec<f32>>] {
        &self.data
    }

    /// Largest value across the whole map
    pub fn max(&self) -> f32 {
        self.data
            .iter()
            .flatten()
            .flatten()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Value flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Waveform(AudioBuffer),
    Features(FeatureMap),
}

impl Signal {
    /// Dimensions of the underlying array, in its logical order
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Signal::Waveform(buffer) => {
                let (a, b) = buffer.shape();
                vec![a, b]
            }
            Signal::Features(map) => {
                let (c, f, b) = map.shape();
                vec![c, f, b]
            }
        }
    }

    pub fn as_waveform(&self) -> Option<&AudioBuffer> {
        match self {
            Signal::Waveform(buffer) => Some(buffer),
            Signal::Features(_) => None,
        }
    }

    pub fn as_features(&self) -> Option<&FeatureMap> {
        match self {
            Signal::Features(map) => Some(map),
            Signal::Waveform(_) => None,
        }
    }

    pub fn into_waveform(self) -> Option<AudioBuffer> {
        match self {
            Signal::Waveform(buffer) => Some(buffer),
            Signal::Features(_) => None,
        }
    }

    pub fn into_features(self) -> Option<FeatureMap> {
        match self {
            Signal::Features(map) => Some(map),
            Signal::Waveform(_) => None,
        }
    }
}

impl From<AudioBuffer> for Signal {
    fn from(buffer: AudioBuffer) -> Self {
        Signal::Waveform(buffer)
    }
}

impl From<FeatureMap> for Signal {
    fn from(map: FeatureMap) -> Self {
        Signal::Features(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_map_shape() {
        let map = FeatureMap::new(
            vec![vec![vec![0.0; 5]; 3]; 2],
            16000,
            FeatureKind::Power,
            FrequencyAxis::Linear,
        )
        .unwrap();
        assert_eq!(map.shape(), (2, 3, 5));
        assert_eq!(Signal::from(map).shape(), vec![2, 3, 5]);
    }

    #[test]
    fn test_feature_map_rejects_ragged() {
        let result = FeatureMap::new(
            vec![vec![vec![0.0; 5], vec![0.0; 4]]],
            16000,
            FeatureKind::Power,
            FrequencyAxis::Linear,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_signal_accessors() {
        let buffer = AudioBuffer::silence(1, 4, 8000).unwrap();
        let signal = Signal::from(buffer.clone());
        assert_eq!(signal.as_waveform(), Some(&buffer));
        assert!(signal.as_features().is_none());
        assert_eq!(signal.shape(), vec![1, 4]);
    }
}
