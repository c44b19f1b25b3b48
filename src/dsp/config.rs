//! Serializable pipeline configuration
//!
//! A pipeline config is a JSON document listing stages in order:
//!
//! ```json
//! {
//!   "stages": [
//!     { "type": "channel_permute" },
//!     { "type": "downmix_mono" },
//!     { "type": "channel_permute" },
//!     { "type": "resample", "source_rate": 44100, "target_rate": 4410 }
//!   ]
//! }
//! ```
//!
//! Omitted fields take the transform's defaults, except where a transform
//! has none (resample rates, Kaldi framing options). A `"pipeline"` stage
//! holds its own `stages` list, so nested pipelines load back as written.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    ChannelPermute, DownmixMono, KaldiFbank, KaldiSpectrogram, MelScale, MelSpectrogram, Mfcc,
    MuLawEncoding, MuLawExpanding, Normalize, PadTrim, Pipeline, Resample, Scale, SelectChannel,
    Spectrogram, SpectrogramToDb, Transform,
};
use crate::error::Result;

/// One configured stage, tagged by transform name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    Scale(Scale),
    PadTrim(PadTrim),
    Normalize,
    SelectChannel(SelectChannel),
    DownmixMono(DownmixMono),
    ChannelPermute,
    Resample(Resample),
    Spectrogram(Spectrogram),
    MelScale(MelScale),
    MelSpectrogram(MelSpectrogram),
    SpectrogramToDb(SpectrogramToDb),
    Mfcc(Mfcc),
    MuLawEncoding(MuLawEncoding),
    MuLawExpanding(MuLawExpanding),
    KaldiSpectrogram(KaldiSpectrogram),
    KaldiFbank(KaldiFbank),
    Pipeline(PipelineConfig),
}

impl TransformSpec {
    /// Instantiate the configured transform
    pub fn build(&self) -> Box<dyn Transform> {
        match self {
            TransformSpec::Scale(t) => Box::new(*t),
            TransformSpec::PadTrim(t) => Box::new(*t),
            TransformSpec::Normalize => Box::new(Normalize),
            TransformSpec::SelectChannel(t) => Box::new(*t),
            TransformSpec::DownmixMono(t) => Box::new(*t),
            TransformSpec::ChannelPermute => Box::new(ChannelPermute),
            TransformSpec::Resample(t) => Box::new(*t),
            TransformSpec::Spectrogram(t) => Box::new(*t),
            TransformSpec::MelScale(t) => Box::new(*t),
            TransformSpec::MelSpectrogram(t) => Box::new(*t),
            TransformSpec::SpectrogramToDb(t) => Box::new(*t),
            TransformSpec::Mfcc(t) => Box::new(*t),
            TransformSpec::MuLawEncoding(t) => Box::new(*t),
            TransformSpec::MuLawExpanding(t) => Box::new(*t),
            TransformSpec::KaldiSpectrogram(t) => Box::new(*t),
            TransformSpec::KaldiFbank(t) => Box::new(*t),
            TransformSpec::Pipeline(config) => Box::new(config.build()),
        }
    }
}

/// Ordered list of stage configs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stages: Vec<TransformSpec>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
