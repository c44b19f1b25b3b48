//! Transform library
//!
//! Waveform and feature transforms for audio preprocessing.
//! All transforms implement the `Transform` trait and compose into a `Pipeline`.

mod chain;
mod channels;
mod config;
mod kaldi;
mod mulaw;
mod resample;
mod scale;
mod spectral;
mod transform;

pub use chain::Pipeline;
pub use channels::{ChannelPermute, DownmixMono, SelectChannel};
pub use config::{PipelineConfig, TransformSpec};
pub use kaldi::{Framing, KaldiFbank, KaldiOptions, KaldiSpectrogram, MelBanksOptions, WindowType};
pub use mulaw::{MuLawEncoding, MuLawExpanding, DEFAULT_QUANTIZATION_CHANNELS};
pub use resample::{output_frame_count, Resample, DEFAULT_LOWPASS_FILTER_WIDTH};
pub use scale::{Normalize, PadTrim, Scale, INT32_FULL_SCALE};
pub use spectral::{Mfcc, MelScale, MelSpectrogram, Spectrogram, SpectrogramToDb, SpectrumType};
pub use transform::Transform;
