//! audioprep - Audio Preprocessing Transforms
//!
//! Load a waveform, run it through composable transforms and get back either
//! a new waveform or a feature map:
//! 1. Waveform transforms - scaling, padding, channel handling, resampling, mu-law
//! 2. Feature transforms - spectrograms, mel scale, decibels, MFCC, Kaldi-compatible features
//!
//! # Architecture
//!
//! - `engine`: immutable `AudioBuffer`, `FeatureMap`, WAV I/O
//! - `dsp`: the `Transform` trait, every transform, and `Pipeline`
//! - `session`: a loaded buffer, round-trip fidelity and the end-to-end walkthrough
//!
//! Every transform carries its own configuration; there is no global state.

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod session;

pub use dsp::{Pipeline, PipelineConfig, Transform, TransformSpec};
pub use engine::{AudioBuffer, FeatureMap, Layout, Signal};
pub use error::{AudioPrepError, Result};
pub use session::{FidelityReport, Session, ZeroPolicy};
