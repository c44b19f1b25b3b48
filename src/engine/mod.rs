//! Audio Engine Module
//!
//! Core values the transforms operate on:
//! - Audio buffer (immutable waveform)
//! - Feature maps and the pipeline `Signal`
//! - WAV file I/O

pub mod buffer;
pub mod io;
pub mod signal;

pub use buffer::{AudioBuffer, Layout};
pub use io::{load, save, ExportFormat};
pub use signal::{FeatureKind, FeatureMap, FrequencyAxis, Signal};
