//! Transform trait definition
//!
//! Base trait for every pipeline stage. A transform is a pure function of its
//! input and its own configuration: it never mutates the input and holds no
//! state between calls.

use serde_json::Value;

use crate::engine::{AudioBuffer, FeatureMap, Signal};
use crate::error::{AudioPrepError, Result};

/// Base trait for all transforms
pub trait Transform: Send + Sync {
    /// Produce a new signal from `input`
    ///
    /// Preconditions are checked before any computation; a violated
    /// precondition fails with `ConfigMismatch`.
    fn apply(&self, input: &Signal) -> Result<Signal>;

    /// Get the transform type identifier (snake_case, as used in configs)
    fn name(&self) -> &'static str;

    /// Configuration as JSON (for logs and pipeline descriptions)
    fn params(&self) -> Value;

    /// Clone the transform into a boxed trait object
    fn box_clone(&self) -> Box<dyn Transform>;

    /// Apply to a bare waveform
    fn apply_buffer(&self, buffer: &AudioBuffer) -> Result<Signal> {
        self.apply(&Signal::Waveform(buffer.clone()))
    }
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl std::fmt::Debug for dyn Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.params())
    }
}

/// Helper macro to implement common Transform trait methods
#[macro_export]
macro_rules! impl_transform_common {
    ($name:expr) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn params(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }

        fn box_clone(&self) -> Box<dyn $crate::dsp::Transform> {
            Box::new(self.clone())
        }
    };
}

/// Borrow the waveform out of `input` or fail with `ConfigMismatch`
pub(crate) fn expect_waveform<'a>(input: &'a Signal, transform: &str) -> Result<&'a AudioBuffer> {
    input.as_waveform().ok_or_else(|| {
        AudioPrepError::config_mismatch(transform, "expected a waveform, got a feature map")
    })
}

/// Borrow the feature map out of `input` or fail with `ConfigMismatch`
pub(crate) fn expect_features<'a>(input: &'a Signal, transform: &str) -> Result<&'a FeatureMap> {
    input.as_features().ok_or_else(|| {
        AudioPrepError::config_mismatch(transform, "expected a feature map, got a waveform")
    })
}
