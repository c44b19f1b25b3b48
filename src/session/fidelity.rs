//! Round-trip fidelity
//!
//! The figure of merit is the median over all samples of
//! `|original - reconstructed| / |original|`.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{AudioPrepError, Result};

/// What to do with samples where the original is exactly zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroPolicy {
    /// Keep them: the ratio is +inf (or NaN when both sides are zero)
    #[default]
    Include,
    /// Skip them
    Exclude,
}

/// Result of comparing a reconstruction against its original
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    /// Lower median of the per-sample relative error; NaN when nothing was compared
    pub median_relative_error: f64,
    /// Samples that entered the median
    pub compared: usize,
    /// Samples skipped by `ZeroPolicy::Exclude`
    pub excluded: usize,
    pub policy: ZeroPolicy,
}

impl FidelityReport {
    /// Compare with the default policy (`ZeroPolicy::Include`)
    pub fn compare(original: &AudioBuffer, reconstructed: &AudioBuffer) -> Result<Self> {
        Self::compare_with(original, reconstructed, ZeroPolicy::default())
    }

    pub fn compare_with(
        original: &AudioBuffer,
        reconstructed: &AudioBuffer,
        policy: ZeroPolicy,
    ) -> Result<Self> {
        let expected = (original.num_channels(), original.num_frames());
        let actual = (reconstructed.num_channels(), reconstructed.num_frames());
        if expected != actual {
            return Err(AudioPrepError::ShapeMismatch { expected, actual });
        }
        if original.sample_rate() != reconstructed.sample_rate() {
            warn!(
                "fidelity: comparing {} Hz original with {} Hz reconstruction",
                original.sample_rate(),
                reconstructed.sample_rate()
            );
        }

        let mut excluded = 0;
        let mut ratios: Vec<f64> = Vec::with_capacity(expected.0 * expected.1);
        for (o, r) in original.iter_samples().zip(reconstructed.iter_samples()) {
            if o == 0.0 && policy == ZeroPolicy::Exclude {
                excluded += 1;
                continue;
            }
            let ratio = (o as f64 - r as f64).abs() / (o as f64).abs();
            // 0/0 may carry either sign bit; keep every NaN at the top of the order
            ratios.push(if ratio.is_nan() { f64::NAN } else { ratio });
        }

        Ok(Self {
            median_relative_error: lower_median(&mut ratios),
            compared: ratios.len(),
            excluded,
            policy,
        })
    }

    /// Whether the median is a finite number
    pub fn is_finite(&self) -> bool {
        self.median_relative_error.is_finite()
    }

    /// Median error as a percentage
    pub fn percent(&self) -> f64 {
        self.median_relative_error * 100.0
    }
}

impl std::fmt::Display for FidelityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "median relative error {:.2}% over {} samples",
            self.percent(),
            self.compared
        )?;
        if self.excluded > 0 {
            write!(f, " ({} zero samples excluded)", self.excluded)?;
        }
        Ok(())
    }
}

/// Element at index `(n - 1) / 2` of the sorted values
fn lower_median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    values[(values.len() - 1) / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<f32>) -> AudioBuffer {
        AudioBuffer::from_channels(vec![samples], 8000).unwrap()
    }

    #[test]
    fn test_identical_buffers() {
        let a = mono(vec![0.5, -0.25, 1.0]);
        let report = FidelityReport::compare(&a, &a).unwrap();
        assert_eq!(report.median_relative_error, 0.0);
        assert_eq!(report.compared, 3);
    }

    #[test]
    fn test_lower_median() {
        let original = mono(vec![1.0, 1.0, 1.0, 1.0]);
        let reconstructed = mono(vec![1.1, 1.2, 1.3, 1.4]);
        let report = FidelityReport::compare(&original, &reconstructed).unwrap();
        // Errors 0.1, 0.2, 0.3, 0.4 -> lower median 0.2
        assert!((report.median_relative_error - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = mono(vec![0.0; 4]);
        let b = mono(vec![0.0; 5]);
        match FidelityReport::compare(&a, &b).unwrap_err() {
            AudioPrepError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, (1, 4));
                assert_eq!(actual, (1, 5));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_zero_originals_under_each_policy() {
        let original = mono(vec![0.0, 0.0, 0.0, 1.0]);
        let reconstructed = mono(vec![0.0, 0.1, 0.1, 1.0]);

        let included = FidelityReport::compare(&original, &reconstructed).unwrap();
        assert!(included.median_relative_error.is_infinite());
        assert!(!included.is_finite());

        let excluded =
            FidelityReport::compare_with(&original, &reconstructed, ZeroPolicy::Exclude).unwrap();
        assert_eq!(excluded.median_relative_error, 0.0);
        assert_eq!(excluded.compared, 1);
        assert_eq!(excluded.excluded, 3);
    }

    #[test]
    fn test_all_zero_comparison() {
        let zeros = mono(vec![0.0; 3]);
        assert!(FidelityReport::compare(&zeros, &zeros)
            .unwrap()
            .median_relative_error
            .is_nan());

        let report = FidelityReport::compare_with(&zeros, &zeros, ZeroPolicy::Exclude).unwrap();
        assert!(report.median_relative_error.is_nan());
        assert_eq!(report.compared, 0);
    }
}
