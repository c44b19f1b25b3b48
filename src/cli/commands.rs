//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crate::dsp::{Pipeline, Transform};
use crate::engine::{save, ExportFormat, Signal};
use crate::session::{FidelityReport, Session, ZeroPolicy};

/// Run the preprocessing tour and print one line per stage.
pub fn walkthrough(input: &Path, json: bool) -> Result<()> {
    let session = open(input)?;
    let report = session
        .walkthrough()
        .with_context(|| format!("walkthrough failed on {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stats = &report.stats;
    println!("Source: {}", input.display());
    println!(
        "Shape: {:?} at {} Hz ({:.2}s)",
        session.buffer().shape(),
        stats.sample_rate,
        stats.duration_secs
    );
    println!(
        "Min: {:.6}  Max: {:.6}  Mean: {:.6}",
        stats.min, stats.max, stats.mean
    );
    println!("{:-<60}", "");
    for stage in &report.stages {
        println!(
            "{:<24} {:>20} {:>10} Hz",
            stage.stage,
            format!("{:?}", stage.shape),
            stage.sample_rate
        );
    }
    println!("{:-<60}", "");
    println!("Mu-law round trip: {}", report.fidelity);

    Ok(())
}

/// Print shape, statistics and provenance of a WAV file.
pub fn inspect(input: &Path) -> Result<()> {
    let session = open(input)?;
    let stats = session.stats();

    println!("File: {}", input.display());
    println!("Channels: {}", stats.channels);
    println!("Frames: {}", stats.frames);
    println!("Sample rate: {} Hz", stats.sample_rate);
    println!("Duration: {:.3}s", stats.duration_secs);
    println!("Min: {:.6}", stats.min);
    println!("Max: {:.6}", stats.max);
    println!("Mean: {:.6}", stats.mean);
    if let Some(source) = session.source() {
        println!("SHA-256: {}", source.sha256);
        println!("Loaded: {}", source.loaded_at.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}

/// Mu-law round trip with fidelity report.
pub fn round_trip(input: &Path, quantization_channels: u32, exclude_zeros: bool) -> Result<()> {
    let session = open(input)?;
    let (reconstructed, report) = session
        .mu_law_round_trip(quantization_channels)
        .context("mu-law round trip failed")?;

    let report = if exclude_zeros {
        FidelityReport::compare_with(session.buffer(), &reconstructed, ZeroPolicy::Exclude)?
    } else {
        report
    };

    println!(
        "Quantization channels: {} | Shape: {:?}",
        quantization_channels,
        reconstructed.shape()
    );
    println!(
        "Median relative difference between original and mu-law reconstructed signals: {:.2}%",
        report.percent()
    );
    if !report.is_finite() {
        println!("(zero-valued samples make the ratio non-finite; try --exclude-zeros)");
    }

    Ok(())
}

/// Apply a configured pipeline, optionally writing the waveform result.
pub fn apply(input: &Path, pipeline_path: &Path, output: Option<&Path>, bit_depth: u16) -> Result<()> {
    let session = open(input)?;
    let pipeline = Pipeline::from_json_file(pipeline_path)
        .with_context(|| format!("failed to read pipeline {}", pipeline_path.display()))?;
    info!("Applying pipeline: {}", pipeline.names().join(" -> "));

    let result = session.run(&pipeline).context("pipeline failed")?;
    println!("Pipeline: {}", pipeline.params());
    println!("Output shape: {:?}", result.shape());

    match (output, result) {
        (Some(path), Signal::Waveform(buffer)) => {
            save(&buffer, path, ExportFormat { bit_depth })
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Written: {}", path.display());
        }
        (Some(_), Signal::Features(_)) => {
            bail!("pipeline produced a feature map; only waveforms can be written as WAV")
        }
        (None, _) => {}
    }

    Ok(())
}

fn open(input: &Path) -> Result<Session> {
    Session::open(input).with_context(|| format!("failed to open {}", input.display()))
}
