//! CLI Module
//!
//! Command-line interface for the audioprep transforms.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// audioprep - audio preprocessing transforms and Kaldi-compatible features
#[derive(Parser, Debug)]
#[command(name = "audioprep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full preprocessing tour on a WAV file
    #[command(name = "walkthrough")]
    Walkthrough {
        /// Input WAV file
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print shape, sample rate, statistics and checksum
    #[command(name = "inspect")]
    Inspect {
        /// Input WAV file
        input: PathBuf,
    },

    /// Mu-law encode and expand, then report the fidelity
    #[command(name = "round-trip")]
    RoundTrip {
        /// Input WAV file
        input: PathBuf,

        /// Number of mu-law quantization levels
        #[arg(short, long, default_value_t = 256)]
        quantization_channels: u32,

        /// Leave zero-valued samples out of the median
        #[arg(long)]
        exclude_zeros: bool,
    },

    /// Apply a JSON pipeline config to a WAV file
    #[command(name = "apply")]
    Apply {
        /// Input WAV file
        input: PathBuf,

        /// Pipeline config (JSON)
        pipeline: PathBuf,

        /// Write a waveform result to this WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output bit depth: 16, 24 or 32 (float)
        #[arg(long, default_value_t = 16)]
        bit_depth: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "audioprep",
            "--verbose",
            "apply",
            "in.wav",
            "pipeline.json",
            "--output",
            "out.wav",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Apply {
                input,
                pipeline,
                output,
                bit_depth,
            } => {
                assert_eq!(input, PathBuf::from("in.wav"));
                assert_eq!(pipeline, PathBuf::from("pipeline.json"));
                assert_eq!(output, Some(PathBuf::from("out.wav")));
                assert_eq!(bit_depth, 16);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_round_trip_defaults() {
        let cli = Cli::try_parse_from(["audioprep", "round-trip", "in.wav"]).unwrap();
        match cli.command {
            Commands::RoundTrip {
                quantization_channels,
                exclude_zeros,
                ..
            } => {
                assert_eq!(quantization_channels, 256);
                assert!(!exclude_zeros);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["audioprep"]).is_err());
    }
}
