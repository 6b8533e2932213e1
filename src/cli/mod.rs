//! CLI Module
//!
//! Command-line interface for the vocal mastering chain.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::dsp::Preset;
use crate::engine::SampleFormat;

/// Vocalmaster - master recorded vocals with a fixed DSP chain
#[derive(Parser, Debug)]
#[command(name = "vocalmaster")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Master a single WAV file
    #[command(name = "master")]
    Master {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Preset to use (clean, warm, bright)
        #[arg(short, long, default_value = "clean")]
        preset: Preset,

        /// JSON parameter file (overrides --preset)
        #[arg(long)]
        params: Option<PathBuf>,

        /// Output sample format (int16, float32)
        #[arg(short, long, default_value = "int16")]
        format: SampleFormat,
    },

    /// Master every WAV file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory to scan (recursively)
        input_dir: PathBuf,

        /// Directory for mastered files (mirrors the input tree)
        output_dir: PathBuf,

        /// Preset to use (clean, warm, bright)
        #[arg(short, long, default_value = "clean")]
        preset: Preset,

        /// JSON parameter file (overrides --preset)
        #[arg(long)]
        params: Option<PathBuf>,

        /// Output sample format (int16, float32)
        #[arg(short, long, default_value = "int16")]
        format: SampleFormat,
    },

    /// Print preset parameters as JSON
    #[command(name = "presets")]
    Presets {
        /// Only this preset
        name: Option<Preset>,
    },

    /// Print level analysis of a WAV file
    #[command(name = "analyze")]
    Analyze {
        /// WAV file to analyze
        path: PathBuf,
    },
}
