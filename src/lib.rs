//! Vocalmaster - Vocal Mastering Chain
//!
//! Off-line DSP chain for recorded vocals. A decoded clip runs through a
//! fixed sequence of stages and comes back with the same length, sample rate
//! and channel count:
//!
//! high-pass → EQ → saturation (optional) → compressor → de-esser →
//! limiter → normalize
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use vocalmaster::dsp::{master_vocal, MasteringParams, Preset};
//! use vocalmaster::engine::{export_audio, import_audio, SampleFormat};
//!
//! let input = import_audio(Path::new("vocal.wav"))?;
//! let params = MasteringParams::from_preset(Preset::Warm);
//! let mastered = master_vocal(&input, &params)?;
//! export_audio(&mastered, Path::new("vocal_master.wav"), SampleFormat::Int16)?;
//! # Ok::<(), vocalmaster::MasterError>(())
//! ```

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;

pub use error::{MasterError, Result};
