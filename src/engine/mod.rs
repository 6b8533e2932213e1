//! Audio Engine Module
//!
//! Buffer type and file I/O surrounding the DSP core:
//! - Audio buffer management and level analysis
//! - WAV import/export

pub mod buffer;
pub mod io;

pub use buffer::{
    calculate_clip_ratio, calculate_mean, calculate_peak, calculate_rms, AudioBuffer,
    AudioValidation, ChannelLayout, SampleFormat,
};
pub use io::{export_audio, generate_sweep, generate_test_tone, import_audio};
