//! Audio file I/O for Vocalmaster
//!
//! WAV decode/encode through `hound`. Files keep their native sample rate
//! and channel count; the DSP core never resamples.

use std::path::Path;

use hound::{SampleFormat as WavSampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::buffer::{AudioBuffer, ChannelLayout, SampleFormat};
use crate::error::{MasterError, Result};

/// Import a WAV file into the float domain
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - More than 2 channels or an unknown bit depth
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(MasterError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| MasterError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
        MasterError::UnsupportedFormat {
            format: format!(
                "{}-channel audio (only mono/stereo supported)",
                spec.channels
            ),
        }
    })?;

    debug!(
        "Importing {}: {} Hz, {} ch, {}-bit {:?}",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_interleaved(&samples, layout, spec.sample_rate)
}

/// Export an AudioBuffer to a WAV file in the requested sample format
///
/// Int16 output is hard-clipped to the integer range; Float32 output is
/// written as-is.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: SampleFormat) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: format.bits_per_sample(),
        sample_format: match format {
            SampleFormat::Int16 => WavSampleFormat::Int,
            SampleFormat::Float32 => WavSampleFormat::Float,
        },
    };

    let mut writer = WavWriter::create(path, spec)?;

    match format {
        SampleFormat::Int16 => {
            for sample in buffer.to_i16_interleaved() {
                writer.write_sample(sample)?;
            }
        }
        SampleFormat::Float32 => {
            for sample in buffer.to_interleaved() {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    debug!("Exported {} ({:?})", path.display(), format);
    Ok(())
}

/// Generate a mono sine tone
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;

    let samples = (0..num_samples)
        .map(|i| amplitude * (angular_freq * i as f64).sin() as f32)
        .collect();

    AudioBuffer::from_mono(samples, sample_rate)
}

/// Generate a mono exponential sine sweep from `start_hz` to `end_hz`
pub fn generate_sweep(
    start_hz: f32,
    end_hz: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    if start_hz <= 0.0 || end_hz <= start_hz {
        return Err(MasterError::invalid_param(
            "end_hz",
            end_hz,
            "greater than a positive start_hz",
        ));
    }
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let duration = duration_secs as f64;
    let f0 = start_hz as f64;
    let k = (end_hz as f64 / f0).ln();

    let samples = (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let phase = 2.0 * std::f64::consts::PI * f0 * duration / k * ((t * k / duration).exp() - 1.0);
            amplitude * phase.sin() as f32
        })
        .collect();

    AudioBuffer::from_mono(samples, sample_rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: WavSampleFormat,
) -> Result<Vec<f32>> {
    let map_err = |e: hound::Error| MasterError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        WavSampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(map_err),
        WavSampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(MasterError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(map_err)
        }
    }
}
