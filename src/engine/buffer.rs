//! Audio Buffer Management
//!
//! Provides the value type every DSP stage consumes and produces, together
//! with level analysis and the int16/float32 boundary conversions.
//! Internally samples are 32-bit float, nominally in [-1.0, 1.0].

use serde::{Deserialize, Serialize};

use crate::dsp::util::linear_to_db;
use crate::error::{MasterError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Threshold below which audio is considered silent (-80dBFS)
pub const SILENCE_THRESHOLD_DB: f32 = -80.0;

/// Maximum acceptable DC offset (mean sample value)
pub const DC_OFFSET_THRESHOLD: f32 = 0.01;

/// Maximum acceptable ratio of clipped samples (1%)
pub const CLIP_RATIO_THRESHOLD: f32 = 0.01;

/// Scale used when decoding int16 samples
const I16_DECODE_SCALE: f32 = 32768.0;

/// Scale used when encoding int16 samples
const I16_ENCODE_SCALE: f32 = 32767.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Calculate the RMS (Root Mean Square) level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.len();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

/// Calculate the mean (average) sample value of an audio buffer
///
/// Used for DC offset detection. Returns 0.0 for empty buffers.
pub fn calculate_mean(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.len();
    if total_samples == 0 {
        return 0.0;
    }

    let sum: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s as f64)
        .sum();

    (sum / total_samples as f64) as f32
}

/// Calculate the ratio of samples at or beyond full scale
pub fn calculate_clip_ratio(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.len();
    if total_samples == 0 {
        return 0.0;
    }

    let clipped_count = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .filter(|&&s| s.abs() >= 1.0)
        .count();

    clipped_count as f32 / total_samples as f32
}

// ============================================================================
// Channel Layout / Sample Format
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    #[default]
    Mono,
    /// Two channels (stereo: left, right)
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

/// Sample encoding used at the boundary of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit integers in [-32768, 32767]
    #[default]
    Int16,
    /// 32-bit float in [-1.0, 1.0]
    Float32,
}

impl SampleFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        }
    }
}

impl std::str::FromStr for SampleFormat {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "int16" | "i16" | "s16" | "16" => Ok(SampleFormat::Int16),
            "float32" | "f32" | "float" | "32" => Ok(SampleFormat::Float32),
            other => Err(MasterError::UnsupportedFormat {
                format: format!("sample format '{}' (expected int16 or float32)", other),
            }),
        }
    }
}

// ============================================================================
// Audio Validation
// ============================================================================

/// Results of audio quality checks
///
/// Unlike construction errors these are advisory: a silent or clipped clip
/// is still processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioValidation {
    /// Buffer holds at least one sample
    pub has_samples: bool,
    /// Every sample is finite
    pub all_finite: bool,
    /// RMS level is above silence threshold (-80dBFS)
    pub not_silent: bool,
    /// No significant DC offset (mean < 0.01)
    pub not_dc_offset: bool,
    /// Less than 1% of samples are clipped
    pub not_clipped: bool,
}

impl AudioValidation {
    /// Check if all validation criteria pass
    pub fn is_valid(&self) -> bool {
        self.has_samples
            && self.all_finite
            && self.not_silent
            && self.not_dc_offset
            && self.not_clipped
    }

    /// Get a list of failed validation criteria
    pub fn failed_checks(&self) -> Vec<&'static str> {
        let mut failures = Vec::new();
        if !self.has_samples {
            failures.push("no samples");
        }
        if !self.all_finite {
            failures.push("non-finite samples");
        }
        if !self.not_silent {
            failures.push("audio is silent");
        }
        if !self.not_dc_offset {
            failures.push("DC offset detected");
        }
        if !self.not_clipped {
            failures.push("excessive clipping");
        }
        failures
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar audio buffer shared by every stage
///
/// One `Vec<f32>` per channel, all of the same length. Stages never change
/// the sample rate, the channel count, or (apart from the optional trim) the
/// length.
///
/// # Example
/// ```
/// use vocalmaster::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::from_mono(vec![0.0, 0.5, -0.5], 44100).unwrap();
/// assert_eq!(buffer.num_channels(), 1);
/// assert_eq!(buffer.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given length and layout
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![vec![0.0_f32; num_samples]; layout.num_channels()], sample_rate)
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// * `InvalidSampleRate` - if `sample_rate` is zero
    /// * `UnsupportedFormat` - for anything other than 1 or 2 channels
    /// * `InvalidAudio` - for ragged channels or non-finite samples
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.iter().flatten().any(|s| !s.is_finite()) {
            return Err(MasterError::InvalidAudio {
                reason: "buffer contains NaN or infinite samples".to_string(),
                source: None,
            });
        }
        Self::from_channels_unchecked(samples, sample_rate)
    }

    /// Shape checks only; sample values are not inspected
    fn from_channels_unchecked(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(MasterError::InvalidSampleRate { sample_rate });
        }
        if ChannelLayout::from_count(samples.len()).is_none() {
            return Err(MasterError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", samples.len()),
            });
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(MasterError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a mono buffer
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::from_channels(vec![samples], sample_rate)
    }

    /// Create an audio buffer from interleaved float data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(MasterError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Decode interleaved int16 PCM into the float domain
    pub fn from_i16_interleaved(
        interleaved: &[i16],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let floats: Vec<f32> = interleaved
            .iter()
            .map(|&s| s as f32 / I16_DECODE_SCALE)
            .collect();
        Self::from_interleaved(&floats, layout, sample_rate)
    }

    /// Convert the buffer to interleaved float format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_samples = self.len();
        let mut interleaved = Vec::with_capacity(self.num_channels() * num_samples);

        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Encode to interleaved int16 PCM, hard-clipping to the integer range
    pub fn to_i16_interleaved(&self) -> Vec<i16> {
        self.to_interleaved()
            .into_iter()
            .map(|s| (s * I16_ENCODE_SCALE).round().clamp(-32768.0, 32767.0) as i16)
            .collect()
    }

    /// Build a buffer with the same rate from processed channel data
    ///
    /// Used by stages to return their output. Channel count and lengths are
    /// checked; non-finite values are left for the pipeline to report as
    /// `DspOverflow` against the stage that produced them.
    pub fn with_channels(&self, samples: Vec<Vec<f32>>) -> Result<Self> {
        Self::from_channels_unchecked(samples, self.sample_rate)
    }

    /// Apply `f` to every channel independently
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Result<Vec<f32>>,
    {
        let processed = self
            .samples
            .iter()
            .map(|ch| f(ch))
            .collect::<Result<Vec<_>>>()?;
        self.with_channels(processed)
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_count(self.num_channels()).unwrap_or_default()
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Iterate over channels
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.iter().map(|ch| ch.as_slice())
    }

    /// Get a sample at the specified channel and index
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// True when every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.peak() == 0.0
    }

    /// Check if all samples are finite (not NaN or Infinity)
    ///
    /// Used for DSP overflow detection.
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Run the advisory quality checks
    pub fn get_validation(&self) -> AudioValidation {
        AudioValidation {
            has_samples: !self.is_empty(),
            all_finite: self.is_finite(),
            not_silent: calculate_rms(self) > SILENCE_THRESHOLD_DB,
            not_dc_offset: calculate_mean(self).abs() < DC_OFFSET_THRESHOLD,
            not_clipped: calculate_clip_ratio(self) < CLIP_RATIO_THRESHOLD,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
