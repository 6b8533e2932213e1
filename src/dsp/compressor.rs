//! Compressor Stage
//!
//! RMS-detecting feed-forward compressor with a soft knee. The clip is
//! normalized by its peak, a centered sliding RMS feeds an attack/release
//! envelope follower, and the per-sample gain curve comes from the knee rule.
//! An optional presence bell compensates high-frequency loss afterwards.

use log::debug;
use serde::{Deserialize, Serialize};

use super::spectral::{apply_spectral_filter, FilterBand, SpectralFilterParams};
use super::util::{db_to_linear, linear_to_db, ms_to_samples, normalize_by_peak, sliding_rms, time_to_coeff};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

/// Compressor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    /// Threshold relative to the clip peak (-96 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (>= 1.0; 1.0 disables compression)
    pub ratio: f32,
    /// Attack time in milliseconds
    pub attack_ms: f32,
    /// Release time in milliseconds
    pub release_ms: f32,
    /// Knee width in dB (0 = hard knee)
    pub knee_db: f32,
    /// Length of the RMS detector window in milliseconds
    pub rms_window_ms: f32,
    /// Bell applied after compression when the ratio is above 1
    pub presence: Option<FilterBand>,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 80.0,
            knee_db: 3.0,
            rms_window_ms: 10.0,
            presence: Some(FilterBand::bell(3000.0, 1.0, 2.0)),
        }
    }
}

impl CompressorParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_db.is_finite() || !(-96.0..=0.0).contains(&self.threshold_db) {
            return Err(MasterError::invalid_param(
                "threshold_db",
                self.threshold_db,
                "-96 to 0 dB",
            ));
        }
        if !self.ratio.is_finite() || self.ratio < 1.0 {
            return Err(MasterError::invalid_param("ratio", self.ratio, ">= 1.0"));
        }
        if !self.attack_ms.is_finite() || self.attack_ms <= 0.0 {
            return Err(MasterError::invalid_param("attack_ms", self.attack_ms, "> 0 ms"));
        }
        if !self.release_ms.is_finite() || self.release_ms <= 0.0 {
            return Err(MasterError::invalid_param("release_ms", self.release_ms, "> 0 ms"));
        }
        if !self.knee_db.is_finite() || !(0.0..=24.0).contains(&self.knee_db) {
            return Err(MasterError::invalid_param("knee_db", self.knee_db, "0 to 24 dB"));
        }
        if !self.rms_window_ms.is_finite() || self.rms_window_ms <= 0.0 {
            return Err(MasterError::invalid_param(
                "rms_window_ms",
                self.rms_window_ms,
                "> 0 ms",
            ));
        }
        if let Some(band) = &self.presence {
            band.validate()?;
        }
        Ok(())
    }
}

/// Gain for one envelope value under the soft-knee rule
///
/// All levels are linear. Inside the knee the effective ratio rises linearly
/// from 1 at `threshold / knee_width` to `ratio` at `threshold * knee_width`.
pub fn soft_knee_gain(envelope: f32, threshold_linear: f32, ratio: f32, knee_width_linear: f32) -> f32 {
    let knee_start = threshold_linear / knee_width_linear;
    let knee_end = threshold_linear * knee_width_linear;

    if envelope < knee_start || ratio <= 1.0 {
        1.0
    } else if envelope < knee_end {
        let over = envelope / knee_start;
        let knee_ratio = 1.0 + (ratio - 1.0) * ((envelope - knee_start) / (knee_end - knee_start));
        1.0 / over.powf(1.0 - 1.0 / knee_ratio)
    } else {
        let over = envelope / threshold_linear;
        1.0 / over.powf(1.0 - 1.0 / ratio)
    }
}

/// Compress every channel of `buffer`
pub fn compress(buffer: &AudioBuffer, params: &CompressorParams) -> Result<AudioBuffer> {
    params.validate()?;

    if buffer.is_empty() || params.ratio == 1.0 {
        return Ok(buffer.clone());
    }

    let sample_rate = buffer.sample_rate();
    let threshold_linear = db_to_linear(params.threshold_db);
    let knee_width_linear = db_to_linear(params.knee_db);
    let attack_coeff = time_to_coeff(params.attack_ms, sample_rate as f32);
    let release_coeff = time_to_coeff(params.release_ms, sample_rate as f32);
    let rms_window = ms_to_samples(params.rms_window_ms, sample_rate);

    let mut min_gain = 1.0_f32;
    let compressed = buffer.map_channels(|channel| {
        let (normalized, max_val) = normalize_by_peak(channel);
        if max_val == 0.0 {
            return Ok(normalized);
        }

        let rms_values = sliding_rms(&normalized, rms_window);
        let mut envelope = 0.0_f32;

        let output = normalized
            .iter()
            .zip(rms_values)
            .map(|(&sample, rms)| {
                let coeff = if rms > envelope { attack_coeff } else { release_coeff };
                envelope = coeff * envelope + (1.0 - coeff) * rms;

                let gain = soft_knee_gain(envelope, threshold_linear, params.ratio, knee_width_linear);
                min_gain = min_gain.min(gain);
                sample * gain * max_val
            })
            .collect();
        Ok(output)
    })?;

    debug!(
        "compressor: threshold {:.1} dB, ratio {:.1}:1, max reduction {:.2} dB",
        params.threshold_db,
        params.ratio,
        -linear_to_db(min_gain)
    );

    match params.presence {
        Some(band) if band.gain_db != 0.0 => {
            apply_spectral_filter(&compressed, &SpectralFilterParams::new(vec![band]))
        }
        _ => Ok(compressed),
    }
}

/// Compressor as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    params: CompressorParams,
}

impl Compressor {
    pub fn new(params: CompressorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }
}

impl Stage for Compressor {
    impl_stage_common!("compressor", "Compressor");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        compress(buffer, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::util::rms;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    /// Quiet first half, loud second half
    fn two_level_signal(sample_rate: u32) -> AudioBuffer {
        let n = sample_rate as usize;
        let samples = (0..n)
            .map(|i| {
                let amp = if i < n / 2 { 0.05 } else { 0.9 };
                amp * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        AudioBuffer::from_mono(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_compressor_default_params() {
        let params = CompressorParams::default();
        assert_eq!(params.threshold_db, -18.0);
        assert_eq!(params.ratio, 4.0);
        assert_eq!(params.knee_db, 3.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parameter_validation() {
        let mut params = CompressorParams::default();

        params.ratio = 0.5;
        assert!(params.validate().is_err());
        params.ratio = f32::NAN;
        assert!(params.validate().is_err());
        params.ratio = 4.0;

        params.threshold_db = 6.0;
        assert!(params.validate().is_err());
        params.threshold_db = -18.0;

        params.attack_ms = 0.0;
        assert!(params.validate().is_err());
        params.attack_ms = 10.0;

        params.release_ms = f32::INFINITY;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_soft_knee_regions() {
        let threshold = db_to_linear(-18.0);
        let knee = db_to_linear(3.0);

        assert_eq!(soft_knee_gain(threshold / knee * 0.99, threshold, 4.0, knee), 1.0);
        assert!(soft_knee_gain(threshold, threshold, 4.0, knee) < 1.0);

        // Above the knee: 4:1 at 12 dB over threshold gives 9 dB reduction
        let env = threshold * db_to_linear(12.0);
        assert_abs_diff_eq!(
            linear_to_db(soft_knee_gain(env, threshold, 4.0, knee)),
            -9.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_hard_knee() {
        let threshold = db_to_linear(-12.0);
        assert_eq!(soft_knee_gain(threshold * 0.999, threshold, 4.0, 1.0), 1.0);
        assert!(soft_knee_gain(threshold * 2.0, threshold, 4.0, 1.0) < 1.0);
    }

    #[test_case(-40.0, 1.0, 50.0; "deep threshold")]
    #[test_case(-18.0, 10.0, 80.0; "default threshold")]
    #[test_case(0.0, 0.1, 1000.0; "zero threshold")]
    fn test_ratio_one_is_identity(threshold_db: f32, attack_ms: f32, release_ms: f32) {
        let input = two_level_signal(44100);
        let params = CompressorParams {
            threshold_db,
            ratio: 1.0,
            attack_ms,
            release_ms,
            ..Default::default()
        };
        let output = compress(&input, &params).unwrap();
        for (a, b) in input.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_ratio_one_gain_rule_is_unity() {
        let threshold = db_to_linear(-30.0);
        let knee = db_to_linear(3.0);
        for env in [0.0, threshold, threshold * 1.2, 0.5, 1.0, 4.0] {
            assert_eq!(soft_knee_gain(env, threshold, 1.0, knee), 1.0);
        }
    }

    #[test]
    fn test_compression_reduces_loud_section() {
        let input = two_level_signal(44100);
        let params = CompressorParams {
            presence: None,
            ..Default::default()
        };
        let output = compress(&input, &params).unwrap();

        let quiet_in = rms(&input.channel(0)[2000..20000]);
        let quiet_out = rms(&output.channel(0)[2000..20000]);
        let loud_in = rms(&input.channel(0)[30000..44000]);
        let loud_out = rms(&output.channel(0)[30000..44000]);

        // Quiet part sits below threshold and is untouched
        assert_abs_diff_eq!(quiet_in, quiet_out, epsilon = 1e-4);
        // Loud part is pulled down by several dB
        assert!(linear_to_db(loud_out / loud_in) < -3.0);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_presence_keeps_peak() {
        let input = two_level_signal(44100);
        let without = compress(&input, &CompressorParams { presence: None, ..Default::default() }).unwrap();
        let with = compress(&input, &CompressorParams::default()).unwrap();
        assert_abs_diff_eq!(with.peak(), without.peak(), epsilon = 1e-4);
    }

    #[test]
    fn test_silence_passthrough() {
        let silent = AudioBuffer::from_mono(vec![0.0; 4410], 44100).unwrap();
        let output = compress(&silent, &CompressorParams::default()).unwrap();
        assert_eq!(output, silent);
    }

    #[test]
    fn test_stage_interface() {
        let stage = Compressor::default();
        assert_eq!(stage.stage_type(), "compressor");
        assert_eq!(stage.get_params()["ratio"].as_f64(), Some(4.0));
    }
}
