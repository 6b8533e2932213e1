//! Limiter Stage
//!
//! Look-ahead peak limiter with a neighbour-based true-peak estimate.
//!
//! The gain decision for sample `i` looks at the signal at `i + lookahead`
//! (the tail is zero-padded so timing is unchanged). Over the ceiling the
//! gain snaps down with a fast attack and never rests above the required
//! reduction. Under the ceiling it releases toward unity, faster when the
//! signal is quiet. The gain curve is smoothed and then capped per sample so
//! the output can never exceed the ceiling relative to the input peak.

use log::debug;
use serde::{Deserialize, Serialize};

use super::util::{db_to_linear, linear_to_db, moving_average, ms_to_samples, normalize_by_peak, time_to_coeff};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

/// Gain below which the quiet-section recovery is allowed to kick in
const RECOVERY_GAIN_LIMIT: f32 = 0.99;

/// Longest accepted look-ahead
const MAX_LOOKAHEAD_MS: f32 = 100.0;

/// Limiter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterParams {
    /// Ceiling relative to the clip peak (<= 0 dB)
    pub ceiling_db: f32,
    /// Look-ahead in milliseconds (at least one sample)
    pub lookahead_ms: f32,
    /// Attack time in milliseconds
    pub attack_ms: f32,
    /// Release time in milliseconds
    pub release_ms: f32,
    /// Recovery time used in quiet passages
    pub recovery_ms: f32,
    /// Level below `quiet_ratio * ceiling` counts as quiet
    pub quiet_ratio: f32,
    /// Moving-average length applied to the gain curve
    pub smoothing_ms: f32,
    /// Safety margin on the interpolated inter-sample estimate
    pub true_peak_margin: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            ceiling_db: -1.0,
            lookahead_ms: 1.5,
            attack_ms: 0.5,
            release_ms: 30.0,
            recovery_ms: 10.0,
            quiet_ratio: 0.3,
            smoothing_ms: 1.0,
            true_peak_margin: 0.1,
        }
    }
}

impl LimiterParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.ceiling_db.is_finite() || self.ceiling_db > 0.0 {
            return Err(MasterError::invalid_param("ceiling_db", self.ceiling_db, "<= 0 dB"));
        }
        if !self.lookahead_ms.is_finite() || !(0.0..=MAX_LOOKAHEAD_MS).contains(&self.lookahead_ms) {
            return Err(MasterError::invalid_param(
                "lookahead_ms",
                self.lookahead_ms,
                "0 to 100 ms",
            ));
        }
        for (name, value) in [
            ("attack_ms", self.attack_ms),
            ("release_ms", self.release_ms),
            ("recovery_ms", self.recovery_ms),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MasterError::invalid_param(name, value, "> 0 ms"));
            }
        }
        if !self.quiet_ratio.is_finite() || !(0.0..=1.0).contains(&self.quiet_ratio) {
            return Err(MasterError::invalid_param("quiet_ratio", self.quiet_ratio, "0.0 to 1.0"));
        }
        if !self.smoothing_ms.is_finite() || self.smoothing_ms < 0.0 {
            return Err(MasterError::invalid_param(
                "smoothing_ms",
                self.smoothing_ms,
                ">= 0 ms",
            ));
        }
        if !self.true_peak_margin.is_finite() || !(0.0..=1.0).contains(&self.true_peak_margin) {
            return Err(MasterError::invalid_param(
                "true_peak_margin",
                self.true_peak_margin,
                "0.0 to 1.0",
            ));
        }
        Ok(())
    }
}

/// Estimate the true peak around `idx`
///
/// The largest of the sample and its two neighbours, or their mean magnitude
/// scaled by `1 + margin` if that is larger. The first and last samples use
/// their own magnitude only.
pub fn estimate_true_peak(signal: &[f32], idx: usize, margin: f32) -> f32 {
    let Some(&last) = signal.last() else {
        return 0.0;
    };
    if idx == 0 {
        return signal[0].abs();
    }
    if idx >= signal.len() - 1 {
        return last.abs();
    }

    let (prev, cur, next) = (signal[idx - 1].abs(), signal[idx].abs(), signal[idx + 1].abs());
    let sample_peak = prev.max(cur).max(next);
    let inter_peak = (prev + cur + next) / 3.0 * (1.0 + margin);
    sample_peak.max(inter_peak)
}

/// Limit every channel of `buffer`
pub fn limit(buffer: &AudioBuffer, params: &LimiterParams) -> Result<AudioBuffer> {
    params.validate()?;

    if buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let sample_rate = buffer.sample_rate();
    let rate = sample_rate as f32;
    let ceiling = db_to_linear(params.ceiling_db);
    let quiet_threshold = ceiling * params.quiet_ratio;
    let attack_coeff = time_to_coeff(params.attack_ms, rate);
    let release_coeff = time_to_coeff(params.release_ms, rate);
    let recovery_coeff = time_to_coeff(params.recovery_ms, rate);
    // Anything past the clip end only ever sees zero padding
    let lookahead = ms_to_samples(params.lookahead_ms, sample_rate).min(buffer.len());
    let smoothing = ms_to_samples(params.smoothing_ms, sample_rate);

    let mut min_gain = 1.0_f32;
    let output = buffer.map_channels(|channel| {
        let (normalized, max_val) = normalize_by_peak(channel);
        if max_val == 0.0 {
            return Ok(channel.to_vec());
        }

        let mut padded = normalized.clone();
        padded.resize(normalized.len().saturating_add(lookahead), 0.0);

        let mut gain = 1.0_f32;
        let mut history = Vec::with_capacity(normalized.len());
        for i in 0..normalized.len() {
            let ahead = i + lookahead;
            let true_peak = estimate_true_peak(&padded, ahead, params.true_peak_margin);

            if true_peak > ceiling {
                let required = ceiling / true_peak;
                gain = attack_coeff * gain + (1.0 - attack_coeff) * required;
                gain = gain.min(required);
            } else if padded[ahead].abs() < quiet_threshold && gain < RECOVERY_GAIN_LIMIT {
                gain = recovery_coeff * gain + (1.0 - recovery_coeff);
            } else {
                gain = release_coeff * gain + (1.0 - release_coeff);
            }

            gain = gain.clamp(0.0, 1.0);
            history.push(gain);
        }

        let smoothed = moving_average(&history, smoothing);

        let limited = normalized
            .iter()
            .zip(smoothed)
            .map(|(&x, g)| {
                // Smoothing may lift the gain back above what a peak allows
                let level = x.abs();
                let g = if level * g > ceiling { ceiling / level } else { g };
                min_gain = min_gain.min(g);
                (x * g * max_val).clamp(-1.0, 1.0)
            })
            .collect();
        Ok(limited)
    })?;

    debug!(
        "limiter: ceiling {:.1} dB, lookahead {} samples, max reduction {:.2} dB",
        params.ceiling_db,
        lookahead,
        -linear_to_db(min_gain)
    );

    Ok(output)
}

/// Limiter as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Limiter {
    params: LimiterParams,
}

impl Limiter {
    pub fn new(params: LimiterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LimiterParams {
        &self.params
    }
}

impl Stage for Limiter {
    impl_stage_common!("limiter", "Limiter");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        limit(buffer, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;
    use test_case::test_case;

    const SR: u32 = 44100;

    /// Quiet 300 Hz bed with short loud transients every 100 ms
    fn transient_signal(peak: f32) -> AudioBuffer {
        let samples = (0..SR as usize)
            .map(|i| {
                let bed = 0.1 * (2.0 * PI * 300.0 * i as f32 / SR as f32).sin();
                let hit = if i % 4410 < 40 {
                    (2.0 * PI * 1000.0 * i as f32 / SR as f32).sin()
                } else {
                    0.0
                };
                peak * (bed + hit) / 1.1
            })
            .collect();
        AudioBuffer::from_mono(samples, SR).unwrap()
    }

    #[test]
    fn test_default_params() {
        let params = LimiterParams::default();
        assert_eq!(params.ceiling_db, -1.0);
        assert_eq!(params.lookahead_ms, 1.5);
        assert_eq!(params.quiet_ratio, 0.3);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_ceiling_above_zero_rejected() {
        let params = LimiterParams {
            ceiling_db: 0.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = LimiterParams {
            ceiling_db: f32::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_lookahead_bounds() {
        for lookahead_ms in [-1.0, 100.5, 1.0e6, f32::MAX, f32::INFINITY] {
            let params = LimiterParams {
                lookahead_ms,
                ..Default::default()
            };
            assert!(params.validate().is_err(), "{} accepted", lookahead_ms);
        }

        // Longest look-ahead on a clip much shorter than it
        let params = LimiterParams {
            lookahead_ms: MAX_LOOKAHEAD_MS,
            ..Default::default()
        };
        let input = AudioBuffer::from_mono(vec![0.2, 1.0, -0.8, 0.1], SR).unwrap();
        let output = limit(&input, &params).unwrap();
        assert_eq!(output.len(), 4);
        assert!(output.peak() <= db_to_linear(-1.0) * 1.00001);
    }

    #[test]
    fn test_true_peak_estimate() {
        let signal = [0.5, -0.9, 0.8, 0.8, 0.8, 0.1];
        assert_eq!(estimate_true_peak(&signal, 0, 0.1), 0.5);
        assert_eq!(estimate_true_peak(&signal, 5, 0.1), 0.1);
        assert_eq!(estimate_true_peak(&signal, 1, 0.1), 0.9);
        // Flat plateau: mean * 1.1 beats the sample peak
        assert_abs_diff_eq!(estimate_true_peak(&signal, 3, 0.1), 0.88, epsilon = 1e-6);
        assert_eq!(estimate_true_peak(&[], 0, 0.1), 0.0);
    }

    #[test_case(0.0; "0 dB")]
    #[test_case(-0.1; "minus 0.1 dB")]
    #[test_case(-1.0; "minus 1 dB")]
    #[test_case(-3.0; "minus 3 dB")]
    #[test_case(-6.0; "minus 6 dB")]
    #[test_case(-20.0; "minus 20 dB")]
    fn test_ceiling_invariant(ceiling_db: f32) {
        let input = transient_signal(0.95);
        let params = LimiterParams {
            ceiling_db,
            ..Default::default()
        };
        let output = limit(&input, &params).unwrap();

        let allowed = db_to_linear(ceiling_db) * input.peak() * (1.0 + 1e-5);
        assert!(output.peak() <= allowed, "{} > {}", output.peak(), allowed);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_ceiling_invariant_stereo() {
        let left: Vec<f32> = (0..4410).map(|i| if i % 100 == 0 { 1.0 } else { 0.2 }).collect();
        let right: Vec<f32> = left.iter().map(|s| -s * 0.5).collect();
        let input = AudioBuffer::from_channels(vec![left, right], SR).unwrap();
        let output = limit(&input, &LimiterParams::default()).unwrap();

        let ceiling = db_to_linear(-1.0);
        assert!(output.channel(0).iter().all(|s| s.abs() <= ceiling * 1.00001));
        assert!(output.channel(1).iter().all(|s| s.abs() <= ceiling * 0.5 * 1.00001));
    }

    #[test]
    fn test_quiet_passage_returns_to_unity() {
        let input = transient_signal(0.9);
        let output = limit(&input, &LimiterParams::default()).unwrap();

        // Between hits the bed is far below the ceiling and gain has recovered
        let range = 3000..4300;
        for (a, b) in input.channel(0)[range.clone()].iter().zip(&output.channel(0)[range]) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_silence_passthrough() {
        let silent = AudioBuffer::from_mono(vec![0.0; 1000], SR).unwrap();
        assert_eq!(limit(&silent, &LimiterParams::default()).unwrap(), silent);
    }
}
