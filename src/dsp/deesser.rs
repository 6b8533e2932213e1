//! De-esser Stage
//!
//! Short overlapping windows are band-passed in the frequency domain to
//! measure sibilance. When the detected level crosses the threshold, a gain
//! reduction is written over the window's samples. The smoothed gain curve
//! is applied to the full-band signal.

use std::ops::RangeInclusive;
use std::sync::Arc;

use log::debug;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use super::util::{db_to_linear, moving_average, ms_to_samples, normalize_by_peak, time_to_coeff};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

/// How quickly the reduction reaches `reduction_db` as the level rises over threshold
const REDUCTION_SLOPE: f32 = 0.6;

/// Detector weighting between band RMS and band peak
const RMS_WEIGHT: f32 = 0.6;
const PEAK_WEIGHT: f32 = 0.4;

/// De-esser parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeesserParams {
    /// Lower edge of the detection band in Hz
    pub freq_start_hz: f32,
    /// Upper edge of the detection band in Hz
    pub freq_end_hz: f32,
    /// Detection threshold relative to the clip peak
    pub threshold_db: f32,
    /// Gain reduction at full trigger (<= 0 dB)
    pub reduction_db: f32,
    /// Detector release time in milliseconds
    pub release_ms: f32,
    /// Analysis window length in milliseconds
    pub window_ms: f32,
    /// Hop = window / hop_divisor (4 gives 75% overlap)
    pub hop_divisor: usize,
    /// Moving-average length applied to the gain curve
    pub smoothing_ms: f32,
}

impl Default for DeesserParams {
    fn default() -> Self {
        Self {
            freq_start_hz: 6000.0,
            freq_end_hz: 9000.0,
            threshold_db: -25.0,
            reduction_db: -4.0,
            release_ms: 25.0,
            window_ms: 10.0,
            hop_divisor: 4,
            smoothing_ms: 1.0,
        }
    }
}

impl DeesserParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.freq_start_hz.is_finite() || self.freq_start_hz < 0.0 {
            return Err(MasterError::invalid_param(
                "freq_start_hz",
                self.freq_start_hz,
                ">= 0 Hz",
            ));
        }
        if !self.freq_end_hz.is_finite() || self.freq_end_hz <= self.freq_start_hz {
            return Err(MasterError::invalid_param(
                "freq_end_hz",
                self.freq_end_hz,
                "greater than freq_start_hz",
            ));
        }
        if !self.threshold_db.is_finite() || !(-96.0..=0.0).contains(&self.threshold_db) {
            return Err(MasterError::invalid_param(
                "threshold_db",
                self.threshold_db,
                "-96 to 0 dB",
            ));
        }
        if !self.reduction_db.is_finite() || !(-48.0..=0.0).contains(&self.reduction_db) {
            return Err(MasterError::invalid_param(
                "reduction_db",
                self.reduction_db,
                "-48 to 0 dB",
            ));
        }
        if !self.release_ms.is_finite() || self.release_ms <= 0.0 {
            return Err(MasterError::invalid_param("release_ms", self.release_ms, "> 0 ms"));
        }
        if !self.window_ms.is_finite() || self.window_ms <= 0.0 {
            return Err(MasterError::invalid_param("window_ms", self.window_ms, "> 0 ms"));
        }
        if self.hop_divisor == 0 {
            return Err(MasterError::invalid_param("hop_divisor", self.hop_divisor, ">= 1"));
        }
        if !self.smoothing_ms.is_finite() || self.smoothing_ms < 0.0 {
            return Err(MasterError::invalid_param(
                "smoothing_ms",
                self.smoothing_ms,
                ">= 0 ms",
            ));
        }
        Ok(())
    }
}

/// Window start positions: every hop, plus a final window flush with the end
fn window_starts(len: usize, window: usize, hop: usize) -> Vec<usize> {
    let last = len - window;
    let mut starts: Vec<usize> = (0..=last).step_by(hop).collect();
    if starts.last() != Some(&last) {
        starts.push(last);
    }
    starts
}

/// Band-limited detector over one window
struct BandDetector {
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    band_bins: RangeInclusive<usize>,
    window: usize,
}

impl BandDetector {
    fn new(window: usize, sample_rate: u32, params: &DeesserParams) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let bin_hz = sample_rate as f64 / window as f64;
        let first = (params.freq_start_hz as f64 / bin_hz).ceil() as usize;
        let last = (params.freq_end_hz as f64 / bin_hz).floor() as usize;

        Self {
            forward: planner.plan_fft_forward(window),
            inverse: planner.plan_fft_inverse(window),
            band_bins: first..=last,
            window,
        }
    }

    /// Combined RMS/peak level of the band-passed window
    fn level(&self, segment: &[f32]) -> Result<f32> {
        let mut time: Vec<f64> = segment.iter().map(|&s| s as f64).collect();
        let mut spectrum: Vec<Complex<f64>> = self.forward.make_output_vec();
        self.forward
            .process(&mut time, &mut spectrum)
            .map_err(|e| MasterError::ProcessingError {
                reason: format!("de-esser forward FFT failed: {}", e),
            })?;

        let nyquist = spectrum.len() - 1;
        for (k, bin) in spectrum.iter_mut().enumerate() {
            if !self.band_bins.contains(&k) {
                *bin = Complex::new(0.0, 0.0);
            } else if k == 0 || (k == nyquist && self.window % 2 == 0) {
                bin.im = 0.0;
            }
        }

        let mut band = self.inverse.make_output_vec();
        self.inverse
            .process(&mut spectrum, &mut band)
            .map_err(|e| MasterError::ProcessingError {
                reason: format!("de-esser inverse FFT failed: {}", e),
            })?;

        let scale = 1.0 / self.window as f64;
        let mut sum_sq = 0.0_f64;
        let mut band_peak = 0.0_f64;
        for s in &band {
            let v = s * scale;
            sum_sq += v * v;
            band_peak = band_peak.max(v.abs());
        }
        let band_rms = (sum_sq / self.window as f64).sqrt();

        Ok(RMS_WEIGHT * band_rms as f32 + PEAK_WEIGHT * band_peak as f32)
    }
}

/// De-ess every channel of `buffer`
pub fn deess(buffer: &AudioBuffer, params: &DeesserParams) -> Result<AudioBuffer> {
    params.validate()?;

    if buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let sample_rate = buffer.sample_rate();
    let len = buffer.len();
    let window = ms_to_samples(params.window_ms, sample_rate).min(len);
    let hop = (window / params.hop_divisor).max(1);
    let threshold_linear = db_to_linear(params.threshold_db);
    let reduction_linear = db_to_linear(params.reduction_db);
    // The detector updates once per hop
    let release_coeff = time_to_coeff(params.release_ms, sample_rate as f32 / hop as f32);
    let smoothing = ms_to_samples(params.smoothing_ms, sample_rate);

    let detector = BandDetector::new(window, sample_rate, params);
    let starts = window_starts(len, window, hop);

    let mut triggered = 0usize;
    let output = buffer.map_channels(|channel| {
        let (normalized, max_val) = normalize_by_peak(channel);
        if max_val == 0.0 {
            return Ok(channel.to_vec());
        }

        let mut gain = vec![1.0_f32; len];
        let mut detected = 0.0_f32;

        for &start in &starts {
            let level = detector.level(&normalized[start..start + window])?;

            detected = if level > detected {
                level
            } else {
                release_coeff * detected + (1.0 - release_coeff) * level
            };

            if detected > threshold_linear {
                let over = detected / threshold_linear;
                let amount = ((over - 1.0) * REDUCTION_SLOPE).min(1.0);
                let factor = 1.0 - (1.0 - reduction_linear) * amount;
                for g in &mut gain[start..start + window] {
                    *g = g.min(factor);
                }
                triggered += 1;
            }
        }

        let gain = moving_average(&gain, smoothing);
        Ok(channel.iter().zip(gain).map(|(&s, g)| s * g).collect())
    })?;

    debug!(
        "de-esser: {}-{} Hz, {} of {} windows triggered",
        params.freq_start_hz,
        params.freq_end_hz,
        triggered,
        starts.len() * buffer.num_channels()
    );

    Ok(output)
}

/// De-esser as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Deesser {
    params: DeesserParams,
}

impl Deesser {
    pub fn new(params: DeesserParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DeesserParams {
        &self.params
    }
}

impl Stage for Deesser {
    impl_stage_common!("deesser", "De-esser");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        deess(buffer, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::util::rms;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    const SR: u32 = 48000;

    fn sine(freq: f32, amp: f32, i: usize) -> f32 {
        amp * (2.0 * PI * freq * i as f32 / SR as f32).sin()
    }

    /// 200 Hz bed with an 8 kHz burst between 0.4 s and 0.6 s
    fn burst_signal() -> AudioBuffer {
        let samples = (0..SR as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let burst = if (0.4..0.6).contains(&t) { sine(8000.0, 0.6, i) } else { 0.0 };
                sine(200.0, 0.3, i) + burst
            })
            .collect();
        AudioBuffer::from_mono(samples, SR).unwrap()
    }

    #[test]
    fn test_default_params() {
        let params = DeesserParams::default();
        assert_eq!(params.freq_start_hz, 6000.0);
        assert_eq!(params.freq_end_hz, 9000.0);
        assert_eq!(params.threshold_db, -25.0);
        assert_eq!(params.reduction_db, -4.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_band_rejected() {
        let params = DeesserParams {
            freq_start_hz: 9000.0,
            freq_end_hz: 6000.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(MasterError::InvalidParameter { .. })
        ));

        let params = DeesserParams {
            reduction_db: 3.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_window_starts_cover_tail() {
        assert_eq!(window_starts(10, 4, 1), (0..=6).collect::<Vec<_>>());
        assert_eq!(window_starts(10, 4, 4), vec![0, 4, 6]);
        assert_eq!(window_starts(4, 4, 1), vec![0]);
    }

    #[test]
    fn test_below_threshold_unchanged() {
        // 480-sample windows hold exactly two cycles of 200 Hz: nothing leaks into 6-9 kHz
        let samples: Vec<f32> = (0..SR as usize).map(|i| sine(200.0, 0.5, i)).collect();
        let input = AudioBuffer::from_mono(samples, SR).unwrap();
        let output = deess(&input, &DeesserParams::default()).unwrap();

        for (a, b) in input.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_burst_is_reduced() {
        let input = burst_signal();
        let output = deess(&input, &DeesserParams::default()).unwrap();

        let burst = 21600..26400; // 0.45 s .. 0.55 s
        let rms_in = rms(&input.channel(0)[burst.clone()]);
        let rms_out = rms(&output.channel(0)[burst]);
        assert!(rms_out < rms_in * 0.8, "burst rms {} -> {}", rms_in, rms_out);

        // The bed well before the burst is untouched
        let bed = 4800..14400;
        assert_abs_diff_eq!(
            rms(&input.channel(0)[bed.clone()]),
            rms(&output.channel(0)[bed]),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_zero_reduction_is_identity() {
        let input = burst_signal();
        let params = DeesserParams {
            reduction_db: 0.0,
            ..Default::default()
        };
        let output = deess(&input, &params).unwrap();
        for (a, b) in input.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_short_clip_single_window() {
        let samples: Vec<f32> = (0..100).map(|i| sine(8000.0, 0.9, i)).collect();
        let input = AudioBuffer::from_mono(samples, SR).unwrap();
        let output = deess(&input, &DeesserParams::default()).unwrap();
        assert_eq!(output.len(), 100);
        assert!(output.peak() < input.peak());
    }

    #[test]
    fn test_silence_and_empty() {
        let silent = AudioBuffer::from_mono(vec![0.0; 2000], SR).unwrap();
        assert_eq!(deess(&silent, &DeesserParams::default()).unwrap(), silent);

        let empty = AudioBuffer::from_mono(Vec::new(), SR).unwrap();
        assert!(deess(&empty, &DeesserParams::default()).unwrap().is_empty());
    }
}
