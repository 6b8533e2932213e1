//! Spectral Filter Stage
//!
//! High-pass, low-pass, bell and shelf filtering by gain shaping the FFT of
//! the whole clip. Each channel is transformed once per pass:
//!
//! 1. cut pass: bins outside the pass band of any high/low-pass band are
//!    zeroed (no peak renormalization, so stop-band energy stays removed);
//! 2. shaping pass: bell and shelf gains multiply into one curve, the result
//!    is renormalized to the peak it had before shaping.
//!
//! The bell is a Gaussian approximation of a parametric EQ bell. It is not
//! phase-accurate, which is acceptable for off-line processing of full clips.

use log::debug;
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use super::util::{hann_window, peak};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};

/// Band shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    /// Zero every bin below the cutoff
    HighPass,
    /// Zero every bin above the cutoff
    LowPass,
    /// Gaussian boost/cut around the center frequency
    Bell,
    /// Full gain below the corner, Gaussian roll-off above it
    LowShelf,
    /// Full gain above the corner, Gaussian roll-off below it
    HighShelf,
}

impl BandKind {
    /// Whether this kind removes bins outright
    pub fn is_cut(&self) -> bool {
        matches!(self, BandKind::HighPass | BandKind::LowPass)
    }
}

/// One band of a spectral filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBand {
    pub kind: BandKind,
    /// Cutoff (pass filters) or center/corner frequency in Hz
    pub frequency_hz: f32,
    /// Gain in dB; ignored by pass filters
    #[serde(default)]
    pub gain_db: f32,
    /// Quality factor; bandwidth = frequency / Q
    #[serde(default = "default_q")]
    pub q: f32,
}

fn default_q() -> f32 {
    1.0
}

impl FilterBand {
    pub fn high_pass(cutoff_hz: f32) -> Self {
        Self {
            kind: BandKind::HighPass,
            frequency_hz: cutoff_hz,
            gain_db: 0.0,
            q: default_q(),
        }
    }

    pub fn low_pass(cutoff_hz: f32) -> Self {
        Self {
            kind: BandKind::LowPass,
            frequency_hz: cutoff_hz,
            gain_db: 0.0,
            q: default_q(),
        }
    }

    pub fn bell(center_hz: f32, gain_db: f32, q: f32) -> Self {
        Self {
            kind: BandKind::Bell,
            frequency_hz: center_hz,
            gain_db,
            q,
        }
    }

    pub fn low_shelf(corner_hz: f32, gain_db: f32, q: f32) -> Self {
        Self {
            kind: BandKind::LowShelf,
            frequency_hz: corner_hz,
            gain_db,
            q,
        }
    }

    pub fn high_shelf(corner_hz: f32, gain_db: f32, q: f32) -> Self {
        Self {
            kind: BandKind::HighShelf,
            frequency_hz: corner_hz,
            gain_db,
            q,
        }
    }

    /// Validate the band
    pub fn validate(&self) -> Result<()> {
        if !self.frequency_hz.is_finite() || self.frequency_hz < 0.0 {
            return Err(MasterError::invalid_param(
                "frequency_hz",
                self.frequency_hz,
                "a finite frequency >= 0 Hz",
            ));
        }
        if !self.kind.is_cut() {
            if !self.gain_db.is_finite() || self.gain_db.abs() > 48.0 {
                return Err(MasterError::invalid_param(
                    "gain_db",
                    self.gain_db,
                    "-48 to +48 dB",
                ));
            }
            if !self.q.is_finite() || self.q <= 0.0 {
                return Err(MasterError::invalid_param("q", self.q, "a finite Q > 0"));
            }
            if self.frequency_hz == 0.0 {
                return Err(MasterError::invalid_param(
                    "frequency_hz",
                    self.frequency_hz,
                    "a center frequency > 0 Hz",
                ));
            }
        }
        Ok(())
    }

    /// Whether the band leaves every bin untouched
    fn is_neutral(&self) -> bool {
        !self.kind.is_cut() && self.gain_db == 0.0
    }

    /// Linear gain this band contributes at `freq`
    pub fn gain_at(&self, freq: f64) -> f64 {
        let center = self.frequency_hz as f64;
        match self.kind {
            BandKind::HighPass => {
                if freq < center {
                    0.0
                } else {
                    1.0
                }
            }
            BandKind::LowPass => {
                if freq > center {
                    0.0
                } else {
                    1.0
                }
            }
            BandKind::Bell => self.bell_at(freq),
            BandKind::LowShelf => {
                if freq <= center {
                    self.linear_gain()
                } else {
                    self.bell_at(freq)
                }
            }
            BandKind::HighShelf => {
                if freq >= center {
                    self.linear_gain()
                } else {
                    self.bell_at(freq)
                }
            }
        }
    }

    fn linear_gain(&self) -> f64 {
        10.0_f64.powf(self.gain_db as f64 / 20.0)
    }

    fn bell_at(&self, freq: f64) -> f64 {
        let center = self.frequency_hz as f64;
        let bandwidth = center / self.q as f64;
        let sigma = bandwidth / 2.0;
        let dist = freq - center;
        1.0 + (self.linear_gain() - 1.0) * (-(dist * dist) / (2.0 * sigma * sigma)).exp()
    }
}

/// When the clip is windowed before its FFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Hann window on the shaping pass only
    #[default]
    Auto,
    /// Never window
    None,
    /// Hann window on every pass
    Hann,
}

/// Parameters of one spectral filter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpectralFilterParams {
    /// Ordered band list
    pub bands: Vec<FilterBand>,
    pub window: WindowMode,
}

impl SpectralFilterParams {
    pub fn new(bands: Vec<FilterBand>) -> Self {
        Self {
            bands,
            window: WindowMode::Auto,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bands.iter().try_for_each(FilterBand::validate)
    }
}

/// The standard vocal EQ curve
///
/// warmth, mud, nasal, presence, air.
pub fn vocal_eq_bands() -> Vec<FilterBand> {
    vec![
        FilterBand::bell(150.0, 3.0, 1.5),
        FilterBand::bell(300.0, -2.0, 2.0),
        FilterBand::bell(500.0, -3.0, 2.0),
        FilterBand::bell(2500.0, 2.5, 1.5),
        FilterBand::bell(8000.0, 4.0, 2.0),
    ]
}

/// Per-bin gain curve for a real FFT of `n` samples at `sample_rate`
///
/// Cut bands are applied first; shaping bands multiply together.
pub fn gain_curve(bands: &[FilterBand], n: usize, sample_rate: u32) -> Vec<f64> {
    let num_bins = n / 2 + 1;
    let bin_hz = sample_rate as f64 / n.max(1) as f64;

    (0..num_bins)
        .map(|bin| {
            let freq = bin as f64 * bin_hz;
            bands.iter().map(|band| band.gain_at(freq)).product()
        })
        .collect()
}

/// Apply a spectral filter to every channel of `buffer`
///
/// Empty and silent channels are returned unchanged. When every band is
/// neutral (0 dB shaping, no cuts) the input is returned without an FFT.
pub fn apply_spectral_filter(
    buffer: &AudioBuffer,
    params: &SpectralFilterParams,
) -> Result<AudioBuffer> {
    params.validate()?;

    let cuts: Vec<FilterBand> = params.bands.iter().filter(|b| b.kind.is_cut()).copied().collect();
    let shaping: Vec<FilterBand> = params
        .bands
        .iter()
        .filter(|b| !b.kind.is_cut() && !b.is_neutral())
        .copied()
        .collect();

    if buffer.is_empty() || (cuts.is_empty() && shaping.is_empty()) {
        return Ok(buffer.clone());
    }

    let sample_rate = buffer.sample_rate();
    let mut planner = RealFftPlanner::<f64>::new();

    buffer.map_channels(|channel| {
        if peak(channel) == 0.0 {
            return Ok(channel.to_vec());
        }

        let mut samples = channel.to_vec();
        if !cuts.is_empty() {
            let windowed = params.window == WindowMode::Hann;
            samples = filter_pass(&mut planner, &samples, &cuts, sample_rate, windowed)?;
        }

        if !shaping.is_empty() {
            let reference_peak = peak(&samples);
            let windowed = params.window != WindowMode::None;
            let mut shaped = filter_pass(&mut planner, &samples, &shaping, sample_rate, windowed)?;

            // Bell overlap changes the overall level; restore the pre-shaping peak
            let shaped_peak = peak(&shaped);
            if shaped_peak > 0.0 && reference_peak > 0.0 {
                let factor = reference_peak / shaped_peak;
                shaped.iter_mut().for_each(|s| *s *= factor);
            }
            samples = shaped;
        }

        Ok(samples)
    })
}

/// Forward FFT, multiply by the band curve, inverse FFT
fn filter_pass(
    planner: &mut RealFftPlanner<f64>,
    samples: &[f32],
    bands: &[FilterBand],
    sample_rate: u32,
    windowed: bool,
) -> Result<Vec<f32>> {
    let n = samples.len();
    let mut time: Vec<f64> = if windowed {
        samples
            .iter()
            .zip(hann_window(n))
            .map(|(&s, w)| s as f64 * w)
            .collect()
    } else {
        samples.iter().map(|&s| s as f64).collect()
    };

    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f64>> = forward.make_output_vec();
    forward
        .process(&mut time, &mut spectrum)
        .map_err(|e| MasterError::ProcessingError {
            reason: format!("forward FFT failed: {}", e),
        })?;

    let curve = gain_curve(bands, n, sample_rate);
    for (bin, gain) in spectrum.iter_mut().zip(curve.iter()) {
        *bin *= *gain;
    }

    // The inverse real FFT requires purely real DC and Nyquist bins
    if let Some(dc) = spectrum.first_mut() {
        dc.im = 0.0;
    }
    if n % 2 == 0 {
        if let Some(nyquist) = spectrum.last_mut() {
            nyquist.im = 0.0;
        }
    }

    let mut output = inverse.make_output_vec();
    inverse
        .process(&mut spectrum, &mut output)
        .map_err(|e| MasterError::ProcessingError {
            reason: format!("inverse FFT failed: {}", e),
        })?;

    let scale = 1.0 / n as f64;
    debug!("spectral pass: {} samples, {} bands", n, bands.len());
    Ok(output.into_iter().map(|s| (s * scale) as f32).collect())
}

// ============================================================================
// Stage
// ============================================================================

/// Spectral filter as a chain stage
///
/// The mastering chain uses two of these: the high-pass and the EQ.
#[derive(Debug, Clone)]
pub struct SpectralFilter {
    stage_type: &'static str,
    display_name: &'static str,
    params: SpectralFilterParams,
}

impl SpectralFilter {
    pub fn new(params: SpectralFilterParams) -> Self {
        Self {
            stage_type: "spectral_filter",
            display_name: "Spectral Filter",
            params,
        }
    }

    /// Single high-pass band
    pub fn high_pass(cutoff_hz: f32) -> Self {
        Self {
            stage_type: "high_pass",
            display_name: "High-Pass",
            params: SpectralFilterParams::new(vec![FilterBand::high_pass(cutoff_hz)]),
        }
    }

    /// Multi-band EQ
    pub fn eq(bands: Vec<FilterBand>) -> Self {
        Self {
            stage_type: "eq",
            display_name: "EQ",
            params: SpectralFilterParams::new(bands),
        }
    }

    pub fn with_window(mut self, window: WindowMode) -> Self {
        self.params.window = window;
        self
    }

    pub fn params(&self) -> &SpectralFilterParams {
        &self.params
    }
}

impl Stage for SpectralFilter {
    fn stage_type(&self) -> &'static str {
        self.stage_type
    }

    fn display_name(&self) -> &'static str {
        self.display_name
    }

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        apply_spectral_filter(buffer, &self.params)
    }

    fn get_params(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::util::rms;
    use crate::engine::generate_test_tone;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bell_peak_and_tail() {
        let band = FilterBand::bell(1000.0, 6.0, 2.0);
        assert_abs_diff_eq!(band.gain_at(1000.0), 10.0_f64.powf(0.3), epsilon = 1e-9);
        assert_abs_diff_eq!(band.gain_at(10000.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_shelves() {
        let high = FilterBand::high_shelf(4000.0, -6.0, 4.0);
        assert_abs_diff_eq!(high.gain_at(12000.0), 10.0_f64.powf(-0.3), epsilon = 1e-9);
        assert_abs_diff_eq!(high.gain_at(20.0), 1.0, epsilon = 1e-3);

        let low = FilterBand::low_shelf(200.0, 3.0, 1.0);
        assert_abs_diff_eq!(low.gain_at(50.0), 10.0_f64.powf(0.15), epsilon = 1e-9);
    }

    #[test]
    fn test_gain_curve_high_pass_zeroes_before_bells() {
        let bands = vec![FilterBand::high_pass(100.0), FilterBand::bell(80.0, 12.0, 1.0)];
        let curve = gain_curve(&bands, 1000, 1000);
        // 1 Hz bins
        assert_eq!(curve[50], 0.0);
        assert!(curve[100] > 1.0);
        assert_eq!(curve.len(), 501);
    }

    #[test]
    fn test_neutral_bands_are_identity() {
        let tone = generate_test_tone(440.0, 0.5, 0.25, 44100).unwrap();
        let params = SpectralFilterParams::new(vec![
            FilterBand::bell(150.0, 0.0, 1.5),
            FilterBand::bell(8000.0, 0.0, 2.0),
        ]);
        let output = apply_spectral_filter(&tone, &params).unwrap();
        assert_eq!(output, tone);
    }

    #[test]
    fn test_high_pass_removes_low_tone() {
        // Whole cycles in one second keep each tone in a single bin
        let low = generate_test_tone(40.0, 0.8, 1.0, 44100).unwrap();
        let params = SpectralFilterParams::new(vec![FilterBand::high_pass(100.0)]);
        let output = apply_spectral_filter(&low, &params).unwrap();
        assert!(rms(output.channel(0)) < rms(low.channel(0)) * 0.01);
    }

    #[test]
    fn test_low_pass_removes_high_tone() {
        let low = generate_test_tone(200.0, 0.4, 1.0, 44100).unwrap();
        let high = generate_test_tone(3000.0, 0.4, 1.0, 44100).unwrap();
        let mixed: Vec<f32> = low
            .channel(0)
            .iter()
            .zip(high.channel(0))
            .map(|(a, b)| a + b)
            .collect();
        let mixed = AudioBuffer::from_mono(mixed, 44100).unwrap();

        let params = SpectralFilterParams::new(vec![FilterBand::low_pass(1000.0)]);
        let output = apply_spectral_filter(&mixed, &params).unwrap();
        for (a, b) in low.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_window_modes_on_shaping_pass() {
        let tone = generate_test_tone(1000.0, 0.5, 1.0, 44100).unwrap();
        let bands = vec![FilterBand::bell(1000.0, 6.0, 2.0)];

        // Unwindowed, a single-bin tone is only scaled, and the peak restore undoes that
        let params = SpectralFilterParams {
            bands: bands.clone(),
            window: WindowMode::None,
        };
        let output = apply_spectral_filter(&tone, &params).unwrap();
        for (a, b) in tone.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }

        // Auto and Hann both taper the clip edges
        for window in [WindowMode::Auto, WindowMode::Hann] {
            let params = SpectralFilterParams {
                bands: bands.clone(),
                window,
            };
            let output = apply_spectral_filter(&tone, &params).unwrap();
            assert!(tone.channel(0)[10].abs() > 0.3);
            assert!(output.channel(0)[10].abs() < 0.01, "{:?}", window);
        }
    }

    #[test]
    fn test_window_modes_on_cut_pass() {
        let tone = generate_test_tone(1000.0, 0.5, 1.0, 44100).unwrap();
        let bands = vec![FilterBand::high_pass(100.0)];
        let mid = 22061;

        // Auto leaves the cut pass unwindowed
        let auto = apply_spectral_filter(&tone, &SpectralFilterParams::new(bands.clone())).unwrap();
        assert_abs_diff_eq!(auto.channel(0)[10], tone.channel(0)[10], epsilon = 1e-4);

        let params = SpectralFilterParams {
            bands,
            window: WindowMode::Hann,
        };
        let hann = apply_spectral_filter(&tone, &params).unwrap();
        assert!(hann.channel(0)[10].abs() < 0.01);
        assert_abs_diff_eq!(hann.channel(0)[mid], tone.channel(0)[mid], epsilon = 1e-3);
    }

    #[test]
    fn test_eq_renormalizes_peak() {
        let tone = generate_test_tone(2500.0, 0.6, 0.5, 44100).unwrap();
        let params = SpectralFilterParams::new(vocal_eq_bands());
        let output = apply_spectral_filter(&tone, &params).unwrap();
        assert_eq!(output.len(), tone.len());
        assert_abs_diff_eq!(output.peak(), tone.peak(), epsilon = 1e-4);
    }

    #[test]
    fn test_odd_length_and_stereo() {
        let buffer = AudioBuffer::from_channels(
            vec![
                (0..1001).map(|i| ((i as f32) * 0.3).sin() * 0.5).collect(),
                vec![0.0; 1001],
            ],
            8000,
        )
        .unwrap();
        let params = SpectralFilterParams::new(vec![FilterBand::high_pass(50.0)]);
        let output = apply_spectral_filter(&buffer, &params).unwrap();
        assert_eq!(output.len(), 1001);
        assert_eq!(output.channel(1), buffer.channel(1));
    }

    #[test]
    fn test_rejects_invalid_bands() {
        let tone = generate_test_tone(440.0, 0.5, 0.1, 44100).unwrap();
        let negative = SpectralFilterParams::new(vec![FilterBand::high_pass(-10.0)]);
        assert!(apply_spectral_filter(&tone, &negative).is_err());

        let zero_q = SpectralFilterParams::new(vec![FilterBand::bell(1000.0, 3.0, 0.0)]);
        assert!(apply_spectral_filter(&tone, &zero_q).is_err());

        let nan_gain = SpectralFilterParams::new(vec![FilterBand::bell(1000.0, f32::NAN, 1.0)]);
        assert!(apply_spectral_filter(&tone, &nan_gain).is_err());
    }

    #[test]
    fn test_empty_buffer_returns_empty() {
        let empty = AudioBuffer::from_mono(Vec::new(), 44100).unwrap();
        let params = SpectralFilterParams::new(vec![FilterBand::high_pass(100.0)]);
        assert!(apply_spectral_filter(&empty, &params).unwrap().is_empty());
    }
}
