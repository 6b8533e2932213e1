//! Vocal mastering pipeline
//!
//! Stages run in a fixed order:
//! 1. Trailing-silence trim (optional)
//! 2. High-pass
//! 3. EQ
//! 4. Saturation (optional)
//! 5. Compressor
//! 6. De-esser
//! 7. Limiter
//! 8. Normalize (peak target, capped at the limiter ceiling, minus headroom)
//!
//! Every stage output is checked for NaN/Inf before it is handed on.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::compressor::{Compressor, CompressorParams};
use super::deesser::{Deesser, DeesserParams};
use super::limiter::{Limiter, LimiterParams};
use super::normalize::{Normalize, NormalizeParams};
use super::saturation::{Saturation, SaturationParams};
use super::spectral::{vocal_eq_bands, FilterBand, SpectralFilter, SpectralFilterParams};
use super::trim::{Trim, TrimParams};
use crate::dsp::Stage;
use crate::engine::{calculate_peak, calculate_rms, AudioBuffer};
use crate::error::{MasterError, Result};

// ============================================================================
// Presets
// ============================================================================

/// Named parameter bundles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Clean,
    Warm,
    Bright,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Clean, Preset::Warm, Preset::Bright];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Clean => "clean",
            Preset::Warm => "warm",
            Preset::Bright => "bright",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::Clean => "Standard vocal curve, gentle 3:1 compression",
            Preset::Warm => "Extra low-mid body, softer top, light saturation",
            Preset::Bright => "More air and presence, tighter high-pass, firmer de-essing",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "clean" => Ok(Preset::Clean),
            "warm" => Ok(Preset::Warm),
            "bright" => Ok(Preset::Bright),
            other => Err(MasterError::invalid_param(
                "preset",
                other,
                "one of clean, warm, bright",
            )),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameters for every stage of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteringParams {
    /// Trailing-silence trim; `None` keeps the clip length
    pub trim: Option<TrimParams>,
    /// High-pass cutoff in Hz
    pub high_pass_hz: f32,
    pub eq: SpectralFilterParams,
    /// Soft-clip; `None` skips the stage
    pub saturation: Option<SaturationParams>,
    pub compressor: CompressorParams,
    pub deesser: DeesserParams,
    pub limiter: LimiterParams,
    pub normalize: NormalizeParams,
}

impl Default for MasteringParams {
    fn default() -> Self {
        Self::from_preset(Preset::Clean)
    }
}

impl MasteringParams {
    /// Build the full parameter set for a preset
    pub fn from_preset(preset: Preset) -> Self {
        let base = Self {
            trim: None,
            high_pass_hz: 100.0,
            eq: SpectralFilterParams::new(vocal_eq_bands()),
            saturation: None,
            compressor: CompressorParams {
                threshold_db: -18.0,
                ratio: 3.0,
                attack_ms: 10.0,
                release_ms: 80.0,
                ..Default::default()
            },
            deesser: DeesserParams::default(),
            limiter: LimiterParams::default(),
            normalize: NormalizeParams::default(),
        };

        match preset {
            Preset::Clean => base,
            Preset::Warm => {
                let mut bands = vocal_eq_bands();
                bands.push(FilterBand::bell(150.0, 1.0, 1.5));
                bands.push(FilterBand::bell(8000.0, -1.0, 2.0));
                Self {
                    high_pass_hz: 80.0,
                    eq: SpectralFilterParams::new(bands),
                    saturation: Some(SaturationParams::new(1.02)),
                    compressor: CompressorParams {
                        ratio: 4.0,
                        ..base.compressor.clone()
                    },
                    ..base
                }
            }
            Preset::Bright => {
                let mut bands = vocal_eq_bands();
                bands.push(FilterBand::bell(8000.0, 1.5, 2.0));
                bands.push(FilterBand::bell(2500.0, 1.0, 1.5));
                Self {
                    high_pass_hz: 120.0,
                    eq: SpectralFilterParams::new(bands),
                    saturation: Some(SaturationParams::new(1.01)),
                    compressor: CompressorParams {
                        threshold_db: -20.0,
                        ratio: 4.0,
                        attack_ms: 5.0,
                        release_ms: 50.0,
                        ..base.compressor.clone()
                    },
                    deesser: DeesserParams {
                        freq_start_hz: 5000.0,
                        freq_end_hz: 10000.0,
                        threshold_db: -28.0,
                        reduction_db: -5.0,
                        ..base.deesser.clone()
                    },
                    ..base
                }
            }
        }
    }

    /// Load a parameter set from JSON
    ///
    /// Top-level fields missing from the document keep their clean-preset
    /// values; missing fields inside a stage object take that stage's defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MasterError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    /// Validate every stage's parameters
    pub fn validate(&self) -> Result<()> {
        if let Some(trim) = &self.trim {
            trim.validate()?;
        }
        FilterBand::high_pass(self.high_pass_hz).validate()?;
        self.eq.validate()?;
        if let Some(saturation) = &self.saturation {
            saturation.validate()?;
        }
        self.compressor.validate()?;
        self.deesser.validate()?;
        self.limiter.validate()?;
        self.normalize.validate()
    }
}

// ============================================================================
// Report
// ============================================================================

/// Levels after one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub peak_db: f32,
    pub rms_db: f32,
}

impl StageReport {
    fn measure(stage: &str, buffer: &AudioBuffer) -> Self {
        Self {
            stage: stage.to_string(),
            peak_db: calculate_peak(buffer),
            rms_db: calculate_rms(buffer),
        }
    }
}

/// Summary of one mastering run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringReport {
    pub sample_rate: u32,
    pub channels: usize,
    pub input_samples: usize,
    pub output_samples: usize,
    pub input: StageReport,
    pub stages: Vec<StageReport>,
}

impl MasteringReport {
    /// Peak of the final stage (the input peak if no stage ran)
    pub fn output_peak_db(&self) -> f32 {
        self.stages.last().unwrap_or(&self.input).peak_db
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered list of stages built from [`MasteringParams`]
pub struct MasteringChain {
    stages: Vec<Box<dyn Stage>>,
}

impl MasteringChain {
    /// Build the chain, validating every parameter first
    pub fn from_params(params: &MasteringParams) -> Result<Self> {
        params.validate()?;

        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(8);
        if let Some(trim) = params.trim {
            stages.push(Box::new(Trim::new(trim)));
        }
        stages.push(Box::new(SpectralFilter::high_pass(params.high_pass_hz)));
        stages.push(Box::new(
            SpectralFilter::eq(params.eq.bands.clone()).with_window(params.eq.window),
        ));
        if let Some(saturation) = params.saturation {
            stages.push(Box::new(Saturation::new(saturation)));
        }
        stages.push(Box::new(Compressor::new(params.compressor.clone())));
        stages.push(Box::new(Deesser::new(params.deesser.clone())));
        stages.push(Box::new(Limiter::new(params.limiter.clone())));

        // The final peak must not land above the limiter ceiling
        let target_db = params.normalize.target_db.min(params.limiter.ceiling_db);
        if target_db < params.normalize.target_db {
            debug!(
                "normalize target {:.2} dB capped to limiter ceiling {:.2} dB",
                params.normalize.target_db, params.limiter.ceiling_db
            );
        }
        stages.push(Box::new(Normalize::new(NormalizeParams {
            target_db,
            ..params.normalize
        })));

        Ok(Self { stages })
    }

    /// Empty chain
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage to the end of the chain
    pub fn add(&mut self, stage: Box<dyn Stage>) {
        debug!("Adding stage {} to chain", stage.display_name());
        self.stages.push(stage);
    }

    /// Stage identifiers in processing order
    pub fn stage_types(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.stage_type()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterate over stages
    pub fn iter(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    /// Run the chain
    pub fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        self.process_with_report(buffer).map(|(output, _)| output)
    }

    /// Run the chain and collect per-stage levels
    pub fn process_with_report(&self, buffer: &AudioBuffer) -> Result<(AudioBuffer, MasteringReport)> {
        if buffer.is_empty() {
            return Err(MasterError::EmptyAudio);
        }
        if buffer.is_silent() {
            warn!("input is silent; every stage will pass it through unchanged");
        }

        let mut report = MasteringReport {
            sample_rate: buffer.sample_rate(),
            channels: buffer.num_channels(),
            input_samples: buffer.len(),
            output_samples: buffer.len(),
            input: StageReport::measure("input", buffer),
            stages: Vec::with_capacity(self.stages.len()),
        };

        let mut current = buffer.clone();
        for stage in &self.stages {
            let output = stage.process(&current)?;
            if !output.is_finite() {
                return Err(MasterError::DspOverflow {
                    stage: stage.stage_type().to_string(),
                });
            }

            let levels = StageReport::measure(stage.stage_type(), &output);
            debug!(
                "{}: peak {:.2} dBFS, rms {:.2} dBFS",
                stage.display_name(),
                levels.peak_db,
                levels.rms_db
            );
            report.stages.push(levels);
            current = output;
        }

        report.output_samples = current.len();
        info!(
            "Mastered {:.2}s of {}-channel audio at {} Hz through {} stages (peak {:.2} dBFS)",
            current.duration_secs(),
            current.num_channels(),
            current.sample_rate(),
            self.stages.len(),
            report.output_peak_db()
        );

        Ok((current, report))
    }
}

impl Default for MasteringChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Master one vocal clip
pub fn master_vocal(buffer: &AudioBuffer, params: &MasteringParams) -> Result<AudioBuffer> {
    MasteringChain::from_params(params)?.process(buffer)
}

/// Master one vocal clip and report the level after every stage
pub fn master_vocal_with_report(
    buffer: &AudioBuffer,
    params: &MasteringParams,
) -> Result<(AudioBuffer, MasteringReport)> {
    MasteringChain::from_params(params)?.process_with_report(buffer)
}
