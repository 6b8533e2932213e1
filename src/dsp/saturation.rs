//! Saturation Stage
//!
//! Subtle soft-clip: `y = tanh(drive * x)` on the float signal. Drives just
//! above unity add a little harmonic density and round off the loudest
//! peaks without any level normalization.

use serde::{Deserialize, Serialize};

use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

// ============================================================================
// Constants
// ============================================================================

/// Minimum drive (1.0 = plain tanh)
const MIN_DRIVE: f32 = 1.0;

/// Maximum drive
const MAX_DRIVE: f32 = 10.0;

// ============================================================================
// Saturation
// ============================================================================

/// Saturation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationParams {
    /// Input gain into the tanh curve
    pub drive: f32,
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self { drive: 1.02 }
    }
}

impl SaturationParams {
    pub fn new(drive: f32) -> Self {
        Self { drive }
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.drive.is_finite() || !(MIN_DRIVE..=MAX_DRIVE).contains(&self.drive) {
            return Err(MasterError::invalid_param(
                "drive",
                self.drive,
                "1.0 to 10.0",
            ));
        }
        Ok(())
    }
}

/// Soft-clip a single sample
#[inline]
fn waveshape(x: f32, drive: f32) -> f32 {
    (x * drive).tanh()
}

/// Saturate every channel of `buffer`
pub fn saturate(buffer: &AudioBuffer, params: &SaturationParams) -> Result<AudioBuffer> {
    params.validate()?;
    buffer.map_channels(|channel| Ok(channel.iter().map(|&x| waveshape(x, params.drive)).collect()))
}

/// Saturation as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Saturation {
    params: SaturationParams,
}

impl Saturation {
    pub fn new(params: SaturationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SaturationParams {
        &self.params
    }
}

impl Stage for Saturation {
    impl_stage_common!("saturation", "Saturation");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        saturate(buffer, &self.params)
    }
}
