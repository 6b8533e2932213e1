//! Final loudness normalization
//!
//! Scales the whole clip (all channels by the same factor) so its peak sits
//! at `target_db - headroom_db` dBFS.

use log::debug;
use serde::{Deserialize, Serialize};

use super::util::{db_to_linear, linear_to_db};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

/// Normalization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    /// Peak target in dBFS before headroom
    pub target_db: f32,
    /// Extra reduction below the target
    pub headroom_db: f32,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            target_db: -1.0,
            headroom_db: 0.8,
        }
    }
}

impl NormalizeParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.target_db.is_finite() || self.target_db > 0.0 {
            return Err(MasterError::invalid_param("target_db", self.target_db, "<= 0 dBFS"));
        }
        if !self.headroom_db.is_finite() || !(0.0..=24.0).contains(&self.headroom_db) {
            return Err(MasterError::invalid_param(
                "headroom_db",
                self.headroom_db,
                "0 to 24 dB",
            ));
        }
        Ok(())
    }

    /// Output peak in linear terms
    pub fn output_peak(&self) -> f32 {
        db_to_linear(self.target_db - self.headroom_db)
    }
}

/// Normalize `buffer` to the target peak
pub fn normalize(buffer: &AudioBuffer, params: &NormalizeParams) -> Result<AudioBuffer> {
    params.validate()?;

    let peak = buffer.peak();
    if peak == 0.0 {
        return Ok(buffer.clone());
    }

    let gain = params.output_peak() / peak;
    debug!(
        "normalize: peak {:.2} dBFS, gain {:+.2} dB",
        linear_to_db(peak),
        linear_to_db(gain)
    );
    buffer.map_channels(|channel| Ok(channel.iter().map(|s| s * gain).collect()))
}

/// Normalization as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Normalize {
    params: NormalizeParams,
}

impl Normalize {
    pub fn new(params: NormalizeParams) -> Self {
        Self { params }
    }
}

impl Stage for Normalize {
    impl_stage_common!("normalize", "Normalize");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        normalize(buffer, &self.params)
    }
}
