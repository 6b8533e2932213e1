//! Trailing-silence trim
//!
//! The only step allowed to change the buffer length. It drops the tail after
//! the last sample above `threshold_db` (dBFS), keeping `keep_ms` of decay.
//! An entirely silent clip is returned unchanged.

use log::debug;
use serde::{Deserialize, Serialize};

use super::util::{db_to_linear, ms_to_samples};
use crate::dsp::Stage;
use crate::engine::AudioBuffer;
use crate::error::{MasterError, Result};
use crate::impl_stage_common;

/// Longest tail that may be kept after the last audible sample
const MAX_KEEP_MS: f32 = 10_000.0;

/// Trim parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimParams {
    /// Absolute level below which the tail counts as silence
    pub threshold_db: f32,
    /// Tail kept after the last audible sample
    pub keep_ms: f32,
}

impl Default for TrimParams {
    fn default() -> Self {
        Self {
            threshold_db: -60.0,
            keep_ms: 100.0,
        }
    }
}

impl TrimParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_db.is_finite() || self.threshold_db > 0.0 {
            return Err(MasterError::invalid_param(
                "threshold_db",
                self.threshold_db,
                "<= 0 dBFS",
            ));
        }
        if !self.keep_ms.is_finite() || !(0.0..=MAX_KEEP_MS).contains(&self.keep_ms) {
            return Err(MasterError::invalid_param("keep_ms", self.keep_ms, "0 to 10000 ms"));
        }
        Ok(())
    }
}

/// Remove trailing silence from `buffer`
pub fn trim_trailing_silence(buffer: &AudioBuffer, params: &TrimParams) -> Result<AudioBuffer> {
    params.validate()?;

    let threshold = db_to_linear(params.threshold_db);
    let last_audible = buffer
        .channels()
        .filter_map(|ch| ch.iter().rposition(|s| s.abs() > threshold))
        .max();

    let Some(last_audible) = last_audible else {
        return Ok(buffer.clone());
    };

    let keep = if params.keep_ms > 0.0 {
        ms_to_samples(params.keep_ms, buffer.sample_rate())
    } else {
        0
    };
    let new_len = last_audible.saturating_add(1).saturating_add(keep).min(buffer.len());
    if new_len == buffer.len() {
        return Ok(buffer.clone());
    }

    debug!("trim: {} -> {} samples", buffer.len(), new_len);
    buffer.with_channels(buffer.channels().map(|ch| ch[..new_len].to_vec()).collect())
}

/// Trim as a chain stage
#[derive(Debug, Clone, Default)]
pub struct Trim {
    params: TrimParams,
}

impl Trim {
    pub fn new(params: TrimParams) -> Self {
        Self { params }
    }
}

impl Stage for Trim {
    impl_stage_common!("trim", "Trailing Silence Trim");

    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        trim_trailing_silence(buffer, &self.params)
    }
}
