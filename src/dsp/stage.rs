//! Stage trait definition
//!
//! Every step of the mastering chain is a pure function from one complete
//! buffer to a new buffer of the same length and sample rate.

use serde_json::Value;

use crate::engine::AudioBuffer;
use crate::error::Result;

/// A single processing stage
///
/// Stages hold only their immutable parameters. `process` validates the
/// parameters against the buffer's sample rate before touching any sample
/// and never mutates its input.
pub trait Stage: Send + Sync {
    /// Stable identifier used in logs and reports (e.g. "compressor")
    fn stage_type(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Process a complete clip
    fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer>;

    /// Parameters as JSON (for reports and the CLI)
    fn get_params(&self) -> Value;
}

/// Implements the identity and parameter methods of [`Stage`] for a type
/// with a serializable `params` field.
#[macro_export]
macro_rules! impl_stage_common {
    ($stage_type:expr, $display_name:expr) => {
        fn stage_type(&self) -> &'static str {
            $stage_type
        }

        fn display_name(&self) -> &'static str {
            $display_name
        }

        fn get_params(&self) -> serde_json::Value {
            serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
        }
    };
}
