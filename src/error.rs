//! Error handling for Vocalmaster
//!
//! Parameter and buffer errors are raised before any processing starts.
//! Silent input is not an error: stages pass it through unchanged.

use thiserror::Error;

/// Result type alias for Vocalmaster operations
pub type Result<T> = std::result::Result<T, MasterError>;

/// Main error type for Vocalmaster operations
#[derive(Error, Debug)]
pub enum MasterError {
    // Input Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Invalid sample rate: {sample_rate} Hz")]
    InvalidSampleRate { sample_rate: u32 },

    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Processing Errors
    #[error("Processing error: {reason}")]
    ProcessingError { reason: String },

    #[error("DSP overflow: stage '{stage}' produced invalid audio (NaN/Inf)")]
    DspOverflow { stage: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("WAV codec error: {0}")]
    Wav(#[from] hound::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MasterError {
    /// Shorthand for an out-of-range parameter
    pub fn invalid_param(param: &str, value: impl ToString, expected: &str) -> Self {
        MasterError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MasterError::InvalidParameter { .. } => "INVALID_PARAMETER",
            MasterError::InvalidSampleRate { .. } => "INVALID_SAMPLE_RATE",
            MasterError::InvalidAudio { .. } => "INVALID_AUDIO",
            MasterError::EmptyAudio => "EMPTY_AUDIO",
            MasterError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MasterError::ProcessingError { .. } => "PROCESSING_ERROR",
            MasterError::DspOverflow { .. } => "DSP_OVERFLOW",
            MasterError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MasterError::Wav(_) => "WAV_ERROR",
            MasterError::Io(_) => "IO_ERROR",
            MasterError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller can fix this by changing its input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MasterError::InvalidParameter { .. }
                | MasterError::InvalidSampleRate { .. }
                | MasterError::InvalidAudio { .. }
                | MasterError::EmptyAudio
                | MasterError::UnsupportedFormat { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MasterError::InvalidParameter { .. } => vec![
                "Check the parameter against its documented range",
                "Start from a preset and override only the values you need",
            ],
            MasterError::InvalidSampleRate { .. } => {
                vec!["Decode the audio with its real sample rate (e.g. 44100 or 48000)"]
            }
            MasterError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "The file may be corrupted - try re-exporting from source",
            ],
            MasterError::EmptyAudio => vec!["Provide a clip with at least one sample"],
            MasterError::UnsupportedFormat { .. } => vec![
                "Convert to mono or stereo WAV",
                "Supported bit depths: 16/24-bit integer, 32-bit float",
            ],
            MasterError::DspOverflow { .. } => vec![
                "The stage settings may be too extreme",
                "Try a preset instead of custom parameters",
            ],
            MasterError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            _ => vec![],
        }
    }
}
