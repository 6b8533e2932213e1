//! DSP Stages and Mastering Pipeline
//!
//! Every stage is a pure function over a complete clip and implements the
//! `Stage` trait so the pipeline can run them uniformly.

mod compressor;
mod deesser;
mod limiter;
mod normalize;
mod pipeline;
mod saturation;
mod spectral;
mod stage;
mod trim;
pub mod util;

pub use compressor::{compress, soft_knee_gain, Compressor, CompressorParams};
pub use deesser::{deess, Deesser, DeesserParams};
pub use limiter::{estimate_true_peak, limit, Limiter, LimiterParams};
pub use normalize::{normalize, Normalize, NormalizeParams};
pub use pipeline::{
    master_vocal, master_vocal_with_report, MasteringChain, MasteringParams, MasteringReport,
    Preset, StageReport,
};
pub use saturation::{saturate, Saturation, SaturationParams};
pub use spectral::{
    apply_spectral_filter, gain_curve, vocal_eq_bands, BandKind, FilterBand, SpectralFilter,
    SpectralFilterParams, WindowMode,
};
pub use stage::Stage;
pub use trim::{trim_trailing_silence, Trim, TrimParams};
