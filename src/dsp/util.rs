//! Signal utilities shared by the stages
//!
//! dB conversion, envelope coefficients, windowing, and the O(n) centered
//! window statistics used by the compressor, de-esser and limiter.

// ============================================================================
// Unit conversion
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// One-pole smoothing coefficient for a time constant
///
/// `rate` is the number of updates per second (the sample rate for
/// per-sample followers). A zero time gives an instant follower.
#[inline]
pub fn time_to_coeff(time_ms: f32, rate: f32) -> f32 {
    let updates = time_ms / 1000.0 * rate;
    if updates > 0.0 {
        (-1.0 / updates).exp()
    } else {
        0.0
    }
}

/// Number of samples covering `ms` milliseconds, at least one
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    ((sample_rate as f32 * ms / 1000.0) as usize).max(1)
}

// ============================================================================
// Level measurement
// ============================================================================

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Root-mean-square level (linear)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Scale a channel so its peak is 1.0
///
/// Returns the scaled copy and the original peak. A silent channel comes
/// back unchanged with a peak of 0.0.
pub fn normalize_by_peak(samples: &[f32]) -> (Vec<f32>, f32) {
    let max_val = peak(samples);
    if max_val > 0.0 {
        (samples.iter().map(|s| s / max_val).collect(), max_val)
    } else {
        (samples.to_vec(), 0.0)
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Symmetric Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Half-open range of the centered window of length `window` around `i`
#[inline]
fn centered_range(i: usize, window: usize, len: usize) -> (usize, usize) {
    let half = window / 2;
    let start = i.saturating_sub(half);
    let end = i.saturating_add(half).saturating_add(1).min(len);
    (start, end)
}

/// Centered moving average with a window of `window` samples
///
/// Edges use the truncated window. Windows of one sample or less return the
/// input unchanged.
pub fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0_f64);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }

    (0..values.len())
        .map(|i| {
            let (start, end) = centered_range(i, window, values.len());
            ((prefix[end] - prefix[start]) / (end - start) as f64) as f32
        })
        .collect()
}

/// Centered sliding RMS with a window of `window` samples
pub fn sliding_rms(samples: &[f32], window: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);

    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0_f64);
    for &s in samples {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + (s as f64) * (s as f64));
    }

    (0..samples.len())
        .map(|i| {
            let (start, end) = centered_range(i, window, samples.len());
            let mean_sq = (prefix[end] - prefix[start]) / (end - start) as f64;
            mean_sq.max(0.0).sqrt() as f32
        })
        .collect()
}
