//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use walkdir::WalkDir;

use crate::dsp::{MasteringChain, MasteringParams, MasteringReport, Preset};
use crate::engine::{
    calculate_clip_ratio, calculate_mean, calculate_peak, calculate_rms, export_audio,
    import_audio, SampleFormat,
};

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Resolve the parameter set: a JSON file wins over the preset
pub fn load_params(preset: Preset, params_path: Option<&Path>) -> Result<MasteringParams> {
    match params_path {
        Some(path) => MasteringParams::from_json_file(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display())),
        None => Ok(MasteringParams::from_preset(preset)),
    }
}

/// Master one file with an already-built chain
fn master_file(
    chain: &MasteringChain,
    input: &Path,
    output: &Path,
    format: SampleFormat,
) -> Result<MasteringReport> {
    let buffer = import_audio(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let (mastered, report) = chain
        .process_with_report(&buffer)
        .with_context(|| format!("Failed to master {}", input.display()))?;
    export_audio(&mastered, output, format)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(report)
}

fn print_report(report: &MasteringReport) {
    println!(
        "{:<12} {:>10} {:>10}",
        "stage", "peak dBFS", "rms dBFS"
    );
    println!("{:-<34}", "");
    for stage in std::iter::once(&report.input).chain(&report.stages) {
        println!("{:<12} {:>10.2} {:>10.2}", stage.stage, stage.peak_db, stage.rms_db);
    }
}

/// Master a single file.
pub fn master(
    input: &Path,
    output: &Path,
    preset: Preset,
    params_path: Option<&Path>,
    format: SampleFormat,
) -> Result<MasteringReport> {
    info!("Mastering {} -> {}", input.display(), output.display());

    let params = load_params(preset, params_path)?;
    let chain = MasteringChain::from_params(&params)?;
    let report = master_file(&chain, input, output, format)?;

    print_report(&report);
    println!("Written: {}", output.display());

    Ok(report)
}

/// Master every `.wav` file under `input_dir`, mirroring the tree into `output_dir`.
///
/// A file that fails is logged and skipped; the batch only fails as a whole
/// when nothing could be processed.
pub fn batch(
    input_dir: &Path,
    output_dir: &Path,
    preset: Preset,
    params_path: Option<&Path>,
    format: SampleFormat,
) -> Result<BatchSummary> {
    if !input_dir.is_dir() {
        bail!("Input directory not found: {}", input_dir.display());
    }

    let params = load_params(preset, params_path)?;
    let chain = MasteringChain::from_params(&params)?;
    let mut summary = BatchSummary::default();

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let input_root = input_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", input_dir.display()))?;
    let output_root = output_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", output_dir.display()))?;
    // Masters written into a nested output tree must not be picked up again
    let nested_output = output_root != input_root && output_root.starts_with(&input_root);

    let walker = WalkDir::new(&input_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(nested_output && e.path().starts_with(&output_root)));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to scan {}", input_dir.display()))?;
        let path = entry.path();
        let is_wav = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !is_wav {
            continue;
        }

        let relative = path.strip_prefix(&input_root).unwrap_or(path);
        let target = output_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        match master_file(&chain, path, &target, format) {
            Ok(report) => {
                info!(
                    "{} -> {} (peak {:.2} dBFS)",
                    path.display(),
                    target.display(),
                    report.output_peak_db()
                );
                summary.processed.push(target);
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                summary.failed.push((path.to_path_buf(), format!("{:#}", e)));
            }
        }
    }

    println!(
        "Batch complete: {} mastered, {} failed",
        summary.processed.len(),
        summary.failed.len()
    );
    for (path, reason) in &summary.failed {
        println!("  FAILED {}: {}", path.display(), reason);
    }

    if summary.processed.is_empty() && !summary.failed.is_empty() {
        bail!("No files could be mastered in {}", input_dir.display());
    }

    Ok(summary)
}

/// Print preset parameters as JSON.
pub fn presets(name: Option<Preset>) -> Result<()> {
    let selected: Vec<Preset> = match name {
        Some(preset) => vec![preset],
        None => Preset::ALL.to_vec(),
    };

    for preset in selected {
        let params = MasteringParams::from_preset(preset);
        println!("# {} - {}", preset, preset.description());
        println!("{}", serde_json::to_string_pretty(&params)?);
    }

    Ok(())
}

/// Print level analysis of a file.
pub fn analyze(path: &Path) -> Result<()> {
    let buffer = import_audio(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let validation = buffer.get_validation();

    println!("File:        {}", path.display());
    println!("Duration:    {:.3} s", buffer.duration_secs());
    println!("Sample rate: {} Hz", buffer.sample_rate());
    println!("Channels:    {}", buffer.num_channels());
    println!("Peak:        {:.2} dBFS", calculate_peak(&buffer));
    println!("RMS:         {:.2} dBFS", calculate_rms(&buffer));
    println!("DC offset:   {:.5}", calculate_mean(&buffer));
    println!("Clipped:     {:.3} %", calculate_clip_ratio(&buffer) * 100.0);

    if validation.is_valid() {
        println!("Validation:  ok");
    } else {
        println!("Validation:  {}", validation.failed_checks().join(", "));
    }

    Ok(())
}
