//! CLI Command Tests
//!
//! Drive the command implementations against real WAV files on disk.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use vocalmaster::cli::commands;
use vocalmaster::dsp::util::db_to_linear;
use vocalmaster::dsp::Preset;
use vocalmaster::engine::{export_audio, generate_sweep, import_audio, SampleFormat};

fn write_sweep(path: &Path, duration_secs: f32) {
    let sweep = generate_sweep(60.0, 12000.0, 0.7, duration_secs, 44100).unwrap();
    export_audio(&sweep, path, SampleFormat::Int16).unwrap();
}

#[test]
fn test_master_writes_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("vocal.wav");
    let output = dir.path().join("vocal_master.wav");
    write_sweep(&input, 0.5);

    let report = commands::master(&input, &output, Preset::Warm, None, SampleFormat::Float32).unwrap();

    let mastered = import_audio(&output).unwrap();
    assert_eq!(mastered.len(), 22050);
    assert_eq!(mastered.sample_rate(), 44100);
    assert!(mastered.peak() <= db_to_linear(-1.0));
    assert_eq!(report.stages.len(), 7);
}

#[test]
fn test_master_with_params_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("vocal.wav");
    let output = dir.path().join("out.wav");
    let params = dir.path().join("params.json");
    write_sweep(&input, 0.25);
    fs::write(&params, r#"{"normalize": {"target_db": -3.0, "headroom_db": 1.0}}"#).unwrap();

    commands::master(&input, &output, Preset::Clean, Some(&params), SampleFormat::Float32).unwrap();

    let mastered = import_audio(&output).unwrap();
    assert!((mastered.peak() - db_to_linear(-4.0)).abs() < 1e-4);
}

#[test]
fn test_master_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let result = commands::master(
        &dir.path().join("missing.wav"),
        &dir.path().join("out.wav"),
        Preset::Clean,
        None,
        SampleFormat::Int16,
    );
    assert!(result.is_err());
}

#[test]
fn test_batch_mirrors_tree_and_skips_bad_files() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    fs::create_dir_all(input_dir.path().join("takes")).unwrap();
    write_sweep(&input_dir.path().join("lead.wav"), 0.25);
    write_sweep(&input_dir.path().join("takes").join("take2.WAV"), 0.25);
    fs::write(input_dir.path().join("notes.txt"), "not audio").unwrap();
    fs::write(input_dir.path().join("broken.wav"), b"RIFF garbage").unwrap();

    let summary = commands::batch(
        input_dir.path(),
        output_dir.path(),
        Preset::Bright,
        None,
        SampleFormat::Int16,
    )
    .unwrap();

    assert_eq!(summary.processed.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(output_dir.path().join("lead.wav").exists());
    assert!(output_dir.path().join("takes").join("take2.WAV").exists());
    assert!(!output_dir.path().join("notes.txt").exists());
}

#[test]
fn test_batch_skips_nested_output_dir() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = input_dir.path().join("mastered");
    write_sweep(&input_dir.path().join("lead.wav"), 0.25);

    let first = commands::batch(
        input_dir.path(),
        &output_dir,
        Preset::Clean,
        None,
        SampleFormat::Int16,
    )
    .unwrap();
    assert_eq!(first.processed.len(), 1);
    assert!(output_dir.join("lead.wav").exists());

    // The master from the first run sits under the input tree now
    let second = commands::batch(
        input_dir.path(),
        &output_dir,
        Preset::Clean,
        None,
        SampleFormat::Int16,
    )
    .unwrap();
    assert_eq!(second.processed.len(), 1);
    assert_eq!(second.failed.len(), 0);
    assert!(!output_dir.join("mastered").exists());
}

#[test]
fn test_batch_requires_directory() {
    let dir = TempDir::new().unwrap();
    let result = commands::batch(
        &dir.path().join("nope"),
        dir.path(),
        Preset::Clean,
        None,
        SampleFormat::Int16,
    );
    assert!(result.is_err());
}

#[test]
fn test_presets_and_analyze_succeed() {
    commands::presets(None).unwrap();
    commands::presets(Some(Preset::Warm)).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    write_sweep(&path, 0.1);
    commands::analyze(&path).unwrap();
}
