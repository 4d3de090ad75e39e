//! Integration tests for the isotile binary.
//!
//! Each test writes a config file and a small chunk directory into a
//! temporary directory and runs the real CLI against them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use isotile::coord::ChunkPos;
use isotile::source::FileChunkSource;
use tempfile::TempDir;

/// Writes a 4x4 block of chunks and a config rendering it to `out/`.
fn setup(root: &Path, workers: usize) -> PathBuf {
    let world = root.join("world");
    let chunks = FileChunkSource::new(&world);
    for x in 0..4 {
        for z in 0..4 {
            chunks
                .write_chunk(ChunkPos::new(x, z), &[x as u8, z as u8], 1_000)
                .unwrap();
        }
    }

    let config = root.join("config.ini");
    fs::write(
        &config,
        format!(
            "[render]\noutput_dir = {}\nlog_dir = {}\nworkers = {}\n\n[tileset.world]\nsource = {}\n",
            root.join("out").display(),
            root.join("logs").display(),
            workers,
            world.display()
        ),
    )
    .unwrap();
    config
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_isotile"))
        .args(args)
        .output()
        .expect("Failed to execute CLI command")
}

fn assert_success(output: &Output, context: &str) {
    if !output.status.success() {
        panic!(
            "{} failed:\nstdout: {}\nstderr: {}",
            context,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

#[test]
fn test_render_then_depth() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path(), 2);
    let config = config.to_str().unwrap();

    let output = run_cli(&["depth", "--config", config]);
    assert_success(&output, "depth before render");
    assert!(String::from_utf8_lossy(&output.stdout).contains("stored depth none"));

    let output = run_cli(&["render", "--config", config]);
    assert_success(&output, "render");
    assert!(temp.path().join("out/world/base.png").exists());
    assert!(temp.path().join("logs/isotile.log").exists());

    let output = run_cli(&["depth", "--config", config]);
    assert_success(&output, "depth after render");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("stored depth none"));
}

#[test]
fn test_serial_force_render() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path(), 0);
    let config = config.to_str().unwrap();

    assert_success(&run_cli(&["render", "--config", config]), "first render");
    let output = run_cli(&["render", "--config", config, "--force", "--workers", "0"]);
    assert_success(&output, "forced render");
    assert!(temp.path().join("out/world/base.png").exists());
}

#[test]
fn test_force_and_check_tiles_conflict() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path(), 0);

    let output = run_cli(&[
        "render",
        "--config",
        config.to_str().unwrap(),
        "--force",
        "--check-tiles",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_config_fails() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.ini");

    let output = run_cli(&["render", "--config", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file not found"));
}

#[test]
fn test_config_without_tilesets_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.ini");
    fs::write(&config, "[render]\nworkers = 1\n").unwrap();

    let output = run_cli(&["depth", "--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No tile-sets configured"));
}
