use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn bundled_shaders() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
}

fn heroglyph(dirs: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_heroglyph"))
        .env("HEROGLYPH_CONFIG_DIR", dirs.path().join("config"))
        .env("HEROGLYPH_DATA_DIR", dirs.path().join("data"))
        .env_remove("HEROGLYPH_CONFIG")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run heroglyph")
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect()
}

#[test]
fn headless_soak_reports_degrading_samples() {
    let dirs = TempDir::new().unwrap();
    let shaders = bundled_shaders();
    let output = heroglyph(
        &dirs,
        &[
            "--headless",
            "--frames",
            "120",
            "--fps",
            "20",
            "--seed",
            "9",
            "--stats-json",
            "--shaders",
            shaders.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    let qualities: Vec<f64> = lines
        .iter()
        .filter_map(|line| line.get("quality").and_then(Value::as_f64))
        .collect();
    assert!(qualities.len() >= 5);
    assert!((qualities[0] - 0.9).abs() < 1e-4);
    assert!(qualities.windows(2).all(|pair| pair[1] <= pair[0]));

    let summary = lines
        .iter()
        .find_map(|line| line.get("summary"))
        .expect("summary line");
    assert_eq!(summary["frames_rendered"], 120);
    assert_eq!(summary["particles"], 100);
}

#[test]
fn low_end_adapter_runs_reduced_scene() {
    let dirs = TempDir::new().unwrap();
    let shaders = bundled_shaders();
    let output = heroglyph(
        &dirs,
        &[
            "--headless",
            "--frames",
            "40",
            "--adapter",
            "llvmpipe (LLVM 17.0.6, 256 bits)",
            "--stats-json",
            "--shaders",
            shaders.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());
    let lines = json_lines(&output);
    let summary = lines
        .iter()
        .find_map(|line| line.get("summary"))
        .expect("summary line");
    assert_eq!(summary["low_end"], true);
    assert_eq!(summary["particles"], 50);
    assert_eq!(summary["bloom"], false);
}

#[test]
fn config_file_in_config_dir_is_used() {
    let dirs = TempDir::new().unwrap();
    let config_dir = dirs.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("hero.toml"),
        "version = 1\n[governor]\nlow_end_signatures = [\"Headless\"]\n",
    )
    .unwrap();

    let shaders = bundled_shaders();
    let output = heroglyph(
        &dirs,
        &[
            "--headless",
            "--frames",
            "10",
            "--stats-json",
            "--shaders",
            shaders.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());
    let lines = json_lines(&output);
    let summary = lines
        .iter()
        .find_map(|line| line.get("summary"))
        .expect("summary line");
    assert_eq!(summary["low_end"], true);
}

#[test]
fn missing_shader_directory_fails() {
    let dirs = TempDir::new().unwrap();
    let missing = dirs.path().join("no-shaders");
    let output = heroglyph(
        &dirs,
        &[
            "--headless",
            "--frames",
            "5",
            "--shaders",
            missing.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("static presentation"));
}

#[test]
fn invalid_config_is_rejected() {
    let dirs = TempDir::new().unwrap();
    let config = dirs.path().join("bad.toml");
    fs::write(&config, "version = 2\n").unwrap();
    let output = heroglyph(
        &dirs,
        &["--headless", "--config", config.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unsupported config version"));
}
