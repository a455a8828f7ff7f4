use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const TRIANGLE_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scenes": [{ "nodes": [0] }],
  "nodes": [{ "mesh": 0, "translation": [10.0, 0.0, 0.0] }],
  "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
  "buffers": [{
    "byteLength": 36,
    "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAQAAAAAAAAAAAAAAAAAAAgEAAAAAA"
  }],
  "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
  "accessors": [{
    "bufferView": 0,
    "componentType": 5126,
    "count": 3,
    "type": "VEC3",
    "min": [0.0, 0.0, 0.0],
    "max": [2.0, 4.0, 0.0]
  }]
}"#;

fn viewer() -> Command {
    let mut cmd = Command::cargo_bin("hero-viewer").expect("binary exists");
    cmd.arg("--summary-only");
    cmd
}

fn write_assets() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("triangle.gltf"), TRIANGLE_GLTF).expect("write model");

    let mut hdr = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 4\n".to_vec();
    for _ in 0..8 {
        hdr.extend_from_slice(&[128, 128, 128, 129]);
    }
    std::fs::write(dir.path().join("studio.hdr"), hdr).expect("write panorama");
    dir
}

#[test]
fn bare_configuration_shows_demo_cube() {
    viewer()
        .assert()
        .success()
        .stdout(contains("content: demo cube"))
        .stdout(contains("lighting: ambient + directional"))
        .stdout(contains("camera distance: 3.00"))
        .stdout(contains("auto-rotate: off"))
        .stdout(contains("drawing buffer: 1200x600"));
}

#[test]
fn unreachable_model_falls_back_to_cube() {
    let dir = tempfile::tempdir().expect("temp dir");
    viewer()
        .arg("--assets")
        .arg(dir.path())
        .args(["--model", "missing.glb", "--env", "missing.hdr"])
        .assert()
        .success()
        .stdout(contains("content: demo cube"))
        .stdout(contains("lighting: ambient + directional"))
        .stdout(contains("camera distance: 3.00"));
}

#[test]
fn model_and_environment_are_loaded_and_framed() {
    let dir = write_assets();
    viewer()
        .arg("--assets")
        .arg(dir.path())
        .args(["--model", "triangle.gltf", "--env", "studio.hdr"])
        .args(["--exposure", "1.3"])
        .assert()
        .success()
        .stdout(contains("content: model (1 mesh(es), 1 triangle(s))"))
        .stdout(contains("lighting: environment map (4x2)"))
        .stdout(contains("camera distance: 5.60"))
        .stdout(contains("exposure: 1.30"));
}

#[test]
fn flags_override_config_file() {
    let mut config = NamedTempFile::new().expect("temp config");
    writeln!(config, "autorotate = true\nspeed = 0.5\nexposure = 0.7").expect("write config");

    viewer()
        .arg("--config")
        .arg(config.path())
        .args(["--speed", "2"])
        .assert()
        .success()
        .stdout(contains("auto-rotate: on (speed 2.00)"))
        .stdout(contains("exposure: 0.70"));
}

#[test]
fn reduced_motion_turns_off_auto_rotation() {
    viewer()
        .args(["--autorotate", "--reduced-motion"])
        .assert()
        .success()
        .stdout(contains("auto-rotate: off"));
}

#[test]
fn unknown_arguments_are_rejected() {
    viewer()
        .arg("--fullscreen")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"));
}
