//! Exit-status behaviour of the `ser` binary.

use ndarray::{ArrayD, IxDyn};
use speech_emotion::model::{reference_architecture, save_model};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

fn write_tone(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..11025 {
        let s = (i as f32 * 0.06).sin() * 6000.0;
        writer.write_sample(s as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Model with only the dense bias stored: loads through the fallback
fn write_model(dir: &Path) -> PathBuf {
    let path = dir.join("model.safetensors");
    let mut weights = BTreeMap::new();
    weights.insert(
        "dense_1/bias".to_string(),
        ArrayD::from_shape_vec(IxDyn(&[8]), vec![0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap(),
    );
    save_model(&path, &reference_architecture(), &weights).unwrap();
    path
}

fn ser(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ser"))
        .args(args)
        .env("HOME", home.path())
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn test_predict_single_file_json() {
    let dir = tempdir().unwrap();
    let model = write_model(dir.path());
    let wav = dir.path().join("clip.wav");
    write_tone(&wav);

    let out = ser(
        &dir,
        &["predict", wav.to_str().unwrap(), "-m", model.to_str().unwrap(), "--json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["pred_label"], "happy");
    assert_eq!(json["probs"].as_array().unwrap().len(), 8);
}

#[test]
fn test_batch_exit_status() {
    let dir = tempdir().unwrap();
    let model = write_model(dir.path());
    let clips = dir.path().join("clips");
    std::fs::create_dir(&clips).unwrap();
    write_tone(&clips.join("a.wav"));
    write_tone(&clips.join("b.wav"));
    std::fs::write(clips.join("c.wav"), b"not audio").unwrap();

    let lenient = ser(
        &dir,
        &["predict", "-d", clips.to_str().unwrap(), "-m", model.to_str().unwrap()],
    );
    assert!(lenient.status.success());
    let stdout = String::from_utf8_lossy(&lenient.stdout);
    assert!(stdout.contains("2 succeeded, 1 failed"), "{}", stdout);

    let strict = ser(
        &dir,
        &["predict", "-d", clips.to_str().unwrap(), "-m", model.to_str().unwrap(), "--strict"],
    );
    assert!(!strict.status.success());
}

#[test]
fn test_batch_without_successes_fails() {
    let dir = tempdir().unwrap();
    let model = write_model(dir.path());
    let clips = dir.path().join("clips");
    std::fs::create_dir(&clips).unwrap();
    std::fs::write(clips.join("bad.wav"), b"not audio").unwrap();

    let out = ser(
        &dir,
        &["predict", "-d", clips.to_str().unwrap(), "-m", model.to_str().unwrap()],
    );
    assert!(!out.status.success());
}

#[test]
fn test_missing_input_and_model() {
    let dir = tempdir().unwrap();
    let model = write_model(dir.path());

    let out = ser(&dir, &["predict", "/no/such.wav", "-m", model.to_str().unwrap()]);
    assert!(!out.status.success());

    let wav = dir.path().join("clip.wav");
    write_tone(&wav);
    let out = ser(&dir, &["predict", wav.to_str().unwrap(), "-m", "/no/such/model.safetensors"]);
    assert!(!out.status.success());
}

#[test]
fn test_info_reports_fallback() {
    let dir = tempdir().unwrap();
    let model = write_model(dir.path());

    let out = ser(&dir, &["info", "-m", model.to_str().unwrap()]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("(None, 40, 1)"), "{}", stdout);
    assert!(stdout.contains("reference architecture"), "{}", stdout);
}
