#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use stem_shell_lib::error::ShellError;
use stem_shell_lib::probe::{MetadataProber, UNKNOWN};
use tempfile::TempDir;

/// Writes an executable shell script standing in for ffprobe.
fn fake_ffprobe(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffprobe");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn audio_file(dir: &Path) -> String {
    let path = dir.join("song.mp3");
    fs::write(&path, b"ID3").unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn reports_formatted_metadata() {
    let dir = TempDir::new().unwrap();
    let probe = fake_ffprobe(
        dir.path(),
        r#"echo '{"format": {"bit_rate": "256000", "sample_rate": "48000", "duration": "12.5"}}'"#,
    );

    let meta = MetadataProber::new(probe)
        .probe(&audio_file(dir.path()))
        .await
        .unwrap();

    assert_eq!(meta.bitrate, "256 kbps");
    assert_eq!(meta.sample_rate, "48000 Hz");
    assert_eq!(meta.duration, "12.50 s");
}

#[tokio::test]
async fn passes_the_expected_arguments() {
    let dir = TempDir::new().unwrap();
    let args_log = dir.path().join("args.txt");
    let probe = fake_ffprobe(
        dir.path(),
        &format!(
            "echo \"$@\" > '{}'\necho '{{\"format\": {{}}}}'",
            args_log.display()
        ),
    );
    let input = audio_file(dir.path());

    MetadataProber::new(probe).probe(&input).await.unwrap();

    let args = fs::read_to_string(&args_log).unwrap();
    assert_eq!(
        args.trim(),
        format!("-v quiet -print_format json -show_format {}", input)
    );
}

#[tokio::test]
async fn missing_fields_come_back_unknown() {
    let dir = TempDir::new().unwrap();
    let probe = fake_ffprobe(dir.path(), r#"echo '{"format": {"duration": "3.0"}}'"#);

    let meta = MetadataProber::new(probe)
        .probe(&audio_file(dir.path()))
        .await
        .unwrap();

    assert_eq!(meta.bitrate, UNKNOWN);
    assert_eq!(meta.sample_rate, UNKNOWN);
    assert_eq!(meta.duration, "3.00 s");
}

#[tokio::test]
async fn missing_file_fails_before_spawning() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let probe = fake_ffprobe(dir.path(), &format!("touch '{}'", marker.display()));
    let missing = dir.path().join("nope.mp3").display().to_string();

    let err = MetadataProber::new(probe).probe(&missing).await.unwrap_err();

    assert!(matches!(err, ShellError::FileNotFound(ref p) if *p == missing));
    assert!(!marker.exists());
}

#[tokio::test]
async fn nonzero_exit_reports_the_code() {
    let dir = TempDir::new().unwrap();
    let probe = fake_ffprobe(dir.path(), "exit 3");

    let err = MetadataProber::new(probe)
        .probe(&audio_file(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, ShellError::ProbeExit(3)));
    assert!(err.to_string().contains('3'));
}

#[tokio::test]
async fn malformed_output_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let probe = fake_ffprobe(dir.path(), "echo 'Invalid data found when processing input'");

    let err = MetadataProber::new(probe)
        .probe(&audio_file(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, ShellError::ProbeParse(_)));
}

#[tokio::test]
async fn missing_probe_binary_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();

    let err = MetadataProber::new(dir.path().join("no-such-ffprobe"))
        .probe(&audio_file(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, ShellError::ProbeSpawn(_)));
}
