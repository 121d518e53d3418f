//! CLI end-to-end tests for the mp3forge binary.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn mp3forge_cmd() -> Command {
    Command::cargo_bin("mp3forge").unwrap()
}

#[test]
fn no_args_shows_help() {
    mp3forge_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    mp3forge_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("check-tools"));
}

#[test]
fn version_command() {
    mp3forge_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mp3forge"));
}

#[test]
fn validate_defaults_without_file() {
    let dir = tempdir().unwrap();
    mp3forge_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn validate_good_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mp3forge.json");
    fs::write(&path, r#"{"server": {"port": 9000}, "audio": {"bitrate": "320k"}}"#).unwrap();

    mp3forge_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(":9000"))
        .stdout(predicate::str::contains("320k"));
}

#[test]
fn validate_invalid_json_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    mp3forge_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn explicit_missing_config_fails() {
    let dir = tempdir().unwrap();
    mp3forge_cmd()
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .arg("convert")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn convert_empty_folder() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), "not a video").unwrap();

    mp3forge_cmd()
        .current_dir(dir.path())
        .arg("convert")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No compatible video files found."));
}

#[test]
fn convert_missing_input_fails() {
    let dir = tempdir().unwrap();
    mp3forge_cmd()
        .current_dir(dir.path())
        .arg("convert")
        .arg(dir.path().join("missing.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input does not exist"));
}

#[test]
fn convert_requires_inputs() {
    mp3forge_cmd()
        .arg("convert")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[cfg(unix)]
mod with_fake_ffmpeg {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an ffmpeg stand-in that fails for inputs named `bad.*` and
    /// otherwise writes a tiny file to its last argument.
    fn fake_ffmpeg(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("ffmpeg");
        fs::write(
            &path,
            "#!/bin/sh\n\
             for a in \"$@\"; do out=\"$a\"; done\n\
             case \"$*\" in *bad.*) echo 'Stream map 0:a:0 matches no streams.' >&2; exit 1;; esac\n\
             printf ID3 > \"$out\"\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config_for(dir: &Path, ffmpeg: &Path) -> std::path::PathBuf {
        let config = dir.join("config.json");
        let json = serde_json::json!({ "tools": { "ffmpeg_path": ffmpeg } });
        fs::write(&config, json.to_string()).unwrap();
        config
    }

    #[test]
    fn converts_folder_into_output_dir() {
        let tools = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let out = tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tools.path());
        let config = config_for(tools.path(), &ffmpeg);
        fs::write(videos.path().join("a.mp4"), "v").unwrap();
        fs::write(videos.path().join("b.mkv"), "v").unwrap();

        mp3forge_cmd()
            .arg("--config")
            .arg(&config)
            .arg("convert")
            .arg(videos.path())
            .arg("-o")
            .arg(out.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Converting: a.mp4 → a.mp3"))
            .stdout(predicate::str::contains("Conversion completed! 2 file(s) converted."));

        assert!(out.path().join("a.mp3").exists());
        assert!(out.path().join("b.mp3").exists());
    }

    #[test]
    fn reports_failed_files() {
        let tools = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tools.path());
        let config = config_for(tools.path(), &ffmpeg);
        fs::write(videos.path().join("bad.mp4"), "v").unwrap();
        fs::write(videos.path().join("good.mp4"), "v").unwrap();

        mp3forge_cmd()
            .arg("--config")
            .arg(&config)
            .arg("convert")
            .arg(videos.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("Failed to convert bad.mp4"))
            .stdout(predicate::str::contains("has no audio track"))
            .stderr(predicate::str::contains("1 of 2 file(s) failed"));

        assert!(videos.path().join("good.mp3").exists());
        assert!(!videos.path().join("bad.mp3").exists());
    }
}
