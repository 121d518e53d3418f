//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, upload limits, job retention, audio encoding
//! and external tools. Every section defaults sensibly so a completely empty
//! `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// File extensions (lowercase, without the dot) accepted for conversion.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv", "m4v"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub jobs: JobsConfig,
    pub audio: AudioConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidInput(format!("config parse error: {e}")))
    }

    /// Load and check configuration from a file.
    ///
    /// Unlike [`Config::load_or_default`], a missing or malformed file is an
    /// error here; this backs the `validate` CLI command.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Reject settings the service cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.uploads.max_files == 0 {
            return Err(Error::InvalidInput("uploads.max_files must be at least 1".into()));
        }
        if self.uploads.max_file_size_mb == 0 {
            return Err(Error::InvalidInput(
                "uploads.max_file_size_mb must be at least 1".into(),
            ));
        }
        if self.jobs.max_concurrent_conversions == 0 {
            return Err(Error::InvalidInput(
                "jobs.max_concurrent_conversions must be at least 1".into(),
            ));
        }
        if self.audio.bitrate.trim().is_empty() {
            return Err(Error::InvalidInput("audio.bitrate must not be empty".into()));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if let Some(ref dir) = self.server.static_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "server.static_dir {} does not exist; static files will not be served",
                    dir.display()
                ));
            }
        }

        if self.jobs.retention_secs == 0 {
            warnings.push(
                "jobs.retention_secs is 0; finished jobs are evicted on the next sweep".into(),
            );
        }

        if self.jobs.sweep_interval_secs == 0 {
            warnings.push("jobs.sweep_interval_secs is 0; defaulting to 1 second".into());
        }

        if let Some(ref dir) = self.uploads.scratch_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "uploads.scratch_dir {} does not exist; it will be created",
                    dir.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory with an upload UI build, served as a fallback.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
        }
    }
}

/// Limits applied to uploaded batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_files: usize,
    pub max_file_size_mb: u64,
    /// Parent directory for per-job scratch directories (system temp dir when unset).
    pub scratch_dir: Option<PathBuf>,
}

impl UploadConfig {
    /// Maximum size of a single upload in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Request body limit covering a full batch plus multipart framing.
    pub fn max_body_bytes(&self) -> usize {
        let total = self
            .max_file_size_bytes()
            .saturating_mul(self.max_files as u64)
            .saturating_add(1024 * 1024);
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_file_size_mb: 2048,
            scratch_dir: None,
        }
    }
}

/// Job execution and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// How long a finished job (and its archive) stays downloadable.
    pub retention_secs: u64,
    /// How often the retention sweeper runs.
    pub sweep_interval_secs: u64,
    /// Upper bound on simultaneously running ffmpeg processes.
    pub max_concurrent_conversions: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 60,
            max_concurrent_conversions: num_cpus::get().max(1),
        }
    }
}

/// MP3 encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target bitrate passed to the encoder (e.g. "192k").
    pub bitrate: String,
    /// Per-file conversion timeout.
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bitrate: "192k".into(),
            timeout_secs: 3600,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

/// Returns `true` when `name` ends in one of [`SUPPORTED_EXTENSIONS`]
/// (case-insensitive).
pub fn is_supported_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.server.static_dir.is_none());
        assert_eq!(cfg.uploads.max_files, 50);
        assert_eq!(cfg.uploads.max_file_size_mb, 2048);
        assert_eq!(cfg.jobs.retention_secs, 3600);
        assert!(cfg.jobs.max_concurrent_conversions >= 1);
        assert_eq!(cfg.audio.bitrate, "192k");
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn missing_static_dir_warns() {
        let mut cfg = Config::default();
        cfg.server.static_dir = Some(PathBuf::from("/definitely/not/here"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("static_dir")));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = Config::default();
        cfg.uploads.max_files = 0;
        assert!(cfg.check().is_err());

        let mut cfg = Config::default();
        cfg.jobs.max_concurrent_conversions = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"server": {"port": 9090}, "uploads": {"max_files": 3}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.uploads.max_files, 3);
        assert_eq!(cfg.uploads.max_file_size_mb, 2048);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.jobs.sweep_interval_secs, 60);
    }

    #[test]
    fn parse_invalid_json_is_error() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_or_default_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/mp3forge.json")));
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mp3forge.json");
        std::fs::write(&path, r#"{"audio": {"bitrate": "320k"}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.audio.bitrate, "320k");
    }

    #[test]
    fn body_limit_covers_batch() {
        let uploads = UploadConfig {
            max_files: 2,
            max_file_size_mb: 1,
            scratch_dir: None,
        };
        assert_eq!(uploads.max_file_size_bytes(), 1024 * 1024);
        assert_eq!(uploads.max_body_bytes(), 3 * 1024 * 1024);
    }

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported_file("clip.mp4"));
        assert!(is_supported_file("CLIP.MKV"));
        assert!(is_supported_file("dir/holiday.M4v"));
        assert!(!is_supported_file("notes.txt"));
        assert!(!is_supported_file("mp4"));
        assert!(!is_supported_file(""));
    }
}
