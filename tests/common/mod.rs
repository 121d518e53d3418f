//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] around a
//! [`FakeConverter`], with scratch space in a temporary directory. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mf_av::{ConversionError, MediaConverter, ToolRegistry};
use mf_core::config::Config;
use mf_server::context::AppContext;
use mf_server::router::build_router;

/// Converter that writes a small fake MP3 and fails for configured names.
#[derive(Debug, Clone, Default)]
pub struct FakeConverter {
    failing: HashSet<String>,
    delay: Duration,
}

impl FakeConverter {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MediaConverter for FakeConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(ConversionError::NoAudioTrack { file: name });
        }

        let mut data = b"ID3".to_vec();
        data.extend(tokio::fs::read(input).await?);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    scratch: tempfile::TempDir,
}

impl TestHarness {
    /// Create a harness with default configuration and a converter that
    /// always succeeds.
    pub fn new() -> Self {
        Self::with_config(Config::default(), FakeConverter::default())
    }

    /// Create a harness with a custom configuration and converter. Scratch
    /// directories go to a private temp dir.
    pub fn with_config(mut config: Config, converter: FakeConverter) -> Self {
        let scratch = tempfile::tempdir().expect("failed to create scratch dir");
        config.uploads.scratch_dir = Some(scratch.path().to_path_buf());
        let ctx = AppContext::new(config, Arc::new(converter), ToolRegistry::default());
        Self { ctx, scratch }
    }

    /// Number of job scratch directories currently on disk.
    pub fn scratch_dirs(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default(), FakeConverter::default()).await
    }

    /// Start an Axum server with custom config and converter on a random port.
    pub async fn with_server_config(config: Config, converter: FakeConverter) -> (Self, SocketAddr) {
        let harness = Self::with_config(config, converter);
        let app = build_router(harness.ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// POST the given files to `/convert` as a multipart form.
pub async fn submit(addr: SocketAddr, files: &[(&str, &str)]) -> reqwest::Response {
    let mut form = reqwest::multipart::Form::new();
    for (name, data) in files {
        form = form.part(
            "videos",
            reqwest::multipart::Part::bytes(data.as_bytes().to_vec()).file_name(name.to_string()),
        );
    }

    reqwest::Client::new()
        .post(format!("http://{addr}/convert"))
        .multipart(form)
        .send()
        .await
        .expect("submit request failed")
}

/// Submit files and return the new job id, asserting the batch was accepted.
pub async fn submit_ok(addr: SocketAddr, files: &[(&str, &str)]) -> String {
    let resp = submit(addr, files).await;
    assert_eq!(resp.status(), 202);
    let json: serde_json::Value = resp.json().await.unwrap();
    json["job_id"].as_str().expect("job_id in response").to_string()
}

/// Poll `/status/{id}` until the job is terminal and return the last body.
pub async fn wait_for_terminal(addr: SocketAddr, job_id: &str) -> serde_json::Value {
    let client = reqwest::Client::new();
    for _ in 0..500 {
        let json: serde_json::Value = client
            .get(format!("http://{addr}/status/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if matches!(
            json["status"].as_str(),
            Some("completed" | "failed_partial" | "failed_all")
        ) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish in time");
}

/// Read every entry of a ZIP archive as (name, contents).
pub fn zip_entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive.to_vec())).expect("valid zip");
    (0..zip.len())
        .map(|i| {
            let mut entry = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (entry.name().to_string(), data)
        })
        .collect()
}
