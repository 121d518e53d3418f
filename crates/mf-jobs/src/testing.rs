//! Test doubles shared by the unit tests of this crate.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mf_av::{ConversionError, MediaConverter, ProgressFn};
use mf_core::JobId;

use crate::model::Job;
use crate::store::JobStore;

/// Converter that "encodes" by copying the input behind a fake header and
/// fails for configured file names. Reports 50% before its delay.
#[derive(Debug, Clone, Default)]
pub struct FakeConverter {
    failing: HashSet<String>,
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeConverter {
    pub fn failing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of conversions observed running at once.
    pub fn peak(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak)
    }
}

#[async_trait]
impl MediaConverter for FakeConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        self.convert_with_progress(input, output, &|_| {}).await
    }

    async fn convert_with_progress(
        &self,
        input: &Path,
        output: &Path,
        progress: &ProgressFn,
    ) -> Result<(), ConversionError> {
        progress(50);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(ConversionError::Failed {
                message: format!("fake failure for {name}"),
            });
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

/// Poll the store until the job reaches a terminal status.
pub async fn wait_for_terminal(store: &JobStore, id: JobId) -> Job {
    for _ in 0..500 {
        let job = store.get(id).expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish in time");
}
