//! Shared fixtures for the end-to-end activity tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use etlrun_cloud::local::LocalStore;
use etlrun_cloud::{ArtifactStore, TransferError};
use etlrun_pipeline::config::{
    PROP_DAILY_OUTPUT_FILE, PROP_INPUT_CONTAINER, PROP_INPUT_FILES, PROP_MONTHLY_OUTPUT_FILE,
    PROP_OUTPUT_CONTAINER_PATH, PROP_SCRIPT_NAME,
};
use etlrun_pipeline::ActivityProperties;

pub const INPUT_CONTAINER: &str = "us-sales-kpi";
pub const RUNTIME_CONTAINER: &str = "rbinaries";
pub const RUNTIME_PACKAGE: &str = "R-3.3.3.zip";

/// Filesystem store that counts calls.
pub struct CountingStore {
    inner: LocalStore,
    fetches: AtomicUsize,
    publishes: AtomicUsize,
}

impl CountingStore {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalStore::new(root),
            fetches: AtomicUsize::new(0),
            publishes: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for CountingStore {
    async fn fetch(
        &self,
        container: &str,
        blob: &str,
        destination: &Path,
    ) -> Result<(), TransferError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(container, blob, destination).await
    }

    async fn publish(
        &self,
        container: &str,
        local_path: &Path,
        blob: &str,
    ) -> Result<(), TransferError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(container, local_path, blob).await
    }
}

/// Activation properties for the sales KPI job.
pub fn properties() -> ActivityProperties {
    [
        (PROP_INPUT_CONTAINER, INPUT_CONTAINER),
        (PROP_SCRIPT_NAME, "etl.R"),
        (PROP_INPUT_FILES, "orders.csv"),
        (PROP_OUTPUT_CONTAINER_PATH, "us-sales-kpi/output"),
        (PROP_DAILY_OUTPUT_FILE, "daily.txt"),
        (PROP_MONTHLY_OUTPUT_FILE, "monthly.txt"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Put `body` at `container/blob` under the store root.
pub fn put_blob(root: &Path, container: &str, blob: &str, body: &[u8]) {
    let path = root.join(container).join(blob);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

/// Put a runtime package holding only a README, i.e. no interpreter.
pub fn put_runtime_package_without_interpreter(root: &Path) {
    let path = root.join(RUNTIME_CONTAINER).join(RUNTIME_PACKAGE);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    zip.start_file("R-3.3.3/README", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"R runtime").unwrap();
    zip.finish().unwrap();
}

/// Symlink `/bin/sh` in as the interpreter; scripts are then shell scripts.
#[cfg(unix)]
pub fn install_shell_interpreter(interpreter: &Path) -> PathBuf {
    std::fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink("/bin/sh", interpreter).unwrap();
    interpreter.to_path_buf()
}
