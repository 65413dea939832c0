//! Interpreter runtime provisioning.
//!
//! Provisioning is safe to repeat. Working directories are often reused
//! between runs, so finding the runtime already unpacked is the normal case
//! and not a conflict. Only a failed package download aborts the run; a
//! failed extraction or copy is logged and reported, and a runtime that is
//! really absent is caught by the runner as a missing interpreter.

use std::path::{Path, PathBuf};

use etlrun_cloud::{ArtifactStore, TransferError};
use etlrun_core::runtime::RuntimeLayout;
use serde::Serialize;

use crate::config::RuntimeSource;

/// What provisioning did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The package was unpacked into the working directory.
    Extracted { entries: usize },
    /// A local runtime directory was copied into the working directory.
    Copied { files: usize },
    /// The interpreter was already in place; nothing was unpacked.
    AlreadyPresent,
    /// Unpacking or copying failed. The run continues.
    ExtractionFailed { reason: String },
}

/// Make sure the runtime described by `layout` is available in `working_dir`.
pub async fn ensure_runtime(
    store: &dyn ArtifactStore,
    working_dir: &Path,
    source: &RuntimeSource,
    layout: &RuntimeLayout,
) -> Result<ProvisionOutcome, TransferError> {
    let outcome = match source {
        RuntimeSource::Package { container, package } => {
            provision_from_package(store, working_dir, container, package, layout).await?
        }
        RuntimeSource::Directory(dir) => provision_from_directory(dir, working_dir, layout).await,
    };

    if !layout.is_unpacked(working_dir) {
        tracing::warn!(
            interpreter = %layout.interpreter_path(working_dir).display(),
            "Interpreter not present after provisioning",
        );
    }

    Ok(outcome)
}

async fn provision_from_package(
    store: &dyn ArtifactStore,
    working_dir: &Path,
    container: &str,
    package: &str,
    layout: &RuntimeLayout,
) -> Result<ProvisionOutcome, TransferError> {
    tracing::info!(container, package, "Downloading runtime package");

    let archive = working_dir.join(package);
    store.fetch(container, package, &archive).await?;

    if layout.is_unpacked(working_dir) {
        tracing::info!(
            runtime = %layout.runtime_dir(working_dir).display(),
            "Runtime already unpacked, skipping extraction",
        );
        return Ok(ProvisionOutcome::AlreadyPresent);
    }

    let dest = working_dir.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extract_archive(&archive, &dest)).await;

    let outcome = match extracted {
        Ok(Ok(entries)) => {
            tracing::info!(package, entries, "Runtime package extracted");
            ProvisionOutcome::Extracted { entries }
        }
        Ok(Err(e)) => extraction_failed(package, e.to_string()),
        Err(e) => extraction_failed(package, e.to_string()),
    };
    Ok(outcome)
}

async fn provision_from_directory(
    source: &Path,
    working_dir: &Path,
    layout: &RuntimeLayout,
) -> ProvisionOutcome {
    if layout.is_unpacked(working_dir) {
        tracing::info!(
            runtime = %layout.runtime_dir(working_dir).display(),
            "Runtime already present, skipping copy",
        );
        return ProvisionOutcome::AlreadyPresent;
    }

    tracing::info!(source = %source.display(), "Copying runtime directory");

    let from = source.to_path_buf();
    let to = layout.runtime_dir(working_dir);
    let copied = tokio::task::spawn_blocking(move || copy_dir(&from, &to)).await;

    let label = source.display().to_string();
    match copied {
        Ok(Ok(files)) => {
            tracing::info!(source = %label, files, "Runtime directory copied");
            ProvisionOutcome::Copied { files }
        }
        Ok(Err(e)) => extraction_failed(&label, e.to_string()),
        Err(e) => extraction_failed(&label, e.to_string()),
    }
}

fn extraction_failed(what: &str, reason: String) -> ProvisionOutcome {
    tracing::warn!(source = what, reason = %reason, "Runtime provisioning failed, continuing");
    ProvisionOutcome::ExtractionFailed { reason }
}

/// Unpack `archive` into `dest`. Returns the number of archive entries.
fn extract_archive(archive: &Path, dest: &Path) -> zip::result::ZipResult<usize> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let entries = zip.len();
    zip.extract(dest)?;
    Ok(entries)
}

/// Recursively copy `from` into `to`. Files already present in `to` are
/// left alone. Returns the number of files copied.
fn copy_dir(from: &Path, to: &Path) -> std::io::Result<usize> {
    if !from.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("runtime directory {} does not exist", from.display()),
        ));
    }

    std::fs::create_dir_all(to)?;
    let mut copied = 0;
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src_dir, dst_dir)) = pending.pop() {
        for entry in std::fs::read_dir(&src_dir)? {
            let entry = entry?;
            let target = dst_dir.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                std::fs::create_dir_all(&target)?;
                pending.push((entry.path(), target));
            } else if !target.exists() {
                std::fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use etlrun_cloud::local::LocalStore;

    use super::*;

    const CONTAINER: &str = "rbinaries";
    const PACKAGE: &str = "R-test.zip";

    fn layout() -> RuntimeLayout {
        RuntimeLayout::new("R-test", "Rscript").unwrap()
    }

    fn package_source() -> RuntimeSource {
        RuntimeSource::Package {
            container: CONTAINER.into(),
            package: PACKAGE.into(),
        }
    }

    /// Store root holding a runtime zip with the interpreter and one library file.
    fn store_with_package() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(CONTAINER)).unwrap();
        let file = std::fs::File::create(root.path().join(CONTAINER).join(PACKAGE)).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("R-test/bin/x64/Rscript", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"interpreter").unwrap();
        zip.start_file(
            "R-test/library/base/DESCRIPTION",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(b"Package: base").unwrap();
        zip.finish().unwrap();
        root
    }

    #[tokio::test]
    async fn extracts_package_into_working_dir() {
        let root = store_with_package();
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());

        let outcome = ensure_runtime(&store, work.path(), &package_source(), &layout())
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::Extracted { entries: 2 });
        assert!(layout().is_unpacked(work.path()));
        assert!(work.path().join(PACKAGE).is_file());
    }

    #[tokio::test]
    async fn second_run_is_already_present() {
        let root = store_with_package();
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());

        ensure_runtime(&store, work.path(), &package_source(), &layout())
            .await
            .unwrap();
        let outcome = ensure_runtime(&store, work.path(), &package_source(), &layout())
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn corrupt_package_does_not_abort() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(CONTAINER)).unwrap();
        std::fs::write(root.path().join(CONTAINER).join(PACKAGE), b"not a zip").unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());

        let outcome = ensure_runtime(&store, work.path(), &package_source(), &layout())
            .await
            .unwrap();

        assert_matches!(outcome, ProvisionOutcome::ExtractionFailed { .. });
    }

    #[tokio::test]
    async fn missing_package_is_a_transfer_error() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());

        let result = ensure_runtime(&store, work.path(), &package_source(), &layout()).await;

        assert_matches!(result, Err(TransferError::NotFound { .. }));
    }

    #[tokio::test]
    async fn copies_runtime_directory() {
        let installed = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(installed.path().join("bin/x64")).unwrap();
        std::fs::write(installed.path().join("bin/x64/Rscript"), b"interpreter").unwrap();
        std::fs::write(installed.path().join("COPYING"), b"GPL").unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(work.path());
        let source = RuntimeSource::Directory(installed.path().to_path_buf());

        let outcome = ensure_runtime(&store, work.path(), &source, &layout())
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::Copied { files: 2 });
        assert!(layout().is_unpacked(work.path()));

        let again = ensure_runtime(&store, work.path(), &source, &layout())
            .await
            .unwrap();
        assert_eq!(again, ProvisionOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn missing_runtime_directory_does_not_abort() {
        let work = tempfile::tempdir().unwrap();
        let store = LocalStore::new(work.path());
        let source = RuntimeSource::Directory(work.path().join("no-such-runtime"));

        let outcome = ensure_runtime(&store, work.path(), &source, &layout())
            .await
            .unwrap();

        assert_matches!(outcome, ProvisionOutcome::ExtractionFailed { reason } if reason.contains("does not exist"));
    }
}
