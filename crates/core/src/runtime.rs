//! Interpreter runtime layout conventions.
//!
//! The interpreter ships as a versioned archive that unpacks into a single
//! folder inside the working directory. The executable is always found at
//! `<working_dir>/<runtime_folder>/bin/x64/<interpreter_exe>`.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Container holding runtime packages.
pub const DEFAULT_RUNTIME_CONTAINER: &str = "rbinaries";

/// Runtime package blob name. The version is part of the file name.
pub const DEFAULT_RUNTIME_PACKAGE: &str = "R-3.3.3.zip";

/// Folder the runtime package unpacks into.
pub const DEFAULT_RUNTIME_FOLDER: &str = "R-3.3.3";

/// Interpreter executable name.
#[cfg(windows)]
pub const DEFAULT_INTERPRETER_EXE: &str = "Rscript.exe";

/// Interpreter executable name.
#[cfg(not(windows))]
pub const DEFAULT_INTERPRETER_EXE: &str = "Rscript";

/// Sub-path from the runtime folder to the directory holding the executable.
const BIN_SUBDIRS: &[&str] = &["bin", "x64"];

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where the interpreter lives once its runtime is unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    folder: String,
    interpreter_exe: String,
}

impl RuntimeLayout {
    /// Build a layout, rejecting names that would escape the working
    /// directory.
    pub fn new(
        folder: impl Into<String>,
        interpreter_exe: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let folder = folder.into();
        let interpreter_exe = interpreter_exe.into();
        validate_path_component(&folder, "runtime folder")?;
        validate_path_component(&interpreter_exe, "interpreter executable")?;
        Ok(Self {
            folder,
            interpreter_exe,
        })
    }

    /// Runtime folder name (e.g. `R-3.3.3`).
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Interpreter file name (e.g. `Rscript`).
    pub fn interpreter_exe(&self) -> &str {
        &self.interpreter_exe
    }

    /// Absolute location of the unpacked runtime.
    pub fn runtime_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.folder)
    }

    /// Absolute location of the interpreter executable.
    pub fn interpreter_path(&self, working_dir: &Path) -> PathBuf {
        let mut path = self.runtime_dir(working_dir);
        for sub in BIN_SUBDIRS {
            path.push(sub);
        }
        path.push(&self.interpreter_exe);
        path
    }

    /// Whether the interpreter is already present under `working_dir`.
    pub fn is_unpacked(&self, working_dir: &Path) -> bool {
        self.interpreter_path(working_dir).is_file()
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            folder: DEFAULT_RUNTIME_FOLDER.to_string(),
            interpreter_exe: DEFAULT_INTERPRETER_EXE.to_string(),
        }
    }
}

/// Ensure `value` is a single, non-empty path component.
fn validate_path_component(value: &str, what: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{what} must not be empty")));
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(CoreError::Validation(format!(
            "{what} '{value}' must be a single path component"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_path_follows_bin_x64_convention() {
        let layout = RuntimeLayout::new("R-3.3.3", "Rscript.exe").unwrap();
        let path = layout.interpreter_path(Path::new("/work"));
        assert_eq!(path, Path::new("/work/R-3.3.3/bin/x64/Rscript.exe"));
    }

    #[test]
    fn default_layout_uses_default_folder() {
        let layout = RuntimeLayout::default();
        assert_eq!(layout.folder(), DEFAULT_RUNTIME_FOLDER);
        assert_eq!(layout.interpreter_exe(), DEFAULT_INTERPRETER_EXE);
    }

    #[test]
    fn rejects_empty_and_nested_components() {
        assert!(RuntimeLayout::new("", "Rscript").is_err());
        assert!(RuntimeLayout::new("R-3.3.3", "  ").is_err());
        assert!(RuntimeLayout::new("../escape", "Rscript").is_err());
        assert!(RuntimeLayout::new("R-3.3.3", "bin/Rscript").is_err());
        assert!(RuntimeLayout::new("..", "Rscript").is_err());
    }

    #[test]
    fn is_unpacked_checks_for_interpreter_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new("R-test", "Rscript").unwrap();
        assert!(!layout.is_unpacked(dir.path()));

        let exe = layout.interpreter_path(dir.path());
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, b"").unwrap();
        assert!(layout.is_unpacked(dir.path()));
    }
}
