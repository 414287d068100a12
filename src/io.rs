use std::path::Path;

use miette::{Context, IntoDiagnostic, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::types::Container;

/// Make sure the directory exists and is empty.
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Removing the content of {}", dir.display());
        std::fs::remove_dir_all(dir)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not remove {}", dir.display()))?;
    }

    std::fs::create_dir_all(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not create {}", dir.display()))
}

/// Remove a file that may or may not exist, only logging failures.
pub fn remove_leftover(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            warn!("Could not remove leftover file {}: {err}", path.display());
        }
    }
}

/// Create a named temporary file in the directory and return its handle.
///
/// The file destructor will be called at the handle drop.
/// **As such, one must not simply get the file path and drop the handle.**
pub fn named_tempfile_in(dir: &Path, container: Container) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".clipreel-")
        .suffix(container.with_dot())
        .tempfile_in(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not create a temporary file in {}", dir.display()))
}
