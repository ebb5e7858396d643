//! File system utils.

use std::path::Path;

use anyhow::Context;

pub struct FsHandler;

impl FsHandler {
    /// Create the module data directory if it doesn't exist.
    pub fn create_data_directory(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory {}", path.display()))?;
        tracing::debug!("Created data directory: {}", path.display());
        Ok(())
    }

    /// Write `contents` to `path`, replacing any previous file.
    pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> anyhow::Result<()> {
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::trace!(path = %path.display(), "File written");
        Ok(())
    }
}
