
use anyhow::Context;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Prefix for files that are still being written; keeps the extension so format detection still works
const STAGING_PREFIX: &str = ".partial-";

/// A set of output files that are written under temporary names and only moved into place together.
/// A failed run leaves no half-written outputs behind under the final names.
#[derive(Debug, Default)]
pub struct StagedOutputs {
    /// (staged path, final path) pairs in the order they were requested
    staged: Vec<(PathBuf, PathBuf)>
}

impl StagedOutputs {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a temporary path next to `final_path`; write the output there.
    /// # Arguments
    /// * `final_path` - where the file should end up once every output succeeded
    pub fn stage(&mut self, final_path: &Path) -> PathBuf {
        let file_name = final_path.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        let staged_path = final_path.with_file_name(format!("{STAGING_PREFIX}{file_name}"));
        self.staged.push((staged_path.clone(), final_path.to_path_buf()));
        staged_path
    }

    /// Moves every staged file to its final name
    /// # Errors
    /// * if a staged file is missing or cannot be renamed
    pub fn commit(self) -> anyhow::Result<()> {
        for (staged_path, final_path) in self.staged.iter() {
            debug!("Moving {staged_path:?} to {final_path:?}");
            std::fs::rename(staged_path, final_path)
                .with_context(|| format!("Error while moving {staged_path:?} to {final_path:?}:"))?;
        }
        Ok(())
    }

    /// Removes every staged file that was created
    pub fn discard(self) {
        for (staged_path, _) in self.staged.iter() {
            if staged_path.exists() {
                if let Err(e) = std::fs::remove_file(staged_path) {
                    warn!("Error while removing {staged_path:?}: {e}");
                }
            }
        }
    }
}
