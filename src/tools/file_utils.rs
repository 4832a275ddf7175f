//! Path confinement and filesystem helpers shared by the file tools
//!
//! Every path a model hands to a file tool is relative to the session's
//! working directory and must stay inside it.

use crate::error::AgentLoopError;
use std::path::{Component, Path, PathBuf};

/// Confines model-supplied paths to a working directory
///
/// # Examples
///
/// ```
/// use agentloop::tools::file_utils::PathValidator;
/// use std::path::PathBuf;
///
/// let validator = PathValidator::new(PathBuf::from("/project"));
/// assert!(validator.resolve("demo/notes.txt").is_ok());
/// assert!(validator.resolve("../etc/passwd").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct PathValidator {
    working_dir: PathBuf,
}

impl PathValidator {
    /// Creates a validator rooted at `working_dir`
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }

    /// The directory every resolved path stays inside
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Resolves a relative path against the working directory
    ///
    /// # Errors
    ///
    /// Returns `AgentLoopError::PathOutsideWorkingDirectory` if the path is empty,
    /// absolute, starts with `~`, contains `..`, or resolves (through a symlink)
    /// outside the working directory.
    pub fn resolve(&self, target: &str) -> Result<PathBuf, AgentLoopError> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(AgentLoopError::PathOutsideWorkingDirectory(
                "Empty path".to_string(),
            ));
        }

        let path = Path::new(trimmed);
        if path.is_absolute() {
            return Err(AgentLoopError::PathOutsideWorkingDirectory(format!(
                "Absolute path not allowed: {}",
                trimmed
            )));
        }

        if trimmed.starts_with('~') {
            return Err(AgentLoopError::PathOutsideWorkingDirectory(format!(
                "Home directory paths not allowed: {}",
                trimmed
            )));
        }

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(AgentLoopError::PathOutsideWorkingDirectory(format!(
                "Parent directory traversal not allowed: {}",
                trimmed
            )));
        }

        let full_path = self.working_dir.join(path);
        let canonical_working = self
            .working_dir
            .canonicalize()
            .unwrap_or_else(|_| self.working_dir.clone());

        // The nearest existing ancestor is checked after following symlinks.
        let anchor = full_path
            .ancestors()
            .take_while(|p| p.starts_with(&self.working_dir))
            .find(|p| p.exists());

        if let Some(anchor) = anchor {
            let canonical = anchor.canonicalize()?;
            if !canonical.starts_with(&canonical_working) {
                return Err(AgentLoopError::PathOutsideWorkingDirectory(format!(
                    "Path escapes working directory: {}",
                    trimmed
                )));
            }
        }

        Ok(full_path)
    }
}

/// Ensures parent directories exist for a given path
///
/// # Errors
///
/// Returns `AgentLoopError::Io` if directory creation fails
pub async fn ensure_parent_dirs(path: &Path) -> Result<(), AgentLoopError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Checks that an existing file is no larger than `max_size` bytes
///
/// # Errors
///
/// Returns `AgentLoopError::Tool` when the file is too large, `AgentLoopError::Io`
/// when its metadata cannot be read.
pub async fn check_file_size(path: &Path, max_size: u64) -> Result<u64, AgentLoopError> {
    let size = tokio::fs::metadata(path).await?.len();
    if size > max_size {
        return Err(AgentLoopError::Tool(format!(
            "File size {} bytes exceeds maximum {} bytes",
            size, max_size
        )));
    }
    Ok(size)
}
