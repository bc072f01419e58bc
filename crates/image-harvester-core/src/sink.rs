//! Destinations for emitted files.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What the sink does when the target path is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Pick a free name by appending ` (n)` before the extension
    Uniquify,

    /// Replace the existing file
    Overwrite,
}

/// Identifier the sink hands back for a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkId(pub PathBuf);

/// Accepts finished files
pub trait Sink {
    fn store(
        &mut self,
        bytes: &[u8],
        relative_path: &Path,
        prompt_user: bool,
        policy: ConflictPolicy,
    ) -> Result<SinkId>;
}

/// Writes files below a root directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sink_error(path: &Path, reason: impl ToString) -> Error {
        Error::Sink {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl Sink for DirectorySink {
    fn store(
        &mut self,
        bytes: &[u8],
        relative_path: &Path,
        prompt_user: bool,
        policy: ConflictPolicy,
    ) -> Result<SinkId> {
        if relative_path.is_absolute()
            || relative_path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Self::sink_error(relative_path, "path escapes the sink root"));
        }

        if prompt_user {
            // No interactive chooser here; the configured root is used.
            warn!(
                "Save-location prompt requested for {}, writing below {}",
                relative_path.display(),
                self.root.display()
            );
        }

        let target = self.root.join(relative_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::sink_error(relative_path, e))?;
        }

        let target = match policy {
            ConflictPolicy::Overwrite => target,
            ConflictPolicy::Uniquify => uniquify(&target),
        };

        fs::write(&target, bytes).map_err(|e| Self::sink_error(&target, e))?;
        debug!("Stored {} bytes at {}", bytes.len(), target.display());

        Ok(SinkId(target))
    }
}

/// First free path among `name.ext`, `name (1).ext`, `name (2).ext`, ...
pub fn uniquify(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut n = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
