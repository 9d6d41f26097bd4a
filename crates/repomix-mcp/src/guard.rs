//! Path confinement for local pack targets.
//!
//! The server only packs directories under the directory it was launched
//! from. Symlinks are resolved before the check, so a link pointing outside
//! the root is rejected even when the link itself lives inside it.

use std::path::{Path, PathBuf};

/// Confines caller-supplied paths to a fixed root directory.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    root: PathBuf,
}

impl AccessGuard {
    /// Create a guard rooted at the given directory.
    ///
    /// The root is kept as given (for messages) and canonicalized on every
    /// check.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a guard rooted at the process working directory.
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Get the root path as configured.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether `candidate` resolves to a location inside the root.
    ///
    /// Relative paths are taken relative to the root. Anything that cannot be
    /// resolved (missing, permission denied, malformed) is denied.
    pub fn is_path_allowed(&self, candidate: impl AsRef<Path>) -> bool {
        match self.resolve(candidate.as_ref()) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::debug!(
                    path = %candidate.as_ref().display(),
                    error = %e,
                    "Path resolution failed, denying"
                );
                false
            }
        }
    }

    fn resolve(&self, candidate: &Path) -> std::io::Result<bool> {
        // Use dunce for clean canonical paths (no \\?\ on Windows)
        let canonical_root = dunce::canonicalize(&self.root)?;
        let canonical = dunce::canonicalize(self.root.join(candidate))?;

        // Component-wise, so a sibling like `project2` never matches `project`
        Ok(canonical.starts_with(&canonical_root))
    }
}
