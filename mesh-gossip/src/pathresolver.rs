// Copyright (c) 2024 Mesh Overlay Contributors

//! The `PathResolver` collaborator (§6): resolves a `FlacKey` to a
//! filesystem path, confined to a share root.

use std::path::{Path, PathBuf};

/// Resolves content keys to filesystem paths, confined to a share root.
/// Symlink-safe normalization and share-root confinement are the
/// implementation's responsibility.
pub trait PathResolver: Send + Sync {
    /// Resolve `flac_key` to a path under the share root, or `None` if
    /// unknown or outside the allowed area.
    fn resolve_path(&self, flac_key: &str) -> Option<PathBuf>;
}

/// A resolver confined to a single directory: keys are treated as
/// root-relative paths, canonicalized and checked to remain under `root`.
pub struct RootedPathResolver {
    root: PathBuf,
}

impl RootedPathResolver {
    /// Build a resolver confined to `root`. `root` itself is not
    /// canonicalized at construction time; confinement is checked per call
    /// against the canonicalized candidate so a root that does not yet
    /// exist on disk can still be configured.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathResolver for RootedPathResolver {
    fn resolve_path(&self, flac_key: &str) -> Option<PathBuf> {
        if flac_key.contains("..") || flac_key.starts_with('/') {
            return None;
        }
        let candidate = self.root.join(flac_key);
        let canonical_root = self.root.canonicalize().ok()?;
        let canonical_candidate = canonical_candidate_or_lexical(&candidate)?;
        if canonical_candidate.starts_with(&canonical_root) {
            Some(candidate)
        } else {
            None
        }
    }
}

fn canonical_candidate_or_lexical(candidate: &Path) -> Option<PathBuf> {
    candidate
        .canonicalize()
        .ok()
        .or_else(|| candidate.parent().and_then(|p| p.canonicalize().ok()))
}
