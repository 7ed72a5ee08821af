//! Reading rule manifests from TOML.
//!
//! Relative `target` paths in a manifest file are taken relative to the
//! directory holding the manifest, so a manifest can sit next to the
//! `auth.conf` it edits.

use crate::config::schema::RuleManifest;
use crate::rules::ValidationError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read rule manifest from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse rule manifest TOML{}: {source}", origin(.path))]
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },

    #[error("invalid rule manifest{}: {source}", origin(.path))]
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" ({})", path.display()))
        .unwrap_or_default()
}

impl ConfigError {
    /// The manifest file the error came from, if known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { path, .. } | ConfigError::Validation { path, .. } => {
                path.as_deref()
            }
        }
    }

    fn in_file(self, file: &Path) -> Self {
        let file = Some(file.to_path_buf());
        match self {
            ConfigError::Toml { source, .. } => ConfigError::Toml { path: file, source },
            ConfigError::Validation { source, .. } => ConfigError::Validation { path: file, source },
            io => io,
        }
    }
}

/// Parse and validate a manifest. Targets are kept as written.
pub fn load_from_str(input: &str) -> Result<RuleManifest, ConfigError> {
    let manifest: RuleManifest = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    manifest
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(manifest)
}

/// Read a manifest file and anchor its relative targets at the file's
/// directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuleManifest, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut manifest = load_from_str(&contents).map_err(|error| error.in_file(path))?;
    if let Some(base) = path.parent() {
        manifest.resolve_targets(base);
    }
    Ok(manifest)
}
