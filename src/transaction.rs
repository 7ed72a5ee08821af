//! Load, edit and save one auth.conf file.
//!
//! ```text
//! Unloaded -> Loaded -> Modified -> Saved
//!                          |
//!                          +-----> RolledBack
//! ```
//!
//! Saving renders the document, re-parses the result, and only then replaces
//! the target through a temporary file in the same directory. A failed write
//! leaves the target as it was.

use crate::document::Document;
use crate::lens::{self, RenderError, SyntaxError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unloaded,
    Loaded,
    Modified,
    Saved,
    RolledBack,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Syntax { path: PathBuf, source: SyntaxError },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. } | LoadError::Syntax { path, .. } => path,
        }
    }
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("{} has not been loaded", path.display())]
    NotLoaded { path: PathBuf },

    #[error("cannot render {}: {source}", path.display())]
    Render { path: PathBuf, source: RenderError },

    #[error("rendered text for {} does not parse: {source}", path.display())]
    Invalid { path: PathBuf, source: SyntaxError },

    #[error("{} changed on disk since it was loaded", path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "SaveOutcome tells whether the file was written"]
pub enum SaveOutcome {
    Written { bytes: usize },
    Unchanged,
}

#[derive(Debug)]
pub struct Transaction {
    target: PathBuf,
    state: TxState,
    document: Document,
    pristine: Document,
    original: String,
    /// xxh3 of the file bytes at load, `None` when the file did not exist.
    fingerprint: Option<u64>,
}

impl Transaction {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            state: TxState::Unloaded,
            document: Document::new(),
            pristine: Document::new(),
            original: String::new(),
            fingerprint: None,
        }
    }

    /// Create a transaction for `target` and load it.
    pub fn open(target: impl Into<PathBuf>, create_missing: bool) -> Result<Self, LoadError> {
        let mut tx = Self::new(target);
        tx.load(create_missing)?;
        Ok(tx)
    }

    /// Read and parse the target. With `create_missing`, a missing file is an
    /// empty document.
    pub fn load(&mut self, create_missing: bool) -> Result<(), LoadError> {
        let result = self.read(create_missing);
        if let Err(err) = &result {
            error!("{err}");
        }
        result
    }

    fn read(&mut self, create_missing: bool) -> Result<(), LoadError> {
        let (text, fingerprint) = match fs::read(&self.target) {
            Ok(bytes) => {
                let fingerprint = xxh3_64(&bytes);
                let text = String::from_utf8(bytes).map_err(|err| LoadError::Io {
                    path: self.target.clone(),
                    source: std::io::Error::new(ErrorKind::InvalidData, err),
                })?;
                (text, Some(fingerprint))
            }
            Err(err) if err.kind() == ErrorKind::NotFound && create_missing => {
                debug!("{} does not exist, starting empty", self.target.display());
                (String::new(), None)
            }
            Err(source) => {
                return Err(LoadError::Io {
                    path: self.target.clone(),
                    source,
                });
            }
        };

        let document = Document::parse(&text).map_err(|source| LoadError::Syntax {
            path: self.target.clone(),
            source,
        })?;
        debug!(
            "loaded {} ({} bytes, {} rules)",
            self.target.display(),
            text.len(),
            document.tree().children_labeled(document.tree().root(), lens::PATH).count()
        );
        self.pristine = document.clone();
        self.document = document;
        self.original = text;
        self.fingerprint = fingerprint;
        self.state = TxState::Loaded;
        Ok(())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn state(&self) -> TxState {
        match self.state {
            TxState::Loaded | TxState::Saved if self.document.has_changes() => TxState::Modified,
            state => state,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Text of the target as loaded (or last saved).
    pub fn original_text(&self) -> &str {
        &self.original
    }

    /// Render the document and check that the result parses back.
    pub fn render(&self) -> Result<String, SaveError> {
        let text = self.document.serialize().map_err(|source| SaveError::Render {
            path: self.target.clone(),
            source,
        })?;
        lens::validate_text(&text).map_err(|source| SaveError::Invalid {
            path: self.target.clone(),
            source,
        })?;
        Ok(text)
    }

    /// Write pending changes to the target.
    ///
    /// A render or validation failure rolls the document back. A write
    /// failure keeps the changes so the caller may inspect them.
    pub fn save(&mut self) -> Result<SaveOutcome, SaveError> {
        let result = self.write();
        if let Err(err) = &result {
            error!("{err}");
        }
        result
    }

    fn write(&mut self) -> Result<SaveOutcome, SaveError> {
        if matches!(self.state, TxState::Unloaded | TxState::RolledBack) {
            return Err(SaveError::NotLoaded {
                path: self.target.clone(),
            });
        }
        if !self.document.has_changes() {
            debug!("no changes to {}", self.target.display());
            return Ok(SaveOutcome::Unchanged);
        }

        let text = match self.render() {
            Ok(text) => text,
            Err(err) => {
                self.rollback();
                return Err(err);
            }
        };
        if text == self.original {
            debug!("changes to {} cancel out", self.target.display());
            self.commit(text, self.fingerprint);
            return Ok(SaveOutcome::Unchanged);
        }

        self.check_fingerprint()?;
        atomic_write(&self.target, text.as_bytes()).map_err(|source| SaveError::Io {
            path: self.target.clone(),
            source,
        })?;
        info!("wrote {} ({} bytes)", self.target.display(), text.len());

        let bytes = text.len();
        let fingerprint = Some(xxh3_64(text.as_bytes()));
        self.commit(text, fingerprint);
        Ok(SaveOutcome::Written { bytes })
    }

    fn commit(&mut self, text: String, fingerprint: Option<u64>) {
        self.document.tree_mut().clear_changes();
        self.pristine = self.document.clone();
        self.original = text;
        self.fingerprint = fingerprint;
        self.state = TxState::Saved;
    }

    fn check_fingerprint(&self) -> Result<(), SaveError> {
        let current = match fs::read(&self.target) {
            Ok(bytes) => Some(xxh3_64(&bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(SaveError::Io {
                    path: self.target.clone(),
                    source,
                });
            }
        };
        if current != self.fingerprint {
            return Err(SaveError::ConcurrentModification {
                path: self.target.clone(),
            });
        }
        Ok(())
    }

    /// Drop every change made since the last load or save.
    pub fn rollback(&mut self) {
        debug!("rolling back {}", self.target.display());
        self.document = self.pristine.clone();
        self.state = TxState::RolledBack;
    }
}

/// Write `content` to a temporary file next to `path`, fsync it, and rename it
/// over `path`. Permissions of an existing file carry over.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "path has no parent directory",
            ));
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
