//! Durable token storage.
//!
//! The session token is the only piece of client state that survives a
//! restart. [`FileTokenStorage`] keeps it in a single file under the user's
//! data directory; [`MemoryTokenStorage`] is used by tests and by callers
//! that do not want anything written to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::SessionError;

/// A place the session token is persisted between runs.
pub trait TokenStorage: Send + Sync {
    /// Returns the stored token, or `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the backing store cannot be read.
    fn load(&self) -> Result<Option<String>, SessionError>;

    /// Stores `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the token cannot be written.
    fn save(&self, token: &str) -> Result<(), SessionError>;

    /// Removes the stored token. Removing nothing is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the token cannot be removed.
    fn remove(&self) -> Result<(), SessionError>;
}

/// Token kept in a plain file.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Stores the token at `path`. Parent directories are created on save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, source: io::Error) -> SessionError {
        SessionError::Storage {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    fn save(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.storage_error(e))?;
        }
        fs::write(&self.path, token).map_err(|e| self.storage_error(e))
    }

    fn remove(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(e)),
        }
    }
}

/// Token kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage already holding `token`, as if left by a previous run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(self.token.lock().clone())
    }

    fn save(&self, token: &str) -> Result<(), SessionError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionError> {
        self.token.lock().take();
        Ok(())
    }
}
