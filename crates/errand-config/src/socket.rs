//! Unix socket endpoint handling.

use std::fmt;
use std::fs::DirBuilder;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filesystem location of the daemon's Unix domain socket.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SocketPath(Utf8PathBuf);

impl SocketPath {
    /// Wraps a path as a socket endpoint.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    /// Borrows the underlying path.
    #[must_use]
    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    /// Ensures the socket's parent directory exists with restrictive
    /// permissions.
    ///
    /// # Errors
    ///
    /// Fails when the path has no parent or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self.0.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: self.0.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path()) {
            if source.kind() != io::ErrorKind::AlreadyExists {
                return Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.0)
    }
}

impl From<&str> for SocketPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Errors raised while preparing the socket's directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Creating the parent directory failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
