//! src/services/blob_store.rs
//!
//! BlobStore — flat local-disk storage for uploaded and generated images.
//! Every write lands under a freshly generated name; nothing is ever
//! overwritten, renamed, or removed by this service.

use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// A directory that accepts new files under random names.
#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Bind a store to `root`. The directory is created lazily on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a file name of the form `<prefix>_<32 hex chars><extension>`.
    fn generate_name(prefix: &str, extension: &str) -> String {
        format!("{}_{}{}", prefix, Uuid::new_v4().simple(), extension)
    }

    /// Write `bytes` to a new file and return its path.
    ///
    /// - Creates the root directory if it is missing (idempotent).
    /// - Writes the whole buffer in one call; a crash mid-write can leave a
    ///   partial file behind.
    pub async fn save(&self, prefix: &str, bytes: &[u8], extension: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;

        let path = self.root.join(Self::generate_name(prefix, extension));
        fs::write(&path, bytes).await?;

        debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}
