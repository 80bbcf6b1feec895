mod key;
mod writer;

pub use key::BlobKey;
pub use writer::BlobWriter;

use crate::{errors::ImageError, image::ContentDigest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs::OpenOptions;

/// Private scratch directory for downloaded layer blobs
///
/// Blobs are kept outside the sandbox root so the sandboxed program never
/// sees them. The directory and everything in it is removed when the store
/// is dropped.
#[derive(Debug)]
pub struct BlobStore {
    dir: TempDir,
}

impl BlobStore {
    /// Create a store under the system temporary directory
    pub fn new() -> Result<Self, ImageError> {
        Ok(BlobStore {
            dir: tempfile::Builder::new().prefix("blobs_").tempdir()?,
        })
    }

    /// Create a store under `parent`
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self, ImageError> {
        Ok(BlobStore {
            dir: tempfile::Builder::new().prefix("blobs_").tempdir_in(parent)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the blob with this digest lives once committed
    pub fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        BlobKey::Blob(digest.clone()).to_path(self.path())
    }

    /// Begin writing a blob to temporary storage
    pub async fn begin_write(&self, digest: &ContentDigest) -> Result<BlobWriter, ImageError> {
        let key = BlobKey::temp();
        let temp_path = key.to_path(self.path());
        let temp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;
        Ok(BlobWriter::new(
            key,
            temp_file,
            temp_path,
            self.blob_path(digest),
        ))
    }
}
