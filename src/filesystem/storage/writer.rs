use crate::{errors::ImageError, filesystem::storage::BlobKey};
use std::{
    io,
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    fs::{self, File},
    io::{AsyncWrite, AsyncWriteExt},
};

/// Destination for one blob download
///
/// Bytes go to a `.part` file that only takes the blob's final name on
/// [BlobWriter::commit]. A writer dropped before committing deletes its
/// partial file.
#[derive(Debug)]
pub struct BlobWriter {
    temp_file: File,
    temp_path: Option<PathBuf>,
    dest_path: PathBuf,
    key: BlobKey,
}

impl BlobWriter {
    pub fn new(key: BlobKey, temp_file: File, temp_path: PathBuf, dest_path: PathBuf) -> Self {
        BlobWriter {
            temp_file,
            temp_path: Some(temp_path),
            dest_path,
            key,
        }
    }

    /// Flush, then rename the temporary file to the blob's final path
    pub async fn commit(mut self) -> Result<PathBuf, ImageError> {
        self.temp_file.flush().await?;
        self.temp_file.sync_all().await?;
        let temp_path = match self.temp_path.take() {
            Some(path) => path,
            None => return Err(io::Error::from(io::ErrorKind::NotFound).into()),
        };
        if let Err(err) = fs::rename(&temp_path, &self.dest_path).await {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        log::debug!("blob commit, {:?} -> {:?}", self.key, self.dest_path);
        Ok(self.dest_path.clone())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if let Some(path) = self.temp_path.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                log::warn!("error removing partial blob {:?}, {:?}", path, err);
            }
        }
    }
}

impl AsyncWrite for BlobWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.temp_file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.temp_file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.temp_file).poll_shutdown(cx)
    }
}
