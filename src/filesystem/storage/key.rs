use crate::image::ContentDigest;
use std::path::{Path, PathBuf};

/// Names of the files kept in a [super::BlobStore]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlobKey {
    Temp(u32, u64),
    Blob(ContentDigest),
}

impl BlobKey {
    pub fn temp() -> Self {
        BlobKey::Temp(std::process::id(), rand::random::<u64>())
    }

    pub fn to_path(&self, base_dir: &Path) -> PathBuf {
        match self {
            BlobKey::Temp(pid, random) => base_dir.join(format!("{}-{:016x}.part", pid, random)),
            // algorithm names may contain dots
            BlobKey::Blob(content_digest) => base_dir.join(format!(
                "{}-{}.blob",
                content_digest.format_str(),
                content_digest.hex_str()
            )),
        }
    }
}
