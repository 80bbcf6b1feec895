//! Unpacking layer archives onto the host filesystem

use crate::{errors::ImageError, manifest::media_types};
use flate2::read::GzDecoder;
use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::Path,
};
use tar::{Archive, EntryType};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// How layer entries are written
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnpackOptions {
    /// Apply the uid and gid recorded in the archive
    ///
    /// Only root can do this for arbitrary owners, so it defaults to whether
    /// the current process is running as root.
    pub preserve_ownerships: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        UnpackOptions {
            preserve_ownerships: nix::unistd::Uid::effective().is_root(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Identify a blob's compression from its first few bytes
    pub fn detect(magic: &[u8]) -> Compression {
        if magic.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if magic.starts_with(ZSTD_MAGIC) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Reject layers whose declared media type we know we can't unpack
///
/// Checked before download. Media types we don't recognize are let through,
/// the blob's own magic bytes decide.
pub fn check_media_type(media_type: &str) -> Result<(), ImageError> {
    if media_type == media_types::OCI_LAYER_TAR_ZSTD || media_type.ends_with("+zstd") {
        Err(ImageError::UnsupportedLayerType(media_type.to_owned()))
    } else {
        Ok(())
    }
}

/// Unpack one layer blob over `destination`
///
/// Entries overwrite whatever an earlier layer left at the same path. Paths
/// that would land outside `destination` are skipped. OCI whiteout files are
/// unpacked as ordinary files.
pub fn extract(blob: &Path, destination: &Path, options: UnpackOptions) -> Result<(), ImageError> {
    let extraction = |source: io::Error| ImageError::Extraction {
        path: blob.to_path_buf(),
        source,
    };
    let mut file = File::open(blob).map_err(extraction)?;
    let mut magic = Vec::with_capacity(ZSTD_MAGIC.len());
    (&mut file)
        .take(ZSTD_MAGIC.len() as u64)
        .read_to_end(&mut magic)
        .map_err(extraction)?;
    file.seek(SeekFrom::Start(0)).map_err(extraction)?;

    let count = match Compression::detect(&magic) {
        Compression::Gzip => unpack(
            Archive::new(GzDecoder::new(BufReader::new(file))),
            destination,
            options,
        ),
        Compression::None => unpack(Archive::new(BufReader::new(file)), destination, options),
        Compression::Zstd => return Err(ImageError::UnsupportedLayerType("zstd".to_owned())),
    }
    .map_err(extraction)?;
    log::info!("{:?} unpacked, {} entries", blob, count);
    Ok(())
}

fn unpack<R: Read>(
    mut archive: Archive<R>,
    destination: &Path,
    options: UnpackOptions,
) -> io::Result<usize> {
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_preserve_ownerships(options.preserve_ownerships);
    archive.set_overwrite(true);
    archive.set_unpack_xattrs(false);

    // Directory modes are applied last, a read-only directory could
    // otherwise block its own contents
    let mut directories = Vec::new();
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        count += 1;
        match entry.header().entry_type() {
            EntryType::Directory => directories.push(entry),
            EntryType::XGlobalHeader | EntryType::XHeader => {}
            _ => {
                if !entry.unpack_in(destination)? {
                    log::warn!("skipping tar entry outside the root, {:?}", entry.path()?);
                }
            }
        }
    }
    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut dir in directories {
        dir.unpack_in(destination)?;
    }
    Ok(count)
}
