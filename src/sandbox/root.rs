use crate::errors::RuntimeError;
use nix::errno::Errno;
use std::{
    fs::{self, DirBuilder, Permissions},
    os::unix::fs::{DirBuilderExt, PermissionsExt},
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Directory inside the root where the helper binary is placed
pub const HELPER_DIR: &str = "usr/local/bin";

/// How the helper binary gets into a sandbox root
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HelperInjection {
    /// Copy the file; works across filesystems
    Copy,
    /// Hard link, falling back to a copy when the root is on another
    /// filesystem or linking is refused
    HardLink,
}

impl Default for HelperInjection {
    fn default() -> Self {
        HelperInjection::Copy
    }
}

/// A freshly created directory that becomes `/` for the sandboxed command
///
/// The directory and everything unpacked into it is removed when this is
/// dropped. Removal problems are logged, not returned.
#[derive(Debug)]
pub struct SandboxRoot {
    dir: Option<TempDir>,
}

impl SandboxRoot {
    /// Create a root under the system temporary directory
    pub fn create() -> Result<Self, RuntimeError> {
        SandboxRoot::from_tempdir(tempfile::Builder::new().prefix("sandbox_").tempdir())
    }

    /// Create a root under `parent`
    pub fn create_in<P: AsRef<Path>>(parent: P) -> Result<Self, RuntimeError> {
        SandboxRoot::from_tempdir(
            tempfile::Builder::new()
                .prefix("sandbox_")
                .tempdir_in(parent),
        )
    }

    fn from_tempdir(dir: std::io::Result<TempDir>) -> Result<Self, RuntimeError> {
        let dir = dir.map_err(RuntimeError::setup("create root"))?;
        // tempfile makes the directory 0700, the sandboxed command may not
        // run as the same user
        fs::set_permissions(dir.path(), Permissions::from_mode(0o755))
            .map_err(RuntimeError::setup("chmod root"))?;
        log::debug!("sandbox root at {:?}", dir.path());
        Ok(SandboxRoot { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Place the helper binary at `/usr/local/bin/<name>` inside the root
    ///
    /// Returns the host path of the injected file.
    pub fn inject_helper(
        &self,
        host_binary: &Path,
        how: HelperInjection,
    ) -> Result<PathBuf, RuntimeError> {
        let is_file = fs::metadata(host_binary)
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        let file_name = match (is_file, host_binary.file_name()) {
            (true, Some(name)) => name,
            _ => return Err(RuntimeError::HelperMissing(host_binary.to_path_buf())),
        };

        let dir = self.path().join(HELPER_DIR);
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&dir)
            .map_err(RuntimeError::setup("create helper directory"))?;
        let dest = dir.join(file_name);

        if how == HelperInjection::HardLink {
            match fs::hard_link(host_binary, &dest) {
                Ok(()) => {
                    log::debug!("helper linked, {:?} -> {:?}", host_binary, dest);
                    return Ok(dest);
                }
                Err(err)
                    if err.raw_os_error() == Some(Errno::EXDEV as i32)
                        || err.raw_os_error() == Some(Errno::EPERM as i32) =>
                {
                    log::info!("can't link helper ({}), copying instead", err);
                }
                Err(err) => return Err(RuntimeError::setup("link helper")(err)),
            }
        }

        fs::copy(host_binary, &dest).map_err(RuntimeError::setup("copy helper"))?;
        fs::set_permissions(&dest, Permissions::from_mode(0o755))
            .map_err(RuntimeError::setup("chmod helper"))?;
        log::debug!("helper copied, {:?} -> {:?}", host_binary, dest);
        Ok(dest)
    }
}

impl Drop for SandboxRoot {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log::debug!("sandbox root {:?} removed", path),
                Err(err) => log::warn!("error removing sandbox root {:?}, {:?}", path, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    fn fake_helper(dir: &Path) -> PathBuf {
        let path = dir.join("docker-explorer");
        fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o700)).unwrap();
        path
    }

    #[test]
    fn root_is_world_readable() {
        let parent = tempfile::tempdir().unwrap();
        let root = SandboxRoot::create_in(parent.path()).unwrap();
        let metadata = fs::metadata(root.path()).unwrap();
        assert!(metadata.is_dir());
        assert_eq!(metadata.permissions().mode() & 0o777, 0o755);
        let name = root.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sandbox_"));
    }

    #[test]
    fn roots_are_distinct() {
        let a = SandboxRoot::create().unwrap();
        let b = SandboxRoot::create().unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn root_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let root = SandboxRoot::create_in(parent.path()).unwrap();
        let path = root.path().to_path_buf();
        fs::create_dir_all(path.join("etc/ssl")).unwrap();
        fs::write(path.join("etc/ssl/cert.pem"), b"x").unwrap();
        drop(root);
        assert!(!path.exists());
    }

    #[test]
    fn helper_copy() {
        let scratch = tempfile::tempdir().unwrap();
        let helper = fake_helper(scratch.path());
        let root = SandboxRoot::create_in(scratch.path()).unwrap();
        let dest = root.inject_helper(&helper, HelperInjection::Copy).unwrap();
        assert_eq!(dest, root.path().join("usr/local/bin/docker-explorer"));
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&helper).unwrap());
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
        assert_ne!(
            fs::metadata(&dest).unwrap().ino(),
            fs::metadata(&helper).unwrap().ino()
        );
        assert_eq!(
            fs::metadata(root.path().join(HELPER_DIR))
                .unwrap()
                .permissions()
                .mode()
                & 0o777,
            0o755
        );
    }

    #[test]
    fn helper_hard_link() {
        let scratch = tempfile::tempdir().unwrap();
        let helper = fake_helper(scratch.path());
        let root = SandboxRoot::create_in(scratch.path()).unwrap();
        let dest = root
            .inject_helper(&helper, HelperInjection::HardLink)
            .unwrap();
        assert_eq!(
            fs::metadata(&dest).unwrap().ino(),
            fs::metadata(&helper).unwrap().ino()
        );
        drop(root);
        assert!(helper.exists());
    }

    #[test]
    fn helper_missing() {
        let scratch = tempfile::tempdir().unwrap();
        let root = SandboxRoot::create_in(scratch.path()).unwrap();
        let missing = scratch.path().join("nope");
        match root.inject_helper(&missing, HelperInjection::Copy) {
            Err(RuntimeError::HelperMissing(path)) => assert_eq!(path, missing),
            other => panic!("unexpected {:?}", other),
        }
        match root.inject_helper(scratch.path(), HelperInjection::Copy) {
            Err(RuntimeError::HelperMissing(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
