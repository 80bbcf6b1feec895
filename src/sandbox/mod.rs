//! Disposable chroot sandboxes with their own PID and UTS namespaces

mod launch;
mod root;

pub use launch::{ExitStatus, Launch};
pub use root::{HelperInjection, SandboxRoot, HELPER_DIR};

use crate::{
    errors::RuntimeError,
    filesystem::tar::UnpackOptions,
    image::ImageReference,
    registry::RegistryClient,
};
use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Host path of the helper binary copied into every sandbox
pub const DEFAULT_HELPER: &str = "/usr/local/bin/docker-explorer";

/// A random hostname of the form `sandbox-1a2b3c4d`
pub fn random_hostname() -> String {
    format!("sandbox-{:08x}", rand::random::<u32>())
}

/// Builder for a [Sandbox], starting at [Sandbox::builder()]
#[derive(Clone, Debug, Default)]
pub struct SandboxBuilder {
    helper: Option<Option<PathBuf>>,
    injection: HelperInjection,
    hostname: Option<String>,
    parent_dir: Option<PathBuf>,
    unpack: Option<UnpackOptions>,
}

impl SandboxBuilder {
    /// Host binary to inject at `/usr/local/bin` in the root
    ///
    /// Defaults to `MINIDOCK_HELPER` from the environment, then
    /// [DEFAULT_HELPER].
    pub fn helper<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.helper = Some(Some(path.as_ref().to_path_buf()));
        self
    }

    /// Don't inject any helper
    pub fn without_helper(mut self) -> Self {
        self.helper = Some(None);
        self
    }

    pub fn helper_injection(mut self, how: HelperInjection) -> Self {
        self.injection = how;
        self
    }

    /// Hostname inside the sandbox, random by default
    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Create roots under this directory instead of the system temp dir
    pub fn parent_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.parent_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn unpack_options(mut self, options: UnpackOptions) -> Self {
        self.unpack = Some(options);
        self
    }

    pub fn build(self) -> Sandbox {
        Sandbox {
            helper: match self.helper {
                Some(helper) => helper,
                None => Some(
                    env::var_os("MINIDOCK_HELPER")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_HELPER)),
                ),
            },
            injection: self.injection,
            hostname: self.hostname.unwrap_or_else(random_hostname),
            parent_dir: self.parent_dir,
            unpack: self.unpack.unwrap_or_default(),
        }
    }
}

/// Settings for preparing sandbox roots and running commands in them
#[derive(Clone, Debug)]
pub struct Sandbox {
    helper: Option<PathBuf>,
    injection: HelperInjection,
    hostname: String,
    parent_dir: Option<PathBuf>,
    unpack: UnpackOptions,
}

impl Sandbox {
    pub fn builder() -> SandboxBuilder {
        SandboxBuilder::default()
    }

    pub fn new() -> Self {
        Sandbox::builder().build()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn helper(&self) -> Option<&Path> {
        self.helper.as_deref()
    }

    pub fn unpack_options(&self) -> UnpackOptions {
        self.unpack
    }

    /// Create an empty root and inject the helper into it
    pub fn prepare(&self) -> Result<SandboxRoot, RuntimeError> {
        let root = match &self.parent_dir {
            Some(parent) => SandboxRoot::create_in(parent)?,
            None => SandboxRoot::create()?,
        };
        if let Some(helper) = &self.helper {
            root.inject_helper(helper, self.injection)?;
        }
        Ok(root)
    }

    /// Set up a command to run inside `root`
    pub fn command<S: AsRef<OsStr>>(&self, root: &SandboxRoot, program: S) -> Launch {
        Launch::new(root.path(), &self.hostname, program)
    }

    /// Pull an image into a new root and run one command in it
    ///
    /// The root is removed before this returns, whether or not the command
    /// ran.
    pub async fn run<S, I, A>(
        &self,
        client: &RegistryClient,
        reference: &ImageReference,
        program: S,
        args: I,
    ) -> Result<ExitStatus, RuntimeError>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let root = self.prepare()?;
        client.pull(reference, root.path(), self.unpack).await?;
        log::info!("{} ready at {:?}", reference, root.path());
        let status = self.command(&root, program).args(args).status().await;
        log::debug!("{:?} -> {:?}", reference, status);
        status
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::new()
    }
}
