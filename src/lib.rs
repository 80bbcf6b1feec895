//! Pull a container image from a registry and run one command inside it
//!
//! The image is resolved for linux/amd64, its layers are unpacked in order
//! into a fresh directory, and the command is started there under `chroot`
//! as PID 1 of a new PID namespace with its own hostname.
//!
//! ```no_run
//! # async fn example() -> Result<(), minidock::errors::RuntimeError> {
//! use minidock::{ImageReference, RegistryClient, Sandbox};
//!
//! let client = RegistryClient::new()?;
//! let reference = ImageReference::parse("busybox:latest")?;
//! let status = Sandbox::new()
//!     .run(&client, &reference, "echo", &["hello"])
//!     .await?;
//! assert!(status.success());
//! # Ok(())
//! # }
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("minidock only works on linux");

#[macro_use] extern crate lazy_static;

pub mod errors;
pub mod filesystem;
pub mod image;
pub mod manifest;
pub mod registry;
pub mod sandbox;

pub use crate::{
    image::{ContentDigest, ImageReference},
    registry::RegistryClient,
    sandbox::{ExitStatus, Sandbox},
};
