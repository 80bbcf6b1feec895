//! Error types you might see while pulling an image or running a sandbox

use thiserror::Error;

/// Errors during container image preparation
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// token endpoint unreachable or returned something we can't use
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// storage io error
    #[error("storage io error: {0}")]
    Storage(#[from] std::io::Error),

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// url error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// invalid http header value
    #[error("invalid http header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// asynchronous task failed during image preparation
    #[error("asynchronous task failed during image preparation")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// registry returned an error status for a request
    #[error("registry returned status {status} for {url}")]
    UnexpectedStatus { status: http::StatusCode, url: String },

    /// manifest document carries no media type, neither in the body nor in
    /// the response headers
    #[error("manifest has no media type")]
    MissingMediaType,

    /// manifest schema we don't know how to read
    #[error("unsupported manifest type, {0:?}")]
    UnsupportedManifestType(String),

    /// no manifest in an index or list matches our platform
    #[error("no manifest found for platform {os}/{architecture}")]
    PlatformNotFound { architecture: String, os: String },

    /// image manifest lists no layers at all
    #[error("image manifest lists no layers")]
    EmptyImage,

    /// layer download failed
    #[error("failed to fetch blob {digest}: {reason}")]
    BlobFetch { digest: String, reason: String },

    /// unsupported type for image layer
    #[error("unsupported type for image layer, {0:?}")]
    UnsupportedLayerType(String),

    /// tar file format or unpacking error
    #[error("failed to extract {path:?}: {source}")]
    Extraction {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Errors while setting up or running the sandboxed command
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// container image error
    #[error("container image error: {0}")]
    ImageError(#[from] ImageError),

    /// the helper binary we inject into every sandbox is not on the host
    #[error("helper binary not found at {0:?}")]
    HelperMissing(std::path::PathBuf),

    /// a filesystem or namespace operation failed while preparing the jail
    #[error("sandbox setup failed during {step}: {source}")]
    SandboxSetup {
        step: &'static str,
        source: std::io::Error,
    },

    /// command, argument or path contains a nul byte
    #[error("argument contains a nul byte: {0}")]
    InvalidArgument(#[from] std::ffi::NulError),

    /// the command could not be started
    #[error("failed to start {command:?}: {source}")]
    ChildExec {
        command: String,
        source: std::io::Error,
    },

    /// the command was terminated by a signal
    #[error("command terminated by signal {0}")]
    ChildSignaled(i32),
}

impl RuntimeError {
    pub(crate) fn setup(step: &'static str) -> impl FnOnce(std::io::Error) -> RuntimeError {
        move |source| RuntimeError::SandboxSetup { step, source }
    }
}

