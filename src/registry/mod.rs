//! Registry client: pull tokens, manifest resolution and layer downloads


mod auth;
mod transport;

pub use auth::{obtain_token, token_url, PullToken};
pub use transport::{HttpTransport, Response, Transport};

use crate::{
    errors::ImageError,
    filesystem::{
        storage::BlobStore,
        tar::{self, UnpackOptions},
    },
    image::{ContentDigest, ImageReference, Repository},
    manifest::{media_types, LayerDescriptor, ManifestDocument, ManifestIndex, TARGET_PLATFORM},
};
use http::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    HeaderMap,
};
use std::{env, path::Path, sync::Arc};
use tokio::task;
use url::Url;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Media types we can read for the first manifest request, most preferred
/// first
const TOP_LEVEL_ACCEPT: &[&str] = &[
    media_types::DOCKER_MANIFEST,
    media_types::DOCKER_MANIFEST_LIST,
    media_types::OCI_INDEX,
    media_types::OCI_MANIFEST,
];
const DOCKER_PLATFORM_ACCEPT: &[&str] = &[media_types::DOCKER_MANIFEST, media_types::OCI_MANIFEST];
const OCI_PLATFORM_ACCEPT: &[&str] = &[media_types::OCI_MANIFEST];

/// Builder for a [RegistryClient], starting at [RegistryClient::builder()]
///
/// Anything left unset comes from the `MINIDOCK_REGISTRY`,
/// `MINIDOCK_AUTH_URL` and `MINIDOCK_AUTH_SERVICE` environment variables,
/// then from the Docker Hub defaults.
#[derive(Default)]
pub struct RegistryClientBuilder {
    registry_url: Option<String>,
    auth_url: Option<String>,
    auth_service: Option<String>,
    transport: Option<Arc<dyn Transport>>,
}

impl RegistryClientBuilder {
    /// Base URL of the registry API, without the `/v2` suffix
    pub fn registry_url<S: Into<String>>(mut self, url: S) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    /// URL of the token endpoint
    pub fn auth_url<S: Into<String>>(mut self, url: S) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// `service` parameter sent to the token endpoint
    pub fn auth_service<S: Into<String>>(mut self, service: S) -> Self {
        self.auth_service = Some(service.into());
        self
    }

    /// Use a custom [Transport] instead of HTTPS
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<RegistryClient, ImageError> {
        let registry_url = setting(self.registry_url, "MINIDOCK_REGISTRY", DEFAULT_REGISTRY_URL);
        let auth_url = setting(self.auth_url, "MINIDOCK_AUTH_URL", DEFAULT_AUTH_URL);
        Ok(RegistryClient {
            registry_url: Url::parse(&registry_url)?,
            auth_url: Url::parse(&auth_url)?,
            auth_service: setting(
                self.auth_service,
                "MINIDOCK_AUTH_SERVICE",
                DEFAULT_AUTH_SERVICE,
            ),
            transport: match self.transport {
                Some(transport) => transport,
                None => Arc::new(HttpTransport::new()),
            },
        })
    }
}

fn setting(explicit: Option<String>, var: &str, default: &str) -> String {
    match explicit {
        Some(value) => value,
        None => env::var(var).unwrap_or_else(|_| default.to_owned()),
    }
}

/// Anonymous client for one registry
pub struct RegistryClient {
    registry_url: Url,
    auth_url: Url,
    auth_service: String,
    transport: Arc<dyn Transport>,
}

impl RegistryClient {
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::default()
    }

    pub fn new() -> Result<RegistryClient, ImageError> {
        RegistryClient::builder().build()
    }

    /// Get a pull token scoped to the reference's repository
    pub async fn obtain_token(&self, reference: &ImageReference) -> Result<PullToken, ImageError> {
        obtain_token(
            self.transport.as_ref(),
            &self.auth_url,
            &self.auth_service,
            &reference.repository(),
        )
        .await
    }

    fn api_url(&self, repository: &Repository, kind: &str, id: &str) -> Result<Url, ImageError> {
        Ok(Url::parse(&format!(
            "{}/v2/{}/{}/{}",
            self.registry_url.as_str().trim_end_matches('/'),
            repository.registry_path(),
            kind,
            id
        ))?)
    }

    fn headers(token: &PullToken, accept: &[&str]) -> Result<HeaderMap, ImageError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&token.bearer())?);
        if !accept.is_empty() {
            headers.insert(ACCEPT, HeaderValue::from_str(&accept.join(", "))?);
        }
        Ok(headers)
    }

    async fn fetch_manifest(
        &self,
        repository: &Repository,
        version: &str,
        accept: &[&str],
        token: &PullToken,
    ) -> Result<ManifestDocument, ImageError> {
        let url = self.api_url(repository, "manifests", version)?;
        let response = self
            .transport
            .get(url.clone(), RegistryClient::headers(token, accept)?)
            .await?;
        if !response.status.is_success() {
            return Err(ImageError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        let content_type = response.content_type().map(str::to_owned);
        let body = response.bytes().await?;
        log::debug!("raw json manifest, {}", String::from_utf8_lossy(&body));
        ManifestDocument::parse(&body, content_type.as_deref())
    }

    /// Follow an index or list entry for our platform to its image manifest
    async fn resolve_platform(
        &self,
        repository: &Repository,
        index: &ManifestIndex,
        accept: &[&str],
        token: &PullToken,
    ) -> Result<Vec<LayerDescriptor>, ImageError> {
        let entry = index
            .select(&TARGET_PLATFORM)
            .ok_or_else(|| ImageError::PlatformNotFound {
                architecture: TARGET_PLATFORM.architecture.to_owned(),
                os: TARGET_PLATFORM.os.to_owned(),
            })?;
        log::info!(
            "{}/{} manifest is {}",
            TARGET_PLATFORM.os,
            TARGET_PLATFORM.architecture,
            entry.digest
        );
        match self
            .fetch_manifest(repository, entry.digest.as_str(), accept, token)
            .await?
        {
            ManifestDocument::DockerManifest(manifest) | ManifestDocument::OciManifest(manifest) => {
                Ok(manifest.layers)
            }
            nested => Err(ImageError::UnsupportedManifestType(
                nested.media_type_str().to_owned(),
            )),
        }
    }

    /// Resolve a reference to the ordered list of layers for our platform
    ///
    /// Layers come back in manifest order, bottom to top. Indexes and lists
    /// cost one extra request, to the manifest of the first entry matching
    /// [TARGET_PLATFORM].
    pub async fn resolve_layers(
        &self,
        reference: &ImageReference,
        token: &PullToken,
    ) -> Result<Vec<LayerDescriptor>, ImageError> {
        let repository = reference.repository();
        let version = reference.version();
        let document = self
            .fetch_manifest(&repository, version.as_str(), TOP_LEVEL_ACCEPT, token)
            .await?;
        match document {
            ManifestDocument::DockerManifest(manifest) | ManifestDocument::OciManifest(manifest) => {
                Ok(manifest.layers)
            }
            ManifestDocument::DockerManifestList(list) => {
                self.resolve_platform(&repository, &list, DOCKER_PLATFORM_ACCEPT, token)
                    .await
            }
            ManifestDocument::OciIndex(index) => {
                self.resolve_platform(&repository, &index, OCI_PLATFORM_ACCEPT, token)
                    .await
            }
        }
    }

    /// Download one blob into the store, returning its local path
    ///
    /// Any failure is reported as [ImageError::BlobFetch]; a partial file is
    /// removed before returning.
    pub async fn fetch_layer(
        &self,
        token: &PullToken,
        repository: &Repository,
        digest: &ContentDigest,
        store: &BlobStore,
    ) -> Result<std::path::PathBuf, ImageError> {
        let fail = |err: ImageError| ImageError::BlobFetch {
            digest: digest.to_string(),
            reason: err.to_string(),
        };
        let url = self
            .api_url(repository, "blobs", digest.as_str())
            .map_err(fail)?;
        let headers = RegistryClient::headers(token, &[]).map_err(fail)?;
        let response = self.transport.get(url, headers).await.map_err(fail)?;
        if !response.status.is_success() {
            return Err(ImageError::BlobFetch {
                digest: digest.to_string(),
                reason: format!("registry returned status {}", response.status),
            });
        }
        let mut writer = store.begin_write(digest).await.map_err(fail)?;
        let size = response.copy_to(&mut writer).await.map_err(fail)?;
        let path = writer.commit().await.map_err(fail)?;
        log::info!("{} downloaded, {} bytes", digest, size);
        Ok(path)
    }

    /// Pull an image and unpack its layers into `destination`
    ///
    /// Each layer is downloaded and then extracted before the next one is
    /// requested, in manifest order, so later layers overwrite earlier ones.
    /// Downloaded blobs live in a private directory that is removed when this
    /// returns.
    pub async fn pull(
        &self,
        reference: &ImageReference,
        destination: &Path,
        options: UnpackOptions,
    ) -> Result<Vec<LayerDescriptor>, ImageError> {
        let token = self.obtain_token(reference).await?;
        let layers = self.resolve_layers(reference, &token).await?;
        if layers.is_empty() {
            return Err(ImageError::EmptyImage);
        }
        log::info!("{} has {} layers", reference, layers.len());

        let repository = reference.repository();
        let store = BlobStore::new()?;
        for layer in &layers {
            tar::check_media_type(&layer.media_type)?;
            let blob = self
                .fetch_layer(&token, &repository, &layer.digest, &store)
                .await?;
            let destination = destination.to_path_buf();
            task::spawn_blocking(move || tar::extract(&blob, &destination, options)).await??;
        }
        Ok(layers)
    }
}
