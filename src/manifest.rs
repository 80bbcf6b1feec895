//! Registry manifest schemas
//!
//! A registry may answer a manifest request with any of four related JSON
//! documents. They share field names but not meaning, so a body is first
//! probed for its `mediaType` alone and only then parsed as the one schema
//! that tag names.
//!
//! References:
//! <https://docs.docker.com/registry/spec/manifest-v2-2/>,
//! <https://github.com/opencontainers/image-spec/blob/main/image-index.md>

use crate::{errors::ImageError, image::ContentDigest};
use serde::{Deserialize, Serialize};

pub mod media_types {
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

    pub const DOCKER_LAYER_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const OCI_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
    pub const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    pub const OCI_LAYER_TAR_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
}

/// The one platform this runner resolves images for
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlatformSelector {
    pub architecture: &'static str,
    pub os: &'static str,
}

pub const TARGET_PLATFORM: PlatformSelector = PlatformSelector {
    architecture: "amd64",
    os: "linux",
};

impl PlatformSelector {
    pub fn matches(&self, platform: &Platform) -> bool {
        platform.architecture == self.architecture && platform.os == self.os
    }
}

/// Platform as described by an index or list entry
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Entry in an index or list, pointing at a per-platform manifest
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ManifestDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: ContentDigest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// One filesystem layer blob
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct LayerDescriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: ContentDigest,
    pub size: u64,
}

/// Single-platform manifest, either Docker v2 or OCI
///
/// Layers are listed bottom to top, which is also the order they are
/// unpacked in.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub layers: Vec<LayerDescriptor>,
}

/// Multi-platform document, either a Docker manifest list or an OCI index
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ManifestIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub manifests: Vec<ManifestDescriptor>,
}

impl ManifestIndex {
    /// First entry in document order whose platform matches
    pub fn select(&self, selector: &PlatformSelector) -> Option<&ManifestDescriptor> {
        self.manifests.iter().find(|entry| match &entry.platform {
            Some(platform) => selector.matches(platform),
            None => false,
        })
    }
}

/// A manifest response, tagged by its declared media type
#[derive(Clone, Debug)]
pub enum ManifestDocument {
    DockerManifest(ImageManifest),
    DockerManifestList(ManifestIndex),
    OciIndex(ManifestIndex),
    OciManifest(ImageManifest),
}

#[derive(Deserialize)]
struct MediaTypeProbe {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
}

impl ManifestDocument {
    /// Read only the media type of a manifest body
    ///
    /// The `mediaType` field wins. OCI documents may leave it out, in which
    /// case the response's `Content-Type` is used.
    pub fn media_type(body: &[u8], content_type: Option<&str>) -> Result<String, ImageError> {
        let probe: MediaTypeProbe = serde_json::from_slice(body)?;
        let from_header = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match (probe.media_type, from_header) {
            (Some(media_type), _) => Ok(media_type),
            (None, Some(header)) => Ok(header.to_owned()),
            (None, None) => Err(ImageError::MissingMediaType),
        }
    }

    /// Parse a manifest body as the schema its media type names
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self, ImageError> {
        let media_type = ManifestDocument::media_type(body, content_type)?;
        log::debug!("manifest media type {:?}", media_type);
        match media_type.as_str() {
            media_types::DOCKER_MANIFEST => {
                Ok(ManifestDocument::DockerManifest(serde_json::from_slice(body)?))
            }
            media_types::DOCKER_MANIFEST_LIST => Ok(ManifestDocument::DockerManifestList(
                serde_json::from_slice(body)?,
            )),
            media_types::OCI_INDEX => Ok(ManifestDocument::OciIndex(serde_json::from_slice(body)?)),
            media_types::OCI_MANIFEST => {
                Ok(ManifestDocument::OciManifest(serde_json::from_slice(body)?))
            }
            _ => Err(ImageError::UnsupportedManifestType(media_type)),
        }
    }

    pub fn media_type_str(&self) -> &'static str {
        match self {
            ManifestDocument::DockerManifest(_) => media_types::DOCKER_MANIFEST,
            ManifestDocument::DockerManifestList(_) => media_types::DOCKER_MANIFEST_LIST,
            ManifestDocument::OciIndex(_) => media_types::OCI_INDEX,
            ManifestDocument::OciManifest(_) => media_types::OCI_MANIFEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    const D2: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
    const D3: &str = "sha256:3333333333333333333333333333333333333333333333333333333333333333";

    fn index_json(media_type: &str) -> String {
        format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "{}",
                "manifests": [
                    {{"mediaType": "m", "digest": "{}", "size": 1,
                      "platform": {{"architecture": "arm64", "os": "linux", "variant": "v8"}}}},
                    {{"mediaType": "m", "digest": "{}", "size": 2,
                      "platform": {{"architecture": "amd64", "os": "windows"}}}},
                    {{"mediaType": "m", "digest": "{}", "size": 3,
                      "platform": {{"architecture": "amd64", "os": "linux"}}}},
                    {{"mediaType": "m", "digest": "{}", "size": 4,
                      "platform": {{"architecture": "amd64", "os": "linux"}}}}
                ]
            }}"#,
            media_type, D1, D1, D2, D3
        )
    }

    #[test]
    fn docker_manifest_layers_in_order() {
        let body = format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "{}",
                "config": {{"mediaType": "c", "digest": "{}", "size": 9}},
                "layers": [
                    {{"mediaType": "{}", "digest": "{}", "size": 10}},
                    {{"mediaType": "{}", "digest": "{}", "size": 20}}
                ]
            }}"#,
            media_types::DOCKER_MANIFEST,
            D3,
            media_types::DOCKER_LAYER_TAR_GZIP,
            D1,
            media_types::DOCKER_LAYER_TAR_GZIP,
            D2
        );
        match ManifestDocument::parse(body.as_bytes(), None).unwrap() {
            ManifestDocument::DockerManifest(manifest) => {
                let digests: Vec<&str> =
                    manifest.layers.iter().map(|l| l.digest.as_str()).collect();
                assert_eq!(digests, vec![D1, D2]);
                assert_eq!(manifest.layers[1].size, 20);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn select_first_matching_platform() {
        for media_type in &[media_types::DOCKER_MANIFEST_LIST, media_types::OCI_INDEX] {
            let doc = ManifestDocument::parse(index_json(media_type).as_bytes(), None).unwrap();
            assert_eq!(doc.media_type_str(), *media_type);
            let index = match doc {
                ManifestDocument::DockerManifestList(index) | ManifestDocument::OciIndex(index) => {
                    index
                }
                other => panic!("unexpected {:?}", other),
            };
            let selected = index.select(&TARGET_PLATFORM).unwrap();
            assert_eq!(selected.digest.as_str(), D2);
            assert_eq!(selected.size, 3);
        }
    }

    #[test]
    fn select_without_match() {
        let index = ManifestIndex {
            schema_version: 2,
            manifests: vec![ManifestDescriptor {
                media_type: media_types::OCI_MANIFEST.to_owned(),
                digest: D1.parse().unwrap(),
                size: 1,
                platform: Some(Platform {
                    architecture: "amd64".to_owned(),
                    os: "freebsd".to_owned(),
                    variant: None,
                }),
            }],
        };
        assert!(index.select(&TARGET_PLATFORM).is_none());
    }

    #[test]
    fn entries_without_platform_never_match() {
        let body = format!(
            r#"{{"schemaVersion": 2, "mediaType": "{}",
                "manifests": [{{"mediaType": "m", "digest": "{}", "size": 1}}]}}"#,
            media_types::OCI_INDEX,
            D1
        );
        match ManifestDocument::parse(body.as_bytes(), None).unwrap() {
            ManifestDocument::OciIndex(index) => assert!(index.select(&TARGET_PLATFORM).is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn media_type_gates_parsing() {
        // A list body mislabeled as a single manifest must not parse as one
        let body = index_json(media_types::DOCKER_MANIFEST);
        assert!(matches!(
            ManifestDocument::parse(body.as_bytes(), None),
            Err(ImageError::JSON(_))
        ));
    }

    #[test]
    fn unknown_media_type() {
        let body = br#"{"schemaVersion": 1, "mediaType": "application/vnd.docker.distribution.manifest.v1+prettyjws"}"#;
        match ManifestDocument::parse(body, None) {
            Err(ImageError::UnsupportedManifestType(t)) => {
                assert_eq!(t, "application/vnd.docker.distribution.manifest.v1+prettyjws")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn media_type_from_content_type_header() {
        let body = format!(
            r#"{{"schemaVersion": 2, "layers": [{{"mediaType": "{}", "digest": "{}", "size": 1}}]}}"#,
            media_types::OCI_LAYER_TAR_GZIP,
            D1
        );
        let header = format!("{}; charset=utf-8", media_types::OCI_MANIFEST);
        let doc = ManifestDocument::parse(body.as_bytes(), Some(&header)).unwrap();
        assert!(matches!(doc, ManifestDocument::OciManifest(_)));

        assert!(matches!(
            ManifestDocument::parse(body.as_bytes(), None),
            Err(ImageError::MissingMediaType)
        ));
    }

    #[test]
    fn body_field_wins_over_header() {
        let body = index_json(media_types::OCI_INDEX);
        let doc = ManifestDocument::parse(body.as_bytes(), Some(media_types::DOCKER_MANIFEST))
            .unwrap();
        assert!(matches!(doc, ManifestDocument::OciIndex(_)));
    }

    #[test]
    fn bad_layer_digest_is_rejected() {
        let body = format!(
            r#"{{"schemaVersion": 2, "mediaType": "{}",
                "layers": [{{"mediaType": "x", "digest": "sha256:../../etc", "size": 1}}]}}"#,
            media_types::DOCKER_MANIFEST
        );
        assert!(ManifestDocument::parse(body.as_bytes(), None).is_err());
    }
}
