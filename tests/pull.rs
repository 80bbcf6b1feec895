use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use http::{HeaderMap, StatusCode};
use minidock::{
    errors::{ImageError, RuntimeError},
    filesystem::tar::UnpackOptions,
    manifest::media_types,
    registry::{Response, Transport},
    ImageReference, RegistryClient, Sandbox,
};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::runtime::Runtime;
use url::Url;

const REGISTRY: &str = "http://registry.test";
const AUTH: &str = "http://auth.test/token";

const INDEX_DIGEST: &str = "sha256:0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a";
const BASE: &str = "sha256:b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0";
const TOP: &str = "sha256:c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0";

/// Registry serving one multi-platform image, `library/tiny:1.0`
struct TinyRegistry {
    bodies: HashMap<String, Vec<u8>>,
    log: Mutex<Vec<String>>,
}

impl TinyRegistry {
    fn new() -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(
            AUTH.to_owned(),
            br#"{"token":"t0k3n","expires_in":300}"#.to_vec(),
        );
        bodies.insert(
            format!("{}/v2/library/tiny/manifests/1.0", REGISTRY),
            format!(
                r#"{{"schemaVersion": 2, "mediaType": "{}", "manifests": [
                    {{"mediaType": "{}", "digest": "{}", "size": 10,
                      "platform": {{"architecture": "amd64", "os": "linux"}}}}]}}"#,
                media_types::OCI_INDEX,
                media_types::OCI_MANIFEST,
                INDEX_DIGEST
            )
            .into_bytes(),
        );
        bodies.insert(
            format!("{}/v2/library/tiny/manifests/{}", REGISTRY, INDEX_DIGEST),
            format!(
                r#"{{"schemaVersion": 2, "mediaType": "{}", "layers": [
                    {{"mediaType": "{}", "digest": "{}", "size": 1}},
                    {{"mediaType": "{}", "digest": "{}", "size": 1}}]}}"#,
                media_types::OCI_MANIFEST,
                media_types::OCI_LAYER_TAR_GZIP,
                BASE,
                media_types::OCI_LAYER_TAR,
                TOP
            )
            .into_bytes(),
        );
        bodies.insert(
            format!("{}/v2/library/tiny/blobs/{}", REGISTRY, BASE),
            gzip(&layer(&[
                ("etc/os-release", b"ID=tiny\n"),
                ("bin/greeting", b"hello\n"),
            ])),
        );
        bodies.insert(
            format!("{}/v2/library/tiny/blobs/{}", REGISTRY, TOP),
            layer(&[("bin/greeting", b"goodbye\n"), ("srv/data", b"x")]),
        );
        TinyRegistry {
            bodies,
            log: Mutex::new(Vec::new()),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for TinyRegistry {
    async fn get(&self, url: Url, _headers: HeaderMap) -> Result<Response, ImageError> {
        let mut key = url.clone();
        key.set_query(None);
        self.log.lock().unwrap().push(key.path().to_owned());
        Ok(match self.bodies.get(key.as_str()) {
            Some(body) => Response::from_bytes(StatusCode::OK, HeaderMap::new(), body.clone()),
            None => Response::from_bytes(StatusCode::NOT_FOUND, HeaderMap::new(), Vec::new()),
        })
    }
}

fn layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn common() -> (RegistryClient, Arc<TinyRegistry>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = Arc::new(TinyRegistry::new());
    let client = RegistryClient::builder()
        .registry_url(REGISTRY)
        .auth_url(AUTH)
        .auth_service("registry.test")
        .transport(registry.clone())
        .build()
        .unwrap();
    (client, registry)
}

fn sandbox(scratch: &Path) -> Sandbox {
    let helper = scratch.join("docker-explorer");
    fs::write(&helper, b"helper").unwrap();
    Sandbox::builder()
        .helper(&helper)
        .parent_dir(scratch)
        .hostname("sandbox-00000001")
        .unpack_options(UnpackOptions {
            preserve_ownerships: false,
        })
        .build()
}

fn tree(root: &Path, dir: &Path, out: &mut Vec<String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            tree(root, &path, out);
        } else {
            out.push(path.strip_prefix(root).unwrap().to_str().unwrap().to_owned());
        }
    }
}

#[test]
fn pull_into_sandbox_root() {
    Runtime::new().unwrap().block_on(async {
        let (client, registry) = common();
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = sandbox(scratch.path());
        let root = sandbox.prepare().unwrap();
        let reference = ImageReference::parse("tiny:1.0").unwrap();

        let layers = client
            .pull(&reference, root.path(), sandbox.unpack_options())
            .await
            .unwrap();
        assert_eq!(layers.len(), 2);

        let mut files = Vec::new();
        tree(root.path(), root.path(), &mut files);
        files.sort();
        assert_eq!(
            files,
            vec![
                "bin/greeting",
                "etc/os-release",
                "srv/data",
                "usr/local/bin/docker-explorer",
            ]
        );
        assert_eq!(
            fs::read(root.path().join("bin/greeting")).unwrap(),
            b"goodbye\n"
        );

        assert_eq!(
            registry.log(),
            vec![
                "/token".to_owned(),
                "/v2/library/tiny/manifests/1.0".to_owned(),
                format!("/v2/library/tiny/manifests/{}", INDEX_DIGEST),
                format!("/v2/library/tiny/blobs/{}", BASE),
                format!("/v2/library/tiny/blobs/{}", TOP),
            ]
        );

        // Only the root is left in scratch besides the helper, the blob
        // directory went away with the pull
        let path = root.path().to_path_buf();
        drop(root);
        assert!(!path.exists());
        let left: Vec<_> = fs::read_dir(scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(left, vec!["docker-explorer"]);
    })
}

#[test]
fn unknown_tag_cleans_up() {
    Runtime::new().unwrap().block_on(async {
        let (client, registry) = common();
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = sandbox(scratch.path());
        let reference = ImageReference::parse("tiny:2.0").unwrap();

        match sandbox.run(&client, &reference, "true", &[] as &[&str]).await {
            Err(RuntimeError::ImageError(ImageError::UnexpectedStatus { status, .. })) => {
                assert_eq!(status, StatusCode::NOT_FOUND)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(registry.log().len(), 2);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 1);
    })
}

#[test]
fn other_repository_not_found() {
    Runtime::new().unwrap().block_on(async {
        let (client, registry) = common();
        let scratch = tempfile::tempdir().unwrap();
        let root = sandbox(scratch.path()).prepare().unwrap();
        let reference = ImageReference::parse("someone/tiny:1.0").unwrap();
        assert!(client
            .pull(
                &reference,
                root.path(),
                UnpackOptions {
                    preserve_ownerships: false
                }
            )
            .await
            .is_err());
        assert_eq!(
            registry.log(),
            vec!["/token", "/v2/someone/tiny/manifests/1.0"]
        );
    })
}
