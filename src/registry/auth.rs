use crate::{errors::ImageError, image::Repository, registry::transport::Transport};
use http::HeaderMap;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Token lifetime to assume when the auth server doesn't send one
const DEFAULT_EXPIRES_IN: u64 = 60;

/// Anonymous pull token for one repository
///
/// Obtained once per run and never refreshed. The value is a bearer
/// credential and is left out of the [fmt::Debug] output.
#[derive(Clone)]
pub struct PullToken {
    token: String,
    expires_in: u64,
    issued_at: Option<String>,
}

/// Token endpoint response body
///
/// Docker Hub sends the credential as both `token` and `access_token`;
/// either one is enough.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    #[serde(default)]
    issued_at: Option<String>,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN
}

impl PullToken {
    pub fn new<S: Into<String>>(token: S, expires_in: u64, issued_at: Option<String>) -> Self {
        PullToken {
            token: token.into(),
            expires_in,
            issued_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.token
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn issued_at(&self) -> Option<&str> {
        self.issued_at.as_deref()
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for PullToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullToken")
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// URL of the token request for pulling `repository`
pub fn token_url(auth_url: &Url, service: &str, repository: &Repository) -> Url {
    let mut url = auth_url.clone();
    url.query_pairs_mut()
        .append_pair("service", service)
        .append_pair(
            "scope",
            &format!("repository:{}:pull", repository.registry_path()),
        );
    url
}

/// Exchange a repository name for an anonymous pull token
///
/// A transport failure, a non-2xx status, or a body without a token are all
/// reported as [ImageError::Auth]. There is no retry.
pub async fn obtain_token<T: Transport + ?Sized>(
    transport: &T,
    auth_url: &Url,
    service: &str,
    repository: &Repository,
) -> Result<PullToken, ImageError> {
    let url = token_url(auth_url, service, repository);
    let response = transport
        .get(url.clone(), HeaderMap::new())
        .await
        .map_err(|err| ImageError::Auth(format!("{}: {}", url, err)))?;
    if !response.status.is_success() {
        return Err(ImageError::Auth(format!(
            "{} returned status {}",
            url, response.status
        )));
    }
    let body = response
        .bytes()
        .await
        .map_err(|err| ImageError::Auth(format!("reading token response: {}", err)))?;
    let parsed: TokenResponse = serde_json::from_slice(&body)
        .map_err(|err| ImageError::Auth(format!("malformed token response: {}", err)))?;
    let value = parsed
        .token
        .or(parsed.access_token)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ImageError::Auth("token response has no token".to_owned()))?;
    let token = PullToken::new(value, parsed.expires_in, parsed.issued_at);
    log::debug!("obtained pull token for {}, {:?}", repository, token);
    Ok(token)
}
