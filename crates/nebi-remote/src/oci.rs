//! Anonymous pull of a pixi workspace artifact from an OCI registry.
//!
//! ```text
//! GET /v2/<repo>/manifests/<tag>         (Accept: OCI image manifest)
//!   401 + WWW-Authenticate: Bearer realm=..,service=..,scope=..
//!   GET <realm>?service=..&scope=..      -> {"token": ..}
//!   retry with Authorization: Bearer <token>
//! GET /v2/<repo>/blobs/<digest>          (manifest layer, then lock layer)
//! ```
//!
//! No credentials are ever sent; only the anonymous token handed out by the
//! registry's auth realm. Blobs are verified against their `sha256:` digest.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ErrorKind, RemoteError};

/// Default per-request timeout for registry fetches.
pub const DEFAULT_OCI_TIMEOUT: Duration = Duration::from_secs(10);

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const PIXI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.pixi.toml.v1+toml";
pub const PIXI_LOCK_MEDIA_TYPE: &str = "application/vnd.pixi.lock.v1+yaml";

const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";
const DEFAULT_TAG: &str = "latest";

// ---------------------------------------------------------------------------
// OciReference
// ---------------------------------------------------------------------------

/// `[scheme://]host[:port]/repo[:tag]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OciReference {
    /// `https` unless the reference spelled out `http://`.
    pub scheme: String,
    pub host: String,
    pub repository: String,
    pub tag: String,
}

impl OciReference {
    fn registry_url(&self) -> Result<Url, RemoteError> {
        let host = if self.host == "docker.io" {
            "registry-1.docker.io"
        } else {
            &self.host
        };
        Url::parse(&format!("{}://{host}/", self.scheme)).map_err(|e| {
            RemoteError::new(ErrorKind::Oci, format!("invalid registry host '{}': {e}", self.host))
        })
    }
}

impl FromStr for OciReference {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| {
            RemoteError::new(
                ErrorKind::Oci,
                format!("invalid OCI reference '{s}': {why} (expected host/repo:tag)"),
            )
        };
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("http://") {
            ("http", rest)
        } else if let Some(rest) = s.strip_prefix("https://") {
            ("https", rest)
        } else {
            ("https", s.strip_prefix("oci://").unwrap_or(s))
        };
        let (host, path) = rest.split_once('/').ok_or_else(|| invalid("missing repository"))?;
        if host.is_empty() {
            return Err(invalid("missing registry host"));
        }
        if path.contains('@') {
            return Err(invalid("digest references are not supported"));
        }
        let last_slash = path.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match path[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&path[..split], &path[split + 1..])
            }
            None => (path, DEFAULT_TAG),
        };
        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid("missing repository"));
        }
        if tag.is_empty() {
            return Err(invalid("empty tag"));
        }
        Ok(Self {
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            repository: repository.to_owned(),
            tag: tag.to_owned(),
        })
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.repository, self.tag)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageManifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
    #[serde(default)]
    annotations: std::collections::BTreeMap<String, String>,
}

impl Descriptor {
    fn title(&self) -> Option<&str> {
        self.annotations.get(TITLE_ANNOTATION).map(String::as_str)
    }

    fn is_manifest(&self) -> bool {
        self.media_type == PIXI_MANIFEST_MEDIA_TYPE || self.title() == Some("pixi.toml")
    }

    fn is_lock(&self) -> bool {
        self.media_type == PIXI_LOCK_MEDIA_TYPE || self.title() == Some("pixi.lock")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// The files of a pulled artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OciArtifact {
    pub manifest: String,
    pub lock: Option<String>,
}

// ---------------------------------------------------------------------------
// OciClient
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct OciClient {
    client: Client,
}

impl OciClient {
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nebi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::transport("building HTTP client", &e))?;
        Ok(Self { client })
    }

    /// Pull the manifest, then the manifest layer and (if present) the lock layer.
    pub fn fetch(&self, reference: &OciReference) -> Result<OciArtifact, RemoteError> {
        let base = reference.registry_url()?;
        let mut token = None;

        let manifest_url = v2_url(&base, &reference.repository, &["manifests", &reference.tag]);
        let response = self.get(&manifest_url, Some(OCI_MANIFEST_MEDIA_TYPE), &mut token, reference)?;
        let image: ImageManifest = response.json().map_err(|e| {
            RemoteError::new(ErrorKind::Oci, format!("{reference}: invalid image manifest: {e}"))
        })?;

        let (manifest_layer, lock_layer) = select_layers(&image.layers).ok_or_else(|| {
            RemoteError::new(
                ErrorKind::Oci,
                format!("{reference}: artifact has no pixi.toml layer"),
            )
        })?;

        let manifest = self.blob(&base, reference, &manifest_layer, &mut token)?;
        let lock = match lock_layer {
            Some(layer) => Some(self.blob(&base, reference, &layer, &mut token)?),
            None => None,
        };
        Ok(OciArtifact { manifest, lock })
    }

    fn blob(
        &self,
        base: &Url,
        reference: &OciReference,
        layer: &Descriptor,
        token: &mut Option<String>,
    ) -> Result<String, RemoteError> {
        let url = v2_url(base, &reference.repository, &["blobs", &layer.digest]);
        let bytes = self
            .get(&url, None, token, reference)?
            .bytes()
            .map_err(|e| RemoteError::transport(&format!("{reference}: reading blob"), &e))?;
        verify_digest(&layer.digest, &bytes).map_err(|why| {
            RemoteError::new(ErrorKind::Oci, format!("{reference}: blob {}: {why}", layer.digest))
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            RemoteError::new(
                ErrorKind::Oci,
                format!("{reference}: blob {} is not UTF-8 text", layer.digest),
            )
        })
    }

    /// GET with at most one anonymous-token retry.
    fn get(
        &self,
        url: &Url,
        accept: Option<&str>,
        token: &mut Option<String>,
        reference: &OciReference,
    ) -> Result<Response, RemoteError> {
        for attempt in 0..2 {
            let mut request = self.client.get(url.clone());
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some(token) = token.as_deref() {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            debug!(url = %url, attempt, "registry request");
            let response = request
                .send()
                .map_err(|e| RemoteError::transport(&format!("{reference}: GET {}", url.path()), &e))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status == StatusCode::UNAUTHORIZED
                && attempt == 0
                && let Some(challenge) = bearer_challenge(response.headers())
            {
                *token = Some(self.anonymous_token(&challenge, reference)?);
                continue;
            }
            return Err(RemoteError::from_status(
                status.as_u16(),
                format!("{reference}: GET {}: {status}", url.path()),
            ));
        }
        Err(RemoteError::new(
            ErrorKind::Unauthenticated,
            format!("{reference}: registry rejected anonymous access"),
        ))
    }

    fn anonymous_token(
        &self,
        challenge: &Challenge,
        reference: &OciReference,
    ) -> Result<String, RemoteError> {
        let mut url = Url::parse(&challenge.realm).map_err(|e| {
            RemoteError::new(
                ErrorKind::Oci,
                format!("{reference}: invalid auth realm '{}': {e}", challenge.realm),
            )
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let scope = challenge
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
            query.append_pair("scope", &scope);
        }
        debug!(realm = %challenge.realm, "requesting anonymous registry token");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| RemoteError::transport(&format!("{reference}: token request"), &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::from_status(
                status.as_u16(),
                format!("{reference}: anonymous token request failed: {status}"),
            ));
        }
        let body: TokenResponse = response.json().map_err(|e| {
            RemoteError::new(ErrorKind::Oci, format!("{reference}: invalid token response: {e}"))
        })?;
        body.token.or(body.access_token).ok_or_else(|| {
            RemoteError::new(ErrorKind::Oci, format!("{reference}: token response had no token"))
        })
    }
}

/// Where `import` gets artifacts from. [`OciClient`] is the network source.
pub trait ArtifactSource {
    fn fetch_artifact(&self, reference: &OciReference) -> Result<OciArtifact, RemoteError>;
}

impl ArtifactSource for OciClient {
    fn fetch_artifact(&self, reference: &OciReference) -> Result<OciArtifact, RemoteError> {
        self.fetch(reference)
    }
}

fn v2_url(base: &Url, repository: &str, tail: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.push("v2");
        path.extend(repository.split('/'));
        path.extend(tail);
    }
    url
}

/// Pick the manifest and lock layers, by media type or title first and by
/// position when neither identifies them.
fn select_layers(layers: &[Descriptor]) -> Option<(Descriptor, Option<Descriptor>)> {
    let by_type = layers.iter().find(|l| l.is_manifest());
    match by_type {
        Some(manifest) => {
            let lock = layers.iter().find(|l| l.is_lock()).cloned();
            Some((manifest.clone(), lock))
        }
        None => {
            let manifest = layers.first()?.clone();
            Some((manifest, layers.get(1).cloned()))
        }
    }
}

fn verify_digest(digest: &str, bytes: &[u8]) -> Result<(), String> {
    let Some(expected) = digest.strip_prefix("sha256:") else {
        return Ok(());
    };
    let actual = hex::encode(Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(format!("digest mismatch (got sha256:{actual})"))
    }
}

// ---------------------------------------------------------------------------
// WWW-Authenticate parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
struct Challenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

fn bearer_challenge(headers: &HeaderMap) -> Option<Challenge> {
    let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;
    parse_challenge(value)
}

fn parse_challenge(value: &str) -> Option<Challenge> {
    let (scheme, params) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for (key, val) in split_params(params) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(val),
            "service" => service = Some(val),
            "scope" => scope = Some(val),
            _ => {}
        }
    }
    Some(Challenge {
        realm: realm?,
        service,
        scope,
    })
}

/// Split `k="v",k2="v,2",k3=v3` respecting quotes.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = params.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }
        let mut val = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            val.push(escaped);
                        }
                    }
                    c => val.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                val.push(*c);
                chars.next();
            }
        }
        out.push((key.trim().to_owned(), val.trim().to_owned()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_references() {
        let r: OciReference = "ghcr.io/nebari-dev/envs/demo:v3".parse().unwrap();
        assert_eq!(r.scheme, "https");
        assert_eq!(r.host, "ghcr.io");
        assert_eq!(r.repository, "nebari-dev/envs/demo");
        assert_eq!(r.tag, "v3");
        assert_eq!(r.to_string(), "ghcr.io/nebari-dev/envs/demo:v3");

        let r: OciReference = "http://localhost:5000/demo".parse().unwrap();
        assert_eq!(r.scheme, "http");
        assert_eq!(r.host, "localhost:5000");
        assert_eq!(r.repository, "demo");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn rejects_bad_references() {
        for bad in ["demo", "ghcr.io/", "/repo:tag", "ghcr.io/demo:", "ghcr.io/demo@sha256:abc"] {
            assert!(bad.parse::<OciReference>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn challenge_parsing() {
        let c = parse_challenge(
            r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:a/b:pull""#,
        )
        .unwrap();
        assert_eq!(c.realm, "https://ghcr.io/token");
        assert_eq!(c.service.as_deref(), Some("ghcr.io"));
        assert_eq!(c.scope.as_deref(), Some("repository:a/b:pull"));

        assert!(parse_challenge(r#"Basic realm="x""#).is_none());
        assert!(parse_challenge("Bearer service=x").is_none());
    }

    fn layer(media_type: &str, digest: &str) -> Descriptor {
        Descriptor {
            media_type: media_type.into(),
            digest: digest.into(),
            annotations: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn layers_selected_by_media_type() {
        let layers = vec![
            layer(PIXI_LOCK_MEDIA_TYPE, "sha256:lock"),
            layer(PIXI_MANIFEST_MEDIA_TYPE, "sha256:toml"),
        ];
        let (m, l) = select_layers(&layers).unwrap();
        assert_eq!(m.digest, "sha256:toml");
        assert_eq!(l.unwrap().digest, "sha256:lock");
    }

    #[test]
    fn layers_selected_by_position() {
        let layers = vec![layer("application/octet-stream", "sha256:a")];
        let (m, l) = select_layers(&layers).unwrap();
        assert_eq!(m.digest, "sha256:a");
        assert!(l.is_none());
        assert!(select_layers(&[]).is_none());
    }

    #[test]
    fn digest_verification() {
        let body = b"hello";
        let good = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert!(verify_digest(good, body).is_ok());
        assert!(verify_digest("sha256:00", body).is_err());
        assert!(verify_digest("sha512:whatever", body).is_ok());
    }

    #[test]
    fn v2_urls_keep_repository_slashes() {
        let base = Url::parse("https://ghcr.io/").unwrap();
        let url = v2_url(&base, "org/demo", &["manifests", "v1"]);
        assert_eq!(url.as_str(), "https://ghcr.io/v2/org/demo/manifests/v1");
    }
}
