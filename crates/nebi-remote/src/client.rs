//! Blocking HTTP implementation of [`ServerApi`].
//!
//! Every request carries `Authorization: Bearer <token>` when a token is set.
//! Non-2xx responses are turned into [`RemoteError`]s classified by status;
//! the server's `{"error": ...}` text becomes the message.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::ServerApi;
use crate::error::{ErrorKind, RemoteError};
use crate::types::{
    CreateWorkspaceRequest, ErrorBody, LoginRequest, LoginResponse, NewRegistry, PublishDefaults,
    PublishRequest, PublishResponse, PushRequest, PushResponse, Registry, RemoteWorkspace, Tag,
    Version, VersionContent,
};

const API_PREFIX: [&str; 2] = ["api", "v1"];
const MANIFEST_FILE: &str = "pixi.toml";
const LOCK_FILE: &str = "pixi.lock";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A nebi server reached over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpServer {
    base: Url,
    server_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpServer {
    /// Build a client for `server_url`. `token` may be `None` for
    /// unauthenticated calls such as `health`.
    pub fn new(
        server_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let server_url = server_url.trim().trim_end_matches('/').to_owned();
        let base = Url::parse(&server_url).map_err(|e| {
            RemoteError::new(
                ErrorKind::Protocol,
                format!("invalid server URL '{server_url}': {e}"),
            )
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::new(
                ErrorKind::Protocol,
                format!("invalid server URL '{server_url}': expected http(s)://host[:port]"),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nebi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::transport("building HTTP client", &e))?;
        Ok(Self {
            base,
            server_url,
            token,
            client,
        })
    }

    /// Exchange a username and password for a bearer token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, RemoteError> {
        let url = self.endpoint(&["auth", "login"]);
        let request = self
            .client
            .post(url)
            .json(&LoginRequest { username, password });
        let response: LoginResponse = self.send_json("POST /auth/login", request)?;
        Ok(response.token)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(API_PREFIX);
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> (String, RequestBuilder) {
        let url = self.endpoint(segments);
        let label = format!("{method} {}", url.path());
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        (label, builder)
    }

    fn send(&self, label: &str, builder: RequestBuilder) -> Result<Response, RemoteError> {
        debug!(request = %label, "sending");
        let response = builder
            .send()
            .map_err(|e| RemoteError::transport(&format!("{label} ({})", self.server_url), &e))?;
        let status = response.status();
        debug!(request = %label, status = status.as_u16(), "received");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| body.trim().to_owned());
        let message = if detail.is_empty() {
            format!("{label}: {status}")
        } else {
            format!("{label}: {status}: {detail}")
        };
        Err(RemoteError::from_status(status.as_u16(), message))
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        label: &str,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        self.send(label, builder)?.json::<T>().map_err(|e| {
            RemoteError::new(ErrorKind::Protocol, format!("{label}: invalid response: {e}"))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RemoteError> {
        let (label, builder) = self.request(Method::GET, segments);
        self.send_json(&label, builder)
    }

    fn get_text(&self, segments: &[&str]) -> Result<String, RemoteError> {
        let (label, builder) = self.request(Method::GET, segments);
        self.send(&label, builder)?.text().map_err(|e| {
            RemoteError::new(ErrorKind::Protocol, format!("{label}: invalid body: {e}"))
        })
    }

    /// Like `get_text`, but a 404 means "absent".
    fn get_text_opt(&self, segments: &[&str]) -> Result<Option<String>, RemoteError> {
        match self.get_text(segments) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.is(ErrorKind::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn content(&self, prefix: &[&str]) -> Result<VersionContent, RemoteError> {
        let mut manifest_path = prefix.to_vec();
        manifest_path.push(MANIFEST_FILE);
        let mut lock_path = prefix.to_vec();
        lock_path.push(LOCK_FILE);

        let manifest = self.get_text(&manifest_path)?;
        let lock = self.get_text_opt(&lock_path)?.filter(|l| !l.is_empty());
        Ok(VersionContent { manifest, lock })
    }
}

impl ServerApi for HttpServer {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    fn health(&self) -> Result<(), RemoteError> {
        let url = {
            let mut url = self.base.clone();
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty();
                path.extend(API_PREFIX);
                path.push("health");
            }
            url
        };
        let label = format!("GET {}", url.path());
        self.send(&label, self.client.get(url)).map(|_| ())
    }

    fn list_workspaces(&self) -> Result<Vec<RemoteWorkspace>, RemoteError> {
        self.get_json(&["workspaces"])
    }

    fn get_workspace(&self, id: &str) -> Result<RemoteWorkspace, RemoteError> {
        self.get_json(&["workspaces", id])
    }

    fn create_workspace(
        &self,
        name: &str,
        manifest: &str,
    ) -> Result<RemoteWorkspace, RemoteError> {
        let (label, builder) = self.request(Method::POST, &["workspaces"]);
        let builder = builder.json(&CreateWorkspaceRequest {
            name,
            pixi_toml: manifest,
        });
        self.send_json(&label, builder)
    }

    fn delete_workspace(&self, id: &str) -> Result<(), RemoteError> {
        let (label, builder) = self.request(Method::DELETE, &["workspaces", id]);
        self.send(&label, builder).map(|_| ())
    }

    fn list_tags(&self, workspace_id: &str) -> Result<Vec<Tag>, RemoteError> {
        self.get_json(&["workspaces", workspace_id, "tags"])
    }

    fn list_versions(&self, workspace_id: &str) -> Result<Vec<Version>, RemoteError> {
        self.get_json(&["workspaces", workspace_id, "versions"])
    }

    fn get_tag_content(
        &self,
        workspace_id: &str,
        tag: &str,
    ) -> Result<VersionContent, RemoteError> {
        self.content(&["workspaces", workspace_id, "tags", tag])
    }

    fn get_version_content(
        &self,
        workspace_id: &str,
        version_number: u64,
    ) -> Result<VersionContent, RemoteError> {
        let number = version_number.to_string();
        self.content(&["workspaces", workspace_id, "versions", &number])
    }

    fn push_version(
        &self,
        workspace_id: &str,
        request: &PushRequest,
    ) -> Result<PushResponse, RemoteError> {
        let (label, builder) = self.request(Method::POST, &["workspaces", workspace_id, "push"]);
        self.send_json(&label, builder.json(request))
    }

    fn publish(
        &self,
        workspace_id: &str,
        request: &PublishRequest,
    ) -> Result<PublishResponse, RemoteError> {
        let (label, builder) =
            self.request(Method::POST, &["workspaces", workspace_id, "publish"]);
        self.send_json(&label, builder.json(request))
    }

    fn get_publish_defaults(&self, workspace_id: &str) -> Result<PublishDefaults, RemoteError> {
        self.get_json(&["workspaces", workspace_id, "publish-defaults"])
    }

    fn list_registries(&self) -> Result<Vec<Registry>, RemoteError> {
        self.get_json(&["registries"])
    }

    fn create_registry(&self, registry: &NewRegistry) -> Result<Registry, RemoteError> {
        let (label, builder) = self.request(Method::POST, &["registries"]);
        self.send_json(&label, builder.json(registry))
    }

    fn delete_registry(&self, id: &str) -> Result<(), RemoteError> {
        let (label, builder) = self.request(Method::DELETE, &["registries", id]);
        self.send(&label, builder).map(|_| ())
    }
}
