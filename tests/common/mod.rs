//! Shared test helpers for nebi integration tests.
//!
//! Everything runs against temp directories and an in-memory server; no
//! test touches the real data or config dir, and none sets process env.
#![allow(dead_code)]

pub mod http_stub;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Mutex, MutexGuard};

use nebi::prompt::Answer;
use nebi::sync::{PullOutcome, PullPlan, PullReport, PushOutcome, PushPlan, SyncOptions};
use nebi_remote::{
    ErrorKind, NewRegistry, PublishDefaults, PublishRequest, PublishResponse, PushRequest,
    PushResponse, Registry, RemoteError, RemoteWorkspace, ServerApi, Tag, Version,
    VersionContent, WorkspaceStatus,
};
use nebi_store::{Store, content_tag, toml_content_hash};
use tempfile::TempDir;

pub const SERVER_URL: &str = "https://nebi.test";

pub const DEMO_MANIFEST: &str = r#"[workspace]
name = "demo"
channels = ["conda-forge"]
platforms = ["linux-64"]

[dependencies]
python = ">=3.11"
"#;

pub const DEMO_LOCK: &str = r"version: 6
environments:
  default:
    channels:
    - url: https://conda.anaconda.org/conda-forge/
packages:
- conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.1-hab00c5b_1_cpython.conda
  sha256: 0000000000000000000000000000000000000000000000000000000000000000
";

// ---------------------------------------------------------------------------
// FakeServer
// ---------------------------------------------------------------------------

/// In-memory nebi server with the push/dedup/tag rules of the real one.
pub struct FakeServer {
    url: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    workspaces: Vec<FakeWorkspace>,
    registries: Vec<Registry>,
    /// Publications per repository, for the next `v<N>`.
    publications: BTreeMap<String, u64>,
    offline: bool,
    /// `get_workspace` calls a new workspace stays pending for.
    pending_polls: u32,
    fail_setup: bool,
    calls: Vec<String>,
}

struct FakeWorkspace {
    remote: RemoteWorkspace,
    versions: Vec<StoredVersion>,
    tags: BTreeMap<String, u64>,
    pending_polls: u32,
}

#[derive(Clone)]
struct StoredVersion {
    number: u64,
    manifest: String,
    lock: Option<String>,
    content_hash: String,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            url: SERVER_URL.to_owned(),
            state: Mutex::new(State {
                pending_polls: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Every call fails as unreachable while set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn set_fail_setup(&self, fail: bool) {
        self.state().fail_setup = fail;
    }

    /// Names of the `ServerApi` methods called so far.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn version_count(&self, name: &str) -> usize {
        self.state()
            .workspaces
            .iter()
            .find(|w| w.remote.name == name)
            .map_or(0, |w| w.versions.len())
    }

    /// Push as another client would, bypassing the local store.
    pub fn push_direct(&self, name: &str, tag: &str, manifest: &str, lock: Option<&str>) -> PushResponse {
        let id = match self.find_workspace(name).unwrap() {
            Some(ws) => ws.id,
            None => {
                let ws = self.create_workspace(name, manifest).unwrap();
                self.state().workspaces.last_mut().unwrap().pending_polls = 0;
                ws.id
            }
        };
        self.push_version(
            &id,
            &PushRequest {
                tag: tag.to_owned(),
                pixi_toml: manifest.to_owned(),
                pixi_lock: lock.map(str::to_owned),
                force: true,
            },
        )
        .unwrap()
    }

    pub fn add_registry(&self, name: &str, is_default: bool) -> Registry {
        self.create_registry(&NewRegistry {
            name: name.to_owned(),
            url: format!("https://{name}.example"),
            is_default,
            ..NewRegistry::default()
        })
        .unwrap()
    }

    fn enter(&self, call: &str) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.state();
        state.calls.push(call.to_owned());
        if state.offline {
            return Err(RemoteError::new(
                ErrorKind::Unreachable,
                format!("{call} ({}): connection refused", self.url),
            ));
        }
        Ok(state)
    }
}

fn not_found(what: String) -> RemoteError {
    RemoteError::from_status(404, what)
}

impl State {
    fn workspace(&self, id: &str) -> Result<&FakeWorkspace, RemoteError> {
        self.workspaces
            .iter()
            .find(|w| w.remote.id == id)
            .ok_or_else(|| not_found(format!("workspace {id} not found")))
    }

    fn workspace_mut(&mut self, id: &str) -> Result<&mut FakeWorkspace, RemoteError> {
        self.workspaces
            .iter_mut()
            .find(|w| w.remote.id == id)
            .ok_or_else(|| not_found(format!("workspace {id} not found")))
    }
}

impl FakeWorkspace {
    fn version(&self, number: u64) -> Result<&StoredVersion, RemoteError> {
        self.versions
            .iter()
            .find(|v| v.number == number)
            .ok_or_else(|| not_found(format!("version {number} not found")))
    }
}

fn content(v: &StoredVersion) -> VersionContent {
    VersionContent {
        manifest: v.manifest.clone(),
        lock: v.lock.clone(),
    }
}

impl ServerApi for FakeServer {
    fn server_url(&self) -> &str {
        &self.url
    }

    fn health(&self) -> Result<(), RemoteError> {
        self.enter("health").map(|_| ())
    }

    fn list_workspaces(&self) -> Result<Vec<RemoteWorkspace>, RemoteError> {
        let state = self.enter("list_workspaces")?;
        Ok(state.workspaces.iter().map(|w| w.remote.clone()).collect())
    }

    fn get_workspace(&self, id: &str) -> Result<RemoteWorkspace, RemoteError> {
        let mut state = self.enter("get_workspace")?;
        let fail = state.fail_setup;
        let ws = state.workspace_mut(id)?;
        if ws.remote.status == WorkspaceStatus::Pending {
            if ws.pending_polls == 0 {
                ws.remote.status = if fail {
                    WorkspaceStatus::Failed
                } else {
                    WorkspaceStatus::Ready
                };
            } else {
                ws.pending_polls -= 1;
            }
        }
        Ok(ws.remote.clone())
    }

    fn create_workspace(&self, name: &str, _manifest: &str) -> Result<RemoteWorkspace, RemoteError> {
        let mut state = self.enter("create_workspace")?;
        if state.workspaces.iter().any(|w| w.remote.name == name) {
            return Err(RemoteError::from_status(409, format!("workspace '{name}' exists")));
        }
        state.next_id += 1;
        let remote = RemoteWorkspace {
            id: format!("ws-{}", state.next_id),
            name: name.to_owned(),
            status: WorkspaceStatus::Pending,
            owner: None,
            package_manager: Some("pixi".to_owned()),
            created_at: None,
            updated_at: None,
        };
        let pending_polls = state.pending_polls;
        state.workspaces.push(FakeWorkspace {
            remote: remote.clone(),
            versions: Vec::new(),
            tags: BTreeMap::new(),
            pending_polls,
        });
        Ok(remote)
    }

    fn delete_workspace(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_workspace")?;
        state.workspace(id)?;
        state.workspaces.retain(|w| w.remote.id != id);
        Ok(())
    }

    fn list_tags(&self, workspace_id: &str) -> Result<Vec<Tag>, RemoteError> {
        let state = self.enter("list_tags")?;
        let ws = state.workspace(workspace_id)?;
        Ok(ws
            .tags
            .iter()
            .map(|(tag, n)| Tag {
                tag: tag.clone(),
                version_number: *n,
                created_at: None,
                updated_at: None,
            })
            .collect())
    }

    fn list_versions(&self, workspace_id: &str) -> Result<Vec<Version>, RemoteError> {
        let state = self.enter("list_versions")?;
        let ws = state.workspace(workspace_id)?;
        Ok(ws
            .versions
            .iter()
            .map(|v| Version {
                version_number: v.number,
                content_hash: Some(v.content_hash.clone()),
                created_at: None,
            })
            .collect())
    }

    fn get_tag_content(&self, workspace_id: &str, tag: &str) -> Result<VersionContent, RemoteError> {
        let state = self.enter("get_tag_content")?;
        let ws = state.workspace(workspace_id)?;
        let number = ws
            .tags
            .get(tag)
            .ok_or_else(|| not_found(format!("tag '{tag}' not found")))?;
        Ok(content(ws.version(*number)?))
    }

    fn get_version_content(
        &self,
        workspace_id: &str,
        version_number: u64,
    ) -> Result<VersionContent, RemoteError> {
        let state = self.enter("get_version_content")?;
        let ws = state.workspace(workspace_id)?;
        Ok(content(ws.version(version_number)?))
    }

    fn push_version(&self, workspace_id: &str, request: &PushRequest) -> Result<PushResponse, RemoteError> {
        let mut state = self.enter("push_version")?;
        let ws = state.workspace_mut(workspace_id)?;
        let hash = toml_content_hash(&request.pixi_toml);

        let existing = ws.versions.iter().find(|v| v.content_hash == hash).map(|v| v.number);
        if !request.tag.is_empty()
            && !request.force
            && let Some(current) = ws.tags.get(&request.tag)
            && Some(*current) != existing
        {
            return Err(RemoteError::from_status(
                409,
                format!("tag '{}' already points at version {current}", request.tag),
            ));
        }

        let (number, deduplicated) = match existing {
            Some(n) => (n, true),
            None => {
                let n = ws.versions.iter().map(|v| v.number).max().unwrap_or(0) + 1;
                ws.versions.push(StoredVersion {
                    number: n,
                    manifest: request.pixi_toml.clone(),
                    lock: request.pixi_lock.clone(),
                    content_hash: hash.clone(),
                });
                (n, false)
            }
        };

        let mut tags = vec![content_tag(&hash), "latest".to_owned()];
        if !request.tag.is_empty() {
            tags.push(request.tag.clone());
        }
        for tag in &tags {
            ws.tags.insert(tag.clone(), number);
        }
        Ok(PushResponse {
            version_number: number,
            tags,
            content_hash: hash,
            deduplicated,
        })
    }

    fn publish(&self, workspace_id: &str, request: &PublishRequest) -> Result<PublishResponse, RemoteError> {
        let mut state = self.enter("publish")?;
        state.workspace(workspace_id)?;
        if !state.registries.iter().any(|r| r.id == request.registry_id) {
            return Err(not_found(format!("registry {} not found", request.registry_id)));
        }
        *state.publications.entry(request.repository.clone()).or_default() += 1;
        Ok(PublishResponse {
            repository: request.repository.clone(),
            tag: request.tag.clone(),
            digest: format!("sha256:{:064x}", state.publications.len()),
        })
    }

    fn get_publish_defaults(&self, workspace_id: &str) -> Result<PublishDefaults, RemoteError> {
        let state = self.enter("get_publish_defaults")?;
        let ws = state.workspace(workspace_id)?;
        let registry = state
            .registries
            .iter()
            .find(|r| r.is_default)
            .or_else(|| state.registries.first())
            .ok_or_else(|| RemoteError::from_status(400, "no registries configured"))?;
        let published = state.publications.get(&ws.remote.name).copied().unwrap_or(0);
        Ok(PublishDefaults {
            registry_id: registry.id.clone(),
            registry_name: registry.name.clone(),
            repository: ws.remote.name.clone(),
            tag: format!("v{}", published + 1),
        })
    }

    fn list_registries(&self) -> Result<Vec<Registry>, RemoteError> {
        Ok(self.enter("list_registries")?.registries.clone())
    }

    fn create_registry(&self, registry: &NewRegistry) -> Result<Registry, RemoteError> {
        let mut state = self.enter("create_registry")?;
        state.next_id += 1;
        let created = Registry {
            id: format!("reg-{}", state.next_id),
            name: registry.name.clone(),
            url: registry.url.clone(),
            namespace: registry.namespace.clone(),
            is_default: registry.is_default,
        };
        state.registries.push(created.clone());
        Ok(created)
    }

    fn delete_registry(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_registry")?;
        let before = state.registries.len();
        state.registries.retain(|r| r.id != id);
        if state.registries.len() == before {
            return Err(not_found(format!("registry {id} not found")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestEnv
// ---------------------------------------------------------------------------

/// Isolated data dir, config dir and project directories.
pub struct TestEnv {
    pub root: TempDir,
    pub store: Store,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        store.set_server_url(SERVER_URL).unwrap();
        Self { root, store }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.path().join("config")
    }

    /// A fresh project directory holding `manifest` and, optionally, `lock`.
    pub fn project(&self, dir: &str, manifest: &str, lock: Option<&str>) -> PathBuf {
        let path = self.root.path().join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("pixi.toml"), manifest).unwrap();
        if let Some(lock) = lock {
            std::fs::write(path.join("pixi.lock"), lock).unwrap();
        }
        self.store.normalize(&path)
    }

    pub fn push(&self, server: &FakeServer, dir: &Path, arg: &str) -> Result<PushOutcome, nebi::NebiError> {
        let plan = PushPlan::resolve(&self.store, dir, Some(SERVER_URL), Some(arg))?;
        plan.execute(&self.store, server, false, fast_options())
    }

    pub fn pull(
        &self,
        server: &FakeServer,
        cwd: &Path,
        arg: Option<&str>,
        output: Option<&Path>,
        force: bool,
        answer: bool,
    ) -> Result<PullOutcome, nebi::NebiError> {
        let plan = PullPlan::resolve(&self.store, cwd, Some(SERVER_URL), arg, output, false)?;
        plan.execute(&self.store, server, force, &Answer(answer))
    }

    /// Pull that must write files.
    pub fn pull_ok(&self, server: &FakeServer, cwd: &Path, arg: &str, output: &Path) -> PullReport {
        match self.pull(server, cwd, Some(arg), Some(output), true, false).unwrap() {
            PullOutcome::Pulled(report) => report,
            PullOutcome::Aborted => panic!("pull with --force aborted"),
        }
    }

    /// Run the `nebi` binary with isolated directories and no server env.
    pub fn nebi(&self, cwd: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_nebi"))
            .args(args)
            .current_dir(cwd)
            .env("NEBI_DATA_DIR", self.data_dir())
            .env("NEBI_CONFIG_DIR", self.config_dir())
            .env_remove("NEBI_SERVER")
            .env_remove("NEBI_TOKEN")
            .env_remove("NEBI_LOG")
            .env_remove("RUST_LOG")
            .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
            .output()
            .expect("failed to run nebi")
    }
}

pub fn fast_options() -> SyncOptions {
    SyncOptions {
        ready_timeout: std::time::Duration::from_secs(2),
        poll_interval: std::time::Duration::from_millis(1),
    }
}

pub fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}
