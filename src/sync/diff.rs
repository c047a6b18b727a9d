//! `diff [source] [target]`: pick the two snapshots to compare and load
//! them.
//!
//! | args       | source                  | target          |
//! |------------|-------------------------|-----------------|
//! | none       | origin version (or tag) | `-C` dir        |
//! | ref        | server version          | `-C` dir        |
//! | path       | that dir                | `-C` dir        |
//! | a, b       | a                       | b               |
//!
//! A ref with no name borrows the name from the `-C` directory's origin.
//! Two refs must both carry explicit tags. `--remote` only goes with no args.

use std::path::{Path, PathBuf};

use nebi_remote::{ErrorKind, RemoteError, ServerApi, VersionContent};
use nebi_store::Store;
use tracing::{debug, instrument};

use super::{find_remote, missing_name, origin_of};
use crate::diff::{self, DiffReport, Snapshot};
use crate::error::NebiError;
use crate::files::WorkspaceFiles;
use crate::refs::{Reference, Target, classify};

/// Raw command-line inputs of `diff`.
#[derive(Clone, Debug, Default)]
pub struct DiffArgs {
    /// Zero, one, or two positional tokens.
    pub args: Vec<String>,
    /// With no positional args, compare against the origin's current tag
    /// rather than the version recorded at the last sync.
    pub remote: bool,
    /// The `-C` directory; relative to the working directory.
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffSide {
    Local(PathBuf),
    /// A server ref; `tag: None` means the newest version.
    Remote { name: String, tag: Option<String> },
    /// The exact version recorded by the last push or pull.
    OriginVersion {
        name: String,
        tag: String,
        version_number: Option<u64>,
    },
}

impl DiffSide {
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local(_))
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote { name, tag: Some(tag) } => format!("{name}:{tag}"),
            Self::Remote { name, tag: None } => format!("{name} (latest)"),
            Self::OriginVersion {
                name,
                tag,
                version_number: Some(n),
            } => format!("{name}:{tag} (version {n})"),
            Self::OriginVersion { name, tag, .. } => format!("{name}:{tag}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffPlan {
    pub source: DiffSide,
    pub target: DiffSide,
}

impl DiffPlan {
    #[must_use]
    pub fn needs_server(&self) -> bool {
        self.source.is_remote() || self.target.is_remote()
    }
}

/// Resolve the arguments into two sides without touching the network.
pub fn plan_diff(
    store: &Store,
    cwd: &Path,
    server_url: Option<&str>,
    args: &DiffArgs,
) -> Result<DiffPlan, NebiError> {
    let base = match &args.dir {
        Some(dir) => store.normalize(&cwd.join(dir)),
        None => store.normalize(cwd),
    };

    if args.remote && !args.args.is_empty() {
        return Err(NebiError::BadReference {
            input: args.args.join(" "),
            reason: "--remote only applies when no arguments are given; name a server side as name:tag instead".to_owned(),
        });
    }

    match args.args.as_slice() {
        [] => {
            let (_, origin) = origin_of(store, &base, server_url)?;
            let Some(origin) = origin else {
                return Err(NebiError::NoOrigin {
                    what: "nothing to compare against".to_owned(),
                    path: base,
                    hint: "push or pull first, or name both sides, e.g. 'nebi diff demo:v1 .'"
                        .to_owned(),
                });
            };
            let source = if args.remote {
                DiffSide::Remote {
                    name: origin.name,
                    tag: Some(origin.tag),
                }
            } else {
                DiffSide::OriginVersion {
                    name: origin.name,
                    tag: origin.tag,
                    version_number: origin.version_number,
                }
            };
            Ok(DiffPlan {
                source,
                target: DiffSide::Local(base),
            })
        }
        [one] => {
            let source = side(store, &base, cwd, server_url, one, false)?;
            Ok(DiffPlan {
                source,
                target: DiffSide::Local(base),
            })
        }
        [a, b] => {
            let both_refs = matches!(
                (classify(a, cwd), classify(b, cwd)),
                (Target::Ref(_), Target::Ref(_))
            );
            Ok(DiffPlan {
                source: side(store, &base, cwd, server_url, a, both_refs)?,
                target: side(store, &base, cwd, server_url, b, both_refs)?,
            })
        }
        _ => Err(NebiError::BadReference {
            input: args.args.join(" "),
            reason: "diff takes at most two arguments".to_owned(),
        }),
    }
}

fn side(
    store: &Store,
    base: &Path,
    cwd: &Path,
    server_url: Option<&str>,
    token: &str,
    require_tag: bool,
) -> Result<DiffSide, NebiError> {
    match classify(token, cwd) {
        Target::Path(path) => Ok(DiffSide::Local(store.normalize(&path))),
        Target::Ref(reference) => {
            if require_tag && reference.tag().is_none() {
                return Err(NebiError::BadReference {
                    input: token.to_owned(),
                    reason: "comparing two server versions needs an explicit tag on both, \
                             e.g. 'demo:v1 demo:v2'"
                        .to_owned(),
                });
            }
            let name = ref_name(store, base, server_url, token, &reference)?;
            Ok(DiffSide::Remote {
                name,
                tag: reference.tag().map(str::to_owned),
            })
        }
    }
}

fn ref_name(
    store: &Store,
    base: &Path,
    server_url: Option<&str>,
    token: &str,
    reference: &Reference,
) -> Result<String, NebiError> {
    if let Some(name) = reference.name() {
        return Ok(name.to_owned());
    }
    let (_, origin) = origin_of(store, base, server_url)?;
    origin.map(|o| o.name).ok_or_else(|| {
        missing_name(base, "workspace name is required", &format!("nebi diff <name>{token}"))
    })
}

/// Load both sides and compare them.
///
/// `server` must be `Some` when [`DiffPlan::needs_server`] is true. Two
/// remote sides are fetched concurrently.
#[instrument(skip_all, fields(source = %plan.source.label(), target = %plan.target.label()))]
pub fn run_diff(
    plan: &DiffPlan,
    server: Option<&dyn ServerApi>,
    context: usize,
) -> Result<DiffReport, NebiError> {
    let (source, target) = if plan.source.is_remote() && plan.target.is_remote() {
        std::thread::scope(|scope| {
            let source = scope.spawn(|| load(&plan.source, server));
            let target = load(&plan.target, server);
            let source = source
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (source, target)
        })
    } else {
        (load(&plan.source, server), load(&plan.target, server))
    };
    Ok(diff::compare(&source?, &target?, context))
}

fn load(side: &DiffSide, server: Option<&dyn ServerApi>) -> Result<Snapshot, NebiError> {
    let label = side.label();
    let files = match side {
        DiffSide::Local(dir) => WorkspaceFiles::read(dir)?,
        DiffSide::Remote { name, tag } => {
            let server = server.ok_or(NebiError::NoServer)?;
            let remote = find_remote(server, name)?;
            let content = match tag {
                Some(tag) => server.get_tag_content(&remote.id, tag)?,
                None => {
                    let latest = latest_version(server, &remote.id, name)?;
                    server.get_version_content(&remote.id, latest)?
                }
            };
            into_files(content)
        }
        DiffSide::OriginVersion {
            name,
            tag,
            version_number,
        } => {
            let server = server.ok_or(NebiError::NoServer)?;
            let remote = find_remote(server, name)?;
            let content = match version_number {
                Some(n) => server.get_version_content(&remote.id, *n)?,
                None => server.get_tag_content(&remote.id, tag)?,
            };
            into_files(content)
        }
    };
    debug!(side = %label, lock = files.lock.is_some(), "loaded diff side");
    Ok(Snapshot { label, files })
}

fn latest_version(server: &dyn ServerApi, id: &str, name: &str) -> Result<u64, NebiError> {
    server
        .list_versions(id)?
        .into_iter()
        .map(|v| v.version_number)
        .max()
        .ok_or_else(|| {
            NebiError::Remote(RemoteError::new(
                ErrorKind::NotFound,
                format!("workspace '{name}' has no versions"),
            ))
        })
}

fn into_files(content: VersionContent) -> WorkspaceFiles {
    WorkspaceFiles::new(content.manifest, content.lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebi_store::{Origin, SyncAction};
    use tempfile::tempdir;

    fn args(list: &[&str]) -> DiffArgs {
        DiffArgs {
            args: list.iter().map(|s| (*s).to_owned()).collect(),
            ..DiffArgs::default()
        }
    }

    fn store_with_origin(root: &Path) -> Store {
        let store = Store::open(root.join("data"), root).unwrap();
        let mut ws = store.create(root, "demo").unwrap();
        ws.set_origin(Origin {
            server_url: "https://s".into(),
            name: "demo".into(),
            tag: "v1".into(),
            action: SyncAction::Push,
            manifest_hash: "h".into(),
            lock_hash: None,
            version_number: Some(4),
            synced_at: 0,
        });
        store.save(&ws).unwrap();
        store
    }

    #[test]
    fn remote_flag_with_arguments_is_rejected() {
        let root = tempdir().unwrap();
        let store = store_with_origin(root.path());
        for list in [&["demo:v2"][..], &["demo:v1", "."][..]] {
            let err = plan_diff(
                &store,
                root.path(),
                Some("https://s"),
                &DiffArgs {
                    remote: true,
                    ..args(list)
                },
            )
            .unwrap_err();
            assert!(matches!(err, NebiError::BadReference { .. }), "{err}");
            assert!(err.to_string().contains("--remote"), "{err}");
        }
    }

    #[test]
    fn no_args_compares_origin_version_to_working_tree() {
        let root = tempdir().unwrap();
        let store = store_with_origin(root.path());
        let plan = plan_diff(&store, root.path(), Some("https://s"), &args(&[])).unwrap();
        assert_eq!(
            plan.source,
            DiffSide::OriginVersion {
                name: "demo".into(),
                tag: "v1".into(),
                version_number: Some(4)
            }
        );
        assert_eq!(plan.target, DiffSide::Local(store.normalize(root.path())));

        let remote = DiffArgs {
            remote: true,
            ..args(&[])
        };
        let plan = plan_diff(&store, root.path(), Some("https://s"), &remote).unwrap();
        assert_eq!(
            plan.source,
            DiffSide::Remote {
                name: "demo".into(),
                tag: Some("v1".into())
            }
        );
    }

    #[test]
    fn no_args_without_origin_fails() {
        let root = tempdir().unwrap();
        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        let err = plan_diff(&store, root.path(), Some("https://s"), &args(&[])).unwrap_err();
        assert!(matches!(err, NebiError::NoOrigin { .. }));
    }

    #[test]
    fn two_refs_need_tags() {
        let root = tempdir().unwrap();
        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        let err = plan_diff(&store, root.path(), None, &args(&["demo:v1", "demo"])).unwrap_err();
        assert!(matches!(err, NebiError::BadReference { .. }));

        let plan = plan_diff(&store, root.path(), None, &args(&["demo:v1", "demo:v2"])).unwrap();
        assert_eq!(plan.source.label(), "demo:v1");
        assert_eq!(plan.target.label(), "demo:v2");
    }

    #[test]
    fn single_ref_without_tag_means_latest() {
        let root = tempdir().unwrap();
        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        let plan = plan_diff(&store, root.path(), None, &args(&["demo"])).unwrap();
        assert_eq!(
            plan.source,
            DiffSide::Remote {
                name: "demo".into(),
                tag: None
            }
        );
        assert!(plan.needs_server());
    }

    #[test]
    fn tag_only_borrows_origin_name() {
        let root = tempdir().unwrap();
        let store = store_with_origin(root.path());
        let plan = plan_diff(&store, root.path(), Some("https://s"), &args(&[":v3"])).unwrap();
        assert_eq!(
            plan.source,
            DiffSide::Remote {
                name: "demo".into(),
                tag: Some("v3".into())
            }
        );
    }

    #[test]
    fn local_paths_need_no_server() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("pixi.toml"), "[workspace]\nname = \"x\"\n").unwrap();
        std::fs::write(b.join("pixi.toml"), "[workspace]\nname = \"x\"\n\n[dependencies]\nnumpy = \"*\"\n").unwrap();

        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        let plan = plan_diff(&store, root.path(), None, &args(&["./a", "./b"])).unwrap();
        assert!(!plan.needs_server());
        let report = run_diff(&plan, None, 3).unwrap();
        assert!(report.has_changes());
        assert!(diff::render_unified(&report).contains("+numpy = \"*\""));
    }

    #[test]
    fn missing_manifest_on_a_local_side_is_an_error() {
        let root = tempdir().unwrap();
        let store = Store::open(root.path().join("data"), root.path()).unwrap();
        let plan = plan_diff(&store, root.path(), None, &args(&["./nope"])).unwrap();
        assert!(matches!(
            run_diff(&plan, None, 3).unwrap_err(),
            NebiError::MissingManifest { .. }
        ));
    }
}
