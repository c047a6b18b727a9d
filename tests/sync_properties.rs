//! Property tests for the push/pull/status contract.
//!
//! Random manifests (dependency tables with arbitrary names and version
//! constraints) and optional locks are run through the engine against the
//! in-memory server:
//!
//! - a forced pull writes exactly the bytes the server holds
//! - after a pull, `status` reports everything unchanged and in sync
//! - pushing the same content twice never creates a second version
//! - untracking and re-tracking a directory keeps the manifest's name

mod common;

use common::*;
use nebi::sync::{FileState, RemoteState, status};
use nebi::tracking::{self, InitOutcome};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_dependencies() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,10}", "(>=|==|~=)?[0-9]\\.[0-9]{1,2}", 0..6)
        .prop_map(|deps| deps.into_iter().collect())
}

fn arb_manifest() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9-]{0,12}", arb_dependencies()).prop_map(|(name, deps)| {
        let mut manifest = format!(
            "[workspace]\nname = \"{name}\"\nchannels = [\"conda-forge\"]\nplatforms = [\"linux-64\"]\n\n[dependencies]\n"
        );
        for (dep, constraint) in deps {
            manifest.push_str(&format!("{dep} = \"{constraint}\"\n"));
        }
        manifest
    })
}

fn arb_lock() -> impl Strategy<Value = Option<String>> {
    prop::option::of("version: 6\n(packages:\n- conda: [a-z]{3,8}\n){0,1}")
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn forced_pull_reproduces_pushed_bytes(manifest in arb_manifest(), lock in arb_lock()) {
        let env = TestEnv::new();
        let server = FakeServer::new();
        let source = env.project("source", &manifest, lock.as_deref());
        env.push(&server, &source, "shared:v1").unwrap();

        let target = env.root.path().join("target");
        let report = env.pull_ok(&server, env.root.path(), "shared:v1", &target);

        prop_assert_eq!(std::fs::read_to_string(target.join("pixi.toml")).unwrap(), manifest);
        prop_assert_eq!(std::fs::read_to_string(target.join("pixi.lock")).ok(), lock.clone());
        prop_assert_eq!(report.wrote_lock, lock.is_some());
    }

    #[test]
    fn status_after_pull_is_clean(manifest in arb_manifest(), lock in arb_lock()) {
        let env = TestEnv::new();
        let server = FakeServer::new();
        server.push_direct("shared", "stable", &manifest, lock.as_deref());

        let target = env.root.path().join("checkout");
        env.pull_ok(&server, env.root.path(), "shared:stable", &target);

        let report = status(&env.store, &target, Some(SERVER_URL), Some(&server)).unwrap();
        let origin = report.origin.as_ref().unwrap();
        prop_assert_eq!(origin.manifest, FileState::Unchanged);
        let expected_lock = if lock.is_some() { FileState::Unchanged } else { FileState::Absent };
        prop_assert_eq!(origin.lock, expected_lock);
        prop_assert_eq!(&origin.remote, &RemoteState::InSync);
        prop_assert!(!report.has_drift());
    }

    #[test]
    fn repeated_push_is_deduplicated(manifest in arb_manifest(), tags in prop::collection::btree_set("v[0-9]{1,3}", 1..4)) {
        let env = TestEnv::new();
        let server = FakeServer::new();
        let dir = env.project("demo", &manifest, None);

        let mut versions = Vec::new();
        for tag in &tags {
            let outcome = env.push(&server, &dir, &format!("demo:{tag}")).unwrap();
            prop_assert_eq!(outcome.deduplicated, !versions.is_empty());
            versions.push(outcome.version_number);
        }
        prop_assert!(versions.iter().all(|v| *v == versions[0]));
        prop_assert_eq!(server.version_count("demo"), 1);
    }

    #[test]
    fn retracking_keeps_the_manifest_name(manifest in arb_manifest()) {
        let env = TestEnv::new();
        let dir = env.project("project", &manifest, None);

        let InitOutcome::Created(first) = tracking::init(&env.store, &dir).unwrap() else {
            panic!("fresh directory was already tracked");
        };
        tracking::remove(&env.store, &first).unwrap();
        let InitOutcome::Created(second) = tracking::init(&env.store, &dir).unwrap() else {
            panic!("removed directory still tracked");
        };
        prop_assert_eq!(&first.name, &second.name);
        prop_assert_ne!(&first.id, &second.id);
        prop_assert_eq!(second.path, dir);
    }
}
