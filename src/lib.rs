//! nebi library crate.
//!
//! The primary interface is the `nebi` binary. This crate holds everything
//! below the CLI so integration tests can drive the sync engine against an
//! in-memory server: reference resolution, tracking, push/pull/status/diff,
//! OCI import, and publishing.

pub mod config;
pub mod diff;
pub mod error;
pub mod files;
pub mod prompt;
pub mod publish;
pub mod refs;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod tracking;

pub use error::NebiError;

// Binary-only modules, not re-exported: commands, format.
