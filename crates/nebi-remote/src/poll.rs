//! Fixed-delay polling until a freshly created workspace is usable.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::api::ServerApi;
use crate::error::{ErrorKind, RemoteError};
use crate::types::{RemoteWorkspace, WorkspaceStatus};

/// Default `wait_for_ready` deadline.
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);
/// Default sampling period.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sample `get_workspace` every `interval` until it is `ready`.
///
/// `failed`/`error` and the deadline are errors. The workspace may still
/// finish setting up server-side after a timeout.
pub fn wait_for_ready(
    api: &dyn ServerApi,
    workspace_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<RemoteWorkspace, RemoteError> {
    poll_until_ready(|| api.get_workspace(workspace_id), timeout, interval)
}

/// The polling loop behind [`wait_for_ready`], generic over the probe.
pub fn poll_until_ready(
    mut probe: impl FnMut() -> Result<RemoteWorkspace, RemoteError>,
    timeout: Duration,
    interval: Duration,
) -> Result<RemoteWorkspace, RemoteError> {
    // A timeout too large for `Instant` means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let ws = probe()?;
        debug!(workspace = %ws.name, status = %ws.status, "polled workspace status");
        match ws.status {
            WorkspaceStatus::Ready => return Ok(ws),
            WorkspaceStatus::Failed | WorkspaceStatus::Error => {
                return Err(RemoteError::new(
                    ErrorKind::SetupFailed,
                    format!(
                        "workspace '{}' setup {} on the server",
                        ws.name, ws.status
                    ),
                ));
            }
            WorkspaceStatus::Pending | WorkspaceStatus::Creating | WorkspaceStatus::Unknown => {}
        }
        let now = Instant::now();
        let remaining = deadline.map(|d| d.saturating_duration_since(now));
        if remaining == Some(Duration::ZERO) {
            return Err(RemoteError::new(
                ErrorKind::Timeout,
                format!(
                    "workspace '{}' was not ready after {}s (last status: {})",
                    ws.name,
                    timeout.as_secs(),
                    ws.status
                ),
            ));
        }
        std::thread::sleep(remaining.map_or(interval, |r| interval.min(r)));
    }
}
