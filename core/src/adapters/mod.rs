//! Port source adapters.
//!
//! Platform-specific discovery and termination, behind one facade. The
//! facade is an explicit value constructed at startup and passed by
//! reference into everything that needs discovery or kills; there is no
//! process-wide platform singleton.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use std::time::Duration;

use crate::domain::PortInfo;
use crate::error::Result;

/// Interface for listening-socket discovery and process termination.
///
/// Implementations shell out to OS-native inspection tools; tests inject
/// mocks.
pub trait PortSource: Send + Sync {
    /// Discover currently listening sockets, enriched with process
    /// metadata.
    fn detect_ports(&self) -> impl std::future::Future<Output = Result<Vec<PortInfo>>> + Send;

    /// Kill a process.
    ///
    /// If `force` is true, terminates forcefully right away. Otherwise
    /// requests graceful termination and escalates after a grace period if
    /// the process is still alive. Every attempt, regardless of outcome,
    /// invalidates the pid's metadata cache entry.
    fn kill_process(
        &self,
        pid: u32,
        force: bool,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Drop cached metadata for a pid. Pids are reused by the OS, so stale
    /// command/cwd would misattribute.
    fn invalidate_metadata(&self, pid: u32);
}

/// The platform-selected port source.
pub struct SystemPortSource {
    #[cfg(unix)]
    inner: unix::UnixSource,

    #[cfg(windows)]
    inner: windows::WindowsSource,
}

impl SystemPortSource {
    /// Create a port source for the current platform.
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            inner: unix::UnixSource::new(),

            #[cfg(windows)]
            inner: windows::WindowsSource::new(),
        }
    }
}

impl Default for SystemPortSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSource for SystemPortSource {
    async fn detect_ports(&self) -> Result<Vec<PortInfo>> {
        self.inner.detect_ports().await
    }

    async fn kill_process(&self, pid: u32, force: bool) -> Result<bool> {
        self.inner.kill_process(pid, force).await
    }

    fn invalidate_metadata(&self, pid: u32) {
        self.inner.invalidate_metadata(pid);
    }
}

/// How long a graceful termination request gets before escalation.
pub(crate) const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Platform primitives the shared kill sequencing is built from.
pub(crate) trait KillOps {
    /// Submit a graceful termination request. `Ok(false)` means the
    /// request itself failed to submit.
    fn request_graceful(&self, pid: u32)
        -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Terminate forcefully; success iff the underlying operation
    /// succeeded.
    fn request_forceful(&self, pid: u32)
        -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Liveness check: does the pid still exist?
    fn is_alive(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;
}

/// Graceful-then-forceful termination with liveness verification.
///
/// Forced kills skip straight to the forceful path. A graceful request
/// that fails to submit returns failure without waiting. Otherwise waits
/// out the grace period, then escalates only if the process survived.
pub(crate) async fn kill_with_escalation<O: KillOps>(
    ops: &O,
    pid: u32,
    force: bool,
) -> Result<bool> {
    if force {
        return ops.request_forceful(pid).await;
    }

    if !ops.request_graceful(pid).await? {
        return Ok(false);
    }

    tokio::time::sleep(GRACE_PERIOD).await;

    if !ops.is_alive(pid).await {
        return Ok(true);
    }

    tracing::debug!(pid, "process survived graceful termination, escalating");
    ops.request_forceful(pid).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock that counts signals and scripts liveness.
    struct ScriptedOps {
        graceful_submits: bool,
        alive_after_grace: bool,
        forceful_succeeds: bool,
        graceful_count: AtomicUsize,
        forceful_count: AtomicUsize,
    }

    impl ScriptedOps {
        fn new(graceful_submits: bool, alive_after_grace: bool, forceful_succeeds: bool) -> Self {
            Self {
                graceful_submits,
                alive_after_grace,
                forceful_succeeds,
                graceful_count: AtomicUsize::new(0),
                forceful_count: AtomicUsize::new(0),
            }
        }
    }

    impl KillOps for ScriptedOps {
        async fn request_graceful(&self, _pid: u32) -> Result<bool> {
            self.graceful_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.graceful_submits)
        }

        async fn request_forceful(&self, _pid: u32) -> Result<bool> {
            self.forceful_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.forceful_succeeds)
        }

        async fn is_alive(&self, _pid: u32) -> bool {
            self.alive_after_grace
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_exit_never_escalates() {
        let ops = ScriptedOps::new(true, false, true);
        let killed = kill_with_escalation(&ops, 42, false).await.unwrap();
        assert!(killed);
        assert_eq!(ops.graceful_count.load(Ordering::SeqCst), 1);
        assert_eq!(ops.forceful_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_survivor_gets_exactly_one_forceful_signal() {
        let ops = ScriptedOps::new(true, true, true);
        let killed = kill_with_escalation(&ops, 42, false).await.unwrap();
        assert!(killed);
        assert_eq!(ops.forceful_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forceful_outcome_determines_result() {
        let ops = ScriptedOps::new(true, true, false);
        let killed = kill_with_escalation(&ops, 42, false).await.unwrap();
        assert!(!killed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submit_returns_immediately() {
        let ops = ScriptedOps::new(false, true, true);
        let killed = kill_with_escalation(&ops, 42, false).await.unwrap();
        assert!(!killed);
        assert_eq!(ops.forceful_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_skips_graceful_path() {
        let ops = ScriptedOps::new(true, true, true);
        let killed = kill_with_escalation(&ops, 42, true).await.unwrap();
        assert!(killed);
        assert_eq!(ops.graceful_count.load(Ordering::SeqCst), 0);
        assert_eq!(ops.forceful_count.load(Ordering::SeqCst), 1);
    }
}
