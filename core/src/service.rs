//! One-shot kill-by-port service for non-interactive use.

use serde::{Deserialize, Serialize};

use crate::adapters::PortSource;
use crate::error::Result;

/// Result of a kill-by-port request.
///
/// `success` is true only when every process bound to the port was killed;
/// partial failure is reported distinctly from total failure through the
/// message and the killed list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillByPortOutcome {
    pub success: bool,
    pub killed: Vec<u32>,
    pub message: String,
}

/// Kill every process currently bound to a port.
///
/// Runs a fresh discovery cycle, then attempts each owning pid in turn.
/// One pid failing does not stop the rest.
pub async fn kill_by_port<S: PortSource>(
    source: &S,
    port: u16,
    force: bool,
) -> Result<KillByPortOutcome> {
    let ports = source.detect_ports().await?;
    let pids: Vec<u32> = {
        let mut pids: Vec<u32> = ports
            .iter()
            .filter(|p| p.port == port)
            .map(|p| p.pid)
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    };

    if pids.is_empty() {
        return Ok(KillByPortOutcome {
            success: false,
            killed: Vec::new(),
            message: format!("No process is listening on port {}", port),
        });
    }

    let total = pids.len();
    let mut killed = Vec::new();
    let mut failed = Vec::new();

    for pid in pids {
        match source.kill_process(pid, force).await {
            Ok(true) => killed.push(pid),
            Ok(false) => failed.push(pid),
            Err(e) => {
                tracing::warn!(pid, error = %e, "kill attempt errored");
                failed.push(pid);
            }
        }
    }

    let outcome = if failed.is_empty() {
        KillByPortOutcome {
            success: true,
            killed,
            message: format!(
                "Killed {} process{} on port {}",
                total,
                if total == 1 { "" } else { "es" },
                port
            ),
        }
    } else if killed.is_empty() {
        KillByPortOutcome {
            success: false,
            killed,
            message: format!("Failed to kill any process on port {}", port),
        }
    } else {
        KillByPortOutcome {
            success: false,
            message: format!(
                "Partially failed: killed {} of {} processes on port {} (still alive: {:?})",
                killed.len(),
                total,
                port,
                failed
            ),
            killed,
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PortInfo, Protocol};
    use std::collections::HashSet;

    struct MockSource {
        ports: Vec<PortInfo>,
        unkillable: HashSet<u32>,
    }

    impl PortSource for MockSource {
        async fn detect_ports(&self) -> Result<Vec<PortInfo>> {
            Ok(self.ports.clone())
        }

        async fn kill_process(&self, pid: u32, _force: bool) -> Result<bool> {
            Ok(!self.unkillable.contains(&pid))
        }

        fn invalidate_metadata(&self, _pid: u32) {}
    }

    fn port(num: u16, pid: u32) -> PortInfo {
        PortInfo::new(num, Protocol::Tcp, pid, "node", "user")
    }

    #[tokio::test]
    async fn test_kills_every_pid_on_port() {
        let source = MockSource {
            ports: vec![port(3000, 10), port(3000, 20), port(8080, 30)],
            unkillable: HashSet::new(),
        };

        let outcome = kill_by_port(&source, 3000, false).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.killed, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_no_process_on_port() {
        let source = MockSource {
            ports: vec![],
            unkillable: HashSet::new(),
        };

        let outcome = kill_by_port(&source, 3000, false).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.killed.is_empty());
        assert!(outcome.message.contains("No process"));
    }

    #[tokio::test]
    async fn test_partial_failure_is_distinct() {
        let source = MockSource {
            ports: vec![port(3000, 10), port(3000, 20)],
            unkillable: [20].into_iter().collect(),
        };

        let outcome = kill_by_port(&source, 3000, false).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.killed, vec![10]);
        assert!(outcome.message.contains("Partially failed"));
    }

    #[tokio::test]
    async fn test_total_failure() {
        let source = MockSource {
            ports: vec![port(3000, 10)],
            unkillable: [10].into_iter().collect(),
        };

        let outcome = kill_by_port(&source, 3000, false).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.killed.is_empty());
        assert!(outcome.message.contains("Failed to kill any"));
    }
}
