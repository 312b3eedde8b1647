//! Port detector: the discovery entry point the dashboard talks to.
//!
//! Wraps a single port source and memoizes the last snapshot for a short
//! window so the refresh timer and action-driven refreshes landing together
//! do not spawn duplicate tool pipelines. Concurrent callers coalesce: the
//! memo sits behind an async mutex, so a caller arriving mid-discovery
//! waits for the in-flight run and is served its result.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::adapters::PortSource;
use crate::domain::PortInfo;
use crate::error::Result;

/// How long a snapshot may be served from the memo.
const SNAPSHOT_TTL: Duration = Duration::from_secs(1);

struct Snapshot {
    taken: Instant,
    ports: Vec<PortInfo>,
}

/// Discovery orchestrator over one platform adapter.
pub struct PortDetector<S: PortSource> {
    source: S,
    snapshot: Mutex<Option<Snapshot>>,
    memo_ttl: Duration,
}

impl<S: PortSource> PortDetector<S> {
    pub fn new(source: S) -> Self {
        Self::with_memo_ttl(source, SNAPSHOT_TTL)
    }

    pub fn with_memo_ttl(source: S, memo_ttl: Duration) -> Self {
        Self {
            source,
            snapshot: Mutex::new(None),
            memo_ttl,
        }
    }

    /// Run one discovery cycle, or serve the memoized snapshot when one
    /// fresh enough exists.
    pub async fn detect_ports(&self) -> Result<Vec<PortInfo>> {
        let mut guard = self.snapshot.lock().await;

        if let Some(snap) = guard.as_ref() {
            if snap.taken.elapsed() < self.memo_ttl {
                tracing::trace!("serving memoized snapshot");
                return Ok(snap.ports.clone());
            }
        }

        let ports = self.source.detect_ports().await?;
        *guard = Some(Snapshot {
            taken: Instant::now(),
            ports: ports.clone(),
        });
        Ok(ports)
    }

    /// Drop the memoized snapshot so the next `detect_ports` re-runs the
    /// full pipeline. Called by the dashboard right after a kill.
    pub async fn clear_cache(&self) {
        *self.snapshot.lock().await = None;
    }

    /// The underlying adapter, for kill and metadata invalidation calls.
    pub fn source(&self) -> &S {
        &self.source
    }
}
