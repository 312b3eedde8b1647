//! Bounded runner for external system-inspection commands.
//!
//! A discovery cycle can spawn several tool invocations in parallel (batch
//! metadata calls plus concurrently triggered user actions). Without a
//! bound, process-table and file-descriptor pressure grows unbounded on
//! busy hosts, so every spawn goes through a semaphore. Waiters are served
//! in FIFO order (tokio semaphores are fair).

use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Default number of concurrently in-flight external commands.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Bounds concurrently running external commands.
#[derive(Debug)]
pub struct CommandLimiter {
    permits: Semaphore,
}

impl CommandLimiter {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_limit(max_concurrent: usize) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent),
        }
    }

    /// Run a program to completion, capturing stdout and stderr.
    ///
    /// Queues behind other in-flight commands when the limit is reached.
    pub async fn output(&self, program: &str, args: &[&str]) -> Result<std::process::Output> {
        // Semaphore is never closed, so acquire cannot fail.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::CommandFailed(format!("limiter closed: {}", e)))?;

        tracing::trace!(program, ?args, "spawning external command");
        Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::CommandFailed(format!("Failed to run {}: {}", program, e)))
    }

    /// Number of free slots, for diagnostics.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for CommandLimiter {
    fn default() -> Self {
        Self::new()
    }
}
