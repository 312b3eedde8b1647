//! Portdeck Core Library
//!
//! Cross-platform library for listening-port discovery and process
//! management. Provides functionality to:
//! - Discover listening sockets and attribute them to processes
//! - Batch-enrich process metadata (command line, cwd, lifetime) through a
//!   TTL cache
//! - Kill processes gracefully or forcefully, with liveness verification
//! - Categorize and group results for display
//!
//! # Platform Support
//! - Unix (Linux/macOS): `lsof`, `ps`, and signals
//! - Windows: `netstat`, WMI, `taskkill`/`tasklist`

pub mod adapters;
pub mod cache;
pub mod detector;
pub mod domain;
pub mod error;
pub mod limiter;
pub mod processor;
pub mod service;

// Re-export domain types (primary API)
pub use domain::{glob_match, sort_ports, FilterConfig, PortGroup, PortInfo, Protocol, SortKey};

// Re-export other commonly used types
pub use adapters::{PortSource, SystemPortSource};
pub use cache::{MetadataCache, MetadataEntry};
pub use detector::PortDetector;
pub use error::{Error, Result};
pub use limiter::CommandLimiter;
pub use processor::process_snapshot;
pub use service::{kill_by_port, KillByPortOutcome};
