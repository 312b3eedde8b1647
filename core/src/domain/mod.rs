//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core business
//! concepts. These types have no I/O dependencies and can be tested in
//! isolation.

pub mod category;
mod group;
mod port;

// Re-export all domain types
pub use group::{glob_match, FilterConfig, PortGroup};
pub use port::{sort_ports, PortInfo, Protocol, SortKey};
