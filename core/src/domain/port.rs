//! Port and process domain models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol
// ============================================================================

/// Transport protocol of a listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Parse a protocol token as emitted by lsof's NODE column or
    /// netstat's leading column ("TCP", "TCPv6", "UDP", ...).
    pub fn parse(token: &str) -> Option<Self> {
        let upper = token.to_uppercase();
        if upper.starts_with("TCP") {
            Some(Protocol::Tcp)
        } else if upper.starts_with("UDP") {
            Some(Protocol::Udp)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

// ============================================================================
// SortKey
// ============================================================================

/// Sort order applied to grouped port listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Port,
    Process,
    Pid,
    User,
}

impl SortKey {
    /// Parse a sort field name as accepted by the CLI contract.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "port" => Some(SortKey::Port),
            "process" => Some(SortKey::Process),
            "pid" => Some(SortKey::Pid),
            "user" => Some(SortKey::User),
            _ => None,
        }
    }
}

// ============================================================================
// PortInfo
// ============================================================================

/// One observed listening socket bound to a process at snapshot time.
///
/// Created fresh every discovery cycle and never mutated in place; a cycle's
/// list fully replaces the previous one. Platform parsers guarantee at most
/// one entry per (port, pid) pair within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortInfo {
    /// The port number (1-65535).
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Process ID of the process bound to this port.
    pub pid: u32,
    /// Name of the process bound to this port.
    pub process_name: String,
    /// Full command line; may be empty until metadata enrichment.
    #[serde(default)]
    pub command: String,
    /// Working directory of the process, when resolvable.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Username of the process owner.
    pub user: String,
    /// Seconds since the process started, when resolvable.
    #[serde(default)]
    pub lifetime: Option<u64>,
    /// Category assigned by the processor.
    #[serde(default)]
    pub category: Option<&'static str>,
}

impl PortInfo {
    /// Create a port entry from listing-tool output, before enrichment.
    pub fn new(
        port: u16,
        protocol: Protocol,
        pid: u32,
        process_name: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            port,
            protocol,
            pid,
            process_name: process_name.into(),
            command: String::new(),
            cwd: None,
            user: user.into(),
            lifetime: None,
            category: None,
        }
    }

    /// Check if this port matches a search query.
    ///
    /// Digits match as a substring of the decimal port text; any text
    /// matches case-insensitively against process name and command.
    pub fn matches_search(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        if self.port.to_string().contains(query) {
            return true;
        }
        let query_lower = query.to_lowercase();
        self.process_name.to_lowercase().contains(&query_lower)
            || self.command.to_lowercase().contains(&query_lower)
    }
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} :{} (PID: {}, Process: {})",
            self.protocol, self.port, self.pid, self.process_name
        )
    }
}

/// Sort a slice of ports in place by the given key.
///
/// Ties fall back to the port number so the order is deterministic.
pub fn sort_ports(ports: &mut [PortInfo], key: SortKey) {
    match key {
        SortKey::Port => ports.sort_by_key(|p| p.port),
        SortKey::Process => {
            ports.sort_by(|a, b| {
                a.process_name
                    .to_lowercase()
                    .cmp(&b.process_name.to_lowercase())
                    .then(a.port.cmp(&b.port))
            });
        }
        SortKey::Pid => ports.sort_by(|a, b| a.pid.cmp(&b.pid).then(a.port.cmp(&b.port))),
        SortKey::User => {
            ports.sort_by(|a, b| a.user.cmp(&b.user).then(a.port.cmp(&b.port)));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("TCP"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse("TCPv6"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse("udp"), Some(Protocol::Udp));
        assert_eq!(Protocol::parse("UNIX"), None);
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("port"), Some(SortKey::Port));
        assert_eq!(SortKey::parse("Process"), Some(SortKey::Process));
        assert_eq!(SortKey::parse("rank"), None);
    }

    #[test]
    fn test_matches_search_by_port_digits() {
        let port = PortInfo::new(3000, Protocol::Tcp, 1234, "node", "user");
        assert!(port.matches_search("300"));
        assert!(port.matches_search("3000"));
        assert!(!port.matches_search("8080"));
    }

    #[test]
    fn test_matches_search_by_name_and_command() {
        let mut port = PortInfo::new(3000, Protocol::Tcp, 1234, "node", "user");
        port.command = "node server.js --watch".to_string();
        assert!(port.matches_search("NODE"));
        assert!(port.matches_search("server.js"));
        assert!(!port.matches_search("nginx"));
    }

    #[test]
    fn test_sort_ports_by_process_then_port() {
        let mut ports = vec![
            PortInfo::new(9000, Protocol::Tcp, 3, "node", "u"),
            PortInfo::new(80, Protocol::Tcp, 1, "nginx", "u"),
            PortInfo::new(3000, Protocol::Tcp, 2, "node", "u"),
        ];
        sort_ports(&mut ports, SortKey::Process);
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[1].port, 3000);
        assert_eq!(ports[2].port, 9000);
    }
}
