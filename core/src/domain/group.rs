//! Port grouping and filter configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::port::{PortInfo, SortKey};

// ============================================================================
// PortGroup
// ============================================================================

/// A named bucket of ports sharing a category.
///
/// Rebuilt from scratch each discovery cycle; `collapsed` is view state owned
/// by the dashboard and re-applied after each rebuild by group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroup {
    /// Stable identifier, equal to the category name.
    pub id: String,
    /// Category shared by all member ports.
    pub category: &'static str,
    /// Member ports, ordered by the active sort key.
    pub ports: Vec<PortInfo>,
    /// Whether the group's members are hidden in the dashboard.
    #[serde(default)]
    pub collapsed: bool,
}

impl PortGroup {
    pub fn new(category: &'static str, ports: Vec<PortInfo>) -> Self {
        Self {
            id: category.to_string(),
            category,
            ports,
            collapsed: false,
        }
    }
}

// ============================================================================
// FilterConfig
// ============================================================================

/// Filter and sort configuration applied to grouped results before display.
///
/// Glob fields accept `*` (any run) and `?` (any single character), matched
/// case-insensitively against the whole value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob over category names (e.g. `dev-*`).
    #[serde(default)]
    pub category: Option<String>,
    /// Glob over the owning user.
    #[serde(default)]
    pub user: Option<String>,
    /// Glob over the process name.
    #[serde(default)]
    pub process: Option<String>,
    /// Sort key for groups and members.
    #[serde(default)]
    pub sort: SortKey,
}

impl FilterConfig {
    /// Check whether a port passes the user and process globs.
    ///
    /// The category glob is applied at the group level by the processor.
    pub fn matches_port(&self, port: &PortInfo) -> bool {
        if let Some(ref pattern) = self.user {
            if !glob_match(pattern, &port.user) {
                return false;
            }
        }
        if let Some(ref pattern) = self.process {
            if !glob_match(pattern, &port.process_name) {
                return false;
            }
        }
        true
    }

    /// Check whether a category name passes the category glob.
    pub fn matches_category(&self, category: &str) -> bool {
        match self.category {
            Some(ref pattern) => glob_match(pattern, category),
            None => true,
        }
    }
}

/// Match a glob pattern against a value, case-insensitively and anchored.
///
/// Compiles the glob to a regex; a pattern that fails to compile (cannot
/// happen for escaped input) matches nothing.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');

    match Regex::new(&format!("(?i){}", regex)) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::port::Protocol;

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("dev-*", "dev-server"));
        assert!(glob_match("dev-*", "dev-api"));
        assert!(!glob_match("dev-*", "api"));
    }

    #[test]
    fn test_glob_match_question_and_case() {
        assert!(glob_match("n?de", "Node"));
        assert!(!glob_match("n?de", "nodes"));
    }

    #[test]
    fn test_glob_match_literal_is_anchored() {
        assert!(glob_match("root", "root"));
        assert!(!glob_match("root", "chroot"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        assert!(glob_match("a.b", "a.b"));
        assert!(!glob_match("a.b", "axb"));
    }

    #[test]
    fn test_filter_config_matches_port() {
        let port = PortInfo::new(3000, Protocol::Tcp, 1, "node", "alice");
        let filter = FilterConfig {
            user: Some("ali*".to_string()),
            process: Some("node".to_string()),
            ..Default::default()
        };
        assert!(filter.matches_port(&port));

        let filter = FilterConfig {
            user: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches_port(&port));
    }
}
