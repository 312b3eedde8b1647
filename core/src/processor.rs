//! Port processor: categorization and grouping of a snapshot.

use crate::domain::category::{categorize, ALL_CATEGORIES};
use crate::domain::{sort_ports, FilterConfig, PortGroup, PortInfo};

/// Categorize, filter, group, and sort one discovery snapshot.
///
/// Groups come out in the preset table's priority order with the fallback
/// last; empty groups are omitted. Collapse state is view state and is
/// re-applied by the dashboard after each rebuild.
pub fn process_snapshot(ports: Vec<PortInfo>, config: &FilterConfig) -> Vec<PortGroup> {
    let mut groups: Vec<PortGroup> = Vec::new();

    for &category in ALL_CATEGORIES {
        if !config.matches_category(category) {
            continue;
        }

        let mut members: Vec<PortInfo> = ports
            .iter()
            .filter(|p| categorize(&p.process_name, &p.command) == category)
            .filter(|p| config.matches_port(p))
            .cloned()
            .map(|mut p| {
                p.category = Some(category);
                p
            })
            .collect();

        if members.is_empty() {
            continue;
        }

        sort_ports(&mut members, config.sort);
        groups.push(PortGroup::new(category, members));
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Protocol, SortKey};

    fn port(num: u16, pid: u32, name: &str, user: &str) -> PortInfo {
        PortInfo::new(num, Protocol::Tcp, pid, name, user)
    }

    #[test]
    fn test_groups_by_category_in_priority_order() {
        let ports = vec![
            port(80, 1, "nginx", "root"),
            port(5432, 2, "postgres", "postgres"),
            port(3000, 3, "node", "alice"),
            port(9999, 4, "mystery", "alice"),
        ];

        let groups = process_snapshot(ports, &FilterConfig::default());
        let categories: Vec<&str> = groups.iter().map(|g| g.category).collect();
        assert_eq!(
            categories,
            vec!["dev-server", "database", "web-server", "other"]
        );
    }

    #[test]
    fn test_category_assigned_to_members() {
        let groups = process_snapshot(vec![port(3000, 1, "node", "u")], &FilterConfig::default());
        assert_eq!(groups[0].ports[0].category, Some("dev-server"));
    }

    #[test]
    fn test_category_glob_filters_groups() {
        let ports = vec![port(80, 1, "nginx", "root"), port(3000, 2, "node", "u")];
        let config = FilterConfig {
            category: Some("dev-*".to_string()),
            ..Default::default()
        };

        let groups = process_snapshot(ports, &config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].category, "dev-server");
    }

    #[test]
    fn test_user_glob_filters_members() {
        let ports = vec![port(3000, 1, "node", "alice"), port(3001, 2, "node", "bob")];
        let config = FilterConfig {
            user: Some("alice".to_string()),
            ..Default::default()
        };

        let groups = process_snapshot(ports, &config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].ports.len(), 1);
        assert_eq!(groups[0].ports[0].user, "alice");
    }

    #[test]
    fn test_members_sorted_by_active_key() {
        let ports = vec![port(9000, 5, "node", "u"), port(3000, 2, "vite", "u")];
        let config = FilterConfig {
            sort: SortKey::Pid,
            ..Default::default()
        };

        let groups = process_snapshot(ports, &config);
        assert_eq!(groups[0].ports[0].pid, 2);
        assert_eq!(groups[0].ports[1].pid, 5);
    }

    #[test]
    fn test_empty_groups_omitted() {
        let groups = process_snapshot(vec![port(3000, 1, "node", "u")], &FilterConfig::default());
        assert_eq!(groups.len(), 1);
    }
}
