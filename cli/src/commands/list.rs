//! List command - show all listening ports.

use anyhow::Result;
use portdeck_core::{process_snapshot, FilterConfig, PortDetector, SortKey, SystemPortSource};

use crate::dashboard::format::format_lifetime;

/// Filters collected from the command line.
pub struct ListOptions {
    pub port: Option<u16>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub user: Option<String>,
    pub process: Option<String>,
    pub sort: String,
}

pub async fn run(opts: ListOptions, json: bool) -> Result<()> {
    let filter = FilterConfig {
        category: opts.category,
        user: opts.user,
        process: opts.process,
        sort: SortKey::parse(&opts.sort).unwrap_or_default(),
    };

    let detector = PortDetector::new(SystemPortSource::new());
    let mut ports = detector.detect_ports().await?;

    if let Some(p) = opts.port {
        ports.retain(|port| port.port == p);
    }
    if let Some(ref name) = opts.name {
        let name_lower = name.to_lowercase();
        ports.retain(|port| port.process_name.to_lowercase().contains(&name_lower));
    }

    // Grouping assigns categories and applies the glob filters and sort.
    let groups = process_snapshot(ports, &filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    let total: usize = groups.iter().map(|g| g.ports.len()).sum();
    if total == 0 {
        println!("No listening ports found.");
        return Ok(());
    }

    // Table header
    println!(
        "{:<6} {:<8} {:<20} {:<12} {:<6} {:<12} {:<8} COMMAND",
        "PORT", "PID", "PROCESS", "CATEGORY", "PROTO", "USER", "UPTIME"
    );
    println!("{}", "-".repeat(100));

    for group in &groups {
        for port in &group.ports {
            println!(
                "{:<6} {:<8} {:<20} {:<12} {:<6} {:<12} {:<8} {}",
                port.port,
                port.pid,
                truncate(&port.process_name, 20),
                group.category,
                port.protocol.to_string(),
                truncate(&port.user, 12),
                format_lifetime(port.lifetime),
                truncate(&port.command, 40),
            );
        }
    }

    println!("\nTotal: {} ports", total);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
