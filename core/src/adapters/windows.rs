//! Windows port source using netstat, WMI, and taskkill.
//!
//! Listing runs `netstat -ano` and keeps rows in the LISTENING state; one
//! socket can be reported multiple times, so results are deduplicated by
//! (port, pid). Metadata comes from a single WMI query with an OR'd set of
//! ProcessId clauses. Windows has no portable cwd equivalent, so the
//! executable's containing directory stands in for it; that is an
//! approximation, not the true working directory.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeZone};
use parking_lot::Mutex;

use crate::cache::{MetadataCache, MetadataEntry};
use crate::domain::{PortInfo, Protocol};
use crate::error::{Error, Result};
use crate::limiter::CommandLimiter;

use super::{kill_with_escalation, KillOps, PortSource};

const UNKNOWN_COMMAND: &str = "unknown";

/// Windows-specific port source.
pub struct WindowsSource {
    limiter: CommandLimiter,
    cache: Mutex<MetadataCache>,
}

/// One process block from a WMI list-format response.
#[derive(Debug, Default, Clone)]
struct WmiProcess {
    command_line: String,
    executable_path: String,
    creation_date: String,
}

impl WindowsSource {
    pub fn new() -> Self {
        Self {
            limiter: CommandLimiter::new(),
            cache: Mutex::new(MetadataCache::new()),
        }
    }

    /// Parse netstat output into bare PortInfo entries.
    ///
    /// Expected netstat output format:
    /// ```text
    ///   Proto  Local Address          Foreign Address        State           PID
    ///   TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       948
    /// ```
    fn parse_netstat_listing(&self, output: &str) -> Vec<PortInfo> {
        let mut ports = Vec::new();
        let mut seen: HashSet<(u16, u32)> = HashSet::new();

        for line in output.lines() {
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 5 || components[3] != "LISTENING" {
                continue;
            }

            let protocol = match Protocol::parse(components[0]) {
                Some(p) => p,
                None => continue,
            };

            let port = match parse_port(components[1]) {
                Some(p) => p,
                None => continue,
            };

            let pid: u32 = match components[4].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            // One tool invocation can report a socket multiple times.
            if !seen.insert((port, pid)) {
                continue;
            }

            ports.push(PortInfo::new(port, protocol, pid, UNKNOWN_COMMAND, "-"));
        }

        ports.sort_by_key(|p| p.port);
        ports
    }

    /// Batch-resolve metadata through one WMI query and merge it back.
    async fn enrich(&self, ports: &mut [PortInfo]) {
        let pids: Vec<u32> = {
            let mut distinct: Vec<u32> = ports.iter().map(|p| p.pid).collect();
            distinct.sort_unstable();
            distinct.dedup();
            distinct
        };

        let mut resolved: HashMap<u32, MetadataEntry> = HashMap::new();
        let mut names: HashMap<u32, String> = HashMap::new();
        let missing: Vec<u32> = {
            let mut cache = self.cache.lock();
            cache.cleanup();
            pids.iter()
                .copied()
                .filter(|&pid| match cache.get(pid) {
                    Some(entry) => {
                        resolved.insert(pid, entry);
                        false
                    }
                    None => true,
                })
                .collect()
        };

        if !missing.is_empty() {
            let clause = missing
                .iter()
                .map(|p| format!("ProcessId={}", p))
                .collect::<Vec<_>>()
                .join(" or ");
            let output = self
                .limiter
                .output(
                    "wmic",
                    &[
                        "process",
                        "where",
                        &clause,
                        "get",
                        "ProcessId,CommandLine,ExecutablePath,CreationDate",
                        "/format:list",
                    ],
                )
                .await;

            let processes = match output {
                Ok(out) if out.status.success() => {
                    parse_wmi_blocks(&String::from_utf8_lossy(&out.stdout))
                }
                Ok(out) => {
                    tracing::debug!(
                        stderr = %String::from_utf8_lossy(&out.stderr),
                        "batch WMI resolution failed"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    tracing::debug!(error = %e, "batch WMI resolution failed");
                    HashMap::new()
                }
            };

            let mut cache = self.cache.lock();
            for pid in missing {
                let entry = match processes.get(&pid) {
                    Some(proc) => MetadataEntry {
                        command: if proc.command_line.is_empty() {
                            UNKNOWN_COMMAND.to_string()
                        } else {
                            proc.command_line.clone()
                        },
                        cwd: executable_dir(&proc.executable_path),
                        lifetime: parse_creation_date(&proc.creation_date),
                    },
                    None => MetadataEntry {
                        command: UNKNOWN_COMMAND.to_string(),
                        cwd: None,
                        lifetime: None,
                    },
                };
                if let Some(name) = processes
                    .get(&pid)
                    .and_then(|p| executable_name(&p.executable_path))
                {
                    names.insert(pid, name);
                }
                cache.set(pid, entry.clone());
                resolved.insert(pid, entry);
            }
        }

        for port in ports.iter_mut() {
            if let Some(entry) = resolved.get(&port.pid) {
                port.command = entry.command.clone();
                port.cwd = entry.cwd.clone();
                port.lifetime = entry.lifetime;
            }
            if let Some(name) = names.get(&port.pid) {
                port.process_name = name.clone();
            }
        }
    }
}

impl Default for WindowsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSource for WindowsSource {
    /// Scan all listening sockets.
    ///
    /// Executes: `netstat -ano`.
    async fn detect_ports(&self) -> Result<Vec<PortInfo>> {
        let output = self.limiter.output("netstat", &["-ano"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_tool_stderr("netstat", &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let mut ports = self.parse_netstat_listing(&stdout);
        self.enrich(&mut ports).await;
        Ok(ports)
    }

    async fn kill_process(&self, pid: u32, force: bool) -> Result<bool> {
        let outcome = kill_with_escalation(self, pid, force).await;
        // The attempt may have changed process state either way.
        self.invalidate_metadata(pid);
        outcome
    }

    fn invalidate_metadata(&self, pid: u32) {
        self.cache.lock().delete(pid);
    }
}

impl KillOps for WindowsSource {
    async fn request_graceful(&self, pid: u32) -> Result<bool> {
        let pid_arg = pid.to_string();
        match self.limiter.output("taskkill", &["/PID", &pid_arg]).await {
            Ok(out) => Ok(out.status.success()),
            Err(_) => Ok(false),
        }
    }

    async fn request_forceful(&self, pid: u32) -> Result<bool> {
        let pid_arg = pid.to_string();
        let out = self
            .limiter
            .output("taskkill", &["/F", "/PID", &pid_arg])
            .await?;
        Ok(out.status.success())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let filter = format!("PID eq {}", pid);
        match self
            .limiter
            .output("tasklist", &["/FI", &filter, "/NH"])
            .await
        {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                stdout
                    .lines()
                    .any(|l| l.split_whitespace().any(|tok| tok == pid.to_string()))
            }
            Err(_) => false,
        }
    }
}

/// Extract the port from a trailing `addr:port` local address.
fn parse_port(address: &str) -> Option<u16> {
    address.rsplit(':').next()?.parse().ok()
}

/// Parse a WMI list-format response into per-pid blocks.
///
/// Blocks are separated by blank lines; list format orders keys
/// alphabetically, so the ProcessId line may land anywhere in its block.
fn parse_wmi_blocks(output: &str) -> HashMap<u32, WmiProcess> {
    let mut processes = HashMap::new();
    let mut current = WmiProcess::default();
    let mut current_pid: Option<u32> = None;

    let mut commit = |proc: &mut WmiProcess, pid: &mut Option<u32>| {
        if let Some(p) = pid.take() {
            processes.insert(p, std::mem::take(proc));
        } else {
            *proc = WmiProcess::default();
        }
    };

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            commit(&mut current, &mut current_pid);
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "CommandLine" => current.command_line = value.trim().to_string(),
            "ExecutablePath" => current.executable_path = value.trim().to_string(),
            "CreationDate" => current.creation_date = value.trim().to_string(),
            "ProcessId" => current_pid = value.trim().parse().ok(),
            _ => {}
        }
    }
    commit(&mut current, &mut current_pid);

    processes
}

/// Parent directory of the executable, the cwd approximation.
fn executable_dir(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
}

/// File name of the executable, used as the process name.
fn executable_name(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
}

/// Parse a WMI CreationDate (`YYYYMMDDHHmmss.ffffff±zzz`) into elapsed
/// seconds since process start.
///
/// Only the leading 14 characters are significant; a short or malformed
/// string, or a non-positive elapsed value, yields None.
fn parse_creation_date(value: &str) -> Option<u64> {
    // get() rejects short strings and non-boundary byte 14 alike; lossy
    // decoding of wmic output can put multi-byte replacement characters
    // anywhere.
    let stamp = value.get(..14)?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").ok()?;
    let started = Local.from_local_datetime(&naive).single()?;
    let elapsed = Local::now().signed_duration_since(started).num_seconds();
    if elapsed > 0 {
        Some(elapsed as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_netstat_listing() {
        let source = WindowsSource::new();
        let output = "\r\nActive Connections\r\n\r\n  Proto  Local Address          Foreign Address        State           PID\r\n  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       948\r\n  TCP    127.0.0.1:3000         0.0.0.0:0              LISTENING       4321\r\n  TCP    10.0.0.5:52114         142.250.0.1:443        ESTABLISHED     7777\r\n  UDP    0.0.0.0:5353           *:*                                    1200\r\n";

        let ports = source.parse_netstat_listing(output);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 135);
        assert_eq!(ports[0].pid, 948);
        assert_eq!(ports[1].port, 3000);
    }

    #[test]
    fn test_parse_netstat_deduplicates_port_pid() {
        let source = WindowsSource::new();
        let output = "  TCP    0.0.0.0:8080    0.0.0.0:0    LISTENING    500\r\n  TCP    [::]:8080       [::]:0       LISTENING    500\r\n";

        let ports = source.parse_netstat_listing(output);
        assert_eq!(ports.len(), 1);
    }

    #[test]
    fn test_parse_wmi_blocks() {
        let output = "CommandLine=C:\\node\\node.exe server.js\r\nCreationDate=20240101120000.000000+060\r\nExecutablePath=C:\\node\\node.exe\r\nProcessId=4321\r\n\r\nCommandLine=\r\nCreationDate=\r\nExecutablePath=\r\nProcessId=948\r\n";

        let blocks = parse_wmi_blocks(output);
        assert_eq!(blocks.len(), 2);

        let node = blocks.get(&4321).unwrap();
        assert_eq!(node.command_line, "C:\\node\\node.exe server.js");
        assert_eq!(node.executable_path, "C:\\node\\node.exe");

        let svc = blocks.get(&948).unwrap();
        assert!(svc.command_line.is_empty());
    }

    #[test]
    fn test_parse_creation_date_past_timestamp() {
        let past = Local::now() - chrono::Duration::hours(2);
        let value = format!("{}.000000+000", past.format("%Y%m%d%H%M%S"));
        let elapsed = parse_creation_date(&value).unwrap();
        // Roughly two hours, allow slack for test runtime.
        assert!((7000..7400).contains(&(elapsed as i64)));
    }

    #[test]
    fn test_parse_creation_date_rejects_malformed() {
        assert_eq!(parse_creation_date(""), None);
        assert_eq!(parse_creation_date("2024"), None);
        assert_eq!(parse_creation_date("not-a-timestamp!"), None);
        // Replacement characters from lossy decoding span three bytes, so
        // byte 14 is not a char boundary here.
        assert_eq!(parse_creation_date("\u{fffd}\u{fffd}\u{fffd}\u{fffd}\u{fffd}"), None);
    }

    #[test]
    fn test_parse_creation_date_rejects_future() {
        let future = Local::now() + chrono::Duration::hours(1);
        let value = format!("{}.000000+000", future.format("%Y%m%d%H%M%S"));
        assert_eq!(parse_creation_date(&value), None);
    }

    #[test]
    fn test_executable_dir_and_name() {
        assert_eq!(
            executable_dir("C:\\node\\node.exe").as_deref(),
            Some("C:\\node")
        );
        assert_eq!(
            executable_name("C:\\node\\node.exe").as_deref(),
            Some("node.exe")
        );
        assert_eq!(executable_dir(""), None);
    }
}
