//! Unix port source using lsof, ps, and signals.
//!
//! Listing runs `lsof -i -P -n` and keeps only rows representing an
//! actively listening socket. Metadata is resolved in two batched calls
//! (one `ps` for command/etime, one `lsof` restricted to the cwd file
//! descriptor) over exactly the set of distinct pids the listing produced,
//! so process-spawn cost stays bounded under large socket counts.

use std::collections::{HashMap, HashSet};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use regex::Regex;

use crate::cache::{MetadataCache, MetadataEntry};
use crate::domain::{PortInfo, Protocol};
use crate::error::{Error, Result};
use crate::limiter::CommandLimiter;

use super::{kill_with_escalation, KillOps, PortSource};

/// Placeholder command for pids whose batch resolution failed.
const UNKNOWN_COMMAND: &str = "unknown";

/// Unix-specific port source.
pub struct UnixSource {
    limiter: CommandLimiter,
    cache: Mutex<MetadataCache>,
}

impl UnixSource {
    pub fn new() -> Self {
        Self {
            limiter: CommandLimiter::new(),
            cache: Mutex::new(MetadataCache::new()),
        }
    }

    /// Parse lsof output into bare PortInfo entries.
    ///
    /// Expected lsof output format:
    /// ```text
    /// COMMAND    PID  USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
    /// node     34805  code   19u  IPv6 0x3d8015e195af1f3f      0t0  TCP [::1]:3000 (LISTEN)
    /// ```
    ///
    /// Headers and non-listening rows are skipped without error.
    fn parse_lsof_listing(&self, output: &str) -> Vec<PortInfo> {
        let mut ports = Vec::new();
        let mut seen: HashSet<(u16, u32)> = HashSet::new();

        for line in output.lines().skip(1) {
            if line.is_empty() || !line.contains("(LISTEN)") {
                continue;
            }

            // Columns: COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 9 {
                continue;
            }
            if components[4] != "IPv4" && components[4] != "IPv6" {
                continue;
            }

            let protocol = match Protocol::parse(components[7]) {
                Some(p) => p,
                None => continue,
            };

            // Extract and unescape process name
            let process_name = components[0].replace("\\x20", " ").replace("\\x2f", "/");

            let pid: u32 = match components[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };
            let user = components[2].to_string();

            // Trailing host:port or *:port in the address field
            let port = match parse_port(components[8]) {
                Some(p) => p,
                None => continue,
            };

            // Deduplicate by (port, pid)
            if !seen.insert((port, pid)) {
                continue;
            }

            ports.push(PortInfo::new(port, protocol, pid, process_name, user));
        }

        ports.sort_by_key(|p| p.port);
        ports
    }

    /// Batch-resolve metadata for every distinct pid in the snapshot and
    /// merge it back onto the entries.
    ///
    /// Pids with an unexpired cache entry are served from the cache; the
    /// rest go through one `ps` and one `lsof` invocation. A pid whose
    /// resolution fails gets placeholder values rather than failing the
    /// cycle.
    async fn enrich(&self, ports: &mut [PortInfo]) {
        let pids: Vec<u32> = {
            let mut distinct: Vec<u32> = ports.iter().map(|p| p.pid).collect();
            distinct.sort_unstable();
            distinct.dedup();
            distinct
        };

        let mut resolved: HashMap<u32, MetadataEntry> = HashMap::new();
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
            let list = missing
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(",");

            // The argument arrays must outlive both futures.
            let ps_args = ["-o", "pid=,command=,etime=", "-ww", "-p", &list];
            let cwd_args = ["-p", &list, "-a", "-d", "cwd", "-Fn"];
            let (ps_out, cwd_out) = tokio::join!(
                self.limiter.output("ps", &ps_args),
                self.limiter.output("lsof", &cwd_args),
            );

            let commands = match ps_out {
                Ok(out) if out.status.success() => {
                    parse_ps_metadata(&String::from_utf8_lossy(&out.stdout))
                }
                Ok(out) => {
                    tracing::debug!(
                        stderr = %String::from_utf8_lossy(&out.stderr),
                        "batch ps resolution failed"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    tracing::debug!(error = %e, "batch ps resolution failed");
                    HashMap::new()
                }
            };
            let mut cwds = match cwd_out {
                Ok(out) => parse_cwd_pairs(&String::from_utf8_lossy(&out.stdout)),
                Err(e) => {
                    tracing::debug!(error = %e, "batch cwd resolution failed");
                    HashMap::new()
                }
            };

            let mut cache = self.cache.lock();
            for pid in missing {
                let (command, lifetime) = commands
                    .get(&pid)
                    .cloned()
                    .unwrap_or_else(|| (UNKNOWN_COMMAND.to_string(), None));
                let entry = MetadataEntry {
                    command,
                    cwd: cwds.remove(&pid),
                    lifetime,
                };
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
        }
    }
}

impl Default for UnixSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSource for UnixSource {
    /// Scan all listening sockets.
    ///
    /// Executes: `lsof -i -P -n`
    ///
    /// Flags explained:
    /// - -i: Internet sockets only
    /// - -P: Show port numbers (don't resolve to service names)
    /// - -n: Show IP addresses (don't resolve to hostnames)
    async fn detect_ports(&self) -> Result<Vec<PortInfo>> {
        let output = self.limiter.output("lsof", &["-i", "-P", "-n"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_tool_stderr("lsof", &stderr));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in lsof output: {}", e)))?;

        let mut ports = self.parse_lsof_listing(&stdout);
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

impl KillOps for UnixSource {
    async fn request_graceful(&self, pid: u32) -> Result<bool> {
        Ok(kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok())
    }

    async fn request_forceful(&self, pid: u32) -> Result<bool> {
        Ok(kill(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        // Signal 0 probes existence without delivering anything.
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

/// Extract the port from a trailing `host:port` or `*:port` address field.
fn parse_port(address: &str) -> Option<u16> {
    address.rsplit(':').next()?.parse().ok()
}

/// Parse combined `ps -o pid=,command=,etime=` output.
///
/// The command may contain spaces, so the etime field is recovered from the
/// end of the line and the command is everything between the pid and it.
fn parse_ps_metadata(output: &str) -> HashMap<u32, (String, Option<u64>)> {
    let mut entries = HashMap::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let pid: u32 = match parts.next().and_then(|s| s.parse().ok()) {
            Some(p) => p,
            None => continue,
        };
        let rest = match parts.next() {
            Some(r) => r.trim(),
            None => continue,
        };

        let (command, lifetime) = match rest.rsplit_once(char::is_whitespace) {
            // A zero etime still identifies the field; it just carries no
            // usable lifetime.
            Some((head, tail)) if etime_seconds(tail).is_some() => (
                head.trim().to_string(),
                etime_seconds(tail).filter(|&t| t > 0),
            ),
            _ => (rest.to_string(), None),
        };

        entries.insert(pid, (command, lifetime));
    }

    entries
}

/// Parse a ps etime value in `[[dd-]hh:]mm:ss` form into a lifetime in
/// seconds. Returns None when nothing matches or the total is zero.
fn parse_etime(text: &str) -> Option<u64> {
    etime_seconds(text).filter(|&t| t > 0)
}

/// Total seconds of an etime value, Some(0) included.
///
/// Patterns are tried most-specific first and anchored to the end so a
/// time-like substring inside command text is never mistaken for the etime
/// field.
fn etime_seconds(text: &str) -> Option<u64> {
    let with_days = Regex::new(r"(\d+)-(\d+):(\d{2}):(\d{2})$").unwrap();
    let with_hours = Regex::new(r"(\d+):(\d{2}):(\d{2})$").unwrap();
    let minutes_only = Regex::new(r"(\d+):(\d{2})$").unwrap();

    let total = if let Some(caps) = with_days.captures(text) {
        let days: u64 = caps[1].parse().ok()?;
        let hours: u64 = caps[2].parse().ok()?;
        let minutes: u64 = caps[3].parse().ok()?;
        let seconds: u64 = caps[4].parse().ok()?;
        days * 86_400 + hours * 3_600 + minutes * 60 + seconds
    } else if let Some(caps) = with_hours.captures(text) {
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: u64 = caps[3].parse().ok()?;
        hours * 3_600 + minutes * 60 + seconds
    } else if let Some(caps) = minutes_only.captures(text) {
        let minutes: u64 = caps[1].parse().ok()?;
        let seconds: u64 = caps[2].parse().ok()?;
        minutes * 60 + seconds
    } else {
        return None;
    };

    Some(total)
}

/// Parse `lsof -p <pids> -a -d cwd -Fn` output into pid -> cwd pairs.
///
/// Field output interleaves `p<pid>` marker lines with `n<path>` lines for
/// the cwd descriptor that follows each marker.
fn parse_cwd_pairs(output: &str) -> HashMap<u32, String> {
    let mut cwds = HashMap::new();
    let mut current_pid: Option<u32> = None;

    for line in output.lines() {
        if let Some(pid_str) = line.strip_prefix('p') {
            current_pid = pid_str.parse().ok();
        } else if let Some(path) = line.strip_prefix('n') {
            if let Some(pid) = current_pid {
                cwds.insert(pid, path.to_string());
            }
        }
    }

    cwds
}
