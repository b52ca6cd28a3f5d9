//! Heuristic discovery of lingering publish sessions.
//!
//! A session that outlived its terminal (or was started from another shell)
//! still references the published paths on its command line or in its
//! environment. Discovery is a plain substring match over that text, so it
//! can both miss sessions and match unrelated processes that happen to
//! mention the same words. Candidates are always shown to the operator
//! before anything is signalled.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Polling interval while waiting for terminated processes to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running process and the text it is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Command line with arguments joined by spaces
    pub cmdline: String,
    /// `KEY=value` environment entries (empty when unreadable)
    pub environ: Vec<String>,
}

impl ProcessInfo {
    fn mentions(&self, pattern: &str) -> bool {
        self.cmdline.contains(pattern) || self.environ.iter().any(|e| e.contains(pattern))
    }
}

/// Process-table capability: listing and signalling.
pub trait ProcessTable {
    /// Every process currently visible.
    fn processes(&self) -> Vec<ProcessInfo>;

    /// Send SIGTERM (`force == false`) or SIGKILL (`force == true`).
    fn signal(&self, pid: u32, force: bool) -> Result<()>;

    /// Whether `pid` still exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Parent of `pid`, if it is known.
    fn parent_of(&self, pid: u32) -> Option<u32>;
}

/// [`ProcessTable`] backed by procfs and `kill(2)`.
#[derive(Debug, Clone)]
pub struct ProcfsTable {
    root: PathBuf,
}

impl ProcfsTable {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read processes from a different procfs mount.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_process(&self, pid: u32) -> Option<ProcessInfo> {
        let dir = self.root.join(pid.to_string());
        let cmdline = std::fs::read(dir.join("cmdline")).ok()?;
        let environ = std::fs::read(dir.join("environ")).unwrap_or_default();

        Some(ProcessInfo {
            pid,
            cmdline: split_nul(&cmdline).join(" "),
            environ: split_nul(&environ),
        })
    }
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcfsTable {
    fn processes(&self) -> Vec<ProcessInfo> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Failed to list {}: {e}", self.root.display());
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|pid| self.read_process(pid))
            .collect()
    }

    fn signal(&self, pid: u32, force: bool) -> Result<()> {
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        let raw = i32::try_from(pid).context("PID out of range")?;
        kill(Pid::from_raw(raw), signal).with_context(|| format!("Failed to send {signal:?} to {pid}"))
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        let stat = std::fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        parse_stat_ppid(&stat)
    }
}

/// PPID from a `/proc/<pid>/stat` line.
///
/// The command name is parenthesized and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

/// `pid` followed by each of its ancestors, stopping below init.
///
/// `sudo` with a pty sits two levels above the command it runs, so excluding
/// only the parent is not enough to keep a scan from matching its own
/// invocation.
pub fn ancestor_chain(table: &dyn ProcessTable, pid: u32) -> Vec<u32> {
    let mut chain = vec![pid];
    let mut current = pid;
    while let Some(parent) = table.parent_of(current) {
        if parent <= 1 || chain.contains(&parent) {
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain
}

/// Check whether a process exists without signalling it.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // kill(pid, 0) checks existence only
    kill(Pid::from_raw(raw), None).is_ok()
}

fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Search patterns for a publish: source, destination, alias and the
/// source's final component. Empty patterns are dropped.
pub fn session_patterns(source: &Path, destination: &Path, alias: &str) -> Vec<String> {
    let mut patterns = vec![
        source.display().to_string(),
        destination.display().to_string(),
        alias.to_string(),
    ];
    if let Some(name) = source.file_name() {
        patterns.push(name.to_string_lossy().into_owned());
    }

    patterns.retain(|p| !p.is_empty() && p != "/");
    patterns.sort();
    patterns.dedup();
    patterns
}

/// Processes whose command line or environment contains any pattern.
///
/// PIDs in `exclude` (typically our own [`ancestor_chain`]) are never returned.
pub fn find_candidate_processes(
    table: &dyn ProcessTable,
    patterns: &[String],
    exclude: &[u32],
) -> Vec<ProcessInfo> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<ProcessInfo> = table
        .processes()
        .into_iter()
        .filter(|p| !exclude.contains(&p.pid))
        .filter(|p| patterns.iter().any(|pattern| p.mentions(pattern)))
        .collect();
    candidates.sort_by_key(|p| p.pid);
    candidates
}

/// How a terminated process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited after SIGTERM within the grace period
    Graceful,
    /// Needed SIGKILL
    Killed,
    /// Could not be signalled, or survived SIGKILL
    Failed(String),
}

/// Per-process result of [`terminate_processes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationResult {
    pub pid: u32,
    pub termination: Termination,
}

/// SIGTERM every pid, wait up to `grace`, then SIGKILL survivors.
pub fn terminate_processes(
    table: &dyn ProcessTable,
    pids: &[u32],
    grace: Duration,
) -> Vec<TerminationResult> {
    let mut results = Vec::with_capacity(pids.len());
    let mut pending = Vec::new();

    for &pid in pids {
        match table.signal(pid, false) {
            Ok(()) => {
                tracing::info!(pid, "sent SIGTERM");
                pending.push(pid);
            }
            Err(e) => {
                tracing::warn!(pid, "{e:#}");
                results.push(TerminationResult {
                    pid,
                    termination: Termination::Failed(format!("{e:#}")),
                });
            }
        }
    }

    let deadline = Instant::now() + grace;
    loop {
        pending.retain(|&pid| {
            if table.is_alive(pid) {
                return true;
            }
            results.push(TerminationResult {
                pid,
                termination: Termination::Graceful,
            });
            false
        });
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }

    for pid in pending {
        tracing::warn!(pid, "still running after {grace:?}; sending SIGKILL");
        let termination = match table.signal(pid, true) {
            Ok(()) => Termination::Killed,
            Err(e) => Termination::Failed(format!("{e:#}")),
        };
        results.push(TerminationResult { pid, termination });
    }

    results.sort_by_key(|r| r.pid);
    results
}
