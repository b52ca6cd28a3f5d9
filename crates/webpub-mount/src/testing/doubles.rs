//! In-memory collaborators.
//!
//! Each double is `Clone` and shares its state between clones, so a test
//! keeps one handle for inspection and boxes another into the code under
//! test.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use parking_lot::Mutex;

use crate::acl::{Access, AclBackend};
use crate::backend::MountBackend;
use crate::error::MountError;
use crate::mount_table::SystemMount;
use crate::operator::Operator;
use crate::process_detection::{ProcessInfo, ProcessTable};
use crate::reload::Reloader;

/// Device shared by the fake root filesystem and every bind mount.
const FAKE_DEVICE: &str = "0:42";

#[derive(Debug, Default)]
struct MountState {
    /// (target, source) in mount order
    mounts: Vec<(PathBuf, PathBuf)>,
    fail_binds: bool,
    fail_unmounts: bool,
    fail_table: bool,
}

/// [`MountBackend`] that records bind mounts instead of performing them.
///
/// The mount table it reports has a whole-filesystem entry at `/` plus one
/// bind entry per active mount, with the source as the bind root, so source
/// reconstruction goes through the same path as on a real host.
#[derive(Debug, Clone, Default)]
pub struct FakeMountBackend {
    state: Arc<Mutex<MountState>>,
}

impl FakeMountBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent bind fail.
    pub fn fail_binds(&self, fail: bool) {
        self.state.lock().fail_binds = fail;
    }

    /// Make every subsequent unmount fail.
    pub fn fail_unmounts(&self, fail: bool) {
        self.state.lock().fail_unmounts = fail;
    }

    /// Make reading the mount table fail.
    pub fn fail_table(&self, fail: bool) {
        self.state.lock().fail_table = fail;
    }

    /// Add a mount without going through `bind`, e.g. one left by a crashed session.
    pub fn insert_mount(&self, target: impl Into<PathBuf>, source: impl Into<PathBuf>) {
        self.state.lock().mounts.push((target.into(), source.into()));
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.state.lock().mounts.iter().any(|(t, _)| t == target)
    }

    /// Number of active bind mounts.
    pub fn mount_count(&self) -> usize {
        self.state.lock().mounts.len()
    }
}

impl MountBackend for FakeMountBackend {
    fn bind(&self, source: &Path, target: &Path) -> Result<(), MountError> {
        let mut state = self.state.lock();
        if state.fail_binds {
            return Err(MountError::BindFailed {
                from: source.to_path_buf(),
                to: target.to_path_buf(),
                reason: "bind refused by test".to_string(),
            });
        }
        state.mounts.push((target.to_path_buf(), source.to_path_buf()));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), MountError> {
        let mut state = self.state.lock();
        if state.fail_unmounts {
            return Err(MountError::UnmountFailed {
                target: target.to_path_buf(),
                reason: "target is busy".to_string(),
            });
        }
        match state.mounts.iter().rposition(|(t, _)| t == target) {
            Some(index) => {
                state.mounts.remove(index);
                Ok(())
            }
            None => Err(MountError::UnmountFailed {
                target: target.to_path_buf(),
                reason: "not mounted".to_string(),
            }),
        }
    }

    fn mount_table(&self) -> Result<Vec<SystemMount>, MountError> {
        let state = self.state.lock();
        if state.fail_table {
            return Err(MountError::MountTable {
                path: PathBuf::from("/proc/self/mountinfo"),
                source: std::io::Error::other("mount table unavailable"),
            });
        }

        let root = SystemMount {
            mountpoint: PathBuf::from("/"),
            root: PathBuf::from("/"),
            device: FAKE_DEVICE.to_string(),
            fstype: "ext4".to_string(),
            fsname: "/dev/fake".to_string(),
        };
        let binds = state.mounts.iter().map(|(target, source)| SystemMount {
            mountpoint: target.clone(),
            root: source.clone(),
            device: FAKE_DEVICE.to_string(),
            fstype: "ext4".to_string(),
            fsname: "/dev/fake".to_string(),
        });
        Ok(std::iter::once(root).chain(binds).collect())
    }
}

#[derive(Debug, Default)]
struct AclState {
    entries: HashMap<(PathBuf, String), (Access, bool)>,
    failing: HashSet<PathBuf>,
}

/// [`AclBackend`] that keeps entries in a map.
#[derive(Debug, Clone)]
pub struct RecordingAclBackend {
    state: Arc<Mutex<AclState>>,
    available: bool,
}

impl RecordingAclBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            available: true,
        }
    }

    /// A host without ACL support.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Make grants and revokes on `path` fail.
    pub fn fail_on(&self, path: &Path) {
        self.state.lock().failing.insert(path.to_path_buf());
    }

    /// Current entry for `user` on `path`: access and whether it was recursive.
    pub fn access_of(&self, path: &Path, user: &str) -> Option<(Access, bool)> {
        self.state
            .lock()
            .entries
            .get(&(path.to_path_buf(), user.to_string()))
            .copied()
    }

    /// Paths carrying an entry for `user`, sorted.
    pub fn granted_paths(&self, user: &str) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .state
            .lock()
            .entries
            .keys()
            .filter(|(_, u)| u == user)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Whether no entries remain.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

impl Default for RecordingAclBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AclBackend for RecordingAclBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn grant(&self, path: &Path, user: &str, access: Access, recursive: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(path) {
            bail!("Operation not supported: {}", path.display());
        }
        state
            .entries
            .insert((path.to_path_buf(), user.to_string()), (access, recursive));
        Ok(())
    }

    fn revoke(&self, path: &Path, user: &str, _recursive: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(path) {
            bail!("Operation not supported: {}", path.display());
        }
        state.entries.remove(&(path.to_path_buf(), user.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReloadState {
    count: usize,
    fail: bool,
}

/// [`Reloader`] that counts calls.
#[derive(Debug, Clone, Default)]
pub struct CountingReloader {
    state: Arc<Mutex<ReloadState>>,
}

impl CountingReloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent reload fail (calls are still counted).
    pub fn fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }
}

impl Reloader for CountingReloader {
    fn reload(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.count += 1;
        if state.fail {
            bail!("Job for apache2.service failed");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProcessState {
    processes: Vec<ProcessInfo>,
    alive: HashSet<u32>,
    stubborn: HashSet<u32>,
    signals: Vec<(u32, bool)>,
    parents: HashMap<u32, u32>,
}

/// [`ProcessTable`] over a fixed list of processes.
///
/// SIGTERM ends a process unless it was marked with
/// [`ignore_sigterm`](Self::ignore_sigterm); SIGKILL always does.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    state: Arc<Mutex<ProcessState>>,
}

impl FakeProcessTable {
    pub fn new(processes: Vec<ProcessInfo>) -> Self {
        let alive = processes.iter().map(|p| p.pid).collect();
        Self {
            state: Arc::new(Mutex::new(ProcessState {
                processes,
                alive,
                ..ProcessState::default()
            })),
        }
    }

    pub fn ignore_sigterm(&self, pid: u32) {
        self.state.lock().stubborn.insert(pid);
    }

    /// Record `parent` as the parent of `pid`.
    pub fn set_parent(&self, pid: u32, parent: u32) {
        self.state.lock().parents.insert(pid, parent);
    }

    /// Every signal sent so far as `(pid, force)`.
    pub fn signals(&self) -> Vec<(u32, bool)> {
        self.state.lock().signals.clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn processes(&self) -> Vec<ProcessInfo> {
        let state = self.state.lock();
        state
            .processes
            .iter()
            .filter(|p| state.alive.contains(&p.pid))
            .cloned()
            .collect()
    }

    fn signal(&self, pid: u32, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if !state.alive.contains(&pid) {
            bail!("Failed to signal {pid}: ESRCH: No such process");
        }
        state.signals.push((pid, force));
        if force || !state.stubborn.contains(&pid) {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().alive.contains(&pid)
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        self.state.lock().parents.get(&pid).copied()
    }
}

/// [`Operator`] replaying canned answers.
///
/// Choices and confirmations are consumed in order; once exhausted, choices
/// answer `None` and confirmations answer no. Every prompt is kept for
/// inspection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    choices: VecDeque<Option<String>>,
    confirmations: VecDeque<bool>,
    pub prompts: Vec<String>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next `choose`.
    #[must_use]
    pub fn choose_answer(mut self, answer: Option<&str>) -> Self {
        self.choices.push_back(answer.map(str::to_string));
        self
    }

    /// Queue the answer to the next `confirm`.
    #[must_use]
    pub fn confirm_answer(mut self, answer: bool) -> Self {
        self.confirmations.push_back(answer);
        self
    }

    /// Operator that confirms everything.
    pub fn always_yes() -> Self {
        Self::new().confirm_answer(true).confirm_answer(true)
    }
}

impl Operator for ScriptedOperator {
    fn choose(&mut self, prompt: &str, options: &[String]) -> Option<String> {
        self.prompts.push(format!("{prompt} [{}]", options.join(", ")));
        self.choices.pop_front().flatten()
    }

    fn confirm(&mut self, question: &str) -> bool {
        self.prompts.push(question.to_string());
        self.confirmations.pop_front().unwrap_or(false)
    }
}
