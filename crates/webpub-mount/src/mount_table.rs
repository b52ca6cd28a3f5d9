//! Live mount table parsing.
//!
//! Linux exposes bind mounts in `/proc/self/mountinfo`, which, unlike
//! `/proc/mounts`, carries the root of the mount within its filesystem.
//! That root is what lets us recover the source directory of a bind mount
//! after the process that created it is gone.
//!
//! Line format (see `proc(5)`):
//!
//! ```text
//! 36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw,errors=continue
//! ^id ^parent ^dev ^root ^mountpoint ^options ^optional... - ^fstype ^source ^superopts
//! ```

use std::path::{Path, PathBuf};

use crate::error::MountError;

/// Default mount table location.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// A single entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMount {
    /// Where the filesystem is mounted
    pub mountpoint: PathBuf,
    /// Directory within the filesystem that is mounted there (`/` for the whole filesystem)
    pub root: PathBuf,
    /// `major:minor` of the backing device
    pub device: String,
    /// Filesystem type (e.g. `ext4`, `btrfs`)
    pub fstype: String,
    /// Mount source as shown by the kernel (e.g. `/dev/sda2`)
    pub fsname: String,
}

/// Read and parse a mountinfo file.
pub fn read_mount_table(path: &Path) -> Result<Vec<SystemMount>, MountError> {
    let contents = std::fs::read_to_string(path).map_err(|source| MountError::MountTable {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents.lines().filter_map(parse_mountinfo_line).collect())
}

/// Whether anything is mounted exactly at `target`.
pub fn is_mountpoint(mounts: &[SystemMount], target: &Path) -> bool {
    mounts.iter().any(|m| m.mountpoint == target)
}

/// Reconstruct the source directory of whatever is mounted at `target`.
///
/// The most recent entry at `target` wins (later lines shadow earlier ones).
/// Its root is rebased onto the mount of the same device whose root is the
/// longest prefix of it, so subvolume layouts (btrfs `/@`, `/@home`) resolve
/// to the visible path. Siblings of `target` are not considered. With no
/// covering mount the root itself is returned.
pub fn resolve_mount_source(mounts: &[SystemMount], target: &Path) -> Option<PathBuf> {
    let entry = mounts.iter().rev().find(|m| m.mountpoint == target)?;

    let covering = mounts
        .iter()
        .filter(|m| {
            m.device == entry.device
                && m.mountpoint != target
                && m.mountpoint.parent() != target.parent()
                && entry.root.starts_with(&m.root)
        })
        .max_by_key(|m| m.root.components().count());

    let source = match covering {
        Some(covering) => {
            let relative = entry.root.strip_prefix(&covering.root).unwrap_or(&entry.root);
            if relative.as_os_str().is_empty() {
                covering.mountpoint.clone()
            } else {
                covering.mountpoint.join(relative)
            }
        }
        None => entry.root.clone(),
    };

    Some(source)
}

/// Entries mounted directly under `parent` (one component deep).
pub fn mounts_under<'a>(mounts: &'a [SystemMount], parent: &Path) -> Vec<&'a SystemMount> {
    mounts
        .iter()
        .filter(|m| m.mountpoint.parent() == Some(parent))
        .collect()
}

fn parse_mountinfo_line(line: &str) -> Option<SystemMount> {
    let (pre, post) = line.split_once(" - ")?;

    let pre: Vec<&str> = pre.split(' ').collect();
    if pre.len() < 6 {
        return None;
    }
    let mut post = post.split(' ');

    Some(SystemMount {
        device: pre[2].to_string(),
        root: PathBuf::from(unescape_mount_path(pre[3])),
        mountpoint: PathBuf::from(unescape_mount_path(pre[4])),
        fstype: post.next()?.to_string(),
        fsname: unescape_mount_path(post.next()?),
    })
}

/// Decode the octal escapes the kernel uses in mount paths.
///
/// - `\040` = space
/// - `\011` = tab
/// - `\012` = newline
/// - `\134` = backslash
fn unescape_mount_path(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    let raw = s.as_bytes();
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\'
            && i + 3 < raw.len()
            && let Some(code) = decode_octal(&raw[i + 1..i + 4])
        {
            bytes.push(code);
            i += 4;
            continue;
        }
        bytes.push(raw[i]);
        i += 1;
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn decode_octal(digits: &[u8]) -> Option<u8> {
    if digits.len() != 3 || !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u8::from_str_radix(text, 8).ok()
}
