//! Tolerant path canonicalization.
//!
//! [`resolve`] never fails: a path that does not exist is still turned into
//! an absolute, normalized form so the caller can report it back to the user
//! exactly as it would have been used.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Resolve a user-supplied path to an absolute canonical path.
///
/// The longest existing prefix is canonicalized (following symlinks); the
/// remaining components are appended with `.` and `..` applied lexically.
pub fn resolve(input: &Path) -> PathBuf {
    let absolute = if input.is_absolute() {
        input.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(input),
            Err(e) => {
                tracing::warn!(
                    "Cannot read working directory ({e}); resolving {} is best-effort",
                    input.display()
                );
                return degraded(input);
            }
        }
    };

    resolve_absolute(&absolute)
}

fn resolve_absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    let components: Vec<Component<'_>> = path.components().collect();
    for split in (1..components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = fs::canonicalize(&prefix) {
            push_normalized(&mut resolved, &components[split..]);
            return resolved;
        }
    }

    let mut resolved = PathBuf::from("/");
    push_normalized(&mut resolved, &components);
    resolved
}

fn push_normalized(base: &mut PathBuf, components: &[Component<'_>]) {
    for component in components {
        match component {
            Component::Normal(name) => base.push(name),
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
}

/// Last resort when the working directory is unreadable: `$PWD` (or `/`)
/// joined with the final component. Wrong for most multi-component paths.
fn degraded(input: &Path) -> PathBuf {
    let base = std::env::var_os("PWD")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| PathBuf::from("/"));

    match input.file_name() {
        Some(name) => base.join(name),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_directory_is_canonical() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        fs::create_dir(&site).unwrap();

        let resolved = resolve(&temp.path().join("site/./../site"));
        assert_eq!(resolved, fs::canonicalize(&site).unwrap());
    }

    #[test]
    fn test_missing_tail_is_normalized() {
        let temp = TempDir::new().unwrap();
        let base = fs::canonicalize(temp.path()).unwrap();

        let resolved = resolve(&temp.path().join("missing/./deeper/../leaf"));
        assert_eq!(resolved, base.join("missing/leaf"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_prefix_is_followed() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, temp.path().join("link")).unwrap();

        let resolved = resolve(&temp.path().join("link/not-yet"));
        assert_eq!(resolved, fs::canonicalize(&real).unwrap().join("not-yet"));
    }

    #[test]
    fn test_relative_input_becomes_absolute() {
        let resolved = resolve(Path::new("surely-not-here-webpub/x"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("surely-not-here-webpub/x"));
    }

    #[test]
    fn test_degraded_keeps_final_component() {
        let degraded = degraded(Path::new("a/b/site"));
        assert!(degraded.is_absolute());
        assert!(degraded.ends_with("site"));
    }

    proptest! {
        #[test]
        fn prop_resolve_has_no_dot_components(
            parts in proptest::collection::vec(
                prop_oneof![Just(".".to_string()), Just("..".to_string()), "[a-z]{1,8}"],
                1..8,
            )
        ) {
            let input = PathBuf::from("/nonexistent-webpub-root").join(parts.join("/"));
            let resolved = resolve(&input);
            prop_assert!(resolved.is_absolute());
            prop_assert!(resolved
                .components()
                .all(|c| !matches!(c, Component::CurDir | Component::ParentDir)));
        }
    }
}
