// src/system/paths.rs

use crate::constants::SYMLINK_LOOP_GUARD;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("An empty path cannot be resolved.")]
    EmptyPath,
    #[error("Could not expand '{path}': {reason}")]
    Expansion { path: String, reason: String },
    #[error("Could not determine the current directory: {0}")]
    CurrentDirUnavailable(#[source] std::io::Error),
    #[error("Symlink chain at '{path}' exceeded {limit} indirections.")]
    SymlinkLoop { path: PathBuf, limit: u32 },
    #[error("Could not read link '{path}': {source}")]
    LinkRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("The rebuilt PATH value is not valid on this platform: {0}")]
    Join(#[from] std::env::JoinPathsError),
    #[error("The rebuilt PATH value is not valid UTF-8.")]
    NonUtf8Path,
}

/// Resolves a path to its absolute, symlink-dereferenced form.
///
/// A leading `~` and any environment references are expanded first, a
/// relative result is anchored at the current directory, then the native
/// resolver gets one shot. When it cannot help (typically because the
/// final component does not exist yet), the path is walked manually:
/// every component is dereferenced in place, relative link targets are
/// combined against the link's containing directory, and the walk gives
/// up with `SymlinkLoop` once it has followed more links than the guard
/// allows.
pub fn resolve(path: &str) -> Result<PathBuf, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = shellexpand::full(path).map_err(|e| PathError::Expansion {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let expanded = PathBuf::from(expanded.into_owned());

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        let base = std::env::current_dir().map_err(PathError::CurrentDirUnavailable)?;
        base.join(expanded)
    };

    if let Ok(native) = fs::canonicalize(&absolute) {
        return Ok(dunce::simplified(&native).to_path_buf());
    }

    let resolved = dereference_components(&absolute)?;
    Ok(dunce::simplified(&normalize_lexically(&resolved)).to_path_buf())
}

/// Walks `absolute` component by component, replacing every symlink with
/// its target as it goes. A single hop count covers the whole walk.
fn dereference_components(absolute: &Path) -> Result<PathBuf, PathError> {
    let mut resolved = PathBuf::new();
    let mut hops: u32 = 0;

    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(std::path::MAIN_SEPARATOR_STR),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                loop {
                    let is_link = fs::symlink_metadata(&resolved)
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(false);
                    if !is_link {
                        break;
                    }
                    hops += 1;
                    if hops > SYMLINK_LOOP_GUARD {
                        return Err(PathError::SymlinkLoop {
                            path: absolute.to_path_buf(),
                            limit: SYMLINK_LOOP_GUARD,
                        });
                    }
                    let target = fs::read_link(&resolved).map_err(|e| PathError::LinkRead {
                        path: resolved.clone(),
                        source: e,
                    })?;
                    // Drop the link name itself, then anchor a relative
                    // target at the directory that contained the link.
                    resolved.pop();
                    if target.is_absolute() {
                        resolved = target;
                    } else {
                        resolved.push(target);
                        resolved = normalize_lexically(&resolved);
                    }
                }
            }
        }
    }
    Ok(resolved)
}

/// Folds `.` and `..` components. Only called on paths whose prefixes
/// have already been dereferenced, where the lexical fold is exact.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Computes the PATH value with `dir` inserted at `position`, or `None`
/// when the directory is already present. The caller owns applying the
/// value (to its own exports or to spawned children).
pub fn insert_path_entry(
    current: Option<&str>,
    dir: &Path,
    position: crate::models::PathPosition,
) -> Result<Option<String>, PathError> {
    let mut entries: Vec<PathBuf> = match current {
        Some(raw) => std::env::split_paths(raw).collect(),
        None => Vec::new(),
    };

    if entries.iter().any(|entry| entry == dir) {
        return Ok(None);
    }

    match position {
        crate::models::PathPosition::Prepend => entries.insert(0, dir.to_path_buf()),
        crate::models::PathPosition::Append => entries.push(dir.to_path_buf()),
    }

    let joined = std::env::join_paths(entries)?;
    joined
        .into_string()
        .map(Some)
        .map_err(|_| PathError::NonUtf8Path)
}

/// Walks the given PATH value looking for an executable file with this
/// name. The probe behind the command existence cache.
pub fn find_in_path(name: &str, path_value: Option<&str>) -> bool {
    let Some(raw) = path_value else {
        return false;
    };
    for dir in std::env::split_paths(raw) {
        if is_executable(&dir.join(name)) {
            return true;
        }
        if cfg!(windows) && is_executable(&dir.join(format!("{name}.exe"))) {
            return true;
        }
    }
    false
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PathPosition;

    #[test]
    fn empty_input_is_a_validation_error() {
        assert!(matches!(resolve(""), Err(PathError::EmptyPath)));
        assert!(matches!(resolve("   "), Err(PathError::EmptyPath)));
    }

    #[test]
    fn absolute_paths_without_links_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let resolved = resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved, fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn tilde_expands_to_the_home_directory() {
        let home = dirs::home_dir().expect("test environment has a home dir");
        let resolved = resolve("~/rckit-tilde-probe").unwrap();
        assert!(resolved.starts_with(&home));
        assert!(resolved.ends_with("rckit-tilde-probe"));
    }

    #[test]
    fn relative_paths_anchor_at_the_current_directory() {
        let cwd = std::env::current_dir().unwrap();
        let resolved = resolve("Cargo.toml").unwrap();
        assert_eq!(resolved, fs::canonicalize(cwd.join("Cargo.toml")).unwrap());
    }

    #[test]
    fn missing_final_components_still_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("not-yet-created.log");
        let resolved = resolve(ghost.to_str().unwrap()).unwrap();
        assert!(resolved.ends_with("not-yet-created.log"));
    }

    #[cfg(unix)]
    #[test]
    fn short_symlink_chains_reach_the_final_target() {
        use std::os::unix::fs::symlink;
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        fs::write(&real, "content").unwrap();

        let mut previous = real.clone();
        for i in 0..5 {
            let link = dir.path().join(format!("hop{i}"));
            symlink(&previous, &link).unwrap();
            previous = link;
        }

        let resolved = resolve(previous.to_str().unwrap()).unwrap();
        assert_eq!(resolved, fs::canonicalize(&real).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_hit_the_loop_guard() {
        use std::os::unix::fs::symlink;
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        symlink(&a, &b).unwrap();
        symlink(&b, &a).unwrap();

        let result = resolve(a.to_str().unwrap());
        assert!(matches!(result, Err(PathError::SymlinkLoop { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn relative_link_targets_anchor_at_the_link_directory() {
        use std::os::unix::fs::symlink;
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("real.txt"), "x").unwrap();
        symlink("real.txt", sub.join("alias")).unwrap();

        let resolved = resolve(sub.join("alias").to_str().unwrap()).unwrap();
        assert_eq!(resolved, fs::canonicalize(sub.join("real.txt")).unwrap());
    }

    #[test]
    fn path_insertion_prepends_appends_and_deduplicates() {
        let tools = PathBuf::from("/opt/tools/bin");
        let local = PathBuf::from("/usr/local/bin");
        let current = std::env::join_paths([&local])
            .unwrap()
            .into_string()
            .unwrap();

        let prepended =
            insert_path_entry(Some(&current), &tools, PathPosition::Prepend).unwrap();
        let prepended = prepended.expect("new entry inserted");
        let first: Vec<PathBuf> = std::env::split_paths(&prepended).collect();
        assert_eq!(first.first(), Some(&tools));

        let appended =
            insert_path_entry(Some(&current), &tools, PathPosition::Append).unwrap();
        let appended = appended.expect("new entry inserted");
        let last: Vec<PathBuf> = std::env::split_paths(&appended).collect();
        assert_eq!(last.last(), Some(&tools));

        // Already present: a no-op, reported as such.
        let duplicate = insert_path_entry(Some(&prepended), &tools, PathPosition::Prepend);
        assert_eq!(duplicate.unwrap(), None);
    }

    #[test]
    fn executable_probe_walks_the_given_path_value() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("mytool");
        fs::write(&exe, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let path_value = std::env::join_paths([dir.path()])
            .unwrap()
            .into_string()
            .unwrap();
        assert!(find_in_path("mytool", Some(&path_value)));
        assert!(!find_in_path("othertool", Some(&path_value)));
        assert!(!find_in_path("mytool", None));
    }

    #[cfg(unix)]
    #[test]
    fn plain_files_on_path_are_not_commands() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "just data").unwrap();

        let path_value = std::env::join_paths([dir.path()])
            .unwrap()
            .into_string()
            .unwrap();
        assert!(!find_in_path("notes.txt", Some(&path_value)));
    }
}
