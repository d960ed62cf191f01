/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/guard.rs
 * Responsibility: Working-directory confinement for every path the model hands us.
 */

use crate::actions::ActionError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Returns true iff `candidate` resolves to `root` or to something nested under it.
///
/// Both sides are resolved through the filesystem, so `..` segments, absolute
/// overrides and symlinks pointing outside the root are all rejected. Paths that
/// do not exist yet are resolved through their deepest existing ancestor.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let root_real = match fs::canonicalize(root) {
        Ok(path) => path,
        Err(_) => return false,
    };

    match resolve(candidate) {
        Some(resolved) => resolved.starts_with(&root_real),
        None => false,
    }
}

fn resolve(candidate: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(candidate).ok()?;

    // Deepest ancestor that is present on disk (a dangling symlink counts as present).
    let existing = absolute
        .ancestors()
        .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())?;

    let mut resolved = fs::canonicalize(existing).ok()?;
    let rest = absolute.strip_prefix(existing).ok()?;

    // The remaining components do not exist, so none of them can be a symlink.
    for component in rest.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}

/// The confinement root for one session.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `rel` onto the root and checks it stays inside.
    ///
    /// `verb` only shapes the error message ("Cannot list ...", "Cannot write ...").
    pub fn resolve(&self, rel: &str, verb: &'static str) -> Result<PathBuf, ActionError> {
        let joined = self.root.join(rel);
        if is_within(&self.root, &joined) {
            Ok(joined)
        } else {
            Err(ActionError::OutsideWorkingDirectory {
                verb,
                path: joined.display().to_string(),
                root: self.root.display().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_root_itself_is_within() {
        let dir = tempdir().unwrap();
        assert!(is_within(dir.path(), dir.path()));
        assert!(is_within(dir.path(), &dir.path().join(".")));
    }

    #[test]
    fn test_nested_existing_and_missing_paths_are_within() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("main.c"), "int main(){}").unwrap();

        assert!(is_within(dir.path(), &dir.path().join("src/main.c")));
        assert!(is_within(dir.path(), &dir.path().join("src/new/deeper/file.txt")));
        assert!(is_within(dir.path(), &dir.path().join("missing/../src")));
    }

    #[test]
    fn test_relative_root_resolves_against_cwd() {
        let dir = tempfile::Builder::new()
            .prefix("kiln-guard-")
            .tempdir_in(".")
            .unwrap();
        assert!(dir.path().is_relative());
        fs::create_dir(dir.path().join("src")).unwrap();

        let workspace = Workspace::new(dir.path());
        let resolved = workspace.resolve("src/log.txt", "write").unwrap();
        assert_eq!(resolved, dir.path().join("src/log.txt"));
        assert!(is_within(dir.path(), &resolved));
        assert!(workspace.resolve("../elsewhere", "write").is_err());
    }

    #[test]
    fn test_parent_dir_escape_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(!is_within(dir.path(), &dir.path().join("../x")));
        assert!(!is_within(dir.path(), &dir.path().join("a/../../x")));
        assert!(!is_within(dir.path(), &dir.path().join("nope/../../../etc")));
    }

    #[test]
    fn test_absolute_override_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(!is_within(dir.path(), &dir.path().join("/etc/passwd")));
        assert!(!is_within(dir.path(), Path::new("/etc/passwd")));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let parent = tempdir().unwrap();
        let root = parent.path().join("work");
        let sibling = parent.path().join("workshop");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&sibling).unwrap();

        assert!(!is_within(&root, &sibling));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        assert!(!is_within(dir.path(), &dir.path().join("link")));
        assert!(!is_within(dir.path(), &dir.path().join("link/secret.txt")));
        assert!(!is_within(dir.path(), &dir.path().join("link/not-yet-created.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink("/nonexistent/kiln-target", dir.path().join("dangling")).unwrap();

        assert!(!is_within(dir.path(), &dir.path().join("dangling")));
    }

    #[test]
    fn test_missing_root_rejects_everything() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not-there");
        assert!(!is_within(&root, &root));
    }

    #[test]
    fn test_workspace_resolve_reports_outside_path() {
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        assert!(workspace.resolve("notes/a.txt", "write").is_ok());

        let err = workspace.resolve("../escape.txt", "write").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Cannot write \""));
        assert!(message.contains("outside the permitted working directory"));
    }
}
