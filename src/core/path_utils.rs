/*
 * Path helpers shared by the core: the application's local configuration
 * directory, and the prefix arithmetic used when refreshing ancestor chains
 * and following moved subtrees.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/*
 * Retrieves the application's local (non-roaming) configuration directory,
 * creating it if needed. Returns `None` when the platform offers no such
 * location or it cannot be created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving local config dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!("PathUtils: Failed to create config directory {config_path:?}: {e}");
                return None;
            }
            log::debug!("PathUtils: Created config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

/*
 * `path` followed by each of its ancestors up to and including `root`.
 * Paths outside `root` yield just themselves.
 */
pub fn ancestor_chain(path: &Path, root: &Path) -> Vec<PathBuf> {
    if !path.starts_with(root) {
        return vec![path.to_path_buf()];
    }
    path.ancestors()
        .take_while(|ancestor| ancestor.starts_with(root))
        .map(Path::to_path_buf)
        .collect()
}

/*
 * Maps `path` from under `old_prefix` to the same place under `new_prefix`.
 * Returns `None` when `path` is not at or below `old_prefix`.
 */
pub fn relocate(path: &Path, old_prefix: &Path, new_prefix: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(old_prefix).ok()?;
    if rest.as_os_str().is_empty() {
        Some(new_prefix.to_path_buf())
    } else {
        Some(new_prefix.join(rest))
    }
}

/* True when `path` is `ancestor` itself or lies below it. */
pub fn is_same_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_chain_stops_at_root() {
        let chain = ancestor_chain(Path::new("/w/src/core/a.rs"), Path::new("/w"));
        assert_eq!(
            chain,
            vec![
                PathBuf::from("/w/src/core/a.rs"),
                PathBuf::from("/w/src/core"),
                PathBuf::from("/w/src"),
                PathBuf::from("/w"),
            ]
        );
        assert_eq!(ancestor_chain(Path::new("/w"), Path::new("/w")), vec![PathBuf::from("/w")]);
    }

    #[test]
    fn test_ancestor_chain_outside_root_is_just_the_path() {
        assert_eq!(
            ancestor_chain(Path::new("/elsewhere/a.rs"), Path::new("/w")),
            vec![PathBuf::from("/elsewhere/a.rs")]
        );
    }

    #[test]
    fn test_relocate_moves_descendants() {
        let old = Path::new("/w/old");
        let new = Path::new("/w/dest/old");
        assert_eq!(relocate(Path::new("/w/old"), old, new), Some(new.to_path_buf()));
        assert_eq!(
            relocate(Path::new("/w/old/sub/f.txt"), old, new),
            Some(PathBuf::from("/w/dest/old/sub/f.txt"))
        );
        // Component-wise prefix, not string prefix.
        assert_eq!(relocate(Path::new("/w/older/f.txt"), old, new), None);
    }

    #[test]
    fn test_is_same_or_descendant() {
        assert!(is_same_or_descendant(Path::new("/a/b"), Path::new("/a/b")));
        assert!(is_same_or_descendant(Path::new("/a/b/c"), Path::new("/a/b")));
        assert!(!is_same_or_descendant(Path::new("/a/bc"), Path::new("/a/b")));
    }
}
