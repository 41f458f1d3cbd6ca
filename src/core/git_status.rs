/*
 * Git status decorations for tree entries.
 *
 * `CoreGitStatusProvider` shells out to `git status --porcelain` in a root and
 * maps each reported path to a single-letter status. Git reports paths
 * relative to the repository's top level, which may sit above the root. Results are reused for
 * one second per root so a burst of refreshes runs git at most once. A root
 * that is not a repository, or a machine without git, simply has no statuses.
 */
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const STATUS_THROTTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitFileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
    Untracked,
    Ignored,
}

impl GitFileStatus {
    /*
     * Collapses a two-letter porcelain code into one status. The first letter
     * found in the order M, A, D, R, C, U, ? wins; anything else is ignored.
     */
    pub fn from_porcelain(code: &str) -> Self {
        const ORDER: [(char, GitFileStatus); 7] = [
            ('M', GitFileStatus::Modified),
            ('A', GitFileStatus::Added),
            ('D', GitFileStatus::Deleted),
            ('R', GitFileStatus::Renamed),
            ('C', GitFileStatus::Copied),
            ('U', GitFileStatus::Unmerged),
            ('?', GitFileStatus::Untracked),
        ];
        ORDER
            .iter()
            .find(|(letter, _)| code.contains(*letter))
            .map(|(_, status)| *status)
            .unwrap_or(GitFileStatus::Ignored)
    }

    pub fn badge(self) -> char {
        match self {
            GitFileStatus::Modified => 'M',
            GitFileStatus::Added => 'A',
            GitFileStatus::Deleted => 'D',
            GitFileStatus::Renamed => 'R',
            GitFileStatus::Copied => 'C',
            GitFileStatus::Unmerged | GitFileStatus::Untracked => 'U',
            GitFileStatus::Ignored => '!',
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GitFileStatus::Modified => "Modified",
            GitFileStatus::Added => "Added",
            GitFileStatus::Deleted => "Deleted",
            GitFileStatus::Renamed => "Renamed",
            GitFileStatus::Copied => "Copied",
            GitFileStatus::Unmerged => "Unmerged",
            GitFileStatus::Untracked => "Untracked",
            GitFileStatus::Ignored => "Ignored",
        }
    }
}

/*
 * Parses `git status --porcelain` output into absolute paths under `root`.
 * Renames (`old -> new`) are reported under the new path.
 */
pub fn parse_porcelain(root: &Path, output: &str) -> HashMap<PathBuf, GitFileStatus> {
    let mut statuses = HashMap::new();
    for line in output.lines() {
        if line.len() < 4 || !line.is_char_boundary(3) {
            continue;
        }
        let (code, rest) = line.split_at(2);
        let raw_path = rest[1..].trim();
        let raw_path = raw_path
            .rsplit_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(raw_path);
        let raw_path = raw_path.trim_matches('"').trim_end_matches('/');
        if raw_path.is_empty() {
            continue;
        }
        statuses.insert(root.join(raw_path), GitFileStatus::from_porcelain(code));
    }
    statuses
}

/*
 * Keeps the statuses at or under `resolved_root` (the root with symlinks
 * resolved, as git reports it) and re-expresses them under `root`.
 */
pub fn restrict_to_root(
    statuses: HashMap<PathBuf, GitFileStatus>,
    resolved_root: &Path,
    root: &Path,
) -> HashMap<PathBuf, GitFileStatus> {
    statuses
        .into_iter()
        .filter_map(|(path, status)| {
            let relative = path.strip_prefix(resolved_root).ok()?;
            Some((root.join(relative), status))
        })
        .collect()
}

pub trait GitStatusOperations: Send + Sync {
    /* Statuses of changed paths under `root`; empty when unavailable. */
    fn status_for_root(&self, root: &Path) -> HashMap<PathBuf, GitFileStatus>;
}

struct CachedStatus {
    fetched_at: Instant,
    statuses: HashMap<PathBuf, GitFileStatus>,
}

pub struct CoreGitStatusProvider {
    throttle: Duration,
    cache: Mutex<HashMap<PathBuf, CachedStatus>>,
}

impl CoreGitStatusProvider {
    pub fn new() -> Self {
        Self::with_throttle(STATUS_THROTTLE)
    }

    pub fn with_throttle(throttle: Duration) -> Self {
        CoreGitStatusProvider {
            throttle,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn run_git(root: &Path, args: &[&str]) -> Option<String> {
        let output = match Command::new("git").args(args).current_dir(root).output() {
            Ok(output) => output,
            Err(e) => {
                log::debug!("GitStatus: Could not run git in {root:?}: {e}");
                return None;
            }
        };
        if !output.status.success() {
            log::debug!("GitStatus: No git repository found in {root:?}.");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn fetch_statuses(root: &Path) -> Option<HashMap<PathBuf, GitFileStatus>> {
        let top_level = Self::run_git(root, &["rev-parse", "--show-toplevel"])?;
        let top_level = PathBuf::from(top_level.trim_end_matches(['\r', '\n']));
        let output = Self::run_git(
            root,
            &["status", "--porcelain", "--untracked-files=all", "--", "."],
        )?;
        let resolved_root = match root.canonicalize() {
            Ok(resolved) => resolved,
            Err(e) => {
                log::debug!("GitStatus: Could not resolve {root:?}: {e}");
                return None;
            }
        };
        Some(restrict_to_root(
            parse_porcelain(&top_level, &output),
            &resolved_root,
            root,
        ))
    }
}

impl Default for CoreGitStatusProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GitStatusOperations for CoreGitStatusProvider {
    fn status_for_root(&self, root: &Path) -> HashMap<PathBuf, GitFileStatus> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = cache.get(root) {
            if cached.fetched_at.elapsed() < self.throttle {
                return cached.statuses.clone();
            }
        }

        let statuses = Self::fetch_statuses(root).unwrap_or_default();
        log::trace!("GitStatus: {} changed path(s) under {root:?}.", statuses.len());
        cache.insert(
            root.to_path_buf(),
            CachedStatus {
                fetched_at: Instant::now(),
                statuses: statuses.clone(),
            },
        );
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_porcelain_precedence() {
        assert_eq!(GitFileStatus::from_porcelain(" M"), GitFileStatus::Modified);
        assert_eq!(GitFileStatus::from_porcelain("AM"), GitFileStatus::Modified);
        assert_eq!(GitFileStatus::from_porcelain("A "), GitFileStatus::Added);
        assert_eq!(GitFileStatus::from_porcelain("R "), GitFileStatus::Renamed);
        assert_eq!(GitFileStatus::from_porcelain("UU"), GitFileStatus::Unmerged);
        assert_eq!(GitFileStatus::from_porcelain("??"), GitFileStatus::Untracked);
        assert_eq!(GitFileStatus::from_porcelain("!!"), GitFileStatus::Ignored);
    }

    #[test]
    fn test_parse_porcelain_lines() {
        let root = Path::new("/repo");
        let output = " M src/main.rs\n?? notes.txt\nR  old.rs -> new/place.rs\n?? \"with space.txt\"\n?? build/\n";
        let statuses = parse_porcelain(root, output);

        assert_eq!(
            statuses.get(Path::new("/repo/src/main.rs")),
            Some(&GitFileStatus::Modified)
        );
        assert_eq!(
            statuses.get(Path::new("/repo/notes.txt")),
            Some(&GitFileStatus::Untracked)
        );
        assert_eq!(
            statuses.get(Path::new("/repo/new/place.rs")),
            Some(&GitFileStatus::Renamed)
        );
        assert!(!statuses.contains_key(Path::new("/repo/old.rs")));
        assert_eq!(
            statuses.get(Path::new("/repo/with space.txt")),
            Some(&GitFileStatus::Untracked)
        );
        assert_eq!(statuses.get(Path::new("/repo/build")), Some(&GitFileStatus::Untracked));
    }

    #[test]
    fn test_restrict_to_root_rebases_paths_from_top_level() {
        let output = "?? sub/new.txt\n M sub/deep/lib.rs\n M other.rs\n";
        let statuses = restrict_to_root(
            parse_porcelain(Path::new("/repo"), output),
            Path::new("/repo/sub"),
            Path::new("/work/sub"),
        );

        assert_eq!(statuses.len(), 2);
        assert_eq!(
            statuses.get(Path::new("/work/sub/new.txt")),
            Some(&GitFileStatus::Untracked)
        );
        assert_eq!(
            statuses.get(Path::new("/work/sub/deep/lib.rs")),
            Some(&GitFileStatus::Modified)
        );
    }

    #[test]
    fn test_subdirectory_root_of_repository() {
        let dir = tempdir().unwrap();
        let repo = dir.path();
        let initialised = Command::new("git")
            .args(["init", "-q"])
            .current_dir(repo)
            .status()
            .is_ok_and(|status| status.success());
        if !initialised {
            // No git on this machine; nothing to decorate.
            return;
        }
        let sub = repo.join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("new.txt"), "new").unwrap();
        std::fs::write(repo.join("top.txt"), "top").unwrap();

        let statuses = CoreGitStatusProvider::new().status_for_root(&sub);
        assert_eq!(statuses.get(&sub.join("new.txt")), Some(&GitFileStatus::Untracked));
        assert_eq!(statuses.len(), 1);
    }

    #[test]
    fn test_status_outside_repository_is_empty() {
        let dir = tempdir().unwrap();
        let provider = CoreGitStatusProvider::new();
        assert!(provider.status_for_root(dir.path()).is_empty());
        // Served from the throttled cache the second time.
        assert!(provider.status_for_root(dir.path()).is_empty());
    }

    #[test]
    fn test_badges_and_descriptions() {
        assert_eq!(GitFileStatus::Untracked.badge(), 'U');
        assert_eq!(GitFileStatus::Untracked.description(), "Untracked");
        assert_eq!(GitFileStatus::Modified.badge(), 'M');
    }
}
