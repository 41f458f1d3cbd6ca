/*
 * Decides which paths under a root are hidden from the tree.
 *
 * Rules are evaluated in order and the first match wins:
 *   1. a path component (relative to the root) is a default-excluded name,
 *   2. the basename is a dotfile other than the ignore file itself, unless
 *      hidden files are shown,
 *   3. the path matches a pattern from the root's ignore file,
 *   4. otherwise the path is included.
 *
 * The ignore file is read through the file system provider the first time the
 * engine is asked about a path, and the parsed set is reused until
 * `reload_patterns` is called. A missing ignore file is an empty set.
 */
use super::file_system::{FileSystemError, FileSystemProviderOperations};
use super::models::basename;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const IGNORE_FILE_NAME: &str = ".gitignore";

/* Version-control metadata, dependency directories, build output and OS metadata files. */
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "dist",
    "build",
    "target",
    ".DS_Store",
    "Thumbs.db",
];

const MAX_IGNORE_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    DefaultExclude(&'static str),
    Hidden,
    IgnorePattern(String),
}

#[derive(Debug)]
enum SegmentPattern {
    Literal(String),
    Wildcard(Regex),
}

impl SegmentPattern {
    fn parse(segment: &str) -> Option<Self> {
        if segment.contains('*') {
            wildcard_regex(segment).map(SegmentPattern::Wildcard)
        } else {
            Some(SegmentPattern::Literal(segment.to_string()))
        }
    }

    fn matches(&self, component: &str) -> bool {
        match self {
            SegmentPattern::Literal(text) => text == component,
            SegmentPattern::Wildcard(regex) => regex.is_match(component),
        }
    }
}

#[derive(Debug)]
enum PatternRule {
    /* `*`-pattern without a separator: matched against the basename only. */
    Basename(Regex),
    /* Plain text: a substring of the relative path, or the exact basename. */
    Literal(String),
    /*
     * A run of segments that must appear contiguously among the path's
     * components (at the start when `anchored`). Covers `dir/` prefixes,
     * root-anchored names and sub-paths containing `*`.
     */
    Segments {
        segments: Vec<SegmentPattern>,
        anchored: bool,
    },
}

#[derive(Debug)]
struct IgnorePattern {
    source: String,
    rule: PatternRule,
}

/*
 * Compiles a glob-like segment into an anchored regex: `*` is any run of
 * characters, `?` exactly one, everything else literal.
 */
fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    match Regex::new(&expression) {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::warn!("ExclusionEngine: Could not compile ignore pattern '{pattern}': {e}");
            None
        }
    }
}

impl IgnorePattern {
    fn parse(line: &str) -> Option<Self> {
        let anchored = line.starts_with('/');
        let body = line.trim_start_matches('/');
        let is_directory_pattern = body.ends_with('/');
        let body = body.trim_end_matches('/');
        if body.is_empty() {
            return None;
        }

        let plain = !is_directory_pattern && !anchored;
        let rule = if plain && body.contains('*') && !body.contains('/') {
            PatternRule::Basename(wildcard_regex(body)?)
        } else if plain && !body.contains('*') {
            PatternRule::Literal(body.to_string())
        } else {
            let segments = body
                .split('/')
                .filter(|s| !s.is_empty())
                .map(SegmentPattern::parse)
                .collect::<Option<Vec<_>>>()?;
            PatternRule::Segments { segments, anchored }
        };
        Some(IgnorePattern {
            source: line.to_string(),
            rule,
        })
    }

    fn matches(&self, components: &[&str]) -> bool {
        match &self.rule {
            PatternRule::Basename(regex) => components.last().is_some_and(|name| regex.is_match(name)),
            PatternRule::Literal(text) => {
                components.last() == Some(&text.as_str())
                    || components.join("/").contains(text.as_str())
            }
            PatternRule::Segments { segments, anchored } => {
                if segments.len() > components.len() {
                    return false;
                }
                let window_matches = |start: usize| {
                    segments
                        .iter()
                        .zip(&components[start..])
                        .all(|(segment, component)| segment.matches(component))
                };
                if *anchored {
                    window_matches(0)
                } else {
                    (0..=components.len() - segments.len()).any(window_matches)
                }
            }
        }
    }
}

/* The ordered patterns of one root's ignore file. */
#[derive(Debug, Default)]
pub struct IgnorePatternSet {
    patterns: Vec<IgnorePattern>,
}

impl IgnorePatternSet {
    /*
     * Parses ignore-file content. Blank lines and `#` comments are skipped, and
     * so are `!` negations, which this engine does not support.
     */
    pub fn parse(content: &str) -> Self {
        let mut patterns = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                log::debug!("ExclusionEngine: Ignoring unsupported negated pattern '{line}'.");
                continue;
            }
            if let Some(pattern) = IgnorePattern::parse(line) {
                patterns.push(pattern);
            }
        }
        IgnorePatternSet { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /* Returns the source text of the first pattern matching the components. */
    fn first_match(&self, components: &[&str]) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(components))
            .map(|pattern| pattern.source.as_str())
    }
}

pub struct ExclusionEngine {
    root: PathBuf,
    show_hidden: AtomicBool,
    file_system: Arc<dyn FileSystemProviderOperations>,
    patterns: Mutex<Option<Arc<IgnorePatternSet>>>,
}

impl ExclusionEngine {
    pub fn new(
        root: PathBuf,
        file_system: Arc<dyn FileSystemProviderOperations>,
        show_hidden: bool,
    ) -> Self {
        ExclusionEngine {
            root,
            show_hidden: AtomicBool::new(show_hidden),
            file_system,
            patterns: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_show_hidden(&self, show_hidden: bool) {
        self.show_hidden.store(show_hidden, Ordering::Relaxed);
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden.load(Ordering::Relaxed)
    }

    /* Forgets the parsed ignore file so the next query reads it again. */
    pub fn reload_patterns(&self) {
        *self.lock_patterns() = None;
        log::debug!("ExclusionEngine: Ignore patterns for {:?} will be reloaded.", self.root);
    }

    pub fn is_ignore_file(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path()) && basename(path) == IGNORE_FILE_NAME
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        match self.exclusion_reason(path) {
            Some(reason) => {
                log::trace!("ExclusionEngine: Excluding {path:?} ({reason:?}).");
                true
            }
            None => false,
        }
    }

    pub fn exclusion_reason(&self, path: &Path) -> Option<ExclusionReason> {
        if path == self.root {
            return None;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let components: Vec<&str> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();

        if let Some(name) = components
            .iter()
            .find_map(|c| DEFAULT_EXCLUDES.iter().copied().find(|d| d == c))
        {
            return Some(ExclusionReason::DefaultExclude(name));
        }

        let name = basename(path);
        if name.starts_with('.') && name != IGNORE_FILE_NAME && !self.show_hidden() {
            return Some(ExclusionReason::Hidden);
        }

        self.pattern_set()
            .first_match(&components)
            .map(|source| ExclusionReason::IgnorePattern(source.to_string()))
    }

    /* The parsed ignore file, loading it on first use. */
    pub fn pattern_set(&self) -> Arc<IgnorePatternSet> {
        let mut guard = self.lock_patterns();
        if let Some(set) = guard.as_ref() {
            return Arc::clone(set);
        }
        let set = Arc::new(self.load_patterns());
        *guard = Some(Arc::clone(&set));
        set
    }

    fn load_patterns(&self) -> IgnorePatternSet {
        let ignore_file = self.root.join(IGNORE_FILE_NAME);
        match self.file_system.read_file(&ignore_file, MAX_IGNORE_FILE_SIZE) {
            Ok(bytes) => {
                let set = IgnorePatternSet::parse(&String::from_utf8_lossy(&bytes));
                log::debug!(
                    "ExclusionEngine: Loaded {} ignore pattern(s) from {ignore_file:?}.",
                    set.len()
                );
                set
            }
            Err(FileSystemError::NotFound(_)) => {
                log::debug!("ExclusionEngine: No ignore file at {ignore_file:?}.");
                IgnorePatternSet::default()
            }
            Err(e) => {
                log::warn!("ExclusionEngine: Could not read {ignore_file:?}: {e}");
                IgnorePatternSet::default()
            }
        }
    }

    fn lock_patterns(&self) -> std::sync::MutexGuard<'_, Option<Arc<IgnorePatternSet>>> {
        match self.patterns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
