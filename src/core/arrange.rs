/*
 * Orders and narrows one directory's children for display.
 *
 * `arrange` applies, in order: the search term (ranked) or else the plain
 * filter text, then hidden-file visibility, then sorting. Directories always
 * precede files; within each kind entries follow the session's `SortState`,
 * except for fuzzy search results, which follow their score.
 */
use super::models::Entry;
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Name,
    Size,
    Date,
    Tokens,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortMode::Name),
            "size" => Ok(SortMode::Size),
            "date" | "modified" => Ok(SortMode::Date),
            "tokens" | "token" => Ok(SortMode::Tokens),
            other => Err(format!("unknown sort mode '{other}'")),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortMode::Name => "name",
            SortMode::Size => "size",
            SortMode::Date => "date",
            SortMode::Tokens => "tokens",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/* Session-wide ordering; survives refreshes until changed. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    pub mode: SortMode,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(mode: SortMode, direction: SortDirection) -> Self {
        SortState { mode, direction }
    }

    /*
     * Selecting the active mode again flips the direction; selecting another
     * mode switches to it ascending.
     */
    pub fn select(&mut self, mode: SortMode) {
        if self.mode == mode {
            self.direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
        } else {
            self.mode = mode;
            self.direction = SortDirection::Ascending;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub search_term: Option<String>,
    pub filter_text: Option<String>,
    pub show_hidden: bool,
}

impl ViewFilter {
    fn active_search(&self) -> Option<&str> {
        self.search_term.as_deref().filter(|t| !t.is_empty())
    }

    fn active_filter(&self) -> Option<&str> {
        self.filter_text.as_deref().filter(|t| !t.is_empty())
    }
}

/* A parsed search term. */
#[derive(Debug)]
pub enum SearchQuery {
    Regex(Regex),
    /* A `/…/` term whose pattern did not compile; matches nothing. */
    InvalidRegex,
    Suffix(String),
    Wildcard(Option<Pattern>),
    Fuzzy(String),
}

fn case_insensitive_match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

fn has_wildcard(text: &str) -> bool {
    text.contains('*') || text.contains('?')
}

/*
 * Only `*` (any run, consecutive stars collapse) and `?` (one character) are
 * special; brackets and everything else match literally.
 */
fn wildcard_pattern(text: &str) -> Option<Pattern> {
    let mut escaped = String::with_capacity(text.len() + 8);
    let mut previous_star = false;
    for ch in text.chars() {
        match ch {
            '*' if previous_star => continue,
            '*' | '?' => escaped.push(ch),
            other => escaped.push_str(&Pattern::escape(&other.to_string())),
        }
        previous_star = ch == '*';
    }
    match Pattern::new(&escaped) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            log::debug!("Arrange: Invalid wildcard '{text}': {e}");
            None
        }
    }
}

impl SearchQuery {
    pub fn parse(term: &str) -> Self {
        if term.len() > 2 && term.starts_with('/') && term.ends_with('/') {
            let body = &term[1..term.len() - 1];
            return match RegexBuilder::new(body).case_insensitive(true).build() {
                Ok(regex) => SearchQuery::Regex(regex),
                Err(e) => {
                    log::debug!("Arrange: Invalid search regex '{body}': {e}");
                    SearchQuery::InvalidRegex
                }
            };
        }
        if term.starts_with('.') {
            return SearchQuery::Suffix(term.to_lowercase());
        }
        if has_wildcard(term) {
            return SearchQuery::Wildcard(wildcard_pattern(term));
        }
        SearchQuery::Fuzzy(term.to_string())
    }

    /*
     * Scores a basename against the query. `None` means the entry is not a
     * result. Non-fuzzy queries score every match equally.
     */
    pub fn score(&self, name: &str) -> Option<i64> {
        let matched = match self {
            SearchQuery::Regex(regex) => regex.is_match(name),
            SearchQuery::InvalidRegex => false,
            SearchQuery::Suffix(suffix) => name.to_lowercase().ends_with(suffix.as_str()),
            SearchQuery::Wildcard(pattern) => pattern
                .as_ref()
                .is_some_and(|p| p.matches_with(name, case_insensitive_match_options())),
            SearchQuery::Fuzzy(query) => return fuzzy_score(query, name),
        };
        matched.then_some(0)
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, SearchQuery::Fuzzy(_))
    }
}

const EXACT_SCORE: i64 = 10_000;
const PREFIX_SCORE: i64 = 5_000;
const CONTAINS_SCORE: i64 = 2_500;
const HIT_SCORE: i64 = 16;
const RUN_BONUS: i64 = 8;
const SHORT_NAME_LENGTH: usize = 32;
/* Keeps any subsequence match, bonus included, below the contains tier. */
const SUBSEQUENCE_CEILING: i64 = CONTAINS_SCORE - 1 - SHORT_NAME_LENGTH as i64;

fn shortness_bonus(name_length: usize) -> i64 {
    SHORT_NAME_LENGTH.saturating_sub(name_length) as i64
}

/*
 * Case-folded fuzzy score of `name` for `query`: exact > prefix > contains >
 * subsequence. Subsequence hits are found greedily left to right; each hit
 * scores `HIT_SCORE`, the k-th hit of a consecutive run adds `RUN_BONUS * k`,
 * and every skipped character between two hits costs 1, capped so that a
 * subsequence never outranks a contains match. Shorter names get a small
 * bonus in every tier. Returns `None` when `query` is not a subsequence.
 */
pub fn fuzzy_score(query: &str, name: &str) -> Option<i64> {
    let query: Vec<char> = query.to_lowercase().chars().collect();
    let folded = name.to_lowercase();
    let name_chars: Vec<char> = folded.chars().collect();
    let bonus = shortness_bonus(name_chars.len());

    if query.is_empty() {
        return Some(bonus);
    }
    let query_text: String = query.iter().collect();
    if folded == query_text {
        return Some(EXACT_SCORE + bonus);
    }
    if folded.starts_with(&query_text) {
        return Some(PREFIX_SCORE + bonus);
    }
    if folded.contains(&query_text) {
        return Some(CONTAINS_SCORE + bonus);
    }

    let mut score = 0i64;
    let mut next = 0usize;
    let mut last_hit: Option<usize> = None;
    let mut run = 0i64;
    for (index, ch) in name_chars.iter().enumerate() {
        if next == query.len() {
            break;
        }
        if *ch != query[next] {
            continue;
        }
        score += HIT_SCORE;
        match last_hit {
            Some(previous) if previous + 1 == index => {
                run += 1;
                score += RUN_BONUS * run;
            }
            Some(previous) => {
                run = 0;
                score -= (index - previous - 1) as i64;
            }
            None => {}
        }
        last_hit = Some(index);
        next += 1;
    }

    (next == query.len()).then_some(score.min(SUBSEQUENCE_CEILING) + bonus)
}

fn passes_filter_text(name: &str, filter_text: &str) -> bool {
    if has_wildcard(filter_text) {
        wildcard_pattern(filter_text)
            .is_some_and(|p| p.matches_with(name, case_insensitive_match_options()))
    } else {
        name.to_lowercase().contains(&filter_text.to_lowercase())
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/*
 * Directories before files, then the selected mode. The direction only
 * affects the mode comparison, never the kind split.
 */
pub fn compare_entries(a: &Entry, b: &Entry, sort: &SortState) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    let ordering = match sort.mode {
        SortMode::Name => compare_names(a.name(), b.name()),
        SortMode::Size => a.size.cmp(&b.size),
        SortMode::Date => a.modified_at.cmp(&b.modified_at),
        SortMode::Tokens => a.token_count.unwrap_or(0).cmp(&b.token_count.unwrap_or(0)),
    };
    match sort.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

pub fn arrange(entries: Vec<Entry>, sort: &SortState, filter: &ViewFilter) -> Vec<Entry> {
    let visible = |entry: &Entry| filter.show_hidden || !entry.name().starts_with('.');

    if let Some(term) = filter.active_search() {
        let query = SearchQuery::parse(term);
        let mut scored: Vec<(i64, Entry)> = entries
            .into_iter()
            .filter_map(|entry| query.score(entry.name()).map(|score| (score, entry)))
            .filter(|(_, entry)| visible(entry))
            .collect();
        if query.is_ranked() {
            scored.sort_by(|(score_a, a), (score_b, b)| {
                b.is_dir().cmp(&a.is_dir()).then(score_b.cmp(score_a))
            });
            log::trace!("Arrange: {} fuzzy result(s) for '{term}'.", scored.len());
            return scored.into_iter().map(|(_, entry)| entry).collect();
        }
        let mut matched: Vec<Entry> = scored.into_iter().map(|(_, entry)| entry).collect();
        matched.sort_by(|a, b| compare_entries(a, b, sort));
        return matched;
    }

    let mut kept: Vec<Entry> = match filter.active_filter() {
        Some(text) => entries
            .into_iter()
            .filter(|entry| passes_filter_text(entry.name(), text))
            .collect(),
        None => entries,
    };
    kept.retain(|entry| visible(entry));
    kept.sort_by(|a, b| compare_entries(a, b, sort));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::EntryKind;
    use rand::seq::SliceRandom;
    use std::time::{Duration, SystemTime};

    fn file(path: &str, size: u64, tokens: Option<usize>) -> Entry {
        Entry::new_test(path, EntryKind::File, size, tokens)
    }

    fn dir(path: &str) -> Entry {
        Entry::new_test(path, EntryKind::Directory, 0, None)
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    fn search(term: &str) -> ViewFilter {
        ViewFilter {
            search_term: Some(term.to_string()),
            ..ViewFilter::default()
        }
    }

    #[test]
    fn test_directories_first_for_every_mode_and_direction() {
        let entries = vec![
            file("/r/a.txt", 999, Some(999)),
            dir("/r/zeta"),
            file("/r/b.txt", 1, Some(1)),
            dir("/r/alpha"),
        ];
        for mode in [SortMode::Name, SortMode::Size, SortMode::Date, SortMode::Tokens] {
            for direction in [SortDirection::Ascending, SortDirection::Descending] {
                let sorted = arrange(
                    entries.clone(),
                    &SortState::new(mode, direction),
                    &ViewFilter::default(),
                );
                assert!(sorted[0].is_dir() && sorted[1].is_dir(), "{mode} {direction:?}");
                assert!(!sorted[2].is_dir() && !sorted[3].is_dir());
            }
        }
    }

    #[test]
    fn test_sort_by_name_ignores_shuffled_input_order() {
        let mut entries = vec![
            file("/r/c.rs", 0, None),
            file("/r/A.rs", 0, None),
            file("/r/b.rs", 0, None),
            dir("/r/src"),
        ];
        entries.shuffle(&mut rand::rng());
        let sorted = arrange(entries, &SortState::default(), &ViewFilter::default());
        assert_eq!(names(&sorted), vec!["src", "A.rs", "b.rs", "c.rs"]);
    }

    #[test]
    fn test_sort_by_tokens_descending_treats_missing_as_zero() {
        let entries = vec![
            file("/r/none.txt", 0, None),
            file("/r/big.txt", 0, Some(50)),
            file("/r/small.txt", 0, Some(5)),
        ];
        let sorted = arrange(
            entries,
            &SortState::new(SortMode::Tokens, SortDirection::Descending),
            &ViewFilter::default(),
        );
        assert_eq!(names(&sorted), vec!["big.txt", "small.txt", "none.txt"]);
    }

    #[test]
    fn test_sort_by_date_and_size() {
        let mut old = file("/r/old.txt", 10, None);
        let mut new = file("/r/new.txt", 5, None);
        old.modified_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        new.modified_at = SystemTime::UNIX_EPOCH + Duration::from_secs(2);

        let by_date = arrange(
            vec![new.clone(), old.clone()],
            &SortState::new(SortMode::Date, SortDirection::Ascending),
            &ViewFilter::default(),
        );
        assert_eq!(names(&by_date), vec!["old.txt", "new.txt"]);

        let by_size = arrange(
            vec![old, new],
            &SortState::new(SortMode::Size, SortDirection::Ascending),
            &ViewFilter::default(),
        );
        assert_eq!(names(&by_size), vec!["new.txt", "old.txt"]);
    }

    #[test]
    fn test_sort_state_select_toggles_direction() {
        let mut state = SortState::default();
        state.select(SortMode::Name);
        assert_eq!(state.direction, SortDirection::Descending);
        state.select(SortMode::Tokens);
        assert_eq!(state, SortState::new(SortMode::Tokens, SortDirection::Ascending));
    }

    #[test]
    fn test_fuzzy_ranking_example() {
        let entries = vec![
            file("/r/readme.md", 0, None),
            file("/r/fooSomethingPlain.ts", 0, None),
            file("/r/fileSystemProvider.ts", 0, None),
        ];
        let results = arrange(entries, &SortState::default(), &search("fsp"));
        assert_eq!(
            names(&results),
            vec!["fileSystemProvider.ts", "fooSomethingPlain.ts"]
        );
    }

    #[test]
    fn test_fuzzy_tiers() {
        let exact = fuzzy_score("main.rs", "main.rs").unwrap();
        let prefix = fuzzy_score("main", "main.rs").unwrap();
        let contains = fuzzy_score("ain", "main.rs").unwrap();
        let subsequence = fuzzy_score("mrs", "main.rs").unwrap();
        assert!(exact > prefix && prefix > contains && contains > subsequence);
        assert_eq!(fuzzy_score("xyz", "main.rs"), None);
    }

    #[test]
    fn test_fuzzy_consecutive_run_beats_isolated_hits() {
        let run = fuzzy_score("abc", "abxcx").unwrap();
        let spread = fuzzy_score("abc", "axbxc").unwrap();
        assert!(run > spread);
    }

    #[test]
    fn test_fuzzy_ties_keep_input_order() {
        let entries = vec![file("/r/ab1", 0, None), file("/r/ab2", 0, None)];
        let results = arrange(entries, &SortState::default(), &search("ab"));
        assert_eq!(names(&results), vec!["ab1", "ab2"]);
    }

    #[test]
    fn test_invalid_regex_yields_empty_result() {
        let entries = vec![file("/r/a.txt", 0, None), dir("/r/[")];
        assert!(arrange(entries, &SortState::default(), &search("/[/")).is_empty());
    }

    #[test]
    fn test_regex_search_is_case_insensitive() {
        let entries = vec![file("/r/Main.RS", 0, None), file("/r/lib.rs", 0, None)];
        let results = arrange(entries, &SortState::default(), &search("/^main/"));
        assert_eq!(names(&results), vec!["Main.RS"]);
    }

    #[test]
    fn test_extension_and_wildcard_search() {
        let entries = vec![
            file("/r/App.TSX", 0, None),
            file("/r/app.ts", 0, None),
            file("/r/notes.md", 0, None),
        ];
        let by_extension = arrange(entries.clone(), &SortState::default(), &search(".tsx"));
        assert_eq!(names(&by_extension), vec!["App.TSX"]);

        let by_wildcard = arrange(entries.clone(), &SortState::default(), &search("app.t?"));
        assert_eq!(names(&by_wildcard), vec!["app.ts"]);

        // Without wildcard characters the term is ranked fuzzily.
        assert!(arrange(entries, &SortState::default(), &search("app")).len() == 2);
    }

    #[test]
    fn test_wildcard_treats_brackets_literally() {
        let entries = vec![
            file("/r/[id].tsx", 0, None),
            file("/r/i.tsx", 0, None),
            file("/r/[slug].tsx", 0, None),
        ];
        let results = arrange(entries.clone(), &SortState::default(), &search("[id]*"));
        assert_eq!(names(&results), vec!["[id].tsx"]);

        let results = arrange(entries.clone(), &SortState::default(), &search("[*"));
        assert_eq!(names(&results), vec!["[id].tsx", "[slug].tsx"]);

        // Repeated stars behave like a single one.
        let results = arrange(entries, &SortState::default(), &search("i**.tsx"));
        assert_eq!(names(&results), vec!["i.tsx"]);
    }

    #[test]
    fn test_long_subsequence_stays_below_contains_tier() {
        let query = format!("{}{}", "x".repeat(18), "y".repeat(18));
        let subsequence_name = format!("{}z{}", "x".repeat(18), "y".repeat(18));
        let contains_name = format!("q{query}{}", "q".repeat(40));

        let subsequence = fuzzy_score(&query, &subsequence_name).unwrap();
        let contains = fuzzy_score(&query, &contains_name).unwrap();
        assert!(contains > subsequence, "{contains} <= {subsequence}");

        let entries = vec![
            file(&format!("/r/{subsequence_name}"), 0, None),
            file(&format!("/r/{contains_name}"), 0, None),
        ];
        let results = arrange(entries, &SortState::default(), &search(&query));
        assert_eq!(names(&results), vec![contains_name.as_str(), subsequence_name.as_str()]);
    }

    #[test]
    fn test_search_takes_precedence_over_filter() {
        let entries = vec![file("/r/alpha.rs", 0, None), file("/r/beta.rs", 0, None)];
        let filter = ViewFilter {
            search_term: Some("beta".to_string()),
            filter_text: Some("alpha".to_string()),
            show_hidden: false,
        };
        assert_eq!(names(&arrange(entries, &SortState::default(), &filter)), vec!["beta.rs"]);
    }

    #[test]
    fn test_filter_text_substring_and_wildcard() {
        let entries = vec![file("/r/Config.toml", 0, None), file("/r/main.rs", 0, None)];
        let substring = ViewFilter {
            filter_text: Some("CONFIG".to_string()),
            ..ViewFilter::default()
        };
        assert_eq!(
            names(&arrange(entries.clone(), &SortState::default(), &substring)),
            vec!["Config.toml"]
        );

        let wildcard = ViewFilter {
            filter_text: Some("*.RS".to_string()),
            ..ViewFilter::default()
        };
        assert_eq!(
            names(&arrange(entries, &SortState::default(), &wildcard)),
            vec!["main.rs"]
        );
    }

    #[test]
    fn test_hidden_entries_applied_after_search() {
        let entries = vec![file("/r/.env", 0, None), file("/r/env.rs", 0, None)];
        assert_eq!(
            names(&arrange(entries.clone(), &SortState::default(), &search("env"))),
            vec!["env.rs"]
        );
        let shown = ViewFilter {
            search_term: Some("env".to_string()),
            show_hidden: true,
            ..ViewFilter::default()
        };
        assert_eq!(arrange(entries, &SortState::default(), &shown).len(), 2);
    }

    #[test]
    fn test_search_results_keep_directories_first() {
        let entries = vec![file("/r/src.rs", 0, None), dir("/r/source")];
        let results = arrange(entries, &SortState::default(), &search("src"));
        assert_eq!(names(&results), vec!["source", "src.rs"]);
    }
}
