/*
 * Formats entries for a tree view: a label carrying a compact token badge, a
 * tooltip with the exact count, modification time and git status.
 */
use super::git_status::GitFileStatus;
use super::models::{Entry, EntryKind};
use std::path::PathBuf;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryViewModel {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub label: String,
    pub badge: Option<String>,
    pub tooltip: Option<String>,
    pub git_status: Option<GitFileStatus>,
}

/* Rounds `count / unit` to one decimal, dropping a trailing `.0`. */
fn compact(count: usize, unit: u128, suffix: char) -> String {
    let tenths = (count as u128 * 10 + unit / 2) / unit;
    let (whole, fraction) = (tenths / 10, tenths % 10);
    if fraction == 0 {
        format!("{whole}{suffix}")
    } else {
        format!("{whole}.{fraction}{suffix}")
    }
}

/* `999`, `1.2K`, `45K`, `3.4M`. */
pub fn format_token_badge(count: usize) -> String {
    const THOUSAND: u128 = 1_000;
    const MILLION: u128 = 1_000_000;
    if count < 1_000 {
        return count.to_string();
    }
    // 999_950 would round up to "1000K"; show it as "1M" instead.
    let thousands_tenths = (count as u128 * 10 + THOUSAND / 2) / THOUSAND;
    if count as u128 >= MILLION || thousands_tenths >= 10_000 {
        compact(count, MILLION, 'M')
    } else {
        compact(count, THOUSAND, 'K')
    }
}

/* `1234567` -> `1,234,567`. */
pub fn format_with_separators(count: usize) -> String {
    let digits = count.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}

/* `None` for timestamps `time` cannot represent. */
fn format_modified(modified_at: SystemTime) -> Option<String> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let moment = match modified_at.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => OffsetDateTime::UNIX_EPOCH.checked_add(time::Duration::try_from(after).ok()?),
        Err(before) => {
            let before = time::Duration::try_from(before.duration()).ok()?;
            OffsetDateTime::UNIX_EPOCH.checked_sub(before)
        }
    }?;
    moment.format(format).ok()
}

pub fn build_view_model(
    entry: &Entry,
    badge_suffix: &str,
    git_status: Option<GitFileStatus>,
) -> EntryViewModel {
    let count = entry.token_count.unwrap_or(0);
    let badge = (count > 0).then(|| format_token_badge(count));

    let label = match &badge {
        Some(badge) if badge_suffix.is_empty() => format!("{} [{badge}]", entry.name()),
        Some(badge) => format!("{} [{badge} {badge_suffix}]", entry.name()),
        None => entry.name().to_string(),
    };

    let mut tooltip_lines = Vec::new();
    if count > 0 {
        let exact = format!("{} {badge_suffix}", format_with_separators(count));
        tooltip_lines.push(exact.trim_end().to_string());
    }
    if entry.kind == EntryKind::File {
        if let Some(modified) = format_modified(entry.modified_at) {
            tooltip_lines.push(format!("Modified {modified}"));
        }
    }
    if let Some(status) = git_status {
        tooltip_lines.push(format!("Git: {}", status.description()));
    }

    EntryViewModel {
        path: entry.path.clone(),
        kind: entry.kind,
        label,
        badge,
        tooltip: (!tooltip_lines.is_empty()).then(|| tooltip_lines.join("\n")),
        git_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_token_badge() {
        assert_eq!(format_token_badge(0), "0");
        assert_eq!(format_token_badge(999), "999");
        assert_eq!(format_token_badge(1_000), "1K");
        assert_eq!(format_token_badge(1_234), "1.2K");
        assert_eq!(format_token_badge(45_050), "45.1K");
        assert_eq!(format_token_badge(999_950), "1M");
        assert_eq!(format_token_badge(3_400_000), "3.4M");
    }

    #[test]
    fn test_format_with_separators() {
        assert_eq!(format_with_separators(7), "7");
        assert_eq!(format_with_separators(1_234), "1,234");
        assert_eq!(format_with_separators(123_456), "123,456");
        assert_eq!(format_with_separators(1_234_567), "1,234,567");
    }

    #[test]
    fn test_view_model_with_count_and_git_status() {
        let mut entry = Entry::new_test("/w/src/main.rs", EntryKind::File, 10, Some(1_234));
        entry.modified_at = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        let model = build_view_model(&entry, "tokens", Some(GitFileStatus::Modified));

        assert_eq!(model.label, "main.rs [1.2K tokens]");
        assert_eq!(model.badge.as_deref(), Some("1.2K"));
        assert_eq!(
            model.tooltip.as_deref(),
            Some("1,234 tokens\nModified 1970-01-02 00:00\nGit: Modified")
        );
        assert_eq!(model.git_status, Some(GitFileStatus::Modified));
    }

    #[test]
    fn test_unrepresentable_mtime_omits_modified_line() {
        let mut entry = Entry::new_test("/w/far.rs", EntryKind::File, 10, Some(42));
        entry.modified_at = SystemTime::UNIX_EPOCH
            .checked_add(Duration::from_secs(1 << 40))
            .unwrap();
        let model = build_view_model(&entry, "tokens", None);
        assert_eq!(model.tooltip.as_deref(), Some("42 tokens"));
    }

    #[test]
    fn test_view_model_without_count_has_bare_label() {
        let entry = Entry::new_test("/w/empty", EntryKind::Directory, 0, Some(0));
        let model = build_view_model(&entry, "tokens", None);
        assert_eq!(model.label, "empty");
        assert_eq!(model.badge, None);
        assert_eq!(model.tooltip, None);
    }
}
