//! Rule compilation and evaluation.
//!
//! Two independent exclusion sources are evaluated here:
//!
//! - [`CompiledRuleSet`]: gitignore-syntax rules from the rule files, matched
//!   case-insensitively with standard last-match-wins precedence.
//! - [`ExcludeFilters`]: the host's native filter list, where `/.../` entries
//!   are regular expressions and everything else is a path prefix.
//!
//! A path is excluded when either source excludes it.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use regex::{Regex, RegexBuilder};

use crate::path::{is_root, normalize_path};

/// An immutable, order-preserving set of gitignore rules.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    matcher: Gitignore,
    skipped_lines: usize,
}

impl CompiledRuleSet {
    /// Compiles rule text. Lines that fail to parse are logged and skipped.
    pub fn compile(rules: &str) -> Self {
        let mut builder = GitignoreBuilder::new("");
        if let Err(error) = builder.case_insensitive(true) {
            tracing::warn!("failed to enable case-insensitive rule matching: {}", error);
        }

        let mut skipped_lines = 0;
        for line in rules.lines() {
            if let Err(error) = builder.add_line(None, line) {
                tracing::warn!("skipping invalid rule {:?}: {}", line, error);
                skipped_lines += 1;
            }
        }

        let matcher = match builder.build() {
            Ok(matcher) => matcher,
            Err(error) => {
                tracing::warn!("failed to build rule set, treating it as empty: {}", error);
                Gitignore::empty()
            }
        };

        Self {
            matcher,
            skipped_lines,
        }
    }

    /// Compiles the concatenation of the primary and (optional) secondary rule
    /// text. Secondary rules come last and therefore take precedence.
    pub fn from_sources(primary: &str, secondary: Option<&str>) -> Self {
        match secondary {
            Some(secondary) => Self::compile(&format!("{primary}\n{secondary}")),
            None => Self::compile(primary),
        }
    }

    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
            skipped_lines: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.matcher.num_ignores() as usize + self.matcher.num_whitelists() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    /// Number of lines dropped because they failed to parse.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Evaluates a normalized path. A path is also excluded when one of its
    /// parent folders is excluded and not re-included.
    pub fn is_excluded(&self, path: &str, is_folder: bool) -> bool {
        if self.matcher.is_empty() {
            return false;
        }
        let candidate = Path::new(path);
        if candidate.has_root() || path.is_empty() {
            return false;
        }
        matches!(
            self.matcher.matched_path_or_any_parents(candidate, is_folder),
            Match::Ignore(_)
        )
    }
}

/// A compiled host exclude filter.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    source: String,
    regex: Regex,
}

impl ExcludeFilter {
    /// Parses one filter entry. Returns `None` (after logging) for malformed
    /// regular expressions.
    pub fn parse(filter: &str) -> Option<Self> {
        let regex = match regex_body(filter) {
            Some((body, flags)) => build_regex(body, flags),
            None => build_regex(&format!("^{}", regex::escape(filter)), ""),
        };
        match regex {
            Ok(regex) => Some(Self {
                source: filter.to_string(),
                regex,
            }),
            Err(error) => {
                tracing::warn!("invalid exclude filter {}: {}", filter, error);
                None
            }
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Splits a `/.../` filter into its regex body and trailing flag letters.
///
/// `/body/` yields no flags. `/body/flags/` treats a final `/flags` segment
/// made only of `imsux` letters as flags, so filters written with a
/// JavaScript-style flag suffix keep working.
fn regex_body(filter: &str) -> Option<(&str, &str)> {
    if filter.len() <= 1 || !filter.starts_with('/') || !filter.ends_with('/') {
        return None;
    }
    let inner = &filter[1..filter.len() - 1];
    if let Some((body, flags)) = inner.rsplit_once('/') {
        let is_flag_suffix = !body.is_empty()
            && !flags.is_empty()
            && !body.ends_with('\\')
            && flags.chars().all(|flag| "imsux".contains(flag));
        if is_flag_suffix {
            return Some((body, flags));
        }
    }
    Some((inner, ""))
}

fn build_regex(body: &str, flags: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(body)
        .case_insensitive(true)
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .unicode(true)
        .build()
}

/// The host's exclude-filter list, compiled.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilters {
    filters: Vec<ExcludeFilter>,
}

impl ExcludeFilters {
    /// Compiles every filter, skipping malformed ones.
    pub fn compile<S: AsRef<str>>(filters: &[S]) -> Self {
        Self {
            filters: filters
                .iter()
                .filter_map(|filter| {
                    let filter: &str = filter.as_ref();
                    if filter.trim().is_empty() {
                        return None;
                    }
                    ExcludeFilter::parse(filter)
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExcludeFilter> {
        self.filters.iter()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.filters.iter().any(|filter| filter.is_match(path))
    }
}

/// Evaluates a path against both exclusion sources.
///
/// Folders are checked both as `path` and as `path/`, and are excluded if
/// either form matches. The root is never excluded.
pub fn is_excluded(
    rules: &CompiledRuleSet,
    filters: &ExcludeFilters,
    path: &str,
    is_folder: bool,
) -> bool {
    let normalized = normalize_path(path);
    if is_root(&normalized) {
        return false;
    }

    let mut candidates = vec![normalized.clone()];
    if is_folder {
        candidates.push(format!("{normalized}/"));
    }

    candidates
        .iter()
        .any(|candidate| rules.is_excluded(candidate, is_folder) || filters.is_match(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(rules: &str, path: &str, is_folder: bool) -> bool {
        is_excluded(
            &CompiledRuleSet::compile(rules),
            &ExcludeFilters::default(),
            path,
            is_folder,
        )
    }

    #[test]
    fn root_is_never_excluded() {
        assert!(!excluded("*\n/\n**", "/", true));
        assert!(!excluded("*", "", true));
    }

    #[test]
    fn negation_re_includes_later() {
        let rules = "foo/*\n!foo/bar.md";
        assert!(!excluded(rules, "foo/bar.md", false));
        assert!(excluded(rules, "foo/baz.md", false));
    }

    #[test]
    fn last_matching_rule_wins() {
        let rules = "!keep.md\n*.md";
        assert!(excluded(rules, "keep.md", false));
    }

    #[test]
    fn directory_rules_only_match_folders() {
        assert!(excluded("build/", "build", true));
        assert!(excluded("build/", "build/", true));
        assert!(!excluded("build/", "build", false));
    }

    #[test]
    fn excluded_folder_excludes_its_contents() {
        assert!(excluded("build/", "build/out/report.md", false));
        assert!(excluded("drafts", "drafts/ideas/a.md", false));
    }

    #[test]
    fn leading_slash_anchors_to_root() {
        let rules = "/private";
        assert!(excluded(rules, "private", true));
        assert!(!excluded(rules, "notes/private", true));

        let unanchored = "private";
        assert!(excluded(unanchored, "notes/private", true));
    }

    #[test]
    fn globs_follow_gitignore_semantics() {
        let rules = "*.tmp\nlogs/**/debug.log\nfile?.txt";
        assert!(excluded(rules, "a/b/c.tmp", false));
        assert!(excluded(rules, "logs/debug.log", false));
        assert!(excluded(rules, "logs/x/y/debug.log", false));
        assert!(excluded(rules, "file1.txt", false));
        assert!(!excluded(rules, "file10.txt", false));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(excluded("Drafts/", "drafts", true));
        assert!(excluded("*.PNG", "images/cat.png", false));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let rules = "# drafts\n\n   \n";
        let compiled = CompiledRuleSet::compile(rules);
        assert!(compiled.is_empty());
        assert!(!compiled.is_excluded("drafts", true));
    }

    #[test]
    fn secondary_rules_override_primary() {
        let rules = CompiledRuleSet::from_sources("*.log", Some("!keep.log"));
        assert!(!rules.is_excluded("keep.log", false));
        assert!(rules.is_excluded("other.log", false));

        let primary_only = CompiledRuleSet::from_sources("*.log", None);
        assert!(primary_only.is_excluded("keep.log", false));
    }

    #[test]
    fn plain_filters_are_case_insensitive_prefixes() {
        let filters = ExcludeFilters::compile(&["Archive/", "a+b"]);
        assert!(filters.is_match("archive/old.md"));
        assert!(!filters.is_match("notes/archive/old.md"));
        assert!(filters.is_match("a+b.md"));
        assert!(!filters.is_match("aab.md"));
    }

    #[test]
    fn slash_delimited_filters_are_regexes() {
        let filters = ExcludeFilters::compile(&["/\\.excalidraw\\.md$/"]);
        assert!(filters.is_match("drawings/Sketch.EXCALIDRAW.md"));
        assert!(!filters.is_match("drawings/sketch.md"));
    }

    #[test]
    fn flag_suffix_inside_delimiters_is_accepted() {
        let filters = ExcludeFilters::compile(&["/^temp/i/"]);
        assert_eq!(filters.len(), 1);
        assert!(filters.is_match("temp123.md"));
        assert!(filters.is_match("TEMP/notes.md"));
    }

    #[test]
    fn malformed_regex_filters_are_skipped() {
        let filters = ExcludeFilters::compile(&["/([unclosed/", "keep"]);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters.iter().next().map(ExcludeFilter::source), Some("keep"));
        assert!(!filters.is_match("([unclosed"));
    }

    #[test]
    fn filters_or_with_rules_regardless_of_negation() {
        let rules = CompiledRuleSet::compile("*.md\n!temp.md");
        let filters = ExcludeFilters::compile(&["temp"]);
        assert!(is_excluded(&rules, &filters, "temp.md", false));
        assert!(is_excluded(&rules, &ExcludeFilters::default(), "other.md", false));
        assert!(!is_excluded(&rules, &ExcludeFilters::default(), "temp.md", false));
    }

    #[test]
    fn folder_filters_match_separator_suffixed_form() {
        let filters = ExcludeFilters::compile(&["/^attachments\\/$/"]);
        let rules = CompiledRuleSet::empty();
        assert!(is_excluded(&rules, &filters, "attachments", true));
        assert!(!is_excluded(&rules, &filters, "attachments", false));
    }
}
