//! Glob exclude patterns for remote and local trees

use ferromirror_types::{Error, Result};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Compiled set of exclude patterns
///
/// A path is excluded when any pattern matches the path itself or one of its
/// ancestor prefixes, so `node_modules` also excludes `node_modules/x.js`.
/// Matching is case-sensitive, `*` stops at `/` and a leading dot has to be
/// spelled out (`*` does not match `.env`).
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Pattern>,
}

impl ExcludeFilter {
    /// Compile `patterns`; a malformed pattern is a configuration error
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                Pattern::new(p.trim_end_matches('/'))
                    .map_err(|e| Error::config(format!("Invalid exclude pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Filter that excludes nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if there are no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a remote-relative path is excluded
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let path = path.trim_start_matches("./").trim_matches('/');
        prefixes(path).any(|candidate| {
            self.patterns
                .iter()
                .any(|pattern| pattern.matches_with(candidate, MATCH_OPTIONS))
        })
    }
}

/// `a`, `a/b`, `a/b/c` for `a/b/c`
fn prefixes(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(index, _)| &path[..index])
        .chain(std::iter::once(path))
        .filter(|prefix| !prefix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn defaults() -> ExcludeFilter {
        ExcludeFilter::new(&[".git", "node_modules"]).unwrap()
    }

    #[rstest]
    #[case("node_modules", true)]
    #[case("node_modules/x.js", true)]
    #[case("node_modules/pkg/index.js", true)]
    #[case(".git/HEAD", true)]
    #[case("src/y.js", false)]
    #[case("src/node_modules_backup/a.js", false)]
    #[case("Node_Modules/x.js", false)]
    fn test_default_patterns(#[case] path: &str, #[case] excluded: bool) {
        assert_eq!(defaults().is_excluded(path), excluded);
    }

    #[rstest]
    #[case("*.log", "debug.log", true)]
    #[case("*.log", "logs/debug.log", false)]
    #[case("**/*.log", "logs/debug.log", true)]
    #[case("*", ".env", false)]
    #[case(".*", ".env", true)]
    #[case("dist/*", "dist/app.js", true)]
    #[case("dist/*", "dist", false)]
    #[case("build/", "build/out.txt", true)]
    fn test_glob_semantics(#[case] pattern: &str, #[case] path: &str, #[case] excluded: bool) {
        let filter = ExcludeFilter::new(&[pattern]).unwrap();
        assert_eq!(filter.is_excluded(path), excluded, "{pattern} vs {path}");
    }

    #[test]
    fn test_empty_filter_excludes_nothing() {
        let filter = ExcludeFilter::none();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded("anything/at/all"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExcludeFilter::new(&["[unclosed"]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
