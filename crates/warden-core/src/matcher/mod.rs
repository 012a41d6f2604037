//! Target pattern matching with ReDoS hardening.
//!
//! Policy rules constrain targets with glob patterns by default, or raw
//! regular expressions when a rule opts in. Globs are compiled to anchored
//! regexes; raw regexes must first pass [`validate_regex_pattern`], which
//! rejects the classic catastrophic-backtracking shapes and oversized
//! patterns before anything is compiled.
//!
//! # Glob Syntax
//!
//! - `?` matches exactly one character other than `/`
//! - `*` matches any run of characters other than `/`
//! - `**` matches any run including `/`, absorbing one trailing `/` so that
//!   `**/foo` also matches a bare `foo`
//!
//! All other regex metacharacters are escaped; the compiled pattern is
//! anchored with `^…$`, so a glob always matches the full target string.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::classifier::ToolCategory;

/// Maximum accepted length for a raw regex pattern.
pub const MAX_PATTERN_LEN: usize = 500;

/// Errors from pattern validation and compilation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MatcherError {
    /// The pattern exceeds [`MAX_PATTERN_LEN`] characters.
    #[error("pattern is {len} characters, maximum is {MAX_PATTERN_LEN}")]
    PatternTooLong {
        /// Actual pattern length.
        len: usize,
    },

    /// A quantified group is itself quantified, e.g. `(a+)+`.
    #[error("nested quantifier in pattern: {pattern}")]
    NestedQuantifier {
        /// The rejected pattern.
        pattern: String,
    },

    /// A quantified alternation contains an overlapping wildcard branch,
    /// e.g. `(.*|a)+`.
    #[error("overlapping alternation under quantifier: {pattern}")]
    OverlappingAlternation {
        /// The rejected pattern.
        pattern: String,
    },

    /// A bounded repetition is immediately followed by another, e.g.
    /// `a{1,10}{1,10}`.
    #[error("chained quantifier in pattern: {pattern}")]
    ChainedQuantifier {
        /// The rejected pattern.
        pattern: String,
    },

    /// The pattern failed to compile.
    #[error("pattern failed to compile: {reason}")]
    Uncompilable {
        /// Compiler diagnostic.
        reason: String,
    },
}

// Shapes rejected by the ReDoS validator. Group boundaries are approximated
// with non-nested bodies, which is sufficient for the quantifier-on-group
// shapes these guards target.
static NESTED_QUANTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*\*\)\s*\+|\([^()]*\+\)\s*[*+{]").expect("nested quantifier guard is valid")
});

static OVERLAPPING_ALTERNATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\.[*+]\|[^()]*\)\s*[*+]").expect("overlapping alternation guard is valid")
});

static CHAINED_QUANTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\d+(,\d*)?\}\{").expect("chained quantifier guard is valid")
});

/// Characters escaped when converting a glob to a regex.
const REGEX_METACHARACTERS: &str = ".+^${}()|[]\\";

/// Converts a glob pattern into an anchored regex source string.
#[must_use]
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    // `**/` matches zero or more leading components.
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                if REGEX_METACHARACTERS.contains(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// Tests a glob pattern against a value as a full-string match.
///
/// Compiles the glob on each call; rule evaluation uses
/// [`CompiledPatterns`] instead to compile once at policy load.
#[must_use]
pub fn glob_match(glob: &str, value: &str) -> bool {
    Regex::new(&glob_to_regex(glob)).is_ok_and(|re| re.is_match(value))
}

/// Validates a raw regex pattern against the ReDoS deny-list.
///
/// # Errors
///
/// Returns the specific [`MatcherError`] variant for oversized patterns,
/// nested quantifiers, overlapping alternations, chained quantifiers, and
/// patterns the regex compiler rejects.
pub fn validate_regex_pattern(pattern: &str) -> Result<(), MatcherError> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(MatcherError::PatternTooLong {
            len: pattern.len(),
        });
    }
    // Overlapping alternation is checked first: shapes like `(.*|.+)+` also
    // trip the generic nested-quantifier guard, and the more specific
    // diagnostic is the useful one.
    if OVERLAPPING_ALTERNATION_RE.is_match(pattern) {
        return Err(MatcherError::OverlappingAlternation {
            pattern: pattern.to_string(),
        });
    }
    if NESTED_QUANTIFIER_RE.is_match(pattern) {
        return Err(MatcherError::NestedQuantifier {
            pattern: pattern.to_string(),
        });
    }
    if CHAINED_QUANTIFIER_RE.is_match(pattern) {
        return Err(MatcherError::ChainedQuantifier {
            pattern: pattern.to_string(),
        });
    }
    Regex::new(pattern).map_err(|e| MatcherError::Uncompilable {
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Target patterns compiled once at policy load.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    regexes: Vec<Regex>,
}

impl CompiledPatterns {
    /// Compiles a pattern list, in glob mode or validated raw-regex mode.
    ///
    /// # Errors
    ///
    /// In regex mode, returns the first validation failure; in either mode,
    /// returns [`MatcherError::Uncompilable`] if compilation fails.
    pub fn compile(patterns: &[String], regex_mode: bool) -> Result<Self, MatcherError> {
        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let source = if regex_mode {
                validate_regex_pattern(pattern)?;
                pattern.clone()
            } else {
                glob_to_regex(pattern)
            };
            regexes.push(Regex::new(&source).map_err(|e| MatcherError::Uncompilable {
                reason: e.to_string(),
            })?);
        }
        Ok(Self { regexes })
    }

    /// Returns `true` if any compiled pattern matches the target.
    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        self.regexes.iter().any(|re| re.is_match(target))
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    /// Returns `true` when no patterns were compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }
}

/// Evaluates the static criteria of a rule against a call.
///
/// Each present field constrains the call (AND semantics); absent fields do
/// not. A target-pattern constraint on a call with no target never matches.
#[must_use]
pub fn matches_rule(
    tool: &str,
    category: ToolCategory,
    target: Option<&str>,
    tools: Option<&[String]>,
    categories: Option<&[ToolCategory]>,
    patterns: Option<&CompiledPatterns>,
) -> bool {
    if let Some(tools) = tools {
        if !tools.iter().any(|t| t == tool) {
            return false;
        }
    }
    if let Some(categories) = categories {
        if !categories.contains(&category) {
            return false;
        }
    }
    if let Some(patterns) = patterns {
        match target {
            Some(target) => {
                if !patterns.matches(target) {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Glob conversion
    // =========================================================================

    #[test]
    fn glob_star_does_not_cross_separators() {
        assert!(glob_match("*.txt", "notes.txt"));
        assert!(!glob_match("*.txt", "dir/notes.txt"));
    }

    #[test]
    fn glob_question_mark_is_single_char() {
        assert!(glob_match("file?.rs", "file1.rs"));
        assert!(!glob_match("file?.rs", "file12.rs"));
        assert!(!glob_match("file?.rs", "file/.rs"));
    }

    #[test]
    fn glob_double_star_spans_separators() {
        assert!(glob_match("/workspace/**", "/workspace/a/b/c.txt"));
        assert!(!glob_match("/workspace/**", "/other/a.txt"));
    }

    #[test]
    fn glob_double_star_absorbs_one_trailing_slash() {
        // `**/` matches zero components, so the bare filename matches too.
        assert!(glob_match("**/.env", ".env"));
        assert!(glob_match("**/.env", "/home/u/.env"));
        assert!(glob_match("**/memory/*.md", "/a/b/memory/jan.md"));
        assert!(!glob_match("**/memory/*.md", "/a/b/memory/deep/jan.md"));
    }

    #[test]
    fn glob_is_anchored_not_substring() {
        assert!(!glob_match("env", "environment"));
        assert!(!glob_match("*.rs", "main.rs.bak"));
        assert!(glob_match("main.rs", "main.rs"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        assert!(glob_match("a+b.txt", "a+b.txt"));
        assert!(!glob_match("a+b.txt", "aab.txt"));
        assert!(glob_match("weird(name)[1].log", "weird(name)[1].log"));
    }

    // =========================================================================
    // ReDoS validation
    // =========================================================================

    #[test]
    fn rejects_nested_quantifiers() {
        assert!(matches!(
            validate_regex_pattern("(.*)+"),
            Err(MatcherError::NestedQuantifier { .. })
        ));
        assert!(matches!(
            validate_regex_pattern("(a+)+"),
            Err(MatcherError::NestedQuantifier { .. })
        ));
        assert!(matches!(
            validate_regex_pattern("(a+)*"),
            Err(MatcherError::NestedQuantifier { .. })
        ));
        assert!(matches!(
            validate_regex_pattern("(a+){2,10}"),
            Err(MatcherError::NestedQuantifier { .. })
        ));
    }

    #[test]
    fn rejects_overlapping_alternation() {
        assert!(matches!(
            validate_regex_pattern("(.*|.+)+"),
            Err(MatcherError::OverlappingAlternation { .. })
        ));
        assert!(matches!(
            validate_regex_pattern("(.+|abc)+"),
            Err(MatcherError::OverlappingAlternation { .. })
        ));
    }

    #[test]
    fn rejects_chained_quantifiers() {
        assert!(matches!(
            validate_regex_pattern("a{1,10}{1,10}"),
            Err(MatcherError::ChainedQuantifier { .. })
        ));
    }

    #[test]
    fn rejects_oversized_patterns() {
        let pattern = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(matches!(
            validate_regex_pattern(&pattern),
            Err(MatcherError::PatternTooLong { .. })
        ));
    }

    #[test]
    fn rejects_uncompilable_patterns() {
        assert!(matches!(
            validate_regex_pattern("(unclosed"),
            Err(MatcherError::Uncompilable { .. })
        ));
    }

    #[test]
    fn accepts_ordinary_patterns() {
        assert!(validate_regex_pattern(r"^rm\s+-").is_ok());
        assert!(validate_regex_pattern(r"^/workspace/.*\.rs$").is_ok());
        assert!(validate_regex_pattern(r"a{1,10}b").is_ok());
    }

    // =========================================================================
    // Rule criteria
    // =========================================================================

    fn compiled(patterns: &[&str]) -> CompiledPatterns {
        let owned: Vec<String> = patterns.iter().map(|s| (*s).to_string()).collect();
        CompiledPatterns::compile(&owned, false).unwrap()
    }

    #[test]
    fn absent_criteria_match_everything() {
        assert!(matches_rule(
            "Bash",
            ToolCategory::Command,
            Some("rm -rf /"),
            None,
            None,
            None
        ));
    }

    #[test]
    fn present_criteria_are_and_combined() {
        let patterns = compiled(&["/workspace/**"]);
        let tools = vec!["Read".to_string()];
        let categories = vec![ToolCategory::FileRead];

        assert!(matches_rule(
            "Read",
            ToolCategory::FileRead,
            Some("/workspace/a.rs"),
            Some(&tools),
            Some(&categories),
            Some(&patterns)
        ));
        // Wrong tool fails despite matching category and target.
        assert!(!matches_rule(
            "Write",
            ToolCategory::FileRead,
            Some("/workspace/a.rs"),
            Some(&tools),
            Some(&categories),
            Some(&patterns)
        ));
        // Wrong target fails despite matching tool and category.
        assert!(!matches_rule(
            "Read",
            ToolCategory::FileRead,
            Some("/etc/passwd"),
            Some(&tools),
            Some(&categories),
            Some(&patterns)
        ));
    }

    #[test]
    fn pattern_constraint_requires_a_target() {
        let patterns = compiled(&["**"]);
        assert!(!matches_rule(
            "TodoWrite",
            ToolCategory::State,
            None,
            None,
            None,
            Some(&patterns)
        ));
    }

    #[test]
    fn regex_mode_patterns_match_raw() {
        let owned = vec![r"^rm\s+-".to_string()];
        let patterns = CompiledPatterns::compile(&owned, true).unwrap();
        assert!(patterns.matches("rm -rf /tmp"));
        assert!(!patterns.matches("rmdir /tmp"));
    }

    #[test]
    fn regex_mode_rejects_redos_patterns_at_compile() {
        let owned = vec!["(a+)+".to_string()];
        assert!(CompiledPatterns::compile(&owned, true).is_err());
    }

    // =========================================================================
    // Property tests
    // =========================================================================

    mod fuzz {
        use proptest::prelude::*;

        use super::*;

        fn path_strategy() -> impl Strategy<Value = String> {
            "[a-z]{1,8}(/[a-z]{1,8}){0,4}(\\.[a-z]{1,3})?".prop_map(String::from)
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            /// Property: a glob of the value itself always matches, and the
            /// match is full-string (appending a suffix breaks it).
            #[test]
            fn prop_literal_glob_matches_exactly(path in path_strategy()) {
                prop_assert!(glob_match(&path, &path));
                let suffixed = format!("{}x", path);
                let prefixed = format!("x{}", path);
                prop_assert!(!glob_match(&path, &suffixed));
                prop_assert!(!glob_match(&path, &prefixed));
            }

            /// Property: `**` matches every path.
            #[test]
            fn prop_double_star_matches_all(path in path_strategy()) {
                prop_assert!(glob_match("**", &path));
            }

            /// Property: glob matching is deterministic.
            #[test]
            fn prop_glob_match_deterministic(
                pattern in "[a-z*?]{1,12}",
                path in path_strategy()
            ) {
                let first = glob_match(&pattern, &path);
                let second = glob_match(&pattern, &path);
                prop_assert_eq!(first, second);
            }

            /// Property: the validator never panics, whatever the input.
            #[test]
            fn prop_validator_is_total(pattern in "\\PC{0,64}") {
                let _ = validate_regex_pattern(&pattern);
            }
        }
    }
}
