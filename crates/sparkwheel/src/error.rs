//! Error types with source location tracking and suggestions.

use std::fmt;

use thiserror::Error;

/// Result type alias for sparkwheel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Location of a config item in its source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Path of the file the item was loaded from.
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
    /// Canonical id of the item, if known.
    pub id: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// Errors surfaced by the configuration engine.
///
/// Merge and build failures fail the whole load; resolution failures are
/// surfaced at the outermost `resolve` call and never leave partial results
/// behind. A failed resolution leaves the item unresolved so a corrected
/// state can be retried after mutation.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identifier, override string, or YAML input.
    #[error("parse error: {message}{}", loc_suffix(.location))]
    Parse {
        message: String,
        location: Option<SourceLocation>,
    },

    /// Operator misuse while merging config layers.
    #[error("merge error: {message}{}{}", loc_suffix(.location), hint_suffix(.suggestion))]
    Merge {
        message: String,
        location: Option<SourceLocation>,
        suggestion: Option<String>,
    },

    /// Identifier not present in the graph.
    #[error("id `{id}` not found{}{}", loc_suffix(.location), did_you_mean(.suggestions))]
    KeyNotFound {
        id: String,
        suggestions: Vec<String>,
        location: Option<SourceLocation>,
    },

    /// Circular reference between config items.
    #[error("circular reference detected: {}", .participants.join(" -> "))]
    Cycle { participants: Vec<String> },

    /// Expression evaluation failed.
    #[error("failed to evaluate expression at `{id}`: {message}")]
    Expression { id: String, message: String },

    /// Component location or invocation failed.
    #[error("failed to instantiate `{id}`: {message}{}", hint_suffix(.suggestion))]
    Instantiation {
        id: String,
        message: String,
        suggestion: Option<String>,
    },

    /// Resolved value did not match the expected schema.
    #[error("validation failed:\n{}", format_issues(.issues))]
    Validation { issues: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code for embedding tools: 1 merge/validation, 2 resolution,
    /// 3 instantiation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse { .. } | Error::Merge { .. } | Error::Validation { .. } | Error::Io(_) => 1,
            Error::KeyNotFound { .. } | Error::Cycle { .. } | Error::Expression { .. } => 2,
            Error::Instantiation { .. } => 3,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            location: None,
        }
    }

    pub(crate) fn merge(message: impl Into<String>, suggestion: Option<String>) -> Self {
        Error::Merge {
            message: message.into(),
            location: None,
            suggestion,
        }
    }
}

fn loc_suffix(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" [{loc}]"),
        None => String::new(),
    }
}

fn hint_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(hint) => format!("\n  hint: {hint}"),
        None => String::new(),
    }
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(
            "\n  hint: did you mean {}?",
            suggestions
                .iter()
                .map(|s| format!("`{s}`"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

fn format_issues(issues: &[String]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Levenshtein edit distance between two strings.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }

    dp[m][n]
}

/// Rank `candidates` by edit distance to `target` and keep close matches.
///
/// Candidates sharing a prefix with the target are always considered close;
/// otherwise the distance threshold scales with the target length.
pub(crate) fn suggest<'a, I>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = (target.len() / 3).max(2);
    let mut ranked: Vec<(usize, String)> = candidates
        .into_iter()
        .filter(|c| !c.is_empty())
        .filter_map(|c| {
            let distance = edit_distance(target, c);
            let prefix_match = !target.is_empty() && (c.starts_with(target) || target.starts_with(c));
            if distance <= threshold || prefix_match {
                Some((distance, c.to_string()))
            } else {
                None
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.truncate(3);
    ranked.into_iter().map(|(_, c)| c).collect()
}
