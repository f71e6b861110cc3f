//! Canonical hierarchical identifiers.
//!
//! Identifiers are sequences of segments joined by `::`. Segments are either
//! string keys into mappings or non-negative indices into sequences. The
//! empty identifier denotes the root of the config tree. The legacy `#`
//! separator is accepted on input and rewritten to `::` before parsing.
//!
//! A leading `::` marks a *relative* identifier: `@::foo` names a sibling of
//! the item the string appears in, and each additional leading `::` ascends
//! one level further. [`rewrite_relative`] turns these into absolute ids
//! before the graph is built.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Segment separator in the textual identifier form.
pub const ID_SEPARATOR: &str = "::";

/// Legacy separator accepted on input.
pub const LEGACY_SEPARATOR: &str = "#";

/// One step of an identifier: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// The textual form used when descending into a mapping.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A canonical hierarchical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Id {
    segments: Vec<Segment>,
}

impl Id {
    /// The empty identifier, denoting the root of the tree.
    pub fn root() -> Self {
        Id::default()
    }

    /// Parse a textual identifier.
    ///
    /// Splits on `::` after normalizing the legacy `#` separator.
    /// Integer-convertible segments (canonical decimal form) are stored as
    /// indices. Empty text yields the root. Embedded whitespace around
    /// separators and empty segments are rejected.
    pub fn parse(text: &str) -> Result<Id> {
        let text = normalize(text);
        if text.is_empty() {
            return Ok(Id::root());
        }

        let mut segments = Vec::new();
        for part in text.split(ID_SEPARATOR) {
            if part.is_empty() {
                return Err(Error::parse(format!(
                    "malformed identifier `{text}`: empty segment"
                )));
            }
            if part.trim() != part {
                return Err(Error::parse(format!(
                    "malformed identifier `{text}`: whitespace around separator"
                )));
            }
            segments.push(parse_segment(part));
        }
        Ok(Id { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Child identifier under a mapping key.
    pub fn child_key(&self, key: &str) -> Id {
        let mut segments = self.segments.clone();
        segments.push(parse_segment(key));
        Id { segments }
    }

    /// Child identifier under a sequence index.
    pub fn child_index(&self, index: usize) -> Id {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Id { segments }
    }

    /// Enclosing identifier, or `None` at the root.
    pub fn parent(&self) -> Option<Id> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Id { segments })
    }

    /// Final segment, or `None` at the root.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Whether `self` is `prefix` or a descendant of it.
    pub fn starts_with(&self, prefix: &Id) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Concatenate with a textual identifier.
    ///
    /// If `other` starts with one or more empty segments (textually
    /// `::rest`), each leading empty segment after the first strips one
    /// trailing segment from `self`.
    pub fn join(&self, other: &str) -> Result<Id> {
        let other = normalize(other);
        if other.is_empty() {
            return Ok(self.clone());
        }

        let mut ascend = 0;
        let mut rest = other.as_str();
        while let Some(stripped) = rest.strip_prefix(ID_SEPARATOR) {
            ascend += 1;
            rest = stripped;
        }

        let mut segments = self.segments.clone();
        if ascend > 0 {
            // The first empty segment marks relativity; each additional one
            // ascends a level.
            for _ in 0..(ascend - 1) {
                if segments.pop().is_none() {
                    return Err(Error::parse(format!(
                        "relative identifier `{other}` ascends past the root"
                    )));
                }
            }
        }

        let tail = Id::parse(rest)?;
        segments.extend(tail.segments);
        Ok(Id { segments })
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(ID_SEPARATOR)?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

fn parse_segment(part: &str) -> Segment {
    // Only canonical decimal forms become indices so that mappings with
    // numeric-string keys like "007" keep their textual identity.
    match part.parse::<usize>() {
        Ok(index) if index.to_string() == part => Segment::Index(index),
        _ => Segment::Key(part.to_string()),
    }
}

/// Rewrite the legacy `#` separator to `::`.
pub fn normalize(text: &str) -> String {
    text.replace(LEGACY_SEPARATOR, ID_SEPARATOR)
}

static RELATIVE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@%](?:::)+").expect("valid relative prefix pattern"));

/// Rewrite relative `@::`/`%::` prefixes in `value` to absolute ids.
///
/// `at` is the identifier of the item the string value lives at. One leading
/// `::` resolves against the item's own level (a sibling), each additional
/// `::` ascends one parent.
pub fn rewrite_relative(value: &str, at: &Id) -> Result<String> {
    let normalized = normalize(value);
    let prefixes: BTreeSet<&str> = RELATIVE_PREFIX
        .find_iter(&normalized)
        .map(|m| m.as_str())
        .collect();
    if prefixes.is_empty() {
        return Ok(normalized);
    }

    let depth = at.len();
    let mut out = normalized.clone();
    // Longest prefixes first so `@::::` is not clobbered by `@::`.
    for prefix in prefixes.iter().rev() {
        let sigil = &prefix[..1];
        let ascend = (prefix.len() - 1) / ID_SEPARATOR.len();
        if ascend > depth.max(1) {
            return Err(Error::parse(format!(
                "relative id in `{value}` is out of range of the config content"
            )));
        }
        let keep = depth.saturating_sub(ascend);
        let replacement = if keep == 0 {
            sigil.to_string()
        } else {
            let base: Vec<String> = at.segments()[..keep].iter().map(|s| s.to_string()).collect();
            format!("{sigil}{}{ID_SEPARATOR}", base.join(ID_SEPARATOR))
        };
        out = out.replace(prefix, &replacement);
    }
    Ok(out)
}
