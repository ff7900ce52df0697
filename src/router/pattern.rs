//! Route pattern compilation and matching.
//!
//! Patterns and event names are normalized to the internal `:` separator
//! before matching, so `order.*` and `order:*` are the same pattern and
//! match both `order.created` and `order:created`.

use std::borrow::Cow;
use std::cmp::{Ordering, Reverse};

/// Internal segment separator.
pub const SEPARATOR: char = ':';

/// Separator accepted on input and rewritten to [`SEPARATOR`].
pub const EXTERNAL_SEPARATOR: char = '.';

const WILDCARD: &str = "*";

/// Rewrite dot-separated names to the internal separator.
pub fn normalize(name: &str) -> Cow<'_, str> {
    if name.contains(EXTERNAL_SEPARATOR) {
        Cow::Owned(name.replace(EXTERNAL_SEPARATOR, &SEPARATOR.to_string()))
    } else {
        Cow::Borrowed(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Kind {
    Exact,
    /// `*`
    Universal,
    /// `prefix:*`, matches any depth below the prefix. Stores `prefix:`.
    Suffix(String),
    /// `a:*:c`, one segment per `*`, equal arity.
    Segments(Vec<Segment>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

/// A compiled route pattern with its precedence rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    normalized: String,
    kind: Kind,
}

impl Pattern {
    /// Compile a pattern. Returns `None` for an empty pattern.
    pub fn compile(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }

        let normalized = normalize(source).into_owned();
        let kind = if normalized == WILDCARD {
            Kind::Universal
        } else if !normalized.contains('*') {
            Kind::Exact
        } else if normalized.matches('*').count() == 1
            && normalized.ends_with(&format!("{}{}", SEPARATOR, WILDCARD))
        {
            Kind::Suffix(normalized[..normalized.len() - 1].to_string())
        } else {
            Kind::Segments(
                normalized
                    .split(SEPARATOR)
                    .map(|segment| {
                        if segment == WILDCARD {
                            Segment::Any
                        } else {
                            Segment::Literal(segment.to_string())
                        }
                    })
                    .collect(),
            )
        };

        Some(Self {
            source: source.to_string(),
            normalized,
            kind,
        })
    }

    /// The pattern as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_exact(&self) -> bool {
        self.kind == Kind::Exact
    }

    pub fn is_universal(&self) -> bool {
        self.kind == Kind::Universal
    }

    /// Length of the literal text before the first `*`.
    pub fn literal_prefix_len(&self) -> usize {
        self.normalized.find('*').unwrap_or(self.normalized.len())
    }

    /// Match an already normalized event name.
    pub fn matches(&self, name: &str) -> bool {
        match &self.kind {
            Kind::Exact => self.normalized == name,
            Kind::Universal => true,
            Kind::Suffix(prefix) => name.len() > prefix.len() && name.starts_with(prefix.as_str()),
            Kind::Segments(segments) => {
                let parts: Vec<&str> = name.split(SEPARATOR).collect();
                parts.len() == segments.len()
                    && segments.iter().zip(parts).all(|(segment, part)| match segment {
                        Segment::Any => !part.is_empty(),
                        Segment::Literal(literal) => literal == part,
                    })
            }
        }
    }

    fn class(&self) -> u8 {
        match self.kind {
            Kind::Exact => 0,
            Kind::Suffix(_) | Kind::Segments(_) => 1,
            Kind::Universal => 2,
        }
    }

    fn rank_key(&self) -> (u8, Reverse<usize>, Reverse<usize>, &str) {
        (
            self.class(),
            Reverse(self.literal_prefix_len()),
            Reverse(self.normalized.len()),
            self.normalized.as_str(),
        )
    }
}

/// Precedence order: exact patterns, then wildcards by longer literal
/// prefix, then `*`. Remaining ties: longer pattern first, then lexical.
impl Ord for Pattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key()
            .cmp(&other.rank_key())
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for Pattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
