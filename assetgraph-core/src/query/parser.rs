//! Selector Parser
//!
//! Turns a selector string into a list of clauses.
//!
//! # Grammar
//!
//! ```text
//! query      := clause (separator clause)*       separator: ',' or whitespace
//! clause     := upstream? target downstream?
//! upstream   := '*' | '+'+
//! downstream := '+'+ | '*'
//! target     := '*' | pattern | attribute
//! pattern    := [A-Za-z0-9_./\-\[\]]+ with interior '*' wildcards
//! attribute  := ('kind' | 'owner' | 'group' | 'job') ':' value
//!             | 'tag' ':' key ('=' value)?
//! ```
//!
//! Each `+` adds one layer of traversal; `*` is unbounded. A blank query
//! has no clauses and selects everything in scope.

use serde::{Deserialize, Serialize};

use crate::error::QuerySyntaxError;

/// How far a clause extends in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Depth {
    /// Follow at most this many edges.
    Layers(usize),
    /// Follow edges until exhausted.
    Unbounded,
}

impl Depth {
    /// Hop limit for traversal, `None` for unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            Depth::Layers(n) => Some(n),
            Depth::Unbounded => None,
        }
    }
}

/// Attribute predicates usable in place of a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Kind(String),
    Owner(String),
    Group(String),
    Job(String),
    Tag { key: String, value: Option<String> },
}

/// What a clause starts from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Every node.
    All,
    /// A single token, matched exactly.
    Token(String),
    /// A token pattern with `*` wildcards.
    Pattern(String),
    /// Nodes whose metadata matches.
    Attribute(Attribute),
}

/// One comma/whitespace separated part of a selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clause {
    pub upstream: Option<Depth>,
    pub target: Target,
    pub downstream: Option<Depth>,
}

/// A parsed selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionQuery {
    clauses: Vec<Clause>,
}

impl SelectionQuery {
    /// Parse a selector string.
    pub fn parse(query: &str) -> Result<Self, QuerySyntaxError> {
        let clauses = fragments(query)
            .map(|(position, fragment)| parse_clause(fragment, position))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { clauses })
    }

    /// A query with no clauses matches every node in scope.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

impl std::str::FromStr for SelectionQuery {
    type Err = QuerySyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split on separators, yielding each non-empty fragment with its offset.
fn fragments(query: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut start = None;
    let mut out = Vec::new();

    for (i, c) in query.char_indices() {
        let separator = c == ',' || c.is_whitespace();
        match (separator, start) {
            (true, Some(s)) => {
                out.push((s, &query[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &query[s..]));
    }

    out.into_iter()
}

fn parse_clause(fragment: &str, position: usize) -> Result<Clause, QuerySyntaxError> {
    if fragment == "*" {
        return Ok(Clause {
            upstream: None,
            target: Target::All,
            downstream: None,
        });
    }

    let err = |reason: &str| QuerySyntaxError::new(fragment, position, reason);

    let (upstream, rest) = strip_leading(fragment).ok_or_else(|| err("mixed traversal operators"))?;
    let (body, downstream) = strip_trailing(rest).ok_or_else(|| err("mixed traversal operators"))?;

    if body.is_empty() {
        return Err(err("missing asset name"));
    }

    let target = match body.split_once(':') {
        Some((name, value)) => Target::Attribute(parse_attribute(name, value).map_err(err)?),
        None => parse_pattern(body).map_err(err)?,
    };

    Ok(Clause {
        upstream,
        target,
        downstream,
    })
}

/// Strip a leading `*` or run of `+`. `None` if the two are mixed.
fn strip_leading(s: &str) -> Option<(Option<Depth>, &str)> {
    if let Some(rest) = s.strip_prefix('*') {
        if rest.starts_with('+') {
            return None;
        }
        return Some((Some(Depth::Unbounded), rest));
    }

    let rest = s.trim_start_matches('+');
    let n = s.len() - rest.len();
    if n == 0 {
        return Some((None, s));
    }
    if rest.starts_with('*') {
        return None;
    }
    Some((Some(Depth::Layers(n)), rest))
}

/// Strip a trailing `*` or run of `+`. `None` if the two are mixed.
fn strip_trailing(s: &str) -> Option<(&str, Option<Depth>)> {
    if let Some(rest) = s.strip_suffix('*') {
        if rest.ends_with('+') {
            return None;
        }
        return Some((rest, Some(Depth::Unbounded)));
    }

    let rest = s.trim_end_matches('+');
    let n = s.len() - rest.len();
    if n == 0 {
        return Some((s, None));
    }
    if rest.ends_with('*') {
        return None;
    }
    Some((rest, Some(Depth::Layers(n))))
}

fn parse_attribute(name: &str, value: &str) -> Result<Attribute, &'static str> {
    if value.is_empty() {
        return Err("missing attribute value");
    }

    let attribute = match name {
        "kind" => Attribute::Kind(value.to_string()),
        "owner" => Attribute::Owner(value.to_string()),
        "group" => Attribute::Group(value.to_string()),
        "job" => Attribute::Job(value.to_string()),
        "tag" => match value.split_once('=') {
            Some((key, _)) if key.is_empty() => return Err("missing tag key"),
            Some((key, v)) => Attribute::Tag {
                key: key.to_string(),
                value: Some(v.to_string()),
            },
            None => Attribute::Tag {
                key: value.to_string(),
                value: None,
            },
        },
        _ => return Err("unknown attribute"),
    };

    Ok(attribute)
}

fn parse_pattern(body: &str) -> Result<Target, &'static str> {
    let valid = |c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-' | '[' | ']' | '*');
    if !body.chars().all(valid) {
        return Err("unexpected character");
    }

    if body.contains('*') {
        Ok(Target::Pattern(body.to_string()))
    } else {
        Ok(Target::Token(body.to_string()))
    }
}

/// Match `text` against a pattern where `*` stands for any run of
/// characters.
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
