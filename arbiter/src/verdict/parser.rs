//! Strict parser for judge verdict lines.
//!
//! Grammar:
//!
//! ```text
//! line    := "SQL #" <int> ":" item ("," item)*
//! item    := "OK" | "KO" [ ("-" | ":") reason ]
//! ```
//!
//! Reasons may contain commas; a comma only starts a new item when the text
//! after it begins with `OK` or `KO`. Lines that do not start with `SQL #` are
//! treated as noise. Lines that do but break the grammar come back as
//! [`LineParse::Malformed`] and never abort parsing of the remaining lines.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::Verdict;

/// Reason recorded for a `KO` without explanation.
pub const UNSPECIFIED_REASON: &str = "no reason given";

static LINE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sql\s*#\s*(\d+)\s*:(.*)$").unwrap());

static LINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^sql\s*#").unwrap());

/// Why a `SQL #` line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    #[error("missing candidate number or colon in '{line}'")]
    BadHeader { line: String },

    #[error("candidate number out of range in '{line}'")]
    BadNumber { line: String },

    #[error("no verdicts after header in '{line}'")]
    Empty { line: String },

    #[error("unrecognized verdict item '{item}' in '{line}'")]
    BadItem { line: String, item: String },
}

/// Result of parsing one line of judge output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineParse {
    Verdicts {
        candidate: usize,
        verdicts: Vec<Verdict>,
    },
    Malformed(ParseError),
    Noise,
}

/// Everything recovered from one judge response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// `(candidate number as written, verdicts)` in response order.
    pub rows: Vec<(usize, Vec<Verdict>)>,
    pub errors: Vec<ParseError>,
}

impl ParsedResponse {
    /// First well-formed row, if any.
    pub fn first_row(&self) -> Option<&[Verdict]> {
        self.rows.first().map(|(_, v)| v.as_slice())
    }
}

pub fn parse_line(raw: &str) -> LineParse {
    let line = raw
        .trim()
        .trim_start_matches(|c: char| c == '*' || c == '`' || c == '>')
        .trim();
    if !LINE_PREFIX.is_match(line) {
        return LineParse::Noise;
    }

    let Some(caps) = LINE_HEADER.captures(line) else {
        return LineParse::Malformed(ParseError::BadHeader {
            line: line.to_string(),
        });
    };
    let Ok(candidate) = caps[1].parse::<usize>() else {
        return LineParse::Malformed(ParseError::BadNumber {
            line: line.to_string(),
        });
    };
    let body = caps[2]
        .trim()
        .trim_matches(|c: char| c == '*' || c == '`')
        .trim();
    if body.is_empty() {
        return LineParse::Malformed(ParseError::Empty {
            line: line.to_string(),
        });
    }

    let mut verdicts = Vec::new();
    for item in split_items(body) {
        match parse_item(item) {
            Some(v) => verdicts.push(v),
            None => {
                return LineParse::Malformed(ParseError::BadItem {
                    line: line.to_string(),
                    item: item.trim().to_string(),
                })
            }
        }
    }
    LineParse::Verdicts {
        candidate,
        verdicts,
    }
}

/// Parse a whole judge response, logging and collecting malformed lines.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    for line in text.lines() {
        match parse_line(line) {
            LineParse::Verdicts {
                candidate,
                verdicts,
            } => parsed.rows.push((candidate, verdicts)),
            LineParse::Malformed(err) => {
                warn!(error = %err, "dropping malformed verdict line");
                parsed.errors.push(err);
            }
            LineParse::Noise => {}
        }
    }
    parsed
}

/// Split on commas that are followed by an `OK`/`KO` marker.
fn split_items(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    for (pos, c) in body.char_indices() {
        if c == ',' && marker(&body[pos + 1..]).is_some() {
            items.push(&body[start..pos]);
            start = pos + 1;
        }
    }
    items.push(&body[start..]);
    items
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Ok,
    Ko,
}

/// The marker at the start of `text` and the remainder after it.
fn marker(text: &str) -> Option<(Marker, &str)> {
    let text = text.trim_start();
    let head = text.get(..2)?;
    let m = if head.eq_ignore_ascii_case("ok") {
        Marker::Ok
    } else if head.eq_ignore_ascii_case("ko") {
        Marker::Ko
    } else {
        return None;
    };
    let rest = &text[2..];
    // "OKAY" or "KOALA" are not markers.
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some((m, rest)),
    }
}

fn parse_item(item: &str) -> Option<Verdict> {
    let (m, rest) = marker(item)?;
    let rest = rest.trim();
    match m {
        Marker::Ok if rest.is_empty() => Some(Verdict::Pass),
        Marker::Ok => None,
        Marker::Ko if rest.is_empty() => Some(Verdict::fail(UNSPECIFIED_REASON)),
        Marker::Ko => {
            let reason = rest.strip_prefix(['-', ':'])?.trim();
            if reason.is_empty() {
                Some(Verdict::fail(UNSPECIFIED_REASON))
            } else {
                Some(Verdict::fail(reason))
            }
        }
    }
}
