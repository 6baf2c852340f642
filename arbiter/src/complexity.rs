//! Structural complexity score for SQL strings.
//!
//! Only used to break ties between candidates of equal quality; it never says
//! anything about correctness. The score is a sum of non-negative per-token
//! weights, so adding clauses, joins, predicates or subqueries never lowers it.
//! A string the scanner cannot tokenize (unterminated quote or comment,
//! unbalanced parentheses) scores its character length instead.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-construct weights.
const BASE_TOKEN: u64 = 1;
const JOIN: u64 = 5;
const SUBQUERY: u64 = 10;
const SET_OPERATION: u64 = 8;
const PREDICATE: u64 = 2;
const GROUPING: u64 = 3;
const ORDERING: u64 = 2;
const CASE_BRANCH: u64 = 4;
const FUNCTION_CALL: u64 = 2;
const DISTINCT: u64 = 2;
const WINDOW: u64 = 6;
const NESTING: u64 = 2;

/// Breakdown of one score, for logs and audit output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityBreakdown {
    pub tokens: u64,
    pub joins: u64,
    pub subqueries: u64,
    pub set_operations: u64,
    pub predicates: u64,
    pub grouping: u64,
    pub ordering: u64,
    pub case_branches: u64,
    pub function_calls: u64,
    pub distinct: u64,
    pub windows: u64,
    pub max_depth: u64,
    /// Set when the scanner failed and the score is the string length.
    pub fallback: bool,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LParen,
    RParen,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanError {
    UnterminatedQuote(char),
    UnterminatedComment,
    UnbalancedParens,
}

/// Deterministic structural scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityScorer;

impl ComplexityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score `sql`; never fails and is always non-negative.
    pub fn score(&self, sql: &str) -> u64 {
        self.breakdown(sql).score
    }

    pub fn breakdown(&self, sql: &str) -> ComplexityBreakdown {
        match scan(sql) {
            Ok(tokens) => weigh(&tokens),
            Err(err) => {
                debug!(error = ?err, "complexity scan failed; scoring by length");
                let len = sql.chars().count() as u64;
                ComplexityBreakdown {
                    fallback: true,
                    score: len,
                    ..Default::default()
                }
            }
        }
    }
}

fn scan(sql: &str) -> Result<Vec<Token>, ScanError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut depth: i64 = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                loop {
                    if i + 1 >= chars.len() {
                        return Err(ScanError::UnterminatedComment);
                    }
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            '\'' | '"' | '`' => {
                let quote = c;
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ScanError::UnterminatedQuote(quote)),
                        Some(&q) if q == quote => {
                            // Doubled quote is an escaped quote.
                            if chars.get(i + 1) == Some(&quote) {
                                i += 2;
                                continue;
                            }
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Token::Other);
            }
            '[' => {
                // Bracket-quoted identifier.
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ScanError::UnterminatedQuote('['));
                }
                i += 1;
                tokens.push(Token::Other);
            }
            '(' => {
                depth += 1;
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ScanError::UnbalancedParens);
                }
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Word(word.to_ascii_uppercase()));
            }
            _ => {
                tokens.push(Token::Other);
                i += 1;
            }
        }
    }

    if depth != 0 {
        return Err(ScanError::UnbalancedParens);
    }
    Ok(tokens)
}

fn weigh(tokens: &[Token]) -> ComplexityBreakdown {
    let mut b = ComplexityBreakdown {
        tokens: tokens.len() as u64,
        ..Default::default()
    };
    let mut depth: u64 = 0;
    let mut selects = 0u64;

    for (idx, token) in tokens.iter().enumerate() {
        let next = tokens.get(idx + 1);
        match token {
            Token::LParen => {
                depth += 1;
                b.max_depth = b.max_depth.max(depth);
            }
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w) => match w.as_str() {
                "SELECT" => selects += 1,
                "JOIN" => b.joins += 1,
                "UNION" | "INTERSECT" | "EXCEPT" => b.set_operations += 1,
                "WHERE" | "AND" | "OR" | "ON" | "HAVING" | "IN" | "EXISTS" | "BETWEEN"
                | "LIKE" => b.predicates += 1,
                "GROUP" => b.grouping += 1,
                "ORDER" => b.ordering += 1,
                "WHEN" => b.case_branches += 1,
                "DISTINCT" => b.distinct += 1,
                "OVER" => b.windows += 1,
                _ => {
                    if next == Some(&Token::LParen) {
                        b.function_calls += 1;
                    }
                }
            },
            Token::Other => {}
        }
    }
    b.subqueries = selects.saturating_sub(1);

    b.score = b.tokens * BASE_TOKEN
        + b.joins * JOIN
        + b.subqueries * SUBQUERY
        + b.set_operations * SET_OPERATION
        + b.predicates * PREDICATE
        + b.grouping * GROUPING
        + b.ordering * ORDERING
        + b.case_branches * CASE_BRANCH
        + b.function_calls * FUNCTION_CALL
        + b.distinct * DISTINCT
        + b.windows * WINDOW
        + b.max_depth * NESTING;
    b
}
