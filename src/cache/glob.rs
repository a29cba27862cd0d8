// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-compatible glob matching for the in-memory cache.
//!
//! Supports `*`, `?`, `[abc]`, `[a-z]`, `[^abc]` and `\` escapes, the same
//! subset `KEYS`/`SCAN MATCH` understand. Patterns are translated to an
//! anchored regex once and reused for every key.

use regex_lite::Regex;

use super::CacheError;

/// Compile a Redis-style glob into an anchored regex.
pub fn compile(pattern: &str) -> Result<Regex, CacheError> {
    Regex::new(&to_regex(pattern)).map_err(|e| CacheError::InvalidPattern(format!("{pattern}: {e}")))
}

/// Match `text` against a Redis-style glob `pattern`.
///
/// A pattern that fails to compile matches nothing.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    compile(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

fn to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                push_literal(&mut regex, chars[i]);
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut regex, &chars[i + 1..end]);
                    i = end;
                }
                // Unterminated class is a literal '['
                None => push_literal(&mut regex, '['),
            },
            c => push_literal(&mut regex, c),
        }
        i += 1;
    }

    regex.push('$');
    regex
}

/// Index of the `]` closing the class opened at `start`, skipping escapes.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn push_class(regex: &mut String, body: &[char]) {
    let (negate, body) = match body.split_first() {
        Some((&'^', rest)) => (true, rest),
        _ => (false, body),
    };

    let mut items = String::new();
    let mut i = 0;
    while i < body.len() {
        let mut lo = body[i];
        if lo == '\\' && i + 1 < body.len() {
            i += 1;
            lo = body[i];
        }
        if i + 2 < body.len() && body[i + 1] == '-' {
            let hi = body[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            items.push_str(&regex_lite::escape(&lo.to_string()));
            items.push('-');
            items.push_str(&regex_lite::escape(&hi.to_string()));
            i += 3;
        } else {
            items.push_str(&regex_lite::escape(&lo.to_string()));
            i += 1;
        }
    }

    match (items.is_empty(), negate) {
        (true, false) => regex.push_str(r"[^\s\S]"),
        (true, true) => regex.push('.'),
        (false, false) => regex.push_str(&format!("[{items}]")),
        (false, true) => regex.push_str(&format!("[^{items}]")),
    }
}

fn push_literal(regex: &mut String, c: char) {
    regex.push_str(&regex_lite::escape(&c.to_string()));
}
