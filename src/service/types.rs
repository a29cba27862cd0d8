// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};

use crate::country::CountryId;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Id of the last item, present only when `has_more`.
    pub next_cursor: Option<CountryId>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Resolve a requested limit: absent or non-positive means `default`,
/// anything above `max` is clamped.
#[must_use]
pub fn effective_page_size(requested: Option<i64>, default: usize, max: usize) -> usize {
    let max = max.max(1);
    match requested {
        Some(n) if n > 0 => usize::try_from(n).map_or(max, |n| n.min(max)),
        _ => default.clamp(1, max),
    }
}

/// Parse a client cursor. Anything that is not an id means "no cursor".
#[must_use]
pub fn parse_cursor(cursor: Option<&str>) -> Option<CountryId> {
    cursor.and_then(|c| CountryId::parse_str(c.trim()).ok())
}

/// Trim a `size + 1` lookahead read down to one page.
pub fn page_from_lookahead<T>(mut rows: Vec<T>, size: usize, id_of: impl Fn(&T) -> CountryId) -> Page<T> {
    if rows.len() > size {
        rows.truncate(size);
        let next_cursor = rows.last().map(id_of);
        Page { items: rows, next_cursor, has_more: true }
    } else {
        Page { items: rows, next_cursor: None, has_more: false }
    }
}
