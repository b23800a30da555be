// SPDX-License-Identifier: MIT

//! Opaque cursor pagination: encodes the sort key of the last row on a
//! page so the next page can resume without re-scanning, and without
//! exposing row offsets that would shift under concurrent writes.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CursorPayload {
    priority: i64,
    created_at_epoch_ms: u64,
    id: String,
}

/// Encode the sort key of the last row returned on a page.
pub fn encode(priority: i64, created_at_epoch_ms: u64, id: &str) -> String {
    let payload = CursorPayload { priority, created_at_epoch_ms, id: id.to_string() };
    let json = serde_json::to_vec(&payload).expect("cursor payload is always serializable");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor payload is malformed")]
    Payload,
}

pub fn decode(cursor: &str) -> Result<(i64, u64, String), CursorError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(cursor).map_err(|_| CursorError::Encoding)?;
    let payload: CursorPayload = serde_json::from_slice(&bytes).map_err(|_| CursorError::Payload)?;
    Ok((payload.priority, payload.created_at_epoch_ms, payload.id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// `priority DESC, createdAt ASC` — used for scheduling queries.
    SchedulingOrder,
    /// `priority DESC, createdAt DESC` — used for user-facing listings.
    UserListingOrder,
}

/// Sort `rows` (by the given key extractor) per `order`, tie-broken by id
/// for a total order so pagination never skips or duplicates a row.
pub fn sort_rows<T>(rows: &mut [T], order: SortOrder, key: impl Fn(&T) -> (i64, u64, String)) {
    rows.sort_by(|a, b| {
        let (pa, ca, ia) = key(a);
        let (pb, cb, ib) = key(b);
        pb.cmp(&pa).then_with(|| match order {
            SortOrder::SchedulingOrder => ca.cmp(&cb),
            SortOrder::UserListingOrder => cb.cmp(&ca),
        }).then_with(|| ia.cmp(&ib))
    });
}

/// Drop every row at or before `cursor`'s key under `order`'s comparator.
pub fn skip_to_cursor<T>(
    rows: Vec<T>,
    order: SortOrder,
    cursor: Option<&str>,
    key: impl Fn(&T) -> (i64, u64, String),
) -> Result<Vec<T>, CursorError> {
    let Some(cursor) = cursor else { return Ok(rows) };
    let (cp, cc, cid) = decode(cursor)?;
    Ok(rows
        .into_iter()
        .filter(|row| {
            let (p, c, id) = key(row);
            let ordering = cp.cmp(&p).then_with(|| match order {
                SortOrder::SchedulingOrder => cc.cmp(&c),
                SortOrder::UserListingOrder => c.cmp(&cc),
            }).then_with(|| cid.cmp(&id));
            ordering == std::cmp::Ordering::Less
        })
        .collect())
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod tests;
