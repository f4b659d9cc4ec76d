//! Page-shape normalization for collaborator listings.
//!
//! Backends disagree on how a paginated listing is spelled (`items` vs
//! `data`, `perPage` vs `per_page`, ...). Everything is funnelled through
//! [`normalize_page`] so the workflow core only ever sees [`Page`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::storage_traits::Page;

const ITEM_KEYS: &[&str] = &["items", "data", "results", "records"];
const TOTAL_KEYS: &[&str] = &["total", "totalItems", "total_items", "count"];
const PAGE_KEYS: &[&str] = &["page", "currentPage", "current_page"];
const PER_PAGE_KEYS: &[&str] = &["perPage", "per_page", "limit", "pageSize"];
const TOTAL_PAGES_KEYS: &[&str] = &["totalPages", "total_pages", "pages"];

/// Normalize an arbitrary listing payload into a [`Page`].
///
/// A bare JSON array is accepted as a single page. A payload with no items
/// array anywhere is an empty page, not an error. Items that fail to
/// deserialize are skipped with a warning.
pub fn normalize_page<T: DeserializeOwned>(value: Value) -> Page<T> {
    let (raw_items, meta) = match value {
        Value::Array(items) => (Some(items), None),
        Value::Object(mut map) => {
            let items = ITEM_KEYS.iter().find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            });
            (items, Some(Value::Object(map)))
        }
        _ => (None, None),
    };

    let meta = meta.unwrap_or(Value::Null);
    let page = read_u32(&meta, PAGE_KEYS).unwrap_or(1).max(1);

    let Some(raw_items) = raw_items else {
        let per_page = read_u32(&meta, PER_PAGE_KEYS).unwrap_or(0);
        return Page::empty(page, per_page);
    };

    let raw_len = raw_items.len();
    let items: Vec<T> = raw_items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(index = idx, error = %e, "skipping unparseable listing item");
                None
            }
        })
        .collect();

    let per_page = read_u32(&meta, PER_PAGE_KEYS)
        .unwrap_or_else(|| u32::try_from(raw_len).unwrap_or(u32::MAX));
    let total = read_u64(&meta, TOTAL_KEYS).unwrap_or(raw_len as u64);
    let total_pages = read_u32(&meta, TOTAL_PAGES_KEYS).unwrap_or_else(|| {
        if per_page == 0 {
            0
        } else {
            u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
        }
    });

    Page {
        items,
        total,
        page,
        per_page,
        total_pages,
    }
}

/// First key that holds a non-negative integer (numbers or numeric strings).
fn read_u64(meta: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match meta.get(*k)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Like [`read_u64`], but values that do not fit a `u32` count as absent.
fn read_u32(meta: &Value, keys: &[&str]) -> Option<u32> {
    read_u64(meta, keys).and_then(|v| u32::try_from(v).ok())
}
