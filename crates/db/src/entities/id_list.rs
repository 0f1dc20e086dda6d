//! Helpers for JSON arrays of user IDs (`seen_by`, `deleted_by`).
//!
//! The sets only grow; additions happen in SQL so concurrent writers never
//! drop each other's entries.

use sea_orm::prelude::Json;

/// Empty list.
#[must_use]
pub fn empty() -> Json {
    Json::Array(Vec::new())
}

/// List holding exactly `id`.
#[must_use]
pub fn single(id: &str) -> Json {
    Json::Array(vec![Json::String(id.to_string())])
}

/// IDs in the list. Non-string entries are ignored.
#[must_use]
pub fn ids(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
