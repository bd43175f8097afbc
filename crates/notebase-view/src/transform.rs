//! Read-only presentation transforms applied to resolved items.
//!
//! Nothing here touches storage: every function works on an in-memory
//! snapshot and only reorders items or adds transient values to it.

use serde_json::{json, Value};

use notebase_core::{Database, Item, PropertyValue, View, ViewType};

/// Textual label of a grouping value.
///
/// Strings are their own label; objects use their `name`, then `label`
/// string. Anything else, including a missing value, is the empty label.
pub fn group_label(value: Option<&Value>) -> &str {
    match value {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| map.get("label").and_then(Value::as_str))
            .unwrap_or(""),
        _ => "",
    }
}

/// Stable sort by the label of one property; equal labels keep their order.
pub fn sort_by_group_label(items: &mut [Item], slug: &str) {
    items.sort_by(|a, b| {
        let left = group_label(a.properties.get(slug).map(|v| &v.value));
        let right = group_label(b.properties.get(slug).map(|v| &v.value));
        left.cmp(right)
    });
}

/// Placeholder shown for a missing gallery cover.
pub fn cover_placeholder() -> Value {
    json!({ "name": "" })
}

/// Give every item without a value for `slug` a transient placeholder.
pub fn pad_cover_values(items: &mut [Item], slug: &str, property_id: &str) {
    for item in items.iter_mut() {
        if item.properties.contains_key(slug) {
            continue;
        }
        let placeholder = PropertyValue::transient(&item.id, property_id, cover_placeholder());
        item.properties.insert(slug.to_string(), placeholder);
    }
}

/// Apply the transform for a view's type.
///
/// References that do not resolve to a property of `database` leave the
/// items untouched.
pub fn apply_view_transform(database: &Database, view: &View, items: &mut [Item]) {
    match view.view_type {
        ViewType::Board => {
            if let Some(property) = view.grouping_property().and_then(|r| database.property(r)) {
                sort_by_group_label(items, &property.slug);
            }
        }
        ViewType::Gallery => {
            if let Some(property) = view.cover_property().and_then(|r| database.property(r)) {
                pad_cover_values(items, &property.slug, &property.id);
            }
        }
        ViewType::Table | ViewType::List | ViewType::Calendar | ViewType::Timeline => {}
    }
}
