use std::collections::HashSet;

use serde_json::{Map, Value};

use super::tree::{mappings, Kind};

/// First value, in walk order, whose key case-insensitively equals one of
/// `names` and whose shape is in `allowed`.
pub fn find_first_by_key_names<'a>(
    root: &'a Value,
    names: &[&str],
    allowed: &[Kind],
) -> Option<&'a Value> {
    let names: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    mappings(root).find_map(|map| {
        map.iter().find_map(|(k, v)| {
            let kind = Kind::of(v)?;
            (allowed.contains(&kind) && names.contains(&k.to_lowercase())).then_some(v)
        })
    })
}

/// First text value whose key contains one of `substrings` (case-insensitive).
pub fn find_first_string_by_key_contains<'a>(root: &'a Value, substrings: &[&str]) -> Option<&'a str> {
    let subs = lowered(substrings);
    mappings(root).find_map(|map| {
        map.iter().find_map(|(k, v)| match v {
            Value::String(s) if key_contains(k, &subs) => Some(s.as_str()),
            _ => None,
        })
    })
}

/// Every list item reachable under a key containing one of `substrings`:
/// text items as-is, mapping items by their `label`/`name`/`title`, and text
/// values directly. Blank entries dropped; first-seen order, no duplicates.
pub fn find_all_list_items_by_key_contains(root: &Value, substrings: &[&str]) -> Vec<String> {
    let subs = lowered(substrings);
    let mut out = OrderedSet::default();
    for map in mappings(root) {
        for (k, v) in map {
            if !key_contains(k, &subs) {
                continue;
            }
            match v {
                Value::Array(items) => {
                    for item in items {
                        match item {
                            Value::String(s) => out.push(s),
                            Value::Object(obj) => {
                                if let Some(label) = item_label(obj) {
                                    out.push(label);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Value::String(s) => out.push(s),
                _ => {}
            }
        }
    }
    out.into_vec()
}

/// Strict descent: every segment must exist and every intermediate must be a
/// mapping. No searching.
pub fn find_first_dict_by_key_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Map<String, Value>> {
    value_at_path(root, path)?.as_object()
}

/// Strict descent returning whatever sits at the end of `path`.
pub fn value_at_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |cur, seg| cur.as_object()?.get(*seg))
}

pub fn item_label(obj: &Map<String, Value>) -> Option<&str> {
    ["label", "name", "title"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn lowered(subs: &[&str]) -> Vec<String> {
    subs.iter().map(|s| s.to_lowercase()).collect()
}

fn key_contains(key: &str, subs: &[String]) -> bool {
    let k = key.to_lowercase();
    subs.iter().any(|s| k.contains(s.as_str()))
}

/// Insertion-ordered set of trimmed, non-blank strings.
#[derive(Debug, Default)]
pub struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    pub fn push(&mut self, raw: &str) {
        let item = raw.trim();
        if item.is_empty() || self.seen.contains(item) {
            return;
        }
        self.seen.insert(item.to_string());
        self.items.push(item.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tree::SCALAR_OR_CONTAINER;
    use serde_json::json;

    #[test]
    fn key_names_are_case_insensitive_and_type_filtered() {
        let tree = json!({"meta": {"Price": "n/a"}, "ad": {"PRICE": 12000}});
        let any = find_first_by_key_names(&tree, &["price"], SCALAR_OR_CONTAINER);
        assert_eq!(any, Some(&json!("n/a")));
        let numeric = find_first_by_key_names(&tree, &["price"], &[Kind::Number]);
        assert_eq!(numeric, Some(&json!(12000)));
    }

    #[test]
    fn walk_order_decides_first_match() {
        let tree = json!({"outer": {"title": "deep"}, "title": "shallow"});
        // Root mapping is visited before its children.
        let v = find_first_by_key_names(&tree, &["title"], &[Kind::Text]);
        assert_eq!(v, Some(&json!("shallow")));
    }

    #[test]
    fn substring_match_only_returns_text() {
        let tree = json!({"sellerPhoneNumber": 612345678u64, "contact": {"mobilePhone": "06 12"}});
        assert_eq!(find_first_string_by_key_contains(&tree, &["PHONE"]), Some("06 12"));
    }

    #[test]
    fn list_items_are_deduplicated_in_first_seen_order() {
        let tree = json!({
            "equipments": ["GPS", {"label": "Clim"}, "  ", "GPS"],
            "nested": {"options": [{"name": "Toit ouvrant"}, {"title": "Clim"}, 3]},
            "optionText": "Attelage"
        });
        let items = find_all_list_items_by_key_contains(&tree, &["equipment", "option"]);
        assert_eq!(items, vec!["GPS", "Clim", "Attelage", "Toit ouvrant"]);
        let unique: HashSet<&String> = items.iter().collect();
        assert_eq!(unique.len(), items.len());
    }

    #[test]
    fn key_path_descent_is_strict() {
        let tree = json!({"classified": {"vehicle": {"combined": {"specs": {"gearbox": "AUTO"}}}}});
        let specs = find_first_dict_by_key_path(&tree, &["classified", "vehicle", "combined", "specs"]);
        assert_eq!(specs.and_then(|m| m.get("gearbox")), Some(&json!("AUTO")));
        assert!(find_first_dict_by_key_path(&tree, &["classified", "missing"]).is_none());
        assert!(find_first_dict_by_key_path(&tree, &["vehicle"]).is_none());
        let leaf = json!({"a": {"b": 3}});
        assert!(find_first_dict_by_key_path(&leaf, &["a", "b"]).is_none());
        assert!(find_first_dict_by_key_path(&leaf, &["a", "b", "c"]).is_none());
    }
}
