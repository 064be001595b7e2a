use serde_json::{Map, Value};

use super::{FieldContext, FieldResult};
use crate::parser::finders::{
    find_all_list_items_by_key_contains, find_first_string_by_key_contains, item_label, OrderedSet,
};
use crate::parser::tree::mappings;

const EQUIPMENT_KEYS: &[&str] = &["equipment", "equipements", "option"];
const FEATURE_KEYS: &[&str] = &["strength", "feature"];
const WARRANTY_KEYS: &[&str] = &["warranty", "garantie", "guarantee"];
const GUARANTEE_KEYS: &[&str] = &["guarantee", "garantie", "insurance", "assurance"];

fn joined(items: Vec<String>, ctx: &FieldContext) -> Option<String> {
    (!items.is_empty()).then(|| items.join(ctx.delimiter))
}

/// Equipment lists come flat or grouped into categories carrying `items`;
/// for grouped entries the item labels are kept, not the category's.
pub fn equipment(root: &Value, ctx: &FieldContext) -> FieldResult<String> {
    let mut out = OrderedSet::default();
    for map in mappings(root) {
        for (k, v) in map {
            let key = k.to_lowercase();
            if !EQUIPMENT_KEYS.iter().any(|s| key.contains(s)) {
                continue;
            }
            match v {
                Value::Array(entries) => {
                    for entry in entries {
                        push_equipment_entry(&mut out, entry);
                    }
                }
                Value::String(s) => out.push(s),
                _ => {}
            }
        }
    }
    Ok(joined(out.into_vec(), ctx))
}

fn push_equipment_entry(out: &mut OrderedSet, entry: &Value) {
    match entry {
        Value::String(s) => out.push(s),
        Value::Object(obj) => match obj.get("items") {
            Some(Value::Array(items)) => {
                for item in items {
                    push_equipment_entry(out, item);
                }
            }
            _ => {
                if let Some(label) = item_label(obj) {
                    out.push(label);
                }
            }
        },
        _ => {}
    }
}

/// `label: value` when both are present, else the label alone.
fn feature_line(obj: &Map<String, Value>) -> Option<String> {
    let label = item_label(obj)?.trim();
    if label.is_empty() {
        return None;
    }
    match obj.get("value").and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Some(format!("{label}: {value}")),
        _ => Some(label.to_string()),
    }
}

pub fn features(root: &Value, ctx: &FieldContext) -> FieldResult<String> {
    let mut out = OrderedSet::default();
    for map in mappings(root) {
        for (k, v) in map {
            let key = k.to_lowercase();
            if !FEATURE_KEYS.iter().any(|s| key.contains(s)) {
                continue;
            }
            match v {
                Value::Array(items) => {
                    for item in items {
                        match item {
                            Value::String(s) => out.push(s),
                            Value::Object(obj) => {
                                if let Some(line) = feature_line(obj) {
                                    out.push(&line);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Value::String(s) => {
                    for line in clean_feature_lines(s) {
                        out.push(&line);
                    }
                }
                _ => {}
            }
        }
    }
    Ok(joined(out.into_vec(), ctx))
}

/// Collapse whitespace per line and drop lines that are script residue.
pub fn clean_feature_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .filter(|l| !(l.starts_with("var ") || l.ends_with("};") || l.ends_with("}}")))
        .collect()
}

fn aggregate_or_first(root: &Value, keys: &[&str], ctx: &FieldContext) -> Option<String> {
    joined(find_all_list_items_by_key_contains(root, keys), ctx).or_else(|| {
        find_first_string_by_key_contains(root, keys)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

pub fn warranty(root: &Value, ctx: &FieldContext) -> Option<String> {
    aggregate_or_first(root, WARRANTY_KEYS, ctx)
}

pub fn guarantees(root: &Value, ctx: &FieldContext) -> Option<String> {
    aggregate_or_first(root, GUARANTEE_KEYS, ctx)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FieldContext<'static> {
        FieldContext {
            delimiter: " | ",
            default_country: "FRANCE",
        }
    }

    #[test]
    fn grouped_equipment_keeps_item_labels() {
        let tree = json!({"vehicle": {"equipments": [
            {"label": "Confort", "items": [{"label": "Climatisation"}, {"label": "GPS"}]},
            {"label": "Sécurité", "items": [{"label": "ABS"}, {"label": "GPS"}]}
        ]}});
        assert_eq!(
            equipment(&tree, &ctx()).unwrap().as_deref(),
            Some("Climatisation | GPS | ABS")
        );
    }

    #[test]
    fn flat_equipment_and_options() {
        let tree = json!({"equipment": ["Radar de recul", " "], "options": [{"name": "Toit ouvrant"}]});
        assert_eq!(
            equipment(&tree, &ctx()).unwrap().as_deref(),
            Some("Radar de recul | Toit ouvrant")
        );
        assert_eq!(equipment(&json!({"x": 1}), &ctx()).unwrap(), None);
    }

    #[test]
    fn features_pair_label_and_value() {
        let tree = json!({"data": {"strengths": [
            {"label": "Première main", "value": ""},
            {"label": "Garantie", "value": "12 mois"},
            "Faible kilométrage"
        ]}});
        assert_eq!(
            features(&tree, &ctx()).unwrap().as_deref(),
            Some("Première main | Garantie: 12 mois | Faible kilométrage")
        );
    }

    #[test]
    fn script_residue_is_dropped_from_features() {
        let lines = clean_feature_lines("Crit'Air 1\n  var x = {a: 1};\n\nCarnet   d'entretien\n{\"a\":{}}");
        assert_eq!(lines, vec!["Crit'Air 1", "Carnet d'entretien"]);
    }

    #[test]
    fn warranty_and_guarantees() {
        let tree = json!({"warranty": "Garantie constructeur 24 mois", "insurance": ["Assurance panne"]});
        assert_eq!(warranty(&tree, &ctx()).as_deref(), Some("Garantie constructeur 24 mois"));
        assert_eq!(guarantees(&tree, &ctx()).as_deref(), Some("Assurance panne"));
        assert_eq!(warranty(&json!({}), &ctx()), None);
    }
}
