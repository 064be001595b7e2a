use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::FieldResult;
use crate::error::FieldError;
use crate::parser::finders::find_first_by_key_names;
use crate::parser::tree::{mappings, walk, Kind};
use crate::record::Field;

const PRICE_KEYS: &[&str] = &["price", "amount", "sellingPrice", "totalPrice", "priceRaw"];
const PRICE_SUB_KEYS: &[&str] = &["amount", "value", "price"];
const MILEAGE_KEYS: &[&str] = &[
    "mileageInKm",
    "mileage",
    "kilometrage",
    "kilometers",
    "km",
    "kilometrageInKm",
];
const MILEAGE_SUBSTRINGS: &[&str] = &["mileage", "kilomet"];

/// Minimum digit count for a currency-marked string to count as a price.
const MIN_CURRENCY_DIGITS: usize = 3;

static CENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,]\d{1,2}\s*(?:€|EUR|eur)?\s*$").unwrap());

/// Digits of `text` as an integer, ignoring a trailing cents part.
pub fn digits_value(text: &str) -> Option<i64> {
    let whole = CENTS_RE.replace(text.trim(), "");
    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn number_value(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn price_from(v: &Value) -> Option<i64> {
    let p = match v {
        Value::Number(_) => number_value(v),
        Value::String(s) => digits_value(s),
        Value::Object(map) => PRICE_SUB_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|sub| match sub {
                Value::Number(_) => number_value(sub),
                Value::String(s) => digits_value(s),
                _ => None,
            }),
        _ => None,
    };
    p.filter(|n| *n > 0)
}

pub fn price(root: &Value) -> FieldResult<i64> {
    let exact = find_first_by_key_names(root, PRICE_KEYS, &[Kind::Number, Kind::Text, Kind::Mapping]);
    if let Some(p) = exact.and_then(price_from) {
        return Ok(Some(p));
    }

    let by_substring = mappings(root).find_map(|map| {
        map.iter()
            .filter(|(k, v)| k.to_lowercase().contains("price") && (v.is_number() || v.is_string()))
            .find_map(|(_, v)| price_from(v))
    });
    if by_substring.is_some() {
        return Ok(by_substring);
    }

    if let Some(p) = currency_scan(root) {
        return Ok(Some(p));
    }

    match exact {
        Some(v) => Err(FieldError::Invalid {
            field: Field::PriceEur,
            raw: v.to_string(),
        }),
        None => Ok(None),
    }
}

/// Any text node carrying a currency marker and enough digits.
fn currency_scan(root: &Value) -> Option<i64> {
    walk(root)
        .flat_map(|node| node.scalars())
        .filter_map(Value::as_str)
        .filter(|s| s.contains('€') || s.to_uppercase().contains("EUR"))
        .find_map(|s| {
            let whole = CENTS_RE.replace(s.trim(), "");
            let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
            if digits.len() >= MIN_CURRENCY_DIGITS {
                digits.parse().ok()
            } else {
                None
            }
        })
}

pub fn mileage(root: &Value) -> FieldResult<i64> {
    let mut rejected: Option<String> = None;

    for key in MILEAGE_KEYS {
        let Some(v) = find_first_by_key_names(root, &[key], &[Kind::Number, Kind::Text]) else {
            continue;
        };
        let km = match v {
            Value::Number(_) => number_value(v),
            Value::String(s) => digits_value(s),
            _ => None,
        };
        match km {
            Some(n) if n > 0 => return Ok(Some(n)),
            _ => {
                rejected.get_or_insert_with(|| v.to_string());
            }
        }
    }

    let by_substring = mappings(root).find_map(|map| {
        map.iter()
            .filter(|(k, _)| {
                let k = k.to_lowercase();
                MILEAGE_SUBSTRINGS.iter().any(|s| k.contains(s))
            })
            .find_map(|(_, v)| match v {
                Value::Number(_) => number_value(v),
                Value::String(s) => digits_value(s),
                _ => None,
            })
            .filter(|n| *n > 0)
    });
    if by_substring.is_some() {
        return Ok(by_substring);
    }

    match rejected {
        Some(raw) => Err(FieldError::Invalid {
            field: Field::MileageKm,
            raw,
        }),
        None => Ok(None),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_price() {
        assert_eq!(price(&json!({"ad": {"price": 15990}})).unwrap(), Some(15990));
        assert_eq!(price(&json!({"price": 15990.0})).unwrap(), Some(15990));
    }

    #[test]
    fn text_price_strips_currency_and_separators() {
        assert_eq!(price(&json!({"price": "15 990 €"})).unwrap(), Some(15990));
        assert_eq!(price(&json!({"sellingPrice": "12.990,00 EUR"})).unwrap(), Some(12990));
    }

    #[test]
    fn price_mapping_recurses_into_amount() {
        let tree = json!({"price": {"currency": "EUR", "amount": "21500"}});
        assert_eq!(price(&tree).unwrap(), Some(21500));
    }

    #[test]
    fn price_by_key_substring() {
        let tree = json!({"customerPriceTtc": 8750});
        assert_eq!(price(&tree).unwrap(), Some(8750));
    }

    #[test]
    fn price_from_currency_text_scan() {
        let tree = json!({"blocks": [{"text": "Prix : 7 490 €"}]});
        assert_eq!(price(&tree).unwrap(), Some(7490));
        let too_short = json!({"blocks": ["12 €"]});
        assert_eq!(price(&too_short).unwrap(), None);
    }

    #[test]
    fn unusable_price_is_an_error_not_absence() {
        let tree = json!({"price": "sur demande"});
        assert!(matches!(price(&tree), Err(FieldError::Invalid { .. })));
        assert_eq!(price(&json!({"title": "x"})).unwrap(), None);
    }

    #[test]
    fn mileage_key_priority_and_positivity() {
        let tree = json!({"mileage": 0, "km": "42 000 km"});
        assert_eq!(mileage(&tree).unwrap(), Some(42000));
        let tree = json!({"mileageInKm": 1200, "mileage": 99});
        assert_eq!(mileage(&tree).unwrap(), Some(1200));
    }

    #[test]
    fn non_positive_mileage_is_rejected() {
        assert!(mileage(&json!({"mileage": -5})).is_err());
        assert_eq!(mileage(&json!({"other": 1})).unwrap(), None);
    }
}
