use serde_json::{Map, Value};

use super::{FieldContext, FieldResult};
use crate::error::{kind_name, FieldError};
use crate::parser::finders::find_first_by_key_names;
use crate::parser::tree::Kind;
use crate::record::{clean_text, Field};

const SELLER_KEYS: &[&str] = &["sellerInfos", "sellerInfo", "seller"];
const NAME_KEYS: &[&str] = &["sellerName", "name", "title", "label", "companyName"];

fn seller_info(root: &Value) -> Option<&Map<String, Value>> {
    find_first_by_key_names(root, SELLER_KEYS, &[Kind::Mapping]).and_then(Value::as_object)
}

fn text_at(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str).and_then(clean_text))
}

pub fn agency_name(root: &Value) -> FieldResult<String> {
    Ok(seller_info(root).and_then(|info| text_at(info, NAME_KEYS)))
}

/// street, "zip city" (or city alone), country unless it is the default one.
pub fn address(root: &Value, ctx: &FieldContext) -> FieldResult<String> {
    let Some(info) = seller_info(root) else {
        return Ok(None);
    };
    let location = match info.get("address").or_else(|| info.get("location")) {
        None | Some(Value::Null) => info,
        Some(Value::Object(inner)) => inner,
        Some(Value::String(s)) => return Ok(clean_text(s)),
        Some(other) => {
            return Err(FieldError::Shape {
                field: Field::Address,
                path: "seller.address".to_string(),
                expected: "mapping or text",
                found: kind_name(other),
            })
        }
    };

    let mut parts = Vec::new();
    if let Some(street) = text_at(location, &["street1", "street"]) {
        parts.push(street);
    }
    let zip = text_at(location, &["zipCode", "zipcode", "postalCode"]);
    let city = text_at(location, &["city"]);
    match (zip, city) {
        (Some(zip), Some(city)) => parts.push(format!("{zip} {city}")),
        (None, Some(city)) => parts.push(city),
        _ => {}
    }
    if let Some(country) = text_at(location, &["country"]) {
        if !country.eq_ignore_ascii_case(ctx.default_country) {
            parts.push(country);
        }
    }

    Ok((!parts.is_empty()).then(|| parts.join(", ")))
}

// ── Tests ──
