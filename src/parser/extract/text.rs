use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde_json::Value;

use super::FieldResult;
use crate::parser::finders::find_first_by_key_names;
use crate::parser::tree::{walk, Kind};

const TITLE_KEYS: &[&str] = &["title", "adTitle", "vehicleTitle", "name"];
const MIN_TITLE_CHARS: usize = 3;
const COMMENT_KEYS: &[&str] = &["description", "sellerComment", "comment"];
const COMMENT_BODY_KEYS: &[&str] = &["content", "text", "value"];

static TECH_SHEET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fiche[-_]?technique").unwrap());

/// Key names are tried one at a time so `title` anywhere beats `name`.
pub fn title(root: &Value) -> FieldResult<String> {
    Ok(TITLE_KEYS.iter().find_map(|key| {
        let v = find_first_by_key_names(root, &[key], &[Kind::Text])?.as_str()?.trim();
        (v.chars().count() >= MIN_TITLE_CHARS).then(|| v.to_string())
    }))
}

pub fn seller_comment(root: &Value) -> FieldResult<String> {
    let Some(found) = find_first_by_key_names(root, COMMENT_KEYS, &[Kind::Text, Kind::Mapping]) else {
        return Ok(None);
    };
    let body = match found {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => COMMENT_BODY_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    };
    Ok(body.and_then(html_to_text))
}

/// Text nodes of an HTML fragment, trimmed, one per line.
pub fn html_to_text(fragment: &str) -> Option<String> {
    let html = Html::parse_fragment(fragment);
    let lines: Vec<&str> = html
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

pub fn technical_sheet_url(root: &Value) -> Option<String> {
    walk(root)
        .flat_map(|node| node.scalars())
        .filter_map(Value::as_str)
        .find(|s| s.starts_with("http") && TECH_SHEET_RE.is_match(s))
        .map(str::to_string)
}

// ── Tests ──
