use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use regex::Regex;
use serde_json::Value;

use super::FieldResult;
use crate::parser::tree::mappings;

const PHONE_KEY_PARTS: &[&str] = &["phone", "tel", "telephone", "call"];
/// Keys whose values are only phone candidates when they decode as base64.
const OPAQUE_KEYS: &[&str] = &["value", "number", "contact", "di_vn"];

/// Minimum digits for a candidate without a formatted run.
const MIN_PHONE_DIGITS: usize = 8;

static BASE64_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/=]+$").unwrap());
static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\-.\s()]{7,}").unwrap());
static NON_PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d+]").unwrap());

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode `value` as base64 if it uses only the base64 alphabet and the
/// result is printable ASCII. Padding is normalised to a multiple of four.
pub fn decode_base64_text(value: &str) -> Option<String> {
    let s = value.trim();
    if !BASE64_RE.is_match(s) {
        return None;
    }
    let mut padded = s.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let bytes = LENIENT.decode(padded.as_bytes()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let text = text.trim();
    let readable = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace());
    readable.then(|| text.to_string())
}

/// Keep digits and a leading `+`.
pub fn strip_separators(raw: &str) -> String {
    let kept = NON_PHONE_RE.replace_all(raw, "");
    match kept.strip_prefix('+') {
        Some(rest) => format!("+{}", rest.replace('+', "")),
        None => kept.replace('+', ""),
    }
}

/// First phone number among ordered candidates: a formatted digit run wins,
/// then any candidate with enough digits once separators are gone.
pub fn normalize_candidates<'a>(candidates: impl IntoIterator<Item = &'a str> + Clone) -> Option<String> {
    let formatted = candidates.clone().into_iter().find_map(|c| {
        DIGIT_RUN_RE
            .find(c)
            .map(|m| strip_separators(m.as_str()))
            .filter(|p| p.trim_start_matches('+').len() >= MIN_PHONE_DIGITS)
    });
    formatted.or_else(|| {
        candidates.into_iter().find_map(|c| {
            let p = strip_separators(c);
            (p.trim_start_matches('+').len() >= MIN_PHONE_DIGITS).then_some(p)
        })
    })
}

pub fn normalize(raw: &str) -> Option<String> {
    normalize_candidates([raw])
}

fn push_candidates(out: &mut Vec<String>, raw: &str, opaque: bool) {
    if let Some(decoded) = decode_base64_text(raw) {
        out.push(decoded);
    }
    if !opaque {
        out.push(raw.to_string());
    }
}

pub fn phone(root: &Value) -> FieldResult<String> {
    let mut candidates: Vec<String> = Vec::new();
    for map in mappings(root) {
        for (k, v) in map {
            let Value::String(s) = v else { continue };
            let key = k.to_lowercase();
            if PHONE_KEY_PARTS.iter().any(|p| key.contains(p)) {
                push_candidates(&mut candidates, s, false);
            } else if OPAQUE_KEYS.contains(&key.as_str()) {
                push_candidates(&mut candidates, s, true);
            }
        }
    }
    Ok(normalize_candidates(candidates.iter().map(String::as_str)))
}

// ── Tests ──
