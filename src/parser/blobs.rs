use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::tree::DataTree;
use crate::error::BlobError;

/// Candidate terminators tried per declaration before giving up.
const MAX_SPANS: usize = 256;

static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());
static UNQUOTED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][\w$]*)\s*:"#).unwrap());

#[derive(Debug, Clone)]
pub struct NamedBlob {
    pub name: String,
    pub tree: DataTree,
}

/// Locate every requested blob, keeping the caller's priority order.
/// Missing or unparseable blobs are simply absent from the result.
pub fn locate_named(document: &str, names: &[String]) -> Vec<NamedBlob> {
    names
        .iter()
        .filter_map(|name| match locate(document, name) {
            Ok(tree) => Some(NamedBlob {
                name: name.clone(),
                tree,
            }),
            Err(BlobError::Missing { .. }) => {
                debug!(blob = %name, "blob absent");
                None
            }
            Err(e) => {
                warn!(blob = %name, error = %e, "blob parse failure; tier input dropped");
                None
            }
        })
        .collect()
}

/// Parse one `NAME = {...};` declaration. The literal runs from its opening
/// brace to the first `;` whose preceding span parses as an object.
pub fn locate(document: &str, name: &str) -> Result<DataTree, BlobError> {
    let anchor = Regex::new(&format!(
        r"(?:\b(?:var|let|const)\s+|\bwindow\.){}\s*=\s*",
        regex::escape(name)
    ))
    .map_err(|_| BlobError::Missing {
        name: name.to_string(),
    })?;

    let mut last_err = None;
    let mut attempts = 0;
    let mut saw_anchor = false;

    for m in anchor.find_iter(document) {
        saw_anchor = true;
        let rest = &document[m.end()..];
        if !rest.starts_with('{') {
            continue;
        }
        for end in terminators(rest).take(MAX_SPANS) {
            let span = rest[..end].trim_end();
            if !span.ends_with('}') {
                continue;
            }
            attempts += 1;
            match parse_literal(span) {
                Ok(tree) if tree.is_object() => return Ok(tree),
                Ok(_) => {}
                Err(e) => last_err = Some(e),
            }
        }
    }

    match (saw_anchor, last_err) {
        (false, _) => Err(BlobError::Missing {
            name: name.to_string(),
        }),
        (true, Some(source)) => Err(BlobError::Unparseable {
            name: name.to_string(),
            attempts,
            source,
        }),
        (true, None) => Err(BlobError::NoLiteral {
            name: name.to_string(),
        }),
    }
}

/// Byte offsets of each `;`, then the closing script tag or end of text.
fn terminators(rest: &str) -> impl Iterator<Item = usize> + '_ {
    let script_end = rest.find("</script").unwrap_or(rest.len());
    rest[..script_end]
        .match_indices(';')
        .map(|(i, _)| i)
        .chain(std::iter::once(script_end))
}

/// JSON first; then a lenient pass for JS object syntax
/// (single quotes, trailing commas, bare keys).
pub fn parse_literal(text: &str) -> Result<Value, serde_json::Error> {
    let strict = serde_json::from_str(text);
    if strict.is_ok() {
        return strict;
    }

    let mut js = text.replace('\'', "\"");
    js = TRAILING_COMMA_RE.replace_all(&js, "$1").to_string();
    js = UNQUOTED_KEY_RE.replace_all(&js, r#"$1"$2":"#).to_string();
    match serde_json::from_str(&js) {
        Ok(v) => Ok(v),
        Err(_) => strict,
    }
}

/// The whole-page data script, e.g. `<script id="__NEXT_DATA__">`.
pub fn locate_canonical(document: &str, script_id: &str) -> Result<DataTree, BlobError> {
    let missing = || BlobError::Missing {
        name: script_id.to_string(),
    };
    let selector =
        Selector::parse(&format!(r#"script[id="{}"]"#, script_id)).map_err(|_| missing())?;
    let html = Html::parse_document(document);
    let script = html.select(&selector).next().ok_or_else(missing)?;

    let raw: String = script.text().collect();
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BlobError::NoLiteral {
            name: script_id.to_string(),
        });
    }
    serde_json::from_str(raw).map_err(|source| BlobError::Unparseable {
        name: script_id.to_string(),
        attempts: 1,
        source,
    })
}

// ── Tests ──
