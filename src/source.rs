use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::info;

const PAGE_EXT: &str = "html";
const REVEALED_SUFFIX: &str = ".revealed.html";
const ID_SOURCES: &[(&str, &str)] = &[
    (r#"link[rel="canonical"]"#, "href"),
    (r#"meta[property="og:url"]"#, "content"),
];

/// A saved page on disk, with its post-reveal capture if one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub revealed: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub resource_url: String,
    pub markup: String,
    pub revealed: Option<String>,
}

/// Every `*.html` page in `dir`, sorted by file name. Reveal captures are
/// attached to their page rather than listed on their own.
pub fn list_documents(dir: &Path) -> Result<Vec<SourceDocument>> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading input dir {}", dir.display()))?;
    let mut docs: Vec<SourceDocument> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|x| x.eq_ignore_ascii_case(PAGE_EXT)))
        .filter(|p| !file_name(p).ends_with(REVEALED_SUFFIX))
        .map(SourceDocument::at)
        .collect();
    docs.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Found {} documents in {}", docs.len(), dir.display());
    Ok(docs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl SourceDocument {
    /// A single page, with its sibling reveal capture if present.
    pub fn at(path: PathBuf) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let revealed = path.with_file_name(format!("{stem}{REVEALED_SUFFIX}"));
        SourceDocument {
            revealed: revealed.is_file().then_some(revealed),
            path,
        }
    }

    pub fn load(&self) -> Result<LoadedDocument> {
        let markup = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let revealed = match &self.revealed {
            Some(p) => Some(fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?),
            None => None,
        };
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(LoadedDocument {
            resource_url: resource_id(&markup, &stem),
            markup,
            revealed,
        })
    }
}

/// Canonical link, then `og:url`, then the fallback (usually the file stem).
pub fn resource_id(markup: &str, fallback: &str) -> String {
    let html = Html::parse_document(markup);
    ID_SOURCES
        .iter()
        .find_map(|(css, attr)| {
            let sel = Selector::parse(css).ok()?;
            html.select(&sel)
                .filter_map(|el| el.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| fallback.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_then_og_then_stem() {
        let both = r#"<head><meta property="og:url" content="https://example.test/og"><link rel="canonical" href="https://example.test/canon"></head>"#;
        assert_eq!(resource_id(both, "stem"), "https://example.test/canon");
        let og = r#"<head><meta property="og:url" content=" https://example.test/og "></head>"#;
        assert_eq!(resource_id(og, "stem"), "https://example.test/og");
        assert_eq!(resource_id("<p>x</p>", "stem"), "stem");
    }

    #[test]
    fn revealed_captures_attach_to_their_page() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.html"), "<p>b</p>").unwrap();
        fs::write(dir.path().join("a.html"), "<p>a</p>").unwrap();
        fs::write(dir.path().join("a.revealed.html"), "<p>a2</p>").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let docs = list_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].path.ends_with("a.html"));
        assert!(docs[0].revealed.is_some());
        assert!(docs[1].revealed.is_none());

        let loaded = docs[0].load().unwrap();
        assert_eq!(loaded.resource_url, "a");
        assert_eq!(loaded.revealed.as_deref(), Some("<p>a2</p>"));
    }

    #[test]
    fn missing_dir_is_an_error() {
        assert!(list_documents(Path::new("/definitely/not/here")).is_err());
    }
}
