use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::RevealError;

/// Extra condition on an element's visible text.
#[derive(Debug, Clone)]
pub enum TextRule {
    /// Case-insensitive substring.
    Contains(String),
    Pattern(Regex),
}

/// CSS selector plus an optional text condition.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub css: String,
    pub text: Option<TextRule>,
}

impl Matcher {
    pub fn css(css: impl Into<String>) -> Self {
        Matcher {
            css: css.into(),
            text: None,
        }
    }

    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.text = Some(TextRule::Contains(needle.into()));
        self
    }

    pub fn matching(mut self, pattern: Regex) -> Self {
        self.text = Some(TextRule::Pattern(pattern));
        self
    }

    pub fn accepts_text(&self, text: &str) -> bool {
        match &self.text {
            None => true,
            Some(TextRule::Contains(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
            Some(TextRule::Pattern(re)) => re.is_match(text),
        }
    }
}

/// Opaque reference to an element on a given page state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHandle {
    pub page: usize,
    pub node: usize,
}

pub trait Surface {
    fn find_element(&self, matcher: &Matcher) -> Option<ElementHandle> {
        self.find_all(matcher).into_iter().next()
    }

    /// Matches in document order.
    fn find_all(&self, matcher: &Matcher) -> Vec<ElementHandle>;

    fn click(&mut self, handle: ElementHandle) -> Result<(), RevealError>;

    /// Visible text with whitespace collapsed; `None` when blank.
    fn read_text(&self, handle: ElementHandle) -> Option<String>;

    fn read_attribute(&self, handle: ElementHandle, name: &str) -> Option<String>;

    /// First match appearing within `timeout`.
    fn wait_for(&mut self, matcher: &Matcher, timeout: Duration) -> Option<ElementHandle>;

    /// Current markup, if the surface can serialize it.
    fn rendered_markup(&self) -> Option<String>;
}

/// Whitespace-collapsed text of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

struct PageState {
    markup: String,
    html: Html,
}

/// Saved pages: index 0 is the captured DOM, index 1 (if any) the DOM after
/// the reveal click. Time never passes, so `wait_for` answers immediately.
pub struct StaticSurface {
    pages: Vec<PageState>,
    current: usize,
}

impl StaticSurface {
    pub fn new(markup: &str) -> Self {
        StaticSurface {
            pages: vec![PageState {
                markup: markup.to_string(),
                html: Html::parse_document(markup),
            }],
            current: 0,
        }
    }

    /// Page state shown after the first successful click.
    pub fn with_revealed(mut self, markup: &str) -> Self {
        self.pages.truncate(1);
        self.pages.push(PageState {
            markup: markup.to_string(),
            html: Html::parse_document(markup),
        });
        self
    }

    #[cfg(test)]
    pub fn is_revealed(&self) -> bool {
        self.current > 0
    }

    fn elements(&self, page: usize) -> impl Iterator<Item = ElementRef<'_>> {
        self.pages[page]
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    fn resolve(&self, handle: ElementHandle) -> Option<ElementRef<'_>> {
        if handle.page != self.current {
            return None;
        }
        self.elements(handle.page).nth(handle.node)
    }
}

impl Surface for StaticSurface {
    fn find_all(&self, matcher: &Matcher) -> Vec<ElementHandle> {
        let Ok(selector) = Selector::parse(&matcher.css) else {
            return Vec::new();
        };
        let page = self.current;
        let selected: HashSet<_> = self.pages[page].html.select(&selector).map(|el| el.id()).collect();
        self.elements(page)
            .enumerate()
            .filter(|(_, el)| selected.contains(&el.id()))
            .filter(|(_, el)| matcher.accepts_text(&element_text(*el)))
            .map(|(node, _)| ElementHandle { page, node })
            .collect()
    }

    fn click(&mut self, handle: ElementHandle) -> Result<(), RevealError> {
        if self.resolve(handle).is_none() {
            return Err(RevealError::Surface("stale element handle".to_string()));
        }
        if self.current + 1 < self.pages.len() {
            self.current += 1;
        }
        Ok(())
    }

    fn read_text(&self, handle: ElementHandle) -> Option<String> {
        let text = element_text(self.resolve(handle)?);
        (!text.is_empty()).then_some(text)
    }

    fn read_attribute(&self, handle: ElementHandle, name: &str) -> Option<String> {
        self.resolve(handle)?
            .value()
            .attr(name)
            .map(|v| v.trim().to_string())
    }

    fn wait_for(&mut self, matcher: &Matcher, _timeout: Duration) -> Option<ElementHandle> {
        self.find_element(matcher)
    }

    fn rendered_markup(&self) -> Option<String> {
        Some(self.pages[self.current].markup.clone())
    }
}

// ── Tests ──
