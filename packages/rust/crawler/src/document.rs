//! Navigable markup tree with CSS-selector queries.
//!
//! Parsing is best-effort (html5ever tolerates real-world breakage), so the
//! only markup rejected outright is input with no content at all.

use harvest_shared::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};

/// Compile a CSS selector, mapping syntax errors to [`HarvestError::Parse`].
pub fn compile_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::parse(format!("invalid selector '{css}': {e}")))
}

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse fetched markup into a document tree.
    pub fn parse(markup: &str) -> Result<Self> {
        if markup.trim().is_empty() {
            return Err(HarvestError::parse("document is empty"));
        }
        Ok(Self {
            html: Html::parse_document(markup),
        })
    }

    /// All elements matching `selector`, in document order.
    pub fn select<'a>(&'a self, selector: &Selector) -> Vec<Node<'a>> {
        self.html.select(selector).map(Node).collect()
    }

    /// Like [`Document::select`] but compiles the selector first.
    pub fn select_css(&self, css: &str) -> Result<Vec<Node<'_>>> {
        let selector = compile_selector(css)?;
        Ok(self.select(&selector))
    }
}

/// A single element inside a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    /// Tag name, lowercase.
    pub fn name(&self) -> &'a str {
        self.0.value().name()
    }

    /// Attribute value, if present.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.0.value().attr(name)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        self.0.text().collect()
    }

    /// Descendants matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<Node<'a>> {
        self.0.select(selector).map(Node).collect()
    }

    /// First descendant matching `selector`.
    pub fn first(&self, selector: &Selector) -> Option<Node<'a>> {
        self.0.select(selector).next().map(Node)
    }
}
