//! Locates the recipe JSON a WordPress Recipe Maker page assigns to a
//! page-global variable inside a deferred `<script>`.

use harvest_shared::{HarvestError, Result, SiteConfig};
use regex::Regex;
use scraper::Selector;
use tracing::debug;

use crate::document::{Document, compile_selector};

/// Finds `window.<variable> = {...}` in deferred scripts.
pub struct EmbeddedDataExtractor {
    scripts: Selector,
    marker: String,
    assignment: Regex,
}

impl EmbeddedDataExtractor {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let variable = site.recipes_variable.trim();
        let assignment = Regex::new(&format!(r"window\.{}\s*=\s*\{{", regex::escape(variable)))
            .map_err(|e| HarvestError::config(format!("invalid recipes variable: {e}")))?;
        Ok(Self {
            scripts: compile_selector(&site.script_selector)?,
            marker: format!("window.{variable}"),
            assignment,
        })
    }

    /// Raw JSON object text from the first matching script, or `None`.
    pub fn extract_recipe_json(&self, doc: &Document) -> Option<String> {
        doc.select(&self.scripts).into_iter().find_map(|script| {
            let text = script.text();
            if !text.contains(&self.marker) {
                return None;
            }
            let found = self.extract_from_script(&text);
            if found.is_none() {
                debug!(marker = %self.marker, "marker present but no complete object literal");
            }
            found
        })
    }

    /// The object literal assigned to the marker variable within one script body.
    pub fn extract_from_script(&self, script: &str) -> Option<String> {
        let m = self.assignment.find(script)?;
        // The match ends just past the opening brace.
        let start = m.end() - 1;
        object_literal(&script[start..]).map(String::from)
    }
}

/// The balanced `{...}` prefix of `s`, skipping braces inside JSON strings.
fn object_literal(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
