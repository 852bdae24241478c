//! Archive listing extraction: article links plus title and thumbnail.

use harvest_shared::{HarvestError, Listing, Result, SiteConfig};
use scraper::Selector;
use tracing::trace;
use url::Url;

use crate::document::{Document, Node, compile_selector};

/// Pulls article candidates out of a monthly archive page.
pub struct ListingExtractor {
    base: Url,
    article_suffix: String,
    listing: Selector,
    title: Selector,
    image: Selector,
    lazy_image_attr: String,
}

impl ListingExtractor {
    /// Compile the site's selectors. Fails on an invalid selector or base URL.
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let base = Url::parse(&site.base_url).map_err(|e| {
            HarvestError::config(format!("invalid base URL '{}': {e}", site.base_url))
        })?;
        Ok(Self {
            base,
            article_suffix: site.article_suffix.clone(),
            listing: compile_selector(&site.listing_selector)?,
            title: compile_selector(&site.title_selector)?,
            image: compile_selector(&site.image_selector)?,
            lazy_image_attr: site.lazy_image_attr.clone(),
        })
    }

    /// Every listing anchor whose `href` is a canonical article URL.
    ///
    /// Anchors without an `href`, or pointing anywhere else, are skipped.
    pub fn extract_listings(&self, doc: &Document) -> Vec<Listing> {
        doc.select(&self.listing)
            .into_iter()
            .filter_map(|anchor| {
                let href = anchor.attr("href")?.trim();
                if !self.is_valid_article_url(href) {
                    trace!(href, "not an article link, skipping");
                    return None;
                }
                Some(Listing {
                    url: href.to_string(),
                    title: self.title_of(&anchor),
                    image_url: self.image_of(&anchor),
                })
            })
            .collect()
    }

    /// Absolute URL on the site's origin whose path ends in the article suffix.
    pub fn is_valid_article_url(&self, href: &str) -> bool {
        let Ok(url) = Url::parse(href) else {
            return false;
        };
        url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default()
            && url.path().starts_with(self.base.path())
            && url.path().len() > self.article_suffix.len() + 1
            && url.path().ends_with(&self.article_suffix)
            && url.query().is_none()
            && url.fragment().is_none()
    }

    fn title_of(&self, anchor: &Node<'_>) -> String {
        anchor
            .select(&self.title)
            .iter()
            .map(Node::text)
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn image_of(&self, anchor: &Node<'_>) -> Option<String> {
        let img = anchor.first(&self.image)?;
        [self.lazy_image_attr.as_str(), "src"]
            .into_iter()
            .filter_map(|attr| img.attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(String::from)
    }
}
