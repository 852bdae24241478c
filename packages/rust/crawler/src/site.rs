//! Site adapter: everything that depends on how a particular site lays out
//! its archive and article pages.

use harvest_shared::{Listing, Result, SiteConfig, YearMonth};

use crate::document::Document;
use crate::embedded::EmbeddedDataExtractor;
use crate::listing::ListingExtractor;

/// Site-specific URL building and extraction.
pub trait SiteAdapter: Send + Sync {
    /// Archive listing URL for one month.
    fn archive_url(&self, month: YearMonth) -> String;

    /// Article candidates on an archive page.
    fn extract_listings(&self, doc: &Document) -> Vec<Listing>;

    /// Embedded recipe JSON on an article page.
    fn extract_recipe_json(&self, doc: &Document) -> Option<String>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

/// WordPress site using the WP Recipe Maker plugin, configured by [`SiteConfig`].
pub struct WprmSite {
    base_url: String,
    listings: ListingExtractor,
    embedded: EmbeddedDataExtractor,
}

impl WprmSite {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            base_url: site.base_url.trim_end_matches('/').to_string(),
            listings: ListingExtractor::new(site)?,
            embedded: EmbeddedDataExtractor::new(site)?,
        })
    }
}

impl SiteAdapter for WprmSite {
    fn archive_url(&self, month: YearMonth) -> String {
        format!("{}/{}/{:02}", self.base_url, month.year(), month.month())
    }

    fn extract_listings(&self, doc: &Document) -> Vec<Listing> {
        self.listings.extract_listings(doc)
    }

    fn extract_recipe_json(&self, doc: &Document) -> Option<String> {
        self.embedded.extract_recipe_json(doc)
    }

    fn name(&self) -> &str {
        "wprm"
    }
}
