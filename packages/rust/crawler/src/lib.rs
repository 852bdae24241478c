//! Fetching and extraction for recipe archive sites.
//!
//! This crate provides:
//! - [`fetcher`]: HTTP page fetcher with gzip, timeout and retry
//! - [`document`]: parsed markup with CSS-selector queries
//! - [`listing`] / [`embedded`]: archive-page and article-page extractors
//! - [`normalizer`]: embedded JSON → [`harvest_shared::Recipe`]
//! - [`site`]: the [`SiteAdapter`] tying site-specific extraction together

pub mod document;
pub mod embedded;
pub mod fetcher;
pub mod listing;
pub mod normalizer;
pub mod site;

pub use document::{Document, Node, compile_selector};
pub use embedded::EmbeddedDataExtractor;
pub use fetcher::{Fetcher, HttpFetcher};
pub use listing::ListingExtractor;
pub use normalizer::{RecipeNormalizer, WprmNormalizer, derive_slug};
pub use site::{SiteAdapter, WprmSite};

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_shared::SiteConfig;

    fn load_fixture(name: &str) -> Document {
        let path = format!("../../../fixtures/html/{name}");
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing fixture: {path}"));
        Document::parse(&content).expect("parse fixture")
    }

    #[test]
    fn fixture_archive_listings() {
        let site = WprmSite::new(&SiteConfig::default()).unwrap();
        let listings = site.extract_listings(&load_fixture("archive.html"));

        let urls: Vec<&str> = listings.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://emilybites.com/2011/01/skinny-turkey-chili.html",
                "https://emilybites.com/2011/01/lemon-garlic-shrimp.html",
                "https://emilybites.com/2011/01/chocolate-lava-cake.html",
            ]
        );
        assert_eq!(listings[0].title, "Skinny Turkey Chili");
        assert_eq!(
            listings[0].image_url.as_deref(),
            Some("https://emilybites.com/wp-content/uploads/2011/01/chili.jpg")
        );
    }

    #[test]
    fn fixture_article_round_trip() {
        let site = WprmSite::new(&SiteConfig::default()).unwrap();
        let json = site
            .extract_recipe_json(&load_fixture("article.html"))
            .expect("embedded payload");
        let recipe = WprmNormalizer.normalize(&json).expect("normalize");

        assert_eq!(recipe.name, "Chocolate Lava Cake");
        assert_eq!(recipe.slug, "chocolate-lava-cake");
        assert_eq!(recipe.number_of_ingredients, 5);
        assert_eq!(recipe.ingredients.len(), recipe.number_of_ingredients);

        let positions: Vec<u32> = recipe.ingredients.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        let names: Vec<&str> = recipe.ingredients.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "semi-sweet chocolate chips",
                "light butter",
                "powdered sugar",
                "egg whites",
                "all-purpose flour",
            ]
        );
        assert_eq!(recipe.ingredients[3].notes, "room temperature");
    }
}
