//! Crawl orchestration for harvest.
//!
//! This crate ties the fetcher, extractors, normalizer and store together
//! into the monthly archive crawl ([`driver::CrawlDriver`]).

pub mod driver;
pub mod window;

pub use driver::{CrawlDriver, CrawlSummary, IngestOutcome, ProgressReporter, SilentProgress};
pub use window::CrawlWindow;
