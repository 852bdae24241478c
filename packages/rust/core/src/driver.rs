//! Monthly archive crawl: archive page → listings → article → recipe → store.
//!
//! The driver owns no I/O of its own; the fetcher, site adapter, normalizer
//! and store are injected at construction so tests can substitute fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use harvest_crawler::{Document, Fetcher, RecipeNormalizer, SiteAdapter};
use harvest_shared::{CrawlConfig, Listing, Recipe, Result, YearMonth};
use harvest_storage::RecipeStore;

use crate::window::CrawlWindow;

/// Result of handing one normalized recipe to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly persisted under this id.
    Inserted(i64),
    /// A recipe with the same name already exists; nothing written.
    Duplicate,
}

/// Counters and errors collected over one crawl run.
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub months_visited: usize,
    pub months_failed: usize,
    pub listings_seen: usize,
    pub recipes_inserted: usize,
    pub duplicates_skipped: usize,
    pub articles_without_data: usize,
    /// `(url, message)` for every failed month or article.
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
    pub cancelled: bool,
}

/// Progress callback for reporting crawl status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a month's archive page is about to be fetched.
    fn month_started(&self, month: YearMonth, current: usize, total: usize);
    /// Called once per listing after its article has been processed.
    fn article_finished(&self, url: &str, summary: &CrawlSummary);
    /// Called when the crawl ends, cancelled or not.
    fn done(&self, summary: &CrawlSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn month_started(&self, _month: YearMonth, _current: usize, _total: usize) {}
    fn article_finished(&self, _url: &str, _summary: &CrawlSummary) {}
    fn done(&self, _summary: &CrawlSummary) {}
}

/// What happened to a single article.
enum ArticleOutcome {
    Ingested(IngestOutcome),
    NoData,
}

// ---------------------------------------------------------------------------
// Collaborators shared with article tasks
// ---------------------------------------------------------------------------

struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    site: Arc<dyn SiteAdapter>,
    normalizer: Arc<dyn RecipeNormalizer>,
    store: Arc<dyn RecipeStore>,
    /// One async lock per recipe name so "exists → insert" cannot interleave.
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Pipeline {
    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.name_locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for `name` once no task holds or awaits it.
    async fn release_name(&self, name: &str) {
        let mut locks = self.name_locks.lock().await;
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }

    async fn ingest(&self, recipe: &Recipe) -> Result<IngestOutcome> {
        let guard = self.lock_name(&recipe.name).await;
        let outcome = self.ingest_locked(recipe).await;
        drop(guard);
        self.release_name(&recipe.name).await;
        outcome
    }

    async fn ingest_locked(&self, recipe: &Recipe) -> Result<IngestOutcome> {
        if self.store.exists(&recipe.name).await? {
            info!(recipe = %recipe.name, "recipe already stored, skipping");
            return Ok(IngestOutcome::Duplicate);
        }
        let id = self.store.insert(recipe).await?;
        info!(recipe = %recipe.name, slug = %recipe.slug, id, "recipe inserted");
        Ok(IngestOutcome::Inserted(id))
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn process_article(&self, url: &str) -> Result<ArticleOutcome> {
        let markup = self.fetcher.fetch(url).await?;
        let Some(raw_json) = embedded_json(self.site.as_ref(), &markup)? else {
            warn!(url, "no embedded recipe data on article");
            return Ok(ArticleOutcome::NoData);
        };
        let recipe = self.normalizer.normalize(&raw_json)?;
        debug!(recipe = %recipe.name, ingredients = recipe.number_of_ingredients, "normalized");
        Ok(ArticleOutcome::Ingested(self.ingest(&recipe).await?))
    }
}

// Parsed documents are not `Send`; keep them inside these sync helpers.

fn archive_listings(site: &dyn SiteAdapter, markup: &str) -> Result<Vec<Listing>> {
    let doc = Document::parse(markup)?;
    Ok(site.extract_listings(&doc))
}

fn embedded_json(site: &dyn SiteAdapter, markup: &str) -> Result<Option<String>> {
    let doc = Document::parse(markup)?;
    Ok(site.extract_recipe_json(&doc))
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Walks the archive month by month and ingests every recipe it finds.
pub struct CrawlDriver {
    pipeline: Arc<Pipeline>,
    config: CrawlConfig,
}

impl CrawlDriver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        site: Arc<dyn SiteAdapter>,
        normalizer: Arc<dyn RecipeNormalizer>,
        store: Arc<dyn RecipeStore>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                fetcher,
                site,
                normalizer,
                store,
                name_locks: Mutex::new(HashMap::new()),
            }),
            config,
        }
    }

    /// Store a recipe unless one with the same name is already present.
    pub async fn ingest(&self, recipe: &Recipe) -> Result<IngestOutcome> {
        self.pipeline.ingest(recipe).await
    }

    /// Crawl every month of the configured window.
    ///
    /// Per-month and per-article failures are logged and recorded in the
    /// summary; only an invalid window is returned as an error.
    #[instrument(skip_all, fields(site = %self.pipeline.site.name()))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<CrawlSummary> {
        let start_time = Instant::now();
        let window = CrawlWindow::from_config(&self.config)?;
        let total = window.month_count();
        let mut summary = CrawlSummary::default();

        info!(
            from = %window.start(),
            until = %window.end(),
            concurrency = self.config.concurrency,
            rate_limit_ms = self.config.rate_limit_ms,
            "starting crawl"
        );

        for (index, month) in window.months().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            progress.month_started(month, index + 1, total);
            self.crawl_month(month, cancel, progress, &mut summary).await;
            if summary.cancelled {
                break;
            }
        }

        summary.duration = start_time.elapsed();
        if summary.cancelled {
            info!("crawl cancelled");
        }
        info!(
            months_visited = summary.months_visited,
            months_failed = summary.months_failed,
            listings_seen = summary.listings_seen,
            recipes_inserted = summary.recipes_inserted,
            duplicates_skipped = summary.duplicates_skipped,
            articles_without_data = summary.articles_without_data,
            errors = summary.errors.len(),
            duration_ms = summary.duration.as_millis(),
            "crawl completed"
        );
        progress.done(&summary);
        Ok(summary)
    }

    #[instrument(skip_all, fields(month = %month))]
    async fn crawl_month(
        &self,
        month: YearMonth,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
        summary: &mut CrawlSummary,
    ) {
        let archive_url = self.pipeline.site.archive_url(month);
        info!(url = %archive_url, "crawling month");
        summary.months_visited += 1;

        let listings = match self.fetch_listings(&archive_url).await {
            Ok(listings) => listings,
            Err(e) => {
                warn!(url = %archive_url, error = %e, "archive page failed, skipping month");
                summary.months_failed += 1;
                summary.errors.push((archive_url, e.to_string()));
                return;
            }
        };
        debug!(count = listings.len(), "listings found");
        summary.listings_seen += listings.len();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));
        let rate_limit = Duration::from_millis(self.config.rate_limit_ms);
        let mut handles: Vec<(String, JoinHandle<Result<ArticleOutcome>>)> = Vec::new();

        for listing in listings {
            // Wait for a free slot, giving up as soon as the crawl is cancelled.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pipeline = self.pipeline.clone();
            let url = listing.url.clone();
            handles.push((
                listing.url,
                tokio::spawn(async move {
                    let _permit = permit;
                    if !rate_limit.is_zero() {
                        tokio::time::sleep(rate_limit).await;
                    }
                    pipeline.process_article(&url).await
                }),
            ));
        }

        // In-flight articles always run to completion.
        for (url, handle) in handles {
            match handle.await {
                Ok(Ok(ArticleOutcome::Ingested(IngestOutcome::Inserted(_)))) => {
                    summary.recipes_inserted += 1;
                }
                Ok(Ok(ArticleOutcome::Ingested(IngestOutcome::Duplicate))) => {
                    summary.duplicates_skipped += 1;
                }
                Ok(Ok(ArticleOutcome::NoData)) => summary.articles_without_data += 1,
                Ok(Err(e)) => {
                    warn!(url = %url, error = %e, "article failed");
                    summary.errors.push((url.clone(), e.to_string()));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "article task failed");
                    summary.errors.push((url.clone(), e.to_string()));
                }
            }
            progress.article_finished(&url, summary);
        }
    }

    async fn fetch_listings(&self, archive_url: &str) -> Result<Vec<Listing>> {
        let markup = self.pipeline.fetcher.fetch(archive_url).await?;
        archive_listings(self.pipeline.site.as_ref(), &markup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_crawler::{WprmNormalizer, WprmSite};
    use harvest_shared::{HarvestError, SiteConfig};
    use harvest_storage::Storage;

    const BASE: &str = "https://test.example";

    /// Serves canned pages; anything else is a network error.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        requests: std::sync::Mutex<Vec<String>>,
        /// Cancel this token when the given URL is fetched.
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl FakeFetcher {
        fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        fn requested(&self, url: &str) -> bool {
            self.requests.lock().unwrap().iter().any(|u| u == url)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some((trigger, token)) = &self.cancel_on {
                if trigger == url {
                    token.cancel();
                }
            }
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| HarvestError::Network(format!("HTTP 404 for {url}")))
        }
    }

    fn archive(slugs: &[&str]) -> String {
        let cards: String = slugs
            .iter()
            .map(|slug| {
                format!(
                    r#"<div class="item archive-post"><a class="block" href="{BASE}/2024/01/{slug}.html"><h3 class="title"><span class="inline">{slug}</span></h3></a></div>"#
                )
            })
            .collect();
        format!("<html><body>{cards}</body></html>")
    }

    fn article(payload: &str) -> String {
        format!(
            r#"<html><body><script type="rocketlazyloadscript">window.wprm_recipes = {payload};</script></body></html>"#
        )
    }

    fn article_url(slug: &str) -> String {
        format!("{BASE}/2024/01/{slug}.html")
    }

    fn config(from: &str, until: &str, concurrency: u32) -> CrawlConfig {
        CrawlConfig {
            from: from.parse().unwrap(),
            until: Some(until.parse().unwrap()),
            concurrency,
            rate_limit_ms: 0,
        }
    }

    fn driver(fetcher: Arc<FakeFetcher>, store: Arc<Storage>, config: CrawlConfig) -> CrawlDriver {
        let site = WprmSite::new(&SiteConfig {
            base_url: BASE.into(),
            ..SiteConfig::default()
        })
        .unwrap();
        CrawlDriver::new(fetcher, Arc::new(site), Arc::new(WprmNormalizer), store, config)
    }

    async fn store() -> Arc<Storage> {
        Arc::new(Storage::open_in_memory().await.unwrap())
    }

    const TEST_SOUP: &str = r#"{"123": {"name":"Test Soup","ingredients":[{"name":"Salt","amount":"1","unit":"tsp","position":0}]}}"#;

    #[tokio::test]
    async fn end_to_end_single_month() {
        let archive_page = format!(
            r#"<html><body>
            <div class="item archive-post"><a class="block" href="{BASE}/2024/01/test-soup.html"><h3 class="title"><span class="inline">Test Soup</span></h3></a></div>
            <div class="item archive-post"><a class="block" href="https://elsewhere.example/2024/01/test-soup.html">foreign</a></div>
            </body></html>"#
        );
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(&format!("{BASE}/2024/01"), archive_page)
                .page(&article_url("test-soup"), article(TEST_SOUP)),
        );
        let storage = store().await;
        let driver = driver(fetcher.clone(), storage.clone(), config("2024-01", "2024-01", 1));

        let summary = driver
            .run(&CancellationToken::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.months_visited, 1);
        assert_eq!(summary.listings_seen, 1);
        assert_eq!(summary.recipes_inserted, 1);
        assert!(summary.errors.is_empty());
        assert!(!fetcher.requested("https://elsewhere.example/2024/01/test-soup.html"));

        let recipe = storage.get_recipe_by_slug("test-soup").await.unwrap().unwrap();
        assert_eq!(recipe.name, "Test Soup");
        assert_eq!(recipe.number_of_ingredients, 1);
        assert_eq!(recipe.ingredients[0].name, "Salt");
        assert_eq!(recipe.ingredients[0].position, 0);

        // Second run over the same pages writes nothing new.
        let again = driver
            .run(&CancellationToken::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.recipes_inserted, 0);
        assert_eq!(again.duplicates_skipped, 1);
        assert_eq!(storage.count_recipes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(
                    &format!("{BASE}/2024/01"),
                    archive(&["missing", "plain", "broken", "good"]),
                )
                // "missing" is never served.
                .page(&article_url("plain"), "<html><body><p>no recipe</p></body></html>")
                .page(&article_url("broken"), article(r#"{"1": {"ingredients": []}}"#))
                .page(
                    &article_url("good"),
                    article(r#"{"7": {"name": "Good Stew", "ingredients": []}}"#),
                )
                // 2024-02 archive is missing entirely.
                .page(&format!("{BASE}/2024/03"), archive(&["later"]))
                .page(
                    &article_url("later"),
                    article(r#"{"8": {"name": "Later Pie", "ingredients": []}}"#),
                ),
        );
        let storage = store().await;
        let driver = driver(fetcher, storage.clone(), config("2024-01", "2024-03", 1));

        let summary = driver
            .run(&CancellationToken::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.months_visited, 3);
        assert_eq!(summary.months_failed, 1);
        assert_eq!(summary.listings_seen, 5);
        assert_eq!(summary.recipes_inserted, 2);
        assert_eq!(summary.articles_without_data, 1);

        let failed: Vec<&str> = summary.errors.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(failed.len(), 3);
        assert!(failed.contains(&article_url("missing").as_str()));
        assert!(failed.contains(&article_url("broken").as_str()));
        assert!(failed.contains(&format!("{BASE}/2024/02").as_str()));

        assert!(storage.recipe_exists("Good Stew").await.unwrap());
        assert!(storage.recipe_exists("Later Pie").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_duplicate_names_insert_once() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(&format!("{BASE}/2024/01"), archive(&["soup-a", "soup-b", "soup-c"]))
                .page(
                    &article_url("soup-a"),
                    article(r#"{"1": {"name": "Soup", "slug": "soup-a", "ingredients": []}}"#),
                )
                .page(
                    &article_url("soup-b"),
                    article(r#"{"2": {"name": "Soup", "slug": "soup-b", "ingredients": []}}"#),
                )
                .page(
                    &article_url("soup-c"),
                    article(r#"{"3": {"name": "Soup", "slug": "soup-c", "ingredients": []}}"#),
                ),
        );
        let storage = store().await;
        let driver = driver(fetcher, storage.clone(), config("2024-01", "2024-01", 4));

        let summary = driver
            .run(&CancellationToken::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.recipes_inserted, 1);
        assert_eq!(summary.duplicates_skipped, 2);
        assert!(summary.errors.is_empty());
        assert_eq!(storage.count_recipes().await.unwrap(), 1);
        assert!(driver.pipeline.name_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn name_locks_are_released_after_ingest() {
        let storage = store().await;
        let driver = driver(
            Arc::new(FakeFetcher::default()),
            storage,
            config("2024-01", "2024-01", 1),
        );
        for name in ["Soup", "Stew", "Soup"] {
            let recipe = Recipe {
                id: None,
                slug: name.to_lowercase(),
                name: name.into(),
                image_url: String::new(),
                calories: None,
                number_of_ingredients: 0,
                ingredients: Vec::new(),
            };
            driver.ingest(&recipe).await.unwrap();
        }
        assert!(driver.pipeline.name_locks.lock().await.is_empty());

        // A failed insert releases its entry too.
        let broken = Recipe {
            id: None,
            slug: "soup".into(),
            name: "Different Soup".into(),
            image_url: String::new(),
            calories: None,
            number_of_ingredients: 0,
            ingredients: Vec::new(),
        };
        assert!(driver.ingest(&broken).await.is_err());
        assert!(driver.pipeline.name_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_visits_nothing() {
        let fetcher = Arc::new(FakeFetcher::default());
        let driver = driver(fetcher.clone(), store().await, config("2024-01", "2024-06", 1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = driver.run(&cancel, &SilentProgress).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.months_visited, 0);
        assert!(fetcher.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_between_articles() {
        let cancel = CancellationToken::new();
        let mut fetcher = FakeFetcher::default()
            .page(&format!("{BASE}/2024/01"), archive(&["first", "second"]))
            .page(
                &article_url("first"),
                article(r#"{"1": {"name": "First", "ingredients": []}}"#),
            )
            .page(
                &article_url("second"),
                article(r#"{"2": {"name": "Second", "ingredients": []}}"#),
            );
        fetcher.cancel_on = Some((article_url("first"), cancel.clone()));
        let fetcher = Arc::new(fetcher);
        let storage = store().await;
        let driver = driver(fetcher.clone(), storage.clone(), config("2024-01", "2024-02", 1));

        let summary = driver.run(&cancel, &SilentProgress).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.months_visited, 1);
        // The in-flight article still completes.
        assert_eq!(summary.recipes_inserted, 1);
        assert!(!fetcher.requested(&article_url("second")));
        assert!(!fetcher.requested(&format!("{BASE}/2024/02")));
        assert!(!storage.recipe_exists("Second").await.unwrap());
    }

    #[tokio::test]
    async fn ingest_is_idempotent_by_name() {
        let storage = store().await;
        let driver = driver(
            Arc::new(FakeFetcher::default()),
            storage.clone(),
            config("2024-01", "2024-01", 1),
        );
        let recipe = WprmNormalizer.normalize(TEST_SOUP).unwrap();

        let first = driver.ingest(&recipe).await.unwrap();
        assert!(matches!(first, IngestOutcome::Inserted(_)));
        assert_eq!(driver.ingest(&recipe).await.unwrap(), IngestOutcome::Duplicate);
        assert_eq!(storage.count_recipes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_window_is_an_error() {
        let driver = driver(
            Arc::new(FakeFetcher::default()),
            store().await,
            config("2024-05", "2024-01", 1),
        );
        let result = driver.run(&CancellationToken::new(), &SilentProgress).await;
        assert!(matches!(result, Err(HarvestError::Validation { .. })));
    }
}
