//! Application configuration for harvest.
//!
//! User config lives at `~/.harvest/harvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::types::YearMonth;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".harvest";

// ---------------------------------------------------------------------------
// Config structs (matching harvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source site profile.
    #[serde(default)]
    pub site: SiteConfig,

    /// Crawl behaviour.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Ingestion store location.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// `[site]` section: where to crawl and how to read its markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site root; archive pages live at `{base_url}/{year}/{month:02}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// File suffix every article URL ends with.
    #[serde(default = "default_article_suffix")]
    pub article_suffix: String,

    /// Anchors on an archive page that link to articles.
    #[serde(default = "default_listing_selector")]
    pub listing_selector: String,

    /// Title element nested inside a listing anchor.
    #[serde(default = "default_title_selector")]
    pub title_selector: String,

    /// Thumbnail element nested inside a listing anchor.
    #[serde(default = "default_image_selector")]
    pub image_selector: String,

    /// Lazy-load attribute preferred over `src`.
    #[serde(default = "default_lazy_image_attr")]
    pub lazy_image_attr: String,

    /// Deferred scripts that may carry the embedded recipe data.
    #[serde(default = "default_script_selector")]
    pub script_selector: String,

    /// Page-global variable the recipe JSON is assigned to (`window.<name> =`).
    #[serde(default = "default_recipes_variable")]
    pub recipes_variable: String,

    /// User-Agent header for every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            article_suffix: default_article_suffix(),
            listing_selector: default_listing_selector(),
            title_selector: default_title_selector(),
            image_selector: default_image_selector(),
            lazy_image_attr: default_lazy_image_attr(),
            script_selector: default_script_selector(),
            recipes_variable: default_recipes_variable(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://emilybites.com".into()
}
fn default_article_suffix() -> String {
    ".html".into()
}
fn default_listing_selector() -> String {
    "div.item.archive-post a.block".into()
}
fn default_title_selector() -> String {
    "h3.title span.inline".into()
}
fn default_image_selector() -> String {
    "img".into()
}
fn default_lazy_image_attr() -> String {
    "data-src".into()
}
fn default_script_selector() -> String {
    "script[type='rocketlazyloadscript']".into()
}
fn default_recipes_variable() -> String {
    "wprm_recipes".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// First archive month to visit.
    #[serde(default = "default_epoch")]
    pub epoch: YearMonth,

    /// Articles processed in parallel within one month (1 = sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for transient fetch failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubled on each further retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Delay before each article fetch.
    #[serde(default)]
    pub rate_limit_ms: u64,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            rate_limit_ms: 0,
        }
    }
}

fn default_epoch() -> YearMonth {
    // 2010-12 is the oldest archive month on the default site.
    YearMonth::new(2010, 12).unwrap_or_else(|_| YearMonth::current())
}
fn default_concurrency() -> u32 {
    1
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    500
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the libSQL database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "var/harvest.db".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// First month to visit (inclusive).
    pub from: YearMonth,
    /// Last month to visit (inclusive). `None` means the current month.
    pub until: Option<YearMonth>,
    /// Maximum concurrent article tasks within a month.
    pub concurrency: u32,
    /// Delay in ms before each article fetch.
    pub rate_limit_ms: u64,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            from: config.crawl.epoch,
            until: None,
            concurrency: config.crawl.concurrency.max(1),
            rate_limit_ms: config.crawl.rate_limit_ms,
        }
    }
}

/// Runtime HTTP client settings for the page fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.site.user_agent.clone(),
            timeout: Duration::from_secs(config.crawl.request_timeout_secs),
            max_retries: config.crawl.max_retries,
            retry_backoff: Duration::from_millis(config.crawl.retry_backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.harvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.harvest/harvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs the crawler cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let base = url::Url::parse(&config.site.base_url).map_err(|e| {
        HarvestError::config(format!("invalid site.base_url '{}': {e}", config.site.base_url))
    })?;
    if base.host_str().is_none() {
        return Err(HarvestError::config(format!(
            "site.base_url '{}' has no host",
            config.site.base_url
        )));
    }
    if config.site.recipes_variable.trim().is_empty() {
        return Err(HarvestError::config("site.recipes_variable must not be empty"));
    }
    if config.crawl.concurrency == 0 {
        return Err(HarvestError::config("crawl.concurrency must be at least 1"));
    }
    if config.crawl.request_timeout_secs == 0 {
        return Err(HarvestError::config(
            "crawl.request_timeout_secs must be at least 1",
        ));
    }
    Ok(())
}
