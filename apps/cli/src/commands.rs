//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use harvest_core::{CrawlDriver, CrawlSummary, ProgressReporter};
use harvest_crawler::{HttpFetcher, WprmNormalizer, WprmSite};
use harvest_shared::{
    AppConfig, CrawlConfig, FetchConfig, YearMonth, init_config, load_config, load_config_from,
};
use harvest_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// harvest: collect recipes from a WordPress recipe archive.
#[derive(Parser)]
#[command(
    name = "harvest",
    version,
    about = "Crawl a recipe site's monthly archive into a local recipe database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to load instead of ~/.harvest/harvest.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides [database].path).
    #[arg(long, env = "HARVEST_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl archive months and ingest every recipe found.
    Crawl {
        /// First month to crawl (YYYY-MM). Defaults to [crawl].epoch.
        #[arg(long)]
        from: Option<YearMonth>,

        /// Last month to crawl (YYYY-MM). Defaults to the current month.
        #[arg(long)]
        until: Option<YearMonth>,

        /// Articles processed in parallel within a month.
        #[arg(short, long)]
        concurrency: Option<u32>,
    },

    /// Inspect stored recipes.
    Recipes {
        #[command(subcommand)]
        action: RecipesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Recipe inspection subcommands.
#[derive(Subcommand)]
pub(crate) enum RecipesAction {
    /// List the most recently stored recipes.
    List {
        /// Maximum number of recipes to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Show one recipe and its ingredients.
    Show {
        /// Recipe slug.
        slug: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "harvest=info",
        1 => "harvest=debug",
        _ => "harvest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database.path));

    match cli.command {
        Command::Crawl {
            from,
            until,
            concurrency,
        } => cmd_crawl(&config, &db_path, from, until, concurrency).await,
        Command::Recipes { action } => match action {
            RecipesAction::List { limit } => cmd_recipes_list(&db_path, limit).await,
            RecipesAction::Show { slug } => cmd_recipes_show(&db_path, &slug).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// crawl
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    config: &AppConfig,
    db_path: &Path,
    from: Option<YearMonth>,
    until: Option<YearMonth>,
    concurrency: Option<u32>,
) -> Result<()> {
    let mut crawl = CrawlConfig::from(config);
    if let Some(from) = from {
        crawl.from = from;
    }
    crawl.until = until;
    if let Some(concurrency) = concurrency {
        crawl.concurrency = concurrency.max(1);
    }

    // Setup failures are fatal; everything after this is logged and skipped.
    let storage = Storage::open(db_path)
        .await
        .wrap_err_with(|| format!("opening database {}", db_path.display()))?;
    let fetcher = HttpFetcher::new(FetchConfig::from(config))?;
    let site = WprmSite::new(&config.site)?;

    info!(db = %db_path.display(), site = %config.site.base_url, "starting harvest");

    let driver = CrawlDriver::new(
        Arc::new(fetcher),
        Arc::new(site),
        Arc::new(WprmNormalizer),
        Arc::new(storage),
        crawl,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight articles");
            on_signal.cancel();
        }
    });

    let progress = CliProgress::new();
    let summary = driver.run(&cancel, &progress).await?;
    print_summary(&summary, db_path);
    Ok(())
}

fn print_summary(summary: &CrawlSummary, db_path: &Path) {
    println!();
    if summary.cancelled {
        println!("Crawl cancelled.");
    } else {
        println!("Crawl complete.");
    }
    println!(
        "  Months:     {} visited, {} failed",
        summary.months_visited, summary.months_failed
    );
    println!("  Listings:   {}", summary.listings_seen);
    println!("  Inserted:   {}", summary.recipes_inserted);
    println!("  Duplicates: {}", summary.duplicates_skipped);
    println!("  No data:    {}", summary.articles_without_data);
    println!("  Errors:     {}", summary.errors.len());
    for (url, message) in summary.errors.iter().take(10) {
        println!("    {url}: {message}");
    }
    if summary.errors.len() > 10 {
        println!("    ... and {} more", summary.errors.len() - 10);
    }
    println!("  Database:   {}", db_path.display());
    println!("  Time:       {:.1}s", summary.duration.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn month_started(&self, month: YearMonth, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Month {month} [{current}/{total}]"));
    }

    fn article_finished(&self, url: &str, summary: &CrawlSummary) {
        self.spinner.set_message(format!(
            "{} inserted, {} duplicates, {} errors | {url}",
            summary.recipes_inserted,
            summary.duplicates_skipped,
            summary.errors.len()
        ));
    }

    fn done(&self, _summary: &CrawlSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// recipes
// ---------------------------------------------------------------------------

async fn cmd_recipes_list(db_path: &Path, limit: u32) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let total = storage.count_recipes().await?;
    let recipes = storage.list_recipes(limit).await?;

    if recipes.is_empty() {
        println!("No recipes stored in {}", db_path.display());
        return Ok(());
    }

    println!("{:<6} {:<40} {:>5}  NAME", "ID", "SLUG", "INGR");
    for recipe in &recipes {
        println!(
            "{:<6} {:<40} {:>5}  {}",
            recipe.id.unwrap_or_default(),
            recipe.slug,
            recipe.number_of_ingredients,
            recipe.name
        );
    }
    println!();
    println!("Showing {} of {total} recipes.", recipes.len());
    Ok(())
}

async fn cmd_recipes_show(db_path: &Path, slug: &str) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let recipe = storage
        .get_recipe_by_slug(slug)
        .await?
        .ok_or_else(|| eyre!("no recipe with slug '{slug}'"))?;

    println!("{}", recipe.name);
    println!("  Slug:     {}", recipe.slug);
    if !recipe.image_url.is_empty() {
        println!("  Image:    {}", recipe.image_url);
    }
    if let Some(calories) = recipe.calories {
        println!("  Calories: {calories:.0}");
    }
    println!("  Ingredients ({}):", recipe.number_of_ingredients);
    for ingredient in &recipe.ingredients {
        let quantity = [ingredient.amount.as_str(), ingredient.unit.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let mut line = format!("    {:>2}. ", ingredient.position + 1);
        if !quantity.is_empty() {
            line.push_str(&quantity);
            line.push(' ');
        }
        line.push_str(&ingredient.name);
        if !ingredient.notes.is_empty() {
            line.push_str(&format!(" ({})", ingredient.notes));
        }
        println!("{line}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
