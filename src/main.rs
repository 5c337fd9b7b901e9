mod browser;
mod config;
mod db;
mod error;
mod extract;
mod ingest;
mod link;
mod models;
mod session;
mod triage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use browser::WebDriverPage;
use config::{Config, Overrides};
use db::Database;
use extract::Extractor;
use ingest::Target;
use link::LinkResolver;
use models::StoredListing;
use session::SessionState;

#[derive(Parser)]
#[command(name = "trawl")]
#[command(about = "Scrape job listings from a logged-in search page and triage them by keyword")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long, global = true, env = "TRAWL_DB")]
    db: Option<PathBuf>,

    /// Log debug output (ignores RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Log in by hand and save the browser session for later fetches
    Login {
        /// WebDriver server URL
        #[arg(long, env = "TRAWL_WEBDRIVER_URL")]
        webdriver_url: Option<String>,
    },

    /// Fetch the listing page and store new listings
    Fetch {
        /// Listing page URL (overrides config)
        #[arg(short, long, env = "TRAWL_SEARCH_URL")]
        url: Option<String>,

        /// WebDriver server URL
        #[arg(long, env = "TRAWL_WEBDRIVER_URL")]
        webdriver_url: Option<String>,

        /// Show a visible browser window
        #[arg(long)]
        headed: bool,

        /// Extract and print without storing anything
        #[arg(long)]
        dry_run: bool,

        /// Run the keyword filter after storing
        #[arg(long)]
        filter: bool,
    },

    /// Copy stored listings that match the keywords into the curated set
    Filter {
        /// Include keyword (repeatable, replaces configured include list)
        #[arg(short, long)]
        include: Vec<String>,

        /// Exclude keyword (repeatable, replaces configured exclude list)
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// List stored listings
    List {
        /// Show only the most recent N
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List curated listings
    Curated {
        /// Show only the most recent N
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(Overrides {
        db_path: cli.db,
        ..Default::default()
    });

    match cli.command {
        Commands::Init => {
            let db = open_db(&config)?;
            println!("Database initialized at {}", db.path().display());
            println!(
                "  {} listings, {} curated",
                db.count()?,
                db.curated_count()?
            );
            println!("Session state: {}", config.session_path.display());
            println!("Config file:   {}", config::default_config_path().display());
        }

        Commands::Login { webdriver_url } => {
            config.apply(Overrides {
                webdriver_url,
                ..Default::default()
            });
            let mut page = WebDriverPage::connect(&config.webdriver_url, false).await?;
            println!("Please log in manually in the opened browser window.");
            let saved = ingest::login_and_save(
                &mut page,
                &config.login_url,
                config.login_wait,
                &config.session_path,
            )
            .await;
            if let Err(e) = page.quit().await {
                tracing::debug!("Browser did not shut down cleanly: {}", e);
            }
            saved?;
            println!("Saved session to {}", config.session_path.display());
        }

        Commands::Fetch {
            url,
            webdriver_url,
            headed,
            dry_run,
            filter,
        } => {
            config.apply(Overrides {
                search_url: url,
                webdriver_url,
                ..Default::default()
            });
            cmd_fetch(&config, headed, dry_run, filter).await?;
        }

        Commands::Filter { include, exclude } => {
            let db = open_db(&config)?;
            let keywords = config.keywords_with(include, exclude);
            println!(
                "Filtering with include={:?} exclude={:?}",
                keywords.include(),
                keywords.exclude()
            );
            let report = triage::run(&db, &keywords)?;
            println!(
                "Added {} listings to the curated set ({} matched of {})",
                report.admitted, report.matched, report.examined
            );
        }

        Commands::List { limit } => {
            let db = open_db(&config)?;
            print_listings(&db.all()?, limit, "No listings stored yet.");
        }

        Commands::Curated { limit } => {
            let db = open_db(&config)?;
            print_listings(&db.all_curated()?, limit, "No curated listings yet.");
        }
    }

    Ok(())
}

async fn cmd_fetch(config: &Config, headed: bool, dry_run: bool, filter: bool) -> Result<()> {
    let search_url = config.search_url()?;
    let origin = config.origin()?;
    let extractor = Extractor::new(
        &config.profiles,
        LinkResolver::new(&origin, config.keep_query)?,
    )?;
    let db = if dry_run { None } else { Some(open_db(config)?) };
    let session = SessionState::load(&config.session_path)?;
    if !session.is_authenticated() {
        tracing::warn!("No saved session; run `trawl login` if the page requires sign-in");
    }

    let target = Target {
        url: search_url,
        origin: &origin,
        wait_timeout: config.wait_timeout,
        settle: config.settle,
        snapshot_dir: config.snapshot_dir.as_deref(),
    };

    let mut page = WebDriverPage::connect(&config.webdriver_url, config.headless && !headed).await?;
    let outcome = ingest::run(&mut page, &target, &extractor, db.as_ref(), session).await;
    if let Err(e) = page.quit().await {
        tracing::debug!("Browser did not shut down cleanly: {}", e);
    }
    if let Err(e) = &outcome {
        if e.is_transient() {
            tracing::warn!("Nothing was stored; re-run the fetch once the page is reachable");
        }
    }
    let report = outcome.context("Ingestion run failed")?;

    let extraction = &report.extraction;
    println!(
        "Extracted {} listings via profile {} ({} cards skipped)",
        extraction.listings.len(),
        extraction.profile.as_deref().unwrap_or("-"),
        extraction.skipped_cards
    );

    match (report.stats, &db) {
        (Some(stats), Some(db)) => {
            report.session.save(&config.session_path)?;
            println!("  New:       {}", stats.inserted);
            println!("  Duplicate: {}", stats.skipped);

            if filter {
                let triage = triage::run(db, &config.keywords)?;
                println!("  Curated:   {}", triage.admitted);
            }
        }
        _ => {
            for listing in &extraction.listings {
                println!(
                    "[DRY RUN] {} | {} | {} | {}",
                    listing.title, listing.company, listing.location, listing.link
                );
            }
            println!("\n(Dry run - nothing was stored)");
        }
    }

    Ok(())
}

/// `RUST_LOG` when set, `trawl=info` otherwise. `--verbose` forces debug.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("trawl=debug");
    }
    match rust_log.filter(|s| !s.trim().is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new("trawl=info"),
    }
}

fn open_db(config: &Config) -> Result<Database> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    db.ensure_schema()?;
    Ok(db)
}

fn print_listings(listings: &[StoredListing], limit: Option<usize>, empty: &str) {
    if listings.is_empty() {
        println!("{}", empty);
        return;
    }

    let start = limit.map_or(0, |n| listings.len().saturating_sub(n));
    println!(
        "{:<6} {:<36} {:<20} {:<20} {:<20}",
        "ID", "TITLE", "COMPANY", "LOCATION", "FETCHED"
    );
    println!("{}", "-".repeat(106));
    for listing in &listings[start..] {
        println!(
            "{:<6} {:<36} {:<20} {:<20} {:<20}",
            listing.id,
            truncate(&listing.title, 34),
            truncate(&listing.company, 18),
            truncate(&listing.location, 18),
            truncate(&listing.fetched_at, 20)
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
