use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use night_scrape::likes::{LikeAction, LikesStore};
use night_scrape::{dates, logging, schedule, scraping, utils};
use night_scrape::{AppConfig, EventCache, EventStore, Pipeline};

#[derive(Parser)]
#[command(name = "night-scrape")]
#[command(about = "Rochester nightlife event aggregator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every venue, extract, merge and write the event store
    Update {
        /// Stay resident and run every Wednesday at 01:00 local time
        #[arg(long)]
        cron: bool,
    },
    /// Print today-or-future events as served by the cache
    Events {
        /// Run the pipeline instead of serving stored events
        #[arg(long)]
        refresh: bool,
    },
    /// like | unlike | boost | unboost <event-id>, or show [event-id]
    Likes {
        action: String,
        event_id: Option<String>,
    },
    /// Repair the event store in place
    Validate,
    /// List venues and whether they are scraped
    Venues,
    /// Fetch raw fragments without extraction or writing
    Scrape {
        /// Venue id, e.g. lux-lounge
        #[arg(long)]
        venue: Option<String>,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to config.json in the data directory
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;
    let tz = config.tz()?;

    match cli.command {
        Commands::Update { cron } => {
            let pipeline = Pipeline::from_config(&config)?;
            if cron {
                schedule::run_weekly(&pipeline, tz).await;
            } else {
                let report = pipeline.run().await?;
                println!(
                    "{} events stored ({} new, {} fragments scraped, {} venues failed)",
                    report.events.len(),
                    report.added,
                    report.scraped,
                    report.failed_venues.len()
                );
            }
        }
        Commands::Events { refresh } => {
            let pipeline = Arc::new(Pipeline::from_config(&config)?);
            let store = pipeline.store().clone();
            let cache = EventCache::new(pipeline, store, config.cache_ttl(), tz);
            let events = cache.get(refresh).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Commands::Likes { action, event_id } => {
            let likes = LikesStore::open_default();
            if action.eq_ignore_ascii_case("show") {
                let records = match event_id {
                    Some(id) => vec![likes.get(&id)?],
                    None => likes.all()?,
                };
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let action: LikeAction = action.parse()?;
                let Some(id) = event_id else {
                    bail!("an event id is required");
                };
                let record = likes.apply(&id, action)?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }
        Commands::Validate => {
            let store = EventStore::open_default();
            let report = store.repair(dates::today_in(tz), tz)?;
            println!("{} events checked in {}", report.total, store.path().display());
            println!("  repaired: {}", report.repaired);
            println!("  dropped:  {}", report.dropped);
            for (venue, count) in &report.by_venue {
                println!("  {venue}: {count}");
            }
            if let Some(backup) = &report.backup {
                println!("  backup:   {}", backup.display());
            }
            if !report.written {
                println!("  no changes written");
            }
        }
        Commands::Venues => {
            for info in scraping::list_scrapers(&config) {
                let status = if info.live { "live" } else { "placeholder" };
                println!("{:<20} {:<22} {:<12} {}", info.id, info.name, status, info.url);
            }
        }
        Commands::Scrape { venue } => {
            let scrapers = match venue {
                Some(id) => match scraping::find_scraper(&config, &id) {
                    Some(scraper) => vec![scraper],
                    None => bail!("unknown venue: {id}"),
                },
                None => scraping::active_scrapers(&config),
            };
            for harvest in scraping::run_all(&scrapers).await {
                if let Some(err) = &harvest.error {
                    println!("{}: failed: {err}", harvest.venue);
                    continue;
                }
                println!("{}: {} fragments", harvest.venue, harvest.fragments.len());
                for fragment in &harvest.fragments {
                    println!("  link:  {}", fragment.link);
                    println!("  image: {}", fragment.image_url.as_deref().unwrap_or("-"));
                    if let Some(text) = &fragment.text {
                        println!("  text:  {}", text.chars().take(120).collect::<String>());
                    }
                }
            }
        }
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config.save()?;
                info!(path = %utils::config_path().display(), "wrote configuration");
            }
        }
    }

    Ok(())
}
