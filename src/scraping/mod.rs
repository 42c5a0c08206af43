pub mod base;
pub mod listing;
pub mod lux_lounge;
pub mod placeholder;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::models::{RawFragment, Venue};

/// Fetches one venue's raw event fragments.
#[async_trait]
pub trait VenueScraper: Send + Sync {
    fn venue(&self) -> Venue;
    fn venue_url(&self) -> &str;
    /// Whether the adapter actually scrapes, as opposed to a null stub.
    fn is_live(&self) -> bool {
        true
    }
    async fn fetch(&self) -> anyhow::Result<Vec<RawFragment>>;
}

#[derive(Clone, Debug, Serialize)]
pub struct ScraperInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub live: bool,
}

/// What one adapter produced; a failed adapter yields no fragments.
#[derive(Debug)]
pub struct Harvest {
    pub venue: Venue,
    pub fragments: Vec<RawFragment>,
    pub error: Option<String>,
}

impl Harvest {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

pub fn active_scrapers(config: &AppConfig) -> Vec<Arc<dyn VenueScraper>> {
    Venue::ALL
        .into_iter()
        .map(|venue| -> Arc<dyn VenueScraper> {
            if venue == Venue::LuxLounge {
                return Arc::new(lux_lounge::LuxLounge);
            }
            match config.listing_for(venue) {
                Some(listing) => Arc::new(listing::ListingScraper::new(venue, listing.clone())),
                None => Arc::new(placeholder::Placeholder::new(venue)),
            }
        })
        .collect()
}

pub fn list_scrapers(config: &AppConfig) -> Vec<ScraperInfo> {
    active_scrapers(config)
        .into_iter()
        .map(|scraper| ScraperInfo {
            id: scraper.venue().id().to_string(),
            name: scraper.venue().name().to_string(),
            url: scraper.venue_url().to_string(),
            live: scraper.is_live(),
        })
        .collect()
}

pub fn find_scraper(config: &AppConfig, id: &str) -> Option<Arc<dyn VenueScraper>> {
    active_scrapers(config)
        .into_iter()
        .find(|scraper| scraper.venue().id() == id)
}

pub async fn harvest(scraper: &dyn VenueScraper) -> Harvest {
    let venue = scraper.venue();
    match scraper.fetch().await {
        Ok(fragments) => {
            info!(venue = %venue, fragments = fragments.len(), "scraped venue");
            Harvest {
                venue,
                fragments,
                error: None,
            }
        }
        Err(err) => {
            warn!(venue = %venue, error = %format!("{err:#}"), "venue scrape failed");
            Harvest {
                venue,
                fragments: Vec::new(),
                error: Some(format!("{err:#}")),
            }
        }
    }
}

/// Runs every adapter concurrently and settles all of them; one venue's
/// failure never cancels or hides another's fragments.
pub async fn run_all(scrapers: &[Arc<dyn VenueScraper>]) -> Vec<Harvest> {
    join_all(scrapers.iter().map(|scraper| harvest(scraper.as_ref()))).await
}
