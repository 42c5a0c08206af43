use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::dates;
use crate::extract::Extractor;
use crate::llm::{ChatCompletionsClient, ModelError};
use crate::merge;
use crate::models::{Event, RawFragment, Venue};
use crate::normalize;
use crate::scraping::{self, Harvest, VenueScraper};
use crate::store::{EventStore, StoreError};

/// Model calls in flight per venue.
const FRAGMENT_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("all {0} venue scrapers failed")]
    AllVenuesFailed(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Anything that can produce a fresh event set on demand.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn refresh(&self) -> Result<Vec<Event>, PipelineError>;
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub events: Vec<Event>,
    pub scraped: usize,
    pub added: usize,
    pub failed_venues: Vec<Venue>,
}

pub struct Pipeline {
    scrapers: Vec<Arc<dyn VenueScraper>>,
    extractor: Arc<Extractor>,
    store: EventStore,
    tz: Tz,
}

impl Pipeline {
    pub fn new(
        scrapers: Vec<Arc<dyn VenueScraper>>,
        extractor: Arc<Extractor>,
        store: EventStore,
        tz: Tz,
    ) -> Self {
        Self {
            scrapers,
            extractor,
            store,
            tz,
        }
    }

    /// Every configured venue, the chat-completions model and the default store.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let tz = config.tz()?;
        let model = ChatCompletionsClient::from_config(&config.llm)?;
        let extractor = Extractor::new(Arc::new(model), tz, config.image_max_dimension);
        Ok(Self::new(
            scraping::active_scrapers(config),
            Arc::new(extractor),
            EventStore::open_default(),
            tz,
        ))
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Scrape every venue, extract and normalize each fragment, merge with the
    /// stored set and write it back.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let today = dates::today_in(self.tz);
        let harvests = scraping::run_all(&self.scrapers).await;

        let failed_venues: Vec<Venue> = harvests
            .iter()
            .filter(|h| h.failed())
            .map(|h| h.venue)
            .collect();
        if !harvests.is_empty() && failed_venues.len() == harvests.len() {
            return Err(PipelineError::AllVenuesFailed(harvests.len()));
        }

        let batches = join_all(
            harvests
                .into_iter()
                .filter(|h| !h.failed())
                .map(|harvest| self.process_harvest(harvest, today)),
        )
        .await;
        let fresh: Vec<Event> = batches.into_iter().flatten().collect();
        let scraped = fresh.len();

        let store = self.store.clone();
        let existing = tokio::task::spawn_blocking(move || store.load()).await??;
        let existing_count = existing.len();

        let merged = merge::merge(existing, fresh, today, self.tz);
        let added = merged.len().saturating_sub(existing_count);

        let store = self.store.clone();
        let to_write = merged.clone();
        tokio::task::spawn_blocking(move || store.save(&to_write)).await??;

        info!(
            scraped,
            added,
            total = merged.len(),
            failed = failed_venues.len(),
            "pipeline run complete"
        );
        Ok(RunReport {
            events: merged,
            scraped,
            added,
            failed_venues,
        })
    }

    async fn process_harvest(&self, harvest: Harvest, today: NaiveDate) -> Vec<Event> {
        let venue = harvest.venue;
        let events: Vec<Event> = stream::iter(harvest.fragments.into_iter().enumerate())
            .map(|(i, fragment)| self.process_fragment(fragment, i + 1, today))
            .buffered(FRAGMENT_CONCURRENCY)
            .collect()
            .await;
        info!(venue = %venue, events = events.len(), "normalized venue batch");
        events
    }

    async fn process_fragment(&self, fragment: RawFragment, index: usize, today: NaiveDate) -> Event {
        let mut extraction = self.extractor.extract(&fragment).await;

        if extraction.description.is_none() {
            if let Some(text) = fragment.text.as_deref() {
                extraction.description = self.extractor.summarize(text).await;
            }
        }
        if extraction.is_empty() {
            warn!(venue = %fragment.venue, link = %fragment.link, "no fields extracted, using defaults");
        }

        normalize::normalize(extraction, &fragment, index, today, self.tz)
    }
}

#[async_trait]
impl EventSource for Pipeline {
    async fn refresh(&self) -> Result<Vec<Event>, PipelineError> {
        self.run().await.map(|report| report.events)
    }
}
