use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::VenueScraper;
use crate::models::{RawFragment, Venue};

/// Null adapter for venues whose pages are not scraped yet.
pub struct Placeholder {
    venue: Venue,
}

impl Placeholder {
    pub fn new(venue: Venue) -> Self {
        Self { venue }
    }
}

#[async_trait]
impl VenueScraper for Placeholder {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn venue_url(&self) -> &str {
        self.venue.website()
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<Vec<RawFragment>> {
        debug!(venue = %self.venue, "no scraping logic for venue");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_nothing_without_error() {
        let stub = Placeholder::new(Venue::RadioSocial);
        assert!(stub.fetch().await.unwrap().is_empty());
        assert!(!stub.is_live());
        assert_eq!(stub.venue_url(), "https://radio-social.com/");
    }
}
