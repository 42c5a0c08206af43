use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::base;
use super::VenueScraper;
use crate::config::ListingConfig;
use crate::models::{RawFragment, Venue};

/// Text handed to the extractor per card is capped to keep prompts small.
const MAX_CARD_TEXT: usize = 2000;

/// Scrapes an HTML event listing where each event is one card element.
/// Cards become text fragments for the extractor.
pub struct ListingScraper {
    venue: Venue,
    listing: ListingConfig,
}

impl ListingScraper {
    pub fn new(venue: Venue, listing: ListingConfig) -> Self {
        Self { venue, listing }
    }

    pub(crate) fn parse_document(&self, html: &str) -> Result<Vec<RawFragment>> {
        let card_selector = parse_selector(&self.listing.card_selector)?;
        let link_selector = parse_selector(self.listing.link_selector.as_deref().unwrap_or("a[href]"))?;
        let image_selector = parse_selector(self.listing.image_selector.as_deref().unwrap_or("img"))?;

        let document = Html::parse_document(html);
        let mut fragments = Vec::new();

        for card in document.select(&card_selector) {
            let text = base::inner_text(card);
            if text.is_empty() {
                continue;
            }
            let text: String = text.chars().take(MAX_CARD_TEXT).collect();

            let link = base::absolute_url(
                &self.listing.url,
                base::first_attr(&card, &link_selector, "href"),
            )
            .unwrap_or_else(|| self.listing.url.clone());
            let image = card
                .select(&image_selector)
                .next()
                .and_then(base::image_source)
                .and_then(|src| base::absolute_url(&self.listing.url, Some(src)));

            fragments.push(
                RawFragment::new(self.venue, link)
                    .with_image(image)
                    .with_text(Some(text)),
            );
        }

        Ok(fragments)
    }
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|err| anyhow!("invalid selector {raw:?}: {err}"))
}

#[async_trait]
impl VenueScraper for ListingScraper {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn venue_url(&self) -> &str {
        &self.listing.url
    }

    async fn fetch(&self) -> Result<Vec<RawFragment>> {
        let html = base::fetch_html(&self.listing.url).await?;
        self.parse_document(&html)
    }
}
