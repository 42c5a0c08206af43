use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::base;
use super::VenueScraper;
use crate::models::{RawFragment, Venue};

const URL: &str = "https://lux666.com/";
const LINK_LABEL: &str = "more details";
const EVENT_PAGE_MARKER: &str = "facebook.com/events/";

/// The "Upcoming Shows" row, tried first.
static SECTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".et_pb_row_9, .et_pb_row_4col").expect("lux section selector"));
/// Wider net for when the page builder renumbers its rows.
static BROAD_SECTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".et_pb_row_4col, .et_pb_section_3").expect("lux broad section selector")
});
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("lux link selector"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("lux img"));
static EVENT_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="event-description-value"]"#)
        .expect("event description selector")
});
static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:description"]"#).expect("og description selector")
});

/// Lux publishes its one-off shows only as flyer images, each paired with a
/// "More Details" link.
pub struct LuxLounge;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlyerLink {
    pub link: String,
    pub image_url: Option<String>,
}

#[async_trait]
impl VenueScraper for LuxLounge {
    fn venue(&self) -> Venue {
        Venue::LuxLounge
    }

    fn venue_url(&self) -> &str {
        URL
    }

    async fn fetch(&self) -> Result<Vec<RawFragment>> {
        let html = base::fetch_html(URL).await?;
        let flyers = self.parse_document(&html);
        info!(flyers = flyers.len(), "found lux flyer links");

        let fragments = join_all(flyers.into_iter().map(|flyer| async move {
            let text = if is_event_page(&flyer.link) {
                fetch_event_description(&flyer.link).await
            } else {
                None
            };
            RawFragment::new(Venue::LuxLounge, flyer.link)
                .with_image(flyer.image_url)
                .with_text(text)
        }))
        .await;

        Ok(fragments)
    }
}

impl LuxLounge {
    pub(crate) fn parse_document(&self, html: &str) -> Vec<FlyerLink> {
        let document = Html::parse_document(html);

        let flyers = collect_flyers(&document, &SECTION_SELECTOR);
        if !flyers.is_empty() {
            return flyers;
        }
        debug!("no flyer links in the upcoming shows row, widening search");
        collect_flyers(&document, &BROAD_SECTION_SELECTOR)
    }
}

fn collect_flyers(document: &Html, sections: &Selector) -> Vec<FlyerLink> {
    let mut seen = Vec::new();
    let mut flyers = Vec::new();

    for section in document.select(sections) {
        for anchor in section.select(&LINK_SELECTOR) {
            if seen.contains(&anchor.id()) {
                continue;
            }
            seen.push(anchor.id());

            if !base::inner_text(anchor).to_lowercase().contains(LINK_LABEL) {
                continue;
            }
            let link = match base::absolute_url(URL, anchor.value().attr("href").map(str::to_string)) {
                Some(link) => link,
                None => continue,
            };
            let image_url = nearest_image(anchor).and_then(|src| base::absolute_url(URL, Some(src)));
            if image_url.is_none() {
                debug!(link = %link, "no flyer image near link");
            }
            flyers.push(FlyerLink { link, image_url });
        }
    }

    flyers
}

/// Searches the link's containing block, then that block's siblings from the
/// closest outward.
fn nearest_image(anchor: ElementRef<'_>) -> Option<String> {
    let block = containing_block(anchor)?;
    if let Some(src) = block.select(&IMG_SELECTOR).find_map(base::image_source) {
        return Some(src);
    }

    let following: Vec<ElementRef<'_>> = block.next_siblings().filter_map(ElementRef::wrap).collect();
    let preceding: Vec<ElementRef<'_>> = block.prev_siblings().filter_map(ElementRef::wrap).collect();
    let depth = following.len().max(preceding.len());

    for distance in 0..depth {
        for sibling in [following.get(distance), preceding.get(distance)].into_iter().flatten() {
            if let Some(src) = image_in(*sibling) {
                return Some(src);
            }
        }
    }
    None
}

fn image_in(element: ElementRef<'_>) -> Option<String> {
    if element.value().name() == "img" {
        return base::image_source(element);
    }
    element.select(&IMG_SELECTOR).find_map(base::image_source)
}

fn containing_block(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let ancestors: Vec<ElementRef<'_>> = anchor.ancestors().filter_map(ElementRef::wrap).collect();
    if let Some(column) = ancestors.iter().find(|el| base::has_class(el, "et_pb_column")) {
        return Some(*column);
    }
    // Outside a column the module's parent groups the flyer with its button.
    if let Some(position) = ancestors.iter().position(|el| base::has_class(el, "et_pb_module")) {
        if let Some(parent) = ancestors.get(position + 1) {
            return Some(*parent);
        }
    }
    ancestors.first().copied()
}

fn is_event_page(link: &str) -> bool {
    link.contains(EVENT_PAGE_MARKER)
}

async fn fetch_event_description(link: &str) -> Option<String> {
    match base::fetch_html(link).await {
        Ok(html) => {
            let description = extract_event_description(&html);
            if let Some(ref text) = description {
                debug!(link = %link, chars = text.len(), "event page description");
            }
            description
        }
        Err(err) => {
            warn!(link = %link, error = %format!("{err:#}"), "event page fetch failed");
            None
        }
    }
}

/// Structured description field first, then the open-graph summary.
pub(crate) fn extract_event_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    base::first_text(&root, &EVENT_DESCRIPTION_SELECTOR).or_else(|| {
        base::first_attr(&root, &OG_DESCRIPTION_SELECTOR, "content")
            .map(|content| crate::dates::clean_text(&content))
            .filter(|content| !content.is_empty())
    })
}
