use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration};
use night_scrape::llm::{ModelClient, ModelError, ModelRequest};
use night_scrape::scraping::VenueScraper;
use night_scrape::{dates, EventStore, Extractor, Pipeline, RawFragment, Venue, Vibe};

const TZ: chrono_tz::Tz = chrono_tz::America::New_York;

/// Answers for Radio Social, refuses everything else.
struct PickyModel {
    reply: String,
}

#[async_trait]
impl ModelClient for PickyModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        if request.prompt.contains("Radio Social") {
            Ok(self.reply.clone())
        } else {
            Err(ModelError::Unavailable("request timed out".to_string()))
        }
    }
}

struct OneListing {
    venue: Venue,
    link: &'static str,
    text: &'static str,
}

#[async_trait]
impl VenueScraper for OneListing {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn venue_url(&self) -> &str {
        self.venue.website()
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawFragment>> {
        Ok(vec![
            RawFragment::new(self.venue, self.link).with_text(Some(self.text.to_string()))
        ])
    }
}

fn pipeline(store: EventStore) -> Pipeline {
    let next_week = dates::today_in(TZ) + Duration::days(7);
    let reply = format!(
        r#"Here is the event:
{{"title": "Vinyl Night", "date": "{}-{:02}-{:02}", "time": "9:00 PM",
  "description": "Crate diggers spin all night.", "genres": ["soul", "funk"],
  "vibes": ["DANCING", "bogus", "Drinking"]}}"#,
        next_week.year(),
        next_week.month(),
        next_week.day()
    );
    let extractor = Extractor::new(Arc::new(PickyModel { reply }), TZ, 1000);

    let scrapers: Vec<Arc<dyn VenueScraper>> = vec![
        Arc::new(OneListing {
            venue: Venue::BugJar,
            link: "https://bugjar.com/e/7731",
            text: "Doors 8pm, all ages",
        }),
        Arc::new(OneListing {
            venue: Venue::RadioSocial,
            link: "https://radiosocial.com/e/9001",
            text: "Vinyl Night with resident DJs",
        }),
    ];
    Pipeline::new(scrapers, Arc::new(extractor), store, TZ)
}

#[tokio::test]
async fn two_runs_over_the_same_listings_store_two_stable_events() {
    let dir = tempfile::tempdir().unwrap();
    let store = EventStore::new(dir.path().join("events.json"));

    let first = pipeline(store.clone()).run().await.unwrap();
    assert_eq!(first.events.len(), 2);
    assert_eq!(first.added, 2);

    let defaulted = first
        .events
        .iter()
        .find(|e| e.venue == Venue::BugJar)
        .unwrap();
    assert_eq!(defaulted.title, "Event at Bug Jar #1");
    assert_eq!(defaulted.genres, Some(vec!["music".to_string()]));
    assert_eq!(defaulted.vibe.as_deref(), Some(Venue::BugJar.default_vibes()));
    assert_eq!(defaulted.time, Venue::BugJar.default_time());
    assert_eq!(dates::local_day(&defaulted.date, TZ), dates::today_in(TZ));

    let extracted = first
        .events
        .iter()
        .find(|e| e.venue == Venue::RadioSocial)
        .unwrap();
    assert_eq!(extracted.title, "Vinyl Night");
    assert_eq!(extracted.vibe, Some(vec![Vibe::Dancing, Vibe::Drinking]));
    assert_eq!(
        extracted.genres,
        Some(vec!["soul".to_string(), "funk".to_string()])
    );

    let second = pipeline(store.clone()).run().await.unwrap();
    assert_eq!(second.events.len(), 2);
    assert_eq!(second.added, 0);

    let ids = |events: &[night_scrape::Event]| events.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first.events), ids(&second.events));
    assert_eq!(store.load().unwrap(), second.events);
}
