use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dates;
use crate::models::Event;
use crate::pipeline::{EventSource, PipelineError};
use crate::store::EventStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no events available: {0}")]
    Unavailable(#[source] PipelineError),
}

#[derive(Default)]
struct CacheState {
    events: Vec<Event>,
    fetched_at: Option<Instant>,
    has_data: bool,
    warmed: bool,
}

/// Time-bounded cache in front of the pipeline, owned by the serving layer.
///
/// Starts empty. The first read seeds it from the event store; later reads
/// run the pipeline only once the TTL has lapsed or a refresh is forced. A
/// failed refresh serves the last good set when there is one.
pub struct EventCache {
    source: Arc<dyn EventSource>,
    store: EventStore,
    ttl: Duration,
    tz: Tz,
    state: Mutex<CacheState>,
}

impl EventCache {
    pub fn new(source: Arc<dyn EventSource>, store: EventStore, ttl: Duration, tz: Tz) -> Self {
        Self {
            source,
            store,
            ttl,
            tz,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Today-or-future events, refreshed through the pipeline when stale or
    /// when `force_refresh` is set.
    pub async fn get(&self, force_refresh: bool) -> Result<Vec<Event>, CacheError> {
        if !force_refresh {
            if let Some(events) = self.fresh() {
                debug!(events = events.len(), "serving cached events");
                return Ok(self.upcoming(events));
            }
            if self.needs_warm_start() {
                if let Some(events) = self.warm_start().await {
                    return Ok(self.upcoming(events));
                }
            }
        }

        match self.source.refresh().await {
            Ok(events) => {
                let mut state = self.lock();
                state.events = events.clone();
                state.fetched_at = Some(Instant::now());
                state.has_data = true;
                state.warmed = true;
                drop(state);
                Ok(self.upcoming(events))
            }
            Err(err) => self.fallback(err).await,
        }
    }

    /// Marks the cached set stale. It is still kept as the fallback.
    pub fn invalidate(&self) {
        self.lock().fetched_at = None;
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fresh(&self) -> Option<Vec<Event>> {
        let state = self.lock();
        match state.fetched_at {
            Some(at) if at.elapsed() < self.ttl => Some(state.events.clone()),
            _ => None,
        }
    }

    fn needs_warm_start(&self) -> bool {
        !self.lock().warmed
    }

    async fn warm_start(&self) -> Option<Vec<Event>> {
        let events = self.load_persisted().await;
        let mut state = self.lock();
        state.warmed = true;
        if events.is_empty() {
            return None;
        }
        info!(events = events.len(), "seeded cache from event store");
        state.events = events.clone();
        state.fetched_at = Some(Instant::now());
        state.has_data = true;
        Some(events)
    }

    async fn fallback(&self, err: PipelineError) -> Result<Vec<Event>, CacheError> {
        let cached = {
            let state = self.lock();
            state.has_data.then(|| state.events.clone())
        };
        if let Some(events) = cached {
            warn!(error = %err, events = events.len(), "refresh failed, serving last good events");
            return Ok(self.upcoming(events));
        }

        let persisted = self.load_persisted().await;
        if !persisted.is_empty() {
            warn!(error = %err, events = persisted.len(), "refresh failed, serving stored events");
            let mut state = self.lock();
            state.events = persisted.clone();
            state.has_data = true;
            state.warmed = true;
            drop(state);
            return Ok(self.upcoming(persisted));
        }

        Err(CacheError::Unavailable(err))
    }

    async fn load_persisted(&self) -> Vec<Event> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                warn!(error = %err, "could not read event store");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "event store task failed");
                Vec::new()
            }
        }
    }

    fn upcoming(&self, events: Vec<Event>) -> Vec<Event> {
        filter_upcoming(events, dates::today_in(self.tz), self.tz)
    }
}

/// Keeps events whose local calendar day is `today` or later.
pub fn filter_upcoming(events: Vec<Event>, today: NaiveDate, tz: Tz) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| dates::local_day(&event.date, tz) >= today)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Venue;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TZ: Tz = chrono_tz::America::New_York;

    fn event(id: &str, year: i32) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Show {id}"),
            venue: Venue::BugJar,
            date: Utc.with_ymd_and_hms(year, 6, 1, 23, 0, 0).unwrap(),
            time: "7:00 PM".to_string(),
            description: "A show.".to_string(),
            link: "https://bugjar.com/".to_string(),
            image_url: None,
            tags: None,
            price: None,
            genres: None,
            vibe: None,
        }
    }

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
        events: Vec<Event>,
    }

    impl Counting {
        fn serving(events: Vec<Event>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                events,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
                events: Vec::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for Counting {
        async fn refresh(&self) -> Result<Vec<Event>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::AllVenuesFailed(1))
            } else {
                Ok(self.events.clone())
            }
        }
    }

    fn cache(source: Arc<Counting>, dir: &tempfile::TempDir, ttl: Duration) -> EventCache {
        EventCache::new(source, EventStore::new(dir.path().join("events.json")), ttl, TZ)
    }

    #[tokio::test]
    async fn serves_from_memory_until_forced() {
        let dir = tempfile::tempdir().unwrap();
        let source = Counting::serving(vec![event("a", 2090)]);
        let cache = cache(source.clone(), &dir, Duration::from_secs(3600));

        assert_eq!(cache.get(false).await.unwrap().len(), 1);
        assert_eq!(cache.get(false).await.unwrap().len(), 1);
        assert_eq!(source.calls(), 1);

        cache.get(true).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn expiry_and_invalidation_trigger_a_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let source = Counting::serving(vec![event("a", 2090)]);
        let expired = cache(source.clone(), &dir, Duration::ZERO);
        expired.get(false).await.unwrap();
        expired.get(false).await.unwrap();
        assert_eq!(source.calls(), 2);

        let source = Counting::serving(vec![event("a", 2090)]);
        let cache = cache(source.clone(), &dir, Duration::from_secs(3600));
        cache.get(false).await.unwrap();
        cache.invalidate();
        cache.get(false).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn past_events_are_filtered_out() {
        let dir = tempfile::tempdir().unwrap();
        let source = Counting::serving(vec![event("old", 2001), event("new", 2090)]);
        let cache = cache(source, &dir, Duration::from_secs(3600));
        let served = cache.get(false).await.unwrap();
        assert_eq!(served.len(), 1);
        assert_eq!(served[0].id, "new");
    }

    #[tokio::test]
    async fn warm_start_reads_the_store_without_scraping() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.json"));
        store.save(&[event("stored", 2090)]).unwrap();

        let source = Counting::serving(vec![event("scraped", 2090)]);
        let cache = cache(source.clone(), &dir, Duration::from_secs(3600));
        assert_eq!(cache.get(false).await.unwrap()[0].id, "stored");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_the_last_good_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.json"));
        store.save(&[event("stored", 2090)]).unwrap();

        let source = Counting::failing();
        let cache = cache(source.clone(), &dir, Duration::from_secs(3600));
        let served = cache.get(true).await.unwrap();
        assert_eq!(served[0].id, "stored");

        std::fs::remove_file(store.path()).unwrap();
        let served = cache.get(true).await.unwrap();
        assert_eq!(served[0].id, "stored");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failure_with_nothing_to_fall_back_on_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(Counting::failing(), &dir, Duration::from_secs(3600));
        assert!(matches!(
            cache.get(false).await,
            Err(CacheError::Unavailable(PipelineError::AllVenuesFailed(1)))
        ));
    }

    #[test]
    fn upcoming_compares_calendar_days_in_the_zone() {
        let today = chrono::NaiveDate::from_ymd_opt(2030, 4, 10).unwrap();
        let mut late_yesterday = event("y", 2030);
        // 03:30 UTC on the 10th is 23:30 on the 9th in New York
        late_yesterday.date = Utc.with_ymd_and_hms(2030, 4, 10, 3, 30, 0).unwrap();
        let mut early_today = event("t", 2030);
        early_today.date = Utc.with_ymd_and_hms(2030, 4, 10, 4, 30, 0).unwrap();

        let kept = filter_upcoming(vec![late_yesterday, early_today], today, TZ);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "t");
    }
}
