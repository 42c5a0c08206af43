//! Reconciles freshly normalized events with the persisted set.
//!
//! Existing records are never rewritten: when a new event shares the
//! `(title, venue, date)` key of a carried-forward one, the new copy is
//! skipped so the stored `id` (and any likes keyed on it) survives.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::dates;
use crate::models::{Event, Venue};

pub type IdentityKey = (String, Venue, DateTime<Utc>);

pub fn identity_key(event: &Event) -> IdentityKey {
    (event.title.clone(), event.venue, event.date)
}

/// An event is past once its local calendar day is before `today`. The
/// comparison is by day, not by the instant of the merge, so an event dated
/// earlier today (including a same-day placeholder date) is still current.
pub fn is_past(event: &Event, today: NaiveDate, tz: Tz) -> bool {
    dates::local_day(&event.date, tz) < today
}

/// Current and future `existing` events first, in their stored order, then
/// every `new` event whose key has not been seen yet.
pub fn merge(existing: Vec<Event>, new: Vec<Event>, today: NaiveDate, tz: Tz) -> Vec<Event> {
    let mut seen: HashSet<IdentityKey> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + new.len());

    for event in existing {
        if is_past(&event, today, tz) {
            continue;
        }
        seen.insert(identity_key(&event));
        merged.push(event);
    }

    for event in new {
        if seen.insert(identity_key(&event)) {
            merged.push(event);
        }
    }

    merged
}
