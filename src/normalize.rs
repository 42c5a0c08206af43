use chrono::NaiveDate;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::dates;
use crate::extract::{truncate_chars, Extraction};
use crate::models::{Event, RawFragment, Venue};

pub const DESCRIPTION_MAX_CHARS: usize = 300;
const DEFAULT_GENRE: &str = "music";

static SIZE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[-_]\d+x\d+$").expect("size suffix regex"));
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_+.]+|%20").expect("separator regex"));

/// Path segments that name a section of a site rather than an event.
const GENERIC_SEGMENTS: [&str; 6] = ["event", "events", "calendar", "shows", "index", "details"];

/// Builds a complete [`Event`] from whatever the extractor produced. Never
/// fails: every absent field gets a default.
///
/// `index` is the fragment's 1-based position within its venue batch and only
/// shows up in placeholder titles.
pub fn normalize(
    extraction: Extraction,
    fragment: &RawFragment,
    index: usize,
    today: NaiveDate,
    tz: Tz,
) -> Event {
    let venue = fragment.venue;
    let title = extraction
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| derive_title(fragment))
        .unwrap_or_else(|| placeholder_title(venue, index));

    let description = describe(extraction.description, &extraction.performers, &title, venue);

    Event {
        id: Uuid::new_v4().to_string(),
        venue,
        date: extraction
            .date
            .unwrap_or_else(|| dates::start_of_day(today, tz)),
        time: extraction
            .time
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| venue.default_time().to_string()),
        description,
        link: fragment.link.clone(),
        image_url: fragment.image_url.clone(),
        tags: None,
        price: extraction.price,
        genres: Some(
            extraction
                .genres
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_GENRE.to_string()]),
        ),
        vibe: Some(if extraction.vibes.is_empty() {
            venue.default_vibes().to_vec()
        } else {
            extraction.vibes
        }),
        title,
    }
}

pub fn placeholder_title(venue: Venue, index: usize) -> String {
    format!("Event at {} #{}", venue.name(), index)
}

/// A readable title from the flyer's file name, else from the link's last
/// path segment.
pub fn derive_title(fragment: &RawFragment) -> Option<String> {
    fragment
        .image_url
        .as_deref()
        .and_then(|url| slug_title(url, true))
        .or_else(|| slug_title(&fragment.link, false))
}

fn slug_title(url: &str, is_file: bool) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_host, route) = without_scheme.split_once('/')?;
    let segment = route
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())?;

    let mut stem = segment;
    if is_file {
        if let Some((name, _ext)) = segment.rsplit_once('.') {
            stem = name;
        }
    }
    let stem = SIZE_SUFFIX_RE.replace(stem, "");
    if GENERIC_SEGMENTS.contains(&stem.to_ascii_lowercase().as_str()) {
        return None;
    }

    let words: Vec<String> = SEPARATOR_RE
        .split(&stem)
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();
    let title = words.join(" ");
    if title.chars().any(char::is_alphabetic) {
        Some(title)
    } else {
        None
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn describe(description: Option<String>, performers: &[String], title: &str, venue: Venue) -> String {
    let mut text = description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Join us for {} at {}.", title, venue.name()));

    if !performers.is_empty() {
        if !text.ends_with(['.', '!', '?']) {
            text.push('.');
        }
        text.push_str(&format!(" Featuring: {}.", performers.join(", ")));
    }

    truncate_chars(&text, DESCRIPTION_MAX_CHARS - 3)
}
