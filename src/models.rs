use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized listing as persisted in the event store and served to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub venue: Venue,
    pub date: DateTime<Utc>,
    pub time: String,
    pub description: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<Vec<Vibe>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Venue {
    LuxLounge,
    FlourCityStation,
    BugJar,
    MontageMusicHall,
    PhotoCity,
    RadioSocial,
}

impl Venue {
    pub const ALL: [Venue; 6] = [
        Venue::LuxLounge,
        Venue::FlourCityStation,
        Venue::BugJar,
        Venue::MontageMusicHall,
        Venue::PhotoCity,
        Venue::RadioSocial,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Venue::LuxLounge => "lux-lounge",
            Venue::FlourCityStation => "flour-city-station",
            Venue::BugJar => "bug-jar",
            Venue::MontageMusicHall => "montage-music-hall",
            Venue::PhotoCity => "photo-city",
            Venue::RadioSocial => "radio-social",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Venue::LuxLounge => "Lux Lounge",
            Venue::FlourCityStation => "Flour City Station",
            Venue::BugJar => "Bug Jar",
            Venue::MontageMusicHall => "Montage Music Hall",
            Venue::PhotoCity => "Photo City",
            Venue::RadioSocial => "Radio Social",
        }
    }

    pub fn website(self) -> &'static str {
        match self {
            Venue::LuxLounge => "https://lux666.com/",
            Venue::FlourCityStation => "https://flourcitystation.com/",
            Venue::BugJar => "https://bugjar.com/",
            Venue::MontageMusicHall => "https://montagemusichall.com/",
            Venue::PhotoCity => "https://photocityrochester.com/",
            Venue::RadioSocial => "https://radio-social.com/",
        }
    }

    /// Display time used when nothing better was extracted.
    pub fn default_time(self) -> &'static str {
        match self {
            Venue::LuxLounge | Venue::RadioSocial => "9:00 PM",
            Venue::MontageMusicHall => "7:30 PM",
            Venue::FlourCityStation => "7:00 PM",
            Venue::BugJar | Venue::PhotoCity => "8:00 PM",
        }
    }

    pub fn default_vibes(self) -> &'static [Vibe] {
        match self {
            Venue::LuxLounge => &[Vibe::Casual, Vibe::Drinking],
            Venue::RadioSocial => &[Vibe::Dancing, Vibe::Drinking],
            Venue::BugJar => &[Vibe::Listening, Vibe::Drinking],
            Venue::MontageMusicHall => &[Vibe::Listening, Vibe::Watching],
            Venue::FlourCityStation | Venue::PhotoCity => &[Vibe::Listening, Vibe::Casual],
        }
    }

    /// House knowledge handed to the model alongside a flyer.
    pub fn notes(self) -> Option<&'static str> {
        match self {
            Venue::LuxLounge => Some(
                "Lux Lounge is a popular dive bar in Rochester, NY's South Wedge neighborhood at 666 South Ave. \
                 It hosts live music, DJ nights, karaoke and special performances, and is known for the \
                 Pabst Smear special ($3 for a PBR and a shot). Almost all Lux events involve drinking and \
                 the venue is casual.",
            ),
            _ => None,
        }
    }

    pub fn from_id(id: &str) -> Option<Venue> {
        Venue::ALL.into_iter().find(|venue| venue.id() == id)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Vibe {
    Dancing,
    Watching,
    Listening,
    Interactive,
    Dining,
    Drinking,
    Outdoors,
    Casual,
    Formal,
}

const VIBE_TABLE: [(&str, Vibe); 9] = [
    ("dancing", Vibe::Dancing),
    ("watching", Vibe::Watching),
    ("listening", Vibe::Listening),
    ("interactive", Vibe::Interactive),
    ("dining", Vibe::Dining),
    ("drinking", Vibe::Drinking),
    ("outdoors", Vibe::Outdoors),
    ("casual", Vibe::Casual),
    ("formal", Vibe::Formal),
];

impl Vibe {
    /// Case-insensitive match against the closed vibe set.
    pub fn coerce(candidate: &str) -> Option<Vibe> {
        let needle = candidate.trim().to_lowercase();
        VIBE_TABLE
            .iter()
            .find(|(name, _)| *name == needle)
            .map(|(_, vibe)| *vibe)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        VIBE_TABLE.iter().map(|(name, _)| *name)
    }
}

/// Coerces model output into a vibe set, dropping unknown and repeated entries.
pub fn coerce_vibes<'a, I>(candidates: I) -> Vec<Vibe>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for vibe in candidates.into_iter().filter_map(Vibe::coerce) {
        if !out.contains(&vibe) {
            out.push(vibe);
        }
    }
    out
}

/// One unit of scraped data for a venue, before structured extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFragment {
    pub venue: Venue,
    pub link: String,
    /// `None` marks a fragment whose flyer could not be located.
    pub image_url: Option<String>,
    pub text: Option<String>,
}

impl RawFragment {
    pub fn new(venue: Venue, link: impl Into<String>) -> Self {
        Self {
            venue,
            link: link.into(),
            image_url: None,
            text: None,
        }
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn with_text(mut self, text: Option<String>) -> Self {
        self.text = text.filter(|t| !t.trim().is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_vibes_case_insensitively_and_drops_unknown() {
        let vibes = coerce_vibes(["DANCING", "bogus", "Listening"]);
        assert_eq!(vibes, vec![Vibe::Dancing, Vibe::Listening]);
    }

    #[test]
    fn coerce_rejects_near_misses() {
        assert_eq!(Vibe::coerce("  Drinking "), Some(Vibe::Drinking));
        assert_eq!(Vibe::coerce("outdoor"), None);
        assert_eq!(Vibe::coerce(""), None);
    }

    #[test]
    fn repeated_vibes_collapse() {
        let vibes = coerce_vibes(["casual", "CASUAL", "formal"]);
        assert_eq!(vibes, vec![Vibe::Casual, Vibe::Formal]);
    }

    #[test]
    fn venue_ids_round_trip_through_serde() {
        for venue in Venue::ALL {
            let json = serde_json::to_string(&venue).unwrap();
            assert_eq!(json, format!("\"{}\"", venue.id()));
            assert_eq!(Venue::from_id(venue.id()), Some(venue));
        }
    }

    #[test]
    fn event_uses_camel_case_on_the_wire() {
        let event = Event {
            id: "abc".to_string(),
            title: "Karaoke".to_string(),
            venue: Venue::LuxLounge,
            date: "2030-04-15T01:00:00Z".parse().unwrap(),
            time: "9:00 PM".to_string(),
            description: "Sing.".to_string(),
            link: "https://lux666.com/".to_string(),
            image_url: Some("https://lux666.com/flyer.jpg".to_string()),
            tags: None,
            price: None,
            genres: Some(vec!["music".to_string()]),
            vibe: Some(vec![Vibe::Casual]),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["imageUrl"], "https://lux666.com/flyer.jpg");
        assert_eq!(value["venue"], "lux-lounge");
        assert_eq!(value["vibe"][0], "casual");
        assert!(value.get("price").is_none());
    }
}
