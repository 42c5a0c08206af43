//! Structured extraction: turns a raw fragment into a best-effort record by
//! asking a language model for a JSON object and reading it defensively.
//!
//! Every failure here is soft. A broken model call, a reply without JSON or a
//! flyer that cannot be fetched all yield an empty [`Extraction`], and the
//! normalizer fills in the rest.

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::dates;
use crate::llm::{ImagePayload, ModelClient, ModelRequest};
use crate::models::{coerce_vibes, RawFragment, Venue, Vibe};
use crate::scraping::base;

const SUMMARY_MAX_TOKENS: u32 = 300;
const SUMMARY_FALLBACK_CHARS: usize = 150;
const JPEG_MEDIA_TYPE: &str = "image/jpeg";

/// Whatever the model managed to tell us about one event. Absent fields are
/// left for the normalizer to default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub genres: Option<Vec<String>>,
    pub vibes: Vec<Vibe>,
    pub performers: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        *self == Extraction::default()
    }
}

pub struct Extractor {
    model: Arc<dyn ModelClient>,
    tz: Tz,
    image_max_dimension: u32,
}

impl Extractor {
    pub fn new(model: Arc<dyn ModelClient>, tz: Tz, image_max_dimension: u32) -> Self {
        Self {
            model,
            tz,
            image_max_dimension,
        }
    }

    /// Flyers go through the vision prompt with any page text as context;
    /// text-only fragments go through the text prompt.
    pub async fn extract(&self, fragment: &RawFragment) -> Extraction {
        match (&fragment.image_url, &fragment.text) {
            (Some(image_url), context) => {
                self.extract_image(image_url, fragment.venue, context.as_deref())
                    .await
            }
            (None, Some(text)) => self.extract_text(text, fragment.venue).await,
            (None, None) => Extraction::default(),
        }
    }

    pub async fn extract_text(&self, raw: &str, venue: Venue) -> Extraction {
        let request = ModelRequest::text(text_prompt(raw, venue));
        self.run(request, venue).await
    }

    pub async fn extract_image(
        &self,
        image_url: &str,
        venue: Venue,
        context: Option<&str>,
    ) -> Extraction {
        match base::fetch_bytes(image_url).await {
            Ok(bytes) => self.extract_image_bytes(&bytes, venue, context).await,
            Err(err) => {
                warn!(
                    venue = %venue,
                    image = %image_url,
                    error = %format!("{err:#}"),
                    "flyer fetch failed"
                );
                Extraction::default()
            }
        }
    }

    pub async fn extract_image_bytes(
        &self,
        bytes: &[u8],
        venue: Venue,
        context: Option<&str>,
    ) -> Extraction {
        let payload = match prepare_image(bytes, self.image_max_dimension) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(venue = %venue, error = %err, "flyer image could not be decoded");
                return Extraction::default();
            }
        };
        let request = ModelRequest::text(image_prompt(venue, context)).with_image(payload);
        self.run(request, venue).await
    }

    /// One or two sentences from the model, or a truncation of `text` when the
    /// model is unavailable.
    pub async fn summarize(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let request = ModelRequest::text(format!(
            "Summarize this event description in 1-2 concise sentences:\n\n{text}"
        ))
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        match self.model.complete(&request).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(_) => Some(truncate_chars(text, SUMMARY_FALLBACK_CHARS)),
            Err(err) => {
                warn!(error = %err, "summary request failed, truncating");
                Some(truncate_chars(text, SUMMARY_FALLBACK_CHARS))
            }
        }
    }

    async fn run(&self, request: ModelRequest, venue: Venue) -> Extraction {
        let response = match self.model.complete(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(venue = %venue, error = %err, "extraction request failed");
                return Extraction::default();
            }
        };
        let extraction = parse_extraction(&response, self.tz, dates::today_in(self.tz));
        if extraction.is_empty() {
            warn!(venue = %venue, "model reply held no usable event json");
        } else {
            debug!(venue = %venue, title = ?extraction.title, "extracted event");
        }
        extraction
    }
}

fn text_prompt(raw: &str, venue: Venue) -> String {
    format!(
        "I extracted this event information from the website of the venue \"{name}\".\n\
         Extract the following:\n\
         - title\n\
         - date (YYYY-MM-DD)\n\
         - time (HH:MM AM/PM)\n\
         - description (2-3 sentences maximum)\n\
         - price (cover charge as written)\n\
         - genres (array of a few relevant music genres)\n\
         - performers (array of artist or DJ names)\n\
         - vibes (array chosen from: {vibes})\n\n\
         Raw event data:\n{raw}\n\n\
         {shape}",
        name = venue.name(),
        vibes = Vibe::names().collect::<Vec<_>>().join(", "),
        raw = raw,
        shape = RESPONSE_SHAPE,
    )
}

fn image_prompt(venue: Venue, context: Option<&str>) -> String {
    let mut prompt = format!(
        "This is an event flyer from {name}, a venue in Rochester, NY.\n",
        name = venue.name()
    );
    if let Some(notes) = venue.notes() {
        prompt.push_str(notes);
        prompt.push('\n');
    }
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Event page description: \"{}\"\n", context.trim()));
    }
    prompt.push_str(&format!(
        "\nExtract the title, date (YYYY-MM-DD), time (HH:MM AM/PM), performers (array), price, \
         genres (array) and a 1-2 sentence description. Categorize the event with vibes chosen \
         from: {vibes}.\n\n{shape}",
        vibes = Vibe::names().collect::<Vec<_>>().join(", "),
        shape = RESPONSE_SHAPE,
    ));
    prompt
}

const RESPONSE_SHAPE: &str = r#"Respond with clean JSON only, for example:
{
  "title": "Example Event",
  "date": "2025-04-15",
  "time": "8:00 PM",
  "description": "A brief description of the event.",
  "price": "$10 cover",
  "genres": ["indie", "rock"],
  "performers": ["Example Band"],
  "vibes": ["listening", "drinking", "casual"]
}"#;

/// The first balanced `{...}` span in `text`, skipping braces inside strings.
pub fn find_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &byte) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=i]);
                    }
                }
                _ => {}
            }
        }
        search_from = start + 1;
    }
    None
}

/// Reads the model reply into an [`Extraction`], tolerating wrong types and
/// missing keys field by field.
pub fn parse_extraction(response: &str, tz: Tz, today: NaiveDate) -> Extraction {
    let object = match find_json_object(response)
        .and_then(|span| serde_json::from_str::<Value>(span).ok())
    {
        Some(Value::Object(object)) => object,
        _ => return Extraction::default(),
    };

    let time = text_field(&object, &["time"]);
    let date = text_field(&object, &["date"])
        .and_then(|raw| dates::parse_event_date(&raw, time.as_deref(), tz, today));
    let vibe_names = list_field(&object, &["vibes", "vibe"]);

    Extraction {
        title: text_field(&object, &["title", "name"]),
        date,
        time,
        description: text_field(&object, &["description"]),
        price: price_field(&object),
        genres: Some(list_field(&object, &["genres", "genre"])).filter(|g| !g.is_empty()),
        vibes: coerce_vibes(vibe_names.iter().map(String::as_str)),
        performers: list_field(&object, &["performers", "artists"]),
    }
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(dates::clean_text)
        .find(|text| !text.is_empty())
}

fn price_field(object: &Map<String, Value>) -> Option<String> {
    match object.get("price")? {
        Value::String(text) => Some(dates::clean_text(text)).filter(|t| !t.is_empty()),
        Value::Number(amount) => Some(format!("${amount}")),
        _ => None,
    }
}

/// Arrays of strings, or a single comma-separated string.
fn list_field(object: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let value = match keys.iter().find_map(|key| object.get(*key)) {
        Some(value) => value,
        None => return Vec::new(),
    };
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(text) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    items
        .iter()
        .map(|item| dates::clean_text(item))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Decodes a flyer, shrinks it to fit `max_dimension` on its longer side and
/// re-encodes it as JPEG for upload.
pub fn prepare_image(bytes: &[u8], max_dimension: u32) -> Result<ImagePayload, image::ImageError> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width() > max_dimension || img.height() > max_dimension {
        img = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    }

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;

    Ok(ImagePayload {
        media_type: JPEG_MEDIA_TYPE,
        data_base64: BASE64.encode(&buf),
    })
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}
