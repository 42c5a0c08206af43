use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dates;
use crate::models::{Event, Vibe};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted event set: one pretty-printed JSON array, replaced whole on write.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

#[derive(Debug, Default)]
pub struct RepairReport {
    pub total: usize,
    pub repaired: usize,
    pub dropped: usize,
    pub by_venue: BTreeMap<String, usize>,
    pub backup: Option<PathBuf>,
    pub written: bool,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Self {
        Self::new(utils::events_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full set. A document that is not a JSON array is backed up,
    /// reset to `[]` and read as empty. Records that do not decode are
    /// skipped and left on disk for `repair`. Only an unreadable file is an
    /// error.
    pub fn load(&self) -> Result<Vec<Event>, StoreError> {
        let contents = match self.read_raw()? {
            Some(contents) => contents,
            None => return Ok(Vec::new()),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                warn!(path = %self.path.display(), "event store is not an array, resetting");
                self.quarantine();
                return Ok(Vec::new());
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "event store is corrupt, resetting");
                self.quarantine();
                return Ok(Vec::new());
            }
        };

        let mut events = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<Event>(record) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(path = %self.path.display(), index, error = %err, "skipping malformed event record")
                }
            }
        }
        Ok(events)
    }

    pub fn save(&self, events: &[Event]) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(events)?;
        utils::replace_file(&self.path, contents.as_bytes()).map_err(|source| self.io_err(source))?;
        info!(path = %self.path.display(), events = events.len(), "saved events");
        Ok(())
    }

    /// Fills missing required fields in place and drops records that still
    /// cannot form an event. Writes back only when something changed.
    pub fn repair(&self, today: NaiveDate, tz: Tz) -> Result<RepairReport, StoreError> {
        let mut report = RepairReport::default();
        let contents = self.read_raw()?.unwrap_or_default();

        let mut modified = false;
        let records = if contents.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Array(records)) => records,
                Ok(_) => {
                    warn!(path = %self.path.display(), "event store is not an array");
                    modified = true;
                    Vec::new()
                }
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "event store is corrupt");
                    report.backup = self.backup();
                    modified = true;
                    Vec::new()
                }
            }
        };

        let mut events = Vec::with_capacity(records.len());
        for mut record in records {
            let changed = match record.as_object_mut() {
                Some(fields) => repair_fields(fields, today, tz),
                None => false,
            };
            match serde_json::from_value::<Event>(record) {
                Ok(event) => {
                    if changed {
                        report.repaired += 1;
                        modified = true;
                    }
                    *report.by_venue.entry(event.venue.id().to_string()).or_default() += 1;
                    events.push(event);
                }
                Err(err) => {
                    warn!(error = %err, "dropping unrecoverable event record");
                    report.dropped += 1;
                    modified = true;
                }
            }
        }
        report.total = events.len();

        if modified {
            self.save(&events)?;
            report.written = true;
        }
        Ok(report)
    }

    fn read_raw(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|source| self.io_err(source))
    }

    fn quarantine(&self) {
        if self.backup().is_none() {
            return;
        }
        if let Err(err) = utils::replace_file(&self.path, b"[]") {
            warn!(path = %self.path.display(), error = %err, "failed to reset event store");
        }
    }

    /// Copies the current document aside as `<name>.backup.<unix millis>`.
    fn backup(&self) -> Option<PathBuf> {
        let mut name = self.path.file_name()?.to_os_string();
        name.push(format!(".backup.{}", Utc::now().timestamp_millis()));
        let backup = self.path.with_file_name(name);
        match fs::copy(&self.path, &backup) {
            Ok(_) => {
                info!(backup = %backup.display(), "backed up corrupt event store");
                Some(backup)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to back up event store");
                None
            }
        }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn repair_fields(fields: &mut Map<String, Value>, today: NaiveDate, tz: Tz) -> bool {
    let mut changed = false;

    let has_id = fields
        .get("id")
        .and_then(Value::as_str)
        .map_or(false, |id| !id.trim().is_empty());
    if !has_id {
        fields.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        changed = true;
    }

    let has_genres = fields
        .get("genres")
        .and_then(Value::as_array)
        .map_or(false, |genres| !genres.is_empty());
    if !has_genres {
        fields.insert("genres".to_string(), json!(["music"]));
        changed = true;
    }

    let raw_vibes: Vec<String> = fields
        .get("vibe")
        .and_then(Value::as_array)
        .map(|vibes| vibes.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let vibes = crate::models::coerce_vibes(raw_vibes.iter().map(String::as_str));
    if vibes.is_empty() || vibes.len() != raw_vibes.len() {
        let vibes = if vibes.is_empty() {
            vec![Vibe::Casual, Vibe::Drinking]
        } else {
            vibes
        };
        fields.insert("vibe".to_string(), json!(vibes));
        changed = true;
    }

    let stored_date = fields.get("date").and_then(Value::as_str).map(str::to_string);
    let exact = stored_date
        .as_deref()
        .map_or(false, |raw| raw.parse::<DateTime<Utc>>().is_ok());
    if !exact {
        let time = fields.get("time").and_then(Value::as_str).map(str::to_string);
        let date = stored_date
            .as_deref()
            .and_then(|raw| dates::parse_event_date(raw, time.as_deref(), tz, today))
            .unwrap_or_else(|| dates::start_of_day(today, tz));
        fields.insert("date".to_string(), json!(date));
        changed = true;
    }

    changed
}
