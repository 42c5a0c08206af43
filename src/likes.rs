use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::utils;

pub const BOOST_MIN: u32 = 15;
pub const BOOST_MAX: u32 = 30;

#[derive(Debug, Error)]
pub enum LikesError {
    #[error("likes io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("likes serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unknown like action: {0}")]
    UnknownAction(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeRecord {
    pub event_id: String,
    pub count: u32,
    #[serde(default)]
    pub boosted: bool,
    pub last_updated: DateTime<Utc>,
}

impl LikeRecord {
    fn empty(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            count: 0,
            boosted: false,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
    Boost,
    Unboost,
}

impl FromStr for LikeAction {
    type Err = LikesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(LikeAction::Like),
            "unlike" => Ok(LikeAction::Unlike),
            "boost" => Ok(LikeAction::Boost),
            "unboost" => Ok(LikeAction::Unboost),
            other => Err(LikesError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LikesDocument {
    #[serde(default)]
    likes: BTreeMap<String, LikeRecord>,
}

/// Per-event like counters in `likes.json`, keyed by event id.
#[derive(Debug, Clone)]
pub struct LikesStore {
    path: PathBuf,
}

impl LikesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Self {
        Self::new(utils::likes_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The record for `event_id`; unknown ids read as zero.
    pub fn get(&self, event_id: &str) -> Result<LikeRecord, LikesError> {
        let doc = self.read()?;
        Ok(doc
            .likes
            .get(event_id)
            .cloned()
            .unwrap_or_else(|| LikeRecord::empty(event_id)))
    }

    pub fn all(&self) -> Result<Vec<LikeRecord>, LikesError> {
        Ok(self.read()?.likes.into_values().collect())
    }

    pub fn apply(&self, event_id: &str, action: LikeAction) -> Result<LikeRecord, LikesError> {
        self.apply_with(event_id, action, &mut rand::thread_rng())
    }

    pub fn apply_with<R: Rng>(
        &self,
        event_id: &str,
        action: LikeAction,
        rng: &mut R,
    ) -> Result<LikeRecord, LikesError> {
        let mut doc = self.read()?;
        let record = doc
            .likes
            .entry(event_id.to_string())
            .or_insert_with(|| LikeRecord::empty(event_id));

        match action {
            LikeAction::Like => record.count += 1,
            LikeAction::Unlike => record.count = record.count.saturating_sub(1),
            LikeAction::Boost => {
                record.count += rng.gen_range(BOOST_MIN..=BOOST_MAX);
                record.boosted = true;
            }
            LikeAction::Unboost => record.boosted = false,
        }
        record.last_updated = Utc::now();
        let updated = record.clone();

        self.write(&doc)?;
        info!(event_id = %event_id, action = ?action, count = updated.count, boosted = updated.boosted, "updated likes");
        Ok(updated)
    }

    fn read(&self) -> Result<LikesDocument, LikesError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LikesDocument::default())
            }
            Err(source) => {
                return Err(LikesError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(LikesDocument::default());
        }
        match serde_json::from_str(&contents) {
            Ok(doc) => Ok(doc),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "likes file is corrupt, starting empty");
                Ok(LikesDocument::default())
            }
        }
    }

    fn write(&self, doc: &LikesDocument) -> Result<(), LikesError> {
        let contents = serde_json::to_string_pretty(doc)?;
        utils::replace_file(&self.path, contents.as_bytes()).map_err(|source| LikesError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store() -> (tempfile::TempDir, LikesStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LikesStore::new(dir.path().join("likes.json"));
        (dir, store)
    }

    #[test]
    fn unknown_ids_read_as_zero() {
        let (_dir, store) = store();
        let record = store.get("nope").unwrap();
        assert_eq!(record.count, 0);
        assert!(!record.boosted);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn like_and_unlike_never_go_negative() {
        let (_dir, store) = store();
        assert_eq!(store.apply("e1", LikeAction::Like).unwrap().count, 1);
        assert_eq!(store.apply("e1", LikeAction::Like).unwrap().count, 2);
        assert_eq!(store.apply("e1", LikeAction::Unlike).unwrap().count, 1);
        assert_eq!(store.apply("e1", LikeAction::Unlike).unwrap().count, 0);
        assert_eq!(store.apply("e1", LikeAction::Unlike).unwrap().count, 0);
        assert_eq!(store.get("e1").unwrap().count, 0);
    }

    #[test]
    fn boost_adds_a_bounded_bonus_and_unboost_keeps_the_count() {
        let (_dir, store) = store();
        let mut rng = StdRng::seed_from_u64(7);
        store.apply("e1", LikeAction::Like).unwrap();

        let boosted = store.apply_with("e1", LikeAction::Boost, &mut rng).unwrap();
        assert!(boosted.boosted);
        assert!((1 + BOOST_MIN..=1 + BOOST_MAX).contains(&boosted.count));

        let unboosted = store.apply("e1", LikeAction::Unboost).unwrap();
        assert!(!unboosted.boosted);
        assert_eq!(unboosted.count, boosted.count);
    }

    #[test]
    fn file_uses_camel_case_records_under_likes() {
        let (_dir, store) = store();
        store.apply("e1", LikeAction::Like).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let record = &raw["likes"]["e1"];
        assert_eq!(record["eventId"], "e1");
        assert_eq!(record["count"], 1);
        assert_eq!(record["boosted"], false);
        assert!(record["lastUpdated"].is_string());
    }

    #[test]
    fn corrupt_files_start_over() {
        let (_dir, store) = store();
        fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.get("e1").unwrap().count, 0);
        assert_eq!(store.apply("e1", LikeAction::Like).unwrap().count, 1);
    }

    #[test]
    fn parses_actions() {
        assert_eq!("Boost".parse::<LikeAction>().unwrap(), LikeAction::Boost);
        assert!(matches!(
            "superlike".parse::<LikeAction>(),
            Err(LikesError::UnknownAction(_))
        ));
    }
}
