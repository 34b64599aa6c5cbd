//! Record sources
//!
//! A source yields the three record collections. The live source reads a
//! JSON export of the document store; the synthetic generator produces the
//! same shapes when that export is unavailable.

use makanmate_ai_core::{InteractionRecord, ItemRecord, UserRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{Result, TrainerError};
use crate::synthetic::SyntheticConfig;

const USER_FILES: &[&str] = &["users.json"];
const ITEM_FILES: &[&str] = &["food_items.json", "items.json"];
const INTERACTION_FILES: &[&str] = &["user_interactions.json", "interactions.json"];

/// Documents dropped while reading a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub malformed_users: usize,
    pub malformed_items: usize,
    pub malformed_interactions: usize,
    pub duplicate_users: usize,
    pub duplicate_items: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.malformed_users
            + self.malformed_items
            + self.malformed_interactions
            + self.duplicate_users
            + self.duplicate_items
    }
}

/// The three collections, sanitized at the boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecords {
    pub users: Vec<UserRecord>,
    pub items: Vec<ItemRecord>,
    pub interactions: Vec<InteractionRecord>,
    pub skipped: SkipCounts,
}

/// Supplies user, item and interaction records
pub trait RecordSource {
    /// Short name recorded in the training report
    fn name(&self) -> &str;

    /// Fetch every record. `SourceUnavailable` means the caller may fall back.
    fn fetch(&self) -> Result<RawRecords>;
}

/// Which source the pipeline reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    JsonExport,
    Synthetic,
}

impl std::str::FromStr for SourceKind {
    type Err = TrainerError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "json_export" | "json" => Ok(SourceKind::JsonExport),
            "synthetic" => Ok(SourceKind::Synthetic),
            other => Err(TrainerError::Configuration(format!(
                "unknown source kind '{}' (expected json_export or synthetic)",
                other
            ))),
        }
    }
}

/// Source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory holding the JSON export
    pub path: Option<PathBuf>,
    /// Generate synthetic records when the configured source is unavailable
    pub fallback_to_synthetic: bool,
    pub synthetic: SyntheticConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::JsonExport,
            path: Some(PathBuf::from("data/export")),
            fallback_to_synthetic: true,
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Reads `users.json`, `food_items.json` and `user_interactions.json` from a directory.
///
/// Each file holds either a JSON array of documents or an object keyed by
/// document id. For users and items a missing `id` field is filled from the key.
pub struct JsonExportSource {
    dir: PathBuf,
}

impl JsonExportSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn locate(&self, candidates: &[&str]) -> Result<PathBuf> {
        candidates
            .iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                TrainerError::SourceUnavailable(format!(
                    "none of {:?} found in {}",
                    candidates,
                    self.dir.display()
                ))
            })
    }
}

impl RecordSource for JsonExportSource {
    fn name(&self) -> &str {
        "json_export"
    }

    fn fetch(&self) -> Result<RawRecords> {
        if !self.dir.is_dir() {
            return Err(TrainerError::SourceUnavailable(format!(
                "export directory {} does not exist",
                self.dir.display()
            )));
        }

        let user_path = self.locate(USER_FILES)?;
        let item_path = self.locate(ITEM_FILES)?;
        let interaction_path = self.locate(INTERACTION_FILES)?;

        let mut skipped = SkipCounts::default();

        let (users, malformed) = read_collection::<UserRecord>(&user_path, true)?;
        skipped.malformed_users = malformed;
        let (users, duplicates) = dedup_by_id(users, |u| u.id.clone());
        skipped.duplicate_users = duplicates;

        let (items, malformed) = read_collection::<ItemRecord>(&item_path, true)?;
        skipped.malformed_items = malformed;
        let (items, duplicates) = dedup_by_id(items, |i| i.id.clone());
        skipped.duplicate_items = duplicates;

        let (interactions, malformed) = read_collection::<InteractionRecord>(&interaction_path, false)?;
        skipped.malformed_interactions = malformed;

        let records = RawRecords {
            users: users.into_iter().map(UserRecord::sanitized).collect(),
            items: items.into_iter().map(ItemRecord::sanitized).collect(),
            interactions: interactions
                .into_iter()
                .map(InteractionRecord::sanitized)
                .collect(),
            skipped,
        };

        info!(
            "Loaded {} users, {} items, {} interactions from {}",
            records.users.len(),
            records.items.len(),
            records.interactions.len(),
            self.dir.display()
        );
        if records.skipped.total() > 0 {
            warn!("Skipped documents while reading export: {:?}", records.skipped);
        }
        Ok(records)
    }
}

/// Parse one collection file, returning the records and the malformed count.
fn read_collection<T: DeserializeOwned>(path: &Path, keyed_id: bool) -> Result<(Vec<T>, usize)> {
    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content).map_err(|e| {
        TrainerError::SourceUnavailable(format!("{} is not valid JSON: {}", path.display(), e))
    })?;

    let documents: Vec<Value> = match root {
        Value::Array(docs) => docs,
        Value::Object(map) => map
            .into_iter()
            .map(|(key, doc)| match doc {
                Value::Object(mut fields) if keyed_id && !fields.contains_key("id") => {
                    fields.insert("id".to_string(), Value::String(key));
                    Value::Object(fields)
                }
                other => other,
            })
            .collect(),
        _ => {
            return Err(TrainerError::SourceUnavailable(format!(
                "{} holds neither an array nor an object of documents",
                path.display()
            )))
        }
    };

    let mut records = Vec::with_capacity(documents.len());
    let mut malformed = 0;
    for (i, doc) in documents.into_iter().enumerate() {
        match serde_json::from_value::<T>(strip_nulls(doc)) {
            Ok(record) => records.push(record),
            Err(err) => {
                malformed += 1;
                debug!("Skipping document {} in {}: {}", i, path.display(), err);
            }
        }
    }
    Ok((records, malformed))
}

/// Drop null-valued fields so serde defaults apply.
fn strip_nulls(doc: Value) -> Value {
    match doc {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn dedup_by_id<T, F: Fn(&T) -> String>(records: Vec<T>, id: F) -> (Vec<T>, usize) {
    let mut seen = HashSet::with_capacity(records.len());
    let mut duplicates = 0;
    let kept = records
        .into_iter()
        .filter(|r| {
            let fresh = seen.insert(id(r));
            if !fresh {
                duplicates += 1;
            }
            fresh
        })
        .collect();
    (kept, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use makanmate_ai_core::{Cuisine, InteractionKind};
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let source = JsonExportSource::new("/nonexistent/makanmate/export");
        assert!(matches!(source.fetch(), Err(TrainerError::SourceUnavailable(_))));
    }

    #[test]
    fn test_missing_collection_is_unavailable() {
        let dir = tempdir().unwrap();
        write(dir.path(), "users.json", "[]");
        let source = JsonExportSource::new(dir.path());
        assert!(matches!(source.fetch(), Err(TrainerError::SourceUnavailable(_))));
    }

    #[test]
    fn test_reads_arrays_and_keyed_objects() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "users.json",
            r#"{
                "u1": {"spiceTolerance": 3.0, "culturalBackground": null},
                "u2": {"id": "u2", "dietaryRestrictions": ["halal"]},
                "u3": 42
            }"#,
        );
        write(
            dir.path(),
            "items.json",
            r#"[
                {"id": "i1", "cuisineType": "malay", "price": 12.5},
                {"id": "i1", "cuisineType": "thai"},
                {"cuisineType": "indian"}
            ]"#,
        );
        write(
            dir.path(),
            "user_interactions.json",
            r#"{
                "a": {"userId": "u1", "itemId": "i1", "interactionType": "order", "rating": 0},
                "b": {"userId": "u2", "itemId": "i1", "interactionType": "rate", "rating": 9.5},
                "c": {"userId": "u2"}
            }"#,
        );

        let records = JsonExportSource::new(dir.path()).fetch().unwrap();

        assert_eq!(records.users.len(), 2);
        assert_eq!(records.users[0].id, "u1");
        assert_eq!(records.users[0].spice_tolerance, 1.0);
        assert_eq!(records.items.len(), 1);
        assert_eq!(records.items[0].cuisine, Cuisine::Malay);

        assert_eq!(records.interactions.len(), 2);
        assert_eq!(records.interactions[0].kind, InteractionKind::Order);
        assert_eq!(records.interactions[0].rating, None);
        assert_eq!(records.interactions[1].rating, Some(5.0));

        assert_eq!(records.skipped.malformed_users, 1);
        assert_eq!(records.skipped.malformed_items, 1);
        assert_eq!(records.skipped.duplicate_items, 1);
        assert_eq!(records.skipped.malformed_interactions, 1);
    }

    #[test]
    fn test_double_and_negative_order_counts_are_kept() {
        let dir = tempdir().unwrap();
        write(dir.path(), "users.json", r#"[{"id": "u1"}]"#);
        write(
            dir.path(),
            "food_items.json",
            r#"[{"id": "i1", "totalOrders": 12.0}, {"id": "i2", "totalOrders": -1}]"#,
        );
        write(
            dir.path(),
            "interactions.json",
            r#"[{"userId": "u1", "itemId": "i2", "interactionType": "view"}]"#,
        );

        let records = JsonExportSource::new(dir.path()).fetch().unwrap();

        assert_eq!(records.items.len(), 2);
        assert_eq!(records.skipped.malformed_items, 0);
        assert_eq!(records.items[0].total_orders, 12.0);
        assert_eq!(records.items[1].total_orders, 0.0);
        assert_eq!(records.interactions.len(), 1);
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("synthetic".parse::<SourceKind>().unwrap(), SourceKind::Synthetic);
        assert_eq!("JSON-export".parse::<SourceKind>().unwrap(), SourceKind::JsonExport);
        assert!("firestore".parse::<SourceKind>().is_err());
    }
}
