//! Durable capture history: a bounded, most-recent-first record set persisted
//! write-through as one JSON document in the app data dir. A missing or
//! unparseable file degrades to an empty history instead of blocking startup.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use crate::models::MediaAsset;

/// Oldest entries beyond this bound are evicted on append.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HistoryDocument {
    records: Vec<MediaAsset>,
}

struct HistoryInner {
    path: PathBuf,
    records: RwLock<Vec<MediaAsset>>,
}

#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<HistoryInner>,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }

        let records = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HistoryDocument>(&contents) {
                Ok(document) => document.records,
                Err(err) => {
                    warn!("history file unparseable, starting empty: {err}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Ok(Self {
            inner: Arc::new(HistoryInner {
                path,
                records: RwLock::new(records),
            }),
        })
    }

    /// All records, most recent first.
    pub fn load(&self) -> Vec<MediaAsset> {
        self.inner.records.read().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<MediaAsset> {
        self.inner
            .records
            .read()
            .unwrap()
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    /// Front-inserts the record, evicts anything beyond the capacity bound,
    /// and flushes before returning so the in-memory and durable views never
    /// diverge.
    pub fn append(&self, record: MediaAsset) -> Result<()> {
        let mut guard = self.inner.records.write().unwrap();
        guard.insert(0, record);
        guard.truncate(HISTORY_CAPACITY);
        self.persist(&guard)
    }

    /// No-op when the id is absent.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.records.write().unwrap();
        let before = guard.len();
        guard.retain(|record| record.id != id);
        if guard.len() == before {
            return Ok(());
        }
        self.persist(&guard)
    }

    fn persist(&self, records: &[MediaAsset]) -> Result<()> {
        let document = HistoryDocument {
            records: records.to_vec(),
        };
        let serialized = serde_json::to_string(&document)?;
        fs::write(&self.inner.path, serialized).with_context(|| {
            format!("failed to write history to {}", self.inner.path.display())
        })
    }
}
