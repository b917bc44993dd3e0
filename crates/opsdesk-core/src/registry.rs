//! Components generated during this session.
//!
//! One registry per process; the host owns it and nothing else touches it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::recovery::Envelope;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedComponentRecord {
    pub id: i64,
    pub title: String,
    pub code: String,
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<GeneratedComponentRecord>,
    active: Option<i64>,
    last_id: i64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond timestamp, bumped past the previous id when two records
    /// land in the same millisecond.
    fn next_id(&mut self, now: DateTime<Utc>) -> i64 {
        let id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        id
    }

    /// Record a recovered component; it becomes the active one.
    pub fn add(&mut self, envelope: &Envelope) -> &GeneratedComponentRecord {
        let now = Utc::now();
        let record = GeneratedComponentRecord {
            id: self.next_id(now),
            title: envelope.title_or_default().to_string(),
            code: envelope.code.clone(),
            description: envelope
                .description
                .clone()
                .or_else(|| envelope.explanation.clone()),
            created_at: now,
        };
        debug!(id = record.id, title = %record.title, "Registered generated component");

        self.active = Some(record.id);
        self.records.insert(0, record);
        &self.records[0]
    }

    pub fn remove(&mut self, id: i64) -> Option<GeneratedComponentRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        Some(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.active = None;
    }

    /// Newest first.
    pub fn list(&self) -> &[GeneratedComponentRecord] {
        &self.records
    }

    pub fn get(&self, id: i64) -> Option<&GeneratedComponentRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn active(&self) -> Option<&GeneratedComponentRecord> {
        self.active.and_then(|id| self.get(id))
    }

    /// Select a record; unknown ids leave the selection unchanged.
    pub fn set_active(&mut self, id: i64) -> bool {
        if self.get(id).is_some() {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
