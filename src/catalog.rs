//! # Recording Catalog
//!
//! The durable index of finished captures. Records are created when a
//! capture finalizes, listed most-recent-first (optionally filtered by
//! session), fetched or deleted by filename, and purged wholesale when a
//! session disconnects.
//!
//! ## Thread Safety:
//! One catalog is shared process-wide behind an `Arc`; the interior
//! `RwLock` lets concurrent sessions and HTTP handlers read while a single
//! writer registers or removes records.

use crate::capture::{CaptureSettings, FinishedCapture};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;

/// One finished recording as known to the catalog. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    pub id: i64,
    pub filename: String,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub settings: CaptureSettings,
    pub session_id: String,
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Default)]
struct CatalogInner {
    next_id: i64,
    records: Vec<CaptureRecord>,
}

/// In-process recording index with catalog-assigned integer ids.
#[derive(Default)]
pub struct RecordingCatalog {
    inner: RwLock<CatalogInner>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a finished capture and return the stored record.
    pub fn create(&self, capture: FinishedCapture) -> CaptureRecord {
        let mut inner = self.inner.write().unwrap();
        inner.next_id += 1;

        let record = CaptureRecord {
            id: inner.next_id,
            filename: capture.filename,
            duration_seconds: capture.duration_seconds,
            timestamp: capture.started_at,
            settings: capture.settings,
            session_id: capture.session_id,
            channels: capture.channels,
            sample_rate: capture.sample_rate,
        };
        inner.records.push(record.clone());
        record
    }

    /// List records most-recent-first, optionally scoped to one session,
    /// with offset/limit paging.
    pub fn list(&self, session_id: Option<&str>, offset: usize, limit: usize) -> Vec<CaptureRecord> {
        let inner = self.inner.read().unwrap();
        let mut records: Vec<CaptureRecord> = inner
            .records
            .iter()
            .filter(|r| session_id.map_or(true, |sid| r.session_id == sid))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.into_iter().skip(offset).take(limit).collect()
    }

    pub fn get_by_filename(&self, filename: &str) -> Option<CaptureRecord> {
        let inner = self.inner.read().unwrap();
        inner.records.iter().find(|r| r.filename == filename).cloned()
    }

    /// Remove a record by filename, returning it if it existed.
    pub fn delete(&self, filename: &str) -> Option<CaptureRecord> {
        let mut inner = self.inner.write().unwrap();
        let index = inner.records.iter().position(|r| r.filename == filename)?;
        Some(inner.records.remove(index))
    }

    /// All records belonging to one session, used by disconnect cleanup.
    pub fn session_records(&self, session_id: &str) -> Vec<CaptureRecord> {
        let inner = self.inner.read().unwrap();
        inner
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.read().unwrap().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn capture(filename: &str, session_id: &str, started_at: DateTime<Utc>) -> FinishedCapture {
        FinishedCapture {
            filename: filename.to_string(),
            duration_seconds: 1.5,
            started_at,
            settings: CaptureSettings {
                gain: 0.0,
                cutoff: 1000.0,
                filter: false,
            },
            session_id: session_id.to_string(),
            channels: 2,
            sample_rate: 44100,
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let catalog = RecordingCatalog::new();
        let now = Utc::now();
        let first = catalog.create(capture("a.wav", "s1", now));
        let second = catalog.create(capture("b.wav", "s1", now));

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(catalog.record_count(), 2);
    }

    #[test]
    fn test_list_orders_by_recency_and_filters_session() {
        let catalog = RecordingCatalog::new();
        let now = Utc::now();
        catalog.create(capture("old.wav", "s1", now - Duration::seconds(60)));
        catalog.create(capture("new.wav", "s1", now));
        catalog.create(capture("other.wav", "s2", now - Duration::seconds(30)));

        let all = catalog.list(None, 0, 100);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].filename, "new.wav");
        assert_eq!(all[2].filename, "old.wav");

        let s1 = catalog.list(Some("s1"), 0, 100);
        assert_eq!(s1.len(), 2);
        assert!(s1.iter().all(|r| r.session_id == "s1"));
    }

    #[test]
    fn test_list_paging() {
        let catalog = RecordingCatalog::new();
        let now = Utc::now();
        for i in 0..5 {
            catalog.create(capture(
                &format!("r{}.wav", i),
                "s1",
                now - Duration::seconds(i),
            ));
        }

        let page = catalog.list(None, 1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].filename, "r1.wav");
        assert_eq!(page[1].filename, "r2.wav");
    }

    #[test]
    fn test_get_and_delete_by_filename() {
        let catalog = RecordingCatalog::new();
        catalog.create(capture("keep.wav", "s1", Utc::now()));
        catalog.create(capture("drop.wav", "s1", Utc::now()));

        assert!(catalog.get_by_filename("drop.wav").is_some());
        assert!(catalog.delete("drop.wav").is_some());
        assert!(catalog.get_by_filename("drop.wav").is_none());
        assert!(catalog.delete("drop.wav").is_none());
        assert_eq!(catalog.record_count(), 1);
    }

    #[test]
    fn test_session_records_scopes_cleanup() {
        let catalog = RecordingCatalog::new();
        catalog.create(capture("a.wav", "s1", Utc::now()));
        catalog.create(capture("b.wav", "s2", Utc::now()));
        catalog.create(capture("c.wav", "s1", Utc::now()));

        let records = catalog.session_records("s1");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.session_id == "s1"));
    }
}
