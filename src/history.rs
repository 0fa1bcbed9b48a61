//! In-memory request history.
//!
//! The recorder is owned above any single server instance so entries
//! survive spec reloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default number of entries kept.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// One recorded request/response exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Path plus query string as received
    pub url: String,
    pub path: String,
    pub query: Value,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub status_code: u16,
    pub response_time_ms: u64,
}

/// Request details supplied by the HTTP layer.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub method: String,
    pub url: String,
    pub path: String,
    pub query: Value,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub status_code: u16,
    pub response_time_ms: u64,
}

/// Query filter; every present field must match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    /// Exact request path
    pub endpoint: Option<String>,
    /// Case-insensitive method
    pub method: Option<String>,
    pub status_code: Option<u16>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

/// Bounded, oldest-first request log.
#[derive(Debug)]
pub struct HistoryRecorder {
    entries: RwLock<VecDeque<HistoryEntry>>,
    max_entries: usize,
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl HistoryRecorder {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(DEFAULT_MAX_ENTRIES))),
            max_entries: max_entries.max(1),
        }
    }

    /// Append an entry, evicting the oldest past capacity.
    pub async fn record(&self, entry: NewEntry) -> HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: entry.method,
            url: entry.url,
            path: entry.path,
            query: entry.query,
            headers: entry.headers,
            body: entry.body,
            status_code: entry.status_code,
            response_time_ms: entry.response_time_ms,
        };

        let mut entries = self.entries.write().await;
        entries.push_back(entry.clone());
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
        entry
    }

    /// Matching entries, oldest first.
    pub async fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        let mut results: Vec<HistoryEntry> = entries
            .iter()
            .filter(|e| filter.endpoint.as_ref().map_or(true, |p| &e.path == p))
            .filter(|e| {
                filter
                    .method
                    .as_ref()
                    .map_or(true, |m| e.method.eq_ignore_ascii_case(m))
            })
            .filter(|e| filter.status_code.map_or(true, |s| e.status_code == s))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            let skip = results.len().saturating_sub(limit);
            results.drain(..skip);
        }
        results
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(method: &str, path: &str, status: u16) -> NewEntry {
        NewEntry {
            method: method.to_string(),
            url: path.to_string(),
            path: path.to_string(),
            query: json!({}),
            headers: BTreeMap::new(),
            body: None,
            status_code: status,
            response_time_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_record_assigns_id_and_timestamp() {
        let recorder = HistoryRecorder::default();
        let a = recorder.record(entry("GET", "/a", 200)).await;
        let b = recorder.record(entry("GET", "/a", 200)).await;
        assert_ne!(a.id, b.id);
        assert!(b.timestamp >= a.timestamp);
        assert_eq!(recorder.count().await, 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let recorder = HistoryRecorder::new(3);
        for i in 0..5 {
            recorder.record(entry("GET", &format!("/{}", i), 200)).await;
        }
        let paths: Vec<_> = recorder
            .query(&HistoryFilter::default())
            .await
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["/2", "/3", "/4"]);
    }

    #[tokio::test]
    async fn test_filters() {
        let recorder = HistoryRecorder::default();
        recorder.record(entry("GET", "/api/users", 200)).await;
        recorder.record(entry("POST", "/api/users", 201)).await;
        recorder.record(entry("GET", "/api/posts", 404)).await;

        let by_endpoint = recorder
            .query(&HistoryFilter {
                endpoint: Some("/api/users".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_endpoint.len(), 2);

        let by_method = recorder
            .query(&HistoryFilter {
                method: Some("post".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_method.len(), 1);
        assert_eq!(by_method[0].status_code, 201);

        let by_status = recorder
            .query(&HistoryFilter {
                status_code: Some(404),
                ..Default::default()
            })
            .await;
        assert_eq!(by_status[0].path, "/api/posts");
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let recorder = HistoryRecorder::default();
        for i in 0..10 {
            recorder.record(entry("GET", &format!("/{}", i), 200)).await;
        }
        let recent = recorder
            .query(&HistoryFilter {
                limit: Some(3),
                ..Default::default()
            })
            .await;
        let paths: Vec<_> = recent.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/7", "/8", "/9"]);

        // Zero means no limit
        let all = recorder
            .query(&HistoryFilter {
                limit: Some(0),
                ..Default::default()
            })
            .await;
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn test_clear() {
        let recorder = HistoryRecorder::default();
        recorder.record(entry("GET", "/a", 200)).await;
        recorder.clear().await;
        assert_eq!(recorder.count().await, 0);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = HistoryEntry {
            id: Uuid::nil(),
            timestamp: Utc::now(),
            method: "GET".into(),
            url: "/a?x=1".into(),
            path: "/a".into(),
            query: json!({"x": "1"}),
            headers: BTreeMap::new(),
            body: None,
            status_code: 200,
            response_time_ms: 3,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["responseTimeMs"], 3);
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
