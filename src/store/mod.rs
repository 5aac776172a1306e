//! Remote configuration store abstraction
//!
//! Contract addresses, fee mirrors, payment records and entitlements live in a
//! document store. This module provides the trait the services depend on plus an
//! in-memory backend; [`firestore`] talks to Firestore over REST.
//!
//! Writes are upserts with merge semantics: nested maps are merged key by key and
//! everything else is replaced.

use crate::{PaymentError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod firestore;

pub use firestore::{FirestoreConfig, FirestoreStore};

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Field lookup by dotted path segments
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        get_path(&self.data, path)
    }
}

/// Document store used for configuration and records
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents whose `field` equals `value`
    async fn query_eq(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Document>>;

    /// All documents of a collection
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Upsert with merge semantics
    async fn set_merge(&self, collection: &str, id: &str, data: Value) -> Result<()>;
}

/// Follow `path` through nested objects
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Build `{"a": {"b": leaf}}` from `["a", "b"]`
pub fn nest(path: &[&str], leaf: Value) -> Value {
    path.iter().rev().fold(leaf, |inner, key| {
        let mut map = Map::new();
        map.insert((*key).to_string(), inner);
        Value::Object(map)
    })
}

/// Merge `patch` into `target`: objects recursively, other values replaced
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-memory store
///
/// Data is lost when the process exits. Used by tests and by the gateway when no
/// remote store is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    collections: Arc<RwLock<Collections>>,
    offline: Arc<std::sync::atomic::AtomicBool>,
}

impl InMemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the backend were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline
            .store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PaymentError::store("in-memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.check_online()?;
        let path: Vec<&str> = field.split('.').collect();
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| get_path(data, &path) == Some(value))
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_merge(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let slot = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(slot, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_missing_document() {
        let store = InMemoryConfigStore::new();
        assert!(store.get("settings", "paymentConfig").await.unwrap().is_none());
        assert!(store.list("settings").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_merge_is_deep() {
        let store = InMemoryConfigStore::new();
        store
            .set_merge(
                "settings",
                "paymentConfig",
                json!({"contracts": {"polygon": "0x01"}, "feePercentage": 50}),
            )
            .await
            .unwrap();
        store
            .set_merge(
                "settings",
                "paymentConfig",
                json!({"contracts": {"binance": "0x02"}, "feePercentage": 60}),
            )
            .await
            .unwrap();

        let doc = store.get("settings", "paymentConfig").await.unwrap().unwrap();
        assert_eq!(doc.field(&["contracts", "polygon"]), Some(&json!("0x01")));
        assert_eq!(doc.field(&["contracts", "binance"]), Some(&json!("0x02")));
        assert_eq!(doc.field(&["feePercentage"]), Some(&json!(60)));
    }

    #[tokio::test]
    async fn test_query_eq() {
        let store = InMemoryConfigStore::new();
        store
            .set_merge("instantJobsContracts", "polygon", json!({"network": "polygon"}))
            .await
            .unwrap();
        store
            .set_merge("instantJobsContracts", "binance", json!({"network": "binance"}))
            .await
            .unwrap();

        let hits = store
            .query_eq("instantJobsContracts", "network", &json!("binance"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "binance");
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = InMemoryConfigStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("settings", "paymentConfig").await,
            Err(PaymentError::RemoteStoreUnavailable(_))
        ));
        store.set_offline(false);
        assert!(store.get("settings", "paymentConfig").await.is_ok());
    }

    #[test]
    fn test_clones_share_documents() {
        let store = InMemoryConfigStore::new();
        let handle = store.clone();
        tokio_test::block_on(async {
            handle
                .set_merge("payments", "p-1", json!({"status": "pending"}))
                .await
                .unwrap();
            let doc = store.get("payments", "p-1").await.unwrap().unwrap();
            assert_eq!(doc.field(&["status"]), Some(&json!("pending")));
        });
    }

    #[test]
    fn test_nest_and_get_path() {
        let value = nest(&["tokens", "polygon", "USDT"], json!("0xc2"));
        assert_eq!(get_path(&value, &["tokens", "polygon", "USDT"]), Some(&json!("0xc2")));
        assert_eq!(get_path(&value, &["tokens", "binance"]), None);
    }
}
