//! In-memory document store using DashMap.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use pulseway_core::DispatchError;
use serde_json::Value;

use super::{merge_fields, DocumentStore};

/// Thread-safe document store for tests and ephemeral deployments.
///
/// Each call can be given artificial latency, and the whole store can be
/// switched offline to exercise transient-failure paths.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, Value>>,
    latency: Option<Duration>,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call, widening race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), DispatchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(DispatchError::transient("document store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, DispatchError> {
        self.enter().await?;
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        merge: bool,
    ) -> Result<(), DispatchError> {
        self.enter().await?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if merge {
            if let Some(existing) = docs.get_mut(id) {
                merge_fields(existing, data);
                return Ok(());
            }
        }
        docs.insert(id.to_string(), data);
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), DispatchError> {
        self.enter().await?;
        let mut docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| DispatchError::not_found("document", id))?;
        let existing = docs
            .get_mut(id)
            .ok_or_else(|| DispatchError::not_found("document", id))?;
        merge_fields(existing, fields);
        Ok(())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Value)>, DispatchError> {
        self.enter().await?;
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, DispatchError> {
        self.enter().await?;
        Ok(self
            .collections
            .get_mut(collection)
            .map(|mut docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_and_list() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("facilities", "b", json!({"n": 2}), false)
            .await
            .unwrap();
        store
            .set_document("facilities", "a", json!({"n": 1}), false)
            .await
            .unwrap();

        assert_eq!(
            store.get_document("facilities", "a").await.unwrap(),
            Some(json!({"n": 1}))
        );
        assert_eq!(store.get_document("facilities", "zzz").await.unwrap(), None);

        let ids: Vec<String> = store
            .list_documents("facilities")
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn merge_and_update_semantics() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("vehicles", "AMB1", json!({"latitude": 1.0, "status": "active"}), false)
            .await
            .unwrap();
        store
            .set_document("vehicles", "AMB1", json!({"latitude": 2.0}), true)
            .await
            .unwrap();
        assert_eq!(
            store.get_document("vehicles", "AMB1").await.unwrap(),
            Some(json!({"latitude": 2.0, "status": "active"}))
        );

        let missing = store
            .update_document("vehicles", "AMB2", json!({"latitude": 3.0}))
            .await;
        assert!(matches!(missing, Err(DispatchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn offline_store_fails_transiently() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        let err = store.list_documents("rosters").await.unwrap_err();
        assert!(err.is_transient());

        store.set_offline(false);
        assert!(store.list_documents("rosters").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryDocumentStore::new();
        assert!(!store.delete_document("rosters", "general").await.unwrap());
        store
            .set_document("rosters", "general", json!({}), false)
            .await
            .unwrap();
        assert!(store.delete_document("rosters", "general").await.unwrap());
    }
}
