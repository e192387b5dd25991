//! External store collaborators.
//!
//! The document store holds facilities, vehicle records, rosters and
//! sessions; the realtime store takes best-effort high-frequency position
//! writes. Both are passed in explicitly; there are no ambient handles.

pub mod memory;
pub mod realtime;
pub mod sqlite;

use async_trait::async_trait;
use pulseway_core::DispatchError;
use serde_json::Value;

pub use memory::MemoryDocumentStore;
pub use realtime::{MemoryRealtimeStore, RealtimeEvent};
pub use sqlite::{init_database, SqliteDocumentStore};

pub const FACILITIES: &str = "facilities";
pub const VEHICLES: &str = "vehicles";
pub const ROSTERS: &str = "rosters";
pub const SESSIONS: &str = "sessions";

/// Document-level atomic reads and writes keyed by (collection, id).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `None` when the document does not exist.
    async fn get_document(&self, collection: &str, id: &str)
        -> Result<Option<Value>, DispatchError>;

    /// Write a whole document. With `merge`, top-level fields are merged
    /// into an existing document instead of replacing it.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        merge: bool,
    ) -> Result<(), DispatchError>;

    /// Merge fields into an existing document; `NotFound` if absent.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), DispatchError>;

    /// All documents in a collection, ordered by id.
    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Value)>, DispatchError>;

    /// Returns false when nothing was deleted.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, DispatchError>;
}

/// Low-latency path/value store used for live position fan-out.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn write(&self, path: &str, value: Value) -> Result<(), DispatchError>;

    async fn read(&self, path: &str) -> Result<Option<Value>, DispatchError>;

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RealtimeEvent>;
}

/// Shallow merge of top-level object fields. Non-object inputs replace.
pub fn merge_fields(target: &mut Value, fields: Value) {
    match (target.as_object_mut(), fields) {
        (Some(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }
        (_, fields) => *target = fields,
    }
}
