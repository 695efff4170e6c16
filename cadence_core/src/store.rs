//! Document store contract and an in-memory implementation.
//!
//! The engine never talks to a database directly. It reads and merges JSON
//! documents and appends to subcollections through [`DocumentStore`], keyed
//! by segment-list paths so names containing separators stay distinct.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Path of a document or subcollection as a list of segments
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Narrow get/update/append contract of the external document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a whole document, None when absent
    async fn get_document(&self, path: &DocPath) -> Result<Option<Value>>;

    /// Merge the top-level fields of `partial` into the document, creating it if needed
    async fn update_document(&self, path: &DocPath, partial: Value) -> Result<()>;

    /// Append a record to a subcollection and return its new id
    async fn append_to_subcollection(&self, path: &DocPath, record: Value) -> Result<String>;

    /// All records of a subcollection in append order
    async fn read_subcollection(&self, path: &DocPath) -> Result<Vec<Value>>;
}

/// Merge top-level fields of `partial` into `target`
pub(crate) fn merge_fields(target: &mut Value, partial: Value) -> Result<()> {
    let Value::Object(fields) = partial else {
        return Err(Error::Store("partial update must be a JSON object".into()));
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(existing) = target {
        existing.extend(fields);
    }
    Ok(())
}

/// Read and deserialize a document
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &DocPath,
) -> Result<Option<T>> {
    match store.get_document(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize a record and merge it into its document
pub async fn save<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    path: &DocPath,
    record: &T,
) -> Result<()> {
    store
        .update_document(path, serde_json::to_value(record)?)
        .await
}

/// Serialize a record and append it to a subcollection
pub async fn append<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    path: &DocPath,
    record: &T,
) -> Result<String> {
    store
        .append_to_subcollection(path, serde_json::to_value(record)?)
        .await
}

/// Read and deserialize a subcollection, skipping records that don't parse
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &DocPath,
) -> Result<Vec<T>> {
    let records = store.read_subcollection(path).await?;
    Ok(records
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed record in {}: {}", path, e);
                None
            }
        })
        .collect())
}

/// Where each per-user record lives
pub mod paths {
    use super::DocPath;
    use crate::ExerciseKey;

    fn user(user_id: &str) -> DocPath {
        DocPath::new(["users", user_id])
    }

    pub fn progress(user_id: &str, course_id: &str) -> DocPath {
        user(user_id).child("progress").child(course_id)
    }

    pub fn one_rep_max(user_id: &str, key: &ExerciseKey) -> DocPath {
        user(user_id)
            .child("oneRepMax")
            .child(key.library_id.as_str())
            .child(key.exercise_name.as_str())
    }

    pub fn one_rep_max_history(user_id: &str, key: &ExerciseKey) -> DocPath {
        one_rep_max(user_id, key).child("history")
    }

    pub fn session_history(user_id: &str) -> DocPath {
        user(user_id).child("sessionHistory")
    }

    pub fn exercise_history(user_id: &str, key: &ExerciseKey) -> DocPath {
        user(user_id)
            .child("exerciseHistory")
            .child(key.library_id.as_str())
            .child(key.exercise_name.as_str())
    }

    pub fn weekly_volume(user_id: &str, week_key: &str) -> DocPath {
        user(user_id).child("weeklyVolume").child(week_key)
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<DocPath, Value>>,
    subcollections: RwLock<HashMap<DocPath, Vec<Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, path: &DocPath) -> Result<Option<Value>> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn update_document(&self, path: &DocPath, partial: Value) -> Result<()> {
        let mut documents = self.documents.write().await;
        let mut document = documents.get(path).cloned().unwrap_or(Value::Null);
        merge_fields(&mut document, partial)?;
        documents.insert(path.clone(), document);
        Ok(())
    }

    async fn append_to_subcollection(&self, path: &DocPath, record: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.subcollections
            .write()
            .await
            .entry(path.clone())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn read_subcollection(&self, path: &DocPath) -> Result<Vec<Value>> {
        Ok(self
            .subcollections
            .read()
            .await
            .get(path)
            .cloned()
            .unwrap_or_default())
    }
}
