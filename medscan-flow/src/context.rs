use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Session-scoped state shared by every task of a workflow.
///
/// Cloning a `Context` is cheap and yields a handle onto the same underlying
/// map, so a task that writes a key is immediately visible to the caller that
/// owns the session.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FlowError::ContextError(format!("cannot store '{}': {}", key, e)))?;
        self.data.insert(key, value);
        Ok(())
    }

    /// Typed read. Missing keys and values of another shape both read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    pub fn get_sync<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Reads a boolean flag, treating a missing key as `false`.
    pub async fn flag(&self, key: &str) -> bool {
        self.get_sync(key).unwrap_or(false)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub async fn clear(&self) {
        self.data.clear();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let context = Context::new();
        let handle = context.clone();

        handle.set("blob_name", "rx.jpg").await.unwrap();

        let stored: Option<String> = context.get("blob_name").await;
        assert_eq!(stored.as_deref(), Some("rx.jpg"));
        assert!(context.contains("blob_name"));
    }

    #[tokio::test]
    async fn mismatched_type_reads_as_none() {
        let context = Context::new();
        context.set("count", 3).await.unwrap();

        let as_text: Option<String> = context.get("count").await;
        assert!(as_text.is_none());
        assert!(!context.flag("missing").await);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let context = Context::new();
        context.set("a", true).await.unwrap();
        context.set("b", false).await.unwrap();

        assert!(context.remove("a").await.is_some());
        assert!(context.remove("a").await.is_none());

        context.clear().await;
        assert!(!context.contains("b"));
    }
}
