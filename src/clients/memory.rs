use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use super::ApiClient;
use crate::error::Result;
use crate::types::MemoryEntry;

/// Store of past attempts, keyed by user.
#[async_trait]
pub trait MemoryClient: Send + Sync {
    async fn store(&self, user_id: &str, entry: &MemoryEntry) -> Result<()>;

    /// Entries relevant to `query`, best first. Lookup failures yield an
    /// empty list.
    async fn recall(&self, user_id: &str, query: &str) -> Vec<MemoryEntry>;
}

pub struct HttpMemoryClient {
    api: ApiClient,
}

impl HttpMemoryClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct RecallBody {
    #[serde(default)]
    data: Option<Vec<RecallItem>>,
}

#[derive(Deserialize)]
struct RecallItem {
    metadata: MemoryEntry,
}

#[async_trait]
impl MemoryClient for HttpMemoryClient {
    async fn store(&self, user_id: &str, entry: &MemoryEntry) -> Result<()> {
        let body = json!({
            "userId": user_id,
            "content": entry.summary(),
            "metadata": entry,
        });
        let _: serde_json::Value = self.api.post("/api/memory", &body).await?;
        debug!(task = %entry.task, success = entry.success, "memory stored");
        Ok(())
    }

    async fn recall(&self, user_id: &str, query: &str) -> Vec<MemoryEntry> {
        let mut url = match self.api.endpoint("/api/memory") {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "memory recall skipped");
                return Vec::new();
            }
        };
        url.query_pairs_mut()
            .append_pair("userId", user_id)
            .append_pair("query", query);
        match self.api.get::<RecallBody>(url).await {
            Ok(body) => body
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|item| item.metadata)
                .collect(),
            Err(err) => {
                debug!(error = %err, "memory recall failed");
                Vec::new()
            }
        }
    }
}

/// Process-local memory with keyword matching. Newest matches come first.
#[derive(Debug, Default)]
pub struct InMemoryMemory {
    entries: Mutex<Vec<(String, MemoryEntry)>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryClient for InMemoryMemory {
    async fn store(&self, user_id: &str, entry: &MemoryEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), entry.clone()));
        Ok(())
    }

    async fn recall(&self, user_id: &str, query: &str) -> Vec<MemoryEntry> {
        let wanted = keywords(query);
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .rev()
            .filter(|(owner, _)| owner == user_id)
            .filter(|(_, entry)| {
                let task = keywords(&entry.task);
                wanted.iter().any(|word| task.contains(word))
            })
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(task: &str, success: bool) -> MemoryEntry {
        MemoryEntry {
            task: task.into(),
            actions: Vec::new(),
            dom_context: Vec::new(),
            success,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn recall_matches_keywords_per_user_newest_first() {
        let memory = InMemoryMemory::new();
        memory.store("ada", &entry("search for shoes", false)).await.unwrap();
        memory.store("ada", &entry("Search for boots", true)).await.unwrap();
        memory.store("bob", &entry("search for hats", true)).await.unwrap();
        memory.store("ada", &entry("log in", true)).await.unwrap();

        let found = memory.recall("ada", "SEARCH the shop").await;
        let tasks: Vec<_> = found.iter().map(|e| e.task.as_str()).collect();
        assert_eq!(tasks, ["Search for boots", "search for shoes"]);
        assert!(memory.recall("ada", "checkout").await.is_empty());
        assert_eq!(memory.entries().len(), 4);
    }

    #[tokio::test]
    async fn http_recall_degrades_to_empty() {
        // Nothing listens on port 9 locally.
        let api = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let client = HttpMemoryClient::new(api);
        assert!(client.recall("ada", "anything").await.is_empty());
    }
}
