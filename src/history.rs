//! Prompt history: every generation, successful or not, as an append-only
//! list of entries that can be exported to and imported from JSON files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::Store;

pub const HISTORY_KEY: &str = "prompt-history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub provider: String,
    pub prompt: PromptData,
    pub response: ResponseData,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptData {
    pub user_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(default)]
    pub formatted_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub model_name: String,
    /// Wall time of the generation call, in milliseconds.
    pub execution_time: f64,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything about an entry except the id and timestamp, which the
/// recorder assigns.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub provider: String,
    pub user_prompt: String,
    pub formatted_code: String,
    pub metadata: EntryMetadata,
}

pub fn generate_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub struct HistoryRecorder<'a> {
    store: &'a dyn Store,
}

impl<'a> HistoryRecorder<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// All entries, oldest first. A missing or unreadable document reads
    /// as an empty history; use this for display only.
    pub fn read_all(&self) -> Vec<HistoryEntry> {
        self.load().unwrap_or_else(|e| {
            tracing::warn!("Error reading history: {:#}", e);
            Vec::new()
        })
    }

    /// Stored entries, failing on a document that cannot be read. Anything
    /// that writes back goes through here so a bad document is never
    /// replaced by an empty list.
    fn load(&self) -> Result<Vec<HistoryEntry>> {
        let Some(content) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        let entries: Option<Vec<HistoryEntry>> =
            serde_json::from_str(&content).context("Stored history is not readable")?;
        Ok(entries.unwrap_or_default())
    }

    fn write_all(&self, entries: &[HistoryEntry]) -> Result<()> {
        let content = serde_json::to_string(entries)?;
        self.store.set(HISTORY_KEY, &content)
    }

    pub fn append(&self, new: NewHistoryEntry) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: generate_entry_id(),
            timestamp: now_timestamp(),
            provider: new.provider,
            prompt: PromptData {
                user_prompt: new.user_prompt,
            },
            response: ResponseData {
                formatted_code: new.formatted_code,
            },
            metadata: new.metadata,
        };
        let mut entries = self.load()?;
        entries.push(entry.clone());
        self.write_all(&entries)?;
        tracing::debug!(id = %entry.id, "history entry recorded");
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.read_all().into_iter().find(|e| e.id == id)
    }

    /// Remove the entry with `id`. Returns whether one was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write_all(&entries)?;
        Ok(true)
    }

    /// Case-insensitive match on the prompt or the generated code.
    pub fn search(&self, query: &str) -> Vec<HistoryEntry> {
        let query = query.to_lowercase();
        self.read_all()
            .into_iter()
            .filter(|e| {
                e.prompt.user_prompt.to_lowercase().contains(&query)
                    || e.response.formatted_code.to_lowercase().contains(&query)
            })
            .collect()
    }

    pub fn replace_all(&self, entries: &[HistoryEntry]) -> Result<()> {
        self.write_all(entries)
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.load()?)?)
    }

    /// Replace the whole history with a JSON array of entries.
    pub fn import_json(&self, content: &str) -> Result<usize> {
        let value: serde_json::Value =
            serde_json::from_str(content).context("History file is not valid JSON")?;
        if !value.is_array() {
            bail!("Invalid history data format: expected a JSON array");
        }
        let entries: Vec<HistoryEntry> =
            serde_json::from_value(value).context("Invalid history data format")?;
        self.replace_all(&entries)?;
        Ok(entries.len())
    }

    pub fn export_to(&self, path: &Path) -> Result<()> {
        let json = self.export_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        Ok(())
    }

    pub fn import_from(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        self.import_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn new_entry(prompt: &str, code: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            provider: "OpenAI".to_string(),
            user_prompt: prompt.to_string(),
            formatted_code: code.to_string(),
            metadata: EntryMetadata {
                model_name: "gpt-4o-mini".to_string(),
                execution_time: 1200.0,
                status: EntryStatus::Success,
                error: None,
            },
        }
    }

    #[test]
    fn test_generate_entry_id() {
        let a = generate_entry_id();
        let b = generate_entry_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_append_and_read_in_order() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        assert!(history.read_all().is_empty());

        let first = history.append(new_entry("one", "print(1)")).unwrap();
        let second = history.append(new_entry("two", "print(2)")).unwrap();
        let all = history.read_all();
        assert_eq!(all, vec![first.clone(), second]);
        assert_eq!(history.get(&first.id), Some(first));
    }

    #[test]
    fn test_camel_case_document() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        history.append(new_entry("one", "print(1)")).unwrap();
        let raw = store.get(HISTORY_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["prompt"]["userPrompt"], "one");
        assert_eq!(value[0]["response"]["formattedCode"], "print(1)");
        assert_eq!(value[0]["metadata"]["modelName"], "gpt-4o-mini");
        assert_eq!(value[0]["metadata"]["executionTime"], 1200.0);
        assert_eq!(value[0]["metadata"]["status"], "success");
        assert!(value[0]["metadata"].get("error").is_none());
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        let a = history.append(new_entry("a", "")).unwrap();
        let b = history.append(new_entry("b", "")).unwrap();
        assert!(history.delete(&a.id).unwrap());
        assert!(!history.delete(&a.id).unwrap());
        assert_eq!(history.read_all(), vec![b]);
    }

    #[test]
    fn test_search() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        history.append(new_entry("Fibonacci numbers", "def fib(n): ...")).unwrap();
        history.append(new_entry("hello", "print('HELLO')")).unwrap();
        assert_eq!(history.search("fibonacci").len(), 1);
        assert_eq!(history.search("hello").len(), 1);
        assert_eq!(history.search("FIB").len(), 1);
        assert!(history.search("zebra").is_empty());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        history.append(new_entry("one", "print(1)")).unwrap();
        let mut failed = new_entry("two", "");
        failed.metadata.status = EntryStatus::Error;
        failed.metadata.error = Some("HTTP error, status 500".to_string());
        history.append(failed).unwrap();
        let exported_entries = history.read_all();
        let exported = history.export_json().unwrap();

        let other_store = MemoryStore::new();
        let other = HistoryRecorder::new(&other_store);
        other.append(new_entry("stale", "")).unwrap();
        assert_eq!(other.import_json(&exported).unwrap(), 2);
        assert_eq!(other.read_all(), exported_entries);
    }

    #[test]
    fn test_import_rejects_non_array() {
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        let kept = history.append(new_entry("keep", "")).unwrap();
        assert!(history.import_json(r#"{"id": "x"}"#).is_err());
        assert!(history.import_json("not json").is_err());
        assert_eq!(history.read_all(), vec![kept]);
    }

    #[test]
    fn test_file_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt-history.json");
        let store = MemoryStore::new();
        let history = HistoryRecorder::new(&store);
        history.append(new_entry("file", "x = 1")).unwrap();
        history.export_to(&path).unwrap();

        let other_store = MemoryStore::new();
        let other = HistoryRecorder::new(&other_store);
        assert_eq!(other.import_from(&path).unwrap(), 1);
        assert_eq!(other.read_all(), history.read_all());
    }

    #[test]
    fn test_corrupt_document_reads_empty() {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, "{broken").unwrap();
        let history = HistoryRecorder::new(&store);
        assert!(history.read_all().is_empty());
        store.set(HISTORY_KEY, "null").unwrap();
        assert!(history.read_all().is_empty());
    }

    #[test]
    fn test_unreadable_document_is_not_overwritten() {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, "{broken").unwrap();
        let history = HistoryRecorder::new(&store);
        assert!(history.append(new_entry("new", "print(1)")).is_err());
        assert!(history.delete("anything").is_err());
        assert_eq!(store.get(HISTORY_KEY).unwrap().as_deref(), Some("{broken"));
    }

    #[test]
    fn test_fractional_execution_time_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FileStore::new(dir.path());
        store
            .set(
                HISTORY_KEY,
                r#"[{"id":"a","timestamp":"2024-01-01T00:00:00.000Z","provider":"OpenAI",
                    "prompt":{"userPrompt":"old"},"response":{"formattedCode":"x = 1"},
                    "metadata":{"modelName":"gpt-4o-mini","executionTime":1.5,"status":"success"}}]"#,
            )
            .unwrap();
        let history = HistoryRecorder::new(&store);
        let added = history.append(new_entry("new", "print(1)")).unwrap();

        let entries = history.read_all();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a");
        assert_eq!(entries[0].metadata.execution_time, 1.5);
        assert_eq!(entries[1], added);
    }
}
