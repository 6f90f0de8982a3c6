//! Document kinds and their default skeletons.

use crate::error::StrataError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// A named, durable tree of string-keyed maps and ordered lists.
///
/// Every document is a JSON object at the top level.
pub type Document = Map<String, Value>;

/// The closed set of documents owned by the store. Each maps to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Agent records and the materialized hierarchy.
    Agents,
    /// Memory buckets (interactions, facts, skills, experiences).
    Memory,
    /// Tool configuration and usage logs.
    Tools,
    /// Sessions and task delegations.
    Sessions,
    /// Curated knowledge.
    Knowledge,
    /// Custom instruments and workflows.
    Instruments,
}

impl DocumentKind {
    /// Every managed document, in boot order.
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Agents,
        DocumentKind::Memory,
        DocumentKind::Tools,
        DocumentKind::Sessions,
        DocumentKind::Knowledge,
        DocumentKind::Instruments,
    ];

    /// The document's name, used for file names and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Agents => "agents",
            DocumentKind::Memory => "memory",
            DocumentKind::Tools => "tools",
            DocumentKind::Sessions => "sessions",
            DocumentKind::Knowledge => "knowledge",
            DocumentKind::Instruments => "instruments",
        }
    }

    /// File name of the canonical data file (`<name>.json`).
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Resolve a kind from a data file name such as `memory.json`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(".json")
            .and_then(|stem| stem.parse().ok())
    }

    /// The empty structure a fresh document of this kind starts with.
    pub fn default_document(&self) -> Document {
        let now = Utc::now().to_rfc3339();
        let value = match self {
            DocumentKind::Agents => json!({
                "agents": {},
                "hierarchy": {},
                "metadata": { "created": now, "version": "1.0.0" }
            }),
            DocumentKind::Memory => json!({
                "interactions": [],
                "facts": [],
                "skills": [],
                "experiences": [],
                "metadata": { "total_interactions": 0, "last_cleanup": now }
            }),
            DocumentKind::Tools => json!({
                "tool_configs": {},
                "usage_logs": [],
                "custom_tools": {},
                "metadata": { "total_executions": 0, "last_updated": now }
            }),
            DocumentKind::Sessions => json!({
                "active_sessions": {},
                "session_history": [],
                "task_delegations": [],
                "metadata": { "total_sessions": 0, "current_session": null }
            }),
            DocumentKind::Knowledge => json!({
                "facts": {},
                "procedures": {},
                "concepts": {},
                "relationships": {},
                "metadata": { "knowledge_count": 0, "last_updated": now }
            }),
            DocumentKind::Instruments => json!({
                "custom_instruments": {},
                "procedures": {},
                "workflows": {},
                "metadata": { "instrument_count": 0, "last_updated": now }
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StrataError::UnknownDocument(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!("memory".parse::<DocumentKind>().unwrap(), DocumentKind::Memory);
        let err = "ledger".parse::<DocumentKind>().unwrap_err();
        assert!(matches!(err, StrataError::UnknownDocument(name) if name == "ledger"));
    }

    #[test]
    fn test_file_name_round_trip() {
        for kind in DocumentKind::ALL {
            assert_eq!(DocumentKind::from_file_name(&kind.file_name()), Some(kind));
        }
        assert_eq!(DocumentKind::from_file_name("backup_metadata.json"), None);
    }

    #[test]
    fn test_memory_skeleton_has_buckets() {
        let doc = DocumentKind::Memory.default_document();
        for bucket in ["interactions", "facts", "skills", "experiences"] {
            assert!(doc[bucket].is_array(), "missing bucket {bucket}");
        }
        assert_eq!(doc["metadata"]["total_interactions"], 0);
    }

    #[test]
    fn test_sessions_skeleton_has_delegations() {
        let doc = DocumentKind::Sessions.default_document();
        assert!(doc["task_delegations"].is_array());
        assert!(doc["metadata"]["current_session"].is_null());
    }
}
