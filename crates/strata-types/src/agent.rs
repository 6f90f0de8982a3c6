//! Agent hierarchy types: records, registration input, delegations and views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Status an agent is registered with.
pub const STATUS_ACTIVE: &str = "active";

/// Priority given to a delegated task that does not specify one.
pub const DEFAULT_TASK_PRIORITY: i64 = 2;

/// A registered agent and its place in the superior/subordinate forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique agent id.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Free-form role label.
    pub role: String,
    /// Lifecycle status; only `active` agents are loaded at start-up.
    #[serde(default = "default_status")]
    pub status: String,
    /// Capability labels.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Direct superior, if any.
    #[serde(default)]
    pub superior_id: Option<String>,
    /// Direct subordinates, in the order they were attached.
    #[serde(default)]
    pub subordinate_ids: Vec<String>,
    /// When the agent was first registered.
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    /// When the agent was last registered or updated.
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

impl AgentRecord {
    /// Attach a subordinate id, keeping the list free of duplicates.
    pub fn add_subordinate(&mut self, id: &str) -> bool {
        if self.subordinate_ids.iter().any(|s| s == id) {
            return false;
        }
        self.subordinate_ids.push(id.to_string());
        true
    }

    /// Detach a subordinate id. Returns whether it was present.
    pub fn remove_subordinate(&mut self, id: &str) -> bool {
        let before = self.subordinate_ids.len();
        self.subordinate_ids.retain(|s| s != id);
        before != self.subordinate_ids.len()
    }

    /// Whether this agent is a root of the forest.
    pub fn is_root(&self) -> bool {
        self.superior_id.is_none()
    }
}

/// Registration input. Missing fields fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Display name (default `Agent <id>`).
    #[serde(default)]
    pub name: Option<String>,
    /// Role label (default `agent`).
    #[serde(default)]
    pub role: Option<String>,
    /// Capability labels.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Superior to attach to.
    #[serde(default)]
    pub superior_id: Option<String>,
    /// Initial subordinate ids.
    #[serde(default)]
    pub subordinate_ids: Vec<String>,
}

impl AgentInfo {
    /// Registration input with only a name and role.
    pub fn named(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            role: Some(role.into()),
            ..Default::default()
        }
    }

    /// Builder: attach to a superior.
    pub fn with_superior(mut self, superior_id: impl Into<String>) -> Self {
        self.superior_id = Some(superior_id.into());
        self
    }

    /// Builder: add a capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// Status of a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    /// Handed to the subordinate, not yet reported back.
    Delegated,
    /// Reported complete by the subordinate.
    Completed,
}

/// A task handed from a superior to one of its direct subordinates.
///
/// Stored in the `task_delegations` list of the sessions document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRecord {
    /// Unique task id.
    pub task_id: String,
    /// Delegating agent.
    pub superior_id: String,
    /// Receiving agent.
    pub subordinate_id: String,
    /// The task payload as given by the caller.
    pub task: Map<String, Value>,
    /// Current status.
    pub status: DelegationStatus,
    /// When the task was delegated.
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    /// Deadline copied from the task payload, if present.
    #[serde(default)]
    pub deadline: Option<Value>,
    /// Priority copied from the task payload.
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// When completion was reported.
    #[serde(rename = "completed", default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result reported on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

fn default_priority() -> i64 {
    DEFAULT_TASK_PRIORITY
}

/// Persisted per-agent hierarchy summary (`agents.hierarchy.<id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Distance to the most senior superior.
    pub level: usize,
    /// Direct superior.
    pub superior: Option<String>,
    /// Direct subordinates.
    pub subordinates: Vec<String>,
    /// When this summary was computed.
    pub updated: DateTime<Utc>,
}

/// One agent's entry in a materialized hierarchy view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Direct superior.
    pub superior: Option<String>,
    /// Direct subordinates.
    pub subordinates: Vec<String>,
    /// Distance to the most senior superior.
    pub level: usize,
    /// Display name.
    pub name: String,
    /// Role label.
    pub role: String,
    /// Lifecycle status.
    pub status: String,
}

/// Full materialized view of the forest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyView {
    /// Agents without a superior.
    pub root_agents: Vec<String>,
    /// Per-agent relationships.
    pub relationships: BTreeMap<String, Relationship>,
    /// Agent ids grouped by level.
    pub levels: BTreeMap<usize, Vec<String>>,
}

/// Aggregate counts over the forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyStats {
    /// Number of registered agents.
    pub total_agents: usize,
    /// Agents without a superior.
    pub root_agents: usize,
    /// Agents with a superior.
    pub subordinate_agents: usize,
    /// Deepest level present.
    pub max_depth: usize,
    /// Agent count per role.
    pub agents_by_role: BTreeMap<String, usize>,
    /// Agent count per level.
    pub agents_by_level: BTreeMap<usize, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AgentRecord {
        AgentRecord {
            agent_id: id.to_string(),
            name: id.to_string(),
            role: "agent".to_string(),
            status: default_status(),
            capabilities: BTreeSet::new(),
            superior_id: None,
            subordinate_ids: vec![],
            created: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_subordinate_set_semantics() {
        let mut a = record("a");
        assert!(a.add_subordinate("b"));
        assert!(!a.add_subordinate("b"));
        assert_eq!(a.subordinate_ids, vec!["b"]);
        assert!(a.remove_subordinate("b"));
        assert!(!a.remove_subordinate("b"));
    }

    #[test]
    fn test_record_defaults_on_decode() {
        let value = serde_json::json!({
            "agent_id": "x",
            "name": "X",
            "role": "worker"
        });
        let rec: AgentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(rec.status, "active");
        assert!(rec.is_root());
        assert!(rec.subordinate_ids.is_empty());
    }

    #[test]
    fn test_delegation_round_trip_field_names() {
        let rec = DelegationRecord {
            task_id: "t".to_string(),
            superior_id: "s".to_string(),
            subordinate_id: "c".to_string(),
            task: Map::new(),
            status: DelegationStatus::Delegated,
            created_at: Utc::now(),
            deadline: None,
            priority: DEFAULT_TASK_PRIORITY,
            completed_at: None,
            result: None,
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["status"], "delegated");
        assert!(value.get("completed").is_none());
        assert!(value["created"].is_string());
    }
}
