//! Memory ledger types: entry kinds, entries, and per-agent statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StrataError;

/// Free-form metadata attached to a memory entry.
pub type Metadata = Map<String, Value>;

/// Default importance for a stored interaction.
pub const DEFAULT_INTERACTION_IMPORTANCE: f64 = 0.5;
/// Default importance for a stored fact.
pub const DEFAULT_FACT_IMPORTANCE: f64 = 0.7;
/// Default importance for a stored skill.
pub const DEFAULT_SKILL_IMPORTANCE: f64 = 0.8;
/// Default importance for a stored experience.
pub const DEFAULT_EXPERIENCE_IMPORTANCE: f64 = 0.6;

/// What kind of memory an entry is. Each kind has its own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A raw conversational turn. The only kind subject to eviction.
    Interaction,
    /// A learned fact.
    Fact,
    /// A learned skill or procedure.
    Skill,
    /// An experience together with its outcome.
    Experience,
}

impl MemoryKind {
    /// All kinds, in bucket order.
    pub const ALL: [MemoryKind; 4] = [
        MemoryKind::Interaction,
        MemoryKind::Fact,
        MemoryKind::Skill,
        MemoryKind::Experience,
    ];

    /// Name of the list field in the memory document holding this kind.
    pub fn bucket(&self) -> &'static str {
        match self {
            MemoryKind::Interaction => "interactions",
            MemoryKind::Fact => "facts",
            MemoryKind::Skill => "skills",
            MemoryKind::Experience => "experiences",
        }
    }

    /// Name of the metadata counter for this kind's bucket.
    pub fn counter(&self) -> &'static str {
        match self {
            MemoryKind::Interaction => "total_interactions",
            MemoryKind::Fact => "total_facts",
            MemoryKind::Skill => "total_skills",
            MemoryKind::Experience => "total_experiences",
        }
    }

    /// Whether the eviction sweep may discard entries of this kind.
    pub fn is_evictable(&self) -> bool {
        matches!(self, MemoryKind::Interaction)
    }

    /// Singular lowercase name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Interaction => "interaction",
            MemoryKind::Fact => "fact",
            MemoryKind::Skill => "skill",
            MemoryKind::Experience => "experience",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = StrataError;

    /// Accepts both the kind name (`fact`) and its bucket name (`facts`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        MemoryKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower || k.bucket() == lower)
            .ok_or_else(|| StrataError::InvalidInput(format!("Unknown memory kind: {s}")))
    }
}

/// A single recorded memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique across the whole memory document.
    pub id: String,
    /// Agent that owns this memory.
    pub agent_id: String,
    /// Which bucket the entry lives in.
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// The textual content.
    pub content: String,
    /// Arbitrary metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Importance score (0.0 - 1.0).
    #[serde(default = "default_importance")]
    pub importance: f64,
    /// When the entry was created.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// When the entry was last returned by a search.
    #[serde(rename = "last_accessed", default = "Utc::now")]
    pub last_accessed_at: DateTime<Utc>,
    /// How many searches have returned this entry.
    #[serde(default)]
    pub access_count: u64,
}

fn default_importance() -> f64 {
    DEFAULT_INTERACTION_IMPORTANCE
}

impl MemoryEntry {
    /// Create a fresh entry with a new id and both timestamps set to now.
    pub fn new(
        agent_id: impl Into<String>,
        kind: MemoryKind,
        content: impl Into<String>,
        metadata: Metadata,
        importance: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            kind,
            content: content.into(),
            metadata,
            importance: importance.clamp(0.0, 1.0),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
        }
    }

    /// Decode an entry from its stored form, tolerating missing optional fields.
    ///
    /// Returns `None` for values that are not entries at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let mut entry: MemoryEntry = serde_json::from_value(value.clone()).ok()?;
        if entry.last_accessed_at < entry.created_at {
            entry.last_accessed_at = entry.created_at;
        }
        Some(entry)
    }

    /// Encode the entry into the form stored in the memory document.
    pub fn to_value(&self) -> Result<Value, StrataError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Record one search hit.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now.max(self.created_at);
    }
}

/// Per-agent bucket counts, computed by filtering the memory document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Agent the counts belong to.
    pub agent_id: String,
    /// Number of interactions.
    pub interactions: usize,
    /// Number of facts.
    pub facts: usize,
    /// Number of skills.
    pub skills: usize,
    /// Number of experiences.
    pub experiences: usize,
    /// Sum of all buckets.
    pub total: usize,
}

impl MemoryStats {
    /// Set the count for one kind and keep `total` consistent.
    pub fn set(&mut self, kind: MemoryKind, count: usize) {
        let slot = match kind {
            MemoryKind::Interaction => &mut self.interactions,
            MemoryKind::Fact => &mut self.facts,
            MemoryKind::Skill => &mut self.skills,
            MemoryKind::Experience => &mut self.experiences,
        };
        *slot = count;
        self.total = self.interactions + self.facts + self.skills + self.experiences;
    }
}
