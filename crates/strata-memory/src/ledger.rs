//! Per-agent memory ledger over the shared `memory` document.
//!
//! Entries live in one bucket per [`MemoryKind`]. Several agents share the
//! document; a ledger only ever reads, touches or evicts its own agent's
//! entries.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use strata_store::merge::contains_ignore_case;
use strata_store::validator::parse_timestamp;
use strata_store::DocumentStore;
use strata_types::config::MemoryConfig;
use strata_types::document::{Document, DocumentKind};
use strata_types::error::{StrataError, StrataResult};
use strata_types::memory::{
    MemoryEntry, MemoryKind, MemoryStats, Metadata, DEFAULT_EXPERIENCE_IMPORTANCE,
    DEFAULT_FACT_IMPORTANCE, DEFAULT_INTERACTION_IMPORTANCE, DEFAULT_SKILL_IMPORTANCE,
};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Memory operations on behalf of one agent.
#[derive(Clone)]
pub struct MemoryLedger {
    store: Arc<DocumentStore>,
    agent_id: String,
    config: MemoryConfig,
}

impl MemoryLedger {
    pub fn new(store: Arc<DocumentStore>, agent_id: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            store,
            agent_id: agent_id.into(),
            config,
        }
    }

    /// The agent this ledger records for.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Record an entry for this agent and run the eviction check.
    ///
    /// An empty id is replaced with a fresh one; both timestamps are set to
    /// now and importance is clamped to [0, 1]. Fails if the id is already
    /// used anywhere in the memory document.
    pub async fn store(&self, mut entry: MemoryEntry) -> StrataResult<String> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        entry.agent_id = self.agent_id.clone();
        entry.created_at = now;
        entry.last_accessed_at = now;
        entry.importance = if entry.importance.is_nan() {
            DEFAULT_INTERACTION_IMPORTANCE
        } else {
            entry.importance.clamp(0.0, 1.0)
        };

        let id = entry.id.clone();
        let kind = entry.kind;
        let value = entry.to_value()?;
        let agent = self.agent_id.clone();
        let config = self.config.clone();
        let evicted = self
            .store
            .modify(DocumentKind::Memory, move |doc| {
                if id_in_use(doc, &entry.id) {
                    return Err(StrataError::DuplicateMemoryId(entry.id));
                }
                bucket_mut(doc, kind)?.push(value);
                let evicted = evict_interactions(doc, &agent, &config);
                recount(doc, evicted > 0);
                Ok(evicted)
            })
            .await?;

        debug!(agent = %self.agent_id, memory = %id, kind = %kind, "Stored memory");
        if evicted > 0 {
            info!(agent = %self.agent_id, evicted, "Evicted low-ranked interactions");
        }
        Ok(id)
    }

    /// Record a conversational turn.
    pub async fn store_interaction(
        &self,
        role: &str,
        content: &str,
        metadata: Metadata,
    ) -> Option<String> {
        let mut metadata = metadata;
        metadata.insert("role".to_string(), Value::String(role.to_string()));
        let entry = MemoryEntry::new(
            self.agent_id.as_str(),
            MemoryKind::Interaction,
            content,
            metadata,
            DEFAULT_INTERACTION_IMPORTANCE,
        );
        self.degrade("store_interaction", self.store(entry).await)
    }

    /// Record a fact (default importance 0.7).
    pub async fn store_fact(
        &self,
        fact: &str,
        importance: Option<f64>,
        metadata: Metadata,
    ) -> Option<String> {
        let entry = MemoryEntry::new(
            self.agent_id.as_str(),
            MemoryKind::Fact,
            fact,
            metadata,
            importance.unwrap_or(DEFAULT_FACT_IMPORTANCE),
        );
        self.degrade("store_fact", self.store(entry).await)
    }

    /// Record a skill as `"<name>: <description>"` (default importance 0.8).
    pub async fn store_skill(
        &self,
        name: &str,
        description: &str,
        importance: Option<f64>,
        metadata: Metadata,
    ) -> Option<String> {
        let mut metadata = metadata;
        metadata.insert("skill_name".to_string(), Value::String(name.to_string()));
        let entry = MemoryEntry::new(
            self.agent_id.as_str(),
            MemoryKind::Skill,
            format!("{name}: {description}"),
            metadata,
            importance.unwrap_or(DEFAULT_SKILL_IMPORTANCE),
        );
        self.degrade("store_skill", self.store(entry).await)
    }

    /// Record an experience and its outcome (default importance 0.6).
    pub async fn store_experience(
        &self,
        experience: &str,
        outcome: &str,
        importance: Option<f64>,
        metadata: Metadata,
    ) -> Option<String> {
        let mut metadata = metadata;
        metadata.insert("outcome".to_string(), Value::String(outcome.to_string()));
        let entry = MemoryEntry::new(
            self.agent_id.as_str(),
            MemoryKind::Experience,
            format!("Experience: {experience}\nOutcome: {outcome}"),
            metadata,
            importance.unwrap_or(DEFAULT_EXPERIENCE_IMPORTANCE),
        );
        self.degrade("store_experience", self.store(entry).await)
    }

    /// Case-insensitive substring search over the shared memory document.
    ///
    /// Entries of every agent are searched; the ledger's agent only labels
    /// the log lines.
    ///
    /// Every match has its access count bumped and `last_accessed` refreshed.
    /// Results are ordered by importance, then recency, and cut to `limit`.
    pub async fn search(&self, query: &str, kind: Option<MemoryKind>, limit: usize) -> Vec<MemoryEntry> {
        match self.search_inner(query, kind, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                error!(agent = %self.agent_id, error = %e, "Memory search failed");
                Vec::new()
            }
        }
    }

    async fn search_inner(
        &self,
        query: &str,
        kind: Option<MemoryKind>,
        limit: usize,
    ) -> StrataResult<Vec<MemoryEntry>> {
        let kinds: Vec<MemoryKind> = match kind {
            Some(kind) => vec![kind],
            None => MemoryKind::ALL.to_vec(),
        };

        // Skip the write entirely when nothing matches.
        let snapshot = self.store.read(DocumentKind::Memory).await?;
        if !kinds
            .iter()
            .flat_map(|k| all_entries(&snapshot, *k))
            .any(|entry| contains_ignore_case(&entry.content, query))
        {
            return Ok(Vec::new());
        }

        let needle = query.to_string();
        let mut hits = self
            .store
            .modify(DocumentKind::Memory, move |doc| {
                let now = Utc::now();
                let mut hits = Vec::new();
                for kind in kinds {
                    let Some(Value::Array(items)) = doc.get_mut(kind.bucket()) else {
                        continue;
                    };
                    for item in items.iter_mut() {
                        let Some(mut entry) = MemoryEntry::from_value(item) else {
                            continue;
                        };
                        if !contains_ignore_case(&entry.content, &needle) {
                            continue;
                        }
                        entry.touch(now);
                        if let Value::Object(fields) = item {
                            fields.insert("access_count".to_string(), Value::from(entry.access_count));
                            fields.insert(
                                "last_accessed".to_string(),
                                serde_json::to_value(entry.last_accessed_at)?,
                            );
                        }
                        hits.push(entry);
                    }
                }
                Ok(hits)
            })
            .await?;

        hits.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        hits.truncate(limit);
        debug!(agent = %self.agent_id, query, hits = hits.len(), "Memory search");
        Ok(hits)
    }

    /// Look up an entry by id, whichever agent stored it.
    pub async fn retrieve(&self, id: &str) -> Option<MemoryEntry> {
        let doc = match self.store.read(DocumentKind::Memory).await {
            Ok(doc) => doc,
            Err(e) => {
                error!(agent = %self.agent_id, memory = %id, error = %e, "Memory retrieve failed");
                return None;
            }
        };
        MemoryKind::ALL
            .iter()
            .flat_map(|k| all_entries(&doc, *k))
            .find(|entry| entry.id == id)
    }

    /// This agent's most recent interactions, newest first.
    pub async fn get_recent_interactions(&self, limit: usize) -> Vec<MemoryEntry> {
        let doc = match self.store.read(DocumentKind::Memory).await {
            Ok(doc) => doc,
            Err(e) => {
                error!(agent = %self.agent_id, error = %e, "Reading recent interactions failed");
                return Vec::new();
            }
        };
        let mut recent = owned_entries(&doc, MemoryKind::Interaction, &self.agent_id);
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        recent
    }

    /// Per-bucket counts for this agent, computed by filtering.
    pub async fn stats(&self) -> MemoryStats {
        let mut stats = MemoryStats {
            agent_id: self.agent_id.clone(),
            ..Default::default()
        };
        match self.store.read(DocumentKind::Memory).await {
            Ok(doc) => {
                for kind in MemoryKind::ALL {
                    stats.set(kind, count_owned(&doc, kind, &self.agent_id));
                }
            }
            Err(e) => error!(agent = %self.agent_id, error = %e, "Memory stats failed"),
        }
        stats
    }

    /// Remove this agent's entries from one bucket, or from all of them.
    pub async fn clear(&self, kind: Option<MemoryKind>) -> bool {
        let kinds: Vec<MemoryKind> = match kind {
            Some(kind) => vec![kind],
            None => MemoryKind::ALL.to_vec(),
        };
        let agent = self.agent_id.clone();
        let result = self
            .store
            .modify(DocumentKind::Memory, move |doc| {
                let mut removed = 0;
                for kind in kinds {
                    let items = bucket_mut(doc, kind)?;
                    let before = items.len();
                    items.retain(|item| owner_of(item) != Some(agent.as_str()));
                    removed += before - items.len();
                }
                recount(doc, false);
                Ok(removed)
            })
            .await;
        match result {
            Ok(removed) => {
                info!(agent = %self.agent_id, removed, "Cleared memories");
                true
            }
            Err(e) => {
                error!(agent = %self.agent_id, error = %e, "Clearing memories failed");
                false
            }
        }
    }

    fn degrade<T>(&self, op: &str, result: StrataResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(agent = %self.agent_id, op, error = %e, "Memory write failed");
                None
            }
        }
    }
}

fn bucket_mut(doc: &mut Document, kind: MemoryKind) -> StrataResult<&mut Vec<Value>> {
    match doc
        .entry(kind.bucket())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => Ok(items),
        _ => Err(StrataError::NotAList {
            document: DocumentKind::Memory.to_string(),
            key: kind.bucket().to_string(),
        }),
    }
}

fn bucket(doc: &Document, kind: MemoryKind) -> &[Value] {
    doc.get(kind.bucket())
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn owner_of(item: &Value) -> Option<&str> {
    item.get("agent_id").and_then(Value::as_str)
}

fn all_entries(doc: &Document, kind: MemoryKind) -> Vec<MemoryEntry> {
    bucket(doc, kind)
        .iter()
        .filter_map(MemoryEntry::from_value)
        .collect()
}

fn owned_entries(doc: &Document, kind: MemoryKind, agent: &str) -> Vec<MemoryEntry> {
    bucket(doc, kind)
        .iter()
        .filter(|item| owner_of(item) == Some(agent))
        .filter_map(MemoryEntry::from_value)
        .collect()
}

fn count_owned(doc: &Document, kind: MemoryKind, agent: &str) -> usize {
    bucket(doc, kind)
        .iter()
        .filter(|item| owner_of(item) == Some(agent))
        .count()
}

fn id_in_use(doc: &Document, id: &str) -> bool {
    MemoryKind::ALL.iter().any(|kind| {
        bucket(doc, *kind)
            .iter()
            .any(|item| item.get("id").and_then(Value::as_str) == Some(id))
    })
}

/// Trim `agent`'s interactions to the best `keep_interactions()` once the
/// agent owns more than `cleanup_threshold()` entries in total. Ranking is
/// ascending `(importance, created)`; the tail survives. Other agents and
/// other buckets are untouched. Returns the number discarded.
fn evict_interactions(doc: &mut Document, agent: &str, config: &MemoryConfig) -> usize {
    let owned: usize = MemoryKind::ALL
        .iter()
        .map(|kind| count_owned(doc, *kind, agent))
        .sum();
    if owned <= config.cleanup_threshold() {
        return 0;
    }

    let keep = config.keep_interactions();
    let Some(Value::Array(items)) = doc.get_mut(MemoryKind::Interaction.bucket()) else {
        return 0;
    };
    let mut ranked: Vec<(usize, f64, Option<DateTime<Utc>>)> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| owner_of(item) == Some(agent))
        .map(|(pos, item)| {
            let importance = item.get("importance").and_then(Value::as_f64).unwrap_or(0.0);
            let created = item
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            (pos, importance, created)
        })
        .collect();
    if ranked.len() <= keep {
        return 0;
    }

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.cmp(&b.2)));
    let discard: HashSet<usize> = ranked[..ranked.len() - keep]
        .iter()
        .map(|(pos, _, _)| *pos)
        .collect();
    let mut pos = 0;
    items.retain(|_| {
        let survives = !discard.contains(&pos);
        pos += 1;
        survives
    });
    discard.len()
}

/// Recompute the document-wide bucket counters.
fn recount(doc: &mut Document, cleaned: bool) {
    let counts: Vec<(&str, usize)> = MemoryKind::ALL
        .iter()
        .map(|kind| (kind.counter(), bucket(doc, *kind).len()))
        .collect();
    let now = Value::String(Utc::now().to_rfc3339());
    let meta = doc
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(meta) = meta {
        for (counter, count) in counts {
            meta.insert(counter.to_string(), Value::from(count));
        }
        meta.insert("last_updated".to_string(), now.clone());
        if cleaned {
            meta.insert("last_cleanup".to_string(), now);
        }
    }
}
