//! Agent superior/subordinate forest and task delegation.
//!
//! Active agents are cached in memory and written back to the `agents`
//! document after every mutation. Delegation records live in the `sessions`
//! document. A delegation touches both documents through two independent
//! writes, so the pair is not atomic.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use strata_store::DocumentStore;
use strata_types::agent::{
    AgentInfo, AgentRecord, DelegationRecord, DelegationStatus, HierarchyNode, HierarchyStats,
    HierarchyView, Relationship, DEFAULT_TASK_PRIORITY, STATUS_ACTIVE,
};
use strata_types::document::{Document, DocumentKind};
use strata_types::error::{StrataError, StrataResult};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

type AgentMap = BTreeMap<String, AgentRecord>;

/// Registry of active agents and their hierarchy.
pub struct HierarchyRegistry {
    store: Arc<DocumentStore>,
    agents: RwLock<AgentMap>,
}

impl HierarchyRegistry {
    /// An empty registry. Call [`load_from_storage`](Self::load_from_storage)
    /// to populate it.
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild the cache from the `agents` document, keeping only active
    /// agents. Returns how many were loaded.
    pub async fn load_from_storage(&self) -> StrataResult<usize> {
        let doc = self.store.read(DocumentKind::Agents).await?;
        let mut loaded = BTreeMap::new();
        if let Some(Value::Object(records)) = doc.get("agents") {
            for (id, value) in records {
                match serde_json::from_value::<AgentRecord>(value.clone()) {
                    Ok(record) if record.status == STATUS_ACTIVE => {
                        loaded.insert(id.clone(), record);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(agent = %id, error = %e, "Skipping undecodable agent record"),
                }
            }
        }
        let count = loaded.len();
        *self.agents.write().await = loaded;
        info!(agents = count, "Loaded active agents");
        Ok(count)
    }

    /// Insert or update an agent.
    ///
    /// Rejects a superior whose chain leads back to the agent. A known
    /// superior gets the agent added to its subordinates; a changed superior
    /// loses it.
    pub async fn register(&self, agent_id: &str, info: AgentInfo) -> StrataResult<AgentRecord> {
        let mut agents = self.agents.write().await;
        let mut next = agents.clone();
        let record = register_into(&mut next, agent_id, info)?;
        self.persist(&next, &[]).await?;
        *agents = next;
        info!(agent = %agent_id, superior = ?record.superior_id, "Registered agent");
        Ok(record)
    }

    /// Create and register a new agent under `superior_id`.
    pub async fn create_subordinate(&self, superior_id: &str, info: AgentInfo) -> StrataResult<String> {
        let mut agents = self.agents.write().await;
        if !agents.contains_key(superior_id) {
            return Err(StrataError::AgentNotFound(superior_id.to_string()));
        }
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let id = format!("agent_{suffix}");
        let info = AgentInfo {
            name: Some(info.name.unwrap_or_else(|| format!("Subordinate {suffix}"))),
            role: Some(info.role.unwrap_or_else(|| "subordinate".to_string())),
            superior_id: Some(superior_id.to_string()),
            ..info
        };

        let mut next = agents.clone();
        register_into(&mut next, &id, info)?;
        self.persist(&next, &[]).await?;
        *agents = next;
        info!(agent = %id, superior = %superior_id, "Created subordinate");
        Ok(id)
    }

    /// Remove an agent. Its subordinates move up to its superior, or become
    /// roots. Returns whether the agent existed.
    pub async fn remove_agent(&self, agent_id: &str) -> StrataResult<bool> {
        let mut agents = self.agents.write().await;
        let mut next = agents.clone();
        let Some(removed) = next.remove(agent_id) else {
            return Ok(false);
        };

        for sub_id in &removed.subordinate_ids {
            let Some(sub) = next.get_mut(sub_id) else {
                continue;
            };
            sub.superior_id = removed.superior_id.clone();
            if let Some(superior) = removed
                .superior_id
                .as_deref()
                .and_then(|id| next.get_mut(id))
            {
                superior.add_subordinate(sub_id);
            }
        }
        if let Some(superior) = removed
            .superior_id
            .as_deref()
            .and_then(|id| next.get_mut(id))
        {
            superior.remove_subordinate(agent_id);
        }

        self.persist(&next, &[agent_id.to_string()]).await?;
        *agents = next;
        info!(agent = %agent_id, "Removed agent");
        Ok(true)
    }

    pub async fn get_agent_info(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Known direct subordinates of an agent.
    pub async fn get_subordinates(&self, agent_id: &str) -> Vec<AgentRecord> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .map(|record| {
                record
                    .subordinate_ids
                    .iter()
                    .filter_map(|id| agents.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The agent's superior, if it is registered.
    pub async fn get_superior(&self, agent_id: &str) -> Option<AgentRecord> {
        let agents = self.agents.read().await;
        let superior = agents.get(agent_id)?.superior_id.as_deref()?;
        agents.get(superior).cloned()
    }

    /// All active agents.
    pub async fn list_agents(&self) -> Vec<AgentRecord> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Materialized view of the whole forest.
    pub async fn get_hierarchy(&self) -> HierarchyView {
        let agents = self.agents.read().await;
        let mut view = HierarchyView::default();
        for (id, record) in agents.iter() {
            let level = level_of(id, &agents);
            view.relationships.insert(
                id.clone(),
                Relationship {
                    superior: record.superior_id.clone(),
                    subordinates: record.subordinate_ids.clone(),
                    level,
                    name: record.name.clone(),
                    role: record.role.clone(),
                    status: record.status.clone(),
                },
            );
            view.levels.entry(level).or_default().push(id.clone());
            if record.is_root() {
                view.root_agents.push(id.clone());
            }
        }
        view
    }

    /// Counts by position, role and level.
    pub async fn get_stats(&self) -> HierarchyStats {
        let agents = self.agents.read().await;
        let mut stats = HierarchyStats {
            total_agents: agents.len(),
            ..Default::default()
        };
        for (id, record) in agents.iter() {
            if record.is_root() {
                stats.root_agents += 1;
            } else {
                stats.subordinate_agents += 1;
            }
            *stats.agents_by_role.entry(record.role.clone()).or_default() += 1;
            let level = level_of(id, &agents);
            *stats.agents_by_level.entry(level).or_default() += 1;
            stats.max_depth = stats.max_depth.max(level);
        }
        stats
    }

    /// Hand `task` from a superior to one of its direct subordinates.
    pub async fn delegate_task(
        &self,
        superior_id: &str,
        subordinate_id: &str,
        task: Map<String, Value>,
    ) -> StrataResult<String> {
        {
            let agents = self.agents.read().await;
            let sub = agents
                .get(subordinate_id)
                .ok_or_else(|| StrataError::AgentNotFound(subordinate_id.to_string()))?;
            if sub.superior_id.as_deref() != Some(superior_id) {
                return Err(StrataError::NotSubordinate {
                    superior: superior_id.to_string(),
                    subordinate: subordinate_id.to_string(),
                });
            }
        }

        let record = DelegationRecord {
            task_id: Uuid::new_v4().to_string(),
            superior_id: superior_id.to_string(),
            subordinate_id: subordinate_id.to_string(),
            deadline: task.get("deadline").cloned(),
            priority: task
                .get("priority")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_TASK_PRIORITY),
            task,
            status: DelegationStatus::Delegated,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        };
        self.store
            .append(
                DocumentKind::Sessions,
                "task_delegations",
                serde_json::to_value(&record)?,
            )
            .await?;
        info!(
            task = %record.task_id,
            superior = %superior_id,
            subordinate = %subordinate_id,
            "Delegated task"
        );
        Ok(record.task_id)
    }

    /// Mark a delegation completed with `result`.
    pub async fn report_completion(
        &self,
        task_id: &str,
        subordinate_id: &str,
        result: Value,
    ) -> StrataResult<DelegationRecord> {
        let task = task_id.to_string();
        let sub = subordinate_id.to_string();
        let record = self
            .store
            .modify(DocumentKind::Sessions, move |doc| {
                let delegations = match doc.get_mut("task_delegations") {
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return Err(StrataError::NotAList {
                            document: DocumentKind::Sessions.to_string(),
                            key: "task_delegations".to_string(),
                        })
                    }
                    None => return Err(StrataError::DelegationNotFound {
                        task_id: task,
                        subordinate_id: sub,
                    }),
                };
                let slot = delegations.iter_mut().find(|d| {
                    d.get("task_id").and_then(Value::as_str) == Some(task.as_str())
                        && d.get("subordinate_id").and_then(Value::as_str) == Some(sub.as_str())
                });
                let Some(Value::Object(fields)) = slot else {
                    return Err(StrataError::DelegationNotFound {
                        task_id: task,
                        subordinate_id: sub,
                    });
                };
                fields.insert(
                    "status".to_string(),
                    serde_json::to_value(DelegationStatus::Completed)?,
                );
                fields.insert("result".to_string(), result);
                fields.insert("completed".to_string(), serde_json::to_value(Utc::now())?);
                Ok(serde_json::from_value::<DelegationRecord>(Value::Object(fields.clone()))?)
            })
            .await?;
        info!(task = %task_id, subordinate = %subordinate_id, "Task completed");
        Ok(record)
    }

    /// Write cached agents and their hierarchy nodes into the `agents`
    /// document, dropping `removed`. Records of inactive agents that were
    /// never loaded are left in place.
    async fn persist(&self, agents: &AgentMap, removed: &[String]) -> StrataResult<()> {
        let now = Utc::now();
        let mut records = Map::new();
        let mut nodes = Map::new();
        for (id, record) in agents {
            records.insert(id.clone(), serde_json::to_value(record)?);
            let node = HierarchyNode {
                level: level_of(id, agents),
                superior: record.superior_id.clone(),
                subordinates: record.subordinate_ids.clone(),
                updated: now,
            };
            nodes.insert(id.clone(), serde_json::to_value(node)?);
        }
        let removed = removed.to_vec();
        self.store
            .modify(DocumentKind::Agents, move |doc| {
                upsert_section(doc, "agents", records, &removed)?;
                upsert_section(doc, "hierarchy", nodes, &removed)?;
                doc.insert("last_updated".to_string(), Value::String(now.to_rfc3339()));
                Ok(())
            })
            .await
    }
}

fn register_into(agents: &mut AgentMap, agent_id: &str, info: AgentInfo) -> StrataResult<AgentRecord> {
    if agent_id.is_empty() {
        return Err(StrataError::InvalidInput("agent id must not be empty".to_string()));
    }
    if let Some(superior) = info.superior_id.as_deref() {
        if superior_chain_reaches(superior, agent_id, agents) {
            return Err(StrataError::HierarchyCycle(format!(
                "{agent_id} cannot report to {superior}"
            )));
        }
    }

    let now = Utc::now();
    let previous = agents.get(agent_id);
    let record = AgentRecord {
        agent_id: agent_id.to_string(),
        name: info.name.unwrap_or_else(|| format!("Agent {agent_id}")),
        role: info.role.unwrap_or_else(|| "agent".to_string()),
        status: STATUS_ACTIVE.to_string(),
        capabilities: info.capabilities.into_iter().collect(),
        superior_id: info.superior_id,
        subordinate_ids: if info.subordinate_ids.is_empty() {
            previous.map(|p| p.subordinate_ids.clone()).unwrap_or_default()
        } else {
            info.subordinate_ids
        },
        created: previous.map(|p| p.created).unwrap_or(now),
        last_seen: now,
    };

    let old_superior = previous.and_then(|p| p.superior_id.clone());
    if old_superior != record.superior_id {
        if let Some(old) = old_superior.as_deref().and_then(|id| agents.get_mut(id)) {
            old.remove_subordinate(agent_id);
        }
    }
    if let Some(superior) = record.superior_id.as_deref().and_then(|id| agents.get_mut(id)) {
        superior.add_subordinate(agent_id);
    }
    agents.insert(agent_id.to_string(), record.clone());
    Ok(record)
}

/// Whether walking up from `start` reaches `target` (or `start` is `target`).
fn superior_chain_reaches(start: &str, target: &str, agents: &AgentMap) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(start);
    while let Some(id) = current {
        if id == target {
            return true;
        }
        if !visited.insert(id) {
            return false;
        }
        current = agents.get(id).and_then(|r| r.superior_id.as_deref());
    }
    false
}

/// Distance to the most senior superior, by iterative ancestor walk.
fn level_of<'a>(agent_id: &'a str, agents: &'a AgentMap) -> usize {
    let mut level = 0;
    let mut visited = HashSet::new();
    let mut current = agent_id;
    while visited.insert(current) {
        match agents.get(current).and_then(|r| r.superior_id.as_deref()) {
            Some(superior) => {
                level += 1;
                current = superior;
            }
            None => break,
        }
    }
    level
}

fn upsert_section(
    doc: &mut Document,
    key: &str,
    entries: Map<String, Value>,
    removed: &[String],
) -> StrataResult<()> {
    let section = doc
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(section) = section else {
        return Err(StrataError::Decode(format!("agents.{key} is not a map")));
    };
    for id in removed {
        section.remove(id);
    }
    section.extend(entries);
    Ok(())
}
