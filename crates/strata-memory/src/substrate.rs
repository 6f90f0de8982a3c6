//! MemorySubstrate: the composed persistence layer.
//!
//! Opens the document store, validates and repairs every document, loads the
//! agent hierarchy, and hands out the per-agent memory ledgers.

use crate::hierarchy::HierarchyRegistry;
use crate::ledger::MemoryLedger;
use std::sync::Arc;
use strata_store::{DocumentStore, SchemaValidator, SnapshotManager};
use strata_types::config::StrataConfig;
use strata_types::document::DocumentKind;
use strata_types::error::StrataResult;
use strata_types::validation::RepairOutcome;
use tracing::{info, warn};

/// Store, validator, snapshots and hierarchy behind one handle.
pub struct MemorySubstrate {
    config: StrataConfig,
    store: Arc<DocumentStore>,
    validator: SchemaValidator,
    snapshots: SnapshotManager,
    hierarchy: HierarchyRegistry,
}

impl MemorySubstrate {
    /// Open the data directory named by `config`.
    ///
    /// Every document is validated; repairs are written back. Documents that
    /// cannot be repaired are left as they are and reported with a warning.
    pub async fn open(config: &StrataConfig) -> StrataResult<Self> {
        Self::open_inner(config, true).await
    }

    /// Open without the boot-time repair pass, for read-only inspection.
    pub async fn open_without_repair(config: &StrataConfig) -> StrataResult<Self> {
        Self::open_inner(config, false).await
    }

    async fn open_inner(config: &StrataConfig, repair: bool) -> StrataResult<Self> {
        let store = Arc::new(DocumentStore::open(&config.data_dir, config.lock.clone()).await?);
        let snapshots = SnapshotManager::new(Arc::clone(&store)).await?;
        let hierarchy = HierarchyRegistry::new(Arc::clone(&store));

        let substrate = Self {
            config: config.clone(),
            store,
            validator: SchemaValidator::new(),
            snapshots,
            hierarchy,
        };
        if repair {
            substrate.validate_all(true).await?;
        }
        substrate.hierarchy.load_from_storage().await?;
        info!(path = %config.data_dir.display(), "Memory substrate ready");
        Ok(substrate)
    }

    /// Validate every document. With `persist`, repaired documents are
    /// written back.
    pub async fn validate_all(&self, persist: bool) -> StrataResult<Vec<(DocumentKind, RepairOutcome)>> {
        let mut outcomes = Vec::with_capacity(DocumentKind::ALL.len());
        for kind in DocumentKind::ALL {
            let doc = self.store.read(kind).await?;
            let mut outcome = self.validator.validate_and_repair(kind, doc);

            if outcome.repaired && persist {
                let validator = self.validator;
                outcome = self
                    .store
                    .modify(kind, move |doc| {
                        let fresh = validator.validate_and_repair(kind, std::mem::take(doc));
                        *doc = fresh.document.clone();
                        Ok(fresh)
                    })
                    .await?;
            }

            if outcome.repaired {
                info!(
                    document = %kind,
                    fixed = outcome.original_errors.len(),
                    persisted = persist,
                    "Repaired document"
                );
            } else if !outcome.is_healthy() {
                warn!(
                    document = %kind,
                    errors = ?outcome.report.errors,
                    "Document failed validation and could not be repaired"
                );
            }
            outcomes.push((kind, outcome));
        }
        Ok(outcomes)
    }

    /// A memory ledger scoped to `agent_id`.
    pub fn ledger(&self, agent_id: impl Into<String>) -> MemoryLedger {
        MemoryLedger::new(Arc::clone(&self.store), agent_id, self.config.memory.clone())
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn hierarchy(&self) -> &HierarchyRegistry {
        &self.hierarchy
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use strata_types::agent::AgentInfo;
    use strata_types::memory::Metadata;

    #[tokio::test]
    async fn test_open_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StrataConfig::with_data_dir(dir.path().join("data"));
        let substrate = MemorySubstrate::open(&config).await.unwrap();

        for kind in DocumentKind::ALL {
            assert!(substrate.store().path_for(kind).exists());
        }
        let outcomes = substrate.validate_all(false).await.unwrap();
        assert!(outcomes.iter().all(|(_, o)| o.is_healthy() && !o.repaired));
    }

    #[tokio::test]
    async fn test_open_repairs_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = StrataConfig::with_data_dir(dir.path().join("data"));
        {
            let store = DocumentStore::open(&config.data_dir, config.lock.clone())
                .await
                .unwrap();
            let Value::Object(partial) = json!({"interactions": []}) else {
                unreachable!()
            };
            store.write(DocumentKind::Memory, &partial).await.unwrap();
        }

        let inspected = MemorySubstrate::open_without_repair(&config).await.unwrap();
        let outcomes = inspected.validate_all(false).await.unwrap();
        let (_, memory_outcome) = outcomes
            .iter()
            .find(|(kind, _)| *kind == DocumentKind::Memory)
            .unwrap();
        assert!(memory_outcome.repaired);
        let untouched = inspected.store().read(DocumentKind::Memory).await.unwrap();
        assert!(!untouched.contains_key("facts"));

        let substrate = MemorySubstrate::open(&config).await.unwrap();
        let memory = substrate.store().read(DocumentKind::Memory).await.unwrap();
        for key in ["facts", "skills", "experiences", "metadata"] {
            assert!(memory.contains_key(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_components_share_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StrataConfig::with_data_dir(dir.path().join("data"));
        let substrate = MemorySubstrate::open(&config).await.unwrap();

        substrate
            .hierarchy()
            .register("a1", AgentInfo::named("A1", "lead"))
            .await
            .unwrap();
        let ledger = substrate.ledger("a1");
        ledger
            .store_fact("sky is blue", None, Metadata::new())
            .await
            .unwrap();

        let snapshot = substrate.snapshots().create_backup(Some("manual")).await.unwrap();
        assert!(snapshot.join(DocumentKind::Agents.file_name()).exists());

        let reopened = MemorySubstrate::open(&config).await.unwrap();
        assert!(reopened.hierarchy().get_agent_info("a1").await.is_some());
        assert_eq!(reopened.ledger("a1").stats().await.facts, 1);
    }
}
