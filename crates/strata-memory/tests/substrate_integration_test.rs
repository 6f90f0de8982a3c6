//! Integration tests for the MemorySubstrate.
//!
//! Each test opens a real substrate over a temporary data directory and
//! drives the ledger, hierarchy and snapshot components through their public
//! APIs only, then checks what actually landed on disk.

use futures::future::join_all;
use serde_json::{json, Map, Value};
use strata_memory::MemorySubstrate;
use strata_types::agent::{AgentInfo, DelegationStatus};
use strata_types::config::{MemoryConfig, StrataConfig};
use strata_types::document::DocumentKind;
use strata_types::memory::{MemoryEntry, MemoryKind, Metadata};

fn config_in(dir: &tempfile::TempDir, max_memories: usize) -> StrataConfig {
    let mut config = StrataConfig::with_data_dir(dir.path().join("data"));
    config.memory = MemoryConfig { max_memories };
    config
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Memory ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_eviction_keeps_important_and_recent_interactions() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 10)).await.unwrap();
    let ledger = substrate.ledger("a1");

    for i in 0..13 {
        let importance = if i == 0 { 0.9 } else { 0.1 };
        let turn = MemoryEntry::new(
            "a1",
            MemoryKind::Interaction,
            format!("turn {i}"),
            Metadata::new(),
            importance,
        );
        ledger.store(turn).await.unwrap();
    }

    let stats = ledger.stats().await;
    assert_eq!(stats.interactions, 5);

    let mut kept: Vec<String> = ledger
        .get_recent_interactions(100)
        .await
        .into_iter()
        .map(|e| e.content)
        .collect();
    kept.sort();
    assert_eq!(kept, vec!["turn 0", "turn 10", "turn 11", "turn 12", "turn 9"]);

    let doc = substrate.store().read(DocumentKind::Memory).await.unwrap();
    assert_eq!(doc["metadata"]["total_interactions"], 5);
    assert!(doc["metadata"].get("last_cleanup").is_some());
}

#[tokio::test]
async fn test_search_finds_other_agents_memories() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 1000)).await.unwrap();
    substrate
        .ledger("agent-2")
        .store_fact("python is dynamically typed", None, Metadata::new())
        .await
        .unwrap();

    let hits = substrate.ledger("agent-1").search("python", None, 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].agent_id, "agent-2");
    assert_eq!(hits[0].access_count, 1);
    assert_eq!(substrate.ledger("agent-1").stats().await.total, 0);
}

#[tokio::test]
async fn test_concurrent_ledgers_do_not_lose_writes() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 1000)).await.unwrap();

    let ledgers: Vec<_> = (0..4).map(|n| substrate.ledger(format!("agent-{n}"))).collect();
    let writes = ledgers.iter().flat_map(|ledger| {
        (0..5).map(move |i| async move {
            ledger
                .store_fact(&format!("fact {i}"), None, Metadata::new())
                .await
        })
    });
    let ids = join_all(writes).await;
    assert!(ids.iter().all(Option::is_some));

    for ledger in &ledgers {
        assert_eq!(ledger.stats().await.facts, 5);
    }
    let doc = substrate.store().read(DocumentKind::Memory).await.unwrap();
    assert_eq!(doc["facts"].as_array().map(Vec::len), Some(20));
}

#[tokio::test]
async fn test_search_spans_kinds_and_updates_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 1000)).await.unwrap();
    let ledger = substrate.ledger("a1");

    ledger
        .store_skill("tokio", "async runtime for Rust", Some(0.9), Metadata::new())
        .await
        .unwrap();
    ledger
        .store_experience("ported a service to Rust", "faster", None, Metadata::new())
        .await
        .unwrap();
    ledger
        .store_fact("water boils at 100C", None, Metadata::new())
        .await
        .unwrap();

    let hits = ledger.search("RUST", None, 10).await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].kind, MemoryKind::Skill);

    let again = ledger.retrieve(&hits[0].id).await.unwrap();
    assert_eq!(again.access_count, 1);
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_subordinate_linkage_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir, 1000);
    let sub_id = {
        let substrate = MemorySubstrate::open(&config).await.unwrap();
        substrate
            .hierarchy()
            .register("S", AgentInfo::named("Supervisor", "lead"))
            .await
            .unwrap();
        substrate
            .hierarchy()
            .create_subordinate("S", AgentInfo::default())
            .await
            .unwrap()
    };

    let substrate = MemorySubstrate::open(&config).await.unwrap();
    let hierarchy = substrate.hierarchy();
    let sub = hierarchy.get_agent_info(&sub_id).await.unwrap();
    assert_eq!(sub.superior_id.as_deref(), Some("S"));
    let sup = hierarchy.get_agent_info("S").await.unwrap();
    assert!(sup.subordinate_ids.contains(&sub_id));

    let view = hierarchy.get_hierarchy().await;
    assert_eq!(view.root_agents, vec!["S"]);
    assert_eq!(view.relationships[&sub_id].level, 1);
}

#[tokio::test]
async fn test_delegation_round_trip_through_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 1000)).await.unwrap();
    let hierarchy = substrate.hierarchy();
    hierarchy.register("lead", AgentInfo::default()).await.unwrap();
    let worker = hierarchy
        .create_subordinate("lead", AgentInfo::named("Worker", "analyst"))
        .await
        .unwrap();

    let task = object(json!({"goal": "summarize", "deadline": "2030-01-01T00:00:00Z"}));
    let task_id = hierarchy.delegate_task("lead", &worker, task).await.unwrap();
    let record = hierarchy
        .report_completion(&task_id, &worker, json!("done"))
        .await
        .unwrap();
    assert_eq!(record.status, DelegationStatus::Completed);
    assert_eq!(record.priority, 2);
    assert_eq!(record.deadline, Some(json!("2030-01-01T00:00:00Z")));

    let report = substrate
        .validator()
        .validate(
            DocumentKind::Sessions,
            &substrate.store().read(DocumentKind::Sessions).await.unwrap(),
        );
    assert!(report.valid, "{:?}", report.errors);
}

// ---------------------------------------------------------------------------
// Boot repair and snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_boot_recovers_from_interrupted_write() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir, 1000);
    {
        let substrate = MemorySubstrate::open(&config).await.unwrap();
        substrate
            .ledger("a1")
            .store_fact("first", None, Metadata::new())
            .await
            .unwrap();
        substrate
            .ledger("a1")
            .store_fact("second", None, Metadata::new())
            .await
            .unwrap();
    }
    let path = config.data_dir.join(DocumentKind::Memory.file_name());
    tokio::fs::write(&path, b"{\"interactions\": [").await.unwrap();

    let substrate = MemorySubstrate::open(&config).await.unwrap();
    let facts = substrate.ledger("a1").stats().await.facts;
    assert_eq!(facts, 1);
}

#[tokio::test]
async fn test_snapshot_restore_rolls_back_documents() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = MemorySubstrate::open(&config_in(&dir, 1000)).await.unwrap();
    let ledger = substrate.ledger("a1");
    ledger.store_fact("before", None, Metadata::new()).await.unwrap();

    substrate.snapshots().create_backup(Some("checkpoint")).await.unwrap();
    ledger.store_fact("after", None, Metadata::new()).await.unwrap();
    assert_eq!(ledger.stats().await.facts, 2);

    substrate.snapshots().restore_backup("checkpoint").await.unwrap();
    assert_eq!(ledger.stats().await.facts, 1);

    let names: Vec<String> = substrate
        .snapshots()
        .list_backups()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert!(names.iter().any(|n| n == "checkpoint"));
    assert!(names.iter().any(|n| n.starts_with("pre_restore_")));
}
