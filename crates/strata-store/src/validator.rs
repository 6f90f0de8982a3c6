//! Structural and referential validation of documents, with repair.
//!
//! Repair only fills in what is missing: absent containers, absent agent
//! fields and derived counters. Referential problems (cycles, dangling ids,
//! mismatched links) are always reported and never rewritten.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use strata_types::agent::STATUS_ACTIVE;
use strata_types::document::{Document, DocumentKind};
use strata_types::memory::MemoryKind;
use strata_types::validation::{RepairOutcome, ValidationReport};
use tracing::{debug, warn};

/// String fields every stored agent record must carry.
const AGENT_REQUIRED_FIELDS: [&str; 5] = ["agent_id", "name", "role", "status", "created"];

/// Fields every stored memory entry must carry.
const MEMORY_REQUIRED_FIELDS: [&str; 4] = ["id", "agent_id", "content", "timestamp"];

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Stateless validator for every [`DocumentKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check shape and references of `doc`.
    pub fn validate(&self, kind: DocumentKind, doc: &Document) -> ValidationReport {
        let mut report = ValidationReport::new();
        check_shape(kind, doc, &mut report);
        match kind {
            DocumentKind::Agents => check_agents(doc, &mut report),
            DocumentKind::Memory => check_memory(doc, &mut report),
            DocumentKind::Tools => check_tools(doc, &mut report),
            DocumentKind::Sessions => check_sessions(doc, &mut report),
            DocumentKind::Knowledge | DocumentKind::Instruments => {}
        }
        report
    }

    /// Fill missing containers and fields and recompute derived counters.
    pub fn repair(&self, kind: DocumentKind, doc: &Document) -> Document {
        let mut repaired = doc.clone();
        let skeleton = kind.default_document();

        for (key, default) in &skeleton {
            if !repaired.contains_key(key) {
                repaired.insert(key.clone(), default.clone());
            }
        }
        if let (Some(Value::Object(meta)), Some(Value::Object(default_meta))) =
            (repaired.get_mut("metadata"), skeleton.get("metadata"))
        {
            for (key, value) in default_meta {
                meta.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        match kind {
            DocumentKind::Agents => repair_agents(&mut repaired),
            DocumentKind::Memory => repair_memory_counters(&mut repaired),
            _ => {}
        }
        repaired
    }

    /// Validate; if invalid, repair and re-validate. If the repair does not
    /// make the document valid, the original is returned along with both
    /// sets of errors.
    pub fn validate_and_repair(&self, kind: DocumentKind, doc: Document) -> RepairOutcome {
        let report = self.validate(kind, &doc);
        if report.valid {
            return RepairOutcome {
                document: doc,
                repaired: false,
                report,
                original_errors: Vec::new(),
                repair_errors: Vec::new(),
            };
        }

        let candidate = self.repair(kind, &doc);
        let recheck = self.validate(kind, &candidate);
        if recheck.valid {
            debug!(document = %kind, fixed = report.errors.len(), "Document repaired");
            RepairOutcome {
                document: candidate,
                repaired: true,
                report: recheck,
                original_errors: report.errors,
                repair_errors: Vec::new(),
            }
        } else {
            warn!(
                document = %kind,
                errors = recheck.errors.len(),
                "Document could not be repaired"
            );
            RepairOutcome {
                document: doc,
                repaired: false,
                original_errors: report.errors.clone(),
                repair_errors: recheck.errors,
                report,
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn check_shape(kind: DocumentKind, doc: &Document, report: &mut ValidationReport) {
    for (key, default) in kind.default_document() {
        match doc.get(&key) {
            None => report.error(format!("Missing required key '{key}'")),
            Some(value) => {
                let expected = type_name(&default);
                if matches!(default, Value::Object(_) | Value::Array(_))
                    && type_name(value) != expected
                {
                    report.error(format!(
                        "Key '{key}' must be a {expected}, found {}",
                        type_name(value)
                    ));
                }
            }
        }
    }
}

fn object_at<'a>(doc: &'a Document, key: &str) -> Option<&'a Map<String, Value>> {
    doc.get(key).and_then(Value::as_object)
}

fn list_at<'a>(doc: &'a Document, key: &str) -> &'a [Value] {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn check_agents(doc: &Document, report: &mut ValidationReport) {
    let Some(agents) = object_at(doc, "agents") else {
        return;
    };

    let mut superiors: HashMap<&str, &str> = HashMap::new();
    for (id, record) in agents {
        let Some(fields) = record.as_object() else {
            report.error(format!("Agent record '{id}' is not a map"));
            continue;
        };
        for field in AGENT_REQUIRED_FIELDS {
            if !fields.get(field).map(Value::is_string).unwrap_or(false) {
                report.error(format!("Agent '{id}' missing string field '{field}'"));
            }
        }
        if let Some(superior) = fields.get("superior_id").and_then(Value::as_str) {
            superiors.insert(id.as_str(), superior);
        }
    }

    for (id, record) in agents {
        let Some(fields) = record.as_object() else {
            continue;
        };
        if let Some(superior) = superiors.get(id.as_str()) {
            match agents.get(*superior).and_then(Value::as_object) {
                None => report.error(format!(
                    "Agent {id} references non-existent superior {superior}"
                )),
                Some(sup) => {
                    let listed = sup
                        .get("subordinate_ids")
                        .and_then(Value::as_array)
                        .map(|subs| subs.iter().any(|s| s.as_str() == Some(id.as_str())))
                        .unwrap_or(false);
                    if !listed {
                        report.warn(format!(
                            "Inconsistent hierarchy: {superior} does not list {id} as subordinate"
                        ));
                    }
                }
            }
        }

        let subordinates = fields
            .get("subordinate_ids")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for sub in subordinates.iter().filter_map(Value::as_str) {
            if !agents.contains_key(sub) {
                report.error(format!(
                    "Agent {id} references non-existent subordinate {sub}"
                ));
            } else if superiors.get(sub).copied() != Some(id.as_str()) {
                report.warn(format!(
                    "Inconsistent hierarchy: {sub} should have {id} as superior"
                ));
            }
        }
    }

    for id in agents.keys() {
        if ancestor_walk_revisits(id, &superiors) {
            report.error(format!(
                "Circular reference detected in agent hierarchy involving {id}"
            ));
        }
    }
}

/// Iterative ancestor walk; true if some agent is seen twice.
fn ancestor_walk_revisits<'a>(start: &'a str, superiors: &HashMap<&'a str, &'a str>) -> bool {
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if !visited.insert(current) {
            return true;
        }
        match superiors.get(current) {
            Some(next) => current = *next,
            None => return false,
        }
    }
}

fn check_memory(doc: &Document, report: &mut ValidationReport) {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for kind in MemoryKind::ALL {
        let bucket = kind.bucket();
        for (pos, entry) in list_at(doc, bucket).iter().enumerate() {
            let Some(fields) = entry.as_object() else {
                report.error(format!("Entry {pos} in '{bucket}' is not a map"));
                continue;
            };
            for field in MEMORY_REQUIRED_FIELDS {
                if !fields.contains_key(field) {
                    report.error(format!("Entry {pos} in '{bucket}' missing field '{field}'"));
                }
            }
            if let Some(id) = fields.get("id").and_then(Value::as_str) {
                if !seen_ids.insert(id) {
                    report.error(format!("Duplicate memory id: {id}"));
                }
            }
            for field in ["timestamp", "last_accessed"] {
                if let Some(raw) = fields.get(field).and_then(Value::as_str) {
                    if parse_timestamp(raw).is_none() {
                        report.warn(format!("Invalid timestamp format: {raw}"));
                    }
                }
            }
            if let Some(importance) = fields.get("importance") {
                match importance.as_f64() {
                    Some(score) if (0.0..=1.0).contains(&score) => {}
                    _ => report.warn(format!(
                        "Importance in '{bucket}' should be between 0 and 1, got {importance}"
                    )),
                }
            }
        }
    }
}

fn check_tools(doc: &Document, report: &mut ValidationReport) {
    for (pos, log) in list_at(doc, "usage_logs").iter().enumerate() {
        for field in ["tool_name", "agent_id"] {
            let present = log
                .get(field)
                .and_then(Value::as_str)
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !present {
                report.error(format!("Tool usage log {pos} missing {field}"));
            }
        }
    }
}

fn check_sessions(doc: &Document, report: &mut ValidationReport) {
    for session in list_at(doc, "session_history") {
        let id = session
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        let start = session.get("start_time").and_then(Value::as_str);
        let end = session.get("end_time").and_then(Value::as_str);
        if let (Some(start), Some(end)) = (start, end) {
            match (parse_timestamp(start), parse_timestamp(end)) {
                (Some(s), Some(e)) if e < s => {
                    report.error(format!("Session end time before start time: {id}"));
                }
                (Some(_), Some(_)) => {}
                _ => report.warn(format!("Invalid session timestamp in {id}")),
            }
        }
    }

    for record in list_at(doc, "task_delegations") {
        let status = record.get("status").and_then(Value::as_str).unwrap_or("");
        if status != "delegated" && status != "completed" {
            let task = record
                .get("task_id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>");
            report.warn(format!("Delegation {task} has unknown status '{status}'"));
        }
    }
}

fn repair_agents(doc: &mut Document) {
    let Some(Value::Object(agents)) = doc.get_mut("agents") else {
        return;
    };
    let now = Utc::now().to_rfc3339();
    for (id, record) in agents.iter_mut() {
        let Value::Object(fields) = record else {
            continue;
        };
        let defaults = [
            ("agent_id", Value::String(id.clone())),
            ("name", Value::String(format!("Agent {id}"))),
            ("role", Value::String("agent".to_string())),
            ("status", Value::String(STATUS_ACTIVE.to_string())),
            ("created", Value::String(now.clone())),
            ("capabilities", Value::Array(Vec::new())),
            ("subordinate_ids", Value::Array(Vec::new())),
        ];
        for (field, value) in defaults {
            fields.entry(field.to_string()).or_insert(value);
        }
    }
}

fn repair_memory_counters(doc: &mut Document) {
    let counts: Vec<(&str, usize)> = MemoryKind::ALL
        .iter()
        .map(|kind| (kind.counter(), list_at(doc, kind.bucket()).len()))
        .collect();
    if let Some(Value::Object(meta)) = doc.get_mut("metadata") {
        for (counter, count) in counts {
            meta.insert(counter.to_string(), Value::from(count));
        }
    }
}
