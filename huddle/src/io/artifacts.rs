//! Phase artifact storage under `artifacts/`.
//!
//! Text artifacts (requirements summary, diff summary, review notes) are
//! plain files whose absence is not an error: the policy builder simply
//! leaves the corresponding field unset. The task list is a JSON document
//! validated against an embedded schema, like any other structured store.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::Task;

const TASKS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/tasks.schema.json"
));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDocument {
    pub tasks: Vec<Task>,
}

/// Load an optional text artifact. `None` when the file does not exist.
pub fn load_text_artifact(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// Write a text artifact, creating `artifacts/` as needed.
pub fn write_text_artifact(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create artifact dir {}", parent.display()))?;
    }
    let mut buf = contents.trim_end().to_string();
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

/// Load and validate the task list (schema + parse). Missing file is an
/// empty plan.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_tasks(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Parse and validate a task document from raw JSON text.
pub fn parse_tasks(raw: &str) -> Result<Vec<Task>> {
    let value: Value = serde_json::from_str(raw).context("parse task json")?;
    validate_schema(&value)?;
    let document: TaskDocument =
        serde_json::from_value(value).context("deserialize task document")?;
    Ok(document.tasks)
}

/// Write the task list with canonical formatting.
pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let document = TaskDocument {
        tasks: tasks.to_vec(),
    };
    let mut buf = serde_json::to_string_pretty(&document)?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create artifact dir {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASKS_SCHEMA).context("parse tasks schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "task document schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Render the task summary grouped by execution layer.
///
/// When `only_layer` is set, the summary is filtered to that layer (the
/// per-layer view handed to a participant working that slice of the plan).
pub fn render_task_summary(
    tasks: &[Task],
    layers: &BTreeMap<String, u32>,
    only_layer: Option<u32>,
) -> String {
    let mut by_layer: BTreeMap<u32, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        let Some(&layer) = layers.get(&task.id) else {
            continue;
        };
        if only_layer.is_some_and(|wanted| wanted != layer) {
            continue;
        }
        by_layer.entry(layer).or_default().push(task);
    }

    let mut lines = Vec::new();
    for (layer, group) in &by_layer {
        lines.push(format!("## Layer {layer}"));
        for task in group {
            let assignee = task
                .assignee
                .as_deref()
                .map(|name| format!(" [{name}]"))
                .unwrap_or_default();
            lines.push(format!(
                "- {}{}: {} (done when: {})",
                task.id, assignee, task.description, task.done_when
            ));
            if let Some(notes) = &task.notes {
                lines.push(format!("  note: {notes}"));
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layering::assign_layers;
    use crate::test_support::task;

    #[test]
    fn text_artifact_absence_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let loaded = load_text_artifact(&temp.path().join("requirements.md")).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn text_artifact_round_trips_trimmed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("artifacts/requirements.md");
        write_text_artifact(&path, "The system shall frobnicate.\n\n").expect("write");
        let loaded = load_text_artifact(&path).expect("load");
        assert_eq!(loaded.as_deref(), Some("The system shall frobnicate."));
    }

    #[test]
    fn tasks_round_trip_through_schema_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("artifacts/tasks.json");
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        write_tasks(&path, &tasks).expect("write");
        let loaded = load_tasks(&path).expect("load");
        assert_eq!(loaded, tasks);
    }

    #[test]
    fn schema_rejects_a_task_without_id() {
        let raw = r#"{ "tasks": [ { "description": "x", "done_when": "y" } ] }"#;
        let err = parse_tasks(raw).expect_err("should fail");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn summary_groups_by_layer_and_filters() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &[])];
        let layers = assign_layers(&tasks).expect("layers");

        let full = render_task_summary(&tasks, &layers, None);
        assert!(full.contains("## Layer 0"));
        assert!(full.contains("## Layer 1"));
        assert!(full.contains("- a"));
        assert!(full.contains("- b"));

        let only_one = render_task_summary(&tasks, &layers, Some(1));
        assert!(only_one.contains("- b"));
        assert!(!only_one.contains("- a"));
        assert!(!only_one.contains("## Layer 0"));
    }
}
