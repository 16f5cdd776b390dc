use anyhow::Result;
use serde::Serialize;

use crate::matching::context::{TaskCatalog, TaskContext};
use crate::models::{MatchResult, Task};

/// One row of `meetbill tasks --json`.
#[derive(Debug, Serialize)]
pub struct CatalogRow<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub project_name: Option<&'a str>,
    pub keywords: Vec<&'a str>,
}

/// `meetbill match --json` output.
#[derive(Debug, Serialize)]
pub struct MatchPreview<'a> {
    pub subject: &'a str,
    #[serde(flatten)]
    pub result: MatchResult,
    pub task: Option<&'a Task>,
}

pub fn catalog_rows(catalog: &TaskCatalog) -> Vec<CatalogRow<'_>> {
    catalog
        .tasks()
        .iter()
        .map(|task| {
            let ctx: Option<&TaskContext> = catalog.context(task.id);
            CatalogRow {
                task,
                project_name: ctx.and_then(|c| c.project_name.as_deref()),
                keywords: ctx
                    .map(|c| c.keywords.iter().map(String::as_str).collect())
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Pretty-print to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::context::task;
    use crate::models::{MatchTier, Project};
    use serde_json::json;

    #[test]
    fn catalog_rows_flatten_task_fields() {
        let catalog = TaskCatalog::build(vec![task(42, "Infra Sync", Some(1))], |id| {
            Ok(Project {
                id,
                name: "Network".into(),
            })
        });
        let rows = serde_json::to_value(catalog_rows(&catalog)).unwrap();
        assert_eq!(rows[0]["id"], 42);
        assert_eq!(rows[0]["project_name"], "Network");
        assert_eq!(rows[0]["keywords"], json!(["infra", "network", "sync"]));
    }

    #[test]
    fn match_preview_reports_tier() {
        let t = task(42, "Infra Sync", Some(1));
        let preview = MatchPreview {
            subject: "Weekly Infra Sync",
            result: MatchResult {
                task_id: Some(42),
                tier: MatchTier::Direct,
                score: Some(2.0 / 3.0),
            },
            task: Some(&t),
        };
        let v = serde_json::to_value(&preview).unwrap();
        assert_eq!(v["tier"], "direct");
        assert_eq!(v["task"]["title"], "Infra Sync");
    }
}
