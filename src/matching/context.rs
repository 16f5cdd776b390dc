use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::matching::text::tokenize;
use crate::models::{Project, Task};
use crate::providers::ProviderError;

/// Derived matching context for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskContext {
    pub title_words: Vec<String>,
    pub project_name: Option<String>,
    /// Title and project tokens, lowercase, deduplicated.
    pub keywords: BTreeSet<String>,
}

/// The task list plus per-task context. Built once per run, read-only after.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
    context: HashMap<u64, TaskContext>,
}

impl TaskCatalog {
    /// Build context for every task. `project_lookup` is called at most once per
    /// distinct project id; failures only drop that project's keywords.
    pub fn build<F>(tasks: Vec<Task>, mut project_lookup: F) -> Self
    where
        F: FnMut(u64) -> Result<Project, ProviderError>,
    {
        info!("Building task context for {} tasks", tasks.len());

        let mut project_names: HashMap<u64, Option<String>> = HashMap::new();
        let mut context = HashMap::with_capacity(tasks.len());

        for task in &tasks {
            let title_words = tokenize(&task.title);
            let mut keywords: BTreeSet<String> = title_words.iter().cloned().collect();

            let project_name = task.project_id.and_then(|pid| {
                project_names
                    .entry(pid)
                    .or_insert_with(|| match project_lookup(pid) {
                        Ok(project) => Some(project.name),
                        Err(e) => {
                            warn!("Unable to fetch project {} for task {}: {}", pid, task.id, e);
                            None
                        }
                    })
                    .clone()
            });

            if let Some(ref name) = project_name {
                keywords.extend(tokenize(name));
            }

            debug!(task_id = task.id, keywords = ?keywords, "task context");

            context.insert(
                task.id,
                TaskContext {
                    title_words,
                    project_name,
                    keywords,
                },
            );
        }

        TaskCatalog { tasks, context }
    }

    /// Tasks in catalog order (the tie-break order for matching).
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, task_id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn context(&self, task_id: u64) -> Option<&TaskContext> {
        self.context.get(&task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn task(id: u64, title: &str, project_id: Option<u64>) -> Task {
    Task {
        id,
        title: title.to_string(),
        project_id,
        module_id: None,
    }
}
