use std::collections::BTreeSet;
use tracing::debug;

use crate::matching::context::TaskCatalog;
use crate::matching::text::tokenize;

/// A direct match must cover more than half of the subject's tokens.
pub const DIRECT_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectMatch {
    pub task_id: u64,
    pub score: f64,
}

/// Fraction of subject tokens found in the keyword set. Zero for token-less subjects.
pub fn overlap_score(subject_tokens: &[String], keywords: &BTreeSet<String>) -> f64 {
    if subject_tokens.is_empty() {
        return 0.0;
    }
    let hits = subject_tokens
        .iter()
        .filter(|word| keywords.contains(*word))
        .count();
    hits as f64 / subject_tokens.len() as f64
}

/// Best task by keyword overlap, or `None` when no task clears the threshold.
/// Ties go to the task that comes first in the catalog.
pub fn direct_match(subject: &str, catalog: &TaskCatalog) -> Option<DirectMatch> {
    let tokens = tokenize(subject);
    let mut best: Option<DirectMatch> = None;

    for task in catalog.tasks() {
        let score = match catalog.context(task.id) {
            Some(ctx) => overlap_score(&tokens, &ctx.keywords),
            None => 0.0,
        };
        let current = best.map(|b| b.score).unwrap_or(0.0);
        if score > current {
            best = Some(DirectMatch {
                task_id: task.id,
                score,
            });
        }
    }

    match best {
        Some(m) if m.score > DIRECT_MATCH_THRESHOLD => {
            debug!("Direct match for {:?}: task {} (score {:.2})", subject, m.task_id, m.score);
            Some(m)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::context::task;
    use crate::models::Project;
    use crate::providers::ProviderError;

    fn catalog(tasks: Vec<crate::models::Task>) -> TaskCatalog {
        TaskCatalog::build(tasks, |pid| match pid {
            10 => Ok(Project {
                id: 10,
                name: "Network".into(),
            }),
            _ => Err(ProviderError::NotFound(format!("project {pid}"))),
        })
    }

    #[test]
    fn weekly_infra_sync_matches_infra_task() {
        let c = catalog(vec![
            task(7, "Client onboarding", None),
            task(42, "Infra Sync", Some(10)),
        ]);
        let m = direct_match("Weekly Infra Sync", &c).unwrap();
        assert_eq!(m.task_id, 42);
        assert!((m.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_subject_has_no_match() {
        let c = catalog(vec![task(42, "Infra Sync", Some(10))]);
        assert_eq!(direct_match("Random Chat", &c), None);
    }

    #[test]
    fn exactly_half_is_not_enough() {
        let c = catalog(vec![task(1, "Budget review", None)]);
        assert_eq!(direct_match("Budget kickoff", &c), None);
    }

    #[test]
    fn score_ignores_case_and_order() {
        let c = catalog(vec![task(42, "Infra Sync", Some(10))]);
        let a = direct_match("Weekly Infra Sync", &c).unwrap();
        let b = direct_match("SYNC infra WEEKLY", &c).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ties_resolve_to_first_task_in_catalog_order() {
        let c = catalog(vec![
            task(3, "Design review", None),
            task(1, "Design review", None),
            task(2, "Design review", None),
        ]);
        for _ in 0..3 {
            assert_eq!(direct_match("Design review", &c).unwrap().task_id, 3);
        }
    }

    #[test]
    fn higher_score_beats_earlier_task() {
        let c = catalog(vec![
            task(1, "Security audit", None),
            task(2, "Security audit planning", None),
        ]);
        let m = direct_match("Security audit planning", &c).unwrap();
        assert_eq!(m.task_id, 2);
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn token_less_subject_scores_zero() {
        let empty: Vec<String> = Vec::new();
        let kw: BTreeSet<String> = ["sync".to_string()].into_iter().collect();
        assert_eq!(overlap_score(&empty, &kw), 0.0);
    }
}
