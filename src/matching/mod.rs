pub mod ai;
pub mod context;
pub mod direct;
pub mod text;

use crate::models::{MatchResult, MatchTier};
use ai::{AiMatcher, Confidence};
use context::TaskCatalog;

/// Run the matching tiers in order: direct keywords, then AI if available.
pub fn match_subject(subject: &str, catalog: &TaskCatalog, ai: Option<&AiMatcher<'_>>) -> MatchResult {
    if let Some(m) = direct::direct_match(subject, catalog) {
        return MatchResult {
            task_id: Some(m.task_id),
            tier: MatchTier::Direct,
            score: Some(m.score),
        };
    }

    let Some(ai) = ai else {
        return MatchResult::none();
    };

    match ai.ai_match(subject, catalog) {
        Some(m) => MatchResult {
            task_id: Some(m.task_id),
            tier: match m.confidence {
                Confidence::High => MatchTier::AiHigh,
                _ => MatchTier::AiMedium,
            },
            score: None,
        },
        None => MatchResult::none(),
    }
}
