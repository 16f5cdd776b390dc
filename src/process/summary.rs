use serde::Serialize;

use crate::models::{round_tenths, ProcessingResult};

/// Run-level statistics over the ordered per-meeting results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub matched: usize,
    pub posted: usize,
    pub unmatched: usize,
    /// Percent of meetings matched, one decimal. `None` for an empty run.
    pub match_rate: Option<f64>,
    /// Percent of matched meetings posted, one decimal. `None` when nothing matched.
    pub post_rate: Option<f64>,
    pub total_billable_hours: f64,
    /// Posted entries per task title, in first-posted order.
    pub task_distribution: Vec<(String, usize)>,
}

impl RunSummary {
    pub fn from_results(results: &[ProcessingResult]) -> Self {
        let total = results.len();
        let matched = results.iter().filter(|r| r.outcome.is_matched()).count();
        let posted_results: Vec<&ProcessingResult> =
            results.iter().filter(|r| r.outcome.is_posted()).collect();
        let posted = posted_results.len();

        let total_billable_hours =
            round_tenths(posted_results.iter().map(|r| r.billable_hours).sum::<f64>());

        let mut task_distribution: Vec<(String, usize)> = Vec::new();
        for r in &posted_results {
            let title = r.task_title.clone().unwrap_or_default();
            match task_distribution.iter_mut().find(|(t, _)| *t == title) {
                Some((_, count)) => *count += 1,
                None => task_distribution.push((title, 1)),
            }
        }

        RunSummary {
            total,
            matched,
            posted,
            unmatched: total - matched,
            match_rate: percent(matched, total),
            post_rate: percent(posted, matched),
            total_billable_hours,
            task_distribution,
        }
    }
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(round_tenths(part as f64 / whole as f64 * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchTier, Outcome};
    use chrono::{TimeZone, Utc};

    fn result(title: Option<&str>, outcome: Outcome, hours: f64) -> ProcessingResult {
        ProcessingResult {
            subject: "m".into(),
            start: Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
            scheduled_seconds: 3600,
            task_id: title.map(|_| 1),
            task_title: title.map(str::to_string),
            match_tier: MatchTier::Direct,
            outcome,
            billable_hours: hours,
            actual_seconds: 3600,
            attendee_count: 1,
            average_attendance: 100.0,
            max_attendance: 100.0,
            attendees: Vec::new(),
        }
    }

    #[test]
    fn counts_rates_and_distribution() {
        let results = vec![
            result(Some("Infra Sync"), Outcome::Posted, 0.8),
            result(Some("Budget"), Outcome::Posted, 1.0),
            result(Some("Infra Sync"), Outcome::Posted, 0.5),
            result(Some("Budget"), Outcome::PostFailed { error: "500".into() }, 1.0),
            result(None, Outcome::NoMatch, 1.0),
            result(None, Outcome::ZeroDuration, 0.0),
        ];
        let s = RunSummary::from_results(&results);
        assert_eq!(s.total, 6);
        assert_eq!(s.matched, 4);
        assert_eq!(s.posted, 3);
        assert_eq!(s.unmatched, 2);
        assert_eq!(s.match_rate, Some(66.7));
        assert_eq!(s.post_rate, Some(75.0));
        assert_eq!(s.total_billable_hours, 2.3);
        assert_eq!(
            s.task_distribution,
            vec![("Infra Sync".to_string(), 2), ("Budget".to_string(), 1)]
        );
    }

    #[test]
    fn rates_on_exact_ties_round_to_even() {
        // 1 of 16 matched: 6.25%
        let mut results = vec![result(Some("Infra Sync"), Outcome::Posted, 0.2)];
        results.extend((0..15).map(|_| result(None, Outcome::NoMatch, 0.5)));
        let s = RunSummary::from_results(&results);
        assert_eq!(s.match_rate, Some(6.2));
        assert_eq!(s.post_rate, Some(100.0));
    }

    #[test]
    fn empty_run_has_no_rates() {
        let s = RunSummary::from_results(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.match_rate, None);
        assert_eq!(s.post_rate, None);
        assert_eq!(s.total_billable_hours, 0.0);
    }
}
