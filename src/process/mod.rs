pub mod summary;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::attendance::{self, AttendanceSummary};
use crate::matching::ai::AiMatcher;
use crate::matching::context::TaskCatalog;
use crate::matching::match_subject;
use crate::models::{
    billable_hours, round_minutes, AttendanceRecord, MatchResult, MatchTier, Meeting, Outcome,
    ProcessingResult, Task, TimeEntry, UserIdentity,
};
use crate::providers::{CalendarProvider, CompletionService, TimeTracker};

pub use summary::RunSummary;

/// Work type used for meeting entries unless configured otherwise.
pub const DEFAULT_WORKTYPE_ID: u64 = 799573;

/// Role given to the stand-in attendee when attendance cannot be fetched.
const FALLBACK_ROLE: &str = "Organizer";

/// Per-run settings threaded through the processor.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserIdentity,
    pub person_id: u64,
    pub worktype_id: u64,
    /// Build entries but do not send them.
    pub dry_run: bool,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub results: Vec<ProcessingResult>,
    pub summary: RunSummary,
    pub duration_secs: f64,
}

pub struct MeetingProcessor<'a> {
    calendar: &'a dyn CalendarProvider,
    tracker: &'a dyn TimeTracker,
    ai: Option<AiMatcher<'a>>,
    catalog: &'a TaskCatalog,
    session: &'a Session,
}

impl<'a> MeetingProcessor<'a> {
    pub fn new(
        calendar: &'a dyn CalendarProvider,
        tracker: &'a dyn TimeTracker,
        ai: Option<&'a dyn CompletionService>,
        catalog: &'a TaskCatalog,
        session: &'a Session,
    ) -> Self {
        Self {
            calendar,
            tracker,
            ai: ai.map(AiMatcher::new),
            catalog,
            session,
        }
    }

    /// Process meetings in order. Always one result per meeting.
    pub fn process_all(&self, meetings: &[Meeting]) -> Vec<ProcessingResult> {
        let total = meetings.len();
        meetings
            .iter()
            .enumerate()
            .map(|(i, m)| {
                info!("[{}/{}] {}", i + 1, total, m.subject);
                self.process_meeting(m)
            })
            .collect()
    }

    /// Fetch attendance, reconcile, match, and post one meeting.
    pub fn process_meeting(&self, meeting: &Meeting) -> ProcessingResult {
        let user = &self.session.user;

        if meeting.scheduled_seconds() == 0 {
            info!("Skipping {:?}: zero scheduled duration", meeting.subject);
            let summary = attendance::reconcile(meeting, None, user);
            return build_result(meeting, &summary, MatchResult::none(), None, Outcome::ZeroDuration);
        }

        let records = self.fetch_attendance(meeting);
        let summary = attendance::reconcile(meeting, records.as_deref(), user);
        let hours = billable_hours(summary.max_duration_seconds);

        if hours == 0.0 {
            info!("Skipping {:?}: zero billable duration", meeting.subject);
            return build_result(meeting, &summary, MatchResult::none(), None, Outcome::ZeroDuration);
        }

        let matched = match_subject(&meeting.subject, self.catalog, self.ai.as_ref());
        let Some(task_id) = matched.task_id else {
            info!("No task match for {:?}", meeting.subject);
            return build_result(meeting, &summary, matched, None, Outcome::NoMatch);
        };

        let Some(task) = self.catalog.get(task_id) else {
            error!(
                "Matched task {} for {:?} is not in the catalog",
                task_id, meeting.subject
            );
            return build_result(meeting, &summary, matched, None, Outcome::UnknownTask { task_id });
        };

        let Some(project_id) = task.project_id else {
            error!("Task {} ({}) has no project; cannot post", task.id, task.title);
            return build_result(meeting, &summary, matched, Some(task), Outcome::MissingProject { task_id });
        };

        info!(
            "Matched {:?} to task {} ({}) via {}",
            meeting.subject,
            task.id,
            task.title,
            matched.tier.as_str()
        );

        let entry = TimeEntry {
            person_id: self.session.person_id,
            project_id,
            task_id: task.id,
            module_id: task.module_id,
            worktype_id: self.session.worktype_id,
            date: meeting.date(),
            hours,
            description: entry_description(&meeting.subject, summary.max_duration_seconds),
            billable: true,
        };

        let outcome = if self.session.dry_run {
            Outcome::DryRun
        } else {
            match self.tracker.post_time_entry(&entry) {
                Ok(()) => Outcome::Posted,
                Err(e) => {
                    warn!("Failed to post time entry for {:?}: {}", meeting.subject, e);
                    Outcome::PostFailed { error: e.to_string() }
                }
            }
        };

        build_result(meeting, &summary, matched, Some(task), outcome)
    }

    /// Best-effort attendance. `None` means the meeting is not an online one.
    fn fetch_attendance(&self, meeting: &Meeting) -> Option<Vec<AttendanceRecord>> {
        meeting.online_meeting_url.as_ref()?;
        match self.calendar.fetch_attendance(meeting) {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(
                    "Attendance unavailable for {:?} ({}); assuming full attendance",
                    meeting.subject, e
                );
                Some(vec![attendance::synthetic_record(
                    meeting,
                    &self.session.user,
                    Some(FALLBACK_ROLE),
                )])
            }
        }
    }
}

/// Entry description: subject plus the attended minutes.
pub fn entry_description(subject: &str, attended_seconds: u64) -> String {
    format!(
        "{} (Actual attendance: {} minutes)",
        subject,
        round_minutes(attended_seconds)
    )
}

fn build_result(
    meeting: &Meeting,
    summary: &AttendanceSummary,
    matched: MatchResult,
    task: Option<&Task>,
    outcome: Outcome,
) -> ProcessingResult {
    let zero = outcome == Outcome::ZeroDuration;
    ProcessingResult {
        subject: meeting.subject.clone(),
        start: meeting.start,
        scheduled_seconds: summary.scheduled_seconds,
        task_id: task.map(|t| t.id),
        task_title: task.map(|t| t.title.clone()),
        match_tier: if task.is_some() { matched.tier } else { MatchTier::None },
        billable_hours: if zero { 0.0 } else { billable_hours(summary.max_duration_seconds) },
        actual_seconds: summary.max_duration_seconds,
        attendee_count: summary.attendee_count(),
        average_attendance: summary.average_percentage(),
        max_attendance: summary.max_percentage(),
        attendees: summary.attendees.clone(),
        outcome,
    }
}

/// Load the task catalog. A run cannot proceed without one.
pub fn load_catalog(tracker: &dyn TimeTracker) -> Result<TaskCatalog> {
    let tasks = tracker.list_tasks().context("Failed to list tracker tasks")?;
    if tasks.is_empty() {
        bail!("No tasks found in the time tracker");
    }
    Ok(TaskCatalog::build(tasks, |pid| tracker.get_project(pid)))
}

/// Fetch the lookback window's meetings and process them all.
pub fn run_batch(
    calendar: &dyn CalendarProvider,
    tracker: &dyn TimeTracker,
    ai: Option<&dyn CompletionService>,
    catalog: &TaskCatalog,
    session: &Session,
    lookback_days: u32,
) -> Result<RunReport> {
    let start = Instant::now();
    let window_end = Utc::now();
    let window_start = window_end - Duration::days(i64::from(lookback_days));

    let meetings = calendar
        .fetch_meetings(window_start, window_end)
        .context("Failed to fetch meetings")?;

    let processor = MeetingProcessor::new(calendar, tracker, ai, catalog, session);
    let results = processor.process_all(&meetings);
    let summary = RunSummary::from_results(&results);

    let duration_secs = start.elapsed().as_secs_f64();
    info!(
        "Run complete: {} meetings, {} posted ({:.1}s)",
        summary.total, summary.posted, duration_secs
    );

    Ok(RunReport {
        window_start,
        window_end,
        results,
        summary,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_rounds_minutes() {
        assert_eq!(
            entry_description("Weekly Infra Sync", 3000),
            "Weekly Infra Sync (Actual attendance: 50 minutes)"
        );
        assert_eq!(
            entry_description("Standup", 89),
            "Standup (Actual attendance: 1 minutes)"
        );
        assert_eq!(
            entry_description("Standup", 90),
            "Standup (Actual attendance: 2 minutes)"
        );
    }
}
