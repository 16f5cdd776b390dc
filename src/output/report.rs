use anyhow::Context;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::{Outcome, ProcessingResult};
use crate::process::RunReport;

/// `meeting_processing_YYYYmmdd_HHMMSS.txt` in the working directory.
pub fn default_report_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("meeting_processing_{}.txt", now.format("%Y%m%d_%H%M%S")))
}

/// Long-form duration used in the exported report.
fn spelled_duration(seconds: u64) -> String {
    format!(
        "{} hours, {} minutes, {} seconds",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Render the plain-text report for a finished run.
pub fn render(report: &RunReport, generated: DateTime<Local>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_report(&mut out, report, generated)?;
    Ok(out)
}

fn write_report(out: &mut impl fmt::Write, report: &RunReport, generated: DateTime<Local>) -> fmt::Result {
    let s = &report.summary;

    writeln!(out, "Meeting Processing Report")?;
    writeln!(out, "Generated: {}\n", generated.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Summary Statistics")?;
    writeln!(out, "-----------------")?;
    writeln!(out, "Total Meetings: {}", s.total)?;
    writeln!(out, "Matched: {}", s.matched)?;
    writeln!(out, "Posted: {}", s.posted)?;
    writeln!(out, "Total Billable Hours: {}\n", s.total_billable_hours)?;

    writeln!(out, "Detailed Results")?;
    writeln!(out, "---------------\n")?;

    for r in &report.results {
        write_result(out, r)?;
    }
    Ok(())
}

fn write_result(out: &mut impl fmt::Write, r: &ProcessingResult) -> fmt::Result {
    writeln!(out, "Meeting: {}", r.subject)?;
    writeln!(out, "Time: {}", r.start.format("%Y-%m-%d %H:%M"))?;
    writeln!(out, "Status: {}", r.match_status())?;
    writeln!(out, "Task: {}", r.task_title.as_deref().unwrap_or("No match"))?;
    writeln!(out, "Match Tier: {}", r.match_tier.as_str())?;
    writeln!(out, "Posted: {}", r.outcome.label())?;
    writeln!(out, "Duration: {} hours", r.billable_hours)?;
    writeln!(out, "Actual Minutes: {}", r.actual_minutes())?;
    writeln!(out, "Scheduled Duration: {}", spelled_duration(r.scheduled_seconds))?;
    writeln!(out, "Number of Attendees: {}", r.attendee_count)?;
    writeln!(out, "Average Attendance: {:.1}%", r.average_attendance)?;
    writeln!(out, "Max Attendance: {:.1}%", r.max_attendance)?;

    if !r.attendees.is_empty() {
        writeln!(out, "\nAttendees:")?;
        for a in &r.attendees {
            writeln!(out, "  - {} ({})", a.name, a.email)?;
            writeln!(out, "    Duration: {}", spelled_duration(a.duration_seconds))?;
            writeln!(out, "    Attendance: {:.1}%", a.percentage)?;
        }
    }
    if let Outcome::PostFailed { error } = &r.outcome {
        writeln!(out, "Error: {error}")?;
    }
    writeln!(out)
}

/// Write the report to `path`, returning the path written.
pub fn export(report: &RunReport, path: &Path) -> anyhow::Result<PathBuf> {
    let content = render(report, Local::now()).context("Failed to render report")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(path.to_path_buf())
}
