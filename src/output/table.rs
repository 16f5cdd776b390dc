use unicode_width::UnicodeWidthStr;

use crate::matching::context::TaskCatalog;
use crate::models::ProcessingResult;
use crate::process::{RunReport, RunSummary};

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
pub(crate) fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Left-align to a display width; `{:<n}` pads by chars, which misaligns wide glyphs.
fn pad(s: &str, width: usize) -> String {
    let t = truncate(s, width);
    let w = UnicodeWidthStr::width(t.as_str());
    format!("{t}{}", " ".repeat(width.saturating_sub(w)))
}

/// Per-meeting results table.
pub fn print_results(results: &[ProcessingResult]) {
    if results.is_empty() {
        println!("No meetings found in the window.");
        return;
    }

    println!(
        "{} meeting{}:\n",
        results.len(),
        if results.len() == 1 { "" } else { "s" }
    );

    println!(
        "  {} {:<17} {} {:>6} {:<10} {}",
        pad("MEETING", 36),
        "START",
        pad("TASK", 26),
        "HOURS",
        "MATCH",
        "POSTED"
    );
    println!("  {}", "-".repeat(112));

    for r in results {
        let task = r.task_title.as_deref().unwrap_or("-");
        println!(
            "  {} {:<17} {} {:>6.1} {:<10} {}",
            pad(&r.subject, 36),
            r.start.format("%Y-%m-%d %H:%M"),
            pad(task, 26),
            r.billable_hours,
            r.match_tier.as_str(),
            r.outcome.label(),
        );
        println!(
            "  {:36} attended {} of {}, {} attendee{}, avg {:.0}%, max {:.0}%",
            "",
            format_duration(r.actual_seconds),
            format_duration(r.scheduled_seconds),
            r.attendee_count,
            if r.attendee_count == 1 { "" } else { "s" },
            r.average_attendance,
            r.max_attendance,
        );
    }
    println!();
}

/// Run statistics block.
pub fn print_summary(summary: &RunSummary) {
    println!("Processing Summary:");
    println!("  Total Meetings:       {}", summary.total);
    println!("  Successfully Matched: {}", summary.matched);
    println!("  Time Entries Posted:  {}", summary.posted);
    println!("  Unmatched Meetings:   {}", summary.unmatched);
    if let Some(rate) = summary.match_rate {
        println!("  Match Success Rate:   {rate}%");
    }
    if let Some(rate) = summary.post_rate {
        println!("  Post Success Rate:    {rate}%");
    }
    println!("\n  Total Billable Hours: {} hours", summary.total_billable_hours);

    if !summary.task_distribution.is_empty() {
        println!("\n  Task Distribution:");
        for (task, count) in &summary.task_distribution {
            println!(
                "    {} {} entr{}",
                pad(task, 40),
                count,
                if *count == 1 { "y" } else { "ies" }
            );
        }
    }
}

pub fn print_report(report: &RunReport) {
    println!(
        "Window: {} to {}\n",
        report.window_start.format("%Y-%m-%d %H:%M"),
        report.window_end.format("%Y-%m-%d %H:%M")
    );
    print_results(&report.results);
    print_summary(&report.summary);
    let secs = report.duration_secs as u64;
    println!(
        "\nTotal processing time: {} minutes and {} seconds",
        secs / 60,
        secs % 60
    );
}

/// Task catalog with derived matching context.
pub fn print_catalog(catalog: &TaskCatalog) {
    if catalog.is_empty() {
        println!("No tasks found.");
        return;
    }

    println!("{} task{}:\n", catalog.len(), if catalog.len() == 1 { "" } else { "s" });
    println!("  {:<10} {} {}", "ID", pad("TITLE", 36), "PROJECT");
    println!("  {}", "-".repeat(76));

    for task in catalog.tasks() {
        let ctx = catalog.context(task.id);
        let project = ctx.and_then(|c| c.project_name.as_deref()).unwrap_or("-");
        println!("  {:<10} {} {}", task.id, pad(&task.title, 36), truncate(project, 28));
        if let Some(ctx) = ctx {
            let keywords: Vec<&str> = ctx.keywords.iter().map(String::as_str).collect();
            println!("  {:<10} keywords: {}\n", "", truncate(&keywords.join(", "), 64));
        }
    }
}
