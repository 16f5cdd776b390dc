use serde::Serialize;
use tracing::debug;

use crate::models::{AttendanceRecord, AttendeeBreakdown, Meeting, UserIdentity};

/// Display names the calendar uses when it cannot resolve an attendee.
const PLACEHOLDER_NAMES: &[&str] = &["Unknown User"];
/// Email values that mean "no real address".
const PLACEHOLDER_EMAILS: &[&str] = &["No Email"];

/// Reconciled attendance of one meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub scheduled_seconds: u64,
    /// Sorted by duration, longest first.
    pub attendees: Vec<AttendeeBreakdown>,
    /// Longest single attendance; the billable basis.
    pub max_duration_seconds: u64,
}

impl AttendanceSummary {
    pub fn attendee_count(&self) -> usize {
        self.attendees.len()
    }

    pub fn average_percentage(&self) -> f64 {
        if self.attendees.is_empty() {
            return 0.0;
        }
        self.attendees.iter().map(|a| a.percentage).sum::<f64>() / self.attendees.len() as f64
    }

    pub fn max_percentage(&self) -> f64 {
        self.attendees
            .iter()
            .map(|a| a.percentage)
            .fold(0.0, f64::max)
    }
}

/// Percent of the scheduled window an attendee was present. Zero when nothing was scheduled.
pub fn attendance_percentage(duration_seconds: u64, scheduled_seconds: u64) -> f64 {
    if scheduled_seconds == 0 {
        return 0.0;
    }
    duration_seconds as f64 / scheduled_seconds as f64 * 100.0
}

/// Single attendee standing in for missing attendance data: the current user,
/// present for the whole scheduled window.
pub fn synthetic_record(meeting: &Meeting, user: &UserIdentity, role: Option<&str>) -> AttendanceRecord {
    AttendanceRecord {
        name: Some(user.name.clone()),
        email: Some(user.email.clone()),
        duration_seconds: Some(meeting.scheduled_seconds()),
        role: role.map(str::to_string),
    }
}

/// Derive per-attendee breakdown and the billable-relevant duration.
///
/// With no usable records the current user is assumed to have attended the
/// whole meeting. Records without a duration are ignored.
pub fn reconcile(meeting: &Meeting, records: Option<&[AttendanceRecord]>, user: &UserIdentity) -> AttendanceSummary {
    let scheduled = meeting.scheduled_seconds();

    let mut attendees: Vec<AttendeeBreakdown> = records
        .unwrap_or_default()
        .iter()
        .filter_map(|r| {
            let duration = r.duration_seconds?;
            Some(AttendeeBreakdown {
                name: resolve_name(r.name.as_deref(), user),
                email: resolve_email(r.email.as_deref(), user),
                duration_seconds: duration,
                percentage: attendance_percentage(duration, scheduled),
                role: r.role.clone(),
            })
        })
        .collect();

    if attendees.is_empty() {
        debug!("No attendance data for {:?}, using scheduled duration", meeting.subject);
        attendees.push(AttendeeBreakdown {
            name: user.name.clone(),
            email: user.email.clone(),
            duration_seconds: scheduled,
            percentage: 100.0,
            role: None,
        });
    }

    // sort_by is stable: equal durations keep record order
    attendees.sort_by(|a, b| b.duration_seconds.cmp(&a.duration_seconds));

    let max_duration_seconds = attendees.first().map(|a| a.duration_seconds).unwrap_or(scheduled);

    AttendanceSummary {
        scheduled_seconds: scheduled,
        attendees,
        max_duration_seconds,
    }
}

fn resolve_name(name: Option<&str>, user: &UserIdentity) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() && !PLACEHOLDER_NAMES.contains(&n) => n.to_string(),
        _ => user.name.clone(),
    }
}

fn resolve_email(email: Option<&str>, user: &UserIdentity) -> String {
    match email.map(str::trim) {
        Some(e) if !e.is_empty() && !PLACEHOLDER_EMAILS.contains(&e) && !user.is_alias(e) => e.to_string(),
        _ => user.email.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn meeting(minutes: i64) -> Meeting {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).unwrap();
        Meeting {
            subject: "Weekly Infra Sync".into(),
            start,
            end: start + Duration::minutes(minutes),
            online_meeting_url: None,
            description: None,
        }
    }

    fn user() -> UserIdentity {
        UserIdentity {
            name: "Dana Reyes".into(),
            email: "dana@example.com".into(),
            aliases: vec!["0f3c-graph-object-id".into()],
        }
    }

    fn record(name: Option<&str>, email: Option<&str>, secs: Option<u64>) -> AttendanceRecord {
        AttendanceRecord {
            name: name.map(str::to_string),
            email: email.map(str::to_string),
            duration_seconds: secs,
            role: None,
        }
    }

    #[test]
    fn no_records_synthesize_current_user() {
        let s = reconcile(&meeting(45), None, &user());
        assert_eq!(s.attendee_count(), 1);
        assert_eq!(s.attendees[0].name, "Dana Reyes");
        assert_eq!(s.attendees[0].duration_seconds, 2700);
        assert_eq!(s.attendees[0].percentage, 100.0);
        assert_eq!(s.max_duration_seconds, 2700);

        let empty: Vec<AttendanceRecord> = Vec::new();
        assert_eq!(reconcile(&meeting(45), Some(empty.as_slice()), &user()).attendee_count(), 1);
    }

    #[test]
    fn records_without_duration_are_ignored() {
        let records = vec![record(Some("Sam"), Some("sam@example.com"), None)];
        let s = reconcile(&meeting(30), Some(records.as_slice()), &user());
        assert_eq!(s.attendee_count(), 1);
        assert_eq!(s.attendees[0].name, "Dana Reyes");
    }

    #[test]
    fn thirty_minute_meeting_fully_attended() {
        let records = vec![record(Some("Sam"), Some("sam@example.com"), Some(1800))];
        let s = reconcile(&meeting(30), Some(records.as_slice()), &user());
        assert_eq!(s.max_duration_seconds, 1800);
        assert_eq!(s.attendees[0].percentage, 100.0);
        assert_eq!(crate::models::billable_hours(s.max_duration_seconds), 0.5);
    }

    #[test]
    fn breakdown_is_sorted_and_max_drives_billing() {
        let records = vec![
            record(Some("Sam"), Some("sam@example.com"), Some(1200)),
            record(Some("Lee"), Some("lee@example.com"), Some(3000)),
        ];
        let s = reconcile(&meeting(60), Some(records.as_slice()), &user());
        let durations: Vec<u64> = s.attendees.iter().map(|a| a.duration_seconds).collect();
        assert_eq!(durations, vec![3000, 1200]);
        assert_eq!(s.max_duration_seconds, 3000);
        assert_eq!(crate::models::billable_hours(s.max_duration_seconds), 0.8);
        assert!((s.average_percentage() - (3000.0 + 1200.0) / 3600.0 * 50.0).abs() < 1e-9);
        assert!((s.max_percentage() - 3000.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn equal_durations_keep_record_order() {
        let records = vec![
            record(Some("First"), Some("a@example.com"), Some(600)),
            record(Some("Second"), Some("b@example.com"), Some(900)),
            record(Some("Third"), Some("c@example.com"), Some(600)),
        ];
        let s = reconcile(&meeting(30), Some(records.as_slice()), &user());
        let names: Vec<&str> = s.attendees.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First", "Third"]);
    }

    #[test]
    fn placeholders_become_current_user() {
        let records = vec![
            record(Some("Unknown User"), Some("No Email"), Some(1000)),
            record(None, Some("0f3c-graph-object-id"), Some(900)),
            record(Some("Sam"), None, Some(800)),
        ];
        let s = reconcile(&meeting(30), Some(records.as_slice()), &user());
        assert_eq!(s.attendees[0].name, "Dana Reyes");
        assert_eq!(s.attendees[0].email, "dana@example.com");
        assert_eq!(s.attendees[1].name, "Dana Reyes");
        assert_eq!(s.attendees[1].email, "dana@example.com");
        assert_eq!(s.attendees[2].name, "Sam");
        assert_eq!(s.attendees[2].email, "dana@example.com");
    }

    #[test]
    fn percentage_is_monotonic_in_duration() {
        let mut last = -1.0;
        for secs in (0..=7200).step_by(300) {
            let p = attendance_percentage(secs, 3600);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(attendance_percentage(600, 0), 0.0);
    }

    #[test]
    fn zero_length_meeting_has_zero_max() {
        let s = reconcile(&meeting(0), None, &user());
        assert_eq!(s.max_duration_seconds, 0);
        assert_eq!(s.attendee_count(), 1);
    }
}
