use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A calendar meeting as fetched from the provider. Never mutated after fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Join URL of the online meeting, if the event is a virtual one.
    pub online_meeting_url: Option<String>,
    pub description: Option<String>,
}

impl Meeting {
    /// Scheduled length in seconds. Clamped at zero for inverted windows.
    pub fn scheduled_seconds(&self) -> u64 {
        (self.end - self.start).num_seconds().max(0) as u64
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: Option<String>,
    pub email: Option<String>,
    pub duration_seconds: Option<u64>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub project_id: Option<u64>,
    pub module_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

/// The person the tracker token belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUser {
    pub person_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: Option<String>,
}

impl TrackerUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Who "the current user" is when attendance data is missing or anonymized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
    /// Other strings the calendar uses to refer to this user (e.g. an object id
    /// in place of an email address).
    pub aliases: Vec<String>,
}

impl UserIdentity {
    pub fn is_alias(&self, value: &str) -> bool {
        value.eq_ignore_ascii_case(&self.email) || self.aliases.iter().any(|a| a == value)
    }
}

/// A billable entry ready to be sent to the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    #[serde(rename = "personid")]
    pub person_id: u64,
    #[serde(rename = "projectid")]
    pub project_id: u64,
    #[serde(rename = "taskid")]
    pub task_id: u64,
    #[serde(rename = "moduleid", skip_serializing_if = "Option::is_none")]
    pub module_id: Option<u64>,
    #[serde(rename = "worktypeid")]
    pub worktype_id: u64,
    #[serde(with = "tracker_date")]
    pub date: NaiveDate,
    #[serde(rename = "time")]
    pub hours: f64,
    pub description: String,
    pub billable: bool,
}

mod tracker_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// How a task was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    Direct,
    AiHigh,
    AiMedium,
    None,
}

impl MatchTier {
    pub fn as_str(&self) -> &str {
        match self {
            MatchTier::Direct => "direct",
            MatchTier::AiHigh => "ai-high",
            MatchTier::AiMedium => "ai-medium",
            MatchTier::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub task_id: Option<u64>,
    pub tier: MatchTier,
    /// Overlap ratio for direct matches.
    pub score: Option<f64>,
}

impl MatchResult {
    pub fn none() -> Self {
        MatchResult {
            task_id: None,
            tier: MatchTier::None,
            score: None,
        }
    }
}

/// Terminal state of one meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Posted,
    DryRun,
    ZeroDuration,
    NoMatch,
    UnknownTask { task_id: u64 },
    MissingProject { task_id: u64 },
    PostFailed { error: String },
}

impl Outcome {
    pub fn is_posted(&self) -> bool {
        matches!(self, Outcome::Posted)
    }

    pub fn is_matched(&self) -> bool {
        matches!(
            self,
            Outcome::Posted | Outcome::DryRun | Outcome::PostFailed { .. }
        )
    }

    /// Short label used in the console table and report file.
    pub fn label(&self) -> String {
        match self {
            Outcome::Posted => "Yes".to_string(),
            Outcome::DryRun => "Dry Run".to_string(),
            Outcome::ZeroDuration => "No - Zero Duration".to_string(),
            Outcome::NoMatch => "No".to_string(),
            Outcome::UnknownTask { task_id } => format!("No - Unknown Task {task_id}"),
            Outcome::MissingProject { task_id } => format!("No - Task {task_id} Has No Project"),
            Outcome::PostFailed { .. } => "Failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeBreakdown {
    pub name: String,
    pub email: String,
    pub duration_seconds: u64,
    pub percentage: f64,
    pub role: Option<String>,
}

/// Per-meeting record kept for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub subject: String,
    pub start: DateTime<Utc>,
    pub scheduled_seconds: u64,
    pub task_id: Option<u64>,
    pub task_title: Option<String>,
    pub match_tier: MatchTier,
    pub outcome: Outcome,
    pub billable_hours: f64,
    pub actual_seconds: u64,
    pub attendee_count: usize,
    pub average_attendance: f64,
    pub max_attendance: f64,
    pub attendees: Vec<AttendeeBreakdown>,
}

impl ProcessingResult {
    pub fn match_status(&self) -> &str {
        if self.outcome.is_matched() {
            "Matched"
        } else {
            "Not Matched"
        }
    }

    pub fn actual_minutes(&self) -> u64 {
        round_minutes(self.actual_seconds)
    }
}

/// Seconds to whole minutes. An exact half minute rounds to the even neighbour.
pub fn round_minutes(seconds: u64) -> u64 {
    let (whole, rest) = (seconds / 60, seconds % 60);
    if rest > 30 || (rest == 30 && whole % 2 == 1) {
        whole + 1
    } else {
        whole
    }
}

/// Nearest tenth of the exact binary value of `x`; exact ties go to even.
pub fn round_tenths(x: f64) -> f64 {
    // `{:.1}` is correctly rounded (half to even), unlike scaling and `f64::round`.
    format!("{x:.1}").parse().unwrap_or(x)
}

/// Seconds to decimal hours rounded to one fractional digit.
pub fn billable_hours(seconds: u64) -> f64 {
    round_tenths(seconds as f64 / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn billable_hours_rounds_to_one_decimal() {
        assert_eq!(billable_hours(1800), 0.5);
        assert_eq!(billable_hours(3000), 0.8);
        assert_eq!(billable_hours(3600), 1.0);
        assert_eq!(billable_hours(170), 0.0);
        assert_eq!(billable_hours(0), 0.0);
    }

    #[test]
    fn billable_hours_ties_round_to_even() {
        assert_eq!(billable_hours(900), 0.2);
        assert_eq!(billable_hours(2700), 0.8);
        assert_eq!(billable_hours(4500), 1.2);
        assert_eq!(billable_hours(8100), 2.2);
        // 0.35 h is stored just below 0.35, so it is not a tie
        assert_eq!(billable_hours(1260), 0.3);
    }

    #[test]
    fn minutes_ties_round_to_even() {
        assert_eq!(round_minutes(89), 1);
        assert_eq!(round_minutes(90), 2);
        assert_eq!(round_minutes(150), 2);
        assert_eq!(round_minutes(151), 3);
        assert_eq!(round_minutes(3000), 50);
    }

    #[test]
    fn tenths_follow_exact_value() {
        assert_eq!(round_tenths(6.25), 6.2);
        assert_eq!(round_tenths(6.75), 6.8);
        assert_eq!(round_tenths(66.66666666666667), 66.7);
        assert_eq!(round_tenths(0.0), 0.0);
    }

    #[test]
    fn scheduled_seconds_clamps_inverted_windows() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let m = Meeting {
            subject: "x".into(),
            start,
            end: start - chrono::Duration::minutes(5),
            online_meeting_url: None,
            description: None,
        };
        assert_eq!(m.scheduled_seconds(), 0);
    }

    #[test]
    fn time_entry_uses_tracker_field_names() {
        let entry = TimeEntry {
            person_id: 7,
            project_id: 3,
            task_id: 42,
            module_id: None,
            worktype_id: 799573,
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            hours: 0.8,
            description: "Weekly Infra Sync".into(),
            billable: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["personid"], 7);
        assert_eq!(json["taskid"], 42);
        assert_eq!(json["date"], "2024-03-04");
        assert_eq!(json["time"], 0.8);
        assert!(json.get("moduleid").is_none());
    }

    #[test]
    fn only_posted_like_outcomes_count_as_matched() {
        assert!(Outcome::Posted.is_matched());
        assert!(Outcome::PostFailed { error: "503".into() }.is_matched());
        assert!(!Outcome::NoMatch.is_matched());
        assert!(!Outcome::UnknownTask { task_id: 1 }.is_matched());
        assert!(!Outcome::ZeroDuration.is_matched());
    }
}
