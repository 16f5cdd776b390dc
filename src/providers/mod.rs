pub mod azure_openai;
pub mod graph;
pub mod intervals;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AttendanceRecord, Meeting, Project, Task, TimeEntry, TrackerUser};

/// Failure reaching or understanding an external service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid meeting reference: {0}")]
    InvalidReference(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Source of meetings and their attendance.
pub trait CalendarProvider {
    /// Meetings whose scheduled window lies inside `[start, end]`, in provider order.
    fn fetch_meetings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<Vec<Meeting>>;

    /// Attendance records of an online meeting. Meetings without a join URL
    /// yield `InvalidReference`.
    fn fetch_attendance(&self, meeting: &Meeting) -> ProviderResult<Vec<AttendanceRecord>>;
}

/// The time-tracking service that owns tasks and receives entries.
pub trait TimeTracker {
    fn current_user(&self) -> ProviderResult<TrackerUser>;

    fn list_tasks(&self) -> ProviderResult<Vec<Task>>;

    fn get_project(&self, project_id: u64) -> ProviderResult<Project>;

    fn post_time_entry(&self, entry: &TimeEntry) -> ProviderResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_role: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-completion endpoint used by the AI matching tier.
pub trait CompletionService {
    fn complete(&self, request: &CompletionRequest) -> ProviderResult<String>;
}

/// Turn a non-2xx blocking response into `ProviderError::Status`.
pub(crate) fn check_status(
    service: &'static str,
    resp: reqwest::blocking::Response,
) -> ProviderResult<reqwest::blocking::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(format!("{service}: {body}")));
    }
    Err(ProviderError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Read an id that may arrive as a JSON number or a numeric string.
pub(crate) fn value_to_id(v: &serde_json::Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}
