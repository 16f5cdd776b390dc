use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{AttendanceRecord, Meeting};
use crate::providers::{check_status, CalendarProvider, ProviderError, ProviderResult};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const SERVICE: &str = "Microsoft Graph";
const UTC_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const EVENT_FIELDS: &str = "subject,start,end,onlineMeeting,bodyPreview";

/// The signed-in calendar account.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphUser {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "userPrincipalName")]
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

pub struct GraphCalendar {
    access_token: String,
    base_url: String,
    user: GraphUser,
    client: reqwest::blocking::Client,
}

impl GraphCalendar {
    /// Connect with an access token and resolve the signed-in user.
    pub fn connect(access_token: String, base_url: Option<String>) -> ProviderResult<Self> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::blocking::Client::new();

        let resp = client
            .get(format!("{base_url}/me"))
            .bearer_auth(&access_token)
            .send()?;
        let user: GraphUser = check_status(SERVICE, resp)?.json()?;
        info!(
            "Calendar account: {}",
            user.user_principal_name.as_deref().unwrap_or(&user.id)
        );

        Ok(Self {
            access_token,
            base_url,
            user,
            client,
        })
    }

    pub fn user(&self) -> &GraphUser {
        &self.user
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> ProviderResult<serde_json::Value> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Prefer", UTC_TIMEZONE_HEADER)
            .query(query)
            .send()?;
        Ok(check_status(SERVICE, resp)?.json()?)
    }
}

impl CalendarProvider for GraphCalendar {
    fn fetch_meetings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<Vec<Meeting>> {
        let filter = format!(
            "start/dateTime ge '{}' and end/dateTime le '{}'",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        info!("Retrieving meetings from {} to {}", start, end);

        let mut meetings = Vec::new();
        let mut page = self.get_json(
            &format!("{}/me/events", self.base_url),
            &[
                ("$filter", filter),
                ("$select", EVENT_FIELDS.to_string()),
                ("$orderby", "start/dateTime".to_string()),
            ],
        )?;

        loop {
            let parsed: EventsPage = serde_json::from_value(page)?;
            meetings.extend(usable_meetings(parsed.value));
            match parsed.next_link {
                // nextLink already carries the query string
                Some(next) => page = self.get_json(&next, &[])?,
                None => break,
            }
        }

        info!("Found {} meetings", meetings.len());
        Ok(meetings)
    }

    fn fetch_attendance(&self, meeting: &Meeting) -> ProviderResult<Vec<AttendanceRecord>> {
        let join_url = meeting
            .online_meeting_url
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidReference("meeting has no join URL".into()))?;
        let meeting_id = online_meeting_id(join_url)?;
        let base = format!(
            "{}/users/{}/onlineMeetings/{}/attendanceReports",
            self.base_url, self.user.id, meeting_id
        );

        let reports: ListResponse<AttendanceReport> =
            serde_json::from_value(self.get_json(&base, &[])?)?;
        let report = reports
            .value
            .first()
            .ok_or_else(|| ProviderError::NotFound(format!("attendance report for {:?}", meeting.subject)))?;

        let records: ListResponse<GraphAttendanceRecord> =
            serde_json::from_value(self.get_json(&format!("{base}/{}/attendanceRecords", report.id), &[])?)?;
        if records.value.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "attendance records for {:?}",
                meeting.subject
            )));
        }

        Ok(records.value.into_iter().map(GraphAttendanceRecord::into_record).collect())
    }
}

/// Convert a page of events, dropping any whose times cannot be read.
fn usable_meetings(events: Vec<GraphEvent>) -> Vec<Meeting> {
    events
        .into_iter()
        .filter_map(|event| {
            let subject = event.subject.clone().unwrap_or_default();
            match event.into_meeting() {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Skipping event {:?}: {}", subject, e);
                    None
                }
            }
        })
        .collect()
}

/// Derive the Graph online-meeting id from a Teams join URL.
///
/// The id is base64 of `1*{organizer oid}*0**{thread id}`, both parts taken
/// from the URL-encoded join link.
pub fn online_meeting_id(join_url: &str) -> ProviderResult<String> {
    let decoded = urlencoding::decode(join_url)
        .map_err(|e| ProviderError::InvalidReference(format!("undecodable join URL: {e}")))?;

    let thread_re = Regex::new(r"19:meeting_([^@]+)@thread\.v2").map_err(|e| ProviderError::Decode(e.to_string()))?;
    let oid_re = Regex::new(r#""Oid":"([^"]+)""#).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let thread = thread_re
        .captures(&decoded)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ProviderError::InvalidReference("no meeting thread id in join URL".into()))?;
    let oid = oid_re
        .captures(&decoded)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ProviderError::InvalidReference("no organizer id in join URL".into()))?;

    let raw = format!("1*{}*0**19:meeting_{}@thread.v2", oid.as_str(), thread.as_str());
    Ok(STANDARD.encode(raw.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    subject: Option<String>,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(rename = "onlineMeeting")]
    online_meeting: Option<GraphOnlineMeeting>,
    #[serde(rename = "bodyPreview")]
    body_preview: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[derive(Debug, Deserialize)]
struct GraphOnlineMeeting {
    #[serde(rename = "joinUrl")]
    join_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttendanceReport {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphAttendanceRecord {
    identity: Option<GraphIdentity>,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
    #[serde(rename = "totalAttendanceInSeconds")]
    total_attendance_in_seconds: Option<u64>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphIdentity {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

impl GraphEvent {
    fn into_meeting(self) -> ProviderResult<Meeting> {
        Ok(Meeting {
            subject: self.subject.unwrap_or_default(),
            start: parse_graph_datetime(&self.start.date_time)?,
            end: parse_graph_datetime(&self.end.date_time)?,
            online_meeting_url: self.online_meeting.and_then(|m| m.join_url),
            description: self.body_preview.filter(|b| !b.trim().is_empty()),
        })
    }
}

impl GraphAttendanceRecord {
    fn into_record(self) -> AttendanceRecord {
        AttendanceRecord {
            name: self.identity.and_then(|i| i.display_name),
            email: self.email_address,
            duration_seconds: self.total_attendance_in_seconds,
            role: self.role,
        }
    }
}

/// Graph returns `2024-05-06T14:00:00.0000000` (zone given separately, UTC
/// because of the Prefer header); accept RFC 3339 as well.
pub fn parse_graph_datetime(s: &str) -> ProviderResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ProviderError::Decode(format!("bad event time {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const JOIN_URL: &str = "https://teams.microsoft.com/l/meetup-join/19%3ameeting_NTg0MmYx%40thread.v2/0?context=%7b%22Tid%22%3a%22t-1%22%2c%22Oid%22%3a%22org-42%22%7d";

    #[test]
    fn meeting_id_is_derived_from_join_url() {
        let id = online_meeting_id(JOIN_URL).unwrap();
        let decoded = String::from_utf8(STANDARD.decode(id).unwrap()).unwrap();
        assert_eq!(decoded, "1*org-42*0**19:meeting_NTg0MmYx@thread.v2");
    }

    #[test]
    fn join_url_without_organizer_is_rejected() {
        let url = "https://teams.microsoft.com/l/meetup-join/19%3ameeting_abc%40thread.v2/0";
        assert!(matches!(
            online_meeting_id(url),
            Err(ProviderError::InvalidReference(_))
        ));
    }

    #[test]
    fn parses_graph_and_rfc3339_times() {
        let want = Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).unwrap();
        assert_eq!(parse_graph_datetime("2024-05-06T14:00:00.0000000").unwrap(), want);
        assert_eq!(parse_graph_datetime("2024-05-06T14:00:00Z").unwrap(), want);
        assert_eq!(parse_graph_datetime("2024-05-06T16:00:00+02:00").unwrap(), want);
        assert!(parse_graph_datetime("yesterday").is_err());
    }

    #[test]
    fn events_page_maps_to_meetings() {
        let page: EventsPage = serde_json::from_value(json!({
            "value": [
                {
                    "subject": "Weekly Infra Sync",
                    "bodyPreview": "  ",
                    "start": {"dateTime": "2024-05-06T14:00:00.0000000", "timeZone": "UTC"},
                    "end": {"dateTime": "2024-05-06T15:00:00.0000000", "timeZone": "UTC"},
                    "onlineMeeting": {"joinUrl": JOIN_URL}
                },
                {
                    "subject": null,
                    "start": {"dateTime": "2024-05-07T09:00:00.0000000", "timeZone": "UTC"},
                    "end": {"dateTime": "2024-05-07T09:30:00.0000000", "timeZone": "UTC"},
                    "onlineMeeting": null
                }
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/events?$skip=10"
        }))
        .unwrap();

        assert!(page.next_link.is_some());
        let meetings: Vec<Meeting> = page
            .value
            .into_iter()
            .map(|e| e.into_meeting().unwrap())
            .collect();
        assert_eq!(meetings[0].scheduled_seconds(), 3600);
        assert_eq!(meetings[0].online_meeting_url.as_deref(), Some(JOIN_URL));
        assert_eq!(meetings[0].description, None);
        assert_eq!(meetings[1].subject, "");
        assert!(meetings[1].online_meeting_url.is_none());
    }

    #[test]
    fn unreadable_event_times_skip_only_that_event() {
        let page: EventsPage = serde_json::from_value(json!({
            "value": [
                {
                    "subject": "Broken",
                    "start": {"dateTime": "not a time", "timeZone": "UTC"},
                    "end": {"dateTime": "2024-05-06T15:00:00.0000000", "timeZone": "UTC"}
                },
                {
                    "subject": "Standup",
                    "start": {"dateTime": "2024-05-07T09:00:00.0000000", "timeZone": "UTC"},
                    "end": {"dateTime": "2024-05-07T09:15:00.0000000", "timeZone": "UTC"}
                }
            ]
        }))
        .unwrap();

        let meetings = usable_meetings(page.value);
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].subject, "Standup");
        assert_eq!(meetings[0].scheduled_seconds(), 900);
    }

    #[test]
    fn attendance_records_keep_missing_fields_absent() {
        let list: ListResponse<GraphAttendanceRecord> = serde_json::from_value(json!({
            "value": [
                {
                    "identity": {"displayName": "Lee Park"},
                    "emailAddress": "lee@example.com",
                    "totalAttendanceInSeconds": 3000,
                    "role": "Presenter"
                },
                {"identity": {}, "totalAttendanceInSeconds": 1200}
            ]
        }))
        .unwrap();
        let records: Vec<AttendanceRecord> =
            list.value.into_iter().map(GraphAttendanceRecord::into_record).collect();
        assert_eq!(records[0].name.as_deref(), Some("Lee Park"));
        assert_eq!(records[0].duration_seconds, Some(3000));
        assert_eq!(records[1].name, None);
        assert_eq!(records[1].email, None);
    }
}
