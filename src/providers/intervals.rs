use serde_json::Value;
use tracing::{debug, info};

use crate::auth::encode_basic_auth;
use crate::matching::text::clean_text;
use crate::models::{Project, Task, TimeEntry, TrackerUser};
use crate::providers::{check_status, value_to_id, ProviderError, ProviderResult, TimeTracker};

pub const DEFAULT_BASE_URL: &str = "https://api.myintervals.com";
const SERVICE: &str = "Intervals";
const TASK_PAGE_LIMIT: u32 = 500;

pub struct IntervalsTracker {
    auth_header: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl IntervalsTracker {
    pub fn new(api_token: &str, base_url: Option<String>) -> Self {
        Self {
            auth_header: format!("Basic {}", encode_basic_auth(api_token)),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn get_json(&self, path: &str) -> ProviderResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()?;
        Ok(check_status(SERVICE, resp)?.json()?)
    }
}

impl TimeTracker for IntervalsTracker {
    fn current_user(&self) -> ProviderResult<TrackerUser> {
        let json = self.get_json("/me/")?;
        let me = first_item(&json, "me").ok_or_else(|| ProviderError::Decode("no user in /me response".into()))?;
        let user = parse_user(me)?;
        info!("Tracker account: {} ({})", user.display_name(), user.person_id);
        Ok(user)
    }

    fn list_tasks(&self) -> ProviderResult<Vec<Task>> {
        collect_task_pages(TASK_PAGE_LIMIT, |offset| {
            self.get_json(&format!("/task/?limit={TASK_PAGE_LIMIT}&offset={offset}"))
        })
    }

    fn get_project(&self, project_id: u64) -> ProviderResult<Project> {
        let json = self.get_json(&format!("/project/{project_id}/"))?;
        let project = first_item(&json, "project")
            .ok_or_else(|| ProviderError::NotFound(format!("project {project_id}")))?;
        let name = project
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ProviderError::Decode(format!("project {project_id} has no name")))?;
        Ok(Project {
            id: project_id,
            name: name.to_string(),
        })
    }

    fn post_time_entry(&self, entry: &TimeEntry) -> ProviderResult<()> {
        let mut entry = entry.clone();
        entry.description = clean_text(&entry.description, true);

        let url = format!("{}/time/", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .json(&entry)
            .send()?;
        check_status(SERVICE, resp)?;
        info!("Posted time entry ({} hours) for task {}", entry.hours, entry.task_id);
        Ok(())
    }
}

/// Intervals wraps single resources as `{"<kind>": [ {...} ]}` or `{"<kind>": {...}}`.
fn first_item<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    match json.get(key)? {
        Value::Array(items) => items.first(),
        obj @ Value::Object(_) => Some(obj),
        _ => None,
    }
}

fn parse_user(v: &Value) -> ProviderResult<TrackerUser> {
    let text = |key: &str| v.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let person_id = v
        .get("personid")
        .and_then(value_to_id)
        .or_else(|| v.get("id").and_then(value_to_id))
        .ok_or_else(|| ProviderError::Decode("user has no personid".into()))?;

    Ok(TrackerUser {
        person_id,
        first_name: text("firstname"),
        last_name: text("lastname"),
        username: text("username"),
        email: v
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
    })
}

/// Fetch `/task/` pages by offset until a short page comes back.
fn collect_task_pages<F>(limit: u32, mut fetch_page: F) -> ProviderResult<Vec<Task>>
where
    F: FnMut(u32) -> ProviderResult<Value>,
{
    let mut tasks = Vec::new();
    let mut offset = 0;
    loop {
        let json = fetch_page(offset)?;
        let rows = match json.get("task") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        };
        tasks.extend(rows.iter().filter_map(parse_task));
        debug!("Task page at offset {}: {} rows", offset, rows.len());
        if rows.len() < limit as usize {
            break;
        }
        offset += limit;
    }
    info!("Loaded {} tasks", tasks.len());
    Ok(tasks)
}

/// Tasks without a usable id are skipped.
fn parse_task(v: &Value) -> Option<Task> {
    let id = v.get("id").and_then(value_to_id)?;
    Some(Task {
        id,
        title: v
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled")
            .to_string(),
        project_id: v.get("projectid").and_then(value_to_id),
        module_id: v.get("moduleid").and_then(value_to_id),
    })
}
