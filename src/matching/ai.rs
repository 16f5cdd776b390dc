use serde::Deserialize;
use tracing::{info, warn};

use crate::matching::context::TaskCatalog;
use crate::matching::text::clean_text;
use crate::providers::{value_to_id, CompletionRequest, CompletionService};

const SYSTEM_ROLE: &str = "You are a task matcher focusing on title keywords and project context.";
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 100;
const NO_MATCH: &str = "NO_MATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiMatch {
    pub task_id: u64,
    pub confidence: Confidence,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AiReply {
    #[serde(rename = "taskId")]
    task_id: serde_json::Value,
    confidence: Confidence,
}

/// Fallback matching tier backed by a completion service.
pub struct AiMatcher<'a> {
    service: &'a dyn CompletionService,
}

impl<'a> AiMatcher<'a> {
    pub fn new(service: &'a dyn CompletionService) -> Self {
        Self { service }
    }

    /// Ask the service to pick a task. Any failure is logged and treated as no match.
    pub fn ai_match(&self, subject: &str, catalog: &TaskCatalog) -> Option<AiMatch> {
        let request = CompletionRequest {
            system_role: SYSTEM_ROLE.to_string(),
            prompt: build_prompt(subject, catalog),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let reply = match self.service.complete(&request) {
            Ok(text) => text,
            Err(e) => {
                warn!("AI matching failed for {:?}: {}", subject, e);
                return None;
            }
        };

        let parsed = parse_reply(&reply);
        match parsed {
            Some(m) => info!("AI match for {:?}: task {} ({:?})", subject, m.task_id, m.confidence),
            None => info!("AI found no confident match for {:?}", subject),
        }
        parsed
    }
}

/// Prompt listing every task with its context, then the meeting subject.
pub fn build_prompt(subject: &str, catalog: &TaskCatalog) -> String {
    let mut tasks = String::new();
    for task in catalog.tasks() {
        let ctx = catalog.context(task.id);
        let project = ctx.and_then(|c| c.project_name.as_deref()).unwrap_or("");
        let keywords = ctx
            .map(|c| c.keywords.iter().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        tasks.push_str(&format!(
            "Task ID: {}\nTitle: {}\nProject: {}\nKeywords: {}\n\n",
            task.id, task.title, project, keywords
        ));
    }

    format!(
        r#"Match this meeting title with the most relevant task.

Meeting Title: {subject}

Available Tasks:
{tasks}
Instructions:
1. Match based on meeting title and task titles/keywords
2. Look for direct keyword matches first
3. Consider project context
4. For infrastructure/network meetings, prefer infrastructure tasks
5. For client-specific meetings, match to respective tasks

Response format:
{{
  "taskId": "numeric_id_or_{NO_MATCH}",
  "confidence": "high|medium|low"
}}
"#,
        subject = clean_text(subject, true),
    )
}

/// Pull the JSON object out of a reply (models like to wrap it in prose or
/// code fences) and read it strictly. Anything off-schema is no match.
pub fn parse_reply(reply: &str) -> Option<AiMatch> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }

    let parsed: AiReply = match serde_json::from_str(&reply[start..=end]) {
        Ok(r) => r,
        Err(e) => {
            warn!("Unparseable AI reply ({}): {}", e, reply.trim());
            return None;
        }
    };

    if parsed.confidence == Confidence::Low {
        return None;
    }
    if parsed.task_id.as_str() == Some(NO_MATCH) {
        return None;
    }

    let task_id = value_to_id(&parsed.task_id)?;
    Some(AiMatch {
        task_id,
        confidence: parsed.confidence,
    })
}
