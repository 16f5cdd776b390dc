use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::providers::{check_status, CompletionRequest, CompletionService, ProviderError, ProviderResult};

const SERVICE: &str = "Azure OpenAI";

/// Chat-completions client. `endpoint` is the full deployment URL including
/// `api-version`.
pub struct AzureCompletion {
    endpoint: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl AzureCompletion {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl CompletionService for AzureCompletion {
    fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        let body = chat_body(request);
        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()?;
        let parsed: ChatResponse = check_status(SERVICE, resp)?.json()?;
        let content = first_content(parsed)?;
        debug!("Completion reply: {}", content);
        Ok(content)
    }
}

fn chat_body(request: &CompletionRequest) -> ChatRequest<'_> {
    ChatRequest {
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system_role,
            },
            ChatMessage {
                role: "user",
                content: &request.prompt,
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

fn first_content(resp: ChatResponse) -> ProviderResult<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::Decode("completion has no content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_carries_system_and_user_messages() {
        let req = CompletionRequest {
            system_role: "role".into(),
            prompt: "prompt".into(),
            temperature: 0.3,
            max_tokens: 100,
        };
        let body = serde_json::to_value(chat_body(&req)).unwrap();
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "role"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "prompt"}));
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn empty_choices_are_a_decode_error() {
        let resp: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(first_content(resp), Err(ProviderError::Decode(_))));

        let resp: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": "{}"}}]})).unwrap();
        assert_eq!(first_content(resp).unwrap(), "{}");
    }
}
