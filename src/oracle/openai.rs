//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{SnippetOracle, parse_lines};
use crate::config;
use crate::error::OracleError;

const TITLE_PROMPT: &str =
    "You are a helpful assistant that generates concise and descriptive titles for provided content.";

const CATEGORIES_PROMPT: &str = "You are an expert content analyzer. For the given content, generate EXACTLY THREE distinct categories that capture different aspects:\n\
1. Main Theme/Topic\n\
2. Technical/Historical Details\n\
3. Impact/Applications\n\n\
Rules:\n\
- Each category should be 2-3 words\n\
- Make categories specific to the content\n\
- No generic terms like 'Key Details' or 'Questions'\n\
- No numbers or prefixes\n\
Return exactly three lines, one category per line.";

const SNIPPETS_PROMPT: &str = "You select passages from a document that are relevant to a topic.\n\
Rules:\n\
- Return 2 or 3 passages, one per line\n\
- Copy each passage EXACTLY as it appears in the document, character for character\n\
- Each passage is a full sentence or a contiguous part of one\n\
- Passages must not overlap\n\
- No numbering, quotes or commentary";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct OpenAiOracle {
    client: Client,
    config: config::Oracle,
}

impl OpenAiOracle {
    pub fn new(config: config::Oracle) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        tracing::info!(url = %config.base_url, model = %config.model, "initializing snippet oracle");

        Ok(Self { client, config })
    }

    async fn complete(
        &self,
        system: &str,
        prompt: String,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        let mut req = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .json::<ApiErrorResponse>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(OracleError::Status { status, message });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(OracleError::EmptyReply);
        }

        tracing::debug!(reply_len = content.len(), "oracle reply received");
        Ok(content)
    }
}

#[async_trait]
impl SnippetOracle for OpenAiOracle {
    async fn title(&self, content: &str) -> Result<String, OracleError> {
        let prompt = format!(
            "Generate a concise and descriptive title for the following content:\n\n{content} under four words"
        );
        self.complete(TITLE_PROMPT, prompt, None, Some(12)).await
    }

    async fn categories(&self, content: &str) -> Result<Vec<String>, OracleError> {
        let prompt = format!("Generate three specific categories for this content:\n\n{content}");
        let reply = self.complete(CATEGORIES_PROMPT, prompt, Some(0.3), Some(50)).await?;
        Ok(parse_lines(&reply).into_iter().take(3).collect())
    }

    async fn snippets(&self, content: &str, category: &str) -> Result<Vec<String>, OracleError> {
        let prompt = format!("Topic: {category}\n\nDocument:\n{content}");
        let reply = self.complete(SNIPPETS_PROMPT, prompt, Some(0.0), Some(400)).await?;
        Ok(parse_lines(&reply))
    }
}
