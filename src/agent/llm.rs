//! Chat-completions client for the conversation agent.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. Used both for
//! tool-calling turns and for summarizing pruned conversation memory.

use crate::agent::agent_loop::ChatMessage;
use crate::agent::prompt;
use crate::agent::tools::{FunctionCall, ToolCall, ToolDefinition};
use crate::config::ModelConfig;
use crate::error::{JaltolError, Result};
use crate::models::Turn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// What the model decided to do with a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Final answer for the user.
    Answer(String),
    /// Tools to run before asking the model again.
    ToolCalls(Vec<ToolCall>),
}

/// A chat model capable of tool calling.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<Completion>;
}

/// Folds pruned turns into the running conversation summary.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, summary: Option<&str>, turns: &[Turn]) -> Result<String>;
}

/// Chat completions request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool call as carried on the wire: arguments are a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

/// Chat completions response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let tool_calls = message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    call_type: default_call_type(),
                    function: WireFunctionCall {
                        name: call.function.name.clone(),
                        arguments: match &call.function.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                })
                .collect()
        });

        Self {
            role: message.role.clone(),
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        // Unparseable arguments pass through as a string for the tool to reject.
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments));
        ToolCall {
            id: call.id,
            function: FunctionCall {
                name: call.function.name,
                arguments,
            },
        }
    }
}

impl ResponseMessage {
    fn into_completion(self) -> Completion {
        match self.tool_calls {
            Some(calls) if !calls.is_empty() => {
                Completion::ToolCalls(calls.into_iter().map(ToolCall::from).collect())
            }
            _ => Completion::Answer(self.content.unwrap_or_default()),
        }
    }
}

/// Client for an OpenAI-compatible chat completions API.
pub struct OpenAiClient {
    http_client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| JaltolError::ConfigMissing {
                key: "model.name".to_string(),
            })?;
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| JaltolError::ConfigMissing {
                key: "model.api_key".to_string(),
            })?;

        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                JaltolError::LanguageModel(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ResponseMessage> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: (!tools.is_empty()).then_some(tools),
            temperature: self.temperature,
        };

        debug!(
            "Sending chat request with {} messages and {} tools",
            messages.len(),
            tools.len()
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    JaltolError::LanguageModel(format!(
                        "request timed out after {}s",
                        self.timeout_seconds
                    ))
                } else if e.is_connect() {
                    JaltolError::LanguageModel(format!("cannot connect to {}", self.api_base))
                } else {
                    JaltolError::LanguageModel(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JaltolError::LanguageModel(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response.json().map_err(|e| {
            JaltolError::LanguageModel(format!("failed to parse response: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| JaltolError::LanguageModel("response has no choices".to_string()))
    }
}

impl LanguageModel for OpenAiClient {
    fn complete(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<Completion> {
        let completion = self.chat(messages, tools)?.into_completion();
        if let Completion::ToolCalls(calls) = &completion {
            debug!("Model requested {} tool call(s)", calls.len());
        }
        Ok(completion)
    }
}

impl Summarizer for OpenAiClient {
    fn summarize(&self, summary: Option<&str>, turns: &[Turn]) -> Result<String> {
        let prompt = prompt::summary_prompt(summary, turns);
        let message = self.chat(&[ChatMessage::user(prompt)], &[])?;
        let text = message.content.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            warn!("Summarizer returned an empty summary");
            return Err(JaltolError::LanguageModel(
                "summarizer returned an empty summary".to_string(),
            ));
        }
        Ok(text)
    }
}
