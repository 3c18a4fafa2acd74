//! Agent loop for tool-based question answering.
//!
//! Each user query runs a bounded number of model iterations. The model
//! either answers or asks for tools; tool results, including failures, are
//! fed back as `tool` messages for the next iteration.

use crate::agent::llm::{Completion, LanguageModel};
use crate::agent::prompt::{FORCED_STOP_MESSAGE, SUMMARY_MESSAGE_PREFIX};
use crate::agent::tools::{ToolCall, ToolRegistry};
use crate::error::Result;
use crate::models::Role;
use crate::session::ConversationMemory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::new("assistant", "")
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new("tool", content)
        }
    }
}

/// Outcome of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub iterations: usize,
    pub tool_calls: usize,
    /// True when the iteration cap was hit before the model answered.
    pub stopped_early: bool,
}

/// The conversation agent.
pub struct ConversationAgent {
    config: AgentConfig,
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
}

impl ConversationAgent {
    pub fn new(config: AgentConfig, model: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>) -> Self {
        info!(
            "Initializing agent with {} tools, max {} iterations",
            tools.len(),
            config.max_iterations
        );
        Self {
            config,
            model,
            tools,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `input` given the prior conversation.
    ///
    /// Tool failures never abort the run. Only model failures are returned
    /// as errors.
    pub fn run(
        &self,
        system_prompt: &str,
        memory: &ConversationMemory,
        input: &str,
    ) -> Result<AgentReply> {
        let mut messages = initial_messages(system_prompt, memory, input);
        let definitions = self.tools.definitions();
        let mut tool_calls = 0;

        for iteration in 0..self.config.max_iterations {
            debug!("Agent iteration {}", iteration + 1);

            match self.model.complete(&messages, &definitions)? {
                Completion::Answer(text) => {
                    info!(
                        "Agent answered after {} iteration(s), {} tool call(s)",
                        iteration + 1,
                        tool_calls
                    );
                    return Ok(AgentReply {
                        text,
                        iterations: iteration + 1,
                        tool_calls,
                        stopped_early: false,
                    });
                }
                Completion::ToolCalls(calls) => {
                    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));

                    for call in calls {
                        let result = self.tools.execute(&call);
                        tool_calls += 1;
                        if !result.success {
                            debug!(
                                "Tool {} failed: {}",
                                call.function.name,
                                result.error.as_deref().unwrap_or_default()
                            );
                        }
                        messages.push(ChatMessage::tool(call.id, result.into_message_content()));
                        info!("Tool {} executed", call.function.name);
                    }
                }
            }
        }

        warn!(
            "Agent stopped after {} iterations without an answer",
            self.config.max_iterations
        );
        if let Some(last) = messages.iter().rev().find(|m| m.role == "tool") {
            debug!("Discarding partial tool result: {}", last.content);
        }

        Ok(AgentReply {
            text: FORCED_STOP_MESSAGE.to_string(),
            iterations: self.config.max_iterations,
            tool_calls,
            stopped_early: true,
        })
    }
}

/// System prompt, summary, verbatim turns, then the new input.
fn initial_messages(system_prompt: &str, memory: &ConversationMemory, input: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(memory.turns().len() + 3);
    messages.push(ChatMessage::system(system_prompt));

    if let Some(summary) = memory.summary() {
        messages.push(ChatMessage::system(format!(
            "{}{}",
            SUMMARY_MESSAGE_PREFIX, summary
        )));
    }

    for turn in memory.turns() {
        messages.push(match turn.role {
            Role::Human => ChatMessage::user(turn.text.clone()),
            Role::Ai => ChatMessage::assistant(turn.text.clone()),
        });
    }

    messages.push(ChatMessage::user(input));
    messages
}
