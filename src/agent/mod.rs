//! LLM agent modules for hydrological question answering.
//!
//! This module provides the tool-calling agent, its indicator tools and the
//! chat-completions client it talks to.

pub mod agent_loop;
pub mod llm;
pub mod prompt;
pub mod tools;

pub use agent_loop::{AgentConfig, ConversationAgent};
pub use llm::{OpenAiClient, Summarizer};
pub use tools::{IndicatorSettings, IndicatorTool, ToolRegistry};
