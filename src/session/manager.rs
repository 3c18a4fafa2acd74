//! Per-request session handling: restore memory, run the agent, persist.

use crate::agent::{prompt, ConversationAgent, Summarizer};
use crate::session::{ConversationMemory, MemoryCodec};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shown to the user whenever the agent fails.
pub const FALLBACK_MESSAGE: &str = "Something went wrong, contact the support team.";

/// Whether the request carried usable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBranch {
    Fresh,
    Resumed,
}

/// Response text plus the memory blob to store for the next request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub text: String,
    pub memory: Option<String>,
    pub branch: SessionBranch,
}

/// Runs queries against the agent with per-session memory.
pub struct SessionManager {
    agent: ConversationAgent,
    summarizer: Arc<dyn Summarizer>,
    codec: MemoryCodec,
    system_prompt: String,
    memory_token_limit: usize,
}

impl SessionManager {
    pub fn new(
        agent: ConversationAgent,
        summarizer: Arc<dyn Summarizer>,
        codec: MemoryCodec,
        memory_token_limit: usize,
    ) -> Self {
        let system_prompt = prompt::system_prompt(&agent.tools().topics());
        Self {
            agent,
            summarizer,
            codec,
            system_prompt,
            memory_token_limit,
        }
    }

    /// Decode stored memory. Unreadable memory starts a fresh session.
    pub fn restore(&self, stored: Option<&str>) -> (ConversationMemory, SessionBranch) {
        let Some(blob) = stored.filter(|b| !b.is_empty()) else {
            return (ConversationMemory::new(), SessionBranch::Fresh);
        };

        match self.codec.decode(blob) {
            Ok(memory) => (memory, SessionBranch::Resumed),
            Err(e) => {
                warn!("Discarding stored memory ({}): {}", e.kind(), e);
                (ConversationMemory::new(), SessionBranch::Fresh)
            }
        }
    }

    /// Answer one user query.
    ///
    /// Agent failures become [`FALLBACK_MESSAGE`] and leave memory untouched.
    pub fn query(&self, stored: Option<&str>, user_text: &str) -> QueryOutcome {
        let (mut memory, branch) = self.restore(stored);
        info!(
            "Running {:?} query with {} remembered turn(s)",
            branch,
            memory.turns().len()
        );

        let text = match self.agent.run(&self.system_prompt, &memory, user_text) {
            Ok(reply) => {
                if reply.stopped_early {
                    warn!(
                        "Query hit the iteration cap after {} tool call(s)",
                        reply.tool_calls
                    );
                } else {
                    debug!(
                        "Query answered in {} iteration(s) with {} tool call(s)",
                        reply.iterations, reply.tool_calls
                    );
                }
                memory.push_exchange(user_text, reply.text.clone());
                if let Err(e) = memory.compact(self.memory_token_limit, self.summarizer.as_ref()) {
                    warn!("Failed to summarize conversation, keeping full buffer: {}", e);
                }
                reply.text
            }
            Err(e) => {
                error!(
                    "Error occurred in [{}], line [{}], [{}: {}]",
                    file!(),
                    line!(),
                    e.kind(),
                    e
                );
                FALLBACK_MESSAGE.to_string()
            }
        };

        let memory = match self.codec.encode(&memory) {
            Ok(blob) => Some(blob),
            Err(e) => {
                error!("Failed to store conversation memory: {}", e);
                None
            }
        };

        QueryOutcome {
            text,
            memory,
            branch,
        }
    }
}
