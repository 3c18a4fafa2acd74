//! Conversation sessions.
//!
//! Memory travels with the client in a signed cookie; the server keeps no
//! per-session state.

pub mod codec;
pub mod manager;
pub mod memory;

pub use codec::MemoryCodec;
pub use manager::{SessionManager, FALLBACK_MESSAGE};
pub use memory::ConversationMemory;
