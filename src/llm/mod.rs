mod client;
mod parse;
mod types;

pub use client::ClaudeClient;
pub use parse::{parse_reply, AssistantReply};
pub use types::{GenerationError, GenerationRequest, LlmSettings, Message, TextGenerator};
