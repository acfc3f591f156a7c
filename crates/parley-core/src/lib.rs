#![allow(clippy::must_use_candidate)]

pub mod chat;
pub mod error;
pub mod principal;
pub mod tool_call;

pub use chat::{ChatMessage, ChatRequest, MessageRole};
pub use error::HttpError;
pub use principal::{Principal, PrincipalRole};
pub use tool_call::{RawFunction, RawToolCall, ToolInvocation};
