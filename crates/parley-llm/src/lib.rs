#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod dispatcher;
pub mod error;
mod protocol;
pub mod provider;
pub mod types;

pub use dispatcher::ProviderDispatcher;
pub use error::{DispatchError, LlmError};
pub use provider::{ChatProvider, EventStream};
pub use types::{CompletionRequest, ProviderConfig, ProviderFamily, StreamEvent, TokenUsage, ToolSpec};
