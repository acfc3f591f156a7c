#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
pub mod executor;
mod internal;
pub mod log;
pub mod registry;
pub mod router;
pub mod schema;
mod tool;

pub use error::ToolError;
pub use executor::ToolExecutor;
pub use log::{MemoryToolCallLog, ToolCallLog, ToolCallLogEntry};
pub use registry::{RegistryClient, StaticRegistry, ToolRegistry};
pub use router::{ToolBatch, ToolResult, ToolRouter};
pub use tool::{Persona, Tool, ToolEndpoint};
