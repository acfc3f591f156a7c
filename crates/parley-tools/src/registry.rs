//! Persona and tool registry
//!
//! The registry also stores the tool-call log, so [`RegistryClient`]
//! implements both [`ToolRegistry`] and [`ToolCallLog`].

use std::collections::HashMap;

use async_trait::async_trait;
use parley_config::RegistryConfig;
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::ToolError;
use crate::log::{ToolCallLog, ToolCallLogEntry};
use crate::tool::{Persona, Tool};

/// Read-only view of personas and tool definitions
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Fetch a persona; `None` when it does not exist
    async fn persona(&self, persona_id: &str) -> Result<Option<Persona>, ToolError>;

    /// Fetch tool definitions by id, skipping unknown ids
    async fn tools(&self, tool_ids: &[String]) -> Result<Vec<Tool>, ToolError>;
}

/// HTTP client for the registry service
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    service_key: SecretString,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            service_key: config.service_key.clone(),
        })
    }

    /// Base URL that local tool routes resolve against
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Response>, ToolError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .bearer_auth(self.service_key.expose_secret())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        check_status(response).await.map(Some)
    }
}

async fn check_status(response: Response) -> Result<Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ToolError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ToolRegistry for RegistryClient {
    async fn persona(&self, persona_id: &str) -> Result<Option<Persona>, ToolError> {
        match self.get(&format!("personas/{persona_id}"), &[]).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn tools(&self, tool_ids: &[String]) -> Result<Vec<Tool>, ToolError> {
        if tool_ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = tool_ids.join(",");
        match self.get("tools", &[("ids", &ids)]).await? {
            Some(response) => Ok(response.json().await?),
            None => Ok(vec![]),
        }
    }
}

#[async_trait]
impl ToolCallLog for RegistryClient {
    async fn lookup(&self, user_id: &str, call_id: &str) -> Result<Option<ToolCallLogEntry>, ToolError> {
        match self
            .get("tool-calls", &[("user_id", user_id), ("call_id", call_id)])
            .await?
        {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn record(&self, entry: &ToolCallLogEntry) -> Result<(), ToolError> {
        let response = self
            .http
            .post(self.url("tool-calls"))
            .bearer_auth(self.service_key.expose_secret())
            .json(entry)
            .send()
            .await?;

        // 409: an entry for this call already exists
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }

        check_status(response).await.map(|_| ())
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Fixed in-process registry
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    personas: HashMap<String, Persona>,
    tools: HashMap<String, Tool>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.personas.insert(persona.id.clone(), persona);
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.insert(tool.id.clone(), tool);
        self
    }
}

#[async_trait]
impl ToolRegistry for StaticRegistry {
    async fn persona(&self, persona_id: &str) -> Result<Option<Persona>, ToolError> {
        Ok(self.personas.get(persona_id).cloned())
    }

    async fn tools(&self, tool_ids: &[String]) -> Result<Vec<Tool>, ToolError> {
        Ok(tool_ids.iter().filter_map(|id| self.tools.get(id).cloned()).collect())
    }
}
