use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

use crate::error::ToolError;
use crate::internal;
use crate::tool::{Tool, ToolEndpoint};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs tools behind one call shape: JSON arguments in, JSON result out
#[derive(Clone)]
pub struct ToolExecutor {
    http: reqwest::Client,
    /// Host for local routes and its credential
    local: Option<(Url, SecretString)>,
}

impl ToolExecutor {
    pub fn new(local: Option<(Url, SecretString)>) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { http, local })
    }

    /// Executor that can only run internal functions and remote URLs
    pub fn without_local_routes() -> Result<Self, ToolError> {
        Self::new(None)
    }

    pub async fn execute(&self, tool: &Tool, args: &Value) -> Result<Value, ToolError> {
        match &tool.endpoint {
            ToolEndpoint::Internal(name) => internal::call(name, args),
            ToolEndpoint::Remote(url) => self.post(url.as_str(), None, args).await,
            ToolEndpoint::LocalRoute(route) => {
                let (base, key) = self
                    .local
                    .as_ref()
                    .ok_or_else(|| ToolError::Execution(format!("no host configured for route {route}")))?;
                let url = format!("{}{route}", base.as_str().trim_end_matches('/'));
                self.post(&url, Some(key), args).await
            }
        }
    }

    async fn post(&self, url: &str, key: Option<&SecretString>, args: &Value) -> Result<Value, ToolError> {
        let mut builder = self.http.post(url).json(args);
        if let Some(key) = key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!("endpoint returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("endpoint returned invalid JSON: {e}")))
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("local", &self.local.as_ref().map(|(url, _)| url))
            .finish_non_exhaustive()
    }
}
