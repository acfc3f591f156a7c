use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use mini_moka::sync::Cache;
use parley_config::IdentityConfig;
use parley_core::{Principal, PrincipalRole};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::AuthError;

/// Verified identity and entitlement claims for a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityClaims {
    #[serde(alias = "userId", alias = "sub")]
    pub user_id: String,
    #[serde(default)]
    pub role: PrincipalRole,
    /// Active subscription
    #[serde(default, alias = "isSubscriber")]
    pub subscriber: bool,
    /// User has registered a custom provider key
    #[serde(default, alias = "hasCustomKey")]
    pub has_custom_key: bool,
}

impl IdentityClaims {
    /// Build the request principal
    ///
    /// A custom key counts only when the request carries one and the
    /// identity provider confirms the user registered it.
    pub fn principal(&self, request_has_custom_key: bool) -> Principal {
        Principal {
            user_id: self.user_id.clone(),
            role: self.role,
            subscriber: self.subscriber,
            custom_key: self.has_custom_key && request_has_custom_key,
        }
    }
}

/// Exchanges bearer tokens for identity claims
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Arc<IdentityClaims>, AuthError>;
}

/// Extract the bearer token from request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Identity provider client with a TTL cache of verified tokens
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    verify_url: Url,
    service_key: SecretString,
    cache: Cache<String, Arc<IdentityClaims>>,
}

impl IdentityClient {
    /// Create a new identity client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &IdentityConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;

        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .max_capacity(config.cache_capacity)
            .build();

        Ok(Self {
            http,
            verify_url: config.verify_url.clone(),
            service_key: config.service_key.clone(),
            cache,
        })
    }

    /// Drop a cached verification (e.g. after a subscription change)
    pub fn invalidate(&self, token: &str) {
        self.cache.invalidate(&sha256_hex(token));
    }
}

#[async_trait]
impl IdentityVerifier for IdentityClient {
    async fn verify(&self, token: &str) -> Result<Arc<IdentityClaims>, AuthError> {
        let cache_key = sha256_hex(token);

        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let response = self
            .http
            .post(self.verify_url.clone())
            .bearer_auth(self.service_key.expose_secret())
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?;

        let status = response.status();

        if matches!(status.as_u16(), 401 | 403 | 404) {
            return Err(AuthError::InvalidToken);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let claims: IdentityClaims = response.json().await.map_err(|e| AuthError::Api {
            status: status.as_u16(),
            message: format!("failed to parse response: {e}"),
        })?;

        if claims.user_id.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let claims = Arc::new(claims);
        self.cache.insert(cache_key, Arc::clone(&claims));

        Ok(claims)
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("verify_url", &self.verify_url)
            .finish_non_exhaustive()
    }
}

/// Tokens are cached by digest so raw credentials never sit in memory keys
fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}
