use serde::{Deserialize, Serialize};

/// Kind of caller behind a verified bearer token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRole {
    /// End user of the chat application
    #[default]
    User,
    /// Trusted backend caller (purchase webhooks, admin tooling)
    Service,
}

/// Authenticated caller with the entitlement flags every downstream
/// component consumes
///
/// Produced once per request by the authentication layer; nothing below
/// the gateway re-derives roles or entitlements on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Ledger account identifier
    pub user_id: String,
    /// Caller kind
    #[serde(default)]
    pub role: PrincipalRole,
    /// Active subscription
    #[serde(default)]
    pub subscriber: bool,
    /// Request carries a custom provider key the identity provider vouches for
    #[serde(default)]
    pub custom_key: bool,
}

impl Principal {
    /// Create a plain user principal with no entitlements
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: PrincipalRole::User,
            subscriber: false,
            custom_key: false,
        }
    }

    /// Mark the subscription flag
    #[must_use]
    pub const fn with_subscriber(mut self, subscriber: bool) -> Self {
        self.subscriber = subscriber;
        self
    }

    /// Mark whether a usable custom key accompanies this request
    #[must_use]
    pub const fn with_custom_key(mut self, custom_key: bool) -> Self {
        self.custom_key = custom_key;
        self
    }

    /// Whether the caller may use premium models and premium tools
    pub const fn is_entitled(&self) -> bool {
        matches!(self.role, PrincipalRole::Service) || self.subscriber || self.custom_key
    }

    /// Whether credit debits are skipped for this caller
    ///
    /// Subscribers and custom-key holders pay through other channels;
    /// service callers are never metered.
    pub const fn is_billing_exempt(&self) -> bool {
        self.is_entitled()
    }
}
