use std::collections::HashSet;

use parley_config::BillingConfig;
use parley_core::Principal;

/// Something only entitled callers may use
pub trait PremiumGated {
    fn requires_premium(&self) -> bool;
}

/// Outcome of a model authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Proceed; `billed` is false for callers exempt from credit debits
    Allow { billed: bool },
    Deny(DenyReason),
}

/// Machine-readable denial reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Premium model without subscription or custom key
    PremiumRequired,
}

impl DenyReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PremiumRequired => "premium_required",
        }
    }
}

/// Decides model and tool access from principal entitlements
///
/// Every model outside the free allow-list is premium.
#[derive(Debug, Clone)]
pub struct EntitlementGate {
    free_models: HashSet<String>,
}

impl EntitlementGate {
    pub fn new<I, S>(free_models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            free_models: free_models.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_premium(&self, model: &str) -> bool {
        !self.free_models.contains(model)
    }

    pub fn authorize(&self, principal: &Principal, model: &str) -> Authorization {
        if self.is_premium(model) && !principal.is_entitled() {
            return Authorization::Deny(DenyReason::PremiumRequired);
        }

        Authorization::Allow {
            billed: !principal.is_billing_exempt(),
        }
    }

    /// Whether the caller may use a gated item
    pub fn allows<T: PremiumGated>(principal: &Principal, item: &T) -> bool {
        principal.is_entitled() || !item.requires_premium()
    }

    /// Drop premium tools for callers without entitlement
    pub fn filter_tools<T: PremiumGated>(principal: &Principal, tools: Vec<T>) -> Vec<T> {
        tools.into_iter().filter(|tool| Self::allows(principal, tool)).collect()
    }
}

impl From<&BillingConfig> for EntitlementGate {
    fn from(config: &BillingConfig) -> Self {
        Self::new(config.free_models.iter().cloned())
    }
}
