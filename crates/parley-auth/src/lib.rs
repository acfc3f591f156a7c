#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
pub mod gate;
mod identity;

pub use error::AuthError;
pub use gate::{Authorization, DenyReason, EntitlementGate, PremiumGated};
pub use identity::{IdentityClaims, IdentityClient, IdentityVerifier, bearer_token};
