//! Access-control collaborator contract
//!
//! The engine never owns authorization decisions; it asks a checker supplied
//! by the host. `validate_resources` and the freeze override check both go
//! through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Permission required to bypass active freeze windows
pub const FREEZE_OVERRIDE_PERMISSION: &str = "freeze:override";

/// The actor a check is performed on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Trait for access-control backends
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Whether `principal` holds `permission` on `resource`
    async fn check_access(&self, principal: &Principal, resource: &str, permission: &str) -> bool;
}

/// Checker that grants everything (testing or single-tenant use)
pub struct AllowAll;

#[async_trait]
impl AccessChecker for AllowAll {
    async fn check_access(&self, _principal: &Principal, _resource: &str, _permission: &str) -> bool {
        true
    }
}

/// Checker that denies everything
pub struct DenyAll;

#[async_trait]
impl AccessChecker for DenyAll {
    async fn check_access(&self, _principal: &Principal, _resource: &str, _permission: &str) -> bool {
        false
    }
}
