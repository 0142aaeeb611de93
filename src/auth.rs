//! Authenticated principals and the opaque AuthN collaborator.
//!
//! Session issuance and password verification live outside this crate; the
//! only thing coordinators ever see is a [`Principal`] with an id and a role.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// The closed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    EngagementManager,
    ResourceManager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::EngagementManager => "engagement_manager",
            Self::ResourceManager => "resource_manager",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "engagement_manager" => Some(Self::EngagementManager),
            "resource_manager" => Some(Self::ResourceManager),
            _ => None,
        }
    }
}

/// The authenticated actor behind a request. Immutable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Opaque login material handed to the AuthN collaborator.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// External authentication service. Produces the [`Principal`] consumed by
/// every coordinator call; hashing and session mechanics are its problem.
#[async_trait]
pub trait AuthnService: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_values() {
        for role in [Role::Admin, Role::EngagementManager, Role::ResourceManager] {
            assert_eq!(Role::from_db_value(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_db_value("superuser"), None);
    }

    #[test]
    fn only_admin_is_admin() {
        let id = Uuid::new_v4();
        assert!(Principal::new(id, Role::Admin).is_admin());
        assert!(!Principal::new(id, Role::EngagementManager).is_admin());
        assert!(!Principal::new(id, Role::ResourceManager).is_admin());
    }
}
