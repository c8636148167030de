//! Caller identity handed over by the authorization boundary, and the role
//! guard every ledger operation runs first.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ActorId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        })
    }
}

/// Which roles may invoke an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin,
    UserOrAdmin,
    Anyone,
}

impl Access {
    pub fn permits(self, role: Role) -> bool {
        match self {
            Access::Admin => role == Role::Admin,
            Access::UserOrAdmin => matches!(role, Role::Admin | Role::User),
            Access::Anyone => true,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Admin => "admin access",
            Access::UserOrAdmin => "user or admin access",
            Access::Anyone => "no particular access",
        })
    }
}

#[derive(Debug, Error)]
#[error("{operation} requires {access}, caller is {role}")]
pub struct AuthError {
    pub operation: &'static str,
    pub access: Access,
    pub role: Role,
}

/// An already authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor: ActorId,
    pub role: Role,
}

impl Principal {
    pub fn new(actor: ActorId, role: Role) -> Self {
        Self { actor, role }
    }

    pub fn admin(actor: ActorId) -> Self {
        Self::new(actor, Role::Admin)
    }

    pub fn user(actor: ActorId) -> Self {
        Self::new(actor, Role::User)
    }

    pub fn guest(actor: ActorId) -> Self {
        Self::new(actor, Role::Guest)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require(&self, access: Access, operation: &'static str) -> Result<(), AuthError> {
        if access.permits(self.role) {
            Ok(())
        } else {
            tracing::warn!(actor = %self.actor, role = %self.role, operation, "access denied");
            Err(AuthError {
                operation,
                access,
                role: self.role,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_guard() {
        let admin = Principal::admin(Uuid::new_v4());
        let user = Principal::user(Uuid::new_v4());
        let guest = Principal::guest(Uuid::new_v4());

        assert!(admin.require(Access::Admin, "mint").is_ok());
        assert!(user.require(Access::UserOrAdmin, "transfer").is_ok());
        assert!(guest.require(Access::Anyone, "pool").is_ok());

        let err = user.require(Access::Admin, "mint").unwrap_err();
        assert_eq!(err.to_string(), "mint requires admin access, caller is user");
        assert!(guest.require(Access::UserOrAdmin, "transfer").is_err());
    }
}
