//! Request context carrying the authenticated identity.
//!
//! A `Ctx` is produced by the access gate and passed explicitly into gated
//! operations. There is no ambient/global session state.

use crate::error::{DossierError, Result};
use crate::types::{Role, User};

/// User id reserved for the internal root context.
const ROOT_USER_ID: i64 = 0;

/// Capability object identifying who a gated operation runs as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctx {
    user_id: i64,
    role: Role,
}

impl Ctx {
    /// Context for internal maintenance work (migrations, driver loops).
    /// Never derived from an API key.
    pub fn root() -> Self {
        Ctx {
            user_id: ROOT_USER_ID,
            role: Role::Admin,
        }
    }

    /// Build a context for a real user. The root user id is reserved and
    /// cannot be claimed through this constructor.
    pub fn new(user_id: i64, role: Role) -> Result<Self> {
        if user_id == ROOT_USER_ID {
            return Err(DossierError::Validation(
                "user id 0 is reserved for the root context".to_string(),
            ));
        }
        Ok(Ctx { user_id, role })
    }

    /// Context for an already-authorized user record.
    pub fn for_user(user: &User) -> Result<Self> {
        Self::new(user.user_id, user.role)
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_root(&self) -> bool {
        self.user_id == ROOT_USER_ID
    }
}
