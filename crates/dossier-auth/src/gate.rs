//! Role-gated access control.
//!
//! Every externally triggered operation passes through [`AccessGate`]:
//! mutations require Admin, queries require Viewer. The gate resolves the
//! presented API key to a user and checks the role level.

use std::sync::Arc;

use tracing::warn;

use dossier_core::error::{DossierError, Result};
use dossier_core::types::{Role, User};
use dossier_core::Ctx;
use dossier_storage::UserRepository;

/// Resolves API keys to users and enforces role requirements.
pub struct AccessGate {
    users: Arc<UserRepository>,
}

impl AccessGate {
    pub fn new(users: Arc<UserRepository>) -> Self {
        Self { users }
    }

    /// Authorize an API key against a required role.
    ///
    /// Unknown keys are Unauthorized. Known but inactive users are Forbidden
    /// regardless of the requirement; active users below the required level
    /// are Forbidden as well.
    pub fn authorize(&self, api_key: &str, required: Role) -> Result<User> {
        let user = match self.users.find_by_api_key(api_key)? {
            Some(user) => user,
            None => {
                warn!("Rejected unknown API key");
                return Err(DossierError::Unauthorized("unknown API key".to_string()));
            }
        };

        if user.role == Role::Inactive {
            warn!(user_id = user.user_id, "Rejected inactive user");
            return Err(DossierError::Forbidden(format!(
                "user {} is inactive",
                user.user_id
            )));
        }

        if user.role.level() < required.level() {
            warn!(
                user_id = user.user_id,
                role = %user.role,
                required = %required,
                "Rejected user below required role"
            );
            return Err(DossierError::Forbidden(format!("{} role required", required)));
        }

        Ok(user)
    }

    /// Authorize and wrap the resolved user in a request context.
    pub fn authorize_ctx(&self, api_key: &str, required: Role) -> Result<Ctx> {
        let user = self.authorize(api_key, required)?;
        Ctx::for_user(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_storage::Database;
    use uuid::Uuid;

    fn make_gate() -> (AccessGate, Arc<UserRepository>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let users = Arc::new(UserRepository::new(db));
        (AccessGate::new(Arc::clone(&users)), users)
    }

    fn provision(users: &UserRepository, email: &str, key: &str, role: Role) -> User {
        let user = users.create(email, Uuid::new_v4(), key).unwrap();
        if role != Role::Viewer {
            users.set_role(user.user_id, role).unwrap();
        }
        users.find_by_id(user.user_id).unwrap().unwrap()
    }

    #[test]
    fn test_unknown_key_is_unauthorized() {
        let (gate, _users) = make_gate();
        let result = gate.authorize("no-such-key", Role::Viewer);
        assert!(matches!(result, Err(DossierError::Unauthorized(_))));
    }

    #[test]
    fn test_viewer_can_query_but_not_mutate() {
        let (gate, users) = make_gate();
        provision(&users, "v@example.com", "viewer-key", Role::Viewer);

        let user = gate.authorize("viewer-key", Role::Viewer).unwrap();
        assert_eq!(user.role, Role::Viewer);

        let result = gate.authorize("viewer-key", Role::Admin);
        assert!(matches!(result, Err(DossierError::Forbidden(_))));
    }

    #[test]
    fn test_admin_passes_both_levels() {
        let (gate, users) = make_gate();
        provision(&users, "a@example.com", "admin-key", Role::Admin);

        assert!(gate.authorize("admin-key", Role::Viewer).is_ok());
        assert!(gate.authorize("admin-key", Role::Admin).is_ok());
    }

    #[test]
    fn test_inactive_is_always_forbidden() {
        let (gate, users) = make_gate();
        provision(&users, "i@example.com", "inactive-key", Role::Inactive);

        for required in [Role::Viewer, Role::Admin, Role::Inactive] {
            let result = gate.authorize("inactive-key", required);
            assert!(matches!(result, Err(DossierError::Forbidden(_))));
        }
    }

    #[test]
    fn test_deactivation_revokes_access() {
        let (gate, users) = make_gate();
        let user = provision(&users, "d@example.com", "demoted-key", Role::Admin);

        assert!(gate.authorize("demoted-key", Role::Admin).is_ok());
        users.set_role(user.user_id, Role::Inactive).unwrap();
        let result = gate.authorize("demoted-key", Role::Viewer);
        assert!(matches!(result, Err(DossierError::Forbidden(_))));
    }

    #[test]
    fn test_authorize_ctx_carries_identity() {
        let (gate, users) = make_gate();
        let user = provision(&users, "c@example.com", "ctx-key", Role::Viewer);

        let ctx = gate.authorize_ctx("ctx-key", Role::Viewer).unwrap();
        assert_eq!(ctx.user_id(), user.user_id);
        assert_eq!(ctx.role(), Role::Viewer);
        assert!(!ctx.is_root());
    }
}
