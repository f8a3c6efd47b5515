//! Role gate for lifecycle actions.
//!
//! Every state transition passes through [`allow_action`]: tenant isolation
//! is checked first, then the fixed role-to-action mapping. Higher roles do
//! not imply lower ones; the required role name must be present in the
//! actor's role set.

use crate::domain::{Identity, Role, SecretAction};
use crate::errors::{Result, StrongroomError};

/// The role each lifecycle action requires.
pub fn required_role(action: SecretAction) -> Role {
    match action {
        SecretAction::Create => Role::Admin,
        SecretAction::Delete => Role::Admin,
        SecretAction::Put => Role::Writer,
        SecretAction::Rotate => Role::Writer,
        SecretAction::Get => Role::Reader,
        SecretAction::List => Role::Reader,
    }
}

/// Gate a lifecycle action on a resource owned by `resource_tenant`.
///
/// Fails with tenant-mismatch before any role consideration, then with
/// missing-role if the required role is absent.
pub fn allow_action(actor: &Identity, resource_tenant: &str, action: SecretAction) -> Result<()> {
    if actor.tenant != resource_tenant {
        return Err(StrongroomError::tenant_mismatch(
            actor.tenant.clone(),
            resource_tenant.to_string(),
        ));
    }

    let required = required_role(action);
    if !actor.has_role(required) {
        return Err(StrongroomError::missing_role(required.as_str(), action.as_str()));
    }

    Ok(())
}
