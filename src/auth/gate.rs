//! The authorization gate: a pure decision over an identity and a route's
//! role requirement.

use super::errors::DenyReason;
use super::types::Identity;
use crate::db::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Guests included.
    Any,
    /// Any signed-in role.
    Authenticated,
    Exactly(Role),
}

impl RoleRequirement {
    /// Whether a missing credential is a denial rather than a guest.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, RoleRequirement::Any)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Identity),
    Deny(DenyReason),
}

pub fn authorize(identity: Identity, requirement: RoleRequirement) -> Decision {
    match requirement {
        RoleRequirement::Any => Decision::Allow(identity),
        _ if identity.is_guest() => Decision::Deny(DenyReason::NotAuthenticated),
        RoleRequirement::Authenticated => Decision::Allow(identity),
        RoleRequirement::Exactly(role) if identity.role == role => Decision::Allow(identity),
        RoleRequirement::Exactly(_) => Decision::Deny(DenyReason::InsufficientRole),
    }
}

/// Compile-time role requirement for the [`Auth`](super::Auth) extractor.
pub trait RoleConstraint: Send + Sync + 'static {
    const REQUIREMENT: RoleRequirement;
}

/// Open route; guests allowed.
pub struct Anyone;
impl RoleConstraint for Anyone {
    const REQUIREMENT: RoleRequirement = RoleRequirement::Any;
}

/// Any signed-in user.
pub struct SignedIn;
impl RoleConstraint for SignedIn {
    const REQUIREMENT: RoleRequirement = RoleRequirement::Authenticated;
}

pub struct PatientOnly;
impl RoleConstraint for PatientOnly {
    const REQUIREMENT: RoleRequirement = RoleRequirement::Exactly(Role::Patient);
}

pub struct DoctorOnly;
impl RoleConstraint for DoctorOnly {
    const REQUIREMENT: RoleRequirement = RoleRequirement::Exactly(Role::Doctor);
}

pub struct AdminOnly;
impl RoleConstraint for AdminOnly {
    const REQUIREMENT: RoleRequirement = RoleRequirement::Exactly(Role::Admin);
}
