//! Role-based authorization.
//!
//! Every mutating workflow operation passes through [`authorize`] before it touches a
//! record. Capabilities are resolved in two tiers:
//!
//! 1. a persisted [`RolePermission`] override row for the actor's role, if one exists;
//! 2. otherwise the hardcoded [`Capabilities::defaults_for`] table.
//!
//! ADMIN always resolves to every capability, whatever the override table says.
//!
//! Call sites never branch on a role directly; they ask whether an [`ActionKind`] is
//! allowed and the capability mapping lives in [`ActionKind::is_granted_by`].

use crate::actor::Actor;
use crate::error::{LimsError, LimsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Actor capability class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Reception,
    Phlebotomy,
    Technologist,
    Pathologist,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Reception,
        Role::Phlebotomy,
        Role::Technologist,
        Role::Pathologist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Reception => "RECEPTION",
            Role::Phlebotomy => "PHLEBOTOMY",
            Role::Technologist => "TECHNOLOGIST",
            Role::Pathologist => "PATHOLOGIST",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LimsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LimsError::InvalidArgument(format!("unknown role '{wanted}'")))
    }
}

/// An operation subject to the permission gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    RegisterPatient,
    CreateOrder,
    CollectSample,
    ReceiveSample,
    RejectSample,
    EnterResult,
    VerifyResult,
    PublishResult,
    EditCatalog,
    EditSettings,
    CancelOrder,
    EditOrderTests,
    GenerateReport,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        ActionKind::RegisterPatient,
        ActionKind::CreateOrder,
        ActionKind::CollectSample,
        ActionKind::ReceiveSample,
        ActionKind::RejectSample,
        ActionKind::EnterResult,
        ActionKind::VerifyResult,
        ActionKind::PublishResult,
        ActionKind::EditCatalog,
        ActionKind::EditSettings,
        ActionKind::CancelOrder,
        ActionKind::EditOrderTests,
        ActionKind::GenerateReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RegisterPatient => "REGISTER_PATIENT",
            ActionKind::CreateOrder => "CREATE_ORDER",
            ActionKind::CollectSample => "COLLECT_SAMPLE",
            ActionKind::ReceiveSample => "RECEIVE_SAMPLE",
            ActionKind::RejectSample => "REJECT_SAMPLE",
            ActionKind::EnterResult => "ENTER_RESULT",
            ActionKind::VerifyResult => "VERIFY_RESULT",
            ActionKind::PublishResult => "PUBLISH_RESULT",
            ActionKind::EditCatalog => "EDIT_CATALOG",
            ActionKind::EditSettings => "EDIT_SETTINGS",
            ActionKind::CancelOrder => "CANCEL_ORDER",
            ActionKind::EditOrderTests => "EDIT_ORDER_TESTS",
            ActionKind::GenerateReport => "GENERATE_REPORT",
        }
    }

    /// Whether a capability set grants this action.
    ///
    /// Order administration follows the registration family and report generation the
    /// verification family.
    pub fn is_granted_by(&self, caps: &Capabilities) -> bool {
        match self {
            ActionKind::RegisterPatient
            | ActionKind::CreateOrder
            | ActionKind::CancelOrder
            | ActionKind::EditOrderTests => caps.can_register,
            ActionKind::CollectSample => caps.can_collect,
            ActionKind::ReceiveSample | ActionKind::RejectSample => caps.can_receive,
            ActionKind::EnterResult => caps.can_enter_result,
            ActionKind::VerifyResult | ActionKind::GenerateReport => caps.can_verify,
            ActionKind::PublishResult => caps.can_publish,
            ActionKind::EditCatalog => caps.can_edit_catalog,
            ActionKind::EditSettings => caps.can_edit_settings,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = LimsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        ActionKind::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| LimsError::InvalidArgument(format!("unknown action '{}'", s.trim())))
    }
}

/// The capability booleans held for a role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Capabilities {
    pub can_register: bool,
    pub can_collect: bool,
    #[serde(default)]
    pub can_receive: bool,
    pub can_enter_result: bool,
    pub can_verify: bool,
    pub can_publish: bool,
    pub can_edit_catalog: bool,
    pub can_edit_settings: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        can_register: true,
        can_collect: true,
        can_receive: true,
        can_enter_result: true,
        can_verify: true,
        can_publish: true,
        can_edit_catalog: true,
        can_edit_settings: true,
    };

    /// Hardcoded fallback policy used when no override row exists for a role.
    pub fn defaults_for(role: Role) -> Capabilities {
        let none = Capabilities::default();
        match role {
            Role::Admin => Capabilities::ALL,
            Role::Reception => Capabilities {
                can_register: true,
                ..none
            },
            Role::Phlebotomy => Capabilities {
                can_collect: true,
                can_receive: true,
                ..none
            },
            Role::Technologist => Capabilities {
                can_receive: true,
                can_enter_result: true,
                ..none
            },
            Role::Pathologist => Capabilities {
                can_receive: true,
                can_verify: true,
                can_publish: true,
                ..none
            },
        }
    }
}

/// Persisted, admin-edited override of a role's capabilities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RolePermission {
    pub role: Role,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Where a resolved capability set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySource {
    Default,
    Override,
    AdminFloor,
}

/// Effective capabilities for one role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EffectivePermission {
    pub role: Role,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub source: CapabilitySource,
}

/// Read access to persisted override rows.
pub trait PermissionSource {
    fn role_permission(&self, role: Role) -> LimsResult<Option<RolePermission>>;
}

/// Resolves the capabilities of `role` from an optional override row.
pub fn resolve(role: Role, override_row: Option<&RolePermission>) -> EffectivePermission {
    let (capabilities, source) = match (role, override_row) {
        (Role::Admin, _) => (Capabilities::ALL, CapabilitySource::AdminFloor),
        (_, Some(row)) => (row.capabilities, CapabilitySource::Override),
        (_, None) => (Capabilities::defaults_for(role), CapabilitySource::Default),
    };
    EffectivePermission {
        role,
        capabilities,
        source,
    }
}

/// Whether `actor` may perform `action`.
pub fn is_allowed(
    source: &dyn PermissionSource,
    actor: &Actor,
    action: ActionKind,
) -> LimsResult<bool> {
    let row = source.role_permission(actor.role)?;
    Ok(action.is_granted_by(&resolve(actor.role, row.as_ref()).capabilities))
}

/// Fails with [`LimsError::PermissionDenied`] unless `actor` may perform `action`.
pub fn authorize(
    source: &dyn PermissionSource,
    actor: &Actor,
    action: ActionKind,
) -> LimsResult<()> {
    if is_allowed(source, actor, action)? {
        return Ok(());
    }
    tracing::warn!(
        actor_id = %actor.id,
        role = %actor.role,
        action = %action,
        "permission denied"
    );
    Err(LimsError::PermissionDenied {
        role: actor.role,
        action,
    })
}
