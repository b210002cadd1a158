use super::{now, LabService};
use crate::actor::Actor;
use crate::catalog::{TestDefinition, TestDefinitionInput};
use crate::error::LimsResult;
use crate::ids::TestId;
use crate::permissions::{
    authorize, is_allowed, resolve, ActionKind, Capabilities, EffectivePermission, Role,
    RolePermission,
};
use crate::store::Store;
use crate::workflow::{WorkflowSettings, WorkflowSettingsUpdate};

impl<S: Store> LabService<S> {
    /// Current workflow settings, falling back to the startup configuration until an
    /// admin first saves them.
    pub fn workflow_settings(&self) -> LimsResult<WorkflowSettings> {
        self.store.read(|tx| self.settings(tx))
    }

    /// Replaces the workflow settings. Last writer wins.
    pub fn update_workflow_settings(
        &self,
        actor: &Actor,
        update: WorkflowSettingsUpdate,
    ) -> LimsResult<WorkflowSettings> {
        let settings = self.transact("update_workflow_settings", |tx| {
            authorize(tx.permissions(), actor, ActionKind::EditSettings)?;
            let settings = update.apply(now());
            tx.put_workflow_settings(settings)?;
            Ok(settings)
        })?;

        tracing::info!(
            enable_sample_collection = settings.enable_sample_collection,
            enable_sample_receive = settings.enable_sample_receive,
            enable_verification = settings.enable_verification,
            actor_id = %actor.id,
            "workflow settings updated"
        );
        Ok(settings)
    }

    /// Effective capabilities of every role.
    pub fn effective_permissions(&self) -> LimsResult<Vec<EffectivePermission>> {
        self.store.read(|tx| {
            let rows = tx.role_permissions()?;
            Ok(Role::ALL
                .into_iter()
                .map(|role| resolve(role, rows.iter().find(|r| r.role == role)))
                .collect())
        })
    }

    /// Stores an override row for `role`.
    ///
    /// A row for ADMIN is kept but has no effect.
    pub fn set_role_permission(
        &self,
        actor: &Actor,
        role: Role,
        capabilities: Capabilities,
    ) -> LimsResult<EffectivePermission> {
        let effective = self.transact("set_role_permission", |tx| {
            authorize(tx.permissions(), actor, ActionKind::EditSettings)?;
            let row = RolePermission {
                role,
                capabilities,
                updated_at: Some(now()),
            };
            let effective = resolve(role, Some(&row));
            tx.put_role_permission(row)?;
            Ok(effective)
        })?;

        if role == Role::Admin {
            tracing::warn!(actor_id = %actor.id, "ADMIN override stored; ADMIN keeps every capability");
        }
        tracing::info!(role = %role, actor_id = %actor.id, "role permissions overridden");
        Ok(effective)
    }

    /// Drops the override row for `role`, restoring the default table.
    pub fn reset_role_permission(
        &self,
        actor: &Actor,
        role: Role,
    ) -> LimsResult<EffectivePermission> {
        let removed = self.transact("reset_role_permission", |tx| {
            authorize(tx.permissions(), actor, ActionKind::EditSettings)?;
            tx.remove_role_permission(role)
        })?;

        tracing::info!(role = %role, removed, actor_id = %actor.id, "role permissions reset");
        Ok(resolve(role, None))
    }

    /// Whether `actor` may perform `action` right now.
    pub fn is_allowed(&self, actor: &Actor, action: ActionKind) -> LimsResult<bool> {
        self.store.read(|tx| is_allowed(tx.permissions(), actor, action))
    }

    /// Creates or replaces a catalog test.
    pub fn upsert_test(
        &self,
        actor: &Actor,
        id: Option<TestId>,
        input: TestDefinitionInput,
    ) -> LimsResult<TestDefinition> {
        self.store
            .read(|tx| authorize(tx.permissions(), actor, ActionKind::EditCatalog))?;
        let test = self.catalog.upsert(id, input)?;
        tracing::info!(test_id = %test.id, code = %test.code, actor_id = %actor.id, "catalog test saved");
        Ok(test)
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::TestDefinitionInput;
    use crate::error::LimsError;
    use crate::lab_result::{ResultEntry, ResultStatus};
    use crate::permissions::{ActionKind, Capabilities, CapabilitySource, Role};
    use crate::services::testing::{actor, fixture, CBC};
    use crate::workflow::WorkflowSettingsUpdate;
    use rust_decimal_macros::dec;

    #[test]
    fn settings_update_is_admin_gated_and_takes_effect() {
        let fx = fixture();
        let update = WorkflowSettingsUpdate {
            enable_sample_collection: true,
            enable_sample_receive: true,
            enable_verification: false,
        };

        assert!(matches!(
            fx.service
                .update_workflow_settings(&actor(Role::Pathologist), update),
            Err(LimsError::PermissionDenied { .. })
        ));
        assert!(fx.service.workflow_settings().unwrap().enable_verification);

        let saved = fx
            .service
            .update_workflow_settings(&actor(Role::Admin), update)
            .unwrap();
        assert!(!saved.enable_verification);
        assert!(saved.updated_at.is_some());

        let view = fx.order(&[CBC]);
        let item = view.items[0].item.id;
        let phleb = actor(Role::Phlebotomy);
        let tech = actor(Role::Technologist);
        let sample = fx.service.create_sample(&phleb, item).unwrap();
        fx.service.collect_sample(&phleb, sample.id).unwrap();
        fx.service.receive_sample(&tech, sample.id).unwrap();
        let result = fx.service.create_result(&tech, item).unwrap();
        let entered = fx
            .service
            .enter_result(&tech, result.id, ResultEntry::value("5.1"))
            .unwrap();
        assert_eq!(entered.status, ResultStatus::Verified);
    }

    #[test]
    fn overrides_apply_and_reset() {
        let fx = fixture();
        let admin = actor(Role::Admin);
        let tech = actor(Role::Technologist);
        assert!(!fx.service.is_allowed(&tech, ActionKind::VerifyResult).unwrap());

        let effective = fx
            .service
            .set_role_permission(
                &admin,
                Role::Technologist,
                Capabilities {
                    can_verify: true,
                    can_enter_result: true,
                    ..Capabilities::default()
                },
            )
            .unwrap();
        assert_eq!(effective.source, CapabilitySource::Override);
        assert!(fx.service.is_allowed(&tech, ActionKind::VerifyResult).unwrap());
        assert!(!fx.service.is_allowed(&tech, ActionKind::ReceiveSample).unwrap());

        fx.service
            .reset_role_permission(&admin, Role::Technologist)
            .unwrap();
        assert!(!fx.service.is_allowed(&tech, ActionKind::VerifyResult).unwrap());
    }

    #[test]
    fn admin_override_cannot_lock_admin_out() {
        let fx = fixture();
        let admin = actor(Role::Admin);
        let effective = fx
            .service
            .set_role_permission(&admin, Role::Admin, Capabilities::default())
            .unwrap();
        assert_eq!(effective.source, CapabilitySource::AdminFloor);
        assert!(fx.service.is_allowed(&admin, ActionKind::EditSettings).unwrap());

        let matrix = fx.service.effective_permissions().unwrap();
        assert_eq!(matrix.len(), Role::ALL.len());
        assert!(matrix
            .iter()
            .find(|p| p.role == Role::Admin)
            .is_some_and(|p| p.capabilities == Capabilities::ALL));
    }

    #[test]
    fn catalog_edits_need_catalog_rights() {
        let fx = fixture();
        let input = || TestDefinitionInput {
            code: "HBA1C".into(),
            name: "Glycated Haemoglobin".into(),
            sample_type: "Blood".into(),
            price: dec!(1500),
            turnaround_time_hours: 48,
            is_active: true,
        };

        assert!(matches!(
            fx.service
                .upsert_test(&actor(Role::Reception), None, input()),
            Err(LimsError::PermissionDenied { .. })
        ));
        let test = fx
            .service
            .upsert_test(&actor(Role::Admin), None, input())
            .unwrap();
        assert_eq!(fx.service.catalog().test(test.id).unwrap().code, "HBA1C");
    }
}
