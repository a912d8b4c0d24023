use std::collections::BTreeSet;

use super::{event, id_or_new, reference, require, CommandProcessor};
use crate::aggregate::{GrantModel, GroupModel, ProjectModel};
use crate::authz::{resolve, PermissionContext};
use crate::error::{Error, Result};
use crate::model::{
    AggregateType, ChangeReceipt, EventPayload, GrantState, GrantTarget, Principal, PrincipalKind,
};
use crate::repository::Loaded;
use crate::storage::AppendRequest;

/// Role keys must exist on the project, or on the project grant when the
/// grant targets one.
fn check_roles(project: &ProjectModel, target: &GrantTarget, role_keys: &[String]) -> Result<()> {
    let unknown: Vec<&str> = match target {
        GrantTarget::Project { .. } => project.unknown_roles(role_keys),
        GrantTarget::ProjectGrant { grant_id, .. } => {
            let granted = project
                .grant(grant_id)
                .map(|g| g.role_keys.as_slice())
                .unwrap_or_default();
            role_keys
                .iter()
                .filter(|k| !granted.contains(*k))
                .map(String::as_str)
                .collect()
        }
    };
    if !unknown.is_empty() {
        return Err(Error::InvalidState(format!(
            "role keys not available on target: {}",
            unknown.join(", ")
        )));
    }
    Ok(())
}

/// New and reactivated grants need an active project, and an active
/// project grant when they target one.
fn check_active(project: &Loaded<ProjectModel>, target: &GrantTarget) -> Result<()> {
    if !project.model.state.is_active() {
        return Err(Error::InvalidState(format!(
            "project {} is inactive",
            project.aggregate_id
        )));
    }
    if let GrantTarget::ProjectGrant { grant_id, .. } = target {
        match project.model.grant(grant_id) {
            None => return Err(Error::NotFound(format!("project grant {grant_id}"))),
            Some(grant) if !grant.state.is_active() => {
                return Err(Error::InvalidState(format!(
                    "project grant {grant_id} is inactive"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

pub(super) fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

impl CommandProcessor {
    pub(super) async fn add_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: Option<String>,
        resource_owner: String,
        principal: Principal,
        target: GrantTarget,
        role_keys: Vec<String>,
    ) -> Result<ChangeReceipt> {
        require("resource_owner", &resource_owner)?;
        require("principal", principal.id())?;
        resolve(ctx, target.project_id(), target.grant_id())?;

        let aggregate_type = principal.kind().aggregate_type();
        let grant_id = id_or_new(grant_id)?;
        let existing: Loaded<GrantModel> = self.load(aggregate_type, &grant_id).await?;
        if existing.sequence > 0 {
            return Err(Error::already_exists(aggregate_type, &grant_id));
        }

        let owner = self.active_org(&resource_owner).await?;
        let project: Loaded<ProjectModel> =
            self.load(AggregateType::Project, target.project_id()).await?;
        let project = self.active_project(project).await?;
        check_active(&project, &target)?;
        if let GrantTarget::ProjectGrant { grant_id, .. } = &target {
            let granted_org_id = project
                .model
                .grant(grant_id)
                .map(|g| g.granted_org_id.as_str())
                .unwrap_or_default();
            if granted_org_id != resource_owner {
                return Err(Error::InvalidArgument(
                    "grants on a project grant must be owned by the granted org".to_string(),
                ));
            }
        }
        let role_keys = dedup(role_keys);
        check_roles(&project.model, &target, &role_keys)?;

        // Every aggregate whose removal would cascade to this grant.
        let mut appends = vec![
            reference(ctx, &owner, &grant_id),
            reference(ctx, &project, &grant_id),
        ];
        if project.resource_owner != resource_owner {
            let project_org = self.active_org(&project.resource_owner).await?;
            appends.push(reference(ctx, &project_org, &grant_id));
        }
        if let Principal::Group { group_id } = &principal {
            let group: Loaded<GroupModel> = self.load(AggregateType::Group, group_id).await?;
            if !group.model.state.exists() {
                return Err(Error::not_found(AggregateType::Group, group_id));
            }
            if group.resource_owner != resource_owner {
                return Err(Error::InvalidArgument(
                    "group must belong to the grant's resource owner".to_string(),
                ));
            }
            appends.push(reference(ctx, &group, &grant_id));
        }

        appends.push(
            AppendRequest::new(aggregate_type, grant_id, resource_owner, 0).with_event(event(
                ctx,
                EventPayload::GrantAdded {
                    principal,
                    target,
                    role_keys,
                },
            )),
        );
        self.commit(appends).await
    }

    /// Load a grant the caller may manage. Fails with `NotFound` if it does
    /// not exist or is removed.
    async fn managed_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        kind: PrincipalKind,
    ) -> Result<Loaded<GrantModel>> {
        let aggregate_type = kind.aggregate_type();
        let grant: Loaded<GrantModel> = self.load(aggregate_type, grant_id).await?;
        let (project_id, project_grant_id) = grant.model.target_ids();
        resolve(ctx, project_id, project_grant_id)?;
        if !grant.model.exists() {
            return Err(Error::not_found(aggregate_type, grant_id));
        }
        Ok(grant)
    }

    pub(super) async fn change_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        kind: PrincipalKind,
        role_keys: Vec<String>,
    ) -> Result<ChangeReceipt> {
        let grant = self.managed_grant(ctx, grant_id, kind).await?;
        let role_keys = dedup(role_keys);
        if grant.model.same_roles(&role_keys) {
            return self.unchanged(&grant);
        }

        let Some(target) = grant.model.target.as_ref() else {
            return Err(Error::InvalidState(format!("grant {grant_id} has no target")));
        };
        let project: Loaded<ProjectModel> =
            self.load(AggregateType::Project, target.project_id()).await?;
        let project = self.active_project(project).await?;
        check_roles(&project.model, target, &role_keys)?;

        let append = grant
            .append()
            .with_event(event(ctx, EventPayload::GrantChanged { role_keys }));
        self.commit(vec![reference(ctx, &project, grant_id), append])
            .await
    }

    pub(super) async fn deactivate_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        kind: PrincipalKind,
    ) -> Result<ChangeReceipt> {
        let grant = self.managed_grant(ctx, grant_id, kind).await?;
        if grant.model.state != Some(GrantState::Active) {
            return Err(Error::InvalidState(format!("grant {grant_id} is not active")));
        }

        let append = grant
            .append()
            .with_event(event(ctx, EventPayload::GrantDeactivated));
        self.commit(vec![append]).await
    }

    pub(super) async fn reactivate_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        kind: PrincipalKind,
    ) -> Result<ChangeReceipt> {
        let grant = self.managed_grant(ctx, grant_id, kind).await?;
        if grant.model.state != Some(GrantState::Inactive) {
            return Err(Error::InvalidState(format!("grant {grant_id} is not inactive")));
        }
        let Some(target) = grant.model.target.as_ref() else {
            return Err(Error::InvalidState(format!("grant {grant_id} has no target")));
        };
        let project: Loaded<ProjectModel> =
            self.load(AggregateType::Project, target.project_id()).await?;
        let project = self.active_project(project).await?;
        check_active(&project, target)?;

        let append = grant
            .append()
            .with_event(event(ctx, EventPayload::GrantReactivated));
        self.commit(vec![reference(ctx, &project, grant_id), append])
            .await
    }

    pub(super) async fn remove_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        kind: PrincipalKind,
    ) -> Result<ChangeReceipt> {
        let grant = self.managed_grant(ctx, grant_id, kind).await?;
        let append = grant
            .append()
            .with_event(event(ctx, EventPayload::GrantRemoved));
        self.commit(vec![append]).await
    }

    /// Remove several grants atomically. Any missing or inaccessible grant
    /// fails the whole command.
    pub(super) async fn bulk_remove_grants(
        &self,
        ctx: &PermissionContext,
        grant_ids: Vec<String>,
        kind: PrincipalKind,
    ) -> Result<ChangeReceipt> {
        let grant_ids = dedup(grant_ids);
        if grant_ids.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one grant ID is required".to_string(),
            ));
        }

        let mut appends = Vec::with_capacity(grant_ids.len());
        for grant_id in &grant_ids {
            let grant = self.managed_grant(ctx, grant_id, kind).await?;
            appends.push(
                grant
                    .append()
                    .with_event(event(ctx, EventPayload::GrantRemoved)),
            );
        }
        self.commit(appends).await
    }
}
