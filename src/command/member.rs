use tracing::debug;

use super::{event, require, CommandProcessor};
use crate::aggregate::{GroupModel, InstanceModel, Members, OrgModel, ProjectModel};
use crate::authz::{resolve_scope, PermissionContext};
use crate::error::{Error, Result};
use crate::model::{ChangeReceipt, EventPayload, MembershipScope};
use crate::repository::Loaded;
use crate::storage::AppendRequest;

/// The stream a membership lives on, as loaded.
struct ScopeTarget {
    members: Members,
    append: AppendRequest,
    receipt: ChangeReceipt,
}

impl ScopeTarget {
    fn from_loaded<M>(loaded: &Loaded<M>, members: Members) -> Self {
        Self {
            members,
            append: loaded.append(),
            receipt: loaded.receipt(),
        }
    }
}

fn validate_roles(roles: &[String]) -> Result<()> {
    if roles.is_empty() || roles.iter().any(|r| r.trim().is_empty()) {
        return Err(Error::InvalidArgument(
            "member roles must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn same_roles(current: &[String], next: &[String]) -> bool {
    let mut current = current.to_vec();
    let mut next = next.to_vec();
    current.sort();
    next.sort();
    current == next
}

impl CommandProcessor {
    /// Load the stream of a scope, check the caller may manage it and that
    /// the scoped resource exists.
    async fn scope_target(
        &self,
        ctx: &PermissionContext,
        scope: &MembershipScope,
    ) -> Result<ScopeTarget> {
        let (aggregate_type, aggregate_id) = scope.aggregate(&self.instance_id);
        match scope {
            MembershipScope::Instance => {
                resolve_scope(ctx, scope, &[])?;
                let instance: Loaded<InstanceModel> =
                    self.load(aggregate_type, &aggregate_id).await?;
                let mut target =
                    ScopeTarget::from_loaded(&instance, instance.model.members.clone());
                target.append.resource_owner = self.instance_id.clone();
                Ok(target)
            }
            MembershipScope::Org { org_id } => {
                resolve_scope(ctx, scope, &[org_id.as_str()])?;
                let org: Loaded<OrgModel> = self.active_org(org_id).await?;
                Ok(ScopeTarget::from_loaded(&org, org.model.members.clone()))
            }
            MembershipScope::Project { .. } => {
                let project: Loaded<ProjectModel> =
                    self.load(aggregate_type, &aggregate_id).await?;
                resolve_scope(ctx, scope, &[project.resource_owner.as_str()])?;
                let project = self.active_project(project).await?;
                Ok(ScopeTarget::from_loaded(&project, project.model.members.clone()))
            }
            MembershipScope::ProjectGrant { grant_id, .. } => {
                let project: Loaded<ProjectModel> =
                    self.load(aggregate_type, &aggregate_id).await?;
                let granted_org = project
                    .model
                    .grant(grant_id)
                    .map(|g| g.granted_org_id.clone())
                    .unwrap_or_default();
                let owners = [project.resource_owner.as_str(), granted_org.as_str()];
                resolve_scope(ctx, scope, &owners)?;
                let project = self.active_project(project).await?;
                let members = project
                    .model
                    .grant(grant_id)
                    .map(|g| g.members.clone())
                    .ok_or_else(|| Error::NotFound(format!("project grant {grant_id}")))?;
                Ok(ScopeTarget::from_loaded(&project, members))
            }
            MembershipScope::Group { .. } => {
                let group: Loaded<GroupModel> = self.load(aggregate_type, &aggregate_id).await?;
                resolve_scope(ctx, scope, &[group.resource_owner.as_str()])?;
                let group = self.active_group(group).await?;
                Ok(ScopeTarget::from_loaded(&group, group.model.members.clone()))
            }
        }
    }

    pub(super) async fn add_member(
        &self,
        ctx: &PermissionContext,
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    ) -> Result<ChangeReceipt> {
        require("user_id", &user_id)?;
        validate_roles(&roles)?;
        let target = self.scope_target(ctx, &scope).await?;
        if target.members.contains_key(&user_id) {
            return Err(Error::AlreadyExists(format!(
                "member {user_id} of {}",
                scope.key()
            )));
        }

        let payload = match scope {
            MembershipScope::Instance => EventPayload::InstanceMemberAdded { user_id, roles },
            scope => EventPayload::MemberAdded {
                scope,
                user_id,
                roles,
            },
        };
        self.commit(vec![target.append.with_event(event(ctx, payload))])
            .await
    }

    pub(super) async fn change_member(
        &self,
        ctx: &PermissionContext,
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    ) -> Result<ChangeReceipt> {
        validate_roles(&roles)?;
        let target = self.scope_target(ctx, &scope).await?;
        let Some(current) = target.members.get(&user_id) else {
            return Err(Error::NotFound(format!("member {user_id} of {}", scope.key())));
        };
        if same_roles(current, &roles) {
            debug!(user_id, scope = %scope.key(), "Member roles unchanged");
            return Ok(target.receipt);
        }

        let payload = EventPayload::MemberChanged {
            scope,
            user_id,
            roles,
        };
        self.commit(vec![target.append.with_event(event(ctx, payload))])
            .await
    }

    pub(super) async fn remove_member(
        &self,
        ctx: &PermissionContext,
        scope: MembershipScope,
        user_id: String,
    ) -> Result<ChangeReceipt> {
        let target = self.scope_target(ctx, &scope).await?;
        if !target.members.contains_key(&user_id) {
            return Err(Error::NotFound(format!("member {user_id} of {}", scope.key())));
        }

        let payload = EventPayload::MemberRemoved { scope, user_id };
        self.commit(vec![target.append.with_event(event(ctx, payload))])
            .await
    }
}
