//! Command processing.
//!
//! A command is validated against the write models it touches, turned into
//! events and appended in a single atomic push. Removals append their
//! cascades in the same push, with the primary aggregate's request last so
//! that its receipt carries the highest position of the batch.
//!
//! Permission checks run before existence checks: a caller without access
//! gets `PermissionDenied` whether or not the aggregate exists.

use std::sync::Arc;

use tracing::{debug, info};

use crate::aggregate::{GroupModel, OrgModel, ProjectModel};
use crate::authz::PermissionContext;
use crate::cascade::CascadeResolver;
use crate::error::{Error, Result};
use crate::model::{
    AggregateType, ChangeReceipt, EventPayload, GrantTarget, MembershipScope, PendingEvent,
    Principal, PrincipalKind,
};
use crate::repository::{Loaded, WriteModel, WriteModelRepository};
use crate::storage::AppendRequest;

mod grant;
mod group;
mod member;
mod org;
mod project;


/// Every write the core accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddOrg {
        org_id: Option<String>,
        name: String,
    },
    RemoveOrg {
        org_id: String,
    },
    AddGroup {
        org_id: String,
        group_id: Option<String>,
        name: String,
        description: String,
    },
    ChangeGroup {
        group_id: String,
        name: Option<String>,
        description: Option<String>,
    },
    RemoveGroup {
        group_id: String,
    },
    AddProject {
        org_id: String,
        project_id: Option<String>,
        name: String,
    },
    ChangeProject {
        project_id: String,
        name: String,
    },
    DeactivateProject {
        project_id: String,
    },
    ReactivateProject {
        project_id: String,
    },
    RemoveProject {
        project_id: String,
    },
    AddProjectRole {
        project_id: String,
        key: String,
        display_name: String,
    },
    RemoveProjectRole {
        project_id: String,
        key: String,
    },
    AddProjectGrant {
        project_id: String,
        grant_id: Option<String>,
        granted_org_id: String,
        role_keys: Vec<String>,
    },
    ChangeProjectGrant {
        project_id: String,
        grant_id: String,
        role_keys: Vec<String>,
    },
    DeactivateProjectGrant {
        project_id: String,
        grant_id: String,
    },
    ReactivateProjectGrant {
        project_id: String,
        grant_id: String,
    },
    RemoveProjectGrant {
        project_id: String,
        grant_id: String,
    },
    AddMember {
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    },
    ChangeMember {
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    },
    RemoveMember {
        scope: MembershipScope,
        user_id: String,
    },
    AddGrant {
        grant_id: Option<String>,
        resource_owner: String,
        principal: Principal,
        target: GrantTarget,
        role_keys: Vec<String>,
    },
    ChangeGrant {
        grant_id: String,
        principal_kind: PrincipalKind,
        role_keys: Vec<String>,
    },
    DeactivateGrant {
        grant_id: String,
        principal_kind: PrincipalKind,
    },
    ReactivateGrant {
        grant_id: String,
        principal_kind: PrincipalKind,
    },
    RemoveGrant {
        grant_id: String,
        principal_kind: PrincipalKind,
    },
    BulkRemoveGrants {
        grant_ids: Vec<String>,
        principal_kind: PrincipalKind,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddOrg { .. } => "add_org",
            Command::RemoveOrg { .. } => "remove_org",
            Command::AddGroup { .. } => "add_group",
            Command::ChangeGroup { .. } => "change_group",
            Command::RemoveGroup { .. } => "remove_group",
            Command::AddProject { .. } => "add_project",
            Command::ChangeProject { .. } => "change_project",
            Command::DeactivateProject { .. } => "deactivate_project",
            Command::ReactivateProject { .. } => "reactivate_project",
            Command::RemoveProject { .. } => "remove_project",
            Command::AddProjectRole { .. } => "add_project_role",
            Command::RemoveProjectRole { .. } => "remove_project_role",
            Command::AddProjectGrant { .. } => "add_project_grant",
            Command::ChangeProjectGrant { .. } => "change_project_grant",
            Command::DeactivateProjectGrant { .. } => "deactivate_project_grant",
            Command::ReactivateProjectGrant { .. } => "reactivate_project_grant",
            Command::RemoveProjectGrant { .. } => "remove_project_grant",
            Command::AddMember { .. } => "add_member",
            Command::ChangeMember { .. } => "change_member",
            Command::RemoveMember { .. } => "remove_member",
            Command::AddGrant { .. } => "add_grant",
            Command::ChangeGrant { .. } => "change_grant",
            Command::DeactivateGrant { .. } => "deactivate_grant",
            Command::ReactivateGrant { .. } => "reactivate_grant",
            Command::RemoveGrant { .. } => "remove_grant",
            Command::BulkRemoveGrants { .. } => "bulk_remove_grants",
        }
    }
}

/// Validates commands and appends their events.
pub struct CommandProcessor {
    repository: Arc<WriteModelRepository>,
    cascade: CascadeResolver,
    instance_id: String,
}

impl CommandProcessor {
    pub fn new(
        repository: Arc<WriteModelRepository>,
        cascade: CascadeResolver,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            cascade,
            instance_id: instance_id.into(),
        }
    }

    /// Execute a command, returning the receipt of its primary aggregate.
    ///
    /// Concurrency conflicts are returned as-is; the caller reloads and
    /// retries if it wants to.
    #[tracing::instrument(
        name = "command.execute",
        skip_all,
        fields(command = command.name(), user_id = %ctx.user_id)
    )]
    pub async fn execute(&self, ctx: &PermissionContext, command: Command) -> Result<ChangeReceipt> {
        match command {
            Command::AddOrg { org_id, name } => self.add_org(ctx, org_id, name).await,
            Command::RemoveOrg { org_id } => self.remove_org(ctx, &org_id).await,
            Command::AddGroup {
                org_id,
                group_id,
                name,
                description,
            } => self.add_group(ctx, org_id, group_id, name, description).await,
            Command::ChangeGroup {
                group_id,
                name,
                description,
            } => self.change_group(ctx, &group_id, name, description).await,
            Command::RemoveGroup { group_id } => self.remove_group(ctx, &group_id).await,
            Command::AddProject {
                org_id,
                project_id,
                name,
            } => self.add_project(ctx, org_id, project_id, name).await,
            Command::ChangeProject { project_id, name } => {
                self.change_project(ctx, &project_id, name).await
            }
            Command::DeactivateProject { project_id } => {
                self.deactivate_project(ctx, &project_id).await
            }
            Command::ReactivateProject { project_id } => {
                self.reactivate_project(ctx, &project_id).await
            }
            Command::RemoveProject { project_id } => self.remove_project(ctx, &project_id).await,
            Command::AddProjectRole {
                project_id,
                key,
                display_name,
            } => {
                self.add_project_role(ctx, &project_id, key, display_name)
                    .await
            }
            Command::RemoveProjectRole { project_id, key } => {
                self.remove_project_role(ctx, &project_id, &key).await
            }
            Command::AddProjectGrant {
                project_id,
                grant_id,
                granted_org_id,
                role_keys,
            } => {
                self.add_project_grant(ctx, &project_id, grant_id, granted_org_id, role_keys)
                    .await
            }
            Command::ChangeProjectGrant {
                project_id,
                grant_id,
                role_keys,
            } => {
                self.change_project_grant(ctx, &project_id, &grant_id, role_keys)
                    .await
            }
            Command::DeactivateProjectGrant {
                project_id,
                grant_id,
            } => {
                self.deactivate_project_grant(ctx, &project_id, &grant_id)
                    .await
            }
            Command::ReactivateProjectGrant {
                project_id,
                grant_id,
            } => {
                self.reactivate_project_grant(ctx, &project_id, &grant_id)
                    .await
            }
            Command::RemoveProjectGrant {
                project_id,
                grant_id,
            } => {
                self.remove_project_grant(ctx, &project_id, &grant_id)
                    .await
            }
            Command::AddMember {
                scope,
                user_id,
                roles,
            } => self.add_member(ctx, scope, user_id, roles).await,
            Command::ChangeMember {
                scope,
                user_id,
                roles,
            } => self.change_member(ctx, scope, user_id, roles).await,
            Command::RemoveMember { scope, user_id } => {
                self.remove_member(ctx, scope, user_id).await
            }
            Command::AddGrant {
                grant_id,
                resource_owner,
                principal,
                target,
                role_keys,
            } => {
                self.add_grant(ctx, grant_id, resource_owner, principal, target, role_keys)
                    .await
            }
            Command::ChangeGrant {
                grant_id,
                principal_kind,
                role_keys,
            } => {
                self.change_grant(ctx, &grant_id, principal_kind, role_keys)
                    .await
            }
            Command::DeactivateGrant {
                grant_id,
                principal_kind,
            } => {
                self.deactivate_grant(ctx, &grant_id, principal_kind)
                    .await
            }
            Command::ReactivateGrant {
                grant_id,
                principal_kind,
            } => {
                self.reactivate_grant(ctx, &grant_id, principal_kind)
                    .await
            }
            Command::RemoveGrant {
                grant_id,
                principal_kind,
            } => self.remove_grant(ctx, &grant_id, principal_kind).await,
            Command::BulkRemoveGrants {
                grant_ids,
                principal_kind,
            } => {
                self.bulk_remove_grants(ctx, grant_ids, principal_kind)
                    .await
            }
        }
    }

    async fn load<M: WriteModel>(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Loaded<M>> {
        Ok(self.repository.load(aggregate_type, aggregate_id).await?)
    }

    /// Push all appends atomically. The receipt is that of the last stored
    /// event, which belongs to the last request.
    async fn commit(&self, appends: Vec<AppendRequest>) -> Result<ChangeReceipt> {
        let streams = appends.len();
        let stored = self.repository.push(appends).await?;
        let receipt = stored
            .last()
            .map(|e| e.receipt())
            .ok_or_else(|| Error::InvalidArgument("command produced no events".to_string()))?;
        info!(
            aggregate_type = %receipt.aggregate_type,
            aggregate_id = %receipt.aggregate_id,
            sequence = receipt.sequence,
            events = stored.len(),
            streams,
            "Command committed"
        );
        Ok(receipt)
    }

    /// Receipt of an unchanged aggregate.
    fn unchanged<M>(&self, loaded: &Loaded<M>) -> Result<ChangeReceipt> {
        debug!(
            aggregate_type = %loaded.aggregate_type,
            aggregate_id = %loaded.aggregate_id,
            "Command changes nothing"
        );
        Ok(loaded.receipt())
    }

    async fn active_org(&self, org_id: &str) -> Result<Loaded<OrgModel>> {
        let org: Loaded<OrgModel> = self.load(AggregateType::Org, org_id).await?;
        if !org.model.state.exists() {
            return Err(Error::not_found(AggregateType::Org, org_id));
        }
        Ok(org)
    }

    /// Project that exists and whose org exists.
    async fn active_project(&self, project: Loaded<ProjectModel>) -> Result<Loaded<ProjectModel>> {
        if !project.model.state.exists() {
            return Err(Error::not_found(AggregateType::Project, &project.aggregate_id));
        }
        self.active_org(&project.resource_owner).await?;
        Ok(project)
    }

    /// Group that exists and whose org exists.
    async fn active_group(&self, group: Loaded<GroupModel>) -> Result<Loaded<GroupModel>> {
        if !group.model.state.exists() {
            return Err(Error::not_found(AggregateType::Group, &group.aggregate_id));
        }
        self.active_org(&group.resource_owner).await?;
        Ok(group)
    }
}

fn event(ctx: &PermissionContext, payload: EventPayload) -> PendingEvent {
    PendingEvent::new(ctx.editor(), payload)
}

/// Record on `parent` that grant `grant_id` depends on it. A concurrent
/// removal of the parent then fails its sequence check, or this write does.
fn reference<M>(ctx: &PermissionContext, parent: &Loaded<M>, grant_id: &str) -> AppendRequest {
    parent.append().with_event(event(
        ctx,
        EventPayload::GrantReferenced {
            grant_id: grant_id.to_string(),
        },
    ))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Supplied ID, or a fresh one.
fn id_or_new(id: Option<String>) -> Result<String> {
    match id {
        Some(id) => {
            require("id", &id)?;
            Ok(id)
        }
        None => Ok(crate::model::new_id()),
    }
}
