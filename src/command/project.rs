use std::collections::BTreeSet;

use super::grant::dedup;
use super::{event, id_or_new, require, CommandProcessor};
use crate::aggregate::ProjectModel;
use crate::authz::{resolve_org, resolve_owned, PermissionContext};
use crate::cascade::{remove_grants, remove_members, strip_roles};
use crate::error::{Error, Result};
use crate::model::{AggregateType, ChangeReceipt, EventPayload, LifecycleState, MembershipScope};
use crate::repository::Loaded;
use crate::storage::AppendRequest;

impl CommandProcessor {
    pub(super) async fn add_project(
        &self,
        ctx: &PermissionContext,
        org_id: String,
        project_id: Option<String>,
        name: String,
    ) -> Result<ChangeReceipt> {
        resolve_org(ctx, &org_id)?;
        require("name", &name)?;
        self.active_org(&org_id).await?;
        let project_id = id_or_new(project_id)?;

        let project: Loaded<ProjectModel> = self.load(AggregateType::Project, &project_id).await?;
        if project.sequence > 0 {
            return Err(Error::already_exists(AggregateType::Project, &project_id));
        }

        let append = AppendRequest::new(AggregateType::Project, project_id, org_id, 0)
            .with_event(event(ctx, EventPayload::ProjectAdded { name }));
        self.commit(vec![append]).await
    }

    /// Load a project the caller may administer.
    async fn owned_project(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
    ) -> Result<Loaded<ProjectModel>> {
        let project: Loaded<ProjectModel> = self.load(AggregateType::Project, project_id).await?;
        resolve_owned(ctx, &project.resource_owner, project_id)?;
        self.active_project(project).await
    }

    pub(super) async fn change_project(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        name: String,
    ) -> Result<ChangeReceipt> {
        require("name", &name)?;
        let project = self.owned_project(ctx, project_id).await?;
        if project.model.name == name {
            return self.unchanged(&project);
        }

        let append = project
            .append()
            .with_event(event(ctx, EventPayload::ProjectChanged { name }));
        self.commit(vec![append]).await
    }

    pub(super) async fn deactivate_project(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        if !project.model.state.is_active() {
            return Err(Error::InvalidState(format!(
                "project {project_id} is not active"
            )));
        }

        let append = project
            .append()
            .with_event(event(ctx, EventPayload::ProjectDeactivated));
        self.commit(vec![append]).await
    }

    pub(super) async fn reactivate_project(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        if project.model.state != LifecycleState::Inactive {
            return Err(Error::InvalidState(format!(
                "project {project_id} is not inactive"
            )));
        }

        let append = project
            .append()
            .with_event(event(ctx, EventPayload::ProjectReactivated));
        self.commit(vec![append]).await
    }

    /// Remove a project with the memberships of the project and its project
    /// grants, and every grant targeting it.
    pub(super) async fn remove_project(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        let grants = self.cascade.grants_of_project(project_id).await?;
        let editor = ctx.editor();

        let mut removals = remove_members(
            &MembershipScope::Project {
                project_id: project_id.to_string(),
            },
            &project.model.members,
            &editor,
        );
        for (grant_id, grant) in &project.model.grants {
            let scope = MembershipScope::ProjectGrant {
                project_id: project_id.to_string(),
                grant_id: grant_id.clone(),
            };
            removals.extend(remove_members(&scope, &grant.members, &editor));
        }

        let mut appends = remove_grants(&grants, &editor);
        appends.push(
            project
                .append()
                .with_events(removals)
                .with_event(event(ctx, EventPayload::ProjectRemoved)),
        );
        self.commit(appends).await
    }

    pub(super) async fn add_project_role(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        key: String,
        display_name: String,
    ) -> Result<ChangeReceipt> {
        require("key", &key)?;
        let project = self.owned_project(ctx, project_id).await?;
        if project.model.has_role(&key) {
            return Err(Error::AlreadyExists(format!("project role {key}")));
        }

        let append = project.append().with_event(event(
            ctx,
            EventPayload::ProjectRoleAdded { key, display_name },
        ));
        self.commit(vec![append]).await
    }

    /// Remove a role from the project, its project grants and every grant
    /// holding it.
    pub(super) async fn remove_project_role(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        key: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        if !project.model.has_role(key) {
            return Err(Error::NotFound(format!("project role {key}")));
        }

        let grants = self.cascade.grants_with_role(project_id, key).await?;
        let editor = ctx.editor();

        let mut project_append = project.append();
        for (grant_id, grant) in &project.model.grants {
            if grant.state.exists() && grant.role_keys.iter().any(|k| k == key) {
                let role_keys = grant
                    .role_keys
                    .iter()
                    .filter(|k| *k != key)
                    .cloned()
                    .collect();
                project_append = project_append.with_event(event(
                    ctx,
                    EventPayload::ProjectGrantCascadeChanged {
                        grant_id: grant_id.clone(),
                        role_keys,
                    },
                ));
            }
        }
        project_append = project_append.with_event(event(
            ctx,
            EventPayload::ProjectRoleRemoved {
                key: key.to_string(),
            },
        ));

        let mut appends = strip_roles(&grants, &[key.to_string()], &editor);
        appends.push(project_append);
        self.commit(appends).await
    }

    pub(super) async fn add_project_grant(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        grant_id: Option<String>,
        granted_org_id: String,
        role_keys: Vec<String>,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        if !project.model.state.is_active() {
            return Err(Error::InvalidState(format!(
                "project {project_id} is inactive"
            )));
        }
        if granted_org_id == project.resource_owner {
            return Err(Error::InvalidArgument(
                "a project cannot be granted to its own org".to_string(),
            ));
        }
        self.active_org(&granted_org_id).await?;

        let grant_id = id_or_new(grant_id)?;
        if project.model.grants.contains_key(&grant_id) {
            return Err(Error::AlreadyExists(format!("project grant {grant_id}")));
        }
        if project
            .model
            .grants
            .values()
            .any(|g| g.state.exists() && g.granted_org_id == granted_org_id)
        {
            return Err(Error::AlreadyExists(format!(
                "project {project_id} already granted to org {granted_org_id}"
            )));
        }
        let role_keys = dedup(role_keys);
        let unknown = project.model.unknown_roles(&role_keys);
        if !unknown.is_empty() {
            return Err(Error::InvalidState(format!(
                "unknown project roles: {}",
                unknown.join(", ")
            )));
        }

        let append = project.append().with_event(event(
            ctx,
            EventPayload::ProjectGrantAdded {
                grant_id,
                granted_org_id,
                role_keys,
            },
        ));
        self.commit(vec![append]).await
    }

    /// Replace the role keys of a project grant. Grants on the project grant
    /// lose the keys it no longer carries.
    pub(super) async fn change_project_grant(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        grant_id: &str,
        role_keys: Vec<String>,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        let Some(grant) = project.model.grant(grant_id) else {
            return Err(Error::NotFound(format!("project grant {grant_id}")));
        };
        let role_keys = dedup(role_keys);
        let unknown = project.model.unknown_roles(&role_keys);
        if !unknown.is_empty() {
            return Err(Error::InvalidState(format!(
                "unknown project roles: {}",
                unknown.join(", ")
            )));
        }

        let removed: Vec<String> = grant
            .role_keys
            .iter()
            .filter(|k| !role_keys.contains(k))
            .cloned()
            .collect();
        let current: BTreeSet<&String> = grant.role_keys.iter().collect();
        if current == role_keys.iter().collect() {
            return self.unchanged(&project);
        }

        let mut appends = Vec::new();
        if !removed.is_empty() {
            let grants = self
                .cascade
                .grants_of_project_grant(project_id, grant_id)
                .await?;
            appends = strip_roles(&grants, &removed, &ctx.editor());
        }
        appends.push(project.append().with_event(event(
            ctx,
            EventPayload::ProjectGrantChanged {
                grant_id: grant_id.to_string(),
                role_keys,
            },
        )));
        self.commit(appends).await
    }

    pub(super) async fn deactivate_project_grant(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        grant_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        let Some(grant) = project.model.grant(grant_id) else {
            return Err(Error::NotFound(format!("project grant {grant_id}")));
        };
        if !grant.state.is_active() {
            return Err(Error::InvalidState(format!(
                "project grant {grant_id} is not active"
            )));
        }

        let append = project.append().with_event(event(
            ctx,
            EventPayload::ProjectGrantDeactivated {
                grant_id: grant_id.to_string(),
            },
        ));
        self.commit(vec![append]).await
    }

    pub(super) async fn reactivate_project_grant(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        grant_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        let Some(grant) = project.model.grant(grant_id) else {
            return Err(Error::NotFound(format!("project grant {grant_id}")));
        };
        if grant.state != LifecycleState::Inactive {
            return Err(Error::InvalidState(format!(
                "project grant {grant_id} is not inactive"
            )));
        }

        let append = project.append().with_event(event(
            ctx,
            EventPayload::ProjectGrantReactivated {
                grant_id: grant_id.to_string(),
            },
        ));
        self.commit(vec![append]).await
    }

    /// Remove a project grant with its memberships and the grants targeting
    /// it.
    pub(super) async fn remove_project_grant(
        &self,
        ctx: &PermissionContext,
        project_id: &str,
        grant_id: &str,
    ) -> Result<ChangeReceipt> {
        let project = self.owned_project(ctx, project_id).await?;
        let Some(grant) = project.model.grant(grant_id) else {
            return Err(Error::NotFound(format!("project grant {grant_id}")));
        };

        let grants = self
            .cascade
            .grants_of_project_grant(project_id, grant_id)
            .await?;
        let editor = ctx.editor();
        let scope = MembershipScope::ProjectGrant {
            project_id: project_id.to_string(),
            grant_id: grant_id.to_string(),
        };

        let mut appends = remove_grants(&grants, &editor);
        appends.push(
            project
                .append()
                .with_events(remove_members(&scope, &grant.members, &editor))
                .with_event(event(
                    ctx,
                    EventPayload::ProjectGrantRemoved {
                        grant_id: grant_id.to_string(),
                    },
                )),
        );
        self.commit(appends).await
    }
}
