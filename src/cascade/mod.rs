//! Dependents of destructive commands.
//!
//! Grants that depend on a group, project, project grant, role or org are
//! found in the grants view, which is brought up to date first. Every
//! candidate is reloaded from its write model: the view only says where to
//! look, the write model decides. Memberships come from the parent's own
//! write model, since they live on the parent's stream.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::aggregate::{GrantModel, Members};
use crate::error::Result;
use crate::model::{Editor, EventPayload, GrantState, MembershipScope, PendingEvent, Principal};
use crate::projection::views::{GrantKey, GrantRow};
use crate::projection::{ProjectionEngine, ReadModel};
use crate::repository::{Loaded, WriteModelRepository};
use crate::storage::AppendRequest;


/// Collects dependents from the current projections.
pub struct CascadeResolver {
    repository: Arc<WriteModelRepository>,
    engine: Arc<ProjectionEngine>,
    view: ReadModel,
}

impl CascadeResolver {
    pub fn new(
        repository: Arc<WriteModelRepository>,
        engine: Arc<ProjectionEngine>,
        view: ReadModel,
    ) -> Self {
        Self {
            repository,
            engine,
            view,
        }
    }

    /// Grants whose principal is the group.
    pub async fn grants_of_group(&self, group_id: &str) -> Result<Vec<Loaded<GrantModel>>> {
        self.collect(|row| {
            matches!(&row.principal, Principal::Group { group_id: g } if g == group_id)
        })
        .await
    }

    /// Grants targeting the project or any of its project grants.
    pub async fn grants_of_project(&self, project_id: &str) -> Result<Vec<Loaded<GrantModel>>> {
        self.collect(|row| row.project_id == project_id).await
    }

    /// Grants targeting one project grant.
    pub async fn grants_of_project_grant(
        &self,
        project_id: &str,
        grant_id: &str,
    ) -> Result<Vec<Loaded<GrantModel>>> {
        self.collect(|row| row.project_id == project_id && row.project_grant_id == grant_id)
            .await
    }

    /// Grants on the project holding the role key.
    pub async fn grants_with_role(
        &self,
        project_id: &str,
        key: &str,
    ) -> Result<Vec<Loaded<GrantModel>>> {
        let grants = self
            .collect(|row| {
                row.project_id == project_id && row.role_keys.iter().any(|k| k == key)
            })
            .await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.model.role_keys.iter().any(|k| k == key))
            .collect())
    }

    /// Grants owned by the org or targeting one of its projects.
    pub async fn grants_of_org(&self, org_id: &str) -> Result<Vec<Loaded<GrantModel>>> {
        self.engine.catch_up().await?;
        let projects: Vec<String> = self
            .view
            .projects
            .read()
            .await
            .values()
            .filter(|p| p.details.resource_owner == org_id)
            .map(|p| p.project_id.clone())
            .collect();
        let keys = self
            .matching(|row| {
                row.details.resource_owner == org_id || projects.contains(&row.project_id)
            })
            .await;
        self.reload(keys).await
    }

    async fn collect<F>(&self, predicate: F) -> Result<Vec<Loaded<GrantModel>>>
    where
        F: Fn(&GrantRow) -> bool,
    {
        self.engine.catch_up().await?;
        let keys = self.matching(predicate).await;
        self.reload(keys).await
    }

    async fn matching<F>(&self, predicate: F) -> Vec<GrantKey>
    where
        F: Fn(&GrantRow) -> bool,
    {
        self.view
            .grants
            .read()
            .await
            .iter()
            .filter(|(_, row)| row.state != GrantState::Removed && predicate(row))
            .map(|(key, _)| key.clone())
            .collect()
    }

    async fn reload(&self, keys: Vec<GrantKey>) -> Result<Vec<Loaded<GrantModel>>> {
        let mut grants = Vec::with_capacity(keys.len());
        for (aggregate_type, grant_id) in keys {
            let loaded: Loaded<GrantModel> = self.repository.load(aggregate_type, &grant_id).await?;
            if !loaded.model.exists() {
                warn!(
                    %aggregate_type,
                    grant_id,
                    "Grant listed as dependent is already removed, skipping"
                );
                continue;
            }
            grants.push(loaded);
        }
        debug!(dependents = grants.len(), "Collected dependent grants");
        Ok(grants)
    }
}

/// One `GrantCascadeRemoved` append per grant.
pub fn remove_grants(grants: &[Loaded<GrantModel>], editor: &Editor) -> Vec<AppendRequest> {
    grants
        .iter()
        .map(|g| {
            g.append()
                .with_event(PendingEvent::new(editor.clone(), EventPayload::GrantCascadeRemoved))
        })
        .collect()
}

/// One `GrantCascadeChanged` append per grant holding any of `keys`,
/// dropping them from its roles.
pub fn strip_roles(
    grants: &[Loaded<GrantModel>],
    keys: &[String],
    editor: &Editor,
) -> Vec<AppendRequest> {
    grants
        .iter()
        .filter(|g| g.model.role_keys.iter().any(|k| keys.contains(k)))
        .map(|g| {
            let role_keys = g
                .model
                .role_keys
                .iter()
                .filter(|k| !keys.contains(k))
                .cloned()
                .collect();
            g.append().with_event(PendingEvent::new(
                editor.clone(),
                EventPayload::GrantCascadeChanged { role_keys },
            ))
        })
        .collect()
}

/// One `MemberCascadeRemoved` per member of the scope.
pub fn remove_members(
    scope: &MembershipScope,
    members: &Members,
    editor: &Editor,
) -> Vec<PendingEvent> {
    members
        .keys()
        .map(|user_id| {
            PendingEvent::new(
                editor.clone(),
                EventPayload::MemberCascadeRemoved {
                    scope: scope.clone(),
                    user_id: user_id.clone(),
                },
            )
        })
        .collect()
}
