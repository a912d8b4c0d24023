use async_trait::async_trait;

use super::views::{ProjectGrantRow, ProjectRow, ReadModel, RowDetails};
use super::{Projection, PROJECTS};
use crate::error::Result;
use crate::model::{AggregateType, Event, EventPayload, LifecycleState};
use crate::utils::metrics::MetricsSink;

/// Materializes projects with their roles, and project grants.
pub struct ProjectProjection {
    view: ReadModel,
}

impl ProjectProjection {
    pub fn new(view: ReadModel) -> Self {
        Self { view }
    }
}

#[async_trait]
impl Projection for ProjectProjection {
    fn name(&self) -> &'static str {
        PROJECTS
    }

    fn aggregate_types(&self) -> &'static [AggregateType] {
        &[AggregateType::Project, AggregateType::Org]
    }

    async fn reduce(&self, event: &Event) -> Result<()> {
        let mut projects = self.view.projects.write().await;
        let mut grants = self.view.project_grants.write().await;
        let project_id = &event.aggregate_id;

        match &event.payload {
            EventPayload::ProjectAdded { name } => {
                projects.insert(
                    project_id.clone(),
                    ProjectRow {
                        project_id: project_id.clone(),
                        name: name.clone(),
                        roles: Default::default(),
                        state: LifecycleState::Active,
                        details: RowDetails::created(event),
                    },
                );
            }
            EventPayload::ProjectChanged { name } => {
                if let Some(row) = projects.get_mut(project_id) {
                    row.name = name.clone();
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectDeactivated | EventPayload::ProjectReactivated => {
                if let Some(row) = projects.get_mut(project_id) {
                    row.state = match event.payload {
                        EventPayload::ProjectDeactivated => LifecycleState::Inactive,
                        _ => LifecycleState::Active,
                    };
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectRoleAdded { key, display_name } => {
                if let Some(row) = projects.get_mut(project_id) {
                    row.roles.insert(key.clone(), display_name.clone());
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectRoleRemoved { key } => {
                if let Some(row) = projects.get_mut(project_id) {
                    row.roles.remove(key);
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectRemoved => {
                projects.remove(project_id);
                grants.retain(|(p, _), _| p != project_id);
            }
            EventPayload::ProjectGrantAdded {
                grant_id,
                granted_org_id,
                role_keys,
            } => {
                grants.insert(
                    (project_id.clone(), grant_id.clone()),
                    ProjectGrantRow {
                        project_id: project_id.clone(),
                        grant_id: grant_id.clone(),
                        granted_org_id: granted_org_id.clone(),
                        role_keys: role_keys.clone(),
                        state: LifecycleState::Active,
                        details: RowDetails::created(event),
                    },
                );
            }
            EventPayload::ProjectGrantChanged {
                grant_id,
                role_keys,
            }
            | EventPayload::ProjectGrantCascadeChanged {
                grant_id,
                role_keys,
            } => {
                if let Some(row) = grants.get_mut(&(project_id.clone(), grant_id.clone())) {
                    row.role_keys = role_keys.clone();
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectGrantDeactivated { grant_id }
            | EventPayload::ProjectGrantReactivated { grant_id } => {
                if let Some(row) = grants.get_mut(&(project_id.clone(), grant_id.clone())) {
                    row.state = match event.payload {
                        EventPayload::ProjectGrantDeactivated { .. } => LifecycleState::Inactive,
                        _ => LifecycleState::Active,
                    };
                    row.details.touch(event);
                }
            }
            EventPayload::ProjectGrantRemoved { grant_id }
            | EventPayload::ProjectGrantCascadeRemoved { grant_id } => {
                grants.remove(&(project_id.clone(), grant_id.clone()));
            }
            EventPayload::OrgRemoved => {
                let org_id = &event.aggregate_id;
                projects.retain(|_, row| &row.details.resource_owner != org_id);
                grants.retain(|_, row| {
                    &row.details.resource_owner != org_id && &row.granted_org_id != org_id
                });
            }
            // Events of the consumed types that do not touch projects.
            _ => {}
        }
        Ok(())
    }

    async fn reset(&self) {
        self.view.projects.write().await.clear();
        self.view.project_grants.write().await.clear();
    }

    async fn report(&self, metrics: &dyn MetricsSink) {
        let projects = self.view.projects.read().await.len() as u64;
        let grants = self.view.project_grants.read().await.len() as u64;
        metrics.view_size(PROJECTS, "projects", projects);
        metrics.view_size(PROJECTS, "project_grants", grants);
    }
}
