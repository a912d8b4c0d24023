use async_trait::async_trait;

use super::views::{MemberRow, ReadModel, RowDetails};
use super::{Projection, MEMBERS};
use crate::error::Result;
use crate::model::{AggregateType, Event, EventPayload, MembershipScope};
use crate::utils::metrics::MetricsSink;

/// Materializes memberships of every scope.
pub struct MemberProjection {
    view: ReadModel,
}

impl MemberProjection {
    pub fn new(view: ReadModel) -> Self {
        Self { view }
    }
}

/// Whether a membership belongs to the removed project or any of its grants.
fn in_project(scope: &MembershipScope, removed: &str) -> bool {
    match scope {
        MembershipScope::Project { project_id }
        | MembershipScope::ProjectGrant { project_id, .. } => project_id == removed,
        _ => false,
    }
}

#[async_trait]
impl Projection for MemberProjection {
    fn name(&self) -> &'static str {
        MEMBERS
    }

    fn aggregate_types(&self) -> &'static [AggregateType] {
        &[
            AggregateType::Instance,
            AggregateType::Org,
            AggregateType::Project,
            AggregateType::Group,
        ]
    }

    async fn reduce(&self, event: &Event) -> Result<()> {
        let mut members = self.view.members.write().await;

        match &event.payload {
            EventPayload::InstanceMemberAdded { user_id, roles } => {
                let scope = MembershipScope::Instance;
                members.insert(
                    (scope.key(), user_id.clone()),
                    MemberRow {
                        scope,
                        user_id: user_id.clone(),
                        roles: roles.clone(),
                        details: RowDetails::created(event),
                    },
                );
            }
            EventPayload::MemberAdded {
                scope,
                user_id,
                roles,
            } => {
                members.insert(
                    (scope.key(), user_id.clone()),
                    MemberRow {
                        scope: scope.clone(),
                        user_id: user_id.clone(),
                        roles: roles.clone(),
                        details: RowDetails::created(event),
                    },
                );
            }
            EventPayload::MemberChanged {
                scope,
                user_id,
                roles,
            } => {
                if let Some(row) = members.get_mut(&(scope.key(), user_id.clone())) {
                    row.roles = roles.clone();
                    row.details.touch(event);
                }
            }
            EventPayload::MemberRemoved { scope, user_id }
            | EventPayload::MemberCascadeRemoved { scope, user_id } => {
                members.remove(&(scope.key(), user_id.clone()));
            }
            EventPayload::GroupRemoved => {
                let key = MembershipScope::Group {
                    group_id: event.aggregate_id.clone(),
                }
                .key();
                members.retain(|(scope, _), _| *scope != key);
            }
            EventPayload::ProjectRemoved => {
                members.retain(|_, row| !in_project(&row.scope, &event.aggregate_id));
            }
            EventPayload::ProjectGrantRemoved { grant_id }
            | EventPayload::ProjectGrantCascadeRemoved { grant_id } => {
                let key = MembershipScope::ProjectGrant {
                    project_id: event.aggregate_id.clone(),
                    grant_id: grant_id.clone(),
                }
                .key();
                members.retain(|(scope, _), _| *scope != key);
            }
            EventPayload::OrgRemoved => {
                members.retain(|_, row| row.details.resource_owner != event.aggregate_id);
            }
            // Events of the consumed types that do not touch memberships.
            _ => {}
        }
        Ok(())
    }

    async fn reset(&self) {
        self.view.members.write().await.clear();
    }

    async fn report(&self, metrics: &dyn MetricsSink) {
        let rows = self.view.members.read().await.len() as u64;
        metrics.view_size(MEMBERS, "members", rows);
    }
}
