use async_trait::async_trait;

use super::views::{GrantRow, ReadModel, RowDetails};
use super::{Projection, GRANTS};
use crate::error::Result;
use crate::model::{AggregateType, Event, EventPayload, GrantState};
use crate::utils::metrics::MetricsSink;

/// Materializes user and group grants.
///
/// Removed grants stay in the view as `GrantState::Removed` until their
/// owning org is removed.
pub struct GrantProjection {
    view: ReadModel,
}

impl GrantProjection {
    pub fn new(view: ReadModel) -> Self {
        Self { view }
    }
}

#[async_trait]
impl Projection for GrantProjection {
    fn name(&self) -> &'static str {
        GRANTS
    }

    fn aggregate_types(&self) -> &'static [AggregateType] {
        &[
            AggregateType::UserGrant,
            AggregateType::GroupGrant,
            AggregateType::Org,
        ]
    }

    async fn reduce(&self, event: &Event) -> Result<()> {
        let mut grants = self.view.grants.write().await;
        let key = (event.aggregate_type, event.aggregate_id.clone());

        let state = match &event.payload {
            EventPayload::GrantAdded {
                principal,
                target,
                role_keys,
            } => {
                grants.insert(
                    key,
                    GrantRow {
                        grant_id: event.aggregate_id.clone(),
                        principal: principal.clone(),
                        project_id: target.project_id().to_string(),
                        project_grant_id: target.grant_id().to_string(),
                        role_keys: role_keys.clone(),
                        state: GrantState::Active,
                        details: RowDetails::created(event),
                    },
                );
                return Ok(());
            }
            EventPayload::GrantChanged { role_keys }
            | EventPayload::GrantCascadeChanged { role_keys } => {
                if let Some(row) = grants.get_mut(&key) {
                    row.role_keys = role_keys.clone();
                    row.details.touch(event);
                }
                return Ok(());
            }
            EventPayload::GrantDeactivated => GrantState::Inactive,
            EventPayload::GrantReactivated => GrantState::Active,
            EventPayload::GrantRemoved | EventPayload::GrantCascadeRemoved => GrantState::Removed,
            EventPayload::OrgRemoved => {
                grants.retain(|_, row| row.details.resource_owner != event.aggregate_id);
                return Ok(());
            }
            // Events of the consumed types that do not touch grants.
            _ => return Ok(()),
        };

        if let Some(row) = grants.get_mut(&key) {
            row.state = state;
            row.details.touch(event);
        }
        Ok(())
    }

    async fn reset(&self) {
        self.view.grants.write().await.clear();
    }

    async fn report(&self, metrics: &dyn MetricsSink) {
        let rows = self.view.grants.read().await.len() as u64;
        metrics.view_size(GRANTS, "grants", rows);
    }
}
