use async_trait::async_trait;

use super::views::{GroupRow, ReadModel, RowDetails};
use super::{Projection, GROUPS};
use crate::error::Result;
use crate::model::{AggregateType, Event, EventPayload};
use crate::utils::metrics::MetricsSink;

/// Materializes the groups view.
pub struct GroupProjection {
    view: ReadModel,
}

impl GroupProjection {
    pub fn new(view: ReadModel) -> Self {
        Self { view }
    }
}

#[async_trait]
impl Projection for GroupProjection {
    fn name(&self) -> &'static str {
        GROUPS
    }

    fn aggregate_types(&self) -> &'static [AggregateType] {
        &[AggregateType::Group, AggregateType::Org]
    }

    async fn reduce(&self, event: &Event) -> Result<()> {
        let mut groups = self.view.groups.write().await;
        match &event.payload {
            EventPayload::GroupAdded { name, description } => {
                groups.insert(
                    event.aggregate_id.clone(),
                    GroupRow {
                        group_id: event.aggregate_id.clone(),
                        name: name.clone(),
                        description: description.clone(),
                        details: RowDetails::created(event),
                    },
                );
            }
            EventPayload::GroupChanged { name, description } => {
                if let Some(row) = groups.get_mut(&event.aggregate_id) {
                    if let Some(name) = name {
                        row.name = name.clone();
                    }
                    if let Some(description) = description {
                        row.description = description.clone();
                    }
                    row.details.touch(event);
                }
            }
            EventPayload::MemberAdded { .. }
            | EventPayload::MemberChanged { .. }
            | EventPayload::MemberRemoved { .. }
            | EventPayload::MemberCascadeRemoved { .. }
                if event.aggregate_type == AggregateType::Group =>
            {
                if let Some(row) = groups.get_mut(&event.aggregate_id) {
                    row.details.touch(event);
                }
            }
            EventPayload::GroupRemoved => {
                groups.remove(&event.aggregate_id);
            }
            EventPayload::OrgRemoved => {
                groups.retain(|_, row| row.details.resource_owner != event.aggregate_id);
            }
            // Events of the consumed types that do not touch groups.
            _ => {}
        }
        Ok(())
    }

    async fn reset(&self) {
        self.view.groups.write().await.clear();
    }

    async fn report(&self, metrics: &dyn MetricsSink) {
        let rows = self.view.groups.read().await.len() as u64;
        metrics.view_size(GROUPS, "groups", rows);
    }
}
