//! Projections: asynchronous read models fed from the event log.
//!
//! Each projection consumes the aggregate types it declares, in global
//! position order, and records per-aggregate watermarks in the
//! `PositionStore` after applying an event. The consistency coordinator
//! reads those watermarks to serve read-after-write queries.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AggregateType, Event};
use crate::utils::metrics::MetricsSink;

mod engine;
mod grant;
mod group;
mod member;
mod project;
pub mod views;


pub use engine::{ProjectionEngine, ProjectionHandle};
pub use grant::GrantProjection;
pub use group::GroupProjection;
pub use member::MemberProjection;
pub use project::ProjectProjection;
pub use views::ReadModel;

pub const GROUPS: &str = "projections.groups";
pub const PROJECTS: &str = "projections.projects";
pub const GRANTS: &str = "projections.grants";
pub const MEMBERS: &str = "projections.members";

/// A read model maintained from the event log.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name under which positions are stored.
    fn name(&self) -> &'static str;

    /// Aggregate types whose events this projection consumes.
    fn aggregate_types(&self) -> &'static [AggregateType];

    /// Apply one event to the view.
    async fn reduce(&self, event: &Event) -> Result<()>;

    /// Drop all view rows.
    async fn reset(&self);

    /// Emit view sizes.
    async fn report(&self, metrics: &dyn MetricsSink);
}

/// The standard projections over one shared read model.
pub fn standard(view: &ReadModel) -> Vec<Arc<dyn Projection>> {
    vec![
        Arc::new(GroupProjection::new(view.clone())),
        Arc::new(ProjectProjection::new(view.clone())),
        Arc::new(GrantProjection::new(view.clone())),
        Arc::new(MemberProjection::new(view.clone())),
    ]
}
