//! In-memory read model shared by the projections and the query side.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::model::{AggregateType, Event, GrantState, LifecycleState, MembershipScope, Principal};

/// Fields every row carries about the last event that touched it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDetails {
    pub sequence: u64,
    pub creation_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    pub resource_owner: String,
}

impl RowDetails {
    pub(crate) fn created(event: &Event) -> Self {
        Self {
            sequence: event.sequence,
            creation_date: event.creation_date,
            change_date: event.creation_date,
            resource_owner: event.resource_owner.clone(),
        }
    }

    pub(crate) fn touch(&mut self, event: &Event) {
        self.sequence = event.sequence;
        self.change_date = event.creation_date;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub group_id: String,
    pub name: String,
    pub description: String,
    pub details: RowDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub project_id: String,
    pub name: String,
    /// Role key to display name.
    pub roles: BTreeMap<String, String>,
    pub state: LifecycleState,
    pub details: RowDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectGrantRow {
    pub project_id: String,
    pub grant_id: String,
    pub granted_org_id: String,
    pub role_keys: Vec<String>,
    pub state: LifecycleState,
    pub details: RowDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantRow {
    pub grant_id: String,
    pub principal: Principal,
    pub project_id: String,
    /// Empty for grants on the project itself.
    pub project_grant_id: String,
    pub role_keys: Vec<String>,
    pub state: GrantState,
    pub details: RowDetails,
}

impl GrantRow {
    pub fn aggregate_type(&self) -> AggregateType {
        self.principal.kind().aggregate_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberRow {
    pub scope: MembershipScope,
    pub user_id: String,
    pub roles: Vec<String>,
    pub details: RowDetails,
}

/// Key of a grant row: principal kind's aggregate type and grant ID.
pub type GrantKey = (AggregateType, String);

/// Key of a member row: scope key and user ID.
pub type MemberKey = (String, String);

/// The materialized views.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct ReadModel {
    pub groups: Arc<RwLock<BTreeMap<String, GroupRow>>>,
    pub projects: Arc<RwLock<BTreeMap<String, ProjectRow>>>,
    pub project_grants: Arc<RwLock<BTreeMap<(String, String), ProjectGrantRow>>>,
    pub grants: Arc<RwLock<BTreeMap<GrantKey, GrantRow>>>,
    pub members: Arc<RwLock<BTreeMap<MemberKey, MemberRow>>>,
}

impl ReadModel {
    pub fn new() -> Self {
        Self::default()
    }
}
