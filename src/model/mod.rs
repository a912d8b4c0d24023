//! Core domain types shared by the write and read side.
//!
//! Aggregates are identified by `(AggregateType, aggregate_id)` and owned by
//! exactly one resource owner (an organization, or the instance itself).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod event;

pub use event::{Event, EventPayload, PendingEvent};

/// Aggregate kinds known to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Instance,
    Org,
    Project,
    Group,
    UserGrant,
    GroupGrant,
}

impl AggregateType {
    pub const ALL: [AggregateType; 6] = [
        AggregateType::Instance,
        AggregateType::Org,
        AggregateType::Project,
        AggregateType::Group,
        AggregateType::UserGrant,
        AggregateType::GroupGrant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Instance => "instance",
            AggregateType::Org => "org",
            AggregateType::Project => "project",
            AggregateType::Group => "group",
            AggregateType::UserGrant => "usergrant",
            AggregateType::GroupGrant => "groupgrant",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Actor that caused an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    pub user_id: String,
    pub display_name: String,
}

impl Editor {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Editor used for events the system emits on its own behalf.
    pub fn system() -> Self {
        Self::new("SYSTEM", "system")
    }
}

/// Result of every write, usable as a consistency token for later reads.
///
/// A read that presents a receipt never observes the aggregate at a sequence
/// lower than `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReceipt {
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub sequence: u64,
    /// Global log position of the event that produced `sequence`.
    pub position: u64,
    pub change_date: DateTime<Utc>,
    pub resource_owner: String,
}

/// Lifecycle of orgs, projects, project grants and groups.
///
/// Only projects and project grants are ever `Inactive`. An inactive
/// resource still exists but accepts no new grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl LifecycleState {
    pub fn exists(&self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::Inactive)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

/// Grant lifecycle: `Active <-> Inactive -> Removed`.
///
/// `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Active,
    Inactive,
    Removed,
}

/// Kind of principal a grant is given to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            PrincipalKind::User => AggregateType::UserGrant,
            PrincipalKind::Group => AggregateType::GroupGrant,
        }
    }
}

/// Holder of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User { user_id: String },
    Group { group_id: String },
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User { .. } => PrincipalKind::User,
            Principal::Group { .. } => PrincipalKind::Group,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Principal::User { user_id } => user_id,
            Principal::Group { group_id } => group_id,
        }
    }
}

/// What a grant gives access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantTarget {
    Project { project_id: String },
    ProjectGrant { project_id: String, grant_id: String },
}

impl GrantTarget {
    pub fn project_id(&self) -> &str {
        match self {
            GrantTarget::Project { project_id } | GrantTarget::ProjectGrant { project_id, .. } => {
                project_id
            }
        }
    }

    /// Project grant ID, empty for plain project targets.
    pub fn grant_id(&self) -> &str {
        match self {
            GrantTarget::Project { .. } => "",
            GrantTarget::ProjectGrant { grant_id, .. } => grant_id,
        }
    }
}

/// Resource a membership is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MembershipScope {
    Instance,
    Org { org_id: String },
    Project { project_id: String },
    ProjectGrant { project_id: String, grant_id: String },
    Group { group_id: String },
}

impl MembershipScope {
    /// Aggregate whose stream records memberships of this scope.
    pub fn aggregate(&self, instance_id: &str) -> (AggregateType, String) {
        match self {
            MembershipScope::Instance => (AggregateType::Instance, instance_id.to_string()),
            MembershipScope::Org { org_id } => (AggregateType::Org, org_id.clone()),
            MembershipScope::Project { project_id }
            | MembershipScope::ProjectGrant { project_id, .. } => {
                (AggregateType::Project, project_id.clone())
            }
            MembershipScope::Group { group_id } => (AggregateType::Group, group_id.clone()),
        }
    }

    /// Stable key used by the membership view.
    pub fn key(&self) -> String {
        match self {
            MembershipScope::Instance => "instance".to_string(),
            MembershipScope::Org { org_id } => format!("org:{org_id}"),
            MembershipScope::Project { project_id } => format!("project:{project_id}"),
            MembershipScope::ProjectGrant {
                project_id,
                grant_id,
            } => format!("project_grant:{project_id}:{grant_id}"),
            MembershipScope::Group { group_id } => format!("group:{group_id}"),
        }
    }
}

/// Generate a new aggregate ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
