//! Events: the immutable facts of the write model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AggregateType, ChangeReceipt, Editor, GrantTarget, MembershipScope, Principal};

/// Typed payload of every event the core emits.
///
/// Serialized internally tagged: the `type` field carries the event type
/// string, the remaining fields are the payload. Unknown types fail to
/// decode instead of being skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "instance.member.added")]
    InstanceMemberAdded { user_id: String, roles: Vec<String> },

    #[serde(rename = "org.added")]
    OrgAdded { name: String },
    #[serde(rename = "org.removed")]
    OrgRemoved,

    #[serde(rename = "group.added")]
    GroupAdded { name: String, description: String },
    #[serde(rename = "group.changed")]
    GroupChanged {
        name: Option<String>,
        description: Option<String>,
    },
    #[serde(rename = "group.removed")]
    GroupRemoved,

    #[serde(rename = "project.added")]
    ProjectAdded { name: String },
    #[serde(rename = "project.changed")]
    ProjectChanged { name: String },
    #[serde(rename = "project.deactivated")]
    ProjectDeactivated,
    #[serde(rename = "project.reactivated")]
    ProjectReactivated,
    #[serde(rename = "project.removed")]
    ProjectRemoved,
    #[serde(rename = "project.role.added")]
    ProjectRoleAdded { key: String, display_name: String },
    #[serde(rename = "project.role.removed")]
    ProjectRoleRemoved { key: String },
    #[serde(rename = "project.grant.added")]
    ProjectGrantAdded {
        grant_id: String,
        granted_org_id: String,
        role_keys: Vec<String>,
    },
    #[serde(rename = "project.grant.changed")]
    ProjectGrantChanged {
        grant_id: String,
        role_keys: Vec<String>,
    },
    #[serde(rename = "project.grant.cascade.changed")]
    ProjectGrantCascadeChanged {
        grant_id: String,
        role_keys: Vec<String>,
    },
    #[serde(rename = "project.grant.deactivated")]
    ProjectGrantDeactivated { grant_id: String },
    #[serde(rename = "project.grant.reactivated")]
    ProjectGrantReactivated { grant_id: String },
    #[serde(rename = "project.grant.removed")]
    ProjectGrantRemoved { grant_id: String },
    #[serde(rename = "project.grant.cascade.removed")]
    ProjectGrantCascadeRemoved { grant_id: String },

    /// Recorded on a project, group or org stream whenever a grant that
    /// depends on it is added or changed. Removals of the referenced
    /// aggregate then conflict with the grant write.
    #[serde(rename = "grant.reference.added")]
    GrantReferenced { grant_id: String },

    #[serde(rename = "member.added")]
    MemberAdded {
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    },
    #[serde(rename = "member.changed")]
    MemberChanged {
        scope: MembershipScope,
        user_id: String,
        roles: Vec<String>,
    },
    #[serde(rename = "member.removed")]
    MemberRemoved {
        scope: MembershipScope,
        user_id: String,
    },
    #[serde(rename = "member.cascade.removed")]
    MemberCascadeRemoved {
        scope: MembershipScope,
        user_id: String,
    },

    #[serde(rename = "grant.added")]
    GrantAdded {
        principal: Principal,
        target: GrantTarget,
        role_keys: Vec<String>,
    },
    #[serde(rename = "grant.changed")]
    GrantChanged { role_keys: Vec<String> },
    #[serde(rename = "grant.cascade.changed")]
    GrantCascadeChanged { role_keys: Vec<String> },
    #[serde(rename = "grant.deactivated")]
    GrantDeactivated,
    #[serde(rename = "grant.reactivated")]
    GrantReactivated,
    #[serde(rename = "grant.removed")]
    GrantRemoved,
    #[serde(rename = "grant.cascade.removed")]
    GrantCascadeRemoved,
}

impl EventPayload {
    /// Event type string as stored in the log.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::InstanceMemberAdded { .. } => "instance.member.added",
            EventPayload::OrgAdded { .. } => "org.added",
            EventPayload::OrgRemoved => "org.removed",
            EventPayload::GroupAdded { .. } => "group.added",
            EventPayload::GroupChanged { .. } => "group.changed",
            EventPayload::GroupRemoved => "group.removed",
            EventPayload::ProjectAdded { .. } => "project.added",
            EventPayload::ProjectChanged { .. } => "project.changed",
            EventPayload::ProjectDeactivated => "project.deactivated",
            EventPayload::ProjectReactivated => "project.reactivated",
            EventPayload::ProjectRemoved => "project.removed",
            EventPayload::ProjectRoleAdded { .. } => "project.role.added",
            EventPayload::ProjectRoleRemoved { .. } => "project.role.removed",
            EventPayload::ProjectGrantAdded { .. } => "project.grant.added",
            EventPayload::ProjectGrantChanged { .. } => "project.grant.changed",
            EventPayload::ProjectGrantCascadeChanged { .. } => "project.grant.cascade.changed",
            EventPayload::ProjectGrantDeactivated { .. } => "project.grant.deactivated",
            EventPayload::ProjectGrantReactivated { .. } => "project.grant.reactivated",
            EventPayload::ProjectGrantRemoved { .. } => "project.grant.removed",
            EventPayload::ProjectGrantCascadeRemoved { .. } => "project.grant.cascade.removed",
            EventPayload::GrantReferenced { .. } => "grant.reference.added",
            EventPayload::MemberAdded { .. } => "member.added",
            EventPayload::MemberChanged { .. } => "member.changed",
            EventPayload::MemberRemoved { .. } => "member.removed",
            EventPayload::MemberCascadeRemoved { .. } => "member.cascade.removed",
            EventPayload::GrantAdded { .. } => "grant.added",
            EventPayload::GrantChanged { .. } => "grant.changed",
            EventPayload::GrantCascadeChanged { .. } => "grant.cascade.changed",
            EventPayload::GrantDeactivated => "grant.deactivated",
            EventPayload::GrantReactivated => "grant.reactivated",
            EventPayload::GrantRemoved => "grant.removed",
            EventPayload::GrantCascadeRemoved => "grant.cascade.removed",
        }
    }

    /// Whether the event puts its subject into a terminal removed state.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            EventPayload::OrgRemoved
                | EventPayload::GroupRemoved
                | EventPayload::ProjectRemoved
                | EventPayload::ProjectGrantRemoved { .. }
                | EventPayload::ProjectGrantCascadeRemoved { .. }
                | EventPayload::MemberRemoved { .. }
                | EventPayload::MemberCascadeRemoved { .. }
                | EventPayload::GrantRemoved
                | EventPayload::GrantCascadeRemoved
        )
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Event not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub editor: Editor,
    pub payload: EventPayload,
}

impl PendingEvent {
    pub fn new(editor: Editor, payload: EventPayload) -> Self {
        Self { editor, payload }
    }
}

/// Persisted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    /// Per-aggregate sequence, gap-free and starting at 1.
    pub sequence: u64,
    /// Global commit order across all aggregates.
    pub position: u64,
    pub resource_owner: String,
    pub creation_date: DateTime<Utc>,
    pub editor: Editor,
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Receipt for the aggregate state this event produced.
    pub fn receipt(&self) -> ChangeReceipt {
        ChangeReceipt {
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id.clone(),
            sequence: self.sequence,
            position: self.position,
            change_date: self.creation_date,
            resource_owner: self.resource_owner.clone(),
        }
    }
}
