//! Write models of the aggregates the core manages.
//!
//! Each model folds its own stream only. Membership events are recorded on
//! the stream of the resource the membership is attached to, so every
//! model that can carry members keeps a `Members` map.

use std::collections::BTreeMap;

use crate::model::EventPayload;

mod grant;
mod group;
mod instance;
mod org;
mod project;

pub use grant::GrantModel;
pub use group::GroupModel;
pub use instance::InstanceModel;
pub use org::OrgModel;
pub use project::{ProjectGrantModel, ProjectModel};

/// Members of a resource: user ID to roles.
pub type Members = BTreeMap<String, Vec<String>>;

/// Apply a membership event to `members`. Returns false for other events.
///
/// Callers decide beforehand whether the event's scope belongs to them.
pub(crate) fn apply_member_event(members: &mut Members, payload: &EventPayload) -> bool {
    match payload {
        EventPayload::MemberAdded { user_id, roles, .. }
        | EventPayload::MemberChanged { user_id, roles, .. } => {
            members.insert(user_id.clone(), roles.clone());
            true
        }
        EventPayload::MemberRemoved { user_id, .. }
        | EventPayload::MemberCascadeRemoved { user_id, .. } => {
            members.remove(user_id);
            true
        }
        _ => false,
    }
}
