use serde::{Deserialize, Serialize};

use super::{apply_member_event, Members};
use crate::model::{Event, EventPayload, MembershipScope};
use crate::repository::WriteModel;

/// Instance-level state. The instance exists implicitly.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InstanceModel {
    pub members: Members,
}

impl WriteModel for InstanceModel {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::InstanceMemberAdded { user_id, roles } => {
                self.members.insert(user_id.clone(), roles.clone());
            }
            EventPayload::MemberAdded { scope, .. }
            | EventPayload::MemberChanged { scope, .. }
            | EventPayload::MemberRemoved { scope, .. }
            | EventPayload::MemberCascadeRemoved { scope, .. }
                if *scope == MembershipScope::Instance =>
            {
                apply_member_event(&mut self.members, &event.payload);
            }
            // Other events of the instance stream do not change membership.
            _ => {}
        }
    }
}
