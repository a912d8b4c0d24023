use serde::{Deserialize, Serialize};

use super::{apply_member_event, Members};
use crate::model::{Event, EventPayload, LifecycleState};
use crate::repository::WriteModel;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct OrgModel {
    pub state: LifecycleState,
    pub name: String,
    pub members: Members,
}

impl WriteModel for OrgModel {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::OrgAdded { name } => {
                self.state = LifecycleState::Active;
                self.name = name.clone();
            }
            EventPayload::OrgRemoved => {
                self.state = LifecycleState::Removed;
                self.members.clear();
            }
            payload => {
                apply_member_event(&mut self.members, payload);
            }
        }
    }
}
