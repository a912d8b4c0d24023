use serde::{Deserialize, Serialize};

use super::{apply_member_event, Members};
use crate::model::{Event, EventPayload, LifecycleState};
use crate::repository::WriteModel;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GroupModel {
    pub state: LifecycleState,
    pub name: String,
    pub description: String,
    pub members: Members,
}

impl GroupModel {
    /// Whether a change to `name`/`description` would alter anything.
    pub fn differs(&self, name: Option<&str>, description: Option<&str>) -> bool {
        name.is_some_and(|n| n != self.name)
            || description.is_some_and(|d| d != self.description)
    }
}

impl WriteModel for GroupModel {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::GroupAdded { name, description } => {
                self.state = LifecycleState::Active;
                self.name = name.clone();
                self.description = description.clone();
            }
            EventPayload::GroupChanged { name, description } => {
                if let Some(name) = name {
                    self.name = name.clone();
                }
                if let Some(description) = description {
                    self.description = description.clone();
                }
            }
            EventPayload::GroupRemoved => {
                self.state = LifecycleState::Removed;
                self.members.clear();
            }
            payload => {
                apply_member_event(&mut self.members, payload);
            }
        }
    }
}
