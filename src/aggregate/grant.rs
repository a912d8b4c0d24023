use serde::{Deserialize, Serialize};

use crate::model::{Event, EventPayload, GrantState, GrantTarget, Principal};
use crate::repository::WriteModel;

/// A user or group grant on a project or project grant.
///
/// Both principal kinds share this model; the stream type tells them apart.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GrantModel {
    pub state: Option<GrantState>,
    pub principal: Option<Principal>,
    pub target: Option<GrantTarget>,
    pub role_keys: Vec<String>,
}

impl GrantModel {
    /// Added and not removed.
    pub fn exists(&self) -> bool {
        matches!(self.state, Some(GrantState::Active | GrantState::Inactive))
    }

    pub fn is_removed(&self) -> bool {
        self.state == Some(GrantState::Removed)
    }

    /// Project and project grant ID of the target, empty when unset.
    pub fn target_ids(&self) -> (&str, &str) {
        self.target
            .as_ref()
            .map(|t| (t.project_id(), t.grant_id()))
            .unwrap_or(("", ""))
    }

    /// Whether `role_keys` equals the current keys, ignoring order.
    pub fn same_roles(&self, role_keys: &[String]) -> bool {
        let mut current = self.role_keys.clone();
        let mut next = role_keys.to_vec();
        current.sort();
        current.dedup();
        next.sort();
        next.dedup();
        current == next
    }
}

impl WriteModel for GrantModel {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::GrantAdded {
                principal,
                target,
                role_keys,
            } => {
                self.state = Some(GrantState::Active);
                self.principal = Some(principal.clone());
                self.target = Some(target.clone());
                self.role_keys = role_keys.clone();
            }
            EventPayload::GrantChanged { role_keys }
            | EventPayload::GrantCascadeChanged { role_keys } => {
                self.role_keys = role_keys.clone();
            }
            EventPayload::GrantDeactivated => self.state = Some(GrantState::Inactive),
            EventPayload::GrantReactivated => self.state = Some(GrantState::Active),
            EventPayload::GrantRemoved | EventPayload::GrantCascadeRemoved => {
                self.state = Some(GrantState::Removed);
            }
            // Only grant events reach a grant stream.
            _ => {}
        }
    }
}
