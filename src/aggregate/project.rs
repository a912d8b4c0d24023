use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{apply_member_event, Members};
use crate::model::{Event, EventPayload, LifecycleState, MembershipScope};
use crate::repository::WriteModel;

/// A project grant: the project shared with another org.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectGrantModel {
    pub granted_org_id: String,
    pub role_keys: Vec<String>,
    pub state: LifecycleState,
    pub members: Members,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProjectModel {
    pub state: LifecycleState,
    pub name: String,
    /// Role key to display name.
    pub roles: BTreeMap<String, String>,
    pub grants: BTreeMap<String, ProjectGrantModel>,
    pub members: Members,
}

impl ProjectModel {
    pub fn has_role(&self, key: &str) -> bool {
        self.roles.contains_key(key)
    }

    /// Project grant with `grant_id`, active or inactive.
    pub fn grant(&self, grant_id: &str) -> Option<&ProjectGrantModel> {
        self.grants.get(grant_id).filter(|g| g.state.exists())
    }

    /// Role keys missing from the project.
    pub fn unknown_roles<'a>(&self, keys: &'a [String]) -> Vec<&'a str> {
        keys.iter()
            .filter(|k| !self.has_role(k))
            .map(String::as_str)
            .collect()
    }

    fn apply_member(&mut self, scope: &MembershipScope, payload: &EventPayload) {
        match scope {
            MembershipScope::Project { .. } => {
                apply_member_event(&mut self.members, payload);
            }
            MembershipScope::ProjectGrant { grant_id, .. } => {
                if let Some(grant) = self.grants.get_mut(grant_id) {
                    apply_member_event(&mut grant.members, payload);
                }
            }
            // Instance, org and group scopes live on other streams.
            _ => {}
        }
    }
}

impl WriteModel for ProjectModel {
    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::ProjectAdded { name } => {
                self.state = LifecycleState::Active;
                self.name = name.clone();
            }
            EventPayload::ProjectChanged { name } => {
                self.name = name.clone();
            }
            EventPayload::ProjectDeactivated => {
                self.state = LifecycleState::Inactive;
            }
            EventPayload::ProjectReactivated => {
                self.state = LifecycleState::Active;
            }
            EventPayload::ProjectRemoved => {
                self.state = LifecycleState::Removed;
                self.members.clear();
                for grant in self.grants.values_mut() {
                    grant.state = LifecycleState::Removed;
                    grant.members.clear();
                }
            }
            EventPayload::ProjectRoleAdded { key, display_name } => {
                self.roles.insert(key.clone(), display_name.clone());
            }
            EventPayload::ProjectRoleRemoved { key } => {
                self.roles.remove(key);
            }
            EventPayload::ProjectGrantAdded {
                grant_id,
                granted_org_id,
                role_keys,
            } => {
                self.grants.insert(
                    grant_id.clone(),
                    ProjectGrantModel {
                        granted_org_id: granted_org_id.clone(),
                        role_keys: role_keys.clone(),
                        state: LifecycleState::Active,
                        members: Members::new(),
                    },
                );
            }
            EventPayload::ProjectGrantChanged {
                grant_id,
                role_keys,
            }
            | EventPayload::ProjectGrantCascadeChanged {
                grant_id,
                role_keys,
            } => {
                if let Some(grant) = self.grants.get_mut(grant_id) {
                    grant.role_keys = role_keys.clone();
                }
            }
            EventPayload::ProjectGrantDeactivated { grant_id } => {
                if let Some(grant) = self.grants.get_mut(grant_id) {
                    grant.state = LifecycleState::Inactive;
                }
            }
            EventPayload::ProjectGrantReactivated { grant_id } => {
                if let Some(grant) = self.grants.get_mut(grant_id) {
                    grant.state = LifecycleState::Active;
                }
            }
            EventPayload::ProjectGrantRemoved { grant_id }
            | EventPayload::ProjectGrantCascadeRemoved { grant_id } => {
                if let Some(grant) = self.grants.get_mut(grant_id) {
                    grant.state = LifecycleState::Removed;
                    grant.members.clear();
                }
            }
            payload @ (EventPayload::MemberAdded { scope, .. }
            | EventPayload::MemberChanged { scope, .. }
            | EventPayload::MemberRemoved { scope, .. }
            | EventPayload::MemberCascadeRemoved { scope, .. }) => {
                self.apply_member(scope, payload);
            }
            // Grant references only advance the sequence.
            _ => {}
        }
    }
}
