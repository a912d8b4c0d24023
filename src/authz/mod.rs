//! Permission resolution for commands and queries.
//!
//! Decisions are pure functions of a [`PermissionContext`] and the IDs of the
//! resource being touched. A context marked `global` passes every check;
//! otherwise access comes from the caller's org or from explicitly granted
//! project / project-grant / group IDs.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{Editor, MembershipScope};


/// Message of every denial. Identical for missing and out-of-scope
/// resources.
pub const PERMISSION_DENIED: &str = "permission denied";

/// Who is calling and what they may touch.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    pub org_id: String,
    pub user_id: String,
    pub display_name: String,
    /// Instance-wide permission; skips all scoping.
    pub global: bool,
    /// Project, project grant and group IDs the caller holds permissions on.
    pub granted_ids: HashSet<String>,
}

impl PermissionContext {
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Context with instance-wide permission.
    pub fn global(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            global: true,
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_granted<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn editor(&self) -> Editor {
        Editor::new(self.user_id.clone(), self.display_name.clone())
    }

    fn holds(&self, id: &str) -> bool {
        !id.is_empty() && self.granted_ids.contains(id)
    }
}

pub(crate) fn denied() -> Error {
    Error::PermissionDenied(PERMISSION_DENIED.to_string())
}

/// Decide access to a project or project grant.
///
/// Checked in order: global context, granted project grant, granted project.
pub fn resolve(ctx: &PermissionContext, project_id: &str, grant_id: &str) -> Result<()> {
    if ctx.global || ctx.holds(grant_id) || ctx.holds(project_id) {
        return Ok(());
    }
    tracing::debug!(
        user_id = %ctx.user_id,
        project_id,
        grant_id,
        "permission denied"
    );
    Err(denied())
}

/// Decide access to an organization.
pub fn resolve_org(ctx: &PermissionContext, org_id: &str) -> Result<()> {
    if ctx.global || (!org_id.is_empty() && ctx.org_id == org_id) || ctx.holds(org_id) {
        return Ok(());
    }
    Err(denied())
}

/// Access to a resource owned by `owner`: through the owning org or a grant
/// on the resource itself.
pub fn resolve_owned(ctx: &PermissionContext, owner: &str, id: &str) -> Result<()> {
    if resolve_org(ctx, owner).is_ok() || ctx.holds(id) {
        return Ok(());
    }
    Err(denied())
}

/// Decide access to a membership scope.
///
/// `owners` are the orgs owning the scope's resource; for a project grant
/// both the project owner and the granted org qualify.
pub fn resolve_scope(
    ctx: &PermissionContext,
    scope: &MembershipScope,
    owners: &[&str],
) -> Result<()> {
    let allowed = match scope {
        MembershipScope::Instance => ctx.global,
        MembershipScope::Org { org_id } => resolve_org(ctx, org_id).is_ok(),
        MembershipScope::Project { project_id } => {
            resolve(ctx, project_id, "").is_ok()
                || owners.iter().any(|o| resolve_org(ctx, o).is_ok())
        }
        MembershipScope::ProjectGrant {
            project_id,
            grant_id,
        } => {
            resolve(ctx, project_id, grant_id).is_ok()
                || owners.iter().any(|o| resolve_org(ctx, o).is_ok())
        }
        MembershipScope::Group { group_id } => {
            ctx.holds(group_id) || owners.iter().any(|o| resolve_org(ctx, o).is_ok())
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(denied())
    }
}

/// Rows a caller may see in a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VisibilityScope {
    #[default]
    All,
    /// `resource_owner == org_id` or any row ID in `ids`.
    Scoped { org_id: String, ids: HashSet<String> },
}

impl VisibilityScope {
    /// Whether a row with the given owner and IDs is visible. Empty IDs never
    /// match.
    pub fn allows(&self, resource_owner: &str, ids: &[&str]) -> bool {
        match self {
            VisibilityScope::All => true,
            VisibilityScope::Scoped { org_id, ids: granted } => {
                (!org_id.is_empty() && resource_owner == org_id)
                    || ids
                        .iter()
                        .any(|id| !id.is_empty() && granted.contains(*id))
            }
        }
    }
}

/// Filter applied to a view before pagination.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub visibility: VisibilityScope,
}

/// Restrict `filter` to what `ctx` may see. Global contexts leave it as is.
pub fn narrow(ctx: &PermissionContext, filter: &mut ViewFilter) {
    if ctx.global {
        return;
    }
    filter.visibility = VisibilityScope::Scoped {
        org_id: ctx.org_id.clone(),
        ids: ctx.granted_ids.clone(),
    };
}
