//! Read side: queries over the materialized views.
//!
//! Single-item reads and list narrowing share one visibility predicate, so a
//! row that would be missing from a list is denied when read directly. A
//! caller without instance-wide permission cannot distinguish a missing row
//! from one outside its scope.

use serde::Serialize;
use tracing::warn;

use crate::authz::{self, narrow, resolve_scope, PermissionContext, ViewFilter};
use crate::error::{Error, Result};
use crate::model::{AggregateType, GrantState, LifecycleState, MembershipScope, PrincipalKind};
use crate::projection::views::{GrantRow, GroupRow, MemberRow, ProjectRow, RowDetails};
use crate::projection::{ReadModel, GRANTS, GROUPS, MEMBERS, PROJECTS};

#[cfg(test)]
mod tests;

/// Paging of list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub offset: usize,
    /// Zero means no limit.
    pub limit: usize,
    pub ascending: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 0,
            ascending: true,
        }
    }
}

/// One page of a list query. `total` counts every visible match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult<T> {
    pub total: usize,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupSearch {
    /// Case-insensitive substring of the name.
    Name(String),
    ResourceOwner(String),
}

impl GroupSearch {
    fn matches(&self, row: &GroupRow) -> bool {
        match self {
            GroupSearch::Name(name) => contains_ignore_case(&row.name, name),
            GroupSearch::ResourceOwner(owner) => row.details.resource_owner == *owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectSearch {
    /// Case-insensitive substring of the name.
    Name(String),
    ResourceOwner(String),
    /// Projects defining the role key.
    RoleKey(String),
    State(LifecycleState),
}

impl ProjectSearch {
    fn matches(&self, row: &ProjectRow) -> bool {
        match self {
            ProjectSearch::Name(name) => contains_ignore_case(&row.name, name),
            ProjectSearch::ResourceOwner(owner) => row.details.resource_owner == *owner,
            ProjectSearch::RoleKey(key) => row.roles.contains_key(key),
            ProjectSearch::State(state) => row.state == *state,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GrantSearch {
    ProjectId(String),
    ProjectGrantId(String),
    UserId(String),
    GroupId(String),
    PrincipalKind(PrincipalKind),
    RoleKey(String),
    State(GrantState),
    ResourceOwner(String),
}

impl GrantSearch {
    fn matches(&self, row: &GrantRow) -> bool {
        use crate::model::Principal;
        match self {
            GrantSearch::ProjectId(id) => row.project_id == *id,
            GrantSearch::ProjectGrantId(id) => row.project_grant_id == *id,
            GrantSearch::UserId(id) => {
                matches!(&row.principal, Principal::User { user_id } if user_id == id)
            }
            GrantSearch::GroupId(id) => {
                matches!(&row.principal, Principal::Group { group_id } if group_id == id)
            }
            GrantSearch::PrincipalKind(kind) => row.principal.kind() == *kind,
            GrantSearch::RoleKey(key) => row.role_keys.iter().any(|k| k == key),
            GrantSearch::State(state) => row.state == *state,
            GrantSearch::ResourceOwner(owner) => row.details.resource_owner == *owner,
        }
    }
}

/// Every read the core serves.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    GetGroup {
        group_id: String,
    },
    ListGroups {
        options: ListOptions,
        search: Vec<GroupSearch>,
    },
    GetProject {
        project_id: String,
    },
    ListProjects {
        options: ListOptions,
        search: Vec<ProjectSearch>,
    },
    GetGrant {
        grant_id: String,
        principal_kind: PrincipalKind,
    },
    ListGrants {
        options: ListOptions,
        search: Vec<GrantSearch>,
    },
    ListMembers {
        scope: MembershipScope,
        options: ListOptions,
    },
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self {
            Query::GetGroup { .. } => "get_group",
            Query::ListGroups { .. } => "list_groups",
            Query::GetProject { .. } => "get_project",
            Query::ListProjects { .. } => "list_projects",
            Query::GetGrant { .. } => "get_grant",
            Query::ListGrants { .. } => "list_grants",
            Query::ListMembers { .. } => "list_members",
        }
    }

    /// Projection serving this query.
    pub fn projection(&self) -> &'static str {
        match self {
            Query::GetGroup { .. } | Query::ListGroups { .. } => GROUPS,
            Query::GetProject { .. } | Query::ListProjects { .. } => PROJECTS,
            Query::GetGrant { .. } | Query::ListGrants { .. } => GRANTS,
            Query::ListMembers { .. } => MEMBERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum QueryResult {
    Group(GroupRow),
    Groups(ListResult<GroupRow>),
    Project(ProjectRow),
    Projects(ListResult<ProjectRow>),
    Grant(GrantRow),
    Grants(ListResult<GrantRow>),
    Members(ListResult<MemberRow>),
}

/// Answers queries from the shared read model.
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    view: ReadModel,
}

impl QueryProcessor {
    pub fn new(view: ReadModel) -> Self {
        Self { view }
    }

    #[tracing::instrument(
        name = "query.execute",
        skip_all,
        fields(query = query.name(), user_id = %ctx.user_id)
    )]
    pub async fn execute(&self, ctx: &PermissionContext, query: Query) -> Result<QueryResult> {
        match query {
            Query::GetGroup { group_id } => self.get_group(ctx, &group_id).await.map(QueryResult::Group),
            Query::ListGroups { options, search } => self
                .list_groups(ctx, options, &search)
                .await
                .map(QueryResult::Groups),
            Query::GetProject { project_id } => self
                .get_project(ctx, &project_id)
                .await
                .map(QueryResult::Project),
            Query::ListProjects { options, search } => self
                .list_projects(ctx, options, &search)
                .await
                .map(QueryResult::Projects),
            Query::GetGrant {
                grant_id,
                principal_kind,
            } => self
                .get_grant(ctx, &grant_id, principal_kind)
                .await
                .map(QueryResult::Grant),
            Query::ListGrants { options, search } => self
                .list_grants(ctx, options, &search)
                .await
                .map(QueryResult::Grants),
            Query::ListMembers { scope, options } => self
                .list_members(ctx, &scope, options)
                .await
                .map(QueryResult::Members),
        }
    }

    async fn get_group(&self, ctx: &PermissionContext, group_id: &str) -> Result<GroupRow> {
        let row = self.view.groups.read().await.get(group_id).cloned();
        visible(ctx, row, AggregateType::Group, group_id, |r| {
            (&r.details, vec![r.group_id.as_str()])
        })
    }

    async fn list_groups(
        &self,
        ctx: &PermissionContext,
        options: ListOptions,
        search: &[GroupSearch],
    ) -> Result<ListResult<GroupRow>> {
        let filter = filter_for(ctx);
        let rows = self
            .view
            .groups
            .read()
            .await
            .values()
            .filter(|r| {
                filter
                    .visibility
                    .allows(&r.details.resource_owner, &[r.group_id.as_str()])
            })
            .filter(|r| search.iter().all(|s| s.matches(r)))
            .cloned()
            .collect();
        Ok(paginate(rows, options, |r| (&r.details, r.group_id.as_str())))
    }

    async fn get_project(&self, ctx: &PermissionContext, project_id: &str) -> Result<ProjectRow> {
        let row = self.view.projects.read().await.get(project_id).cloned();
        visible(ctx, row, AggregateType::Project, project_id, |r| {
            (&r.details, vec![r.project_id.as_str()])
        })
    }

    async fn list_projects(
        &self,
        ctx: &PermissionContext,
        options: ListOptions,
        search: &[ProjectSearch],
    ) -> Result<ListResult<ProjectRow>> {
        let filter = filter_for(ctx);
        let rows = self
            .view
            .projects
            .read()
            .await
            .values()
            .filter(|r| {
                filter
                    .visibility
                    .allows(&r.details.resource_owner, &[r.project_id.as_str()])
            })
            .filter(|r| search.iter().all(|s| s.matches(r)))
            .cloned()
            .collect();
        Ok(paginate(rows, options, |r| (&r.details, r.project_id.as_str())))
    }

    async fn get_grant(
        &self,
        ctx: &PermissionContext,
        grant_id: &str,
        principal_kind: PrincipalKind,
    ) -> Result<GrantRow> {
        let aggregate_type = principal_kind.aggregate_type();
        let row = self
            .view
            .grants
            .read()
            .await
            .get(&(aggregate_type, grant_id.to_string()))
            .cloned()
            .filter(|r| {
                if r.state == GrantState::Removed {
                    warn_removed(r);
                    return false;
                }
                true
            });
        visible(ctx, row, aggregate_type, grant_id, |r| {
            (
                &r.details,
                vec![r.project_id.as_str(), r.project_grant_id.as_str()],
            )
        })
    }

    async fn list_grants(
        &self,
        ctx: &PermissionContext,
        options: ListOptions,
        search: &[GrantSearch],
    ) -> Result<ListResult<GrantRow>> {
        let filter = filter_for(ctx);
        let rows = self
            .view
            .grants
            .read()
            .await
            .values()
            .filter(|r| {
                if r.state == GrantState::Removed {
                    warn_removed(r);
                    return false;
                }
                true
            })
            .filter(|r| {
                filter.visibility.allows(
                    &r.details.resource_owner,
                    &[r.project_id.as_str(), r.project_grant_id.as_str()],
                )
            })
            .filter(|r| search.iter().all(|s| s.matches(r)))
            .cloned()
            .collect();
        Ok(paginate(rows, options, |r| (&r.details, r.grant_id.as_str())))
    }

    /// Orgs owning the scope's resource, or `None` if the resource is not in
    /// the views. Instance and org scopes have no owning row.
    async fn scope_owners(&self, scope: &MembershipScope) -> Option<Vec<String>> {
        match scope {
            MembershipScope::Instance | MembershipScope::Org { .. } => Some(Vec::new()),
            MembershipScope::Project { project_id } => self
                .view
                .projects
                .read()
                .await
                .get(project_id)
                .map(|p| vec![p.details.resource_owner.clone()]),
            MembershipScope::ProjectGrant {
                project_id,
                grant_id,
            } => {
                let owner = self
                    .view
                    .projects
                    .read()
                    .await
                    .get(project_id)
                    .map(|p| p.details.resource_owner.clone())?;
                let granted = self
                    .view
                    .project_grants
                    .read()
                    .await
                    .get(&(project_id.clone(), grant_id.clone()))
                    .map(|g| g.granted_org_id.clone())?;
                Some(vec![owner, granted])
            }
            MembershipScope::Group { group_id } => self
                .view
                .groups
                .read()
                .await
                .get(group_id)
                .map(|g| vec![g.details.resource_owner.clone()]),
        }
    }

    async fn list_members(
        &self,
        ctx: &PermissionContext,
        scope: &MembershipScope,
        options: ListOptions,
    ) -> Result<ListResult<MemberRow>> {
        let Some(owners) = self.scope_owners(scope).await else {
            if ctx.global {
                return Err(Error::NotFound(scope.key()));
            }
            return Err(authz::denied());
        };
        let owners: Vec<&str> = owners.iter().map(String::as_str).collect();
        resolve_scope(ctx, scope, &owners)?;

        let key = scope.key();
        let rows = self
            .view
            .members
            .read()
            .await
            .iter()
            .filter(|((scope_key, _), _)| *scope_key == key)
            .map(|(_, row)| row.clone())
            .collect();
        Ok(paginate(rows, options, |r| (&r.details, r.user_id.as_str())))
    }
}

fn filter_for(ctx: &PermissionContext) -> ViewFilter {
    let mut filter = ViewFilter::default();
    narrow(ctx, &mut filter);
    filter
}

/// Resolve a single-item read. Missing and invisible rows are denied alike
/// unless the caller is global, who gets `NotFound` for missing rows.
fn visible<T, F>(
    ctx: &PermissionContext,
    row: Option<T>,
    aggregate_type: AggregateType,
    id: &str,
    scope_of: F,
) -> Result<T>
where
    F: for<'a> Fn(&'a T) -> (&'a RowDetails, Vec<&'a str>),
{
    let Some(row) = row else {
        if ctx.global {
            return Err(Error::not_found(aggregate_type, id));
        }
        return Err(authz::denied());
    };
    let filter = filter_for(ctx);
    let (details, ids) = scope_of(&row);
    if !filter.visibility.allows(&details.resource_owner, &ids) {
        return Err(authz::denied());
    }
    Ok(row)
}

fn warn_removed(row: &GrantRow) {
    warn!(
        grant_id = %row.grant_id,
        aggregate_type = %row.aggregate_type(),
        "Removed grant present in view, excluding"
    );
}

/// Order by creation date then ID, and cut the requested page.
fn paginate<T, F>(mut rows: Vec<T>, options: ListOptions, sort_key: F) -> ListResult<T>
where
    F: Fn(&T) -> (&RowDetails, &str),
{
    rows.sort_by(|a, b| {
        let (da, ia) = sort_key(a);
        let (db, ib) = sort_key(b);
        let ordering = da
            .creation_date
            .cmp(&db.creation_date)
            .then_with(|| ia.cmp(ib));
        if options.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
    let total = rows.len();
    let items = rows
        .into_iter()
        .skip(options.offset)
        .take(if options.limit == 0 {
            usize::MAX
        } else {
            options.limit
        })
        .collect();
    ListResult { total, items }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
