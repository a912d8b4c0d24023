use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::authz::PERMISSION_DENIED;
use crate::model::{LifecycleState, Principal};
use crate::projection::views::ProjectGrantRow;

fn details(owner: &str, minute: i64) -> RowDetails {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
    RowDetails {
        sequence: 1,
        creation_date: at,
        change_date: at,
        resource_owner: owner.to_string(),
    }
}

fn grant_row(grant_id: &str, owner: &str, project_id: &str, state: GrantState) -> GrantRow {
    GrantRow {
        grant_id: grant_id.to_string(),
        principal: Principal::User {
            user_id: "u1".to_string(),
        },
        project_id: project_id.to_string(),
        project_grant_id: String::new(),
        role_keys: vec!["viewer".to_string()],
        state,
        details: details(owner, 0),
    }
}

/// org1 owns g1, g2 and p1; org2 owns g3 and p2.
async fn seeded() -> QueryProcessor {
    let view = ReadModel::new();
    {
        let mut groups = view.groups.write().await;
        for (i, (id, owner, name)) in [
            ("g1", "org1", "Admins"),
            ("g2", "org1", "Readers"),
            ("g3", "org2", "Admins"),
        ]
        .into_iter()
        .enumerate()
        {
            groups.insert(
                id.to_string(),
                GroupRow {
                    group_id: id.to_string(),
                    name: name.to_string(),
                    description: String::new(),
                    details: details(owner, i as i64),
                },
            );
        }
    }
    {
        let mut projects = view.projects.write().await;
        for (id, owner) in [("p1", "org1"), ("p2", "org2")] {
            projects.insert(
                id.to_string(),
                ProjectRow {
                    project_id: id.to_string(),
                    name: id.to_string(),
                    roles: BTreeMap::from([("viewer".to_string(), "Viewer".to_string())]),
                    state: LifecycleState::Active,
                    details: details(owner, 0),
                },
            );
        }
    }
    view.project_grants.write().await.insert(
        ("p1".to_string(), "pg1".to_string()),
        ProjectGrantRow {
            project_id: "p1".to_string(),
            grant_id: "pg1".to_string(),
            granted_org_id: "org2".to_string(),
            role_keys: vec!["viewer".to_string()],
            state: LifecycleState::Active,
            details: details("org1", 0),
        },
    );
    {
        let mut grants = view.grants.write().await;
        for row in [
            grant_row("ug1", "org1", "p1", GrantState::Active),
            grant_row("ug2", "org2", "p2", GrantState::Inactive),
            grant_row("ug3", "org1", "p1", GrantState::Removed),
        ] {
            grants.insert((row.aggregate_type(), row.grant_id.clone()), row);
        }
    }
    {
        let mut members = view.members.write().await;
        let scope = MembershipScope::ProjectGrant {
            project_id: "p1".to_string(),
            grant_id: "pg1".to_string(),
        };
        for user in ["u2", "u1"] {
            members.insert(
                (scope.key(), user.to_string()),
                MemberRow {
                    scope: scope.clone(),
                    user_id: user.to_string(),
                    roles: vec!["PROJECT_GRANT_OWNER".to_string()],
                    details: details("org1", 0),
                },
            );
        }
    }
    QueryProcessor::new(view)
}

fn org_user(org_id: &str) -> PermissionContext {
    PermissionContext::new(org_id, "user")
}

#[tokio::test]
async fn test_get_group_in_own_org() {
    let queries = seeded().await;

    let result = queries
        .execute(
            &org_user("org1"),
            Query::GetGroup {
                group_id: "g1".to_string(),
            },
        )
        .await
        .unwrap();

    match result {
        QueryResult::Group(row) => assert_eq!(row.name, "Admins"),
        other => panic!("expected group, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_denial_does_not_reveal_existence() {
    let queries = seeded().await;
    let ctx = org_user("org1");

    let foreign = queries
        .execute(
            &ctx,
            Query::GetGroup {
                group_id: "g3".to_string(),
            },
        )
        .await
        .unwrap_err();
    let missing = queries
        .execute(
            &ctx,
            Query::GetGroup {
                group_id: "nope".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(&foreign, Error::PermissionDenied(m) if m == PERMISSION_DENIED));
    assert!(matches!(&missing, Error::PermissionDenied(m) if m == PERMISSION_DENIED));
    assert_eq!(foreign.to_string(), missing.to_string());
}

#[tokio::test]
async fn test_global_missing_is_not_found() {
    let queries = seeded().await;

    let err = queries
        .execute(
            &PermissionContext::global("admin"),
            Query::GetProject {
                project_id: "nope".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_granted_project_is_visible_to_other_org() {
    let queries = seeded().await;
    let ctx = org_user("org2").with_granted(["p1"]);

    let result = queries
        .execute(
            &ctx,
            Query::GetProject {
                project_id: "p1".to_string(),
            },
        )
        .await;

    assert!(matches!(result, Ok(QueryResult::Project(row)) if row.project_id == "p1"));
}

#[tokio::test]
async fn test_list_groups_narrowed_before_pagination() {
    let queries = seeded().await;

    let result = queries
        .execute(
            &org_user("org1"),
            Query::ListGroups {
                options: ListOptions {
                    offset: 1,
                    limit: 10,
                    ascending: true,
                },
                search: vec![],
            },
        )
        .await
        .unwrap();

    let QueryResult::Groups(page) = result else {
        panic!("expected groups");
    };
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].group_id, "g2");
}

#[tokio::test]
async fn test_list_groups_search_and_order() {
    let queries = seeded().await;

    let result = queries
        .execute(
            &PermissionContext::global("admin"),
            Query::ListGroups {
                options: ListOptions {
                    ascending: false,
                    ..Default::default()
                },
                search: vec![GroupSearch::Name("admin".to_string())],
            },
        )
        .await
        .unwrap();

    let QueryResult::Groups(page) = result else {
        panic!("expected groups");
    };
    let ids: Vec<_> = page.items.iter().map(|g| g.group_id.as_str()).collect();
    assert_eq!(ids, vec!["g3", "g1"]);
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_list_projects_by_state() {
    let queries = seeded().await;
    queries
        .view
        .projects
        .write()
        .await
        .get_mut("p2")
        .unwrap()
        .state = LifecycleState::Inactive;

    let result = queries
        .execute(
            &PermissionContext::global("admin"),
            Query::ListProjects {
                options: ListOptions::default(),
                search: vec![ProjectSearch::State(LifecycleState::Inactive)],
            },
        )
        .await
        .unwrap();

    let QueryResult::Projects(page) = result else {
        panic!("expected projects");
    };
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].project_id, "p2");
}

#[tokio::test]
async fn test_removed_grants_are_excluded() {
    let queries = seeded().await;
    let admin = PermissionContext::global("admin");

    let list = queries
        .execute(
            &admin,
            Query::ListGrants {
                options: ListOptions::default(),
                search: vec![GrantSearch::ProjectId("p1".to_string())],
            },
        )
        .await
        .unwrap();
    let get = queries
        .execute(
            &admin,
            Query::GetGrant {
                grant_id: "ug3".to_string(),
                principal_kind: PrincipalKind::User,
            },
        )
        .await;

    let QueryResult::Grants(page) = list else {
        panic!("expected grants");
    };
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].grant_id, "ug1");
    assert!(matches!(get, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_list_grants_scoped_by_granted_project() {
    let queries = seeded().await;
    let ctx = org_user("org3").with_granted(["p2"]);

    let result = queries
        .execute(
            &ctx,
            Query::ListGrants {
                options: ListOptions::default(),
                search: vec![GrantSearch::State(GrantState::Inactive)],
            },
        )
        .await
        .unwrap();

    let QueryResult::Grants(page) = result else {
        panic!("expected grants");
    };
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].grant_id, "ug2");
}

#[tokio::test]
async fn test_list_members_of_project_grant_for_granted_org() {
    let queries = seeded().await;
    let scope = MembershipScope::ProjectGrant {
        project_id: "p1".to_string(),
        grant_id: "pg1".to_string(),
    };

    let result = queries
        .execute(
            &org_user("org2"),
            Query::ListMembers {
                scope: scope.clone(),
                options: ListOptions::default(),
            },
        )
        .await
        .unwrap();
    let denied = queries
        .execute(
            &org_user("org3"),
            Query::ListMembers {
                scope,
                options: ListOptions::default(),
            },
        )
        .await;

    let QueryResult::Members(page) = result else {
        panic!("expected members");
    };
    let users: Vec<_> = page.items.iter().map(|m| m.user_id.as_str()).collect();
    assert_eq!(users, vec!["u1", "u2"]);
    assert!(matches!(denied, Err(Error::PermissionDenied(_))));
}

#[tokio::test]
async fn test_list_members_of_unknown_scope() {
    let queries = seeded().await;
    let scope = MembershipScope::Group {
        group_id: "nope".to_string(),
    };

    let as_user = queries
        .execute(
            &org_user("org1"),
            Query::ListMembers {
                scope: scope.clone(),
                options: ListOptions::default(),
            },
        )
        .await;
    let as_admin = queries
        .execute(
            &PermissionContext::global("admin"),
            Query::ListMembers {
                scope,
                options: ListOptions::default(),
            },
        )
        .await;

    assert!(matches!(as_user, Err(Error::PermissionDenied(_))));
    assert!(matches!(as_admin, Err(Error::NotFound(_))));
}

#[test]
fn test_queries_map_to_projections() {
    let get = Query::GetGrant {
        grant_id: "x".to_string(),
        principal_kind: PrincipalKind::Group,
    };
    let members = Query::ListMembers {
        scope: MembershipScope::Instance,
        options: ListOptions::default(),
    };
    assert_eq!(get.projection(), GRANTS);
    assert_eq!(members.projection(), MEMBERS);
}
