use super::{event, id_or_new, require, CommandProcessor};
use crate::aggregate::GroupModel;
use crate::authz::{resolve_org, resolve_owned, PermissionContext};
use crate::cascade::{remove_grants, remove_members};
use crate::error::{Error, Result};
use crate::model::{AggregateType, ChangeReceipt, EventPayload, MembershipScope};
use crate::repository::Loaded;
use crate::storage::AppendRequest;

impl CommandProcessor {
    pub(super) async fn add_group(
        &self,
        ctx: &PermissionContext,
        org_id: String,
        group_id: Option<String>,
        name: String,
        description: String,
    ) -> Result<ChangeReceipt> {
        resolve_org(ctx, &org_id)?;
        require("name", &name)?;
        self.active_org(&org_id).await?;
        let group_id = id_or_new(group_id)?;

        let group: Loaded<GroupModel> = self.load(AggregateType::Group, &group_id).await?;
        if group.sequence > 0 {
            return Err(Error::already_exists(AggregateType::Group, &group_id));
        }

        let append = AppendRequest::new(AggregateType::Group, group_id, org_id, 0)
            .with_event(event(ctx, EventPayload::GroupAdded { name, description }));
        self.commit(vec![append]).await
    }

    pub(super) async fn change_group(
        &self,
        ctx: &PermissionContext,
        group_id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<ChangeReceipt> {
        if let Some(name) = &name {
            require("name", name)?;
        }
        let group: Loaded<GroupModel> = self.load(AggregateType::Group, group_id).await?;
        resolve_owned(ctx, &group.resource_owner, group_id)?;
        let group = self.active_group(group).await?;

        if !group
            .model
            .differs(name.as_deref(), description.as_deref())
        {
            return self.unchanged(&group);
        }

        // Only changed fields are recorded.
        let name = name.filter(|n| *n != group.model.name);
        let description = description.filter(|d| *d != group.model.description);
        let append = group
            .append()
            .with_event(event(ctx, EventPayload::GroupChanged { name, description }));
        self.commit(vec![append]).await
    }

    /// Remove a group, its memberships and the grants given to it.
    pub(super) async fn remove_group(
        &self,
        ctx: &PermissionContext,
        group_id: &str,
    ) -> Result<ChangeReceipt> {
        let group: Loaded<GroupModel> = self.load(AggregateType::Group, group_id).await?;
        resolve_owned(ctx, &group.resource_owner, group_id)?;
        let group = self.active_group(group).await?;

        let grants = self.cascade.grants_of_group(group_id).await?;
        let editor = ctx.editor();
        let scope = MembershipScope::Group {
            group_id: group_id.to_string(),
        };

        let mut appends = remove_grants(&grants, &editor);
        appends.push(
            group
                .append()
                .with_events(remove_members(&scope, &group.model.members, &editor))
                .with_event(event(ctx, EventPayload::GroupRemoved)),
        );
        self.commit(appends).await
    }
}
