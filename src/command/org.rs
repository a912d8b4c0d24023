use super::{event, id_or_new, require, CommandProcessor};
use crate::aggregate::OrgModel;
use crate::authz::{resolve_org, PermissionContext, PERMISSION_DENIED};
use crate::cascade::{remove_grants, remove_members};
use crate::error::{Error, Result};
use crate::model::{AggregateType, ChangeReceipt, EventPayload, MembershipScope};
use crate::repository::Loaded;
use crate::storage::AppendRequest;

impl CommandProcessor {
    pub(super) async fn add_org(
        &self,
        ctx: &PermissionContext,
        org_id: Option<String>,
        name: String,
    ) -> Result<ChangeReceipt> {
        if !ctx.global {
            return Err(Error::PermissionDenied(PERMISSION_DENIED.to_string()));
        }
        require("name", &name)?;
        let org_id = id_or_new(org_id)?;

        let org: Loaded<OrgModel> = self.load(AggregateType::Org, &org_id).await?;
        if org.sequence > 0 {
            return Err(Error::already_exists(AggregateType::Org, &org_id));
        }

        // An org owns itself.
        let append = AppendRequest::new(AggregateType::Org, org_id.clone(), org_id, 0)
            .with_event(event(ctx, EventPayload::OrgAdded { name }));
        self.commit(vec![append]).await
    }

    /// Remove an org with its memberships and every grant it owns or that
    /// targets one of its projects.
    pub(super) async fn remove_org(
        &self,
        ctx: &PermissionContext,
        org_id: &str,
    ) -> Result<ChangeReceipt> {
        resolve_org(ctx, org_id)?;
        let org = self.active_org(org_id).await?;

        let grants = self.cascade.grants_of_org(org_id).await?;
        let editor = ctx.editor();
        let scope = MembershipScope::Org {
            org_id: org_id.to_string(),
        };

        let mut appends = remove_grants(&grants, &editor);
        appends.push(
            org.append()
                .with_events(remove_members(&scope, &org.model.members, &editor))
                .with_event(event(ctx, EventPayload::OrgRemoved)),
        );
        self.commit(appends).await
    }
}
