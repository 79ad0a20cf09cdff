use async_trait::async_trait;
use tracing::debug;

use super::ManagedResource;
use crate::api::ZabbixApi;
use crate::api::models::{Id, NewUserGroup, UserGroup};
use crate::error::{ProvisionError, ProvisionResult};

/// A user group, created when absent and never modified afterwards.
#[derive(Debug, Clone)]
pub struct UserGroupResource {
    pub name: String,
}

impl UserGroupResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ManagedResource for UserGroupResource {
    type Remote = UserGroup;
    type Update = ();

    const KIND: &'static str = "user group";

    fn key(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<UserGroup>> {
        Ok(api.usergroup_get(&self.name).await?.into_iter().next())
    }

    async fn create(&self, api: &dyn ZabbixApi) -> ProvisionResult<()> {
        debug!(group = %self.name, "Creating user group.");
        api.usergroup_create(&NewUserGroup {
            name: self.name.clone(),
            gui_access: 0,
            users_status: 0,
        })
        .await?;
        Ok(())
    }

    fn diff(&self, _remote: &UserGroup) -> Option<()> {
        None
    }

    async fn update(&self, _api: &dyn ZabbixApi, _update: ()) -> ProvisionResult<()> {
        Ok(())
    }
}

pub async fn user_group_id(api: &dyn ZabbixApi, name: &str) -> ProvisionResult<Id> {
    api.usergroup_get(name)
        .await?
        .into_iter()
        .next()
        .map(|g| g.usrgrpid)
        .ok_or_else(|| ProvisionError::missing("user group", name))
}

/// Membership of one user in one group. The remote model has no partial-add
/// verb, so a missing member is appended and the whole member list rewritten.
#[derive(Debug, Clone)]
pub struct GroupMembership {
    pub alias: String,
    pub group: String,
}

#[derive(Debug, Clone)]
pub struct MembershipState {
    pub usrgrpid: Id,
    pub member_ids: Vec<Id>,
    pub userid: Id,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub usrgrpid: Id,
    pub userids: Vec<Id>,
}

#[async_trait]
impl ManagedResource for GroupMembership {
    type Remote = MembershipState;
    type Update = MembershipUpdate;

    const KIND: &'static str = "user group";

    fn key(&self) -> &str {
        &self.group
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<MembershipState>> {
        let userid = api
            .user_get(&self.alias)
            .await?
            .into_iter()
            .next()
            .map(|u| u.userid)
            .ok_or_else(|| ProvisionError::missing("user", self.alias.clone()))?;

        debug!(user = %self.alias, group = %self.group, "Check user is already in group.");
        Ok(api
            .usergroup_get(&self.group)
            .await?
            .into_iter()
            .next()
            .map(|group| MembershipState {
                usrgrpid: group.usrgrpid,
                member_ids: group.users.into_iter().map(|u| u.userid).collect(),
                userid,
            }))
    }

    fn diff(&self, remote: &MembershipState) -> Option<MembershipUpdate> {
        if remote.member_ids.contains(&remote.userid) {
            return None;
        }
        let mut userids = remote.member_ids.clone();
        userids.push(remote.userid.clone());
        Some(MembershipUpdate {
            usrgrpid: remote.usrgrpid.clone(),
            userids,
        })
    }

    async fn update(&self, api: &dyn ZabbixApi, update: MembershipUpdate) -> ProvisionResult<()> {
        debug!(user = %self.alias, group = %self.group, "Adding user into group.");
        api.usergroup_update_users(&update.usrgrpid, &update.userids)
            .await?;
        Ok(())
    }
}
