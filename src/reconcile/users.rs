use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{ManagedResource, Upsert};
use crate::api::ZabbixApi;
use crate::api::models::{Id, NewUser, User, UserGroupRef, UserMedia};
use crate::error::{ProvisionError, ProvisionResult};

/// Media type id of the stock e-mail channel.
pub const EMAIL_MEDIA_TYPE_ID: &str = "1";
/// Warning, Average, High and Disaster.
pub const DEFAULT_SEVERITY: i64 = 0b111100;
pub const DEFAULT_NOTIFY_PERIOD: &str = "1-7,00:00-24:00";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
});

pub fn validate_email(address: &str) -> ProvisionResult<()> {
    if EMAIL_RE.is_match(address) {
        Ok(())
    } else {
        Err(ProvisionError::Validation(format!(
            "Email address {address} is incorrect."
        )))
    }
}

/// Splits a comma separated address list and validates every entry.
pub fn parse_addresses(emails: &str) -> ProvisionResult<Vec<String>> {
    emails
        .split(',')
        .map(str::trim)
        .map(|address| validate_email(address).map(|_| address.to_string()))
        .collect()
}

/// A user account, created once. Existing accounts are left untouched;
/// group membership is handled additively by `GroupMembership`.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub alias: String,
    pub password: String,
    pub groups: Vec<Id>,
    pub user_type: i64,
}

#[async_trait]
impl ManagedResource for UserAccount {
    type Remote = User;
    type Update = ();

    const KIND: &'static str = "user";

    fn key(&self) -> &str {
        &self.alias
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<User>> {
        Ok(api.user_get(&self.alias).await?.into_iter().next())
    }

    async fn create(&self, api: &dyn ZabbixApi) -> ProvisionResult<()> {
        debug!(user = %self.alias, "Such user does not exist. Adding.");
        api.user_create(&NewUser {
            alias: self.alias.clone(),
            passwd: self.password.clone(),
            usrgrps: self
                .groups
                .iter()
                .map(|id| UserGroupRef {
                    usrgrpid: id.clone(),
                })
                .collect(),
            user_type: self.user_type,
        })
        .await?;
        Ok(())
    }

    fn diff(&self, _remote: &User) -> Option<()> {
        None
    }

    async fn update(&self, _api: &dyn ZabbixApi, _update: ()) -> ProvisionResult<()> {
        Ok(())
    }
}

/// Rewrites the e-mail media of `alias` from a comma separated address list.
///
/// The list is not diffed: existing media is cleared and the desired list
/// written in full. A blank list leaves existing media untouched. Every
/// address is validated before the first remote call.
pub async fn replace_user_media(
    api: &dyn ZabbixApi,
    alias: &str,
    emails: &str,
) -> ProvisionResult<Upsert> {
    if emails.trim().is_empty() {
        debug!(user = alias, "No email configured, media left as is.");
        return Ok(Upsert::Unchanged);
    }
    let addresses = parse_addresses(emails)?;

    let userid = api
        .user_get(alias)
        .await?
        .into_iter()
        .next()
        .map(|u| u.userid)
        .ok_or_else(|| ProvisionError::missing("user", alias))?;

    let medias: Vec<UserMedia> = addresses
        .into_iter()
        .map(|sendto| {
            debug!(user = alias, address = %sendto, "Adding email address.");
            UserMedia {
                mediatypeid: EMAIL_MEDIA_TYPE_ID.to_string(),
                sendto,
                active: 0,
                severity: DEFAULT_SEVERITY,
                period: DEFAULT_NOTIFY_PERIOD.to_string(),
            }
        })
        .collect();

    debug!(user = alias, %userid, "Cleanup current media for user.");
    api.user_update_media(&userid, &[]).await?;
    api.user_update_media(&userid, &medias).await?;
    Ok(Upsert::Updated)
}
