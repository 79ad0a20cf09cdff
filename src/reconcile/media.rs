use async_trait::async_trait;
use tracing::info;

use super::ManagedResource;
use crate::api::ZabbixApi;
use crate::api::models::{MediaType, MediaTypeUpdate};
use crate::error::ProvisionResult;

/// SMTP settings of a stock media type. Media types are never created here;
/// an absent one is a missing prerequisite.
#[derive(Debug, Clone)]
pub struct MediaTypeSettings {
    pub name: String,
    pub smtp_server: String,
    pub smtp_email: String,
    pub smtp_helo: String,
}

#[async_trait]
impl ManagedResource for MediaTypeSettings {
    type Remote = MediaType;
    type Update = MediaTypeUpdate;

    const KIND: &'static str = "media type";

    fn key(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<MediaType>> {
        Ok(api.mediatype_get(&self.name).await?.into_iter().next())
    }

    fn diff(&self, remote: &MediaType) -> Option<MediaTypeUpdate> {
        let unchanged = remote.smtp_server == self.smtp_server
            && remote.smtp_email == self.smtp_email
            && remote.smtp_helo == self.smtp_helo;
        (!unchanged).then(|| MediaTypeUpdate {
            mediatypeid: remote.mediatypeid.clone(),
            smtp_server: self.smtp_server.clone(),
            smtp_email: self.smtp_email.clone(),
            smtp_helo: self.smtp_helo.clone(),
        })
    }

    async fn update(&self, api: &dyn ZabbixApi, update: MediaTypeUpdate) -> ProvisionResult<()> {
        info!(
            media_type = %self.name,
            smtp_server = %update.smtp_server,
            smtp_email = %update.smtp_email,
            "Updating media type."
        );
        api.mediatype_update(&update).await?;
        Ok(())
    }
}
