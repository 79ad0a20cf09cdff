use async_trait::async_trait;
use tracing::info;

use super::ManagedResource;
use crate::api::ZabbixApi;
use crate::api::models::{Trigger, TriggerSpec, TriggerUpdate};
use crate::error::ProvisionResult;

fn normalize(expression: &str) -> String {
    expression.split_whitespace().collect()
}

#[derive(Debug, Clone)]
pub struct TriggerResource {
    pub spec: TriggerSpec,
}

#[async_trait]
impl ManagedResource for TriggerResource {
    type Remote = Trigger;
    type Update = TriggerUpdate;

    const KIND: &'static str = "trigger";

    fn key(&self) -> &str {
        &self.spec.description
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<Trigger>> {
        Ok(api.trigger_get(&self.spec.description).await?.into_iter().next())
    }

    async fn create(&self, api: &dyn ZabbixApi) -> ProvisionResult<()> {
        info!(trigger = %self.spec.description, "Creating trigger.");
        api.trigger_create(&self.spec).await?;
        Ok(())
    }

    fn diff(&self, remote: &Trigger) -> Option<TriggerUpdate> {
        let unchanged = normalize(&remote.expression) == normalize(&self.spec.expression)
            && remote.priority == self.spec.priority
            && remote.url == self.spec.url;
        (!unchanged).then(|| TriggerUpdate {
            triggerid: remote.triggerid.clone(),
            expression: self.spec.expression.clone(),
            priority: self.spec.priority,
            url: self.spec.url.clone(),
        })
    }

    async fn update(&self, api: &dyn ZabbixApi, update: TriggerUpdate) -> ProvisionResult<()> {
        info!(trigger = %self.spec.description, triggerid = %update.triggerid, "Updating trigger.");
        api.trigger_update(&update).await?;
        Ok(())
    }
}
