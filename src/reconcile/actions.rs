use async_trait::async_trait;
use tracing::{debug, info};

use super::{ManagedResource, Upsert, update_existing};
use crate::api::ZabbixApi;
use crate::api::models::{Action, ActionCondition, ActionOperation, ActionSpec, ActionUpdate, Id};
use crate::error::ProvisionResult;

/// A fully managed action. The comparison is order-insensitive on conditions
/// and operations, which the server hands back in its own order.
#[derive(Debug, Clone)]
pub struct ActionResource {
    pub spec: ActionSpec,
}

fn sorted<T: Ord + Clone>(items: &[T]) -> Vec<T> {
    let mut items = items.to_vec();
    items.sort();
    items
}

impl ActionResource {
    fn matches(&self, remote: &Action) -> bool {
        let spec = &self.spec;
        let Some(filter) = remote.filter.as_ref() else {
            return false;
        };
        remote.status == spec.status
            && remote.def_shortdata == spec.def_shortdata
            && remote.def_longdata == spec.def_longdata
            && filter.evaltype == spec.filter.evaltype
            && sorted::<ActionCondition>(&filter.conditions) == sorted(&spec.filter.conditions)
            && sorted::<ActionOperation>(&remote.operations) == sorted(&spec.operations)
    }
}

#[async_trait]
impl ManagedResource for ActionResource {
    type Remote = Action;
    type Update = ActionUpdate;

    const KIND: &'static str = "action";

    fn key(&self) -> &str {
        &self.spec.name
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<Action>> {
        Ok(api.action_get(&self.spec.name).await?.into_iter().next())
    }

    async fn create(&self, api: &dyn ZabbixApi) -> ProvisionResult<()> {
        info!(action = %self.spec.name, "Creating action.");
        api.action_create(&self.spec).await?;
        Ok(())
    }

    fn diff(&self, remote: &Action) -> Option<ActionUpdate> {
        if self.matches(remote) {
            return None;
        }
        Some(ActionUpdate::from_spec(remote.actionid.clone(), &self.spec))
    }

    async fn update(&self, api: &dyn ZabbixApi, update: ActionUpdate) -> ProvisionResult<()> {
        info!(action = %self.spec.name, actionid = %update.actionid, "Updating action.");
        api.action_update(&update).await?;
        Ok(())
    }
}

/// Status of a stock action that is only ever switched on.
#[derive(Debug, Clone)]
pub struct ActionEnabled {
    pub name: String,
}

#[async_trait]
impl ManagedResource for ActionEnabled {
    type Remote = Action;
    type Update = Id;

    const KIND: &'static str = "action";

    fn key(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<Action>> {
        Ok(api.action_get(&self.name).await?.into_iter().next())
    }

    fn diff(&self, remote: &Action) -> Option<Id> {
        (remote.status != 0).then(|| remote.actionid.clone())
    }

    async fn update(&self, api: &dyn ZabbixApi, actionid: Id) -> ProvisionResult<()> {
        info!(action = %self.name, %actionid, "Enabling action.");
        api.action_update_status(&actionid, 0).await?;
        Ok(())
    }
}

/// Enables the named action if it exists. An absent action is not an error.
pub async fn enable_action(api: &dyn ZabbixApi, name: &str) -> ProvisionResult<Upsert> {
    let desired = ActionEnabled {
        name: name.to_string(),
    };
    match update_existing(api, &desired).await? {
        Some(outcome) => Ok(outcome),
        None => {
            debug!(action = name, "Action does not exist, nothing to enable.");
            Ok(Upsert::Unchanged)
        }
    }
}
