//! Declared web checks of a host: scenario sync, companion triggers and
//! garbage collection of undeclared scenarios.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ZabbixApi;
use crate::api::models::{
    HostFilter, Id, TriggerSpec, WebScenarioSpec, WebScenarioUpdate, WebStep,
};
use crate::error::{ProvisionError, ProvisionResult};
use crate::reconcile::triggers::TriggerResource;
use crate::reconcile::upsert;

pub const DEFAULT_PRIORITY: i64 = 1;
const SCENARIO_DELAY_SECS: u32 = 60;
const SCENARIO_RETRIES: u32 = 3;

/// Number of create, update or delete calls a pass issued.
pub type ChangeCount = usize;

/// One declared web check. Fields are declared in key order so the
/// side-channel document is written with sorted keys.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WebCheck {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub url: String,
}

impl WebCheck {
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    /// Same check with the default priority filled in.
    pub fn normalized(&self) -> WebCheck {
        WebCheck {
            priority: Some(self.priority()),
            ..self.clone()
        }
    }

    fn steps(&self) -> Vec<WebStep> {
        vec![WebStep {
            no: 1,
            name: "Step #1".to_string(),
            url: self.url.clone(),
            status_codes: "200".to_string(),
            follow_redirects: 1,
            retrieve_mode: 0,
        }]
    }

    fn trigger(&self, host_name: &str) -> TriggerSpec {
        TriggerSpec {
            description: format!("Health status of {}", self.name),
            expression: format!("{{{host_name}:web.test.fail[{}].last(0)}} <> 0", self.name),
            priority: self.priority(),
            url: self.url.clone(),
            trigger_type: 0,
        }
    }
}

/// The active set, as written to the side-channel document.
pub fn active_set(desired: &[WebCheck]) -> Vec<WebCheck> {
    desired.iter().map(WebCheck::normalized).collect()
}

/// Creates or rewrites one scenario per declared check and upserts its
/// trigger. An existing scenario counts as unchanged when its name and first
/// step url match; no other field is compared.
pub async fn sync(api: &dyn ZabbixApi, hostid: &str, desired: &[WebCheck]) -> ProvisionResult<ChangeCount> {
    if desired.is_empty() {
        debug!(hostid, "No web checks declared.");
        return Ok(0);
    }
    let host = api
        .host_get(HostFilter::Id(hostid))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionError::missing("host", hostid))?;
    let host_name = host.display_name();

    let mut changes = 0;
    for check in desired {
        debug!(name = %check.name, url = %check.url, priority = check.priority(), "Processing web check.");
        changes += sync_scenario(api, hostid, check).await?;

        let trigger = TriggerResource {
            spec: check.trigger(host_name),
        };
        match upsert(api, &trigger).await {
            Ok(outcome) if outcome.changed() => changes += 1,
            Ok(_) => {}
            Err(e) if !e.is_fatal() => {
                warn!(trigger = %trigger.spec.description, error = %e, "Can not upsert the trigger.");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(changes)
}

async fn sync_scenario(api: &dyn ZabbixApi, hostid: &str, check: &WebCheck) -> ProvisionResult<ChangeCount> {
    let existing = api
        .httptest_get(hostid, Some(&check.name))
        .await?
        .into_iter()
        .next();

    match existing {
        Some(scenario) if scenario.name == check.name && scenario.first_url() == Some(check.url.as_str()) => {
            debug!(name = %check.name, "No changes were detected. Skipped updating the web scenario.");
            Ok(0)
        }
        Some(scenario) => {
            info!(name = %check.name, httptestid = %scenario.httptestid, "Updating web scenario.");
            api.httptest_update(&WebScenarioUpdate {
                httptestid: scenario.httptestid,
                name: check.name.clone(),
                delay: SCENARIO_DELAY_SECS,
                retries: SCENARIO_RETRIES,
                steps: check.steps(),
            })
            .await?;
            Ok(1)
        }
        None => {
            info!(name = %check.name, "Creating web scenario.");
            api.httptest_create(&WebScenarioSpec {
                hostid: hostid.to_string(),
                name: check.name.clone(),
                delay: SCENARIO_DELAY_SECS,
                retries: SCENARIO_RETRIES,
                steps: check.steps(),
            })
            .await?;
            Ok(1)
        }
    }
}

/// Deletes every scenario of the host whose name is not declared. Nothing
/// else is ever deleted.
pub async fn collect_garbage(
    api: &dyn ZabbixApi,
    hostid: &str,
    desired: &[WebCheck],
) -> ProvisionResult<ChangeCount> {
    let stale: Vec<(Id, String)> = api
        .httptest_get(hostid, None)
        .await?
        .into_iter()
        .filter(|s| !desired.iter().any(|c| c.name == s.name))
        .map(|s| (s.httptestid, s.name))
        .collect();

    for (httptestid, name) in &stale {
        info!(%name, %httptestid, "Removing web check.");
        api.httptest_delete(httptestid).await?;
    }
    Ok(stale.len())
}
