//! Generic create-or-update primitive and its specialisations per resource kind.

pub mod actions;
pub mod groups;
pub mod hosts;
pub mod media;
pub mod templates;
pub mod triggers;
pub mod users;

use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{debug, warn};

use crate::api::ZabbixApi;
use crate::error::{ProvisionError, ProvisionResult};

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    Unchanged,
}

impl Upsert {
    pub fn changed(self) -> bool {
        !matches!(self, Upsert::Unchanged)
    }
}

/// A remote resource kind the engine converges towards a desired record.
///
/// `diff` only looks at the fields the engine manages for the kind; fields it
/// does not examine are never overwritten. The `Update` payload carries the
/// resolved remote identifier together with the managed fields.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    type Remote: Send + Sync;
    type Update: Send + Debug;

    const KIND: &'static str;

    /// Externally unique human key (alias, name or description).
    fn key(&self) -> &str;

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<Self::Remote>>;

    /// Kinds provisioned out-of-band keep this default: their absence is a
    /// missing prerequisite.
    async fn create(&self, _api: &dyn ZabbixApi) -> ProvisionResult<()> {
        Err(ProvisionError::missing(Self::KIND, self.key()))
    }

    fn diff(&self, remote: &Self::Remote) -> Option<Self::Update>;

    async fn update(&self, api: &dyn ZabbixApi, update: Self::Update) -> ProvisionResult<()>;
}

pub async fn upsert<R: ManagedResource>(api: &dyn ZabbixApi, desired: &R) -> ProvisionResult<Upsert> {
    match desired.fetch(api).await? {
        None => {
            debug!(kind = R::KIND, key = desired.key(), "Resource is absent, creating.");
            desired.create(api).await?;
            Ok(Upsert::Created)
        }
        Some(remote) => apply_diff(api, desired, &remote).await,
    }
}

/// Same as [`upsert`] for resources that must already exist, where absence is
/// not an error: returns `None` without issuing any call.
pub async fn update_existing<R: ManagedResource>(
    api: &dyn ZabbixApi,
    desired: &R,
) -> ProvisionResult<Option<Upsert>> {
    match desired.fetch(api).await? {
        None => {
            debug!(kind = R::KIND, key = desired.key(), "Resource is absent, nothing to update.");
            Ok(None)
        }
        Some(remote) => apply_diff(api, desired, &remote).await.map(Some),
    }
}

async fn apply_diff<R: ManagedResource>(
    api: &dyn ZabbixApi,
    desired: &R,
    remote: &R::Remote,
) -> ProvisionResult<Upsert> {
    match desired.diff(remote) {
        None => {
            debug!(kind = R::KIND, key = desired.key(), "Resource is up to date.");
            Ok(Upsert::Unchanged)
        }
        Some(update) => {
            debug!(kind = R::KIND, key = desired.key(), ?update, "Updating resource.");
            desired.update(api, update).await?;
            Ok(Upsert::Updated)
        }
    }
}

/// Tri-state outcome reported at the boundary of each reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Changed,
    Unchanged,
    Failed,
}

impl From<Upsert> for StepOutcome {
    fn from(upsert: Upsert) -> Self {
        if upsert.changed() {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }
}

impl From<bool> for StepOutcome {
    fn from(changed: bool) -> Self {
        if changed {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }
}

/// Turns a step result into its outcome. Recoverable errors are logged and
/// become `Failed`; fatal ones are handed back to the caller.
pub fn settle<T: Into<StepOutcome>>(
    step: &str,
    result: ProvisionResult<T>,
) -> ProvisionResult<StepOutcome> {
    match result {
        Ok(value) => Ok(value.into()),
        Err(e) if !e.is_fatal() => {
            warn!(step, error = %e, "Step failed, continuing.");
            Ok(StepOutcome::Failed)
        }
        Err(e) => Err(e),
    }
}
