//! Remote management API: the `ZabbixApi` seam, its typed records and the
//! JSON-RPC implementation used in production.

pub mod client;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

use models::{
    Action, ActionSpec, ActionUpdate, Host, HostFilter, HostGroup, HostInterface, Id,
    ImportRules, InterfaceUpdate, MediaType, MediaTypeUpdate, NewUser, NewUserGroup, Template,
    Trigger, TriggerSpec, TriggerUpdate, User, UserGroup, UserMedia, WebScenario,
    WebScenarioSpec, WebScenarioUpdate,
};

pub use client::JsonRpcClient;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("{method} failed ({code}): {message} {data}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
        data: String,
    },
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Empty result from {0}")]
    EmptyResult(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Resource-oriented verbs of the remote API, one typed method per call the
/// reconciler issues. Lookups filter by the human key of the resource and
/// return every match (normally zero or one).
#[async_trait]
pub trait ZabbixApi: Send + Sync {
    async fn login(&self, user: &str, password: &str) -> ApiResult<()>;
    async fn logout(&self) -> ApiResult<()>;

    async fn user_get(&self, alias: &str) -> ApiResult<Vec<User>>;
    async fn user_create(&self, user: &NewUser) -> ApiResult<Id>;
    async fn user_update_password(&self, userid: &str, password: &str) -> ApiResult<()>;
    /// Replaces the complete media list of the user.
    async fn user_update_media(&self, userid: &str, medias: &[UserMedia]) -> ApiResult<()>;

    /// Looks a user group up by name, including its member list.
    async fn usergroup_get(&self, name: &str) -> ApiResult<Vec<UserGroup>>;
    async fn usergroup_create(&self, group: &NewUserGroup) -> ApiResult<Id>;
    /// Replaces the complete member list of the group.
    async fn usergroup_update_users(&self, usrgrpid: &str, userids: &[Id]) -> ApiResult<()>;

    /// Looks a host up, including its linked templates.
    async fn host_get(&self, filter: HostFilter<'_>) -> ApiResult<Vec<Host>>;
    async fn host_update_status(&self, hostid: &str, status: i64) -> ApiResult<()>;
    /// Replaces the complete set of templates linked to the host.
    async fn host_update_templates(&self, hostid: &str, templateids: &[Id]) -> ApiResult<()>;

    async fn hostinterface_get(&self, hostid: &str) -> ApiResult<Vec<HostInterface>>;
    async fn hostinterface_update(&self, update: &InterfaceUpdate) -> ApiResult<()>;

    async fn hostgroup_get(&self, name: &str) -> ApiResult<Vec<HostGroup>>;
    async fn template_get(&self, name: &str) -> ApiResult<Vec<Template>>;

    async fn mediatype_get(&self, description: &str) -> ApiResult<Vec<MediaType>>;
    async fn mediatype_update(&self, update: &MediaTypeUpdate) -> ApiResult<()>;

    async fn action_get(&self, name: &str) -> ApiResult<Vec<Action>>;
    async fn action_create(&self, spec: &ActionSpec) -> ApiResult<Id>;
    async fn action_update(&self, update: &ActionUpdate) -> ApiResult<()>;
    async fn action_update_status(&self, actionid: &str, status: i64) -> ApiResult<()>;

    /// Web scenarios of one host; `name` narrows the lookup to a single scenario.
    async fn httptest_get(&self, hostid: &str, name: Option<&str>) -> ApiResult<Vec<WebScenario>>;
    async fn httptest_create(&self, spec: &WebScenarioSpec) -> ApiResult<Id>;
    async fn httptest_update(&self, update: &WebScenarioUpdate) -> ApiResult<()>;
    async fn httptest_delete(&self, httptestid: &str) -> ApiResult<()>;

    async fn trigger_get(&self, description: &str) -> ApiResult<Vec<Trigger>>;
    async fn trigger_create(&self, spec: &TriggerSpec) -> ApiResult<Id>;
    async fn trigger_update(&self, update: &TriggerUpdate) -> ApiResult<()>;

    async fn configuration_import(
        &self,
        format: &str,
        source: &str,
        rules: &ImportRules,
    ) -> ApiResult<()>;
}
