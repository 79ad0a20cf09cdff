//! JSON-RPC 2.0 client for the server's `api_jsonrpc.php` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::models::{
    Action, ActionSpec, ActionUpdate, Host, HostFilter, HostGroup, HostInterface, Id,
    ImportRules, InterfaceUpdate, MediaType, MediaTypeUpdate, NewUser, NewUserGroup, Template,
    Trigger, TriggerSpec, TriggerUpdate, User, UserGroup, UserMedia, WebScenario,
    WebScenarioSpec, WebScenarioUpdate,
};
use super::{ApiError, ApiResult, ZabbixApi};
use crate::version::VERSION;

const API_PATH: &str = "api_jsonrpc.php";

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<String>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// HTTP client holding the session token returned by `user.login`. The token
/// is attached to every call made after a successful login.
pub struct JsonRpcClient {
    endpoint: String,
    http_client: Client,
    auth: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(server_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("zbx-provisioner/{VERSION}"))
            .build()?;
        Ok(Self::with_http_client(server_url, http_client))
    }

    pub fn with_http_client(server_url: &str, http_client: Client) -> Self {
        Self {
            endpoint: endpoint_for(server_url),
            http_client,
            auth: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn token(&self) -> Option<String> {
        self.auth.read().map(|guard| guard.clone()).unwrap_or(None)
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.auth.write() {
            *guard = token;
        }
    }

    async fn call_raw<P: Serialize + Send + Sync>(
        &self,
        method: &str,
        params: P,
        authenticated: bool,
    ) -> ApiResult<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            auth: if authenticated { self.token() } else { None },
        };
        debug!(method, id = request.id, "Calling remote API.");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: RpcResponse = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(err) = body.error {
            return Err(ApiError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
                data: match err.data {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                },
            });
        }
        body.result
            .ok_or_else(|| ApiError::EmptyResult(method.to_string()))
    }

    async fn call<P, R>(&self, method: &str, params: P) -> ApiResult<R>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let value = self.call_raw(method, params, true).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Calls a `*.create` verb and returns the first id listed under `ids_key`.
    async fn create<P: Serialize + Send + Sync>(
        &self,
        method: &str,
        params: P,
        ids_key: &str,
    ) -> ApiResult<Id> {
        let value = self.call_raw(method, params, true).await?;
        first_id(&value, ids_key).ok_or_else(|| ApiError::EmptyResult(method.to_string()))
    }

    async fn call_unit<P: Serialize + Send + Sync>(&self, method: &str, params: P) -> ApiResult<()> {
        self.call_raw(method, params, true).await.map(|_| ())
    }
}

fn endpoint_for(server_url: &str) -> String {
    let trimmed = server_url.trim_end_matches('/');
    if trimmed.ends_with(API_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}/{API_PATH}")
    }
}

fn first_id(value: &Value, ids_key: &str) -> Option<Id> {
    match value.get(ids_key)?.as_array()?.first()? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ZabbixApi for JsonRpcClient {
    async fn login(&self, user: &str, password: &str) -> ApiResult<()> {
        self.set_token(None);
        let value = self
            .call_raw("user.login", json!({ "user": user, "password": password }), false)
            .await?;
        let token = value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::EmptyResult("user.login".to_string()))?;
        self.set_token(Some(token));
        Ok(())
    }

    async fn logout(&self) -> ApiResult<()> {
        if self.token().is_none() {
            return Ok(());
        }
        let result = self.call_unit("user.logout", json!([])).await;
        self.set_token(None);
        result
    }

    async fn user_get(&self, alias: &str) -> ApiResult<Vec<User>> {
        self.call("user.get", json!({ "output": "extend", "filter": { "alias": alias } }))
            .await
    }

    async fn user_create(&self, user: &NewUser) -> ApiResult<Id> {
        self.create("user.create", user, "userids").await
    }

    async fn user_update_password(&self, userid: &str, password: &str) -> ApiResult<()> {
        self.call_unit("user.update", json!({ "userid": userid, "passwd": password }))
            .await
    }

    async fn user_update_media(&self, userid: &str, medias: &[UserMedia]) -> ApiResult<()> {
        self.call_unit(
            "user.updatemedia",
            json!({ "users": [{ "userid": userid }], "medias": medias }),
        )
        .await
    }

    async fn usergroup_get(&self, name: &str) -> ApiResult<Vec<UserGroup>> {
        self.call(
            "usergroup.get",
            json!({ "output": "extend", "filter": { "name": name }, "selectUsers": ["userid"] }),
        )
        .await
    }

    async fn usergroup_create(&self, group: &NewUserGroup) -> ApiResult<Id> {
        self.create("usergroup.create", group, "usrgrpids").await
    }

    async fn usergroup_update_users(&self, usrgrpid: &str, userids: &[Id]) -> ApiResult<()> {
        self.call_unit(
            "usergroup.update",
            json!({ "usrgrpid": usrgrpid, "userids": userids }),
        )
        .await
    }

    async fn host_get(&self, filter: HostFilter<'_>) -> ApiResult<Vec<Host>> {
        let filter = match filter {
            HostFilter::Name(name) => json!({ "host": name }),
            HostFilter::Id(id) => json!({ "hostid": id }),
        };
        self.call(
            "host.get",
            json!({ "output": "extend", "filter": filter, "selectParentTemplates": ["templateid", "name"] }),
        )
        .await
    }

    async fn host_update_status(&self, hostid: &str, status: i64) -> ApiResult<()> {
        self.call_unit("host.update", json!({ "hostid": hostid, "status": status }))
            .await
    }

    async fn host_update_templates(&self, hostid: &str, templateids: &[Id]) -> ApiResult<()> {
        let templates: Vec<Value> = templateids
            .iter()
            .map(|id| json!({ "templateid": id }))
            .collect();
        self.call_unit(
            "host.update",
            json!({ "hostid": hostid, "templates": templates }),
        )
        .await
    }

    async fn hostinterface_get(&self, hostid: &str) -> ApiResult<Vec<HostInterface>> {
        self.call(
            "hostinterface.get",
            json!({ "output": "extend", "hostids": [hostid] }),
        )
        .await
    }

    async fn hostinterface_update(&self, update: &InterfaceUpdate) -> ApiResult<()> {
        self.call_unit("hostinterface.update", update).await
    }

    async fn hostgroup_get(&self, name: &str) -> ApiResult<Vec<HostGroup>> {
        self.call(
            "hostgroup.get",
            json!({ "output": "extend", "filter": { "name": name } }),
        )
        .await
    }

    async fn template_get(&self, name: &str) -> ApiResult<Vec<Template>> {
        self.call(
            "template.get",
            json!({ "output": "extend", "filter": { "host": name } }),
        )
        .await
    }

    async fn mediatype_get(&self, description: &str) -> ApiResult<Vec<MediaType>> {
        self.call(
            "mediatype.get",
            json!({ "output": "extend", "filter": { "description": description } }),
        )
        .await
    }

    async fn mediatype_update(&self, update: &MediaTypeUpdate) -> ApiResult<()> {
        self.call_unit("mediatype.update", update).await
    }

    async fn action_get(&self, name: &str) -> ApiResult<Vec<Action>> {
        self.call(
            "action.get",
            json!({
                "output": "extend",
                "filter": { "name": name },
                "selectFilter": "extend",
                "selectOperations": "extend"
            }),
        )
        .await
    }

    async fn action_create(&self, spec: &ActionSpec) -> ApiResult<Id> {
        self.create("action.create", spec, "actionids").await
    }

    async fn action_update(&self, update: &ActionUpdate) -> ApiResult<()> {
        self.call_unit("action.update", update).await
    }

    async fn action_update_status(&self, actionid: &str, status: i64) -> ApiResult<()> {
        self.call_unit("action.update", json!({ "actionid": actionid, "status": status }))
            .await
    }

    async fn httptest_get(&self, hostid: &str, name: Option<&str>) -> ApiResult<Vec<WebScenario>> {
        let mut params = json!({ "output": "extend", "hostids": hostid, "selectSteps": "extend" });
        if let Some(name) = name {
            params["filter"] = json!({ "name": name });
        }
        self.call("httptest.get", params).await
    }

    async fn httptest_create(&self, spec: &WebScenarioSpec) -> ApiResult<Id> {
        self.create("httptest.create", spec, "httptestids").await
    }

    async fn httptest_update(&self, update: &WebScenarioUpdate) -> ApiResult<()> {
        self.call_unit("httptest.update", update).await
    }

    async fn httptest_delete(&self, httptestid: &str) -> ApiResult<()> {
        self.call_unit("httptest.delete", json!([httptestid])).await
    }

    async fn trigger_get(&self, description: &str) -> ApiResult<Vec<Trigger>> {
        self.call(
            "trigger.get",
            json!({
                "output": "extend",
                "filter": { "description": description },
                "expandExpression": true
            }),
        )
        .await
    }

    async fn trigger_create(&self, spec: &TriggerSpec) -> ApiResult<Id> {
        self.create("trigger.create", spec, "triggerids").await
    }

    async fn trigger_update(&self, update: &TriggerUpdate) -> ApiResult<()> {
        self.call_unit("trigger.update", update).await
    }

    async fn configuration_import(
        &self,
        format: &str,
        source: &str,
        rules: &ImportRules,
    ) -> ApiResult<()> {
        self.call_unit(
            "configuration.import",
            json!({ "format": format, "source": source, "rules": rules }),
        )
        .await
    }
}
