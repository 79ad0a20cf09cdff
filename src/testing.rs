//! In-memory stand-in for the remote API used by unit tests. Every mutating
//! verb is recorded in a call journal so tests can assert on exactly which
//! writes a pass issued.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::api::models::{
    Action, ActionFilter, ActionSpec, ActionUpdate, Host, HostFilter, HostGroup, HostInterface,
    Id, ImportRules, InterfaceUpdate, MediaType, MediaTypeUpdate, NewUser, NewUserGroup,
    Template, TemplateRef, Trigger, TriggerSpec, TriggerUpdate, User, UserGroup, UserMedia,
    UserRef, WebScenario, WebScenarioSpec, WebScenarioUpdate,
};
use crate::api::{ApiError, ApiResult, ZabbixApi};
use crate::config_store::{ConfigRow, ConfigStore};
use crate::error::ProvisionResult;

pub const SERVER_HOST_ID: &str = "10084";
pub const ADMIN_ID: &str = "1";
pub const GUEST_ID: &str = "2";

#[derive(Debug, Clone)]
pub struct FakeUser {
    pub user: User,
    pub password: String,
    pub user_type: i64,
    pub media: Vec<UserMedia>,
}

#[derive(Default)]
pub struct FakeState {
    pub users: Vec<FakeUser>,
    pub groups: Vec<UserGroup>,
    pub hosts: Vec<Host>,
    pub interfaces: BTreeMap<Id, Vec<HostInterface>>,
    pub host_groups: Vec<HostGroup>,
    pub templates: Vec<Template>,
    pub media_types: Vec<MediaType>,
    pub actions: Vec<Action>,
    pub web_scenarios: Vec<(Id, WebScenario)>,
    pub triggers: Vec<Trigger>,
    pub imports: Vec<String>,
    /// Mutating verbs in call order.
    pub calls: Vec<String>,
    /// Every `(user, password)` pair submitted to `user.login`.
    pub login_attempts: Vec<(String, String)>,
    /// Verbs that fail with an RPC error.
    pub failing: HashSet<&'static str>,
    /// Logins fail as if the HTTP front-end were down.
    pub frontend_down: bool,
    pub logged_in: Option<String>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        (20000 + self.next_id).to_string()
    }

    fn record(&mut self, verb: &'static str) -> ApiResult<()> {
        if self.failing.contains(verb) {
            return Err(rpc_error(verb, "Injected failure."));
        }
        self.calls.push(verb.to_string());
        Ok(())
    }

    fn check(&self, verb: &'static str) -> ApiResult<()> {
        if self.failing.contains(verb) {
            return Err(rpc_error(verb, "Injected failure."));
        }
        Ok(())
    }
}

fn rpc_error(method: &str, message: &str) -> ApiError {
    ApiError::Rpc {
        method: method.to_string(),
        code: -32602,
        message: "Invalid params.".to_string(),
        data: message.to_string(),
    }
}

pub struct FakeZabbix {
    state: Mutex<FakeState>,
}

impl FakeZabbix {
    /// A freshly installed server: factory admin credential, a disabled
    /// server host with a loopback interface, and the stock groups, templates,
    /// media type and report action.
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.users.push(FakeUser {
            user: User {
                userid: ADMIN_ID.into(),
                alias: "admin".into(),
            },
            password: "zabbix".into(),
            user_type: 3,
            media: vec![],
        });
        state.users.push(FakeUser {
            user: User {
                userid: GUEST_ID.into(),
                alias: "guest".into(),
            },
            password: String::new(),
            user_type: 1,
            media: vec![],
        });
        state.groups = vec![
            UserGroup {
                usrgrpid: "7".into(),
                name: "Zabbix administrators".into(),
                users: vec![UserRef {
                    userid: ADMIN_ID.into(),
                }],
            },
            UserGroup {
                usrgrpid: "9".into(),
                name: "Disabled".into(),
                users: vec![],
            },
        ];
        state.hosts.push(Host {
            hostid: SERVER_HOST_ID.into(),
            host: "Zabbix server".into(),
            name: "Zabbix server".into(),
            status: 1,
            parent_templates: vec![TemplateRef {
                templateid: "10001".into(),
            }],
        });
        state.interfaces.insert(
            SERVER_HOST_ID.into(),
            vec![HostInterface {
                interfaceid: "1".into(),
                ip: "127.0.0.1".into(),
                dns: String::new(),
                port: "10050".into(),
                useip: 1,
            }],
        );
        state.host_groups.push(HostGroup {
            groupid: "2".into(),
            name: "Linux servers".into(),
        });
        state.templates = vec![
            Template {
                templateid: "10001".into(),
                host: "Template OS Linux".into(),
                name: "Template OS Linux".into(),
            },
            Template {
                templateid: "10047".into(),
                host: "Template App Zabbix Server".into(),
                name: "Template App Zabbix Server".into(),
            },
        ];
        state.media_types.push(MediaType {
            mediatypeid: "1".into(),
            description: "Email".into(),
            smtp_server: "localhost".into(),
            smtp_email: "zabbix@localhost".into(),
            smtp_helo: "localhost".into(),
        });
        state.actions.push(Action {
            actionid: "3".into(),
            name: "Report problems to Zabbix administrators".into(),
            status: 1,
            eventsource: Some(0),
            def_shortdata: String::new(),
            def_longdata: String::new(),
            filter: None,
            operations: vec![],
        });
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn set_password(&self, alias: &str, password: &str) {
        let mut state = self.state();
        if let Some(user) = state.users.iter_mut().find(|u| u.user.alias == alias) {
            user.password = password.to_string();
        }
    }

    pub fn fail(&self, verb: &'static str) {
        self.state().failing.insert(verb);
    }

    pub fn add_web_scenario(&self, hostid: &str, name: &str, url: &str) -> Id {
        let mut state = self.state();
        let id = state.next_id();
        state.web_scenarios.push((
            hostid.to_string(),
            WebScenario {
                httptestid: id.clone(),
                name: name.to_string(),
                steps: vec![crate::api::models::WebStep {
                    no: 1,
                    name: "Step #1".into(),
                    url: url.to_string(),
                    status_codes: "200".into(),
                    follow_redirects: 1,
                    retrieve_mode: 0,
                }],
            },
        ));
        id
    }

    pub fn web_scenario_names(&self, hostid: &str) -> Vec<String> {
        self.state()
            .web_scenarios
            .iter()
            .filter(|(h, _)| h == hostid)
            .map(|(_, s)| s.name.clone())
            .collect()
    }
}

#[async_trait]
impl ZabbixApi for FakeZabbix {
    async fn login(&self, user: &str, password: &str) -> ApiResult<()> {
        let mut state = self.state();
        state
            .login_attempts
            .push((user.to_string(), password.to_string()));
        if state.frontend_down {
            return Err(ApiError::Http {
                status: 502,
                body: "Bad Gateway".into(),
            });
        }
        let valid = state
            .users
            .iter()
            .any(|u| u.user.alias == user && u.password == password);
        if valid {
            state.logged_in = Some(user.to_string());
            Ok(())
        } else {
            Err(rpc_error("user.login", "Login name or password is incorrect."))
        }
    }

    async fn logout(&self) -> ApiResult<()> {
        self.state().logged_in = None;
        Ok(())
    }

    async fn user_get(&self, alias: &str) -> ApiResult<Vec<User>> {
        let state = self.state();
        state.check("user.get")?;
        Ok(state
            .users
            .iter()
            .filter(|u| u.user.alias == alias)
            .map(|u| u.user.clone())
            .collect())
    }

    async fn user_create(&self, user: &NewUser) -> ApiResult<Id> {
        let mut state = self.state();
        state.record("user.create")?;
        let id = state.next_id();
        state.users.push(FakeUser {
            user: User {
                userid: id.clone(),
                alias: user.alias.clone(),
            },
            password: user.passwd.clone(),
            user_type: user.user_type,
            media: vec![],
        });
        for group_ref in &user.usrgrps {
            if let Some(group) = state.groups.iter_mut().find(|g| g.usrgrpid == group_ref.usrgrpid) {
                group.users.push(UserRef { userid: id.clone() });
            }
        }
        Ok(id)
    }

    async fn user_update_password(&self, userid: &str, password: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.record("user.update")?;
        if let Some(user) = state.users.iter_mut().find(|u| u.user.userid == userid) {
            user.password = password.to_string();
        }
        Ok(())
    }

    async fn user_update_media(&self, userid: &str, medias: &[UserMedia]) -> ApiResult<()> {
        let mut state = self.state();
        state.record("user.updatemedia")?;
        if let Some(user) = state.users.iter_mut().find(|u| u.user.userid == userid) {
            user.media = medias.to_vec();
        }
        Ok(())
    }

    async fn usergroup_get(&self, name: &str) -> ApiResult<Vec<UserGroup>> {
        let state = self.state();
        state.check("usergroup.get")?;
        Ok(state
            .groups
            .iter()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }

    async fn usergroup_create(&self, group: &NewUserGroup) -> ApiResult<Id> {
        let mut state = self.state();
        state.record("usergroup.create")?;
        let id = state.next_id();
        state.groups.push(UserGroup {
            usrgrpid: id.clone(),
            name: group.name.clone(),
            users: vec![],
        });
        Ok(id)
    }

    async fn usergroup_update_users(&self, usrgrpid: &str, userids: &[Id]) -> ApiResult<()> {
        let mut state = self.state();
        state.record("usergroup.update")?;
        if let Some(group) = state.groups.iter_mut().find(|g| g.usrgrpid == usrgrpid) {
            group.users = userids
                .iter()
                .map(|id| UserRef { userid: id.clone() })
                .collect();
        }
        Ok(())
    }

    async fn host_get(&self, filter: HostFilter<'_>) -> ApiResult<Vec<Host>> {
        let state = self.state();
        state.check("host.get")?;
        Ok(state
            .hosts
            .iter()
            .filter(|h| match filter {
                HostFilter::Name(name) => h.host == name,
                HostFilter::Id(id) => h.hostid == id,
            })
            .cloned()
            .collect())
    }

    async fn host_update_status(&self, hostid: &str, status: i64) -> ApiResult<()> {
        let mut state = self.state();
        state.record("host.update")?;
        if let Some(host) = state.hosts.iter_mut().find(|h| h.hostid == hostid) {
            host.status = status;
        }
        Ok(())
    }

    async fn host_update_templates(&self, hostid: &str, templateids: &[Id]) -> ApiResult<()> {
        let mut state = self.state();
        state.record("host.update")?;
        if let Some(host) = state.hosts.iter_mut().find(|h| h.hostid == hostid) {
            host.parent_templates = templateids
                .iter()
                .map(|id| TemplateRef {
                    templateid: id.clone(),
                })
                .collect();
        }
        Ok(())
    }

    async fn hostinterface_get(&self, hostid: &str) -> ApiResult<Vec<HostInterface>> {
        let state = self.state();
        state.check("hostinterface.get")?;
        Ok(state.interfaces.get(hostid).cloned().unwrap_or_default())
    }

    async fn hostinterface_update(&self, update: &InterfaceUpdate) -> ApiResult<()> {
        let mut state = self.state();
        state.record("hostinterface.update")?;
        for interface in state.interfaces.values_mut().flatten() {
            if interface.interfaceid == update.interfaceid {
                interface.ip = update.ip.clone();
                interface.dns = update.dns.clone();
                interface.port = update.port.to_string();
                interface.useip = update.useip;
            }
        }
        Ok(())
    }

    async fn hostgroup_get(&self, name: &str) -> ApiResult<Vec<HostGroup>> {
        let state = self.state();
        state.check("hostgroup.get")?;
        Ok(state
            .host_groups
            .iter()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }

    async fn template_get(&self, name: &str) -> ApiResult<Vec<Template>> {
        let state = self.state();
        state.check("template.get")?;
        Ok(state
            .templates
            .iter()
            .filter(|t| t.host == name)
            .cloned()
            .collect())
    }

    async fn mediatype_get(&self, description: &str) -> ApiResult<Vec<MediaType>> {
        let state = self.state();
        state.check("mediatype.get")?;
        Ok(state
            .media_types
            .iter()
            .filter(|m| m.description == description)
            .cloned()
            .collect())
    }

    async fn mediatype_update(&self, update: &MediaTypeUpdate) -> ApiResult<()> {
        let mut state = self.state();
        state.record("mediatype.update")?;
        if let Some(media) = state
            .media_types
            .iter_mut()
            .find(|m| m.mediatypeid == update.mediatypeid)
        {
            media.smtp_server = update.smtp_server.clone();
            media.smtp_email = update.smtp_email.clone();
            media.smtp_helo = update.smtp_helo.clone();
        }
        Ok(())
    }

    async fn action_get(&self, name: &str) -> ApiResult<Vec<Action>> {
        let state = self.state();
        state.check("action.get")?;
        Ok(state
            .actions
            .iter()
            .filter(|a| a.name == name)
            .cloned()
            .collect())
    }

    async fn action_create(&self, spec: &ActionSpec) -> ApiResult<Id> {
        let mut state = self.state();
        state.record("action.create")?;
        let id = state.next_id();
        state.actions.push(Action {
            actionid: id.clone(),
            name: spec.name.clone(),
            status: spec.status,
            eventsource: Some(spec.eventsource),
            def_shortdata: spec.def_shortdata.clone(),
            def_longdata: spec.def_longdata.clone(),
            filter: Some(spec.filter.clone()),
            operations: spec.operations.clone(),
        });
        Ok(id)
    }

    async fn action_update(&self, update: &ActionUpdate) -> ApiResult<()> {
        let mut state = self.state();
        state.record("action.update")?;
        if let Some(action) = state
            .actions
            .iter_mut()
            .find(|a| a.actionid == update.actionid)
        {
            action.name = update.name.clone();
            action.status = update.status;
            action.def_shortdata = update.def_shortdata.clone();
            action.def_longdata = update.def_longdata.clone();
            action.filter = Some(ActionFilter {
                evaltype: update.filter.evaltype,
                conditions: update.filter.conditions.clone(),
            });
            action.operations = update.operations.clone();
        }
        Ok(())
    }

    async fn action_update_status(&self, actionid: &str, status: i64) -> ApiResult<()> {
        let mut state = self.state();
        state.record("action.update")?;
        if let Some(action) = state.actions.iter_mut().find(|a| a.actionid == actionid) {
            action.status = status;
        }
        Ok(())
    }

    async fn httptest_get(&self, hostid: &str, name: Option<&str>) -> ApiResult<Vec<WebScenario>> {
        let state = self.state();
        state.check("httptest.get")?;
        Ok(state
            .web_scenarios
            .iter()
            .filter(|(h, s)| h == hostid && name.is_none_or(|n| s.name == n))
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn httptest_create(&self, spec: &WebScenarioSpec) -> ApiResult<Id> {
        let mut state = self.state();
        state.record("httptest.create")?;
        let id = state.next_id();
        state.web_scenarios.push((
            spec.hostid.clone(),
            WebScenario {
                httptestid: id.clone(),
                name: spec.name.clone(),
                steps: spec.steps.clone(),
            },
        ));
        Ok(id)
    }

    async fn httptest_update(&self, update: &WebScenarioUpdate) -> ApiResult<()> {
        let mut state = self.state();
        state.record("httptest.update")?;
        if let Some((_, scenario)) = state
            .web_scenarios
            .iter_mut()
            .find(|(_, s)| s.httptestid == update.httptestid)
        {
            scenario.name = update.name.clone();
            scenario.steps = update.steps.clone();
        }
        Ok(())
    }

    async fn httptest_delete(&self, httptestid: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.record("httptest.delete")?;
        state.web_scenarios.retain(|(_, s)| s.httptestid != httptestid);
        Ok(())
    }

    async fn trigger_get(&self, description: &str) -> ApiResult<Vec<Trigger>> {
        let state = self.state();
        state.check("trigger.get")?;
        Ok(state
            .triggers
            .iter()
            .filter(|t| t.description == description)
            .cloned()
            .collect())
    }

    async fn trigger_create(&self, spec: &TriggerSpec) -> ApiResult<Id> {
        let mut state = self.state();
        state.record("trigger.create")?;
        let id = state.next_id();
        state.triggers.push(Trigger {
            triggerid: id.clone(),
            description: spec.description.clone(),
            expression: spec.expression.clone(),
            priority: spec.priority,
            url: spec.url.clone(),
        });
        Ok(id)
    }

    async fn trigger_update(&self, update: &TriggerUpdate) -> ApiResult<()> {
        let mut state = self.state();
        state.record("trigger.update")?;
        if let Some(trigger) = state
            .triggers
            .iter_mut()
            .find(|t| t.triggerid == update.triggerid)
        {
            trigger.expression = update.expression.clone();
            trigger.priority = update.priority;
            trigger.url = update.url.clone();
        }
        Ok(())
    }

    async fn configuration_import(
        &self,
        _format: &str,
        source: &str,
        _rules: &ImportRules,
    ) -> ApiResult<()> {
        let mut state = self.state();
        state.record("configuration.import")?;
        state.imports.push(source.to_string());
        Ok(())
    }
}

/// `config` row kept in memory; every write is recorded.
pub struct MemoryConfigStore {
    row: Mutex<ConfigRow>,
    writes: Mutex<Vec<ConfigRow>>,
}

impl MemoryConfigStore {
    pub fn new(row: ConfigRow) -> Self {
        Self {
            row: Mutex::new(row),
            writes: Mutex::new(vec![]),
        }
    }

    pub fn row(&self) -> ConfigRow {
        self.row.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<ConfigRow> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read_all(&self) -> ProvisionResult<ConfigRow> {
        Ok(self.row())
    }

    async fn write(&self, changes: &ConfigRow) -> ProvisionResult<()> {
        let mut row = self.row.lock().unwrap();
        for (key, value) in changes {
            row.insert(key.clone(), value.clone());
        }
        self.writes.lock().unwrap().push(changes.clone());
        Ok(())
    }
}
