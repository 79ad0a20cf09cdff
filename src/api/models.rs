//! Typed request and response records for the remote management API.
//!
//! The server returns identifiers and most enumerations as JSON strings, but
//! older releases and some verbs return plain numbers. Integer fields read from
//! the server therefore go through [`lenient_int`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Id = String;

pub mod lenient_int {
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(i64),
        Str(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumOrStr::deserialize(deserializer)? {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) if s.trim().is_empty() => Ok(0),
            NumOrStr::Str(s) => s
                .trim()
                .parse()
                .map_err(|e| D::Error::custom(format!("invalid integer '{s}': {e}"))),
        }
    }
}

// --- Users and user groups ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub userid: Id,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserGroupRef {
    pub usrgrpid: Id,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserGroup {
    pub usrgrpid: Id,
    pub name: String,
    #[serde(default)]
    pub users: Vec<UserRef>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewUserGroup {
    pub name: String,
    pub gui_access: i64,
    pub users_status: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct User {
    pub userid: Id,
    pub alias: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewUser {
    pub alias: String,
    pub passwd: String,
    pub usrgrps: Vec<UserGroupRef>,
    #[serde(rename = "type")]
    pub user_type: i64,
}

/// One notification address of a user, as sent to `user.updatemedia`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserMedia {
    pub mediatypeid: Id,
    pub sendto: String,
    #[serde(with = "lenient_int_ser")]
    pub active: i64,
    #[serde(with = "lenient_int_ser")]
    pub severity: i64,
    pub period: String,
}

mod lenient_int_ser {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        super::lenient_int::deserialize(deserializer)
    }
}

// --- Hosts, interfaces, templates ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemplateRef {
    pub templateid: Id,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Host {
    pub hostid: Id,
    pub host: String,
    #[serde(default)]
    pub name: String,
    #[serde(with = "lenient_int")]
    pub status: i64,
    #[serde(default, rename = "parentTemplates")]
    pub parent_templates: Vec<TemplateRef>,
}

impl Host {
    /// Visible name, falling back to the technical name.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.host
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFilter<'a> {
    /// Technical host name.
    Name(&'a str),
    Id(&'a str),
}

#[derive(Deserialize, Debug, Clone)]
pub struct HostInterface {
    pub interfaceid: Id,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub port: String,
    #[serde(with = "lenient_int")]
    pub useip: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceUpdate {
    pub interfaceid: Id,
    pub ip: String,
    pub dns: String,
    pub port: u16,
    pub useip: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HostGroup {
    pub groupid: Id,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Template {
    pub templateid: Id,
    pub host: String,
    #[serde(default)]
    pub name: String,
}

// --- Media types ---

#[derive(Deserialize, Debug, Clone)]
pub struct MediaType {
    pub mediatypeid: Id,
    pub description: String,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_email: String,
    #[serde(default)]
    pub smtp_helo: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaTypeUpdate {
    pub mediatypeid: Id,
    pub smtp_server: String,
    pub smtp_email: String,
    pub smtp_helo: String,
}

// --- Actions ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActionCondition {
    #[serde(with = "lenient_int_ser")]
    pub conditiontype: i64,
    #[serde(with = "lenient_int_ser")]
    pub operator: i64,
    pub value: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    #[serde(with = "lenient_int_ser")]
    pub evaltype: i64,
    #[serde(default)]
    pub conditions: Vec<ActionCondition>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostGroupRef {
    pub groupid: Id,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OpMessage {
    #[serde(with = "lenient_int_ser")]
    pub mediatypeid: i64,
    #[serde(with = "lenient_int_ser")]
    pub default_msg: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActionOperation {
    #[serde(with = "lenient_int_ser")]
    pub operationtype: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opgroup: Vec<HostGroupRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optemplate: Vec<TemplateRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opmessage_grp: Vec<UserGroupRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opmessage: Option<OpMessage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Action {
    pub actionid: Id,
    pub name: String,
    #[serde(with = "lenient_int")]
    pub status: i64,
    #[serde(default, with = "lenient_int_opt")]
    pub eventsource: Option<i64>,
    #[serde(default)]
    pub def_shortdata: String,
    #[serde(default)]
    pub def_longdata: String,
    #[serde(default)]
    pub filter: Option<ActionFilter>,
    #[serde(default)]
    pub operations: Vec<ActionOperation>,
}

mod lenient_int_opt {
    use serde::Deserializer;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        super::lenient_int::deserialize(deserializer).map(Some)
    }
}

/// Full action definition used on create. `eventsource` is only accepted by
/// the server at creation time.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub eventsource: i64,
    pub status: i64,
    pub operations: Vec<ActionOperation>,
    pub def_shortdata: String,
    pub def_longdata: String,
    pub filter: ActionFilter,
}

/// Update payload of an existing action. It has no `eventsource` field: the
/// server rejects any attempt to change it after creation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionUpdate {
    pub actionid: Id,
    pub name: String,
    pub status: i64,
    pub operations: Vec<ActionOperation>,
    pub def_shortdata: String,
    pub def_longdata: String,
    pub filter: ActionFilter,
}

impl ActionUpdate {
    pub fn from_spec(actionid: Id, spec: &ActionSpec) -> Self {
        Self {
            actionid,
            name: spec.name.clone(),
            status: spec.status,
            operations: spec.operations.clone(),
            def_shortdata: spec.def_shortdata.clone(),
            def_longdata: spec.def_longdata.clone(),
            filter: spec.filter.clone(),
        }
    }
}

// --- Web scenarios and triggers ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WebStep {
    #[serde(with = "lenient_int_ser")]
    pub no: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub status_codes: String,
    #[serde(with = "lenient_int_ser")]
    pub follow_redirects: i64,
    #[serde(with = "lenient_int_ser")]
    pub retrieve_mode: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebScenario {
    pub httptestid: Id,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<WebStep>,
}

impl WebScenario {
    pub fn first_url(&self) -> Option<&str> {
        self.steps.first().map(|s| s.url.as_str())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WebScenarioSpec {
    pub hostid: Id,
    pub name: String,
    pub delay: u32,
    pub retries: u32,
    pub steps: Vec<WebStep>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WebScenarioUpdate {
    pub httptestid: Id,
    pub name: String,
    pub delay: u32,
    pub retries: u32,
    pub steps: Vec<WebStep>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Trigger {
    pub triggerid: Id,
    pub description: String,
    #[serde(default)]
    pub expression: String,
    #[serde(with = "lenient_int")]
    pub priority: i64,
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub description: String,
    pub expression: String,
    pub priority: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub trigger_type: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TriggerUpdate {
    pub triggerid: Id,
    pub expression: String,
    pub priority: i64,
    pub url: String,
}

// --- Configuration import ---

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRule {
    #[serde(rename = "createMissing")]
    pub create_missing: bool,
    #[serde(rename = "updateExisting", skip_serializing_if = "Option::is_none")]
    pub update_existing: Option<bool>,
}

pub type ImportRules = BTreeMap<&'static str, ImportRule>;
