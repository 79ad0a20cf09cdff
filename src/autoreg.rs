//! Auto-registration action built from the agent host metadata.
//!
//! A rule is only built from non-blank metadata: an empty metadata filter
//! would match every registering agent.

use tracing::debug;

use crate::api::ZabbixApi;
use crate::api::models::{
    ActionCondition, ActionFilter, ActionOperation, ActionSpec, HostGroupRef, OpMessage,
    TemplateRef, UserGroupRef,
};
use crate::error::{ProvisionError, ProvisionResult};

pub const ACTION_NAME: &str = "Auto registration rules for Linux servers";
pub const HOST_GROUP: &str = "Linux servers";
pub const LINKED_TEMPLATE: &str = "Template OS Linux";
pub const NOTIFIED_GROUP: &str = "Zabbix administrators";

const EVENT_SOURCE_AUTO_REGISTRATION: i64 = 2;
const CONDITION_HOST_METADATA: i64 = 24;
const OPERATOR_LIKE: i64 = 2;
const EVAL_OR: i64 = 1;

const OP_SEND_MESSAGE: i64 = 0;
const OP_ADD_HOST: i64 = 2;
const OP_ADD_TO_GROUP: i64 = 4;
const OP_LINK_TEMPLATE: i64 = 6;

const SHORT_MESSAGE: &str = "Auto registration: {HOST.HOST}";
const LONG_MESSAGE: &str = "\nHost name: {HOST.HOST}\nHost IP: {HOST.IP}\nAgent port: {HOST.PORT}";

/// Metadata conditions of the auto-registration action, before the remote
/// identifiers of its operations are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoRegistrationRule {
    pub filter: ActionFilter,
}

impl AutoRegistrationRule {
    pub fn tokens(&self) -> Vec<&str> {
        self.filter
            .conditions
            .iter()
            .map(|c| c.value.as_str())
            .collect()
    }
}

pub fn build(metadata: &str) -> Option<AutoRegistrationRule> {
    let conditions: Vec<ActionCondition> = metadata
        .split_whitespace()
        .map(|token| ActionCondition {
            conditiontype: CONDITION_HOST_METADATA,
            operator: OPERATOR_LIKE,
            value: token.to_string(),
        })
        .collect();
    if conditions.is_empty() {
        debug!("Host metadata empty, such action is impossible to add because of security reason.");
        return None;
    }
    Some(AutoRegistrationRule {
        filter: ActionFilter {
            evaltype: EVAL_OR,
            conditions,
        },
    })
}

fn operation(operationtype: i64) -> ActionOperation {
    ActionOperation {
        operationtype,
        opgroup: vec![],
        optemplate: vec![],
        opmessage_grp: vec![],
        opmessage: None,
    }
}

/// Resolves the host group, template and notified user group the action
/// points at. Any of them missing is a missing prerequisite.
pub async fn resolve(api: &dyn ZabbixApi, rule: &AutoRegistrationRule) -> ProvisionResult<ActionSpec> {
    let groupid = api
        .hostgroup_get(HOST_GROUP)
        .await?
        .into_iter()
        .next()
        .map(|g| g.groupid)
        .ok_or_else(|| ProvisionError::missing("host group", HOST_GROUP))?;
    let templateid = api
        .template_get(LINKED_TEMPLATE)
        .await?
        .into_iter()
        .next()
        .map(|t| t.templateid)
        .ok_or_else(|| ProvisionError::missing("template", LINKED_TEMPLATE))?;
    let usrgrpid = api
        .usergroup_get(NOTIFIED_GROUP)
        .await?
        .into_iter()
        .next()
        .map(|g| g.usrgrpid)
        .ok_or_else(|| ProvisionError::missing("user group", NOTIFIED_GROUP))?;

    Ok(ActionSpec {
        name: ACTION_NAME.to_string(),
        eventsource: EVENT_SOURCE_AUTO_REGISTRATION,
        status: 0,
        operations: vec![
            operation(OP_ADD_HOST),
            ActionOperation {
                opgroup: vec![HostGroupRef { groupid }],
                ..operation(OP_ADD_TO_GROUP)
            },
            ActionOperation {
                optemplate: vec![TemplateRef { templateid }],
                ..operation(OP_LINK_TEMPLATE)
            },
            ActionOperation {
                opmessage_grp: vec![UserGroupRef { usrgrpid }],
                opmessage: Some(OpMessage {
                    mediatypeid: 0,
                    default_msg: 1,
                }),
                ..operation(OP_SEND_MESSAGE)
            },
        ],
        def_shortdata: SHORT_MESSAGE.to_string(),
        def_longdata: LONG_MESSAGE.to_string(),
        filter: rule.filter.clone(),
    })
}
