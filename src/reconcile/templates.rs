use tracing::{info, warn};

use crate::api::ZabbixApi;
use crate::api::models::{HostFilter, Id};
use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateAssignment {
    Assigned,
    AlreadyAssigned,
    Failed,
}

/// Links template `name` to a host in addition to the templates it already
/// has. Never fails the run: every problem is logged and reported as
/// `Failed`.
pub async fn assign_template(api: &dyn ZabbixApi, hostid: &str, name: &str) -> TemplateAssignment {
    match try_assign(api, hostid, name).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(template = name, hostid, error = %e, "Can not assign template.");
            TemplateAssignment::Failed
        }
    }
}

async fn try_assign(api: &dyn ZabbixApi, hostid: &str, name: &str) -> ProvisionResult<TemplateAssignment> {
    let templateid = api
        .template_get(name)
        .await?
        .into_iter()
        .next()
        .map(|t| t.templateid)
        .ok_or_else(|| ProvisionError::missing("template", name))?;

    let host = api
        .host_get(HostFilter::Id(hostid))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionError::missing("host", hostid))?;

    let mut linked: Vec<Id> = host
        .parent_templates
        .into_iter()
        .map(|t| t.templateid)
        .collect();
    if linked.contains(&templateid) {
        info!(template = name, hostid, "Template is already assigned.");
        return Ok(TemplateAssignment::AlreadyAssigned);
    }
    linked.push(templateid);

    info!(template = name, hostid, "Assigning template.");
    api.host_update_templates(hostid, &linked).await?;
    Ok(TemplateAssignment::Assigned)
}
