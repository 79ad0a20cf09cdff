use async_trait::async_trait;
use tracing::{debug, info};

use super::ManagedResource;
use crate::api::ZabbixApi;
use crate::api::models::{Host, HostFilter, HostInterface, Id, InterfaceUpdate};
use crate::error::{ProvisionError, ProvisionResult};

pub const SERVER_HOST_NAME: &str = "Zabbix server";

pub async fn host_id(api: &dyn ZabbixApi, name: &str) -> ProvisionResult<Id> {
    find_host(api, HostFilter::Name(name))
        .await?
        .map(|h| h.hostid)
        .ok_or_else(|| ProvisionError::missing("host", name))
}

pub async fn find_host(api: &dyn ZabbixApi, filter: HostFilter<'_>) -> ProvisionResult<Option<Host>> {
    Ok(api.host_get(filter).await?.into_iter().next())
}

/// Agent address of a host's first interface. Only `ip` and `dns` are
/// compared; when they differ the whole interface is rewritten.
#[derive(Debug, Clone)]
pub struct HostAddress {
    pub hostid: Id,
    pub ip: String,
    pub dns: String,
    pub port: u16,
    pub useip: i64,
}

#[async_trait]
impl ManagedResource for HostAddress {
    type Remote = HostInterface;
    type Update = InterfaceUpdate;

    const KIND: &'static str = "host interface";

    fn key(&self) -> &str {
        &self.hostid
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<HostInterface>> {
        Ok(api.hostinterface_get(&self.hostid).await?.into_iter().next())
    }

    fn diff(&self, remote: &HostInterface) -> Option<InterfaceUpdate> {
        debug!(
            hostid = %self.hostid,
            ip = %remote.ip,
            dns = %remote.dns,
            "Current host interface."
        );
        if remote.ip == self.ip && remote.dns == self.dns {
            return None;
        }
        Some(InterfaceUpdate {
            interfaceid: remote.interfaceid.clone(),
            ip: self.ip.clone(),
            dns: self.dns.clone(),
            port: self.port,
            useip: self.useip,
        })
    }

    async fn update(&self, api: &dyn ZabbixApi, update: InterfaceUpdate) -> ProvisionResult<()> {
        info!(hostid = %self.hostid, ip = %update.ip, dns = %update.dns, "Updating host interface.");
        api.hostinterface_update(&update).await?;
        Ok(())
    }
}

/// Monitoring status of a host, converged to enabled.
#[derive(Debug, Clone)]
pub struct HostEnabled {
    pub hostid: Id,
}

#[async_trait]
impl ManagedResource for HostEnabled {
    type Remote = Host;
    type Update = Id;

    const KIND: &'static str = "host";

    fn key(&self) -> &str {
        &self.hostid
    }

    async fn fetch(&self, api: &dyn ZabbixApi) -> ProvisionResult<Option<Host>> {
        find_host(api, HostFilter::Id(&self.hostid)).await
    }

    fn diff(&self, remote: &Host) -> Option<Id> {
        (remote.status != 0).then(|| remote.hostid.clone())
    }

    async fn update(&self, api: &dyn ZabbixApi, hostid: Id) -> ProvisionResult<()> {
        info!(%hostid, "Enabling host.");
        api.host_update_status(&hostid, 0).await?;
        Ok(())
    }
}
