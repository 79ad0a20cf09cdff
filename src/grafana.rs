//! Post-start setup of the bundled Grafana instance: enables the Zabbix app
//! plugin and stars the provisioned dashboards.

use reqwest::{Client, Url, header};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiResult};
use crate::error::{ProvisionError, ProvisionResult};
use crate::gate::{Reachability, await_reachable};
use crate::version::VERSION;

pub const GRAFANA_PORT: u16 = 3000;
const GRAFANA_USER: &str = "admin";
const ZABBIX_PLUGIN_ID: &str = "alexanderzobnin-zabbix-app";
const STARTUP_WAIT: Duration = Duration::from_secs(1);
const STARTUP_ATTEMPTS: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrafanaSettings {
    /// Base url including the port, e.g. `http://grafana:3000`.
    pub url: String,
    pub admin_password: String,
    /// Folder of provisioned dashboard files. Grafana numbers them from 1.
    pub dashboards_dir: PathBuf,
}

pub struct GrafanaClient {
    base_url: String,
    password: String,
    http_client: Client,
}

impl GrafanaClient {
    pub fn new(base_url: &str, password: &str, timeout: Duration) -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("zbx-provisioner/{VERSION}"))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            password: password.to_string(),
            http_client,
        })
    }

    async fn post(&self, path: &str) -> ApiResult<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Calling Grafana.");
        let response = self
            .http_client
            .post(&url)
            .basic_auth(GRAFANA_USER, Some(&self.password))
            .header(header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    pub async fn enable_plugin(&self) -> ApiResult<()> {
        info!(plugin = ZABBIX_PLUGIN_ID, "Enabling Grafana plugin.");
        self.post(&format!("/api/plugins/{ZABBIX_PLUGIN_ID}/settings?enabled=true"))
            .await
    }

    /// Stars dashboards `1..=count` for the admin user.
    pub async fn star_dashboards(&self, count: usize) -> ApiResult<usize> {
        for dashboard_id in 1..=count {
            debug!(dashboard_id, "Starring dashboard.");
            self.post(&format!("/api/user/stars/dashboard/{dashboard_id}"))
                .await?;
        }
        Ok(count)
    }
}

/// Number of regular files directly inside `dir`.
pub fn dashboard_count(dir: &Path) -> ProvisionResult<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Waits briefly for Grafana and applies the plugin and star settings.
/// Returns `false` when Grafana never answered.
pub async fn configure(settings: &GrafanaSettings, timeout: Duration) -> ProvisionResult<bool> {
    let url = Url::parse(&settings.url)
        .map_err(|e| ProvisionError::Config(format!("invalid Grafana url '{}': {e}", settings.url)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProvisionError::Config(format!("Grafana url '{}' has no host", settings.url)))?;
    let port = url.port_or_known_default().unwrap_or(GRAFANA_PORT);

    if await_reachable(host, port, STARTUP_WAIT, STARTUP_ATTEMPTS).await == Reachability::TimedOut {
        warn!(host, port, "Grafana is not started, skipping its setup.");
        return Ok(false);
    }

    let client = GrafanaClient::new(&settings.url, &settings.admin_password, timeout)?;
    client.enable_plugin().await?;
    let count = dashboard_count(&settings.dashboards_dir)?;
    let starred = client.star_dashboards(count).await?;
    info!(starred, "Grafana dashboards added to favorites.");
    Ok(true)
}
