//! One reconciliation pass of the monitoring server.

use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::ZabbixApi;
use crate::autoreg;
use crate::config::{
    AGENT_PORT, CONNECT_ATTEMPTS, CONNECT_WAIT, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME,
    ProvisionerConfig, SERVER_PORT,
};
use crate::config_store::{ConfigRow, ConfigStore, ConfigValue};
use crate::discovery::CustomConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::gate::{Reachability, await_reachable};
use crate::importer::import_folder;
use crate::reconcile::actions::{ActionResource, enable_action};
use crate::reconcile::groups::{GroupMembership, UserGroupResource, user_group_id};
use crate::reconcile::hosts::{HostAddress, HostEnabled, SERVER_HOST_NAME, host_id};
use crate::reconcile::media::MediaTypeSettings;
use crate::reconcile::templates::{TemplateAssignment, assign_template};
use crate::reconcile::users::{UserAccount, replace_user_media};
use crate::reconcile::{StepOutcome, Upsert, settle, upsert};
use crate::session::{Credentials, PasswordChange, SessionManager, SessionState};
use crate::web_scenarios;

const AUTHENTICATION_TYPE: &str = "authentication_type";
const INTERNAL_AUTHENTICATION: i64 = 0;

const GUEST_USERNAME: &str = "guest";
const DISABLED_GROUP: &str = "Disabled";
const ADMIN_GROUP: &str = "Zabbix administrators";
const OPERATORS_GROUP: &str = "Operation managers";
const EMAIL_MEDIA_TYPE: &str = "Email";
const SUPER_ADMIN: i64 = 3;
/// Agent interface addressed by DNS name.
const USE_DNS: i64 = 0;

/// Resolves the agent host name to its first IPv4 address.
pub async fn resolve_ipv4(hostname: &str) -> ProvisionResult<IpAddr> {
    tokio::net::lookup_host((hostname, AGENT_PORT))
        .await?
        .map(|addr| addr.ip())
        .find(IpAddr::is_ipv4)
        .ok_or_else(|| ProvisionError::Config(format!("{hostname} has no IPv4 address")))
}

/// Blocks until the server trapper port accepts connections.
pub async fn wait_for_server(host: &str) -> ProvisionResult<()> {
    match await_reachable(host, SERVER_PORT, CONNECT_WAIT, CONNECT_ATTEMPTS).await {
        Reachability::Reached => Ok(()),
        Reachability::TimedOut => Err(ProvisionError::Unreachable {
            host: host.to_string(),
            port: SERVER_PORT,
            attempts: CONNECT_ATTEMPTS,
        }),
    }
}

/// Logs a step outcome. Recoverable failures become `Failed`; fatal errors
/// are returned.
fn record<T: Into<StepOutcome>>(
    step: &str,
    result: ProvisionResult<T>,
) -> ProvisionResult<StepOutcome> {
    let outcome = settle(step, result)?;
    match outcome {
        StepOutcome::Changed => info!(step, "Applied."),
        StepOutcome::Unchanged => info!(step, "Skipped, nothing to change."),
        StepOutcome::Failed => {}
    }
    Ok(outcome)
}

pub struct Provisioner<'a> {
    api: &'a dyn ZabbixApi,
    store: &'a dyn ConfigStore,
    config: &'a ProvisionerConfig,
    agent_ip: IpAddr,
    login_wait: Duration,
    login_attempts: u32,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        api: &'a dyn ZabbixApi,
        store: &'a dyn ConfigStore,
        config: &'a ProvisionerConfig,
        agent_ip: IpAddr,
    ) -> Self {
        Self {
            api,
            store,
            config,
            agent_ip,
            login_wait: CONNECT_WAIT,
            login_attempts: CONNECT_ATTEMPTS,
        }
    }

    pub fn with_login_retry(mut self, wait: Duration, attempts: u32) -> Self {
        self.login_wait = wait;
        self.login_attempts = attempts;
        self
    }

    fn sessions(&self) -> SessionManager<'a> {
        SessionManager::new(
            self.api,
            Credentials {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                default_password: DEFAULT_ADMIN_PASSWORD.to_string(),
                configured_password: self.config.admin_password.clone(),
            },
            self.login_wait,
            self.login_attempts,
        )
    }

    pub async fn run(&self) -> ProvisionResult<()> {
        let current = self.store.read_all().await?;
        let original_auth = current.get(AUTHENTICATION_TYPE).cloned();
        let relaxed = self.relax_authentication(original_auth.as_ref()).await?;

        let sessions = self.sessions();
        let state = self.authenticate(&sessions).await?;
        let result = self.reconcile(original_auth.filter(|_| relaxed)).await;
        let state = sessions.logout(state).await;
        debug!(phase = ?state.phase, "Session closed.");

        result
    }

    async fn relax_authentication(&self, current: Option<&ConfigValue>) -> ProvisionResult<bool> {
        let internal = ConfigValue::Int(INTERNAL_AUTHENTICATION);
        match current {
            Some(value) if !value.same_as(&internal) => {
                debug!(%value, "Changing authentication type to internal to use the API with basic credentials.");
                let desired = ConfigRow::from([(AUTHENTICATION_TYPE.to_string(), internal)]);
                self.store.apply(&desired).await
            }
            _ => Ok(false),
        }
    }

    async fn authenticate(&self, sessions: &SessionManager<'_>) -> ProvisionResult<SessionState> {
        let state = sessions.login(SessionState::default()).await?;
        let (state, change) = sessions.change_password(state).await?;
        match change {
            PasswordChange::Changed => sessions.relogin(state).await,
            PasswordChange::Unchanged => Ok(state),
        }
    }

    async fn reconcile(&self, restore_auth: Option<ConfigValue>) -> ProvisionResult<()> {
        let api = self.api;
        let config = self.config;

        if config.disable_guest {
            let lock_out = GroupMembership {
                alias: GUEST_USERNAME.to_string(),
                group: DISABLED_GROUP.to_string(),
            };
            record("disable guest user", upsert(api, &lock_out).await)?;
        }

        let hostid = host_id(api, SERVER_HOST_NAME).await?;
        debug!(host = SERVER_HOST_NAME, %hostid, "Resolved server host.");

        let address = HostAddress {
            hostid: hostid.clone(),
            ip: self.agent_ip.to_string(),
            dns: config.agent_hostname.clone(),
            port: AGENT_PORT,
            useip: USE_DNS,
        };
        record("associate local agent", upsert(api, &address).await)?;
        record("enable server host", upsert(api, &HostEnabled { hostid: hostid.clone() }).await)?;

        let email = MediaTypeSettings {
            name: EMAIL_MEDIA_TYPE.to_string(),
            smtp_server: config.smtp_server.clone(),
            smtp_email: config.smtp_email.clone(),
            smtp_helo: config.smtp_helo.clone(),
        };
        record("email media type", upsert(api, &email).await)?;
        record(
            "admin email settings",
            replace_user_media(api, DEFAULT_ADMIN_USERNAME, &config.admin_email_address).await,
        )?;
        record(
            "default notify action",
            enable_action(api, &format!("Report problems to {ADMIN_GROUP}")).await,
        )?;
        record("auto registration action", self.auto_registration().await)?;

        let checks = &config.web_checks;
        record(
            "web scenarios",
            web_scenarios::sync(api, &hostid, checks).await.map(|n| n > 0),
        )?;
        record(
            "web scenario cleanup",
            web_scenarios::collect_garbage(api, &hostid, checks).await.map(|n| n > 0),
        )?;

        if let Some(folder) = &config.configuration_folder {
            let imported = import_folder(api, folder).await?;
            record("configuration import", Ok::<_, ProvisionError>(imported > 0))?;
        }

        self.admin_users().await?;

        record(
            "server configuration",
            self.store.apply(&config.server_config).await,
        )?;
        if let Some(value) = restore_auth {
            debug!(%value, "Returning authentication type to its initial state.");
            let desired = ConfigRow::from([(AUTHENTICATION_TYPE.to_string(), value)]);
            self.store.apply(&desired).await?;
        }

        let side_channel = CustomConfig {
            web: web_scenarios::active_set(checks),
        };
        match side_channel.save(&config.custom_config_path) {
            Ok(written) => {
                record("custom config", Ok::<_, ProvisionError>(written))?;
            }
            Err(e) => warn!(
                path = %config.custom_config_path.display(),
                error = %e,
                "Custom config can not be saved."
            ),
        }

        for template in &config.additional_templates {
            match assign_template(api, &hostid, template).await {
                TemplateAssignment::Assigned => info!(%template, "Assigned template with the server host."),
                TemplateAssignment::AlreadyAssigned => debug!(%template, "Template already assigned."),
                TemplateAssignment::Failed => warn!(%template, "Can not assign template with the server host."),
            }
        }
        Ok(())
    }

    async fn auto_registration(&self) -> ProvisionResult<Upsert> {
        let Some(rule) = autoreg::build(&self.config.host_metadata) else {
            return Ok(Upsert::Unchanged);
        };
        let spec = autoreg::resolve(self.api, &rule).await?;
        upsert(self.api, &ActionResource { spec }).await
    }

    async fn admin_users(&self) -> ProvisionResult<()> {
        let api = self.api;
        info!(group = OPERATORS_GROUP, "Creating default user group.");
        record("operators group", upsert(api, &UserGroupResource::new(OPERATORS_GROUP)).await)?;
        if self.config.admin_users.is_empty() {
            return Ok(());
        }

        let usrgrpid = match user_group_id(api, OPERATORS_GROUP).await {
            Ok(id) => id,
            Err(e) => {
                record::<Upsert>("admin users", Err(e))?;
                return Ok(());
            }
        };
        for user in &self.config.admin_users {
            info!(user = %user.name, "Adding user as administrator.");
            let account = UserAccount {
                alias: user.name.clone(),
                password: user.password.clone(),
                groups: vec![usrgrpid.clone()],
                user_type: SUPER_ADMIN,
            };
            record("admin user", upsert(api, &account).await)?;
        }
        Ok(())
    }
}
