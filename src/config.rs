use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config_store::{ConfigRow, DatabaseSettings, parse_row};
use crate::error::{ProvisionError, ProvisionResult};
use crate::grafana::{GRAFANA_PORT, GrafanaSettings};
use crate::reconcile::users::validate_email;
use crate::web_scenarios::WebCheck;

pub const AGENT_PORT: u16 = 10050;
pub const SERVER_PORT: u16 = 10051;
pub const CONNECT_WAIT: Duration = Duration::from_secs(5);
pub const CONNECT_ATTEMPTS: u32 = 30;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "zabbix";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub server_url: String,
    pub server_host: String,
    pub admin_password: String,
    pub disable_guest: bool,
    pub agent_hostname: String,

    pub smtp_server: String,
    pub smtp_email: String,
    /// Domain part of `smtp_email`.
    pub smtp_helo: String,
    pub admin_email_address: String,

    pub configuration_folder: Option<PathBuf>,
    /// Side-channel document read by the discovery helper.
    pub custom_config_path: PathBuf,
    /// Empty when no host secret is configured.
    pub host_metadata: String,
    pub web_checks: Vec<WebCheck>,

    pub database: DatabaseSettings,
    pub server_config: ConfigRow,
    pub admin_users: Vec<AdminUser>,
    pub additional_templates: Vec<String>,
    /// Set when `GRA_HOST` is configured.
    pub grafana: Option<GrafanaSettings>,

    pub log_dir: String,
    pub request_timeout: Duration,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialConfig {
    zbx_server_url: Option<String>,
    zbx_server_host: Option<String>,
    zbx_admin_password: Option<String>,
    zbx_disable_guest: Option<String>,
    zbx_agent_hostname: Option<String>,
    smtp_server: Option<String>,
    smtp_email: Option<String>,
    admin_email_address: Option<String>,
    configuration_folder: Option<String>,
    zbx_config_folder: Option<String>,
    zbx_custom_config: Option<String>,
    default_host_secret: Option<String>,
    url_list: Option<String>,
    db_server_host: Option<String>,
    mysql_user: Option<String>,
    mysql_password: Option<String>,
    mysql_database: Option<String>,
    zbx_config: Option<String>,
    zbx_admin_users: Option<String>,
    zbx_additional_templates: Option<String>,
    gra_host: Option<String>,
    gf_security_admin_password: Option<String>,
    gra_path_to_dashboards: Option<String>,
    log_dir: Option<String>,
    request_timeout_secs: Option<u64>,
}

fn default_config_folder() -> String {
    "/etc/zabbix".to_string()
}

fn default_custom_config() -> String {
    "custom.json".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn required(value: Option<String>, name: &str) -> ProvisionResult<String> {
    value.ok_or_else(|| ProvisionError::Config(format!("{name} is required")))
}

/// Blank strings count as unset.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_json_list<T: for<'de> Deserialize<'de>>(value: Option<String>, name: &str) -> ProvisionResult<Vec<T>> {
    match non_blank(value) {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse {name}: {e}"))),
        None => Ok(vec![]),
    }
}

impl ProvisionerConfig {
    pub fn load(config_path: Option<&str>) -> ProvisionResult<Self> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path).map_err(|e| {
                    ProvisionError::Config(format!("Failed to read config file at {path:?}: {e}"))
                })?;
                toml::from_str(&contents).map_err(|e| {
                    ProvisionError::Config(format!("Failed to parse TOML from config file at {path:?}: {e}"))
                })?
            } else {
                PartialConfig::default()
            }
        } else {
            PartialConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialConfig = envy::from_env::<PartialConfig>().map_err(|e| {
            ProvisionError::Config(format!("Failed to load config from environment: {e}"))
        })?;

        Self::merge(env_config, file_config)
    }

    /// Environment overrides file.
    fn merge(env: PartialConfig, file: PartialConfig) -> ProvisionResult<Self> {
        let smtp_email = required(env.smtp_email.or(file.smtp_email), "SMTP_EMAIL")?;
        validate_email(&smtp_email)?;
        let smtp_helo = smtp_email
            .split_once('@')
            .map(|(_, domain)| domain.to_string())
            .unwrap_or_default();

        let config_folder = non_blank(env.zbx_config_folder.or(file.zbx_config_folder))
            .unwrap_or_else(default_config_folder);
        let custom_config = non_blank(env.zbx_custom_config.or(file.zbx_custom_config))
            .unwrap_or_else(default_custom_config);

        let host_metadata = non_blank(env.default_host_secret.or(file.default_host_secret))
            .map(|secret| format!("Linux {}", secret.trim()))
            .unwrap_or_default();

        let server_config = match non_blank(env.zbx_config.or(file.zbx_config)) {
            Some(raw) => parse_row(&raw)
                .map_err(|e| ProvisionError::Config(format!("Failed to parse ZBX_CONFIG: {e}")))?,
            None => ConfigRow::new(),
        };

        let additional_templates = env
            .zbx_additional_templates
            .or(file.zbx_additional_templates)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let grafana = match non_blank(env.gra_host.or(file.gra_host)) {
            Some(host) => Some(GrafanaSettings {
                url: format!("{}:{GRAFANA_PORT}", host.trim().trim_end_matches('/')),
                admin_password: required(
                    env.gf_security_admin_password.or(file.gf_security_admin_password),
                    "GF_SECURITY_ADMIN_PASSWORD",
                )?,
                dashboards_dir: PathBuf::from(required(
                    env.gra_path_to_dashboards.or(file.gra_path_to_dashboards),
                    "GRA_PATH_TO_DASHBOARDS",
                )?),
            }),
            None => None,
        };

        Ok(ProvisionerConfig {
            server_url: required(env.zbx_server_url.or(file.zbx_server_url), "ZBX_SERVER_URL")?,
            server_host: required(env.zbx_server_host.or(file.zbx_server_host), "ZBX_SERVER_HOST")?,
            admin_password: env
                .zbx_admin_password
                .or(file.zbx_admin_password)
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
            disable_guest: env
                .zbx_disable_guest
                .or(file.zbx_disable_guest)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            agent_hostname: required(env.zbx_agent_hostname.or(file.zbx_agent_hostname), "ZBX_AGENT_HOSTNAME")?,
            smtp_server: required(env.smtp_server.or(file.smtp_server), "SMTP_SERVER")?,
            smtp_email,
            smtp_helo,
            admin_email_address: env
                .admin_email_address
                .or(file.admin_email_address)
                .unwrap_or_default(),
            configuration_folder: non_blank(env.configuration_folder.or(file.configuration_folder))
                .map(PathBuf::from),
            custom_config_path: Path::new(&config_folder).join(custom_config),
            host_metadata,
            web_checks: parse_json_list(env.url_list.or(file.url_list), "URL_LIST")?,
            database: DatabaseSettings {
                host: required(env.db_server_host.or(file.db_server_host), "DB_SERVER_HOST")?,
                user: required(env.mysql_user.or(file.mysql_user), "MYSQL_USER")?,
                password: required(env.mysql_password.or(file.mysql_password), "MYSQL_PASSWORD")?,
                database: required(env.mysql_database.or(file.mysql_database), "MYSQL_DATABASE")?,
            },
            server_config,
            admin_users: parse_json_list(env.zbx_admin_users.or(file.zbx_admin_users), "ZBX_ADMIN_USERS")?,
            additional_templates,
            grafana,
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            request_timeout: Duration::from_secs(
                env.request_timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or(30),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigValue;

    fn env(pairs: &[(&str, &str)]) -> PartialConfig {
        envy::from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ZBX_SERVER_URL", "http://zabbix-web"),
            ("ZBX_SERVER_HOST", "zabbix-server"),
            ("ZBX_AGENT_HOSTNAME", "zabbix-agent"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("SMTP_EMAIL", "zabbix@example.com"),
            ("DB_SERVER_HOST", "mysql"),
            ("MYSQL_USER", "zabbix"),
            ("MYSQL_PASSWORD", "secret"),
            ("MYSQL_DATABASE", "zabbix"),
        ]
    }

    #[test]
    fn test_defaults_from_minimal_environment() {
        let config = ProvisionerConfig::merge(env(&minimal()), PartialConfig::default()).unwrap();
        assert_eq!(config.admin_password, "zabbix");
        assert!(!config.disable_guest);
        assert_eq!(config.smtp_helo, "example.com");
        assert_eq!(config.custom_config_path, PathBuf::from("/etc/zabbix/custom.json"));
        assert_eq!(config.host_metadata, "");
        assert!(config.web_checks.is_empty());
        assert!(config.configuration_folder.is_none());
        assert_eq!(config.log_dir, "logs");
        assert!(config.grafana.is_none());
    }

    #[test]
    fn test_grafana_settings_from_environment() {
        let mut pairs = minimal();
        pairs.extend([
            ("GRA_HOST", "http://grafana/"),
            ("GF_SECURITY_ADMIN_PASSWORD", "gf-secret"),
            ("GRA_PATH_TO_DASHBOARDS", "/var/lib/grafana/dashboards"),
        ]);
        let config = ProvisionerConfig::merge(env(&pairs), PartialConfig::default()).unwrap();
        assert_eq!(
            config.grafana,
            Some(GrafanaSettings {
                url: "http://grafana:3000".into(),
                admin_password: "gf-secret".into(),
                dashboards_dir: PathBuf::from("/var/lib/grafana/dashboards"),
            })
        );

        pairs.retain(|(k, _)| *k != "GF_SECURITY_ADMIN_PASSWORD");
        let err = ProvisionerConfig::merge(env(&pairs), PartialConfig::default()).unwrap_err();
        assert!(err.to_string().contains("GF_SECURITY_ADMIN_PASSWORD"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file: PartialConfig = toml::from_str(
            r#"
            zbx_admin_password = "from-file"
            log_dir = "/var/log/provisioner"
            "#,
        )
        .unwrap();
        let mut pairs = minimal();
        pairs.push(("ZBX_ADMIN_PASSWORD", "from-env"));

        let config = ProvisionerConfig::merge(env(&pairs), file).unwrap();
        assert_eq!(config.admin_password, "from-env");
        assert_eq!(config.log_dir, "/var/log/provisioner");
    }

    #[test]
    fn test_structured_variables_are_parsed() {
        let mut pairs = minimal();
        pairs.extend([
            ("ZBX_DISABLE_GUEST", "True"),
            ("DEFAULT_HOST_SECRET", "s3cret"),
            ("URL_LIST", r#"[{"name":"svc","url":"http://svc"}]"#),
            ("ZBX_CONFIG", r#"{"default_theme":"dark-theme"}"#),
            ("ZBX_ADMIN_USERS", r#"[{"name":"ops","password":"pw"}]"#),
            ("ZBX_ADDITIONAL_TEMPLATES", "Template App Zabbix Server, Template DB MySQL,"),
        ]);
        let config = ProvisionerConfig::merge(env(&pairs), PartialConfig::default()).unwrap();

        assert!(config.disable_guest);
        assert_eq!(config.host_metadata, "Linux s3cret");
        assert_eq!(config.web_checks[0].name, "svc");
        assert_eq!(
            config.server_config["default_theme"],
            ConfigValue::Text("dark-theme".into())
        );
        assert_eq!(config.admin_users[0].name, "ops");
        assert_eq!(
            config.additional_templates,
            vec!["Template App Zabbix Server", "Template DB MySQL"]
        );
    }

    #[test]
    fn test_missing_required_key() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "ZBX_SERVER_URL")
            .collect();
        let err = ProvisionerConfig::merge(env(&pairs), PartialConfig::default()).unwrap_err();
        assert!(err.to_string().contains("ZBX_SERVER_URL"));
    }

    #[test]
    fn test_invalid_smtp_email_is_a_validation_error() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "SMTP_EMAIL");
        pairs.push(("SMTP_EMAIL", "not-an-email"));
        let err = ProvisionerConfig::merge(env(&pairs), PartialConfig::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn test_malformed_url_list() {
        let mut pairs = minimal();
        pairs.push(("URL_LIST", "not json"));
        assert!(matches!(
            ProvisionerConfig::merge(env(&pairs), PartialConfig::default()),
            Err(ProvisionError::Config(_))
        ));
    }
}
