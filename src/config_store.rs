//! The server's single-row `config` table, read in full and rewritten only
//! for the keys whose value differs.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySql, MySqlPool, QueryBuilder, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(v) => write!(f, "{v}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Text(v) => f.write_str(v),
            ConfigValue::Null => f.write_str("NULL"),
        }
    }
}

impl ConfigValue {
    /// Values are compared by their rendering, so `5` from the environment
    /// matches a `"5"` read back from a text column.
    pub fn same_as(&self, other: &ConfigValue) -> bool {
        match (self, other) {
            (ConfigValue::Null, ConfigValue::Null) => true,
            (ConfigValue::Null, _) | (_, ConfigValue::Null) => false,
            (a, b) => a.to_string() == b.to_string(),
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Int(i64::from(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => ConfigValue::Text(s),
            other => ConfigValue::Text(other.to_string()),
        }
    }
}

pub type ConfigRow = BTreeMap<String, ConfigValue>;

/// Parses a JSON object of desired key/values.
pub fn parse_row(json: &str) -> ProvisionResult<ConfigRow> {
    let object: BTreeMap<String, Value> = serde_json::from_str(json)?;
    Ok(object.into_iter().map(|(k, v)| (k, v.into())).collect())
}

/// Desired entries whose value differs from the current row. Keys the current
/// row does not have are rejected.
pub fn pending_changes(current: &ConfigRow, desired: &ConfigRow) -> ProvisionResult<ConfigRow> {
    let mut changes = ConfigRow::new();
    for (key, value) in desired {
        let existing = current
            .get(key)
            .ok_or_else(|| ProvisionError::Config(format!("unknown server configuration key '{key}'")))?;
        if !existing.same_as(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    Ok(changes)
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read_all(&self) -> ProvisionResult<ConfigRow>;

    /// Writes the given keys in one statement.
    async fn write(&self, changes: &ConfigRow) -> ProvisionResult<()>;

    /// Writes the desired keys that differ from the stored row. Returns
    /// whether anything was written.
    async fn apply(&self, desired: &ConfigRow) -> ProvisionResult<bool> {
        if desired.is_empty() {
            return Ok(false);
        }
        let current = self.read_all().await?;
        let changes = pending_changes(&current, desired)?;
        if changes.is_empty() {
            debug!("Server configuration already up to date.");
            return Ok(false);
        }
        info!(keys = ?changes.keys().collect::<Vec<_>>(), "Updating server configuration.");
        self.write(&changes).await?;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

pub struct MySqlConfigStore {
    pool: MySqlPool,
}

impl MySqlConfigStore {
    pub async fn connect(settings: &DatabaseSettings) -> ProvisionResult<Self> {
        debug!(host = %settings.host, database = %settings.database, "Connecting to the server database.");
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_config(row: &MySqlRow) -> ConfigRow {
        row.columns()
            .iter()
            .map(|column| {
                let name = column.name();
                let value = if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
                    v.map_or(ConfigValue::Null, ConfigValue::Int)
                } else if let Ok(v) = row.try_get::<Option<u64>, _>(name) {
                    v.map_or(ConfigValue::Null, |v| match i64::try_from(v) {
                        Ok(i) => ConfigValue::Int(i),
                        Err(_) => ConfigValue::Text(v.to_string()),
                    })
                } else if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
                    v.map_or(ConfigValue::Null, ConfigValue::Float)
                } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
                    v.map_or(ConfigValue::Null, ConfigValue::Text)
                } else {
                    ConfigValue::Null
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

#[async_trait]
impl ConfigStore for MySqlConfigStore {
    async fn read_all(&self) -> ProvisionResult<ConfigRow> {
        let row = sqlx::query("SELECT * FROM config")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ProvisionError::Config("server configuration table is empty".to_string()))?;
        Ok(Self::row_to_config(&row))
    }

    async fn write(&self, changes: &ConfigRow) -> ProvisionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new("UPDATE config SET ");
        let mut assignments = builder.separated(", ");
        for (key, value) in changes {
            // Keys were checked against the stored row's columns.
            assignments.push(format!("`{}` = ", key.replace('`', "")));
            match value {
                ConfigValue::Int(v) => assignments.push_bind_unseparated(*v),
                ConfigValue::Float(v) => assignments.push_bind_unseparated(*v),
                ConfigValue::Text(v) => assignments.push_bind_unseparated(v.clone()),
                ConfigValue::Null => assignments.push_unseparated("NULL"),
            };
        }
        let result = builder.build().execute(&self.pool).await?;
        debug!(rows = result.rows_affected(), "Server configuration written.");
        Ok(())
    }
}
