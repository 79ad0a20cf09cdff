//! Side-channel web-check document and the low-level discovery report built
//! from it by the agent-side helper.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{ProvisionError, ProvisionResult};
use crate::web_scenarios::WebCheck;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomConfig {
    #[serde(default)]
    pub web: Vec<WebCheck>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Full(CustomConfig),
    List(Vec<WebCheck>),
}

impl CustomConfig {
    /// Writes the document with a four space indent, including an empty
    /// `web` list. Returns `false` when the file already held the same bytes.
    pub fn save(&self, path: &Path) -> ProvisionResult<bool> {
        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        if fs::read(path).is_ok_and(|current| current == buffer) {
            debug!(path = %path.display(), "Custom config is up to date.");
            return Ok(false);
        }
        fs::write(path, buffer)?;
        debug!(path = %path.display(), checks = self.web.len(), "Custom config was written.");
        Ok(true)
    }

    /// Reads either `{"web": [...]}` or a bare list of checks.
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(match serde_json::from_str::<ConfigDocument>(&raw)? {
            ConfigDocument::Full(config) => config,
            ConfigDocument::List(web) => CustomConfig { web },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Any,
    Http,
    Https,
}

impl FromStr for Protocol {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "-1" => Ok(Protocol::Any),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(ProvisionError::Config(format!(
                "unknown protocol '{other}', expected any, http or https"
            ))),
        }
    }
}

impl Protocol {
    fn accepts(self, scheme: &str) -> bool {
        match self {
            Protocol::Any => true,
            Protocol::Http => scheme == "http",
            Protocol::Https => scheme == "https",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub protocol: Protocol,
    /// `None` accepts every priority.
    pub priority: Option<i64>,
    /// Keep only the first check per scheme and host.
    pub unique: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEntry {
    #[serde(rename = "{#DESCRIPTION}")]
    pub description: String,
    #[serde(rename = "{#URL}")]
    pub url: String,
    #[serde(rename = "{#HOSTNAME}")]
    pub hostname: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub data: Vec<DiscoveryEntry>,
}

pub fn discover(checks: &[WebCheck], filter: &DiscoveryFilter) -> DiscoveryReport {
    let mut seen = HashSet::new();
    let mut data = Vec::new();

    for check in checks {
        let parsed = Url::parse(&check.url);
        let (scheme, hostname) = match &parsed {
            Ok(url) => (url.scheme().to_string(), url.host_str().unwrap_or_default().to_string()),
            Err(e) => {
                warn!(url = %check.url, error = %e, "Can not parse url.");
                let scheme = check.url.split(':').next().unwrap_or_default();
                (scheme.to_ascii_lowercase(), String::new())
            }
        };

        if !filter.protocol.accepts(&scheme) {
            continue;
        }
        if filter.priority.is_some_and(|p| p != check.priority()) {
            continue;
        }
        if filter.unique && !seen.insert((scheme, hostname.clone())) {
            debug!(name = %check.name, "Duplicate host, skipped.");
            continue;
        }
        data.push(DiscoveryEntry {
            description: check.name.clone(),
            url: check.url.clone(),
            hostname,
        });
    }
    DiscoveryReport { data }
}
