use std::path::Path;
use tracing::{debug, info};

use crate::api::ZabbixApi;
use crate::api::models::{ImportRule, ImportRules};
use crate::error::{ProvisionError, ProvisionResult};

const FORMAT: &str = "xml";

fn rule(update_existing: bool) -> ImportRule {
    ImportRule {
        create_missing: true,
        update_existing: update_existing.then_some(true),
    }
}

pub fn import_rules() -> ImportRules {
    let mut rules = ImportRules::new();
    for kind in ["applications", "groups", "templateLinkage"] {
        rules.insert(kind, rule(false));
    }
    for kind in [
        "discoveryRules",
        "graphs",
        "hosts",
        "images",
        "items",
        "maps",
        "screens",
        "templates",
        "templateScreens",
        "triggers",
    ] {
        rules.insert(kind, rule(true));
    }
    rules
}

/// Submits every `*.xml` file of `folder` to the configuration import, in
/// file name order. Returns the number of imported files.
pub async fn import_folder(api: &dyn ZabbixApi, folder: &Path) -> ProvisionResult<usize> {
    debug!(folder = %folder.display(), "Finding configuration in folder.");
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == FORMAT) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        debug!(folder = %folder.display(), "No configuration was found.");
        return Ok(0);
    }

    let rules = import_rules();
    for path in &files {
        let source = std::fs::read_to_string(path)?;
        api.configuration_import(FORMAT, &source, &rules)
            .await
            .map_err(|source| ProvisionError::Import {
                file: path.display().to_string(),
                source,
            })?;
        info!(file = %path.display(), "Configuration was imported.");
    }
    Ok(files.len())
}
