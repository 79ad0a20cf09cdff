pub mod api;
pub mod autoreg;
pub mod config;
pub mod config_store;
pub mod discovery;
pub mod error;
pub mod gate;
pub mod grafana;
pub mod importer;
pub mod provisioner;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod version;
pub mod web_scenarios;

#[cfg(test)]
pub(crate) mod testing;
