use std::collections::BTreeMap;

use compose_store::construct::{Database, ModuleFilter};
use compose_store::settings::{DEFAULT_CONFIG_FILE, Settings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config_path =
        std::env::var("COMPOSE_STORE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let settings = match Settings::load(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log.filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&settings) {
        error!(error = %e, "compose store failed");
        std::process::exit(1);
    }
}

fn run(settings: &Settings) -> compose_store::Result<()> {
    let db = Database::from_settings(settings)?;
    let modules = db.modules();
    let (set, filter) = modules.find(ModuleFilter::default())?;

    let mut per_namespace: BTreeMap<u64, usize> = BTreeMap::new();
    for module in set.iter() {
        *per_namespace.entry(module.namespace_id).or_default() += 1;
    }
    for (namespace_id, count) in &per_namespace {
        info!(namespace_id, modules = count, "namespace");
    }
    info!(total = filter.count, namespaces = per_namespace.len(), "active modules");
    Ok(())
}
