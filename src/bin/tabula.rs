//! Tabula CLI entry point.
//!
//! Applies a query string to a resource's items and prints the resulting
//! page as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tabula::config::ResourcesConfig;
use tabula::core::resource::ResourceTable;
use tabula::core::service::ResourceApi;
use tabula::core::sync::{InMemoryQueryPort, QueryPort};
use tabula::storage::InMemoryResourceApi;

#[derive(Debug, Parser)]
#[command(name = "tabula", version, about = "Filter, sort and paginate resource tables")]
struct Cli {
    /// Resources configuration file (YAML); built-in resources when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource id
    #[arg(short, long, required_unless_present = "list")]
    resource: Option<String>,

    /// JSON file holding the items; the resource's REST API is queried when omitted
    #[arg(short, long)]
    items: Option<PathBuf>,

    /// Query string carrying filters, sort and page
    #[arg(short, long, default_value = "")]
    query: String,

    /// List configured resources and exit
    #[arg(long)]
    list: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<ResourcesConfig> {
    match path {
        Some(path) => Ok(ResourcesConfig::from_yaml_file(path)?),
        None => Ok(ResourcesConfig::default_config()),
    }
}

fn load_items(path: &PathBuf) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read items from {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).context("items file is not valid JSON")?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("items")) {
            Some(Value::Array(items)) => Ok(items),
            _ => anyhow::bail!("items file must hold an array"),
        },
        _ => anyhow::bail!("items file must hold an array"),
    }
}

#[cfg(feature = "http")]
fn remote_api(resource: &tabula::config::ResourceConfig) -> Result<Arc<dyn ResourceApi>> {
    use tabula::client::{Credentials, RestResourceApi};
    Ok(Arc::new(RestResourceApi::from_config(resource, Credentials::default())?))
}

#[cfg(not(feature = "http"))]
fn remote_api(resource: &tabula::config::ResourceConfig) -> Result<Arc<dyn ResourceApi>> {
    anyhow::bail!("--items is required for '{}' without the http feature", resource.id)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    if cli.list {
        let resources: Vec<Value> = config
            .resources
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "label": r.label,
                    "sync": r.filters.sync,
                    "filters": r.filters.fields.iter().map(|f| &f.key).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    let id = cli.resource.context("--resource is required")?;
    let resource = config.require_resource(&id)?.clone();

    let api: Arc<dyn ResourceApi> = match &cli.items {
        Some(path) => Arc::new(InMemoryResourceApi::with_items(&resource.id, load_items(path)?)),
        None => remote_api(&resource)?,
    };

    let port = Arc::new(InMemoryQueryPort::with_query(&cli.query));
    let query_port: Arc<dyn QueryPort> = port.clone();
    let mut table = ResourceTable::with_settings(resource, &config.settings, api, Some(query_port))?;
    table.fetch().await?;

    let page = table.page();
    let output = json!({
        "resource": id,
        "query": port.query_string(),
        "filters": table.filter_state(),
        "activeFilters": table.filters().active_filters(),
        "pagination": page.pagination,
        "items": page.items,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
