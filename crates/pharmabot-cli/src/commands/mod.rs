mod ask;
mod catalog;
mod chat;
mod probe;
mod status;

use std::sync::Arc;

use pharmabot_core::{
    open_catalog_source, AppConfig, Catalog, CatalogConfig, CredentialPool, FailoverClient,
    GeminiGenerator, HttpClient, Pharmabot, ReqwestHttpClient,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub summary: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub latency_ms: u64,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            summary: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Ask(args) => ask::run(args, &assistant(cli)?).await,
        Command::Chat => chat::run(&assistant(cli)?, cli.format, cli.pretty).await,
        Command::Status => status::run(&pool(cli)?),
        Command::Probe(args) => probe::run(args, &failover_client(cli)?).await,
        Command::Catalog(args) => {
            let config = AppConfig::load_settings(cli.config.as_deref())?;
            let catalog = Catalog::open(catalog_config(cli, &config))?;
            catalog::run(args, &catalog, &config)
        }
    }
}

fn catalog_config(cli: &Cli, config: &AppConfig) -> CatalogConfig {
    match &cli.catalog {
        Some(path) => CatalogConfig::at_path(path.clone()),
        None => config.catalog_config(),
    }
}

fn http_client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new())
}

fn assistant(cli: &Cli) -> Result<Pharmabot, CliError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let catalog = answer_source(cli, &config)?;
    Ok(Pharmabot::from_config(&config, Arc::new(catalog), http_client())?)
}

/// The catalog `ask` and `chat` read from. It must already exist.
fn answer_source(cli: &Cli, config: &AppConfig) -> Result<Catalog, CliError> {
    Ok(open_catalog_source(catalog_config(cli, config))?)
}

fn pool(cli: &Cli) -> Result<Arc<CredentialPool>, CliError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    Ok(Arc::new(CredentialPool::new(
        config.credentials(),
        config.pool_config(),
    )?))
}

fn failover_client(cli: &Cli) -> Result<FailoverClient, CliError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let pool = Arc::new(CredentialPool::new(
        config.credentials(),
        config.pool_config(),
    )?);
    let generator = GeminiGenerator::new(http_client())
        .with_base_url(config.api_base_url.as_str())
        .with_timeout_ms(config.request_timeout_ms);
    Ok(FailoverClient::new(pool, Arc::new(generator)))
}
