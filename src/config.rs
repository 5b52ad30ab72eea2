use std::{
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
};

use clap::Parser;
use serde::Deserialize;

use crate::{
    DeploymentMode, logging::LogFormat, persisted_queries::DEFAULT_MANIFEST_PATH,
    query_gateway::GatewayPolicy,
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    FileRead { path: PathBuf, source: io::Error },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Parser, Debug, Default)]
#[command(name = "querygate", version, about = "GraphQL gateway with a persisted-query allowlist")]
pub struct Cli {
    /// YAML file with default settings; flags and environment variables win
    #[arg(long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "GATEWAY_ENV", value_enum)]
    pub environment: Option<DeploymentMode>,

    /// Reject raw queries outside production; any non-empty value enables it
    #[arg(
        long,
        env = "GRAPHQL_PERSISTED_QUERY_REQUIRED",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub persisted_query_required: Option<String>,

    /// Persisted query manifest (JSON object of hash to query text)
    #[arg(long, env = "GATEWAY_PERSISTED_QUERIES")]
    pub persisted_queries: Option<PathBuf>,

    /// Upstream GraphQL endpoint; the built-in schema is used when unset
    #[arg(long, env = "GATEWAY_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    #[arg(long, env = "GATEWAY_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "GATEWAY_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "GATEWAY_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    environment: Option<DeploymentMode>,
    persisted_query_required: Option<bool>,
    persisted_queries: Option<PathBuf>,
    upstream_url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    log_format: Option<LogFormat>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    pub environment: DeploymentMode,
    pub persisted_query_override: bool,
    pub persisted_queries: PathBuf,
    pub upstream_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let persisted_query_override = match cli.persisted_query_required {
            Some(value) => !value.trim().is_empty(),
            None => file.persisted_query_required.unwrap_or(false),
        };

        Ok(GatewayConfig {
            environment: cli.environment.or(file.environment).unwrap_or_default(),
            persisted_query_override,
            persisted_queries: cli
                .persisted_queries
                .or(file.persisted_queries)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            upstream_url: cli.upstream_url.or(file.upstream_url),
            host: cli
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
        })
    }

    /// Raw queries are refused in production or when explicitly requested.
    pub fn persisted_query_required(&self) -> bool {
        self.environment.is_production() || self.persisted_query_override
    }

    pub fn policy(&self) -> GatewayPolicy {
        GatewayPolicy {
            persisted_query_required: self.persisted_query_required(),
            mode: self.environment,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
