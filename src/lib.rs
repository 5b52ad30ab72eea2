pub mod config;
pub mod local_schema;
pub mod logging;
pub mod persisted_queries;
pub mod query_executor;
pub mod query_gateway;
pub mod request;
pub mod server;

pub use config::{Cli, GatewayConfig};
pub use local_schema::LocalSchemaExecutor;
pub use persisted_queries::PersistedQueryMap;
pub use query_executor::{HttpQueryExecutor, QueryExecutor};
pub use query_gateway::{GatewayError, GatewayPolicy, GatewayResponse, QueryGateway};
pub use server::AppState;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Development,
    Test,
    Production,
}

impl DeploymentMode {
    pub fn is_development(self) -> bool {
        self == DeploymentMode::Development
    }

    pub fn is_production(self) -> bool {
        self == DeploymentMode::Production
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// Shape a `variables` or `extensions` parameter arrived in.
///
/// Query strings and form bodies only ever produce `Text`; JSON bodies may
/// carry any of the variants.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "Option<Value>")]
pub enum RawInput {
    #[default]
    Missing,
    Text(String),
    Structured(JsonObject),
    Unsupported(Value),
}

impl From<Option<Value>> for RawInput {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => RawInput::Missing,
            Some(Value::String(text)) => RawInput::Text(text),
            Some(Value::Object(fields)) => RawInput::Structured(fields),
            Some(other) => RawInput::Unsupported(other),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IncomingRequest {
    pub query: Option<String>,
    pub variables: RawInput,
    pub operation_name: Option<String>,
    pub extensions: RawInput,
    pub method: HttpMethod,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub extensions: JsonObject,
}

/// What a [`QueryExecutor`] receives once the gateway has applied its policy.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRequest {
    pub query: Option<String>,
    pub variables: JsonObject,
    pub context: ExecutionContext,
    pub operation_name: Option<String>,
}
