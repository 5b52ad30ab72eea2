use std::{backtrace::Backtrace, sync::Arc};

use http::StatusCode;
use serde_json::{Map, Value, json};
use tracing::{debug, error, trace, warn};

use crate::{
    DeploymentMode, ExecutionContext, ExecutionRequest, HttpMethod, IncomingRequest, JsonObject,
    RawInput,
    persisted_queries::PersistedQueryMap,
    query_executor::{ExecutorError, QueryExecutor},
};

pub const QUERY_NOT_ALLOWED: &str = "Query is not allowed. Use query hash instead.";
pub const MUTATION_OVER_GET: &str = "Mutation must be requested with POST.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to parse {field} JSON: {source}")]
    ParseError {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("Unexpected parameter for {field}: {value}")]
    InvalidArgument { field: &'static str, value: String },
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
    #[error("Failed to read request body: {0}")]
    BodyRead(String),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MalformedBody(_) | GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl GatewayResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn policy_violation(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "errors": [{ "message": message }], "data": {} }),
        }
    }

    /// Detailed failure report; only ever rendered in development.
    pub fn development_error(err: &GatewayError, backtrace: &Backtrace) -> Self {
        let frames: Vec<String> = backtrace
            .to_string()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            status: err.status_code(),
            body: json!({
                "errors": [{ "message": err.to_string(), "backtrace": frames }],
                "data": {},
            }),
        }
    }

    pub fn generic_error(err: &GatewayError) -> Self {
        let status = err.status_code();
        let message = status.canonical_reason().unwrap_or("Internal Server Error");
        Self {
            status,
            body: json!({ "errors": [{ "message": message }], "data": {} }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GatewayPolicy {
    pub persisted_query_required: bool,
    pub mode: DeploymentMode,
}

pub struct QueryGateway {
    persisted_queries: Arc<PersistedQueryMap>,
    query_executor: Box<dyn QueryExecutor + Send + Sync>,
    policy: GatewayPolicy,
}

impl QueryGateway {
    pub fn new(
        persisted_queries: Arc<PersistedQueryMap>,
        query_executor: Box<dyn QueryExecutor + Send + Sync>,
        policy: GatewayPolicy,
    ) -> Self {
        QueryGateway {
            persisted_queries,
            query_executor,
            policy,
        }
    }

    pub fn policy(&self) -> GatewayPolicy {
        self.policy
    }

    /// Applies the persisted-query policy and delegates to the executor.
    ///
    /// Policy violations come back as `Ok` responses with status 400. Other
    /// failures are rendered in development and returned as `Err` otherwise,
    /// leaving the generic rendering to the server.
    pub async fn handle(&self, request: IncomingRequest) -> Result<GatewayResponse, GatewayError> {
        debug!(
            method = ?request.method,
            operation_name = ?request.operation_name,
            "handling GraphQL request"
        );

        if self.policy.persisted_query_required
            && request.query.as_deref().is_some_and(|query| !query.is_empty())
        {
            warn!("raw query rejected, persisted queries are required");
            return Ok(GatewayResponse::policy_violation(QUERY_NOT_ALLOWED));
        }

        match self.execute(request).await {
            Ok(response) => Ok(response),
            Err(err) if self.policy.mode.is_development() => {
                let backtrace = Backtrace::force_capture();
                error!("{}", err);
                error!("{}", backtrace);
                Ok(GatewayResponse::development_error(&err, &backtrace))
            }
            Err(err) => Err(err),
        }
    }

    async fn execute(&self, request: IncomingRequest) -> Result<GatewayResponse, GatewayError> {
        let extensions = normalize_input("extensions", request.extensions)?;
        let query = self.resolve_query(&extensions, request.query);

        if request.method == HttpMethod::Get && query.as_deref().is_some_and(is_mutation) {
            warn!("mutation rejected over GET");
            return Ok(GatewayResponse::policy_violation(MUTATION_OVER_GET));
        }

        let variables = normalize_input("variables", request.variables)?;

        let execution_request = ExecutionRequest {
            query,
            variables,
            context: ExecutionContext { extensions },
            operation_name: request.operation_name,
        };

        let result = self.query_executor.execute(execution_request).await?;
        Ok(GatewayResponse::ok(result))
    }

    fn resolve_query(&self, extensions: &JsonObject, query: Option<String>) -> Option<String> {
        let persisted = persisted_query_hash(extensions).and_then(|hash| {
            let found = self.persisted_queries.get(hash);
            trace!(hash, found = found.is_some(), "persisted query lookup");
            found
        });

        persisted.map(str::to_owned).or(query)
    }
}

fn persisted_query_hash(extensions: &JsonObject) -> Option<&str> {
    extensions
        .get("persistedQuery")?
        .get("sha256Hash")?
        .as_str()
}

/// Cheap pre-parse check: a prefix match, not a document parse.
fn is_mutation(query: &str) -> bool {
    query.trim_start().starts_with("mutation")
}

/// Turns a `variables` or `extensions` parameter into a JSON object.
pub fn normalize_input(field: &'static str, raw: RawInput) -> Result<JsonObject, GatewayError> {
    match raw {
        RawInput::Missing => Ok(Map::new()),
        RawInput::Text(text) if text.trim().is_empty() => Ok(Map::new()),
        RawInput::Text(text) => {
            let value: Value = serde_json::from_str(&text)
                .map_err(|source| GatewayError::ParseError { field, source })?;
            match value {
                Value::Null => Ok(Map::new()),
                Value::Object(fields) => Ok(fields),
                other => Err(GatewayError::InvalidArgument {
                    field,
                    value: other.to_string(),
                }),
            }
        }
        RawInput::Structured(fields) => Ok(fields),
        RawInput::Unsupported(value) => Err(GatewayError::InvalidArgument {
            field,
            value: value.to_string(),
        }),
    }
}
