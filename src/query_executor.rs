use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::ExecutionRequest;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Failed to send request to {url}: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("Failed to parse response from {url}: {source}")]
    Response { url: String, source: reqwest::Error },
    #[error("{0}")]
    Internal(String),
}

/// Runs an already-vetted operation and returns the GraphQL result envelope.
///
/// GraphQL-level failures belong inside the returned value; `Err` is reserved
/// for failures the executor could not express as a result.
#[async_trait]
pub trait QueryExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutorError>;
}

/// Forwards operations to an upstream GraphQL service over HTTP.
pub struct HttpQueryExecutor {
    client: reqwest::Client,
    url: String,
}

impl HttpQueryExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        HttpQueryExecutor {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutorError> {
        let request_body = json!({
            "query": request.query,
            "variables": request.variables,
            "operationName": request.operation_name,
            "extensions": request.context.extensions,
        });

        debug!(url = %self.url, "forwarding operation upstream");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|source| ExecutorError::Request {
                url: self.url.clone(),
                source,
            })?;

        // Non-2xx upstream responses still carry a GraphQL envelope, so the
        // status is not inspected.
        response
            .json::<Value>()
            .await
            .map_err(|source| ExecutorError::Response {
                url: self.url.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionContext;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    // Answers a single request with `content_type`/`body` and yields the JSON
    // body it received.
    async fn upstream_once(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/graphql", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];

            let header_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers were read");
                received.extend_from_slice(&chunk[..n]);
                if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&received[..header_end]).to_string();
            let content_length = headers
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .map(|(_, value)| value.trim().parse::<usize>().unwrap())
                .unwrap_or(0);

            while received.len() < header_end + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body was read");
                received.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            serde_json::from_slice(&received[header_end..header_end + content_length]).unwrap()
        });

        (url, handle)
    }

    fn persisted_request() -> ExecutionRequest {
        let mut extensions = serde_json::Map::new();
        extensions.insert("persistedQuery".to_string(), json!({ "sha256Hash": "h" }));
        let mut variables = serde_json::Map::new();
        variables.insert("id".to_string(), json!(1));

        ExecutionRequest {
            query: Some("query Q { testField }".to_string()),
            variables,
            context: ExecutionContext { extensions },
            operation_name: Some("Q".to_string()),
        }
    }

    #[tokio::test]
    async fn forwards_operation_and_returns_error_envelope_verbatim() {
        let (url, upstream) = upstream_once(
            "500 Internal Server Error",
            "application/json",
            r#"{"errors":[{"message":"upstream says no"}]}"#,
        )
        .await;

        let result = HttpQueryExecutor::new(url)
            .execute(persisted_request())
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({ "errors": [{ "message": "upstream says no" }] })
        );
        assert_eq!(
            upstream.await.unwrap(),
            json!({
                "query": "query Q { testField }",
                "variables": { "id": 1 },
                "operationName": "Q",
                "extensions": { "persistedQuery": { "sha256Hash": "h" } },
            })
        );
    }

    #[tokio::test]
    async fn non_json_upstream_body_is_a_response_error() {
        let (url, upstream) = upstream_once("200 OK", "text/plain", "not json").await;

        let err = HttpQueryExecutor::new(url.clone())
            .execute(persisted_request())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Response { .. }));
        assert!(err.to_string().contains(&url));
        upstream.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_request_error() {
        // Port 9 (discard) on localhost is not expected to accept connections.
        let executor = HttpQueryExecutor::new("http://127.0.0.1:9/graphql");
        let request = ExecutionRequest {
            query: Some("query { testField }".to_string()),
            variables: Default::default(),
            context: ExecutionContext::default(),
            operation_name: None,
        };

        let err = executor.execute(request).await.unwrap_err();

        assert!(matches!(err, ExecutorError::Request { .. }));
        assert!(err.to_string().contains("http://127.0.0.1:9/graphql"));
    }
}
