use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{
    DeploymentMode, HttpMethod,
    query_gateway::{GatewayError, GatewayResponse, QueryGateway},
    request::read_incoming_request,
};

pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

pub struct AppState {
    pub gateway: QueryGateway,
}

impl AppState {
    pub fn new(gateway: QueryGateway) -> Self {
        AppState { gateway }
    }

    fn mode(&self) -> DeploymentMode {
        self.gateway.policy().mode
    }
}

// Create a response body from a string
pub fn full<T: Into<Bytes>>(value: T) -> ResponseBody {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

const GRAPHIQL_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
  <title>GraphiQL - Querygate</title>
  <link href="https://unpkg.com/graphiql@1.5.0/graphiql.min.css" rel="stylesheet" />
  <style>
    body { margin: 0; padding: 0; height: 100vh; }
    #graphiql { height: 100vh; }
  </style>
</head>
<body>
  <div id="graphiql"></div>

  <script src="https://unpkg.com/react@17.0.2/umd/react.production.min.js"></script>
  <script src="https://unpkg.com/react-dom@17.0.2/umd/react-dom.production.min.js"></script>
  <script src="https://unpkg.com/graphiql@1.5.0/graphiql.min.js"></script>
  <script>
    function graphQLFetcher(graphQLParams) {
      return fetch('/graphql', {
        method: 'post',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(graphQLParams),
      }).then(response => response.json());
    }

    ReactDOM.render(
      React.createElement(GraphiQL, { fetcher: graphQLFetcher }),
      document.getElementById('graphiql')
    );
  </script>
</body>
</html>
"#;

/// Routes a request to the gateway, the health check or the IDE.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET | &Method::HEAD, "/graphql") => {
            graphql_response(HttpMethod::Get, req, &state).await
        }
        (&Method::POST, "/graphql") => graphql_response(HttpMethod::Post, req, &state).await,
        (_, "/graphql") => Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(ALLOW, "GET, HEAD, POST")
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::GET, "/up") => json_response(StatusCode::OK, &json!({ "status": "ok" })),

        (&Method::GET, "/graphiql") if state.mode().is_development() => Response::builder()
            .header(CONTENT_TYPE, "text/html")
            .body(full(GRAPHIQL_HTML))
            .unwrap_or_else(|_| internal_server_error()),

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(full("Not Found"))
            .unwrap_or_else(|_| internal_server_error()),
    };

    Ok(response)
}

async fn graphql_response<B>(
    method: HttpMethod,
    req: Request<B>,
    state: &AppState,
) -> Response<ResponseBody>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let result = match read_incoming_request(method, req).await {
        Ok(incoming) => state.gateway.handle(incoming).await,
        Err(err) => Err(err),
    };

    let response = match result {
        Ok(response) => response,
        Err(err) => render_unhandled(&err, state.mode()),
    };

    json_response(response.status, &response.body)
}

/// Fallback rendering for failures the gateway did not handle itself.
pub fn render_unhandled(err: &GatewayError, mode: DeploymentMode) -> GatewayResponse {
    error!(error = %err, "unhandled GraphQL request failure");
    if mode.is_development() {
        GatewayResponse::development_error(err, &std::backtrace::Backtrace::force_capture())
    } else {
        GatewayResponse::generic_error(err)
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<ResponseBody> {
    let json = serde_json::to_string(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(json))
        .unwrap_or_else(|_| internal_server_error())
}

// Create a standard internal server error response
fn internal_server_error() -> Response<ResponseBody> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Accepts connections until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));

            match hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                Ok(_) => debug!(%peer, "connection closed"),
                Err(e) => error!(%peer, "error processing connection: {}", e),
            }
        });
    }
}
