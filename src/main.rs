use std::sync::Arc;

use clap::Parser;
use querygate::{
    AppState, Cli, GatewayConfig, HttpQueryExecutor, LocalSchemaExecutor, PersistedQueryMap,
    QueryExecutor, QueryGateway, logging::configure_logging, server::serve,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::resolve(Cli::parse())?;
    configure_logging(config.log_format);

    let persisted_queries = Arc::new(PersistedQueryMap::from_file(&config.persisted_queries)?);

    let query_executor: Box<dyn QueryExecutor + Send + Sync> = match &config.upstream_url {
        Some(url) => {
            info!(url = %url, "forwarding operations upstream");
            Box::new(HttpQueryExecutor::new(url.clone()))
        }
        None => {
            info!("executing operations against the built-in schema");
            Box::new(LocalSchemaExecutor::new())
        }
    };

    if config.persisted_query_required() {
        info!("persisted queries are required, raw queries will be rejected");
        if persisted_queries.is_empty() {
            warn!("persisted query manifest is empty, no operation can be resolved");
        }
    }

    let gateway = QueryGateway::new(persisted_queries, query_executor, config.policy());
    let state = Arc::new(AppState::new(gateway));

    let listener = TcpListener::bind(config.address()).await?;
    let addr = listener.local_addr()?;
    info!(environment = ?config.environment, "GraphQL gateway starting on http://{}", addr);
    if config.environment.is_development() {
        info!("GraphiQL UI available at http://{}/graphiql", addr);
    }

    serve(listener, state, shutdown_signal()).await?;
    Ok(())
}
