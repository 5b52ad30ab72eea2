use serde::Deserialize;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn configure_logging(format: LogFormat) {
    let timer = UtcTime::rfc_3339();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match format {
        LogFormat::Json => fmt::Layer::<Registry>::default()
            .json()
            .with_timer(timer)
            .boxed(),
        LogFormat::Pretty => fmt::Layer::<Registry>::default()
            .compact()
            .with_timer(timer)
            .boxed(),
    };

    let registry = tracing_subscriber::registry();
    let registry = registry.with(layer).with(filter.boxed());
    registry.init();
}
