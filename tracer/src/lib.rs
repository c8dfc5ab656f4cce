use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{self, Sampler},
};
use thiserror::Error;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("could not build otel pipeline: {0}")]
    Pipeline(String),
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

/// How log lines are rendered
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log lines go to stderr, stdout is left to the caller
#[derive(Clone, Debug)]
pub struct TracingOptions<'a> {
    pub service_name: &'static str,
    /// `EnvFilter` directives, e.g. `info,ort=warn`
    pub log_level: &'a str,
    pub format: LogFormat,
    /// OTLP collector; spans are only exported when set
    pub otel_endpoint: Option<&'a str>,
}

pub fn init_tracing(options: TracingOptions<'_>) -> Result<(), TracerError> {
    let env_filter = EnvFilter::new(options.log_level);

    let fmt_layer = match options.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_level(true)
            .with_current_span(true)
            .with_thread_names(true)
            .boxed(),
    };

    let otel_layer = match options.otel_endpoint {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    trace::config()
                        .with_sampler(Sampler::AlwaysOn)
                        .with_resource(Resource::new(vec![KeyValue::new(
                            "service.name",
                            options.service_name,
                        )])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .map_err(|e| TracerError::Pipeline(e.to_string()))?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer);

    set_global_default(subscriber).map_err(|_| TracerError::AlreadyInstalled)
}

pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
