use opentelemetry::global;
use tracing::{info, warn};

use crate::config::TelemetryConfig;
use crate::error::{AggregatedError, TelemetryError};
use crate::pipeline::{resolve_pipeline, PipelineProvider, PipelineShutdown};
use crate::resource::build_base_resource;
use crate::trace::init_subscriber;

/// Running telemetry; call [`Telemetry::shutdown`] before exit to flush spans.
#[derive(Debug)]
pub struct Telemetry {
    provider: PipelineProvider,
    shutdown: PipelineShutdown,
    config_error: Option<AggregatedError>,
}

impl Telemetry {
    /// Resolves the pipeline and registers an SDK provider as the global one.
    fn assemble(config: &TelemetryConfig) -> Self {
        let resource = build_base_resource(config);
        let pipeline = resolve_pipeline(config.tracer_provider.as_ref(), resource);

        if let Some(sdk) = pipeline.provider.as_sdk() {
            global::set_tracer_provider(sdk.clone());
        }

        Self {
            provider: pipeline.provider,
            shutdown: pipeline.shutdown,
            config_error: pipeline.error,
        }
    }

    pub fn provider(&self) -> &PipelineProvider {
        &self.provider
    }

    /// Why tracing fell back to no-op, if it did.
    pub fn config_error(&self) -> Option<&AggregatedError> {
        self.config_error.as_ref()
    }

    pub fn shutdown(self) -> Result<(), TelemetryError> {
        self.shutdown.shutdown().map_err(TelemetryError::Shutdown)
    }
}

/// Initialize telemetry with config
///
/// An invalid pipeline does not fail initialization: tracing is disabled, the
/// problems are logged and kept in [`Telemetry::config_error`].
///
/// A pipeline with a `grpc` exporter must be initialized from inside a Tokio
/// runtime, since its channel is spawned onto the current one. Called from a
/// synchronous `main`, that entry fails with `failed to build grpc exporter`
/// and tracing is disabled.
pub fn init(config: &TelemetryConfig) -> Result<Telemetry, TelemetryError> {
    let telemetry = Telemetry::assemble(config);

    if let Err(err) = init_subscriber(&telemetry.provider, config) {
        // a subscriber is already installed, so this still reaches it
        if let Err(shutdown) = telemetry.shutdown() {
            warn!(error = %shutdown, "discarded trace pipeline failed to shut down");
        }
        return Err(err);
    }

    match &telemetry.config_error {
        Some(err) => warn!(
            service = %config.service_name,
            "tracing disabled by invalid configuration:\n{err}"
        ),
        None => info!(
            service = %config.service_name,
            tracing = !telemetry.provider.is_noop(),
            "telemetry initialized"
        ),
    }

    Ok(telemetry)
}

/// Initialize telemetry from environment, without a trace pipeline
pub fn init_from_env() -> Result<Telemetry, TelemetryError> {
    init(&TelemetryConfig::from_env())
}
