use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, TelemetryConfig};
use crate::error::TelemetryError;
use crate::pipeline::PipelineProvider;

/// Build the OpenTelemetry tracing layer
pub fn build_otel_layer<S>(
    provider: &SdkTracerProvider,
    service_name: &str,
) -> OpenTelemetryLayer<S, SdkTracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let tracer = provider.tracer(service_name.to_string());
    tracing_opentelemetry::layer().with_tracer(tracer)
}

/// Build the JSON fmt layer, one object per event
pub fn build_json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_ansi(false)
}

/// Build the pretty fmt layer for human-readable output
pub fn build_pretty_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .pretty()
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
}

/// Build the env filter: `RUST_LOG` when set and valid, else the configured level
pub fn build_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global tracing subscriber.
///
/// Spans reach OpenTelemetry only when `provider` is an SDK provider; with the
/// no-op provider only local logs are written.
pub fn init_subscriber(
    provider: &PipelineProvider,
    config: &TelemetryConfig,
) -> Result<(), TelemetryError> {
    let otel_layer = provider
        .as_sdk()
        .map(|sdk| build_otel_layer(sdk, &config.service_name));
    let filter = build_filter(config);

    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(otel_layer)
            .with(build_pretty_layer())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(otel_layer)
            .with(build_json_layer())
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::resolve_pipeline;
    use opentelemetry_sdk::Resource;

    #[test]
    fn build_filter_uses_config_log_level() {
        let config = TelemetryConfig::new("test", "1.0").with_log_level("debug");

        let filter = build_filter(&config);

        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn build_filter_defaults_to_info() {
        let config = TelemetryConfig::new("test", "1.0");

        let filter = build_filter(&config);

        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn build_otel_layer_creates_layer() {
        use tracing_subscriber::Registry;

        let provider = SdkTracerProvider::builder().build();

        let _layer = build_otel_layer::<Registry>(&provider, "test-service");
    }

    #[test]
    fn second_install_is_rejected() {
        let provider = resolve_pipeline(None, Resource::builder_empty().build()).provider;
        let config = TelemetryConfig::new("test", "1.0").with_log_format(LogFormat::Json);

        // another test may have installed the subscriber already
        let _ = init_subscriber(&provider, &config);
        let err = init_subscriber(&provider, &config).unwrap_err();

        assert!(matches!(err, TelemetryError::Subscriber(_)));
    }
}
