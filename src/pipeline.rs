//! Tracer provider assembly.
//!
//! [`resolve_pipeline`] never fails outright: an invalid configuration yields a
//! no-op provider together with every problem found, so the caller can keep
//! running untraced and report the error.

use std::sync::Arc;

use opentelemetry::global::{BoxedTracer, ObjectSafeTracerProvider};
use opentelemetry::trace::noop::NoopTracerProvider;
use opentelemetry::trace::TracerProvider;
use opentelemetry::InstrumentationScope;
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanLimits, SpanProcessor};
use opentelemetry_sdk::Resource;
use tracing::{debug, error, warn};

use crate::error::{AggregatedError, ErrorAggregator, ResolveError};
use crate::model::{SpanLimitsConfig, TracerProviderConfig};
use crate::processor::{resolve_processor, ResolvedProcessor, SharedProcessor};
use crate::validate::optional_non_negative;

/// Outcome of resolving a tracer provider configuration.
#[derive(Debug)]
pub struct Pipeline {
    pub provider: PipelineProvider,
    pub shutdown: PipelineShutdown,
    /// Every problem found; set only when `provider` fell back to no-op.
    pub error: Option<AggregatedError>,
}

impl Pipeline {
    fn noop(error: Option<AggregatedError>) -> Self {
        Self {
            provider: PipelineProvider::Noop(NoopTracerProvider::new()),
            shutdown: PipelineShutdown::default(),
            error,
        }
    }

    /// Processors feeding the provider, in configured order.
    pub fn processors(&self) -> impl Iterator<Item = &ResolvedProcessor> {
        self.shutdown.processors.iter().map(|p| &**p)
    }
}

/// Tracer provider handed out by the pipeline; always usable.
#[derive(Debug, Clone)]
pub enum PipelineProvider {
    Noop(NoopTracerProvider),
    Sdk(SdkTracerProvider),
}

impl PipelineProvider {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_))
    }

    pub fn as_sdk(&self) -> Option<&SdkTracerProvider> {
        match self {
            Self::Sdk(provider) => Some(provider),
            Self::Noop(_) => None,
        }
    }
}

impl TracerProvider for PipelineProvider {
    type Tracer = BoxedTracer;

    fn tracer_with_scope(&self, scope: InstrumentationScope) -> Self::Tracer {
        match self {
            Self::Noop(provider) => BoxedTracer::new(provider.boxed_tracer(scope)),
            Self::Sdk(provider) => BoxedTracer::new(provider.boxed_tracer(scope)),
        }
    }
}

/// Shuts the pipeline down. Consumed on use, so it runs at most once.
#[derive(Debug, Default)]
pub struct PipelineShutdown {
    provider: Option<SdkTracerProvider>,
    processors: Vec<Arc<ResolvedProcessor>>,
}

impl PipelineShutdown {
    /// Shuts every processor down in configured order, then the provider.
    ///
    /// A failing processor does not stop the others; all failures are
    /// returned together.
    pub fn shutdown(self) -> Result<(), AggregatedError> {
        let result = shutdown_all(
            self.processors
                .iter()
                .map(|p| (p.kind().as_str(), &**p as &dyn SpanProcessor)),
        );

        if let Some(provider) = self.provider {
            // processors are already down, this only marks the provider
            match provider.shutdown() {
                Ok(()) | Err(OTelSdkError::AlreadyShutdown) => {}
                Err(err) => warn!(error = %err, "tracer provider shutdown reported an error"),
            }
        }

        result
    }
}

fn shutdown_all<'a>(
    processors: impl IntoIterator<Item = (&'static str, &'a dyn SpanProcessor)>,
) -> Result<(), AggregatedError> {
    let mut errors = ErrorAggregator::new();
    for (index, (kind, processor)) in processors.into_iter().enumerate() {
        if let Err(err) = processor.shutdown() {
            error!(processor = kind, index, error = %err, "span processor shutdown failed");
            errors.push(ResolveError::Shutdown {
                processor: kind,
                index,
                reason: err.to_string(),
            });
        }
    }
    errors.finish()
}

/// Builds the tracer provider described by `config`.
///
/// - no config, or no processors: no-op provider, no error
/// - any entry invalid: no-op provider, every entry's errors in order
/// - otherwise: an SDK provider with `resource` and the processors in order
pub fn resolve_pipeline(config: Option<&TracerProviderConfig>, resource: Resource) -> Pipeline {
    let Some(config) = config else {
        debug!("no tracer provider configured");
        return Pipeline::noop(None);
    };

    let mut errors = ErrorAggregator::new();
    let mut processors = Vec::with_capacity(config.processors.len());
    for entry in &config.processors {
        if let Some(processor) = errors.check(resolve_processor(entry)) {
            processors.push(processor);
        }
    }
    let limits = config
        .limits
        .as_ref()
        .and_then(|limits| errors.check(span_limits(limits)));

    if let Err(error) = errors.finish() {
        warn!(
            errors = error.len(),
            "invalid tracer provider configuration, tracing disabled: {error}"
        );
        discard(processors);
        return Pipeline::noop(Some(error));
    }

    if processors.is_empty() {
        debug!("no span processors configured");
        return Pipeline::noop(None);
    }

    let mut builder = SdkTracerProvider::builder().with_resource(resource.clone());
    if let Some(limits) = limits {
        builder = builder.with_span_limits(limits);
    }

    let mut shared = Vec::with_capacity(processors.len());
    for mut processor in processors {
        // the provider cannot reach a shared processor's resource
        processor.set_resource(&resource);
        let processor = Arc::new(processor);
        builder = builder.with_span_processor(SharedProcessor(Arc::clone(&processor)));
        shared.push(processor);
    }

    let provider = builder.build();
    debug!(processors = shared.len(), "tracer provider built");

    Pipeline {
        provider: PipelineProvider::Sdk(provider.clone()),
        shutdown: PipelineShutdown {
            provider: Some(provider),
            processors: shared,
        },
        error: None,
    }
}

// Processors built alongside a failing sibling never see a span.
fn discard(processors: Vec<ResolvedProcessor>) {
    for processor in processors {
        if let Err(err) = processor.shutdown() {
            debug!(error = %err, "discarded span processor failed to shut down");
        }
    }
}

fn span_limits(config: &SpanLimitsConfig) -> Result<SpanLimits, AggregatedError> {
    let mut errors = ErrorAggregator::new();
    let mut limits = SpanLimits::default();

    for (field, value, slot) in [
        (
            "attribute count limit",
            config.attribute_count_limit,
            &mut limits.max_attributes_per_span,
        ),
        (
            "event count limit",
            config.event_count_limit,
            &mut limits.max_events_per_span,
        ),
        (
            "link count limit",
            config.link_count_limit,
            &mut limits.max_links_per_span,
        ),
        (
            "event attribute count limit",
            config.event_attribute_count_limit,
            &mut limits.max_attributes_per_event,
        ),
        (
            "link attribute count limit",
            config.link_attribute_count_limit,
            &mut limits.max_attributes_per_link,
        ),
    ] {
        if let Some(Some(value)) = errors.check(optional_non_negative(field, value)) {
            *slot = u32::try_from(value).unwrap_or(u32::MAX);
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }
    Ok(limits)
}
