//! Span processor resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::Context;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SimpleSpanProcessor, Span, SpanData, SpanProcessor,
};
use opentelemetry_sdk::Resource;
use tracing::debug;

use crate::error::{AggregatedError, ErrorAggregator, ResolveError};
use crate::exporter::{plan_exporter, resolve_exporter, ExporterKind, ResolvedExporter};
use crate::model::{BatchSpanProcessorConfig, ProcessorVariant, Selection, SpanProcessorConfig};
use crate::validate::optional_non_negative;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Simple,
    Batch,
}

impl ProcessorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Batch => "batch",
        }
    }
}

/// A constructed span processor and the exporter it feeds.
///
/// Shutdown runs at most once; later calls succeed without touching the
/// processor.
#[derive(Debug)]
pub struct ResolvedProcessor {
    kind: ProcessorKind,
    exporter: ExporterKind,
    endpoint: Option<String>,
    inner: Inner,
    is_shutdown: AtomicBool,
}

#[derive(Debug)]
enum Inner {
    Simple(SimpleSpanProcessor<ResolvedExporter>),
    Batch(BatchSpanProcessor),
}

impl ResolvedProcessor {
    fn wrap(
        kind: ProcessorKind,
        exporter: ResolvedExporter,
        build: impl FnOnce(ResolvedExporter) -> Inner,
    ) -> Self {
        Self {
            kind,
            exporter: exporter.kind(),
            endpoint: exporter.endpoint().map(str::to_string),
            inner: build(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> ProcessorKind {
        self.kind
    }

    pub fn exporter_kind(&self) -> ExporterKind {
        self.exporter
    }

    pub fn exporter_endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    fn processor(&self) -> &dyn SpanProcessor {
        match &self.inner {
            Inner::Simple(p) => p,
            Inner::Batch(p) => p,
        }
    }
}

impl SpanProcessor for ResolvedProcessor {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.processor().on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        self.processor().on_end(span);
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.processor().force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.processor().shutdown_with_timeout(timeout)
    }

    fn set_resource(&mut self, resource: &Resource) {
        match &mut self.inner {
            Inner::Simple(p) => p.set_resource(resource),
            Inner::Batch(p) => p.set_resource(resource),
        }
    }
}

/// Hands a processor to the tracer provider while the caller keeps a handle
/// for ordered shutdown.
#[derive(Debug)]
pub(crate) struct SharedProcessor<P>(pub(crate) Arc<P>);

impl<P: SpanProcessor> SpanProcessor for SharedProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.0.on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        self.0.on_end(span);
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.0.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.0.shutdown_with_timeout(timeout)
    }

    // The resource is applied before sharing; this only reaches an unshared processor.
    fn set_resource(&mut self, resource: &Resource) {
        if let Some(inner) = Arc::get_mut(&mut self.0) {
            inner.set_resource(resource);
        }
    }
}

/// Batch settings after validation; `None` keeps the SDK default.
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSettings {
    max_export_batch_size: Option<u64>,
    export_timeout: Option<u64>,
    max_queue_size: Option<u64>,
    schedule_delay: Option<u64>,
}

/// Resolves one processor entry.
///
/// All independent checks of the entry run, so the error lists every problem
/// found in it.
pub fn resolve_processor(config: &SpanProcessorConfig) -> Result<ResolvedProcessor, AggregatedError> {
    match config.selection() {
        Selection::Empty => Err(ResolveError::NoProcessorType.into()),
        Selection::Multiple(variants) => {
            let mut errors = ErrorAggregator::new();
            errors.push(ResolveError::MultipleProcessorTypes);
            for variant in variants {
                validate(variant, &mut errors);
            }
            Err(errors.into())
        }
        Selection::One(ProcessorVariant::Simple(simple)) => {
            let exporter = resolve_exporter(&simple.exporter)?;
            Ok(simple_processor(exporter))
        }
        Selection::One(ProcessorVariant::Batch(batch)) => resolve_batch(batch),
    }
}

// Checks a variant without constructing its exporter.
fn validate(variant: ProcessorVariant<'_>, errors: &mut ErrorAggregator) {
    match variant {
        ProcessorVariant::Simple(simple) => {
            errors.check(plan_exporter(&simple.exporter));
        }
        ProcessorVariant::Batch(batch) => {
            errors.check(batch_settings(batch));
            errors.check(plan_exporter(&batch.exporter));
        }
    }
}

fn resolve_batch(config: &BatchSpanProcessorConfig) -> Result<ResolvedProcessor, AggregatedError> {
    let mut errors = ErrorAggregator::new();
    let settings = errors.check(batch_settings(config));
    let plan = errors.check(plan_exporter(&config.exporter));

    match (settings, plan) {
        (Some(settings), Some(plan)) => {
            let exporter = plan.build()?;
            Ok(batch_processor(settings, exporter))
        }
        _ => Err(errors.into()),
    }
}

fn batch_settings(config: &BatchSpanProcessorConfig) -> Result<BatchSettings, AggregatedError> {
    let mut errors = ErrorAggregator::new();
    let max_export_batch_size =
        errors.check(optional_non_negative("batch size", config.max_export_batch_size));
    let export_timeout = errors.check(optional_non_negative("export timeout", config.export_timeout));
    let max_queue_size = errors.check(optional_non_negative("queue size", config.max_queue_size));
    let schedule_delay = errors.check(optional_non_negative("schedule delay", config.schedule_delay));

    if !errors.is_empty() {
        return Err(errors.into());
    }

    Ok(BatchSettings {
        max_export_batch_size: max_export_batch_size.flatten(),
        export_timeout: export_timeout.flatten(),
        max_queue_size: max_queue_size.flatten(),
        schedule_delay: schedule_delay.flatten(),
    })
}

fn simple_processor(exporter: ResolvedExporter) -> ResolvedProcessor {
    debug!(exporter = ?exporter.kind(), "resolved simple span processor");
    ResolvedProcessor::wrap(ProcessorKind::Simple, exporter, |exporter| {
        Inner::Simple(SimpleSpanProcessor::new(exporter))
    })
}

fn batch_processor(settings: BatchSettings, exporter: ResolvedExporter) -> ResolvedProcessor {
    let mut config = BatchConfigBuilder::default();

    // zero keeps the default: a zero-capacity queue or zero delay never exports
    if let Some(size) = positive(settings.max_queue_size) {
        config = config.with_max_queue_size(to_usize(size));
    }
    if let Some(size) = positive(settings.max_export_batch_size) {
        config = config.with_max_export_batch_size(to_usize(size));
    }
    if let Some(millis) = positive(settings.schedule_delay) {
        config = config.with_scheduled_delay(Duration::from_millis(millis));
    }
    if let Some(millis) = positive(settings.export_timeout) {
        config = config.with_max_export_timeout(Duration::from_millis(millis));
    }

    debug!(exporter = ?exporter.kind(), ?settings, "resolved batch span processor");
    ResolvedProcessor::wrap(ProcessorKind::Batch, exporter, |exporter| {
        Inner::Batch(
            BatchSpanProcessor::builder(exporter)
                .with_batch_config(config.build())
                .build(),
        )
    })
}

fn positive(value: Option<u64>) -> Option<u64> {
    value.filter(|&v| v > 0)
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::OtlpProtocol;
    use crate::model::{
        ConsoleExporterConfig, OtlpExporterConfig, SimpleSpanProcessorConfig, SpanExporterConfig,
    };

    fn messages(config: &SpanProcessorConfig) -> Vec<String> {
        resolve_processor(config).unwrap_err().messages()
    }

    #[test]
    fn empty_entry_is_rejected() {
        assert_eq!(
            messages(&SpanProcessorConfig::default()),
            vec!["unsupported span processor type, must be one of simple or batch"]
        );
    }

    #[test]
    fn simple_without_exporter_is_rejected() {
        let config = SpanProcessorConfig::simple(SpanExporterConfig::default());

        assert_eq!(messages(&config), vec!["no valid span exporter"]);
    }

    #[test]
    fn simple_with_console_resolves() {
        let processor =
            resolve_processor(&SpanProcessorConfig::simple(SpanExporterConfig::console())).unwrap();

        assert_eq!(processor.kind(), ProcessorKind::Simple);
        assert_eq!(processor.exporter_kind(), ExporterKind::Console);
        assert!(processor.shutdown().is_ok());
    }

    #[test]
    fn batch_with_zero_values_wraps_console() {
        let config = SpanProcessorConfig::batch(
            BatchSpanProcessorConfig::new(SpanExporterConfig::console())
                .with_max_export_batch_size(0)
                .with_export_timeout(0)
                .with_max_queue_size(0)
                .with_schedule_delay(0),
        );

        let processor = resolve_processor(&config).unwrap();

        assert_eq!(processor.kind(), ProcessorKind::Batch);
        assert_eq!(processor.exporter_kind(), ExporterKind::Console);
        assert!(processor.shutdown().is_ok());
    }

    #[test]
    fn batch_reports_every_negative_field_in_order() {
        let config = SpanProcessorConfig::batch(
            BatchSpanProcessorConfig::new(SpanExporterConfig::console())
                .with_max_export_batch_size(-1)
                .with_export_timeout(-1)
                .with_max_queue_size(-1)
                .with_schedule_delay(-1),
        );

        assert_eq!(
            messages(&config),
            vec![
                "invalid batch size -1",
                "invalid export timeout -1",
                "invalid queue size -1",
                "invalid schedule delay -1",
            ]
        );
    }

    #[test]
    fn batch_reports_field_and_exporter_failures_together() {
        let config = SpanProcessorConfig::batch(
            BatchSpanProcessorConfig::new(SpanExporterConfig::default()).with_schedule_delay(-4),
        );

        assert_eq!(
            messages(&config),
            vec!["invalid schedule delay -4", "no valid span exporter"]
        );
    }

    #[test]
    fn multiple_types_validate_every_variant() {
        let config = SpanProcessorConfig {
            simple: Some(SimpleSpanProcessorConfig {
                exporter: SpanExporterConfig {
                    console: Some(ConsoleExporterConfig::default()),
                    otlp: Some(OtlpExporterConfig::new("grpc")),
                },
            }),
            batch: Some(
                BatchSpanProcessorConfig::new(SpanExporterConfig::otlp(OtlpExporterConfig::new(
                    "http/invalid",
                )))
                .with_max_queue_size(-3),
            ),
        };

        assert_eq!(
            messages(&config),
            vec![
                "must not specify multiple span processor type",
                "must not specify multiple exporters",
                "invalid queue size -3",
                r#"unsupported protocol "http/invalid""#,
            ]
        );
    }

    #[test]
    fn multiple_valid_types_still_fail() {
        let config = SpanProcessorConfig {
            simple: Some(SimpleSpanProcessorConfig {
                exporter: SpanExporterConfig::console(),
            }),
            batch: Some(BatchSpanProcessorConfig::new(SpanExporterConfig::console())),
        };

        assert_eq!(
            messages(&config),
            vec!["must not specify multiple span processor type"]
        );
    }

    #[test]
    fn batch_with_http_exporter_resolves() {
        let config = SpanProcessorConfig::batch(BatchSpanProcessorConfig::new(
            SpanExporterConfig::otlp(OtlpExporterConfig::new("http/protobuf")),
        ));

        let processor = resolve_processor(&config).unwrap();

        assert_eq!(
            processor.exporter_kind(),
            ExporterKind::Otlp(OtlpProtocol::HttpProtobuf)
        );
        assert_eq!(
            processor.exporter_endpoint(),
            Some("http://localhost:4318/v1/traces")
        );
        assert!(processor.shutdown().is_ok());
    }

    #[test]
    fn shutdown_runs_once() {
        let processor =
            resolve_processor(&SpanProcessorConfig::simple(SpanExporterConfig::console())).unwrap();

        assert!(processor.shutdown().is_ok());
        assert!(processor.is_shutdown());
        // the console exporter itself would report AlreadyShutdown here
        assert!(processor.shutdown().is_ok());
    }

    #[test]
    fn shared_processor_reaches_unshared_resource() {
        let processor =
            resolve_processor(&SpanProcessorConfig::simple(SpanExporterConfig::console())).unwrap();
        let mut shared = SharedProcessor(Arc::new(processor));

        shared.set_resource(&Resource::builder_empty().build());

        assert!(shared.shutdown().is_ok());
        assert!(shared.0.is_shutdown());
    }

    #[test]
    fn batch_settings_keep_absent_fields() {
        let settings = batch_settings(
            &BatchSpanProcessorConfig::new(SpanExporterConfig::console()).with_max_queue_size(64),
        )
        .unwrap();

        assert_eq!(
            settings,
            BatchSettings {
                max_queue_size: Some(64),
                ..Default::default()
            }
        );
    }
}
