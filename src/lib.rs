//! Declarative trace pipeline resolution.
//!
//! Turns a decoded configuration tree describing span processors and their
//! exporters into a live [`SdkTracerProvider`](opentelemetry_sdk::trace::SdkTracerProvider),
//! validating every entry and reporting all problems at once.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use otel_trace_config::{resolve_pipeline, TracerProviderConfig};
//!
//! let config: TracerProviderConfig = serde_json::from_str(r#"{
//!     "processors": [
//!         { "batch": { "exporter": { "otlp": { "protocol": "grpc", "endpoint": "localhost:4317" } } } },
//!         { "simple": { "exporter": { "console": {} } } }
//!     ]
//! }"#)?;
//!
//! let pipeline = resolve_pipeline(Some(&config), resource);
//! if let Some(err) = &pipeline.error {
//!     eprintln!("tracing disabled: {err}");
//! }
//! ```
//!
//! # Module Structure
//!
//! - [`model`]: configuration tree
//! - [`validate`]: field checks
//! - [`error`]: error types and the error aggregator
//! - [`exporter`]: console / OTLP exporter resolution
//! - [`processor`]: simple / batch processor resolution
//! - [`pipeline`]: tracer provider assembly and shutdown
//! - [`api`], [`config`], [`resource`], [`trace`]: process bootstrap

pub mod api;
pub mod config;
pub mod error;
pub mod exporter;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod resource;
pub mod trace;
pub mod validate;

// Re-exports
pub use api::{init, init_from_env, Telemetry};
pub use config::{LogFormat, TelemetryConfig, TelemetryConfigBuilder};
pub use error::{AggregatedError, ErrorAggregator, ResolveError, TelemetryError};
pub use exporter::{resolve_exporter, ExporterKind, ResolvedExporter};
pub use model::{
    BatchSpanProcessorConfig, ConsoleExporterConfig, NameStringValuePair, OtlpExporterConfig,
    SimpleSpanProcessorConfig, SpanExporterConfig, SpanLimitsConfig, SpanProcessorConfig,
    TracerProviderConfig,
};
pub use pipeline::{resolve_pipeline, Pipeline, PipelineProvider, PipelineShutdown};
pub use processor::{resolve_processor, ProcessorKind, ResolvedProcessor};
