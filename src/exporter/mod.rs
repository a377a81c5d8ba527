//! Span exporter resolution.
//!
//! [`plan_exporter`] checks an exporter entry without constructing anything;
//! [`resolve_exporter`] also builds it.

pub mod console;
pub mod otlp;

use std::time::Duration;

use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use tracing::debug;

use crate::error::ResolveError;
use crate::model::{ExporterVariant, Selection, SpanExporterConfig};

pub use console::ConsoleExporter;
pub use otlp::{OtlpCompression, OtlpPlan, OtlpProtocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExporterKind {
    Console,
    Otlp(OtlpProtocol),
}

/// A validated exporter entry.
#[derive(Debug)]
pub enum ExporterPlan {
    Console,
    Otlp(OtlpPlan),
}

impl ExporterPlan {
    pub fn kind(&self) -> ExporterKind {
        match self {
            Self::Console => ExporterKind::Console,
            Self::Otlp(plan) => ExporterKind::Otlp(plan.protocol()),
        }
    }

    pub fn build(self) -> Result<ResolvedExporter, ResolveError> {
        let kind = self.kind();
        let (endpoint, inner) = match self {
            Self::Console => (None, Inner::Console(ConsoleExporter::new())),
            Self::Otlp(plan) => {
                let endpoint = plan.endpoint().to_string();
                (Some(endpoint), Inner::Otlp(plan.build()?))
            }
        };

        debug!(?kind, endpoint = endpoint.as_deref(), "resolved span exporter");
        Ok(ResolvedExporter {
            kind,
            endpoint,
            inner,
        })
    }
}

/// Validates an exporter entry: exactly one variant, and for OTLP every
/// setting up to but excluding transport construction.
pub fn plan_exporter(config: &SpanExporterConfig) -> Result<ExporterPlan, ResolveError> {
    match config.selection() {
        Selection::Empty => Err(ResolveError::NoExporter),
        Selection::Multiple(_) => Err(ResolveError::MultipleExporters),
        Selection::One(ExporterVariant::Console(_)) => Ok(ExporterPlan::Console),
        Selection::One(ExporterVariant::Otlp(otlp)) => otlp::plan(otlp).map(ExporterPlan::Otlp),
    }
}

pub fn resolve_exporter(config: &SpanExporterConfig) -> Result<ResolvedExporter, ResolveError> {
    plan_exporter(config)?.build()
}

/// A constructed span exporter of any supported kind.
#[derive(Debug)]
pub struct ResolvedExporter {
    kind: ExporterKind,
    endpoint: Option<String>,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Console(ConsoleExporter),
    Otlp(opentelemetry_otlp::SpanExporter),
}

impl ResolvedExporter {
    pub fn kind(&self) -> ExporterKind {
        self.kind
    }

    /// Normalized collector endpoint, `None` for the console exporter.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl SpanExporter for ResolvedExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        match &self.inner {
            Inner::Console(exporter) => exporter.export(batch).await,
            Inner::Otlp(exporter) => match self.kind {
                ExporterKind::Otlp(OtlpProtocol::HttpProtobuf | OtlpProtocol::HttpJson) => {
                    otlp::http::export(exporter, batch).await
                }
                _ => exporter.export(batch).await,
            },
        }
    }

    fn shutdown_with_timeout(&mut self, timeout: Duration) -> OTelSdkResult {
        match &mut self.inner {
            Inner::Console(exporter) => exporter.shutdown_with_timeout(timeout),
            Inner::Otlp(exporter) => exporter.shutdown_with_timeout(timeout),
        }
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        match &mut self.inner {
            Inner::Console(exporter) => exporter.force_flush(),
            Inner::Otlp(exporter) => exporter.force_flush(),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        match &mut self.inner {
            Inner::Console(exporter) => exporter.set_resource(resource),
            Inner::Otlp(exporter) => exporter.set_resource(resource),
        }
    }
}
