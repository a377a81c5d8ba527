use std::thread;
use std::time::Duration;

use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::ResolveError;

use super::{OtlpCompression, OtlpProtocol, OtlpSettings};

const TRANSPORT: &str = "http";

/// Request timeout of the HTTP client when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A validated OTLP/HTTP exporter.
#[derive(Debug)]
pub struct HttpPlan {
    protocol: OtlpProtocol,
    endpoint: String,
    compression: OtlpCompression,
    timeout: Option<Duration>,
    headers: HeaderMap,
    roots: Vec<reqwest::Certificate>,
}

impl HttpPlan {
    pub(crate) fn new(
        protocol: OtlpProtocol,
        settings: OtlpSettings,
        headers: &[(&str, &str)],
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            protocol,
            endpoint: settings.endpoint.to_string(),
            compression: settings.compression,
            timeout: settings.timeout,
            headers: header_map(headers)?,
            roots: settings
                .trust
                .map(|pool| pool.certificates().to_vec())
                .unwrap_or_default(),
        })
    }

    pub fn protocol(&self) -> OtlpProtocol {
        self.protocol
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build(self) -> Result<SpanExporter, ResolveError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = blocking_client(self.headers, self.roots, timeout)?;

        let protocol = match self.protocol {
            OtlpProtocol::HttpJson => Protocol::HttpJson,
            OtlpProtocol::HttpProtobuf | OtlpProtocol::Grpc => Protocol::HttpBinary,
        };

        let mut builder = SpanExporter::builder()
            .with_http()
            .with_http_client(client)
            .with_endpoint(self.endpoint.as_str())
            .with_protocol(protocol)
            .with_timeout(timeout);

        if let Some(compression) = self.compression.to_otlp() {
            builder = builder.with_compression(compression);
        }

        let exporter = builder.build().map_err(build_error)?;

        debug!(
            endpoint = %self.endpoint,
            protocol = %self.protocol,
            "built otlp http span exporter"
        );
        Ok(exporter)
    }
}

/// Builds the blocking client on a helper thread.
///
/// The blocking client owns a runtime of its own, which must not be created
/// from inside an async context.
fn blocking_client(
    headers: HeaderMap,
    roots: Vec<reqwest::Certificate>,
    timeout: Duration,
) -> Result<reqwest::blocking::Client, ResolveError> {
    thread::spawn(move || {
        roots
            .into_iter()
            .fold(reqwest::blocking::Client::builder(), |builder, cert| {
                builder.add_root_certificate(cert)
            })
            .default_headers(headers)
            .timeout(timeout)
            .build()
    })
    .join()
    .map_err(|_| build_error("http client thread panicked"))?
    .map_err(build_error)
}

/// Sends `batch` through an exporter built by [`HttpPlan::build`].
///
/// The blocking client refuses to send from a Tokio runtime thread, which is
/// where a simple processor exports when a span ends in async code. There the
/// request runs on a helper thread while the caller waits.
pub(crate) async fn export(exporter: &SpanExporter, batch: Vec<SpanData>) -> OTelSdkResult {
    if Handle::try_current().is_err() {
        return exporter.export(batch).await;
    }

    thread::scope(|scope| {
        scope
            .spawn(|| futures::executor::block_on(exporter.export(batch)))
            .join()
            .unwrap_or_else(|_| {
                Err(OTelSdkError::InternalFailure(
                    "http export thread panicked".to_string(),
                ))
            })
    })
}

/// Converts headers into a header map, keeping repeated names.
fn header_map(headers: &[(&str, &str)]) -> Result<HeaderMap, ResolveError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for &(name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(name, e))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(name, e))?;
        map.append(key, value);
    }
    Ok(map)
}

fn invalid(name: &str, reason: impl ToString) -> ResolveError {
    ResolveError::InvalidHeader {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn build_error(reason: impl ToString) -> ResolveError {
    ResolveError::ExporterBuild {
        transport: TRANSPORT,
        reason: reason.to_string(),
    }
}
