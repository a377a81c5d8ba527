use std::time::Duration;

use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Certificate, ClientTlsConfig};
use tracing::debug;

use crate::error::ResolveError;

use super::{OtlpCompression, OtlpSettings};

const TRANSPORT: &str = "grpc";

/// A validated OTLP/gRPC exporter.
#[derive(Debug)]
pub struct GrpcPlan {
    endpoint: String,
    compression: OtlpCompression,
    timeout: Option<Duration>,
    metadata: MetadataMap,
    tls: Option<ClientTlsConfig>,
}

impl GrpcPlan {
    pub(crate) fn new(
        settings: OtlpSettings,
        headers: &[(&str, &str)],
    ) -> Result<Self, ResolveError> {
        let https = settings.endpoint.scheme() == "https";

        // An explicit bundle replaces the system roots.
        let tls = match &settings.trust {
            Some(pool) => {
                Some(ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pool.pem())))
            }
            None if https => Some(ClientTlsConfig::new().with_native_roots()),
            None => None,
        };

        Ok(Self {
            endpoint: settings.endpoint.as_str().trim_end_matches('/').to_string(),
            compression: settings.compression,
            timeout: settings.timeout,
            metadata: metadata(headers)?,
            tls,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the exporter over a lazily connected channel.
    ///
    /// The channel is spawned onto the current Tokio runtime, so this fails
    /// when called outside of one.
    pub fn build(self) -> Result<SpanExporter, ResolveError> {
        tokio::runtime::Handle::try_current().map_err(build_error)?;

        let mut builder = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.as_str())
            .with_metadata(self.metadata);

        if let Some(timeout) = self.timeout {
            builder = builder.with_timeout(timeout);
        }
        if let Some(compression) = self.compression.to_otlp() {
            builder = builder.with_compression(compression);
        }
        if let Some(tls) = self.tls {
            builder = builder.with_tls_config(tls);
        }

        let exporter = builder.build().map_err(build_error)?;

        debug!(endpoint = %self.endpoint, "built otlp grpc span exporter");
        Ok(exporter)
    }
}

/// Converts headers into gRPC metadata, keeping repeated names.
fn metadata(headers: &[(&str, &str)]) -> Result<MetadataMap, ResolveError> {
    let mut map = MetadataMap::with_capacity(headers.len());
    for &(name, value) in headers {
        let key = AsciiMetadataKey::from_bytes(name.as_bytes()).map_err(|e| invalid(name, e))?;
        let value = AsciiMetadataValue::try_from(value).map_err(|e| invalid(name, e))?;
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
