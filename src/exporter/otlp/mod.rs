//! OTLP exporter planning.
//!
//! Planning walks the settings in a fixed order (protocol, compression,
//! endpoint, trust, timeout, headers) and stops at the first failure. The
//! resulting [`OtlpPlan`] holds everything the transport needs, so building
//! it only fails when the transport itself refuses.

pub mod grpc;
pub mod http;
mod tls;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ResolveError;
use crate::model::{NameStringValuePair, OtlpExporterConfig};
use crate::validate::optional_non_negative;

use self::tls::TrustPool;

const DEFAULT_HOST: &str = "localhost";

/// Wire protocol of an OTLP exporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OtlpProtocol {
    Grpc,
    #[default]
    HttpProtobuf,
    HttpJson,
}

impl OtlpProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::HttpProtobuf => "http/protobuf",
            Self::HttpJson => "http/json",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Grpc => 4317,
            Self::HttpProtobuf | Self::HttpJson => 4318,
        }
    }

    /// Signal path appended to HTTP endpoints that carry none.
    pub fn default_path(self) -> Option<&'static str> {
        match self {
            Self::Grpc => None,
            Self::HttpProtobuf | Self::HttpJson => Some("/v1/traces"),
        }
    }

    /// Transport name used in error messages.
    pub fn transport(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::HttpProtobuf | Self::HttpJson => "http",
        }
    }
}

impl FromStr for OtlpProtocol {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(Self::Grpc),
            "http/protobuf" => Ok(Self::HttpProtobuf),
            "http/json" => Ok(Self::HttpJson),
            other => Err(ResolveError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for OtlpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OtlpCompression {
    #[default]
    None,
    Gzip,
}

impl OtlpCompression {
    fn to_otlp(self) -> Option<opentelemetry_otlp::Compression> {
        match self {
            Self::None => None,
            Self::Gzip => Some(opentelemetry_otlp::Compression::Gzip),
        }
    }
}

impl FromStr for OtlpCompression {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(ResolveError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Transport-independent settings shared by both plans.
#[derive(Debug)]
pub(crate) struct OtlpSettings {
    endpoint: Url,
    compression: OtlpCompression,
    timeout: Option<Duration>,
    trust: Option<TrustPool>,
}

/// A validated OTLP exporter, ready to build.
#[derive(Debug)]
pub enum OtlpPlan {
    Grpc(grpc::GrpcPlan),
    Http(http::HttpPlan),
}

impl OtlpPlan {
    pub fn protocol(&self) -> OtlpProtocol {
        match self {
            Self::Grpc(_) => OtlpProtocol::Grpc,
            Self::Http(plan) => plan.protocol(),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Grpc(plan) => plan.endpoint(),
            Self::Http(plan) => plan.endpoint(),
        }
    }

    pub fn build(self) -> Result<opentelemetry_otlp::SpanExporter, ResolveError> {
        match self {
            Self::Grpc(plan) => plan.build(),
            Self::Http(plan) => plan.build(),
        }
    }
}

/// Validates an OTLP exporter entry and loads its trust material.
pub fn plan(config: &OtlpExporterConfig) -> Result<OtlpPlan, ResolveError> {
    let protocol = config
        .protocol
        .as_deref()
        .map(str::parse::<OtlpProtocol>)
        .transpose()?
        .unwrap_or_default();

    let compression = config
        .compression
        .as_deref()
        .map(str::parse::<OtlpCompression>)
        .transpose()?
        .unwrap_or_default();

    let secure = config.certificate.is_some();
    let endpoint = resolve_endpoint(protocol, config.endpoint.as_deref(), secure)?;

    let trust = match &config.certificate {
        Some(path) => Some(tls::load(path, protocol)?),
        None => None,
    };

    let timeout = optional_non_negative("timeout", config.timeout)?.map(Duration::from_millis);

    let settings = OtlpSettings {
        endpoint,
        compression,
        timeout,
        trust,
    };
    let headers = header_pairs(&config.headers);

    match protocol {
        OtlpProtocol::Grpc => grpc::GrpcPlan::new(settings, &headers).map(OtlpPlan::Grpc),
        OtlpProtocol::HttpProtobuf | OtlpProtocol::HttpJson => {
            http::HttpPlan::new(protocol, settings, &headers).map(OtlpPlan::Http)
        }
    }
}

// Entries without a value carry nothing to send.
fn header_pairs(headers: &[NameStringValuePair]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter_map(|h| h.value.as_deref().map(|value| (h.name.as_str(), value)))
        .collect()
}

/// Normalizes the configured endpoint, or derives the protocol default.
pub(crate) fn resolve_endpoint(
    protocol: OtlpProtocol,
    raw: Option<&str>,
    secure: bool,
) -> Result<Url, ResolveError> {
    let scheme = if secure { "https" } else { "http" };

    let (raw, candidate) = match raw {
        Some(raw) if raw.contains("://") => (raw, raw.to_string()),
        Some(raw) => (raw, format!("{scheme}://{raw}")),
        None => {
            let default = format!(
                "{scheme}://{DEFAULT_HOST}:{}{}",
                protocol.default_port(),
                protocol.default_path().unwrap_or_default()
            );
            return Url::parse(&default).map_err(|e| invalid_endpoint(&default, e));
        }
    };

    let mut url = Url::parse(&candidate).map_err(|e| invalid_endpoint(raw, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_endpoint(
            raw,
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid_endpoint(raw, "missing host"));
    }

    // the parser reports a missing path as "/", so look at the input itself
    if let Some(path) = protocol.default_path() {
        if !has_path(&candidate) {
            url.set_path(path);
        }
    }

    Ok(url)
}

fn has_path(candidate: &str) -> bool {
    let authority_and_rest = candidate
        .split_once("://")
        .map_or(candidate, |(_, rest)| rest);
    authority_and_rest
        .split(['?', '#'])
        .next()
        .is_some_and(|before_query| before_query.contains('/'))
}

fn invalid_endpoint(raw: &str, reason: impl fmt::Display) -> ResolveError {
    ResolveError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string(),
    }
}
