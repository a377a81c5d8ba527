//! Configuration tree for the trace pipeline.
//!
//! These types mirror the declarative document shape and are decoded by the
//! caller (any `serde` format). One-of groups keep every variant as an
//! `Option` so that conflicting input survives decoding and can be reported;
//! [`Selection`] turns the populated variants into a single value to match on.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// Populated variants of a one-of group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    Empty,
    One(T),
    Multiple(Vec<T>),
}

impl<T> From<Vec<T>> for Selection<T> {
    fn from(mut variants: Vec<T>) -> Self {
        match variants.len() {
            0 => Self::Empty,
            1 => match variants.pop() {
                Some(only) => Self::One(only),
                None => Self::Empty,
            },
            _ => Self::Multiple(variants),
        }
    }
}

/// `tracer_provider` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TracerProviderConfig {
    pub processors: Vec<SpanProcessorConfig>,
    pub limits: Option<SpanLimitsConfig>,
}

impl TracerProviderConfig {
    pub fn new(processors: Vec<SpanProcessorConfig>) -> Self {
        Self {
            processors,
            limits: None,
        }
    }

    pub fn with_limits(mut self, limits: SpanLimitsConfig) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Per-span limits; absent values keep the SDK defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpanLimitsConfig {
    pub attribute_count_limit: Option<i64>,
    pub event_count_limit: Option<i64>,
    pub link_count_limit: Option<i64>,
    pub event_attribute_count_limit: Option<i64>,
    pub link_attribute_count_limit: Option<i64>,
}

/// One-of: `simple` or `batch`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpanProcessorConfig {
    pub simple: Option<SimpleSpanProcessorConfig>,
    pub batch: Option<BatchSpanProcessorConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessorVariant<'a> {
    Simple(&'a SimpleSpanProcessorConfig),
    Batch(&'a BatchSpanProcessorConfig),
}

impl SpanProcessorConfig {
    pub fn simple(exporter: SpanExporterConfig) -> Self {
        Self {
            simple: Some(SimpleSpanProcessorConfig { exporter }),
            batch: None,
        }
    }

    pub fn batch(batch: BatchSpanProcessorConfig) -> Self {
        Self {
            simple: None,
            batch: Some(batch),
        }
    }

    pub fn selection(&self) -> Selection<ProcessorVariant<'_>> {
        [
            self.simple.as_ref().map(ProcessorVariant::Simple),
            self.batch.as_ref().map(ProcessorVariant::Batch),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimpleSpanProcessorConfig {
    pub exporter: SpanExporterConfig,
}

/// Batch processor settings. Durations are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchSpanProcessorConfig {
    pub max_export_batch_size: Option<i64>,
    pub export_timeout: Option<i64>,
    pub max_queue_size: Option<i64>,
    pub schedule_delay: Option<i64>,
    pub exporter: SpanExporterConfig,
}

impl BatchSpanProcessorConfig {
    pub fn new(exporter: SpanExporterConfig) -> Self {
        Self {
            exporter,
            ..Default::default()
        }
    }

    pub fn with_max_export_batch_size(mut self, size: i64) -> Self {
        self.max_export_batch_size = Some(size);
        self
    }

    pub fn with_export_timeout(mut self, millis: i64) -> Self {
        self.export_timeout = Some(millis);
        self
    }

    pub fn with_max_queue_size(mut self, size: i64) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    pub fn with_schedule_delay(mut self, millis: i64) -> Self {
        self.schedule_delay = Some(millis);
        self
    }
}

/// One-of: `console` or `otlp`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpanExporterConfig {
    #[serde(deserialize_with = "present")]
    pub console: Option<ConsoleExporterConfig>,
    pub otlp: Option<OtlpExporterConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExporterVariant<'a> {
    Console(&'a ConsoleExporterConfig),
    Otlp(&'a OtlpExporterConfig),
}

impl SpanExporterConfig {
    pub fn console() -> Self {
        Self {
            console: Some(ConsoleExporterConfig::default()),
            otlp: None,
        }
    }

    pub fn otlp(otlp: OtlpExporterConfig) -> Self {
        Self {
            console: None,
            otlp: Some(otlp),
        }
    }

    pub fn selection(&self) -> Selection<ExporterVariant<'_>> {
        [
            self.console.as_ref().map(ExporterVariant::Console),
            self.otlp.as_ref().map(ExporterVariant::Otlp),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .into()
    }
}

/// The console exporter takes no settings; `console:` with no value selects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsoleExporterConfig {}

// A present key selects the variant even when its value is null.
fn present<'de, D>(deserializer: D) -> Result<Option<ConsoleExporterConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<ConsoleExporterConfig>::deserialize(deserializer).map(|c| Some(c.unwrap_or_default()))
}

/// OTLP exporter settings, strings kept raw until resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OtlpExporterConfig {
    pub protocol: Option<String>,
    pub endpoint: Option<String>,
    pub compression: Option<String>,
    /// Milliseconds.
    pub timeout: Option<i64>,
    pub headers: Vec<NameStringValuePair>,
    /// PEM bundle used as the trust pool.
    pub certificate: Option<PathBuf>,
}

impl OtlpExporterConfig {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    pub fn with_timeout(mut self, millis: i64) -> Self {
        self.timeout = Some(millis);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(NameStringValuePair {
            name: name.into(),
            value: Some(value.into()),
        });
        self
    }

    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NameStringValuePair {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}
