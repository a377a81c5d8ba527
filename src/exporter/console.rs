use std::fmt;
use std::io::{LineWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::trace::{SpanId, SpanKind, Status};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use serde_json::Map;

type SharedWriter = Arc<Mutex<LineWriter<Box<dyn Write + Send>>>>;

/// Writes every finished span as a pretty-printed JSON record.
#[derive(Clone)]
pub struct ConsoleExporter {
    writer: SharedWriter,
    resource: Resource,
    is_shutdown: Arc<AtomicBool>,
}

impl ConsoleExporter {
    /// Exporter writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(LineWriter::new(Box::new(writer)))),
            resource: Resource::builder_empty().build(),
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn write_record(&self, record: &SpanRecord<'_>) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;

        // serialize first so a failure never leaves part of a record behind
        let mut line = serde_json::to_vec_pretty(record)
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsoleExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleExporter")
            .field("resource", &self.resource)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SpanExporter for ConsoleExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(OTelSdkError::AlreadyShutdown);
        }

        let resource = attributes(self.resource.iter());
        for span in &batch {
            self.write_record(&SpanRecord::new(span, &resource))?;
        }
        Ok(())
    }

    fn shutdown_with_timeout(&mut self, _timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        self.force_flush()
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;

        writer
            .flush()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}

#[derive(Serialize)]
struct SpanRecord<'a> {
    name: &'a str,
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    kind: &'static str,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    attributes: Map<String, serde_json::Value>,
    events: Vec<EventRecord<'a>>,
    links: Vec<LinkRecord>,
    status: StatusRecord<'a>,
    scope: &'a str,
    resource: &'a Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct EventRecord<'a> {
    name: &'a str,
    time_unix_nano: u64,
    attributes: Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct LinkRecord {
    trace_id: String,
    span_id: String,
    attributes: Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct StatusRecord<'a> {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> SpanRecord<'a> {
    fn new(span: &'a SpanData, resource: &'a Map<String, serde_json::Value>) -> Self {
        let parent_span_id =
            (span.parent_span_id != SpanId::INVALID).then(|| span.parent_span_id.to_string());

        Self {
            name: &span.name,
            trace_id: span.span_context.trace_id().to_string(),
            span_id: span.span_context.span_id().to_string(),
            parent_span_id,
            kind: kind_name(&span.span_kind),
            start_time_unix_nano: unix_nanos(span.start_time),
            end_time_unix_nano: unix_nanos(span.end_time),
            attributes: key_values(&span.attributes),
            events: span
                .events
                .iter()
                .map(|event| EventRecord {
                    name: &event.name,
                    time_unix_nano: unix_nanos(event.timestamp),
                    attributes: key_values(&event.attributes),
                })
                .collect(),
            links: span
                .links
                .iter()
                .map(|link| LinkRecord {
                    trace_id: link.span_context.trace_id().to_string(),
                    span_id: link.span_context.span_id().to_string(),
                    attributes: key_values(&link.attributes),
                })
                .collect(),
            status: match &span.status {
                Status::Unset => StatusRecord {
                    code: "Unset",
                    description: None,
                },
                Status::Ok => StatusRecord {
                    code: "Ok",
                    description: None,
                },
                Status::Error { description } => StatusRecord {
                    code: "Error",
                    description: Some(&**description),
                },
            },
            scope: span.instrumentation_scope.name(),
            resource,
        }
    }
}

fn kind_name(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Client => "Client",
        SpanKind::Server => "Server",
        SpanKind::Producer => "Producer",
        SpanKind::Consumer => "Consumer",
        SpanKind::Internal => "Internal",
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

fn key_values(kvs: &[KeyValue]) -> Map<String, serde_json::Value> {
    attributes(kvs.iter().map(|kv| (&kv.key, &kv.value)))
}

fn attributes<'a, K>(pairs: impl Iterator<Item = (K, &'a Value)>) -> Map<String, serde_json::Value>
where
    K: fmt::Display,
{
    pairs
        .map(|(key, value)| (key.to_string(), json_value(value)))
        .collect()
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => (*b).into(),
        Value::I64(i) => (*i).into(),
        Value::F64(f) => (*f).into(),
        other => other.as_str().into_owned().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, Tracer, TracerProvider};
    use opentelemetry_sdk::trace::{SdkTracerProvider, SimpleSpanProcessor};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn writes_pretty_json_record_per_span() {
        let buffer = Buffer::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(ConsoleExporter::with_writer(
                buffer.clone(),
            )))
            .with_resource(
                Resource::builder_empty()
                    .with_attribute(KeyValue::new("service.name", "checkout"))
                    .build(),
            )
            .build();

        let tracer = provider.tracer("console-test");
        let mut span = tracer.start("charge-card");
        span.set_attribute(KeyValue::new("amount", 42));
        span.set_attribute(KeyValue::new("approved", true));
        span.end();

        let output = buffer.contents();
        let record: serde_json::Value = serde_json::from_str(output.trim()).unwrap();

        assert!(output.contains("\n  \"name\""), "expected pretty output: {output}");
        assert_eq!(record["name"], "charge-card");
        assert_eq!(record["kind"], "Internal");
        assert_eq!(record["attributes"]["amount"], 42);
        assert_eq!(record["attributes"]["approved"], true);
        assert_eq!(record["status"]["code"], "Unset");
        assert_eq!(record["scope"], "console-test");
        assert_eq!(record["resource"]["service.name"], "checkout");
        assert!(record.get("parent_span_id").is_none());

        provider.shutdown().unwrap();
    }

    /// Rejects the first `rejects` writes, then appends to `inner`.
    struct Flaky {
        rejects: usize,
        inner: Buffer,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.rejects > 0 {
                self.rejects -= 1;
                return Err(std::io::Error::other("disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_record() {
        let buffer = Buffer::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(ConsoleExporter::with_writer(Flaky {
                rejects: 1,
                inner: buffer.clone(),
            })))
            .build();
        let tracer = provider.tracer("console-test");

        tracer.start("lost").end();
        tracer.start("kept").end();

        let output = buffer.contents();
        assert!(output.starts_with('{'), "unexpected output: {output:?}");
        assert!(output.ends_with("}\n"), "unexpected output: {output:?}");
        let record: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(record["name"], "kept");

        provider.shutdown().unwrap();
    }

    #[tokio::test]
    async fn export_after_shutdown_fails() {
        let mut exporter = ConsoleExporter::with_writer(Buffer::default());

        exporter.shutdown().unwrap();

        assert!(matches!(
            exporter.export(Vec::new()).await,
            Err(OTelSdkError::AlreadyShutdown)
        ));
        assert!(matches!(
            exporter.shutdown(),
            Err(OTelSdkError::AlreadyShutdown)
        ));
    }

    #[test]
    fn converts_attribute_values_to_json() {
        assert_eq!(json_value(&Value::I64(7)), serde_json::json!(7));
        assert_eq!(json_value(&Value::from("text")), serde_json::json!("text"));
        assert_eq!(json_value(&Value::F64(1.5)), serde_json::json!(1.5));
    }
}
