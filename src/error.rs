use std::fmt;

/// A single failed check while resolving the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("must not specify multiple span processor type")]
    MultipleProcessorTypes,

    #[error("unsupported span processor type, must be one of simple or batch")]
    NoProcessorType,

    #[error("must not specify multiple exporters")]
    MultipleExporters,

    #[error("no valid span exporter")]
    NoExporter,

    /// A numeric field that must not be negative.
    #[error("invalid {field} {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    #[error("unsupported compression {0:?}")]
    UnsupportedCompression(String),

    #[error("parse {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("could not create client tls credentials: {0}")]
    TlsCredentials(String),

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("failed to build {transport} exporter: {reason}")]
    ExporterBuild {
        transport: &'static str,
        reason: String,
    },

    #[error("failed to shut down {processor} span processor #{index}: {reason}")]
    Shutdown {
        processor: &'static str,
        index: usize,
        reason: String,
    },

    /// Failures of a nested scope, e.g. one processor entry.
    #[error("{0}")]
    Aggregated(AggregatedError),
}

impl From<AggregatedError> for ResolveError {
    fn from(err: AggregatedError) -> Self {
        Self::Aggregated(err)
    }
}

/// Every failure collected across independent checks, in check order.
///
/// Two aggregated errors are equal when their flattened message lists are
/// equal, regardless of how the failures were nested.
#[derive(Debug, Clone, Default)]
pub struct AggregatedError {
    errors: Vec<ResolveError>,
}

impl AggregatedError {
    /// Direct entries, nested aggregates kept as single entries.
    pub fn iter(&self) -> impl Iterator<Item = &ResolveError> {
        self.errors.iter()
    }

    /// Number of leaf failures.
    pub fn len(&self) -> usize {
        self.errors
            .iter()
            .map(|err| match err {
                ResolveError::Aggregated(nested) => nested.len(),
                _ => 1,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaf failure messages, nested aggregates flattened in place.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.errors.len());
        self.collect_messages(&mut out);
        out
    }

    /// True when any leaf failure has exactly this message.
    pub fn contains(&self, message: &str) -> bool {
        self.messages().iter().any(|m| m == message)
    }

    fn collect_messages(&self, out: &mut Vec<String>) {
        for err in &self.errors {
            match err {
                ResolveError::Aggregated(nested) => nested.collect_messages(out),
                other => out.push(other.to_string()),
            }
        }
    }
}

impl From<Vec<ResolveError>> for AggregatedError {
    fn from(errors: Vec<ResolveError>) -> Self {
        Self { errors }
    }
}

impl From<ResolveError> for AggregatedError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Aggregated(nested) => nested,
            other => Self { errors: vec![other] },
        }
    }
}

impl PartialEq for AggregatedError {
    fn eq(&self, other: &Self) -> bool {
        self.messages() == other.messages()
    }
}

impl Eq for AggregatedError {}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("\n"))
    }
}

impl std::error::Error for AggregatedError {}

/// Collects failures from independent checks without stopping at the first.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<ResolveError>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<ResolveError>) {
        let err = err.into();
        // an empty nested aggregate is a success
        if let ResolveError::Aggregated(nested) = &err {
            if nested.is_empty() {
                return;
            }
        }
        self.errors.push(err);
    }

    /// Records the failure of `result`, handing back the success value.
    pub fn check<T, E>(&mut self, result: Result<T, E>) -> Option<T>
    where
        E: Into<ResolveError>,
    {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), AggregatedError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AggregatedError {
                errors: self.errors,
            })
        }
    }
}

impl From<ErrorAggregator> for AggregatedError {
    fn from(agg: ErrorAggregator) -> Self {
        Self { errors: agg.errors }
    }
}

/// Errors from process-level telemetry bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to shut down trace pipeline: {0}")]
    Shutdown(#[source] AggregatedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregator_finishes_ok() {
        let agg = ErrorAggregator::new();

        assert!(agg.finish().is_ok());
    }

    #[test]
    fn aggregator_keeps_check_order() {
        let mut agg = ErrorAggregator::new();
        agg.push(ResolveError::MultipleExporters);
        agg.push(ResolveError::NoExporter);

        let err = agg.finish().unwrap_err();

        assert_eq!(
            err.messages(),
            vec!["must not specify multiple exporters", "no valid span exporter"]
        );
        assert_eq!(
            err.to_string(),
            "must not specify multiple exporters\nno valid span exporter"
        );
    }

    #[test]
    fn check_returns_value_on_success() {
        let mut agg = ErrorAggregator::new();

        let value = agg.check(Ok::<_, ResolveError>(7));
        let missing = agg.check(Err::<u8, _>(ResolveError::NoExporter));

        assert_eq!(value, Some(7));
        assert_eq!(missing, None);
        assert_eq!(agg.finish().unwrap_err().len(), 1);
    }

    #[test]
    fn nested_aggregates_flatten_for_equality() {
        let mut inner = ErrorAggregator::new();
        inner.push(ResolveError::MultipleProcessorTypes);
        inner.push(ResolveError::NoExporter);

        let mut outer = ErrorAggregator::new();
        outer.push(inner.finish().unwrap_err());
        outer.push(ResolveError::MultipleExporters);
        let nested = outer.finish().unwrap_err();

        let flat = AggregatedError::from(vec![
            ResolveError::MultipleProcessorTypes,
            ResolveError::NoExporter,
            ResolveError::MultipleExporters,
        ]);

        assert_eq!(nested, flat);
        assert_eq!(nested.len(), 3);
        assert_eq!(nested.iter().count(), 2);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a = AggregatedError::from(vec![ResolveError::NoExporter, ResolveError::MultipleExporters]);
        let b = AggregatedError::from(vec![ResolveError::MultipleExporters, ResolveError::NoExporter]);

        assert_ne!(a, b);
    }

    #[test]
    fn empty_nested_aggregate_is_not_recorded() {
        let mut agg = ErrorAggregator::new();
        agg.push(AggregatedError::default());

        assert!(agg.is_empty());
    }

    #[test]
    fn messages_quote_offending_values() {
        assert_eq!(
            ResolveError::UnsupportedProtocol("http/invalid".into()).to_string(),
            r#"unsupported protocol "http/invalid""#
        );
        assert_eq!(
            ResolveError::UnsupportedCompression("invalid".into()).to_string(),
            r#"unsupported compression "invalid""#
        );
        assert_eq!(
            ResolveError::Negative {
                field: "batch size",
                value: -1
            }
            .to_string(),
            "invalid batch size -1"
        );
    }
}
