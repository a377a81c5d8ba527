use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

use crate::config::TelemetryConfig;

/// Service identity attributes
pub fn base_attributes(config: &TelemetryConfig) -> Vec<KeyValue> {
    vec![
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
    ]
}

/// Resource attached to every span of the pipeline
pub fn build_base_resource(config: &TelemetryConfig) -> Resource {
    build_resource(config, Vec::new())
}

/// Base attributes plus `additional`; later entries win on key clashes.
pub fn build_resource(config: &TelemetryConfig, additional: Vec<KeyValue>) -> Resource {
    let mut attrs = base_attributes(config);
    attrs.extend(additional);
    Resource::builder_empty().with_attributes(attrs).build()
}
