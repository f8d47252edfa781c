use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// `[telemetry]` section
///
/// Without this section logs are written as text and no spans leave the
/// process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Extra attributes on the exported resource
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    #[serde(default)]
    pub exporters: ExportersConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl TelemetryConfig {
    /// OTLP exporter, when one is configured
    pub fn otlp(&self) -> Option<&OtlpExporterConfig> {
        self.exporters.otlp.as_ref()
    }
}

/// Shape of each stdout log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportersConfig {
    pub otlp: Option<OtlpExporterConfig>,
}

/// `[telemetry.exporters.otlp]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtlpExporterConfig {
    pub endpoint: Url,
    #[serde(default)]
    pub protocol: OtlpProtocol,
    /// Sent with every export; ignored by the gRPC transport
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    HttpProto,
}

/// Head sampling of exported traces
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    /// Fraction of root traces kept, clamped to `0.0..=1.0`
    #[serde(default = "SamplingConfig::keep_all")]
    pub ratio: f64,
    /// Follow an upstream parent's decision instead of `ratio`
    #[serde(default = "SamplingConfig::follow_parent")]
    pub parent_based: bool,
}

impl SamplingConfig {
    const fn keep_all() -> f64 {
        1.0
    }

    const fn follow_parent() -> bool {
        true
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            ratio: Self::keep_all(),
            parent_based: Self::follow_parent(),
        }
    }
}

fn default_service_name() -> String {
    String::from("conduit")
}
