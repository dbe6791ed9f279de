//! Configuration types shared by the floe crates.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

/// Metrics export configuration.
///
/// A batch job has no long-lived endpoint to scrape, so the Prometheus
/// snapshot is rendered to a textfile when the run ends (the node-exporter
/// textfile collector convention).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Where to write the Prometheus text snapshot. Disabled when unset.
    #[serde(default)]
    pub textfile: Option<String>,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl ParquetCompression {
    /// Codec name in the form the query engine's Parquet writer options expect.
    pub fn as_codec(self) -> &'static str {
        match self {
            ParquetCompression::Uncompressed => "uncompressed",
            ParquetCompression::Snappy => "snappy",
            ParquetCompression::Gzip => "gzip(6)",
            ParquetCompression::Zstd => "zstd(3)",
            ParquetCompression::Lz4 => "lz4_raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_defaults_to_snappy() {
        assert_eq!(ParquetCompression::default().as_codec(), "snappy");
    }

    #[test]
    fn test_compression_yaml_names() {
        let codec: ParquetCompression = serde_yaml::from_str("zstd").unwrap();
        assert_eq!(codec, ParquetCompression::Zstd);
        assert_eq!(codec.as_codec(), "zstd(3)");
    }

    #[test]
    fn test_metrics_textfile_optional() {
        let config: MetricsConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.textfile, None);

        let config: MetricsConfig =
            serde_yaml::from_str("textfile: /var/lib/node_exporter/floe.prom").unwrap();
        assert_eq!(
            config.textfile.as_deref(),
            Some("/var/lib/node_exporter/floe.prom")
        );
    }
}
