//! Performance samples, the output of a benchmark run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A single measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// What was measured (e.g. `time_real`).
    pub metric: String,
    pub value: f64,
    pub unit: String,
    /// Context of the run the measurement was taken in.
    pub metadata: Metadata,
    /// Seconds since the Unix epoch when the sample was taken.
    pub timestamp: f64,
}

impl Sample {
    pub fn new(metric: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Sample {
            metric: metric.into(),
            value,
            unit: unit.into(),
            metadata: Metadata::new(),
            timestamp: now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6,
        }
    }

    /// Add the given metadata, overwriting existing keys.
    pub fn add_metadata(&mut self, metadata: &Metadata) {
        for (k, v) in metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_merged() {
        let mut sample = Sample::new("time_real", 241.0, "seconds");
        sample
            .metadata
            .insert("case_name".into(), serde_json::json!("old"));

        let mut common = Metadata::new();
        common.insert("case_name".into(), serde_json::json!("motorbike"));
        common.insert("total_cpus_used".into(), serde_json::json!(8));
        sample.add_metadata(&common);

        assert_eq!(sample.metadata["case_name"], "motorbike");
        assert_eq!(sample.metadata["total_cpus_used"], 8);
        assert!(sample.timestamp > 0.0);
    }
}
