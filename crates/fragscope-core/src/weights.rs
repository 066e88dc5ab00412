// Learned weight sets.
//
// A weight set maps metric names to coefficients and role keys
// (`role_IGL`, `role_AWP`, ...) to multipliers. It is replaceable
// configuration: the engine reads whatever keys are present and ignores the
// rest. Fetching and caching live in the app crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Prefix that marks a role multiplier rather than a metric coefficient.
pub const ROLE_KEY_PREFIX: &str = "role_";

/// Provenance of a weight set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub samples: u64,
}

/// The wire shape served by the weights endpoint and stored in weight files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightsResponse {
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub metadata: WeightMetadata,
}

/// An immutable weight set as used by the PIV engine.
///
/// Shared read-only behind an `Arc`; a refresh replaces the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightsSnapshot {
    weights: BTreeMap<String, f64>,
    metadata: WeightMetadata,
}

impl WeightsSnapshot {
    pub fn new(weights: BTreeMap<String, f64>, metadata: WeightMetadata) -> Self {
        Self { weights, metadata }
    }

    /// Raw lookup of any key.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.weights.get(key).copied()
    }

    /// Multiplier for `role`, if the set carries one.
    pub fn role_multiplier(&self, role: Role) -> Option<f64> {
        self.get(&role.weight_key())
    }

    /// Metric coefficients in key order, role keys excluded.
    pub fn metric_weights(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights
            .iter()
            .filter(|(k, _)| !k.starts_with(ROLE_KEY_PREFIX))
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Whether the set can score anything. Role multipliers alone cannot,
    /// so such a set selects the fallback formula like an empty one.
    pub fn has_metric_weights(&self) -> bool {
        self.metric_weights().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn metadata(&self) -> &WeightMetadata {
        &self.metadata
    }
}

impl From<WeightsResponse> for WeightsSnapshot {
    fn from(resp: WeightsResponse) -> Self {
        Self::new(resp.weights, resp.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_shape_with_missing_metadata() {
        let json = r#"{"weights": {"kills": 0.1, "role_IGL": 1.15}}"#;
        let resp: WeightsResponse = serde_json::from_str(json).unwrap();
        let snap = WeightsSnapshot::from(resp);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.version(), "");
        assert_eq!(snap.role_multiplier(Role::IGL), Some(1.15));
        assert_eq!(snap.role_multiplier(Role::AWP), None);
    }

    #[test]
    fn metric_weights_exclude_role_keys() {
        let json = r#"{
            "weights": {"kills": 0.1, "adr": -0.02, "role_AWP": 1.1},
            "metadata": {"version": "v3", "date": "2025-05-01", "samples": 412}
        }"#;
        let snap: WeightsSnapshot = serde_json::from_str::<WeightsResponse>(json)
            .unwrap()
            .into();
        let metrics: Vec<_> = snap.metric_weights().collect();
        assert_eq!(metrics, vec![("adr", -0.02), ("kills", 0.1)]);
        assert_eq!(snap.version(), "v3");
        assert_eq!(snap.metadata().samples, 412);
    }

    #[test]
    fn empty_response_is_empty_snapshot() {
        let snap = WeightsSnapshot::from(WeightsResponse::default());
        assert!(snap.is_empty());
        assert!(!snap.has_metric_weights());
    }

    #[test]
    fn role_keys_alone_have_no_metric_weights() {
        let json = r#"{"weights": {"role_AWP": 1.1, "role_IGL": 1.15}}"#;
        let snap: WeightsSnapshot = serde_json::from_str::<WeightsResponse>(json)
            .unwrap()
            .into();
        assert!(!snap.is_empty());
        assert!(!snap.has_metric_weights());
    }
}
