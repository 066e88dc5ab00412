// JSON report written at the end of a scoring run.

use std::path::Path;

use chrono::{DateTime, Utc};
use fragscope_core::{PivMode, PlayerWithPiv, TeamWithTir, WeightsSnapshot};
use serde::{Deserialize, Serialize};

/// Everything a dashboard needs from one run. Field names are camelCase on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub mode: PivMode,
    /// Version of the learned weights used; `None` when the run fell back
    /// (or did not use weights at all).
    pub weights_version: Option<String>,
    pub players: Vec<PlayerWithPiv>,
    pub teams: Vec<TeamWithTir>,
}

impl Report {
    pub fn new(
        generated_at: DateTime<Utc>,
        mode: PivMode,
        weights: Option<&WeightsSnapshot>,
        players: Vec<PlayerWithPiv>,
        teams: Vec<TeamWithTir>,
    ) -> Self {
        let weights_version = match mode {
            PivMode::Weighted => weights
                .filter(|w| w.has_metric_weights())
                .map(|w| w.version().to_string()),
            _ => None,
        };
        Self {
            generated_at,
            mode,
            weights_version,
            players,
            teams,
        }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Write the report to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path, pretty: bool) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = self.to_json(pretty).context("failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragscope_core::weights::WeightMetadata;
    use std::collections::BTreeMap;

    fn snapshot(version: &str) -> WeightsSnapshot {
        let mut w = BTreeMap::new();
        w.insert("kills".to_string(), 0.1);
        WeightsSnapshot::new(
            w,
            WeightMetadata {
                version: version.into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn weights_version_only_for_weighted_mode() {
        let now = Utc::now();
        let snap = snapshot("v7");
        let r = Report::new(now, PivMode::Weighted, Some(&snap), vec![], vec![]);
        assert_eq!(r.weights_version.as_deref(), Some("v7"));
        let r = Report::new(now, PivMode::Legacy, Some(&snap), vec![], vec![]);
        assert_eq!(r.weights_version, None);
        let r = Report::new(now, PivMode::Weighted, None, vec![], vec![]);
        assert_eq!(r.weights_version, None);
    }

    #[test]
    fn json_uses_camel_case() {
        let r = Report::new(Utc::now(), PivMode::Composite, None, vec![], vec![]);
        let json = r.to_json(false).unwrap();
        assert!(json.contains("\"weightsVersion\":null"));
        assert!(json.contains("\"mode\":\"composite\""));
        assert!(json.contains("\"generatedAt\""));
    }

    #[test]
    fn write_to_creates_parent_dirs() {
        let dir = std::env::temp_dir().join("fragscope_report_test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested/report.json");
        let r = Report::new(Utc::now(), PivMode::Weighted, None, vec![], vec![]);
        r.write_to(&path, true).unwrap();
        let back: Report =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.mode, PivMode::Weighted);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
