//! Offline evaluation of the intent router against labeled cases

use crate::router::IntentRouter;
use beruang_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One labeled message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub text: String,
    /// Expected final label
    pub expected: String,
    #[serde(default = "default_group")]
    pub group: String,
}

fn default_group() -> String {
    "General".to_string()
}

impl EvaluationCase {
    /// Parse a YAML list of cases
    pub fn from_yaml(yaml: &str) -> Result<Vec<Self>> {
        serde_yaml::from_str(yaml).map_err(|e| {
            beruang_core::Error::config(format!("Failed to parse evaluation cases: {}", e))
        })
    }

    /// Load a YAML list of cases from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

/// Outcome of routing one case
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub text: String,
    pub group: String,
    pub expected: String,
    pub predicted: String,
    pub original: String,
    pub confidence: f32,
    pub escalated: bool,
    pub reasons: Vec<String>,
    pub passed: bool,
}

/// Pass/fail counts for one group
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl GroupStats {
    pub fn pass_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f32 / self.total as f32
        }
    }
}

/// Aggregate evaluation result
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub by_group: BTreeMap<String, GroupStats>,
    pub outcomes: Vec<CaseOutcome>,
}

impl EvaluationReport {
    pub fn pass_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f32 / self.total as f32
        }
    }

    /// Cases whose final label differed from the expected one
    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Pretty-printed JSON for the `--output` report file
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn record(&mut self, outcome: CaseOutcome) {
        let group = self.by_group.entry(outcome.group.clone()).or_default();
        group.total += 1;
        self.total += 1;
        if outcome.passed {
            group.passed += 1;
            self.passed += 1;
        } else {
            group.failed += 1;
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Route every case and compare the final label with the expected one
pub async fn evaluate(router: &IntentRouter, cases: &[EvaluationCase]) -> EvaluationReport {
    let mut report = EvaluationReport::default();

    for case in cases {
        let decision = router.route(&case.text).await;
        let passed = decision.final_label == case.expected;
        if !passed {
            tracing::debug!(
                text = %case.text,
                expected = %case.expected,
                predicted = %decision.final_label,
                "Evaluation case failed"
            );
        }

        report.record(CaseOutcome {
            text: case.text.clone(),
            group: case.group.clone(),
            expected: case.expected.clone(),
            escalated: decision.is_escalated(),
            reasons: decision.reasons().to_vec(),
            predicted: decision.final_label,
            original: decision.original_label,
            confidence: decision.confidence,
            passed,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cases_with_default_group() {
        let yaml = r#"
- text: "hello"
  expected: GREETING
  group: Social
- text: "should i invest in crypto"
  expected: COMPLEX_ADVICE
"#;
        let cases = EvaluationCase::from_yaml(yaml).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].group, "Social");
        assert_eq!(cases[1].group, "General");
    }

    #[test]
    fn test_invalid_cases_are_config_errors() {
        let err = EvaluationCase::from_yaml("- text: only text").unwrap_err();
        assert!(matches!(err, beruang_core::Error::Config(_)));
    }

    #[test]
    fn test_report_counts_by_group() {
        let mut report = EvaluationReport::default();
        for (group, passed) in [("Social", true), ("Social", false), ("Definition", true)] {
            report.record(CaseOutcome {
                text: "x".to_string(),
                group: group.to_string(),
                expected: "A".to_string(),
                predicted: if passed { "A" } else { "B" }.to_string(),
                original: "A".to_string(),
                confidence: 0.9,
                escalated: false,
                reasons: Vec::new(),
                passed,
            });
        }
        assert_eq!(report.total, 3);
        assert_eq!(report.failed, 1);
        assert!(!report.all_passed());
        assert_eq!(report.by_group["Social"].passed, 1);
        assert!((report.by_group["Social"].pass_rate() - 0.5).abs() < f32::EPSILON);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_report_json_lists_outcomes_and_groups() {
        let mut report = EvaluationReport::default();
        report.record(CaseOutcome {
            text: "should i invest in crypto".to_string(),
            group: "Advice".to_string(),
            expected: "COMPLEX_ADVICE".to_string(),
            predicted: "COMPLEX_ADVICE".to_string(),
            original: "COMPLEX_ADVICE".to_string(),
            confidence: 1.0,
            escalated: true,
            reasons: vec!["Red flag".to_string()],
            passed: true,
        });

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_group"]["Advice"]["passed"], 1);
        assert_eq!(json["outcomes"][0]["escalated"], true);
        assert_eq!(json["outcomes"][0]["reasons"][0], "Red flag");
    }

    #[test]
    fn test_demo_cases_parse() {
        let cases =
            EvaluationCase::from_yaml(include_str!("../../../demos/intent_cases.yaml")).unwrap();
        assert_eq!(cases.len(), 20);
        assert!(cases.iter().any(|c| c.group == "Transaction Query"));
        assert!(cases.iter().all(|c| !c.expected.is_empty()));
    }
}
