//! Engine configuration with sane defaults.
//!
//! Every key is optional when deserialized; missing keys take the defaults
//! below. Call [`Config::validate`] (done by `AnalysisEngine::new`) before use.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Score thresholds for mapping a score onto a [`crate::types::RiskLevel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevels {
  pub critical: f64,
  pub high: f64,
  pub medium: f64,
  /// Floor; scores below it are still reported as low.
  pub low: f64,
}

impl Default for RiskLevels {
  fn default() -> Self {
    Self {
      critical: 0.85,
      high: 0.7,
      medium: 0.4,
      low: 0.2,
    }
  }
}

/// Per-file composite risk weights. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
  pub complexity: f64,
  pub history: f64,
  pub magnitude: f64,
  pub criticality: f64,
}

impl Default for FeatureWeights {
  fn default() -> Self {
    Self {
      complexity: 0.25,
      history: 0.35,
      magnitude: 0.20,
      criticality: 0.20,
    }
  }
}

/// Blend of max and mean file risk into the deployment score. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateBlend {
  pub max_weight: f64,
  pub mean_weight: f64,
}

impl Default for AggregateBlend {
  fn default() -> Self {
    Self {
      max_weight: 0.6,
      mean_weight: 0.4,
    }
  }
}

/// Test priority weights. Must sum to 1.0; criticality dominates by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
  pub criticality: f64,
  pub coverage: f64,
  pub failure_history: f64,
  /// Preference for cheaper test kinds (unit over integration over e2e).
  pub test_type: f64,
}

impl Default for SelectionWeights {
  fn default() -> Self {
    Self {
      criticality: 0.45,
      coverage: 0.2,
      failure_history: 0.25,
      test_type: 0.1,
    }
  }
}

/// Added to the deployment score when a schema change of that impact is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaPenalty {
  pub critical: f64,
  pub high: f64,
}

impl Default for SchemaPenalty {
  fn default() -> Self {
    Self {
      critical: 0.3,
      high: 0.15,
    }
  }
}

/// Tunables for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub risk_levels: RiskLevels,
  pub feature_weights: FeatureWeights,
  pub aggregate: AggregateBlend,
  pub selection_weights: SelectionWeights,
  pub schema_penalty: SchemaPenalty,
  /// Upper bound on selected tests.
  pub max_tests: usize,
  /// Upper bound on the summed execution-time estimate of selected tests.
  pub max_time_budget_seconds: Option<f64>,
  /// Half-life (days) of a failure event's contribution to history risk.
  pub historical_window_days: f64,
  /// Substring hints (`payment`) or glob patterns (`src/**/auth/*.rs`).
  pub critical_path_patterns: Vec<String>,
  /// Critical tests are candidates even without coverage overlap.
  pub include_critical_tests: bool,
  /// History score above which a changed file pulls in every related test.
  pub history_hotspot_threshold: f64,
  /// Lines changed at which magnitude reaches ~63%.
  pub magnitude_scale: f64,
  /// Saturation rate of the complexity estimator.
  pub complexity_k: f64,
  /// Lines changed per unit of raw complexity in the line-count proxy.
  pub complexity_line_scale: f64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      risk_levels: RiskLevels::default(),
      feature_weights: FeatureWeights::default(),
      aggregate: AggregateBlend::default(),
      selection_weights: SelectionWeights::default(),
      schema_penalty: SchemaPenalty::default(),
      max_tests: 50,
      max_time_budget_seconds: None,
      historical_window_days: 90.0,
      critical_path_patterns: [
        "auth",
        "security",
        "payment",
        "user",
        "admin",
        "database",
        "migration",
        "config",
        "core",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      include_critical_tests: true,
      history_hotspot_threshold: 0.7,
      magnitude_scale: 200.0,
      complexity_k: 0.15,
      complexity_line_scale: 50.0,
    }
  }
}

impl Config {
  /// Reject weight sets that do not sum to 1.0 and out-of-order thresholds.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let w = &self.feature_weights;
    check_weights(
      "feature_weights",
      &[
        ("complexity", w.complexity),
        ("history", w.history),
        ("magnitude", w.magnitude),
        ("criticality", w.criticality),
      ],
    )?;

    let a = &self.aggregate;
    check_weights(
      "aggregate",
      &[("max_weight", a.max_weight), ("mean_weight", a.mean_weight)],
    )?;

    let s = &self.selection_weights;
    check_weights(
      "selection_weights",
      &[
        ("criticality", s.criticality),
        ("coverage", s.coverage),
        ("failure_history", s.failure_history),
        ("test_type", s.test_type),
      ],
    )?;

    let r = &self.risk_levels;
    let ordered = 0.0 <= r.low
      && r.low < r.medium
      && r.medium < r.high
      && r.high <= r.critical
      && r.critical <= 1.0;
    if !ordered {
      return Err(ConfigError::invalid(
        "risk_levels",
        format!(
          "expected 0 <= low < medium < high <= critical <= 1, got low={} medium={} high={} critical={}",
          r.low, r.medium, r.high, r.critical
        ),
      ));
    }

    if !(0.0..=1.0).contains(&self.history_hotspot_threshold) {
      return Err(ConfigError::invalid(
        "history_hotspot_threshold",
        format!("must be within [0, 1], got {}", self.history_hotspot_threshold),
      ));
    }

    for (name, value) in [("critical", self.schema_penalty.critical), ("high", self.schema_penalty.high)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
          &format!("schema_penalty.{}", name),
          format!("must be within [0, 1], got {}", value),
        ));
      }
    }

    check_positive("historical_window_days", self.historical_window_days)?;
    check_positive("magnitude_scale", self.magnitude_scale)?;
    check_positive("complexity_k", self.complexity_k)?;
    check_positive("complexity_line_scale", self.complexity_line_scale)?;
    if let Some(budget) = self.max_time_budget_seconds {
      check_positive("max_time_budget_seconds", budget)?;
    }
    Ok(())
  }
}

fn check_weights(group: &str, weights: &[(&str, f64)]) -> Result<(), ConfigError> {
  for (name, value) in weights {
    if !value.is_finite() || *value < 0.0 {
      return Err(ConfigError::invalid(
        &format!("{}.{}", group, name),
        format!("must be a finite non-negative number, got {}", value),
      ));
    }
  }
  let sum: f64 = weights.iter().map(|(_, v)| v).sum();
  if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
    return Err(ConfigError::invalid(
      group,
      format!("must sum to 1.0, got {}", sum),
    ));
  }
  Ok(())
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(ConfigError::invalid(field, format!("must be positive, got {}", value)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    Config::default().validate().unwrap();
  }

  #[test]
  fn weights_off_by_more_than_tolerance_rejected() {
    let config = Config {
      feature_weights: FeatureWeights {
        complexity: 0.3,
        ..FeatureWeights::default()
      },
      ..Config::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("feature_weights"));
  }

  #[test]
  fn weights_within_tolerance_accepted() {
    let config = Config {
      feature_weights: FeatureWeights {
        complexity: 0.25 + 5e-7,
        ..FeatureWeights::default()
      },
      ..Config::default()
    };
    assert!(config.validate().is_ok());
  }

  #[test]
  fn negative_weight_rejected() {
    let config = Config {
      feature_weights: FeatureWeights {
        complexity: -0.05,
        history: 0.65,
        ..FeatureWeights::default()
      },
      ..Config::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("feature_weights.complexity"));
  }

  #[test]
  fn threshold_ordering_enforced() {
    let config = Config {
      risk_levels: RiskLevels {
        low: 0.5,
        medium: 0.4,
        ..RiskLevels::default()
      },
      ..Config::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("risk_levels"));
  }

  #[test]
  fn partial_json_takes_defaults() {
    let config: Config =
      serde_json::from_str(r#"{"max_tests": 5, "risk_levels": {"high": 0.8}}"#).unwrap();
    assert_eq!(config.max_tests, 5);
    assert!((config.risk_levels.high - 0.8).abs() < f64::EPSILON);
    assert!((config.risk_levels.medium - 0.4).abs() < f64::EPSILON);
    assert!(config.include_critical_tests);
    config.validate().unwrap();
  }

  #[test]
  fn selection_weights_include_test_type() {
    let config: Config = serde_json::from_str(
      r#"{"selection_weights": {"criticality": 0.5, "coverage": 0.2, "failure_history": 0.3}}"#,
    )
    .unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("selection_weights"));

    let config: Config = serde_json::from_str(
      r#"{"selection_weights": {"criticality": 0.5, "coverage": 0.2, "failure_history": 0.3, "test_type": 0.0}}"#,
    )
    .unwrap();
    config.validate().unwrap();
  }

  #[test]
  fn schema_penalty_out_of_range_rejected() {
    let config: Config = serde_json::from_str(r#"{"schema_penalty": {"high": -0.1}}"#).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("schema_penalty.high"));
    assert!((config.schema_penalty.critical - 0.3).abs() < f64::EPSILON);
  }

  #[test]
  fn hotspot_threshold_must_be_a_unit_fraction() {
    let config = Config {
      history_hotspot_threshold: 1.5,
      ..Config::default()
    };
    assert!(config.validate().unwrap_err().to_string().contains("history_hotspot_threshold"));
  }
}
