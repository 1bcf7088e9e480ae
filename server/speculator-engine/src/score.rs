//! Per-file composite risk, deployment aggregate, risk levels, and recommendations.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::complexity::saturate;
use crate::config::{AggregateBlend, Config, FeatureWeights, RiskLevels, SchemaPenalty};
use crate::error::ConfigError;
use crate::history::HistoryIndex;
use crate::schema;
use crate::types::*;

/// Output of [`RiskScorer::score`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
  /// Sorted by composite risk desc, then path asc.
  pub file_risks: Vec<FileRiskFactor>,
  pub deployment_risk_score: f64,
  pub risk_level: RiskLevel,
  pub max_risk: f64,
  pub mean_risk: f64,
  /// Deployment score sits under the configured `low` floor.
  pub below_floor: bool,
  /// DDL found in database files, in change order.
  pub schema_changes: Vec<SchemaChange>,
  /// Highest impact among `schema_changes`.
  pub schema_impact: Option<RiskLevel>,
}

/// Weighted-sum scorer. Construction validates the configuration.
#[derive(Debug, Clone)]
pub struct RiskScorer {
  weights: FeatureWeights,
  aggregate: AggregateBlend,
  levels: RiskLevels,
  schema_penalty: SchemaPenalty,
  magnitude_scale: f64,
}

impl RiskScorer {
  pub fn new(config: &Config) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      weights: config.feature_weights.clone(),
      aggregate: config.aggregate.clone(),
      levels: config.risk_levels.clone(),
      schema_penalty: config.schema_penalty.clone(),
      magnitude_scale: config.magnitude_scale,
    })
  }

  /// Score every change and blend the results into one deployment score.
  /// Critical or high-impact schema changes raise the blend by a fixed penalty.
  pub fn score<F>(&self, changes: &ChangeSet, complexity: F, history: &HistoryIndex) -> Scored
  where
    F: Fn(&ChangeRecord) -> f64,
  {
    let mut file_risks: Vec<FileRiskFactor> = changes
      .records()
      .iter()
      .map(|record| self.file_risk(record, complexity(record), history.lookup_change(record)))
      .collect();

    // Deterministic sort: risk desc, then path asc.
    file_risks.sort_by(|a, b| {
      b.composite_risk
        .partial_cmp(&a.composite_risk)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.path.cmp(&b.path))
    });

    if file_risks.is_empty() {
      return Scored {
        file_risks,
        deployment_risk_score: 0.0,
        risk_level: RiskLevel::Low,
        max_risk: 0.0,
        mean_risk: 0.0,
        below_floor: true,
        schema_changes: Vec::new(),
        schema_impact: None,
      };
    }

    let max_risk = file_risks[0].composite_risk;
    let mean_risk =
      file_risks.iter().map(|f| f.composite_risk).sum::<f64>() / file_risks.len() as f64;
    let schema_changes: Vec<SchemaChange> = changes
      .records()
      .iter()
      .flat_map(|r| r.schema_changes.iter().cloned())
      .collect();
    let schema_impact = schema::overall_impact(&schema_changes);
    let penalty = match schema_impact {
      Some(RiskLevel::Critical) => self.schema_penalty.critical,
      Some(RiskLevel::High) => self.schema_penalty.high,
      _ => 0.0,
    };
    let deployment_risk_score =
      unit(self.aggregate.max_weight * max_risk + self.aggregate.mean_weight * mean_risk + penalty);

    Scored {
      risk_level: self.level(deployment_risk_score),
      below_floor: self.below_floor(deployment_risk_score),
      file_risks,
      deployment_risk_score,
      max_risk,
      mean_risk,
      schema_changes,
      schema_impact,
    }
  }

  /// Composite risk for one file from already-computed component signals.
  pub fn file_risk(&self, record: &ChangeRecord, complexity_score: f64, historical_failure_score: f64) -> FileRiskFactor {
    let complexity_score = unit(complexity_score);
    let historical_failure_score = unit(historical_failure_score);
    let weighted_lines = record.lines_changed() as f64 * record.category.magnitude_multiplier();
    let change_magnitude_score = saturate(weighted_lines / self.magnitude_scale);
    let criticality_bonus = if record.is_critical { 1.0 } else { 0.0 };

    let w = &self.weights;
    let composite_risk = unit(
      w.complexity * complexity_score
        + w.history * historical_failure_score
        + w.magnitude * change_magnitude_score
        + w.criticality * criticality_bonus,
    );

    FileRiskFactor {
      path: record.path.clone(),
      complexity_score,
      historical_failure_score,
      change_magnitude_score,
      criticality_bonus,
      composite_risk,
      risk_level: self.level(composite_risk),
    }
  }

  /// Map a score onto a level; anything under `medium` is low.
  pub fn level(&self, score: f64) -> RiskLevel {
    let l = &self.levels;
    if score >= l.critical {
      RiskLevel::Critical
    } else if score >= l.high {
      RiskLevel::High
    } else if score >= l.medium {
      RiskLevel::Medium
    } else {
      RiskLevel::Low
    }
  }

  /// Whether a score sits under the configured low floor.
  pub fn below_floor(&self, score: f64) -> bool {
    score < self.levels.low
  }
}

/// Clamp into [0,1]; NaN becomes 0.
fn unit(x: f64) -> f64 {
  if x.is_nan() {
    0.0
  } else {
    x.clamp(0.0, 1.0)
  }
}

/// Go/no-go hint from max and mean file risk. A critical schema change
/// forces at least `caution`, a high one at least `review`.
pub fn verdict(scored: &Scored) -> Verdict {
  let base = if scored.max_risk > 0.8 {
    Verdict::Halt
  } else if scored.mean_risk > 0.6 {
    Verdict::Caution
  } else if scored.max_risk > 0.6 {
    Verdict::Review
  } else if scored.mean_risk > 0.4 {
    Verdict::ProceedWithCare
  } else {
    Verdict::Proceed
  };
  let floor = match scored.schema_impact {
    Some(RiskLevel::Critical) => Verdict::Caution,
    Some(RiskLevel::High) => Verdict::Review,
    _ => Verdict::Proceed,
  };
  if urgency(floor) > urgency(base) {
    floor
  } else {
    base
  }
}

fn urgency(v: Verdict) -> u8 {
  match v {
    Verdict::Proceed => 0,
    Verdict::ProceedWithCare => 1,
    Verdict::Review => 2,
    Verdict::Caution => 3,
    Verdict::Halt => 4,
  }
}

/// Rule-based, deduplicated hints in file-risk order.
pub fn recommendations(changes: &ChangeSet, scored: &Scored) -> Vec<String> {
  let records: HashMap<&str, &ChangeRecord> =
    changes.records().iter().map(|r| (r.path.as_str(), r)).collect();

  let mut out: Vec<String> = Vec::new();
  let mut push = |s: String| {
    if !out.contains(&s) {
      out.push(s);
    }
  };

  for change in &scored.schema_changes {
    if change.impact >= RiskLevel::Medium {
      push(schema::recommendation(change));
    }
  }

  for risk in &scored.file_risks {
    let path = risk.path.as_str();
    if matches!(risk.risk_level, RiskLevel::High | RiskLevel::Critical) {
      push(format!("High-risk change in {}: run the full test suite before deployment", path));
    }
    if risk.complexity_score > 0.6 {
      push(format!("High complexity change in {}: consider refactoring", path));
    }
    if risk.historical_failure_score > 0.7 {
      push(format!("{} has a history of failures: extra scrutiny recommended", path));
    }
    if risk.criticality_bonus > 0.0 {
      push(format!("Critical file {} modified: ensure comprehensive testing", path));
    }
    if risk.change_magnitude_score > 0.7 {
      push(format!("Large change in {}: consider splitting into smaller commits", path));
    }
    match records.get(path).map(|r| r.category) {
      Some(FileCategory::Database) => {
        push(format!("Database change in {}: test rollback and verify schema compatibility", path));
      }
      Some(FileCategory::Config) => {
        push(format!("Configuration change in {}: validate in staging first", path));
      }
      _ => {}
    }
  }

  if out.is_empty() && !scored.file_risks.is_empty() {
    if scored.below_floor {
      out.push("Changes appear low-risk: standard review process recommended".to_string());
    } else {
      out.push("Moderate risk: standard review plus the selected tests".to_string());
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(path: &str, added: u32, removed: u32, critical: bool) -> ChangeRecord {
    ChangeRecord {
      path: path.into(),
      previous_path: None,
      lines_added: added,
      lines_removed: removed,
      change_type: ChangeType::Modified,
      category: FileCategory::classify(path),
      is_critical: critical,
      control_flow: None,
      schema_changes: Vec::new(),
    }
  }

  fn scorer() -> RiskScorer {
    RiskScorer::new(&Config::default()).unwrap()
  }

  #[test]
  fn empty_change_set_scores_zero() {
    let scored = scorer().score(&ChangeSet::empty(), |_| 1.0, &HistoryIndex::empty());
    assert_eq!(scored.deployment_risk_score, 0.0);
    assert_eq!(scored.risk_level, RiskLevel::Low);
    assert!(scored.file_risks.is_empty());
    assert_eq!(verdict(&scored), Verdict::Proceed);
    assert!(recommendations(&ChangeSet::empty(), &scored).is_empty());
  }

  #[test]
  fn invalid_weights_rejected_at_construction() {
    let config = Config {
      feature_weights: FeatureWeights {
        history: 0.5,
        ..FeatureWeights::default()
      },
      ..Config::default()
    };
    let err = RiskScorer::new(&config).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidWeights { .. }));
  }

  #[test]
  fn critical_payment_file_is_at_least_medium() {
    let changes = ChangeSet::from_records(vec![record("src/payment/processor.py", 200, 10, true)]);
    let est = crate::complexity::ComplexityEstimator::default();
    let scored = scorer().score(&changes, |r| est.estimate(r), &HistoryIndex::empty());
    let file = &scored.file_risks[0];
    assert!(file.composite_risk >= 0.4, "composite {}", file.composite_risk);
    assert!(scored.risk_level >= RiskLevel::Medium);
  }

  #[test]
  fn deployment_blends_max_and_mean() {
    let changes = ChangeSet::from_records(vec![
      record("big.rs", 1_000, 0, true),
      record("tiny.rs", 1, 0, false),
    ]);
    let scored = scorer().score(&changes, |_| 0.0, &HistoryIndex::empty());
    let max = scored.file_risks[0].composite_risk;
    let mean = (scored.file_risks[0].composite_risk + scored.file_risks[1].composite_risk) / 2.0;
    assert!((scored.deployment_risk_score - (0.6 * max + 0.4 * mean)).abs() < 1e-12);
    assert_eq!(scored.file_risks[0].path, "big.rs");
  }

  #[test]
  fn ties_sort_by_path() {
    let changes = ChangeSet::from_records(vec![record("b.rs", 5, 0, false), record("a.rs", 5, 0, false)]);
    let scored = scorer().score(&changes, |_| 0.0, &HistoryIndex::empty());
    assert_eq!(scored.file_risks[0].path, "a.rs");
    assert_eq!(scored.file_risks[1].path, "b.rs");
  }

  #[test]
  fn database_changes_weigh_more_than_code() {
    let s = scorer();
    let db = s.file_risk(&record("db/V3__users.sql", 100, 0, false), 0.0, 0.0);
    let code = s.file_risk(&record("src/users.rs", 100, 0, false), 0.0, 0.0);
    assert!(db.change_magnitude_score > code.change_magnitude_score);
  }

  #[test]
  fn misbehaving_component_inputs_are_clamped() {
    let s = scorer();
    let risk = s.file_risk(&record("a.rs", 10, 0, true), f64::NAN, 7.0);
    assert_eq!(risk.complexity_score, 0.0);
    assert_eq!(risk.historical_failure_score, 1.0);
    assert!((0.0..=1.0).contains(&risk.composite_risk));
  }

  #[test]
  fn level_mapping_uses_thresholds() {
    let s = scorer();
    assert_eq!(s.level(0.1), RiskLevel::Low);
    assert_eq!(s.level(0.4), RiskLevel::Medium);
    assert_eq!(s.level(0.7), RiskLevel::High);
    assert_eq!(s.level(0.9), RiskLevel::Critical);
    assert!(s.below_floor(0.1));
  }

  #[test]
  fn recommendations_mention_category_and_criticality() {
    let changes = ChangeSet::from_records(vec![
      record("db/V3__users.sql", 10, 0, true),
      record("config/app.yaml", 2, 0, false),
    ]);
    let scored = scorer().score(&changes, |_| 0.0, &HistoryIndex::empty());
    let recs = recommendations(&changes, &scored);
    assert!(recs.iter().any(|r| r.starts_with("Database change in db/V3__users.sql")));
    assert!(recs.iter().any(|r| r.starts_with("Critical file db/V3__users.sql")));
    assert!(recs.iter().any(|r| r.starts_with("Configuration change in config/app.yaml")));
  }

  #[test]
  fn dropped_table_raises_score_and_verdict() {
    let plain = record("db/V8__users.sql", 1, 0, false);
    let mut dropping = plain.clone();
    dropping.schema_changes = crate::schema::scan(&dropping.path, "DROP TABLE users;");

    let s = scorer();
    let baseline = s.score(&ChangeSet::from_records(vec![plain]), |_| 0.0, &HistoryIndex::empty());
    let changes = ChangeSet::from_records(vec![dropping]);
    let scored = s.score(&changes, |_| 0.0, &HistoryIndex::empty());

    assert_eq!(scored.schema_impact, Some(RiskLevel::Critical));
    assert!((scored.deployment_risk_score - baseline.deployment_risk_score - 0.3).abs() < 1e-12);
    assert_eq!(verdict(&baseline), Verdict::Proceed);
    assert_eq!(verdict(&scored), Verdict::Caution);
    let recs = recommendations(&changes, &scored);
    assert!(recs[0].starts_with("Table users dropped in db/V8__users.sql"));
  }

  #[test]
  fn high_impact_schema_change_forces_review_only() {
    let mut altering = record("db/V9__email.sql", 1, 0, false);
    altering.schema_changes =
      crate::schema::scan(&altering.path, "ALTER TABLE users MODIFY COLUMN email varchar(320);");
    let mut adding = record("db/V10__nick.sql", 1, 0, false);
    adding.schema_changes = crate::schema::scan(&adding.path, "ALTER TABLE users ADD COLUMN nickname text;");

    let s = scorer();
    let high = s.score(&ChangeSet::from_records(vec![altering]), |_| 0.0, &HistoryIndex::empty());
    assert_eq!(high.schema_impact, Some(RiskLevel::High));
    assert_eq!(verdict(&high), Verdict::Review);

    let low = s.score(&ChangeSet::from_records(vec![adding]), |_| 0.0, &HistoryIndex::empty());
    assert_eq!(low.schema_impact, Some(RiskLevel::Low));
    assert_eq!(verdict(&low), Verdict::Proceed);
  }

  #[test]
  fn tiny_change_gets_low_risk_hint() {
    let changes = ChangeSet::from_records(vec![record("src/readme_gen.rs", 1, 0, false)]);
    let scored = scorer().score(&changes, |_| 0.0, &HistoryIndex::empty());
    assert!(scored.below_floor);
    assert_eq!(
      recommendations(&changes, &scored),
      vec!["Changes appear low-risk: standard review process recommended".to_string()]
    );
  }
}
