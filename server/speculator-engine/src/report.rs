//! Report assembly: packages scoring and selection results into one immutable report.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::changes::CommitRef;
use crate::error::ExtractError;
use crate::score::{self, Scored};
use crate::types::*;

/// Why a repository could not be analysed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnavailableReason {
  RepositoryUnavailable { path: String, detail: String },
  CommitNotFound { reference: String },
  DiffFailed { detail: String },
}

impl From<&ExtractError> for UnavailableReason {
  fn from(err: &ExtractError) -> Self {
    match err {
      ExtractError::RepositoryUnavailable { path, reason } => Self::RepositoryUnavailable {
        path: path.clone(),
        detail: reason.clone(),
      },
      ExtractError::CommitNotFound { reference } => Self::CommitNotFound {
        reference: reference.clone(),
      },
      ExtractError::Git(e) => Self::DiffFailed {
        detail: e.message().to_string(),
      },
    }
  }
}

impl std::fmt::Display for UnavailableReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::RepositoryUnavailable { path, detail } => write!(f, "repository unavailable at {}: {}", path, detail),
      Self::CommitNotFound { reference } => write!(f, "commit not found: {}", reference),
      Self::DiffFailed { detail } => write!(f, "diff failed: {}", detail),
    }
  }
}

/// Final analysis result. Built once by [`assemble`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
  report_id: String,
  commit: String,
  deployment_risk_score: f64,
  risk_level: RiskLevel,
  verdict: Verdict,
  analysis_degraded: bool,
  change_summary: ChangeSummary,
  file_risks: Vec<FileRiskFactor>,
  #[serde(skip_serializing_if = "Option::is_none")]
  schema_impact: Option<RiskLevel>,
  schema_changes: Vec<SchemaChange>,
  selected_tests: Vec<SelectedTest>,
  coverage_score: f64,
  total_estimated_seconds: f64,
  coverage_map: BTreeMap<String, Vec<String>>,
  uncovered_files: Vec<String>,
  recommendations: Vec<String>,
  excluded_catalog_entries: Vec<ExcludedEntry>,
  skipped_failure_events: usize,
}

impl RiskReport {
  pub fn report_id(&self) -> &str {
    &self.report_id
  }

  pub fn commit(&self) -> &str {
    &self.commit
  }

  pub fn deployment_risk_score(&self) -> f64 {
    self.deployment_risk_score
  }

  pub fn risk_level(&self) -> RiskLevel {
    self.risk_level
  }

  pub fn verdict(&self) -> Verdict {
    self.verdict
  }

  /// True when the repository could not be analysed; a 0.0 score then means "unknown".
  pub fn analysis_degraded(&self) -> bool {
    self.analysis_degraded
  }

  pub fn change_summary(&self) -> &ChangeSummary {
    &self.change_summary
  }

  pub fn file_risks(&self) -> &[FileRiskFactor] {
    &self.file_risks
  }

  /// Highest impact among detected schema changes, if any.
  pub fn schema_impact(&self) -> Option<RiskLevel> {
    self.schema_impact
  }

  pub fn schema_changes(&self) -> &[SchemaChange] {
    &self.schema_changes
  }

  pub fn selected_tests(&self) -> &[SelectedTest] {
    &self.selected_tests
  }

  pub fn coverage_score(&self) -> f64 {
    self.coverage_score
  }

  pub fn total_estimated_seconds(&self) -> f64 {
    self.total_estimated_seconds
  }

  pub fn coverage_map(&self) -> &BTreeMap<String, Vec<String>> {
    &self.coverage_map
  }

  pub fn uncovered_files(&self) -> &[String] {
    &self.uncovered_files
  }

  pub fn recommendations(&self) -> &[String] {
    &self.recommendations
  }

  pub fn excluded_catalog_entries(&self) -> &[ExcludedEntry] {
    &self.excluded_catalog_entries
  }

  pub fn skipped_failure_events(&self) -> usize {
    self.skipped_failure_events
  }
}

/// Either a full report, or a degraded one plus the reason analysis failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
  Complete { report: RiskReport },
  Unavailable { reason: UnavailableReason, report: RiskReport },
}

impl AnalysisOutcome {
  pub fn report(&self) -> &RiskReport {
    match self {
      Self::Complete { report } | Self::Unavailable { report, .. } => report,
    }
  }

  pub fn into_report(self) -> RiskReport {
    match self {
      Self::Complete { report } | Self::Unavailable { report, .. } => report,
    }
  }

  pub fn is_complete(&self) -> bool {
    matches!(self, Self::Complete { .. })
  }
}

/// Everything the assembler packages.
pub struct ReportInput<'a> {
  pub commit: &'a CommitRef,
  pub changes: &'a ChangeSet,
  pub scored: Scored,
  pub selection: TestSelection,
  pub excluded_catalog_entries: Vec<ExcludedEntry>,
  pub skipped_failure_events: usize,
  pub unavailable: Option<&'a UnavailableReason>,
}

/// Pure aggregation of pipeline outputs.
pub fn assemble(input: ReportInput<'_>) -> RiskReport {
  let ReportInput {
    commit,
    changes,
    scored,
    selection,
    excluded_catalog_entries,
    skipped_failure_events,
    unavailable,
  } = input;

  let change_summary = summarize(changes, &scored);
  let mut recommendations = score::recommendations(changes, &scored);
  let verdict = match unavailable {
    Some(reason) => {
      recommendations.insert(
        0,
        format!(
          "Change analysis unavailable ({}): risk score is not meaningful, run the full critical suite",
          reason
        ),
      );
      Verdict::Review
    }
    None => score::verdict(&scored),
  };
  if !selection.uncovered_files.is_empty() && !scored.file_risks.is_empty() {
    recommendations.push(format!(
      "{} changed file(s) have no selected test coverage",
      selection.uncovered_files.len()
    ));
  }

  let report_id = report_id(commit, &scored);

  RiskReport {
    report_id,
    commit: commit.to_string(),
    deployment_risk_score: scored.deployment_risk_score,
    risk_level: scored.risk_level,
    verdict,
    analysis_degraded: unavailable.is_some(),
    change_summary,
    file_risks: scored.file_risks,
    schema_impact: scored.schema_impact,
    schema_changes: scored.schema_changes,
    selected_tests: selection.tests,
    coverage_score: selection.coverage_score,
    total_estimated_seconds: selection.total_estimated_seconds,
    coverage_map: selection.coverage_map,
    uncovered_files: selection.uncovered_files,
    recommendations,
    excluded_catalog_entries,
    skipped_failure_events,
  }
}

fn summarize(changes: &ChangeSet, scored: &Scored) -> ChangeSummary {
  let mut summary = ChangeSummary {
    files_changed: changes.len(),
    ..ChangeSummary::default()
  };
  for record in changes.records() {
    summary.lines_added += record.lines_added as u64;
    summary.lines_removed += record.lines_removed as u64;
    if record.is_critical {
      summary.critical_files.push(record.path.clone());
    }
    *summary.by_category.entry(record.category).or_insert(0) += 1;
    *summary.by_change_type.entry(record.change_type).or_insert(0) += 1;
  }
  summary.critical_files.sort();
  summary.critical_files_touched = summary.critical_files.len();
  if !scored.file_risks.is_empty() {
    summary.mean_complexity_score = scored.file_risks.iter().map(|f| f.complexity_score).sum::<f64>()
      / scored.file_risks.len() as f64;
  }
  summary
}

/// Stable id: hash of commit + scored paths + aggregate score.
fn report_id(commit: &CommitRef, scored: &Scored) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(commit.to_string().as_bytes());
  for risk in &scored.file_risks {
    hasher.update(b"|");
    hasher.update(risk.path.as_bytes());
    hasher.update(b":");
    hasher.update(format!("{:.6}", risk.composite_risk).as_bytes());
  }
  hasher.update(b"|");
  hasher.update(format!("{:.6}", scored.deployment_risk_score).as_bytes());
  let hex = hasher.finalize().to_hex();
  format!("rr-{}", &hex[..16])
}
