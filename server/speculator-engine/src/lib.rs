//! Speculator deployment-risk engine: deterministic, rule-based.
//!
//! Reads a commit (or the working tree) out of a local git repository,
//! scores every changed file against failure history and criticality, and
//! picks a budgeted, prioritized test subset covering the changed files.
//!
//! No ML, no DB, no network; pure computation over immutable snapshots.

pub mod changes;
pub mod complexity;
pub mod config;
pub mod critical;
pub mod engine;
pub mod error;
pub mod history;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod score;
pub mod select;
pub mod types;

use std::path::Path;

use serde::Deserialize;

pub use changes::CommitRef;
pub use config::Config;
pub use engine::{AnalysisEngine, EngineHandle};
pub use error::{ConfigError, EngineError, ExtractError};
pub use report::{AnalysisOutcome, RiskReport, UnavailableReason};
pub use types::{InboundCatalogEntry, InboundChange, InboundFailureEvent};

/// One analysis request, as read by the binary.
///
/// When `changes` is present the repository is not opened and the supplied
/// rows are scored directly; otherwise `repo_path` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
  #[serde(default)]
  pub repo_path: Option<String>,
  #[serde(default)]
  pub commit: Option<String>,
  #[serde(default)]
  pub config: Config,
  #[serde(default)]
  pub failure_events: Vec<InboundFailureEvent>,
  #[serde(default)]
  pub test_catalog: Vec<InboundCatalogEntry>,
  #[serde(default)]
  pub changes: Option<Vec<InboundChange>>,
}

/// Build an engine for the request and run one analysis (no stdin/stdout I/O).
pub fn run(request: &AnalysisRequest) -> Result<AnalysisOutcome, EngineError> {
  let engine = AnalysisEngine::from_inbound(
    request.config.clone(),
    &request.failure_events,
    &request.test_catalog,
  )?;
  let commit = CommitRef::parse(request.commit.as_deref());

  if let Some(rows) = &request.changes {
    let records = rows
      .iter()
      .map(normalize::normalize_change)
      .collect::<Result<Vec<_>, _>>()?;
    let changes = types::ChangeSet::from_records(records);
    return Ok(AnalysisOutcome::Complete {
      report: engine.analyze_change_set(&commit, &changes),
    });
  }

  let repo_path = request
    .repo_path
    .as_deref()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .ok_or_else(|| EngineError::validation("repo_path", "required when changes are not supplied"))?;
  Ok(engine.analyze(Path::new(repo_path), &commit))
}
