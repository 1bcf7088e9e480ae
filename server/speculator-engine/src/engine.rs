//! Analysis engine: immutable snapshots of history + catalog, one report per call.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::changes::{self, CommitRef};
use crate::complexity::ComplexityEstimator;
use crate::config::Config;
use crate::critical::CriticalPathMatcher;
use crate::error::ConfigError;
use crate::history::HistoryIndex;
use crate::normalize::{self, normalize_path};
use crate::report::{self, AnalysisOutcome, ReportInput, RiskReport, UnavailableReason};
use crate::score::RiskScorer;
use crate::select::{self, SelectionPolicy};
use crate::types::*;

/// Long-lived, read-only engine. Safe to share across threads; every call
/// keeps its own per-run state.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
  config: Config,
  scorer: RiskScorer,
  complexity: ComplexityEstimator,
  matcher: CriticalPathMatcher,
  policy: SelectionPolicy,
  history: Arc<HistoryIndex>,
  catalog: Arc<TestCatalog>,
  skipped_failure_events: usize,
}

impl AnalysisEngine {
  /// Validate `config` and wrap prebuilt snapshots.
  pub fn new(config: Config, history: Arc<HistoryIndex>, catalog: Arc<TestCatalog>) -> Result<Self, ConfigError> {
    let scorer = RiskScorer::new(&config)?;
    let matcher = CriticalPathMatcher::new(&config.critical_path_patterns)?;
    Ok(Self {
      complexity: ComplexityEstimator::from_config(&config),
      policy: SelectionPolicy::from_config(&config),
      scorer,
      matcher,
      history,
      catalog,
      skipped_failure_events: 0,
      config,
    })
  }

  /// Normalize raw failure events and catalog rows, build the index, then [`Self::new`].
  pub fn from_inbound(
    config: Config,
    failure_events: &[InboundFailureEvent],
    catalog: &[InboundCatalogEntry],
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let (events, skipped) = normalize::normalize_failure_events(failure_events);
    let history = HistoryIndex::build(&events, config.historical_window_days);
    let catalog = normalize::normalize_catalog(catalog);
    info!(
      failure_events = events.len(),
      skipped_events = skipped.len(),
      history_paths = history.path_count(),
      catalog_tests = catalog.entries.len(),
      excluded_tests = catalog.excluded.len(),
      "loaded analysis snapshots"
    );
    let mut engine = Self::new(config, Arc::new(history), Arc::new(catalog))?;
    engine.skipped_failure_events = skipped.len();
    Ok(engine)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn history(&self) -> &HistoryIndex {
    &self.history
  }

  pub fn catalog(&self) -> &TestCatalog {
    &self.catalog
  }

  pub fn matcher(&self) -> &CriticalPathMatcher {
    &self.matcher
  }

  /// Extract, score, select and assemble for one commit.
  ///
  /// Extraction failures produce `AnalysisOutcome::Unavailable` with a
  /// zero-file, degraded report rather than an error.
  pub fn analyze(&self, repo_path: &Path, commit: &CommitRef) -> AnalysisOutcome {
    match changes::extract(repo_path, commit, &self.matcher) {
      Ok(changes) => AnalysisOutcome::Complete {
        report: self.run(commit, &changes, None),
      },
      Err(e) => {
        let reason = UnavailableReason::from(&e);
        warn!(repo = %repo_path.display(), commit = %commit, error = %e, "analysis degraded");
        let report = self.run(commit, &ChangeSet::empty(), Some(&reason));
        AnalysisOutcome::Unavailable { reason, report }
      }
    }
  }

  /// Score an already-extracted change set. Paths are normalized and the
  /// critical flag is OR-ed with the configured matcher.
  pub fn analyze_change_set(&self, commit: &CommitRef, changes: &ChangeSet) -> RiskReport {
    let prepared = ChangeSet::from_records(changes.records().iter().map(|r| {
      let path = normalize_path(&r.path);
      let schema_changes = r
        .schema_changes
        .iter()
        .map(|c| SchemaChange {
          path: path.clone(),
          ..c.clone()
        })
        .collect();
      ChangeRecord {
        is_critical: r.is_critical || self.matcher.is_critical(&path),
        path,
        schema_changes,
        ..r.clone()
      }
    }));
    self.run(commit, &prepared, None)
  }

  fn run(&self, commit: &CommitRef, changes: &ChangeSet, unavailable: Option<&UnavailableReason>) -> RiskReport {
    let scored = self
      .scorer
      .score(changes, |r| self.complexity.estimate(r), &self.history);
    let history_scores: BTreeMap<String, f64> = scored
      .file_risks
      .iter()
      .map(|f| (f.path.clone(), f.historical_failure_score))
      .collect();
    let selection = select::select_with_history(&changes.paths(), &history_scores, &self.catalog.entries, &self.policy);

    info!(
      commit = %commit,
      files = changes.len(),
      deployment_risk = scored.deployment_risk_score,
      level = ?scored.risk_level,
      tests = selection.tests.len(),
      coverage = selection.coverage_score,
      "analysis complete"
    );

    report::assemble(ReportInput {
      commit,
      changes,
      scored,
      selection,
      excluded_catalog_entries: self.catalog.excluded.clone(),
      skipped_failure_events: self.skipped_failure_events,
      unavailable,
    })
  }
}

/// Shared slot for the current engine. Reloads build a complete engine off to
/// the side and publish it with a pointer swap; readers never see a partial index.
#[derive(Debug)]
pub struct EngineHandle {
  current: RwLock<Arc<AnalysisEngine>>,
}

impl EngineHandle {
  pub fn new(engine: AnalysisEngine) -> Self {
    Self {
      current: RwLock::new(Arc::new(engine)),
    }
  }

  /// Snapshot of the engine in effect right now.
  pub fn current(&self) -> Arc<AnalysisEngine> {
    let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
    Arc::clone(&guard)
  }

  /// Swap in a new engine; returns the one it replaced.
  pub fn publish(&self, engine: AnalysisEngine) -> Arc<AnalysisEngine> {
    let next = Arc::new(engine);
    let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
    std::mem::replace(&mut *guard, next)
  }
}
