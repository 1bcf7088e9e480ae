//! Budgeted, priority-ordered test selection over a static catalog.
//!
//! Candidates are tests covering at least one changed file, plus every
//! critical test when `include_critical_tests` is on, plus tests related to a
//! changed file with a bad failure history (same file or same directory).
//! Candidates are walked
//! greedily in priority order; a test that would blow the time budget is
//! skipped and the walk continues with the cheaper ones behind it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::config::{Config, SelectionWeights};
use crate::types::*;

/// Failure count at which the history term of the priority saturates.
const FAILURE_SATURATION: f64 = 10.0;
/// Failure count above which a test is called out as unstable.
const UNSTABLE_FAILURES: u32 = 3;
/// Priority given to a pulled-in dependency relative to its dependent.
const DEPENDENCY_PRIORITY_FACTOR: f64 = 0.8;
/// Priority floor for tests related to a failure hotspot.
const HOTSPOT_PRIORITY: f64 = 0.8;
/// Type weight for catalog rows that do not declare a test type.
const UNKNOWN_TYPE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
  pub max_tests: usize,
  pub max_time_budget_seconds: Option<f64>,
  pub include_critical_tests: bool,
  /// Changed files whose history score exceeds this are hotspots.
  pub hotspot_threshold: f64,
  pub weights: SelectionWeights,
}

impl SelectionPolicy {
  pub fn from_config(config: &Config) -> Self {
    Self {
      max_tests: config.max_tests,
      max_time_budget_seconds: config.max_time_budget_seconds,
      include_critical_tests: config.include_critical_tests,
      hotspot_threshold: config.history_hotspot_threshold,
      weights: config.selection_weights.clone(),
    }
  }
}

impl Default for SelectionPolicy {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

struct Candidate<'a> {
  entry: &'a TestCatalogEntry,
  priority: f64,
  pinned: bool,
  overlap: Vec<&'a str>,
  hotspots: Vec<&'a str>,
}

/// Priority of one test against the changed set, in [0,1] for normalized weights.
pub fn priority_score(entry: &TestCatalogEntry, overlap: usize, changed: usize, weights: &SelectionWeights) -> f64 {
  let coverage_ratio = if changed == 0 {
    0.0
  } else {
    overlap as f64 / changed as f64
  };
  let failure_ratio = (entry.historical_failure_count as f64 / FAILURE_SATURATION).min(1.0);
  let type_weight = entry.test_type.map(TestType::weight).unwrap_or(UNKNOWN_TYPE_WEIGHT);
  weights.criticality * entry.criticality.weight()
    + weights.coverage * coverage_ratio
    + weights.failure_history * failure_ratio
    + weights.test_type * type_weight
}

/// Select and rank tests for `changed` under the policy's count and time budgets.
pub fn select(changed: &BTreeSet<String>, catalog: &[TestCatalogEntry], policy: &SelectionPolicy) -> TestSelection {
  select_with_history(changed, &BTreeMap::new(), catalog, policy)
}

/// [`select`], plus per-file history scores: tests related to a changed file
/// scoring above `policy.hotspot_threshold` become candidates with a
/// priority of at least 0.8.
pub fn select_with_history(
  changed: &BTreeSet<String>,
  history_scores: &BTreeMap<String, f64>,
  catalog: &[TestCatalogEntry],
  policy: &SelectionPolicy,
) -> TestSelection {
  let by_id: HashMap<&str, &TestCatalogEntry> = catalog.iter().map(|e| (e.test_id.as_str(), e)).collect();
  let hot_files: Vec<&str> = changed
    .iter()
    .filter(|f| history_scores.get(*f).is_some_and(|s| *s > policy.hotspot_threshold))
    .map(|f| f.as_str())
    .collect();

  let mut candidates: Vec<Candidate> = catalog
    .iter()
    .filter_map(|entry| {
      let overlap: Vec<&str> = entry
        .covered_files
        .iter()
        .filter(|f| changed.contains(*f))
        .map(|f| f.as_str())
        .collect();
      let pinned = policy.include_critical_tests && entry.criticality == Criticality::Critical;
      let hotspots: Vec<&str> = hot_files
        .iter()
        .copied()
        .filter(|hot| is_related(entry, hot))
        .collect();
      if overlap.is_empty() && !pinned && hotspots.is_empty() {
        return None;
      }
      let mut priority = priority_score(entry, overlap.len(), changed.len(), &policy.weights);
      if !hotspots.is_empty() {
        priority = priority.max(HOTSPOT_PRIORITY);
      }
      Some(Candidate {
        entry,
        priority,
        pinned,
        overlap,
        hotspots,
      })
    })
    .collect();

  // Deterministic order: pinned critical first, priority desc, cheaper first, then id asc.
  candidates.sort_by(|a, b| {
    b.pinned
      .cmp(&a.pinned)
      .then_with(|| b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal))
      .then_with(|| {
        a.entry
          .execution_time_seconds
          .partial_cmp(&b.entry.execution_time_seconds)
          .unwrap_or(Ordering::Equal)
      })
      .then_with(|| a.entry.test_id.cmp(&b.entry.test_id))
  });

  let mut tests: Vec<SelectedTest> = Vec::new();
  let mut chosen: HashSet<&str> = HashSet::new();
  let mut total = 0.0_f64;

  for cand in &candidates {
    if tests.len() >= policy.max_tests {
      break;
    }
    if chosen.contains(cand.entry.test_id.as_str()) {
      continue;
    }

    let deps: Vec<&TestCatalogEntry> = cand
      .entry
      .dependencies
      .iter()
      .filter(|d| !chosen.contains(d.as_str()))
      .filter_map(|d| by_id.get(d.as_str()).copied())
      .collect();

    if tests.len() + 1 + deps.len() > policy.max_tests {
      debug!(test_id = %cand.entry.test_id, deps = deps.len(), "skipping test: count budget");
      continue;
    }

    let mut next_total = total + cand.entry.execution_time_seconds;
    for dep in &deps {
      next_total += dep.execution_time_seconds;
    }
    if let Some(budget) = policy.max_time_budget_seconds {
      if next_total > budget {
        debug!(
          test_id = %cand.entry.test_id,
          seconds = next_total - total,
          remaining = budget - total,
          "skipping test: time budget"
        );
        continue;
      }
    }

    total = next_total;
    chosen.insert(cand.entry.test_id.as_str());
    tests.push(SelectedTest {
      entry: cand.entry.clone(),
      priority_score: cand.priority,
      selection_reason: reason(cand),
    });
    for dep in deps {
      chosen.insert(dep.test_id.as_str());
      tests.push(SelectedTest {
        entry: dep.clone(),
        priority_score: cand.priority * DEPENDENCY_PRIORITY_FACTOR,
        selection_reason: format!("dependency of {}", cand.entry.test_id),
      });
    }
  }

  let mut coverage_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for test in &tests {
    for file in test.entry.covered_files.iter().filter(|f| changed.contains(*f)) {
      coverage_map
        .entry(file.clone())
        .or_default()
        .push(test.entry.test_id.clone());
    }
  }
  let uncovered_files: Vec<String> = changed
    .iter()
    .filter(|f| !coverage_map.contains_key(*f))
    .cloned()
    .collect();
  let coverage_score = if changed.is_empty() {
    0.0
  } else {
    coverage_map.len() as f64 / changed.len() as f64
  };

  TestSelection {
    tests,
    coverage_score,
    total_estimated_seconds: total,
    coverage_map,
    uncovered_files,
  }
}

/// Covers `hot` directly, or covers a file in the same directory.
fn is_related(entry: &TestCatalogEntry, hot: &str) -> bool {
  if entry.covered_files.contains(hot) {
    return true;
  }
  match parent_dir(hot) {
    Some(dir) => entry.covered_files.iter().any(|f| parent_dir(f) == Some(dir)),
    None => false,
  }
}

fn parent_dir(path: &str) -> Option<&str> {
  path.rfind('/').map(|i| &path[..i]).filter(|d| !d.is_empty())
}

fn reason(cand: &Candidate) -> String {
  let mut parts: Vec<String> = Vec::new();
  if cand.pinned {
    parts.push("critical test - always included".into());
  }
  if !cand.overlap.is_empty() {
    let shown: Vec<&str> = cand.overlap.iter().take(3).copied().collect();
    let more = cand.overlap.len() - shown.len();
    let mut s = format!("covers {} changed file(s): {}", cand.overlap.len(), shown.join(", "));
    if more > 0 {
      s.push_str(&format!(" (+{} more)", more));
    }
    parts.push(s);
  }
  if !cand.hotspots.is_empty() {
    parts.push(format!("historical failures in {}", cand.hotspots.join(", ")));
  }
  if cand.entry.historical_failure_count > UNSTABLE_FAILURES {
    parts.push(format!(
      "historically unstable ({} failures)",
      cand.entry.historical_failure_count
    ));
  }
  parts.join("; ")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(id: &str, crit: Criticality, secs: f64, files: &[&str], failures: u32) -> TestCatalogEntry {
    TestCatalogEntry {
      test_id: id.into(),
      name: None,
      test_type: None,
      covered_files: files.iter().map(|f| f.to_string()).collect(),
      criticality: crit,
      execution_time_seconds: secs,
      historical_failure_count: failures,
      dependencies: Vec::new(),
    }
  }

  fn changed(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
  }

  fn ids(selection: &TestSelection) -> Vec<&str> {
    selection.tests.iter().map(|t| t.entry.test_id.as_str()).collect()
  }

  #[test]
  fn empty_inputs_select_nothing() {
    let policy = SelectionPolicy::default();
    let s = select(&changed(&["a.py"]), &[], &policy);
    assert!(s.tests.is_empty());
    assert_eq!(s.coverage_score, 0.0);

    let catalog = vec![entry("t", Criticality::High, 1.0, &["a.py"], 0)];
    let s = select(&BTreeSet::new(), &catalog, &policy);
    assert!(s.tests.is_empty());
    assert_eq!(s.coverage_score, 0.0);
  }

  #[test]
  fn critical_test_beats_uncovering_cheap_test_with_one_slot() {
    let catalog = vec![
      entry("testA", Criticality::Critical, 100.0, &["x.py"], 0),
      entry("testB", Criticality::Low, 1.0, &["y.py"], 0),
    ];
    let policy = SelectionPolicy {
      max_tests: 1,
      ..SelectionPolicy::default()
    };
    let s = select(&changed(&["y.py"]), &catalog, &policy);
    assert_eq!(ids(&s), vec!["testA"]);
    assert!(s.tests[0].selection_reason.contains("always included"));
    assert_eq!(s.coverage_score, 0.0);
    assert_eq!(s.uncovered_files, vec!["y.py".to_string()]);
  }

  #[test]
  fn critical_policy_off_requires_overlap() {
    let catalog = vec![
      entry("testA", Criticality::Critical, 100.0, &["x.py"], 0),
      entry("testB", Criticality::Low, 1.0, &["y.py"], 0),
    ];
    let policy = SelectionPolicy {
      max_tests: 1,
      include_critical_tests: false,
      ..SelectionPolicy::default()
    };
    let s = select(&changed(&["y.py"]), &catalog, &policy);
    assert_eq!(ids(&s), vec!["testB"]);
    assert_eq!(s.coverage_score, 1.0);
  }

  #[test]
  fn cheap_critical_selected_before_expensive_noncritical() {
    let catalog = vec![
      entry("slow-high", Criticality::High, 500.0, &["a.py"], 9),
      entry("cheap-critical", Criticality::Critical, 2.0, &[], 0),
    ];
    let s = select(&changed(&["a.py"]), &catalog, &SelectionPolicy::default());
    assert_eq!(ids(&s), vec!["cheap-critical", "slow-high"]);
  }

  #[test]
  fn over_budget_test_is_skipped_and_walk_continues() {
    let catalog = vec![
      entry("big", Criticality::High, 50.0, &["a.py"], 5),
      entry("small", Criticality::Medium, 5.0, &["a.py"], 0),
    ];
    let policy = SelectionPolicy {
      max_time_budget_seconds: Some(10.0),
      ..SelectionPolicy::default()
    };
    let s = select(&changed(&["a.py"]), &catalog, &policy);
    assert_eq!(ids(&s), vec!["small"]);
    assert!(s.total_estimated_seconds <= 10.0);
  }

  #[test]
  fn equal_priority_and_time_order_by_id() {
    let catalog = vec![
      entry("zeta", Criticality::Medium, 3.0, &["a.py"], 1),
      entry("alpha", Criticality::Medium, 3.0, &["a.py"], 1),
      entry("mid", Criticality::Medium, 1.0, &["a.py"], 1),
    ];
    let s = select(&changed(&["a.py"]), &catalog, &SelectionPolicy::default());
    assert_eq!(ids(&s), vec!["mid", "alpha", "zeta"]);
  }

  #[test]
  fn dependencies_follow_their_dependent() {
    let mut api = entry("api", Criticality::High, 3.0, &["src/api.py"], 0);
    api.dependencies = vec!["fixtures".into()];
    let catalog = vec![api, entry("fixtures", Criticality::Low, 1.0, &[], 0)];
    let s = select(&changed(&["src/api.py"]), &catalog, &SelectionPolicy::default());
    assert_eq!(ids(&s), vec!["api", "fixtures"]);
    assert_eq!(s.tests[1].selection_reason, "dependency of api");
    assert!((s.tests[1].priority_score - s.tests[0].priority_score * 0.8).abs() < 1e-12);
  }

  #[test]
  fn dependency_group_must_fit_count_budget() {
    let mut api = entry("api", Criticality::High, 3.0, &["src/api.py"], 0);
    api.dependencies = vec!["fixtures".into()];
    let catalog = vec![
      api,
      entry("fixtures", Criticality::Low, 1.0, &[], 0),
      entry("unit", Criticality::Low, 1.0, &["src/api.py"], 0),
    ];
    let policy = SelectionPolicy {
      max_tests: 1,
      ..SelectionPolicy::default()
    };
    let s = select(&changed(&["src/api.py"]), &catalog, &policy);
    assert_eq!(ids(&s), vec!["unit"]);
  }

  #[test]
  fn coverage_map_and_score() {
    let catalog = vec![
      entry("t1", Criticality::Medium, 1.0, &["a.py", "b.py"], 0),
      entry("t2", Criticality::Medium, 1.0, &["b.py"], 0),
    ];
    let s = select(&changed(&["a.py", "b.py", "c.py"]), &catalog, &SelectionPolicy::default());
    assert!((s.coverage_score - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(s.coverage_map["b.py"], vec!["t1".to_string(), "t2".to_string()]);
    assert_eq!(s.uncovered_files, vec!["c.py".to_string()]);
  }

  #[test]
  fn unstable_tests_are_called_out() {
    let catalog = vec![entry("flaky", Criticality::Medium, 1.0, &["a.py"], 7)];
    let s = select(&changed(&["a.py"]), &catalog, &SelectionPolicy::default());
    assert!(s.tests[0].selection_reason.contains("historically unstable (7 failures)"));
  }

  #[test]
  fn unit_tests_outrank_e2e_with_otherwise_equal_inputs() {
    let mut e2e = entry("a-e2e", Criticality::Medium, 3.0, &["a.py"], 0);
    e2e.test_type = Some(TestType::E2e);
    let mut unit = entry("b-unit", Criticality::Medium, 3.0, &["a.py"], 0);
    unit.test_type = Some(TestType::Unit);
    let s = select(&changed(&["a.py"]), &[e2e, unit], &SelectionPolicy::default());
    assert_eq!(ids(&s), vec!["b-unit", "a-e2e"]);
    assert!(s.tests[0].priority_score > s.tests[1].priority_score);
  }

  #[test]
  fn untyped_tests_sit_between_e2e_and_unit() {
    let weights = SelectionWeights::default();
    let mut t = entry("t", Criticality::Low, 1.0, &["a.py"], 0);
    let untyped = priority_score(&t, 1, 1, &weights);
    t.test_type = Some(TestType::Unit);
    assert!(priority_score(&t, 1, 1, &weights) > untyped);
    t.test_type = Some(TestType::E2e);
    assert!((priority_score(&t, 1, 1, &weights) - untyped).abs() < 1e-12);
  }

  #[test]
  fn hotspot_pulls_in_same_directory_tests() {
    let catalog = vec![
      entry("billing-neighbour", Criticality::Low, 2.0, &["src/billing/invoice.py"], 0),
      entry("direct", Criticality::Low, 1.0, &["src/billing/ledger.py"], 0),
      entry("elsewhere", Criticality::Low, 1.0, &["src/api/routes.py"], 0),
    ];
    let history = BTreeMap::from([("src/billing/ledger.py".to_string(), 0.9)]);
    let s = select_with_history(
      &changed(&["src/billing/ledger.py"]),
      &history,
      &catalog,
      &SelectionPolicy::default(),
    );
    assert_eq!(ids(&s), vec!["direct", "billing-neighbour"]);
    assert!(s.tests.iter().all(|t| t.priority_score >= 0.8));
    assert!(s.tests[1]
      .selection_reason
      .contains("historical failures in src/billing/ledger.py"));
  }

  #[test]
  fn history_below_threshold_changes_nothing() {
    let catalog = vec![
      entry("neighbour", Criticality::Low, 2.0, &["src/billing/invoice.py"], 0),
      entry("direct", Criticality::Low, 1.0, &["src/billing/ledger.py"], 0),
    ];
    let history = BTreeMap::from([("src/billing/ledger.py".to_string(), 0.5)]);
    let changed = changed(&["src/billing/ledger.py"]);
    let with = select_with_history(&changed, &history, &catalog, &SelectionPolicy::default());
    let without = select(&changed, &catalog, &SelectionPolicy::default());
    assert_eq!(with, without);
    assert_eq!(ids(&with), vec!["direct"]);
  }
}
