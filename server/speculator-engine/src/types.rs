//! Core types for the speculator engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Inbound types (JSON contract, as supplied by the caller)
// ---------------------------------------------------------------------------

/// One historical failure record as supplied by the caller. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFailureEvent {
  #[serde(default)]
  pub timestamp: String,
  #[serde(default)]
  pub file_path: String,
  #[serde(default)]
  pub severity: String,
  #[serde(default)]
  pub resolution_time_hours: Option<f64>,
  #[serde(default)]
  pub failure_type: Option<String>,
}

/// One changed file supplied directly by a caller that already has diff stats.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundChange {
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub previous_path: Option<String>,
  #[serde(default)]
  pub lines_added: u32,
  #[serde(default)]
  pub lines_removed: u32,
  #[serde(default)]
  pub change_type: Option<String>,
  #[serde(default)]
  pub is_critical: bool,
  /// Text of the added lines; scanned for DDL when the path is a database file.
  #[serde(default)]
  pub added_content: Option<String>,
}

/// One test catalog row as supplied by the caller.
///
/// Every field is optional at the serde layer so a single bad row is reported
/// as excluded instead of failing the whole catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundCatalogEntry {
  #[serde(default)]
  pub test_id: String,
  #[serde(default, alias = "test_name")]
  pub name: Option<String>,
  #[serde(default)]
  pub test_type: Option<String>,
  #[serde(default)]
  pub covered_files: Vec<String>,
  #[serde(default)]
  pub criticality: Option<String>,
  #[serde(default)]
  pub execution_time_seconds: Option<f64>,
  #[serde(default, alias = "failure_count")]
  pub historical_failure_count: Option<i64>,
  #[serde(default)]
  pub dependencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Enums (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "low" | "minor" | "info" => Some(Self::Low),
      "medium" | "moderate" | "warning" | "warn" => Some(Self::Medium),
      "high" | "major" | "error" => Some(Self::High),
      "critical" | "fatal" | "crit" | "blocker" => Some(Self::Critical),
      _ => None,
    }
  }

  /// Contribution of one fresh failure to a path's raw history score.
  pub fn weight(self) -> f64 {
    match self {
      Self::Low => 0.25,
      Self::Medium => 0.5,
      Self::High => 0.75,
      Self::Critical => 1.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
  Critical,
  High,
  Medium,
  Low,
}

impl Criticality {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "critical" | "crit" => Some(Self::Critical),
      "high" => Some(Self::High),
      "medium" | "normal" => Some(Self::Medium),
      "low" => Some(Self::Low),
      _ => None,
    }
  }

  pub fn weight(self) -> f64 {
    match self {
      Self::Critical => 1.0,
      Self::High => 0.8,
      Self::Medium => 0.5,
      Self::Low => 0.3,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
  Unit,
  Integration,
  E2e,
  Performance,
}

impl TestType {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "unit" => Some(Self::Unit),
      "integration" | "it" => Some(Self::Integration),
      "e2e" | "end-to-end" | "end_to_end" => Some(Self::E2e),
      "performance" | "perf" | "load" => Some(Self::Performance),
      _ => None,
    }
  }

  /// Selection preference: cheaper, more focused kinds rank higher.
  pub fn weight(self) -> f64 {
    match self {
      Self::Unit => 0.9,
      Self::Integration => 0.7,
      Self::Performance => 0.6,
      Self::E2e => 0.5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
  Added,
  Modified,
  Deleted,
  Renamed,
}

impl ChangeType {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "added" | "add" | "a" | "new" => Some(Self::Added),
      "modified" | "modify" | "m" | "changed" => Some(Self::Modified),
      "deleted" | "delete" | "d" | "removed" => Some(Self::Deleted),
      "renamed" | "rename" | "r" | "moved" => Some(Self::Renamed),
      _ => None,
    }
  }
}

/// Coarse file category; database and config edits carry extra magnitude weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
  Code,
  Config,
  Database,
}

impl FileCategory {
  pub fn classify(path: &str) -> Self {
    let p = path.to_ascii_lowercase();
    if p.ends_with(".sql") || p.ends_with(".ddl") || p.contains("migration") || p.contains("schema") {
      return Self::Database;
    }
    const CONFIG_EXTS: [&str; 9] = [
      ".yaml",
      ".yml",
      ".json",
      ".xml",
      ".conf",
      ".ini",
      ".toml",
      ".properties",
      ".env",
    ];
    if CONFIG_EXTS.iter().any(|ext| p.ends_with(ext)) {
      return Self::Config;
    }
    Self::Code
  }

  pub fn magnitude_multiplier(self) -> f64 {
    match self {
      Self::Code => 1.0,
      Self::Config => 1.3,
      Self::Database => 1.5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
  Critical,
}

/// Deployment go/no-go hint derived from the aggregate and mean scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Halt,
  Caution,
  Review,
  ProceedWithCare,
  Proceed,
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// Decision points (branches, loops, short-circuit operators) seen in a file's diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowDelta {
  pub added: u32,
  pub removed: u32,
}

/// DDL statement kinds recognized in database files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChangeKind {
  AddTable,
  DropTable,
  AddColumn,
  DropColumn,
  ModifyColumn,
  AddIndex,
}

/// One schema statement found in the added lines of a database file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaChange {
  pub path: String,
  pub kind: SchemaChangeKind,
  pub table: String,
  /// Column name, or the index name for `add_index`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub column: Option<String>,
  pub impact: RiskLevel,
}

/// One changed file in a commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
  pub path: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub previous_path: Option<String>,
  pub lines_added: u32,
  pub lines_removed: u32,
  pub change_type: ChangeType,
  pub category: FileCategory,
  pub is_critical: bool,
  /// `None` when the file type has no structural analysis.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub control_flow: Option<ControlFlowDelta>,
  /// DDL found in the added lines; database files only.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub schema_changes: Vec<SchemaChange>,
}

impl ChangeRecord {
  pub fn lines_changed(&self) -> u64 {
    self.lines_added as u64 + self.lines_removed as u64
  }
}

/// Ordered, path-unique collection of changes for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
  records: Vec<ChangeRecord>,
}

impl ChangeSet {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Build a set, folding later records with an already-seen path into the first one.
  pub fn from_records(records: impl IntoIterator<Item = ChangeRecord>) -> Self {
    let mut out: Vec<ChangeRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
      match index.get(&record.path).and_then(|&i| out.get_mut(i)) {
        Some(existing) => {
          existing.lines_added = existing.lines_added.saturating_add(record.lines_added);
          existing.lines_removed = existing.lines_removed.saturating_add(record.lines_removed);
          existing.is_critical |= record.is_critical;
          existing.control_flow = match (existing.control_flow, record.control_flow) {
            (Some(a), Some(b)) => Some(ControlFlowDelta {
              added: a.added.saturating_add(b.added),
              removed: a.removed.saturating_add(b.removed),
            }),
            (a, b) => a.or(b),
          };
          existing.schema_changes.extend(record.schema_changes);
        }
        None => {
          index.insert(record.path.clone(), out.len());
          out.push(record);
        }
      }
    }
    Self { records: out }
  }

  pub fn records(&self) -> &[ChangeRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn paths(&self) -> BTreeSet<String> {
    self.records.iter().map(|r| r.path.clone()).collect()
  }
}

// ---------------------------------------------------------------------------
// History + catalog (internal normalized types)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FailureEvent {
  pub timestamp: DateTime<Utc>,
  pub file_path: String,
  pub severity: Severity,
  pub resolution_time_hours: Option<f64>,
  pub failure_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCatalogEntry {
  pub test_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub test_type: Option<TestType>,
  pub covered_files: BTreeSet<String>,
  pub criticality: Criticality,
  pub execution_time_seconds: f64,
  pub historical_failure_count: u32,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<String>,
}

/// An input row that failed validation and was left out of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedEntry {
  /// Position in the supplied sequence.
  pub index: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub field: String,
  pub reason: String,
}

/// Validated, read-only test catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
  pub entries: Vec<TestCatalogEntry>,
  pub excluded: Vec<ExcludedEntry>,
}

impl TestCatalog {
  pub fn get(&self, test_id: &str) -> Option<&TestCatalogEntry> {
    self.entries.iter().find(|e| e.test_id == test_id)
  }
}

// ---------------------------------------------------------------------------
// Scoring + selection outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRiskFactor {
  pub path: String,
  pub complexity_score: f64,
  pub historical_failure_score: f64,
  pub change_magnitude_score: f64,
  pub criticality_bonus: f64,
  pub composite_risk: f64,
  pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedTest {
  #[serde(flatten)]
  pub entry: TestCatalogEntry,
  pub priority_score: f64,
  pub selection_reason: String,
}

/// Selector result: ordered tests plus coverage bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSelection {
  pub tests: Vec<SelectedTest>,
  pub coverage_score: f64,
  pub total_estimated_seconds: f64,
  /// Changed file -> ids of selected tests covering it.
  pub coverage_map: BTreeMap<String, Vec<String>>,
  pub uncovered_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSummary {
  pub files_changed: usize,
  pub lines_added: u64,
  pub lines_removed: u64,
  pub critical_files_touched: usize,
  pub critical_files: Vec<String>,
  pub by_category: BTreeMap<FileCategory, usize>,
  pub by_change_type: BTreeMap<ChangeType, usize>,
  pub mean_complexity_score: f64,
}
