//! Complexity-change estimate per file: decision-point churn when the language
//! is recognized, a line-count proxy otherwise. Always saturates into [0,1].

use std::path::Path;

use crate::config::Config;
use crate::types::ChangeRecord;

/// Extensions whose diffs are scanned for decision points.
const STRUCTURAL_EXTS: [&str; 22] = [
  "rs", "py", "java", "kt", "kts", "scala", "go", "js", "jsx", "ts", "tsx", "mjs", "c", "h",
  "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "groovy",
];

const BRANCH_KEYWORDS: [&str; 12] = [
  "if", "elif", "for", "foreach", "while", "loop", "case", "catch", "except", "match", "when",
  "unless",
];

/// Word operators that short-circuit in Python and Ruby.
const WORD_OPERATORS: [&str; 2] = ["and", "or"];

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityEstimator {
  k: f64,
  line_scale: f64,
}

impl Default for ComplexityEstimator {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

impl ComplexityEstimator {
  pub fn from_config(config: &Config) -> Self {
    Self {
      k: config.complexity_k,
      line_scale: config.complexity_line_scale,
    }
  }

  /// Unbounded complexity delta before saturation.
  pub fn raw_delta(&self, record: &ChangeRecord) -> f64 {
    let line_term = record.lines_changed() as f64 / self.line_scale;
    match record.control_flow {
      Some(cf) => cf.added as f64 + 0.5 * cf.removed as f64 + line_term,
      None => line_term,
    }
  }

  /// `1 - exp(-k * raw)`; never fails, unsupported files use the line proxy.
  pub fn estimate(&self, record: &ChangeRecord) -> f64 {
    saturate(self.k * self.raw_delta(record))
  }
}

/// Map `x >= 0` onto [0,1) monotonically.
pub(crate) fn saturate(x: f64) -> f64 {
  if !x.is_finite() {
    return if x > 0.0 { 1.0 } else { 0.0 };
  }
  (1.0 - (-x.max(0.0)).exp()).clamp(0.0, 1.0)
}

/// Whether decision points can be counted for this path.
pub fn supports_structural(path: &str) -> bool {
  Path::new(path)
    .extension()
    .and_then(|e| e.to_str())
    .map(|ext| {
      let ext = ext.to_ascii_lowercase();
      STRUCTURAL_EXTS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

/// Count decision points in one source line.
pub fn count_decision_points(path: &str, line: &str) -> u32 {
  let trimmed = line.trim_start();
  if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*') {
    return 0;
  }
  let lower = path.to_ascii_lowercase();
  let hash_comments = lower.ends_with(".py") || lower.ends_with(".rb");
  if hash_comments && trimmed.starts_with('#') {
    return 0;
  }

  let mut count = (trimmed.matches("&&").count() + trimmed.matches("||").count()) as u32;
  for word in trimmed.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
    if BRANCH_KEYWORDS.contains(&word) || (hash_comments && WORD_OPERATORS.contains(&word)) {
      count += 1;
    }
  }
  count
}
