//! Critical-path matching: flags payment/auth/database-style files as inherently risky.

use glob::{MatchOptions, Pattern};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
enum Rule {
  /// Case-insensitive substring, e.g. `payment` or `src/auth/`.
  Hint(String),
  Glob(Pattern),
}

/// Matches repository-relative paths against the configured critical patterns.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathMatcher {
  rules: Vec<Rule>,
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: false,
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

impl CriticalPathMatcher {
  /// Patterns containing `*`, `?` or `[` are globs; anything else is a substring hint.
  pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
    let mut rules = Vec::with_capacity(patterns.len());
    for raw in patterns {
      let p = raw.trim();
      if p.is_empty() {
        continue;
      }
      if p.contains(['*', '?', '[']) {
        let pattern = Pattern::new(p).map_err(|e| {
          ConfigError::invalid(
            "critical_path_patterns",
            format!("bad glob {:?}: {}", p, e.msg),
          )
        })?;
        rules.push(Rule::Glob(pattern));
      } else {
        let hint = p.to_ascii_lowercase().trim_end_matches('/').to_string();
        if !hint.is_empty() {
          rules.push(Rule::Hint(hint));
        }
      }
    }
    Ok(Self { rules })
  }

  pub fn is_critical(&self, path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    self.rules.iter().any(|rule| match rule {
      Rule::Hint(hint) => lower.contains(hint.as_str()),
      Rule::Glob(pattern) => pattern.matches_with(path, GLOB_OPTIONS),
    })
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}
