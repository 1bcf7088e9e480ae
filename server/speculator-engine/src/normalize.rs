//! Normalize inbound failure events and catalog rows into validated records.
//!
//! Bad rows never abort the batch: each one is returned as an [`ExcludedEntry`]
//! and logged, and the remaining rows carry on.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::EngineError;
use crate::schema;
use crate::types::*;

/// Parse and validate one failure event.
pub fn normalize_failure_event(raw: &InboundFailureEvent) -> Result<FailureEvent, EngineError> {
  let timestamp = parse_timestamp(&raw.timestamp)
    .ok_or_else(|| EngineError::validation("timestamp", "expected RFC3339 or ISO-8601 datetime"))?;

  let severity = Severity::from_str_loose(&raw.severity)
    .ok_or_else(|| EngineError::validation("severity", "expected low|medium|high|critical"))?;

  let file_path = normalize_path(&raw.file_path);
  if file_path.is_empty() {
    return Err(EngineError::validation("file_path", "must not be empty"));
  }

  let resolution_time_hours = match raw.resolution_time_hours {
    Some(h) if !h.is_finite() || h < 0.0 => {
      return Err(EngineError::validation(
        "resolution_time_hours",
        "must be a non-negative number",
      ))
    }
    other => other,
  };

  Ok(FailureEvent {
    timestamp,
    file_path,
    severity,
    resolution_time_hours,
    failure_type: raw.failure_type.clone().filter(|t| !t.is_empty()),
  })
}

/// Normalize a whole failure log, splitting valid events from excluded rows.
pub fn normalize_failure_events(raw: &[InboundFailureEvent]) -> (Vec<FailureEvent>, Vec<ExcludedEntry>) {
  let mut events = Vec::with_capacity(raw.len());
  let mut excluded = Vec::new();
  for (index, item) in raw.iter().enumerate() {
    match normalize_failure_event(item) {
      Ok(event) => events.push(event),
      Err(e) => {
        let entry = excluded_entry(index, non_empty(&item.file_path), &e);
        warn!(index, field = %entry.field, reason = %entry.reason, "skipping failure event");
        excluded.push(entry);
      }
    }
  }
  (events, excluded)
}

/// Parse and validate one caller-supplied change. Category is derived from the path.
pub fn normalize_change(raw: &InboundChange) -> Result<ChangeRecord, EngineError> {
  let path = normalize_path(&raw.path);
  if path.is_empty() {
    return Err(EngineError::validation("path", "must not be empty"));
  }
  let change_type = match &raw.change_type {
    Some(t) => ChangeType::from_str_loose(t)
      .ok_or_else(|| EngineError::validation("change_type", "expected added|modified|deleted|renamed"))?,
    None => ChangeType::Modified,
  };
  let category = FileCategory::classify(&path);
  let schema_changes = match (&raw.added_content, category) {
    (Some(sql), FileCategory::Database) => schema::scan(&path, sql),
    _ => Vec::new(),
  };
  Ok(ChangeRecord {
    category,
    previous_path: raw.previous_path.as_deref().map(normalize_path).filter(|p| !p.is_empty()),
    path,
    lines_added: raw.lines_added,
    lines_removed: raw.lines_removed,
    change_type,
    is_critical: raw.is_critical,
    control_flow: None,
    schema_changes,
  })
}

/// Parse and validate one catalog row.
pub fn normalize_catalog_entry(raw: &InboundCatalogEntry) -> Result<TestCatalogEntry, EngineError> {
  let test_id = raw.test_id.trim();
  if test_id.is_empty() {
    return Err(EngineError::validation("test_id", "must not be empty"));
  }

  let execution_time_seconds = match raw.execution_time_seconds {
    Some(t) if t.is_finite() && t > 0.0 => t,
    Some(_) => {
      return Err(EngineError::validation(
        "execution_time_seconds",
        "must be a positive number",
      ))
    }
    None => return Err(EngineError::validation("execution_time_seconds", "missing")),
  };

  // Catalogs that omit criticality get medium.
  let criticality = match &raw.criticality {
    Some(c) => Criticality::from_str_loose(c)
      .ok_or_else(|| EngineError::validation("criticality", "expected critical|high|medium|low"))?,
    None => Criticality::Medium,
  };

  let historical_failure_count = match raw.historical_failure_count {
    Some(n) if n < 0 => {
      return Err(EngineError::validation(
        "historical_failure_count",
        "must not be negative",
      ))
    }
    Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
    None => 0,
  };

  let test_type = match &raw.test_type {
    Some(t) => Some(
      TestType::from_str_loose(t)
        .ok_or_else(|| EngineError::validation("test_type", "expected unit|integration|e2e|performance"))?,
    ),
    None => None,
  };

  let covered_files: BTreeSet<String> = raw
    .covered_files
    .iter()
    .map(|f| normalize_path(f))
    .filter(|f| !f.is_empty())
    .collect();

  let mut dependencies: Vec<String> = Vec::new();
  for dep in &raw.dependencies {
    let dep = dep.trim();
    if !dep.is_empty() && dep != test_id && !dependencies.iter().any(|d| d == dep) {
      dependencies.push(dep.to_string());
    }
  }

  Ok(TestCatalogEntry {
    test_id: test_id.to_string(),
    name: raw.name.clone().filter(|n| !n.is_empty()),
    test_type,
    covered_files,
    criticality,
    execution_time_seconds,
    historical_failure_count,
    dependencies,
  })
}

/// Normalize a full catalog. Duplicate ids keep the first occurrence.
pub fn normalize_catalog(raw: &[InboundCatalogEntry]) -> TestCatalog {
  let mut catalog = TestCatalog::default();
  let mut seen: HashSet<String> = HashSet::new();

  for (index, item) in raw.iter().enumerate() {
    let result = normalize_catalog_entry(item).and_then(|entry| {
      if seen.contains(&entry.test_id) {
        Err(EngineError::validation("test_id", "duplicate test_id"))
      } else {
        Ok(entry)
      }
    });
    match result {
      Ok(entry) => {
        seen.insert(entry.test_id.clone());
        catalog.entries.push(entry);
      }
      Err(e) => {
        let entry = excluded_entry(index, non_empty(&item.test_id), &e);
        warn!(
          index,
          test_id = entry.id.as_deref().unwrap_or(""),
          field = %entry.field,
          reason = %entry.reason,
          "excluding malformed catalog entry"
        );
        catalog.excluded.push(entry);
      }
    }
  }

  // Dependencies pointing outside the catalog can never be honored.
  let known: HashSet<String> = catalog.entries.iter().map(|e| e.test_id.clone()).collect();
  for entry in &mut catalog.entries {
    entry.dependencies.retain(|d| known.contains(d));
  }

  catalog
}

/// Normalize a file path for stable comparison:
/// - backslash -> forward slash
/// - collapse repeated slashes
/// - strip leading ./ and /
/// - trim whitespace
///
/// Case is preserved; git paths are case-sensitive.
pub fn normalize_path(p: &str) -> String {
  let s = p.trim().replace('\\', "/");
  let mut out = String::with_capacity(s.len());
  let mut prev_slash = false;
  for ch in s.chars() {
    if ch == '/' {
      if !prev_slash {
        out.push('/');
      }
      prev_slash = true;
    } else {
      prev_slash = false;
      out.push(ch);
    }
  }
  let mut trimmed = out.as_str();
  while let Some(rest) = trimmed.strip_prefix("./") {
    trimmed = rest;
  }
  trimmed.trim_start_matches('/').to_string()
}

/// RFC3339 first; naive ISO-8601 (no offset) is read as UTC, as Python's
/// `datetime.isoformat()` writes it. A bare date is midnight UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
    return Some(ts.with_timezone(&Utc));
  }
  ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
    .map(|naive| naive.and_utc())
}

fn excluded_entry(index: usize, id: Option<String>, err: &EngineError) -> ExcludedEntry {
  let (field, reason) = match err {
    EngineError::Validation { field, reason } => (field.clone(), reason.clone()),
    other => (String::new(), other.to_string()),
  };
  ExcludedEntry {
    index,
    id,
    field,
    reason,
  }
}

fn non_empty(s: &str) -> Option<String> {
  let s = s.trim();
  (!s.is_empty()).then(|| s.to_string())
}
