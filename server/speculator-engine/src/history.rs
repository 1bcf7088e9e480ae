//! Historical failure index: per-path failure score with exponential recency decay.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::complexity::saturate;
use crate::types::{ChangeRecord, FailureEvent};

/// Aggregated failure history for one path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathHistory {
  /// Decayed, saturated score in [0,1].
  pub score: f64,
  /// Sum of decayed severity weights before saturation.
  pub raw: f64,
  pub failure_count: u32,
  pub last_failure: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mean_resolution_hours: Option<f64>,
}

/// Read-only lookup built once from a failure log snapshot.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
  paths: HashMap<String, PathHistory>,
  built_at: Option<DateTime<Utc>>,
  half_life_days: f64,
  events: usize,
}

impl HistoryIndex {
  /// Index with no history; every lookup is 0.0.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn build(events: &[FailureEvent], half_life_days: f64) -> Self {
    Self::build_at(events, half_life_days, Utc::now())
  }

  /// Build with an explicit clock so scores are reproducible.
  ///
  /// Each event contributes `severity_weight * 0.5^(age_days / half_life)`;
  /// events dated after `now` count as brand new.
  pub fn build_at(events: &[FailureEvent], half_life_days: f64, now: DateTime<Utc>) -> Self {
    struct Acc {
      raw: f64,
      count: u32,
      last: DateTime<Utc>,
      resolution_sum: f64,
      resolution_n: u32,
    }

    let half_life = if half_life_days.is_finite() && half_life_days > 0.0 {
      half_life_days
    } else {
      f64::INFINITY
    };

    let mut acc: HashMap<&str, Acc> = HashMap::new();
    for event in events {
      let age_days = ((now - event.timestamp).num_seconds().max(0) as f64) / 86_400.0;
      let decay = 0.5_f64.powf(age_days / half_life);
      let contribution = event.severity.weight() * decay;

      let entry = acc.entry(event.file_path.as_str()).or_insert(Acc {
        raw: 0.0,
        count: 0,
        last: event.timestamp,
        resolution_sum: 0.0,
        resolution_n: 0,
      });
      entry.raw += contribution;
      entry.count = entry.count.saturating_add(1);
      if event.timestamp > entry.last {
        entry.last = event.timestamp;
      }
      if let Some(h) = event.resolution_time_hours {
        entry.resolution_sum += h;
        entry.resolution_n += 1;
      }
    }

    let paths = acc
      .into_iter()
      .map(|(path, a)| {
        let history = PathHistory {
          score: saturate(a.raw),
          raw: a.raw,
          failure_count: a.count,
          last_failure: a.last,
          mean_resolution_hours: (a.resolution_n > 0).then(|| a.resolution_sum / a.resolution_n as f64),
        };
        (path.to_string(), history)
      })
      .collect();

    Self {
      paths,
      built_at: Some(now),
      half_life_days,
      events: events.len(),
    }
  }

  /// Decayed failure score for `path`; 0.0 when the path has no history.
  pub fn lookup(&self, path: &str) -> f64 {
    self.paths.get(path).map(|h| h.score).unwrap_or(0.0)
  }

  /// Score for a changed file. A rename also carries the history recorded
  /// under its previous path; the higher of the two wins.
  pub fn lookup_change(&self, record: &ChangeRecord) -> f64 {
    let current = self.lookup(&record.path);
    match record.previous_path.as_deref() {
      Some(previous) => current.max(self.lookup(previous)),
      None => current,
    }
  }

  /// Frequency and recency details for `path`.
  pub fn stats(&self, path: &str) -> Option<&PathHistory> {
    self.paths.get(path)
  }

  pub fn built_at(&self) -> Option<DateTime<Utc>> {
    self.built_at
  }

  pub fn half_life_days(&self) -> f64 {
    self.half_life_days
  }

  pub fn event_count(&self) -> usize {
    self.events
  }

  pub fn path_count(&self) -> usize {
    self.paths.len()
  }
}
