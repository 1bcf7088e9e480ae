//! Schema-change detection for database files: table and index DDL in the
//! added lines of a patch, each with an impact level.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{RiskLevel, SchemaChange, SchemaChangeKind};

static RE_BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").expect("valid regex"));
static RE_CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?i)\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?([\w.]+)"#)
    .expect("valid regex")
});
static RE_DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?i)\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?[`"\[]?([\w.]+)"#).expect("valid regex")
});
static RE_ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r#"(?i)\bALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?[`"\[]?([\w.]+)[`"\]]?\s+(ADD|DROP|MODIFY|ALTER)\b(?:\s+COLUMN\b)?(?:\s+IF\s+(?:NOT\s+)?EXISTS\b)?(?:\s+[`"\[]?(\w+))?"#,
  )
  .expect("valid regex")
});
static RE_CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r#"(?i)\bCREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?(\w+)[`"\]]?\s+ON\s+(?:ONLY\s+)?[`"\[]?([\w.]+)"#,
  )
  .expect("valid regex")
});

/// Words that follow `ALTER TABLE t ADD|DROP` without naming a column.
const NON_COLUMN_WORDS: [&str; 6] = ["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK", "INDEX"];

/// Scan SQL text for schema statements, in the order they appear.
/// Comments are ignored, so commenting out a `DROP TABLE` reports nothing.
pub fn scan(path: &str, sql: &str) -> Vec<SchemaChange> {
  let without_blocks = RE_BLOCK_COMMENT.replace_all(sql, " ");
  let text = RE_LINE_COMMENT.replace_all(&without_blocks, "");

  let mut found: Vec<(usize, SchemaChange)> = Vec::new();
  let mut push = |at: usize, kind: SchemaChangeKind, table: &str, column: Option<&str>| {
    found.push((
      at,
      SchemaChange {
        path: path.to_string(),
        kind,
        table: table.to_string(),
        column: column.map(str::to_string),
        impact: impact(kind),
      },
    ));
  };

  for caps in RE_CREATE_TABLE.captures_iter(&text) {
    push(caps.get(0).map_or(0, |m| m.start()), SchemaChangeKind::AddTable, &caps[1], None);
  }
  for caps in RE_DROP_TABLE.captures_iter(&text) {
    push(caps.get(0).map_or(0, |m| m.start()), SchemaChangeKind::DropTable, &caps[1], None);
  }
  for caps in RE_ALTER_TABLE.captures_iter(&text) {
    let kind = match caps[2].to_ascii_uppercase().as_str() {
      "ADD" => SchemaChangeKind::AddColumn,
      "DROP" => SchemaChangeKind::DropColumn,
      _ => SchemaChangeKind::ModifyColumn,
    };
    let column = caps
      .get(3)
      .map(|m| m.as_str())
      .filter(|c| !NON_COLUMN_WORDS.contains(&c.to_ascii_uppercase().as_str()));
    push(caps.get(0).map_or(0, |m| m.start()), kind, &caps[1], column);
  }
  for caps in RE_CREATE_INDEX.captures_iter(&text) {
    push(
      caps.get(0).map_or(0, |m| m.start()),
      SchemaChangeKind::AddIndex,
      &caps[2],
      Some(&caps[1]),
    );
  }

  found.sort_by_key(|(at, _)| *at);
  found.into_iter().map(|(_, change)| change).collect()
}

/// Impact per statement kind; drops break readers, additive changes rarely do.
pub fn impact(kind: SchemaChangeKind) -> RiskLevel {
  match kind {
    SchemaChangeKind::DropTable | SchemaChangeKind::DropColumn => RiskLevel::Critical,
    SchemaChangeKind::AddTable | SchemaChangeKind::ModifyColumn => RiskLevel::High,
    SchemaChangeKind::AddIndex => RiskLevel::Medium,
    SchemaChangeKind::AddColumn => RiskLevel::Low,
  }
}

/// Highest impact across `changes`; `None` when there are none.
pub fn overall_impact(changes: &[SchemaChange]) -> Option<RiskLevel> {
  changes.iter().map(|c| c.impact).max()
}

/// Operator-facing hint for one statement.
pub fn recommendation(change: &SchemaChange) -> String {
  let target = match &change.column {
    Some(column) => format!("{}.{}", change.table, column),
    None => change.table.clone(),
  };
  match change.kind {
    SchemaChangeKind::DropTable => format!(
      "Table {} dropped in {}: every query on it will break, confirm nothing depends on it",
      change.table, change.path
    ),
    SchemaChangeKind::DropColumn => format!(
      "Column {} dropped in {}: check readers and writers before deploying",
      target, change.path
    ),
    SchemaChangeKind::ModifyColumn => format!(
      "Column {} altered in {}: verify data type compatibility of existing rows",
      target, change.path
    ),
    SchemaChangeKind::AddTable => format!(
      "Table {} created in {}: make sure the migration runs before code that uses it",
      change.table, change.path
    ),
    SchemaChangeKind::AddIndex => format!(
      "Index {} on {} added in {}: large tables may lock while it builds",
      change.column.as_deref().unwrap_or("?"),
      change.table,
      change.path
    ),
    SchemaChangeKind::AddColumn => format!(
      "Column {} added in {}: give it a default so existing inserts keep working",
      target, change.path
    ),
  }
}
