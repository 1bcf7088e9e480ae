//! Change extraction: one [`ChangeRecord`] per file touched by a commit (or the working tree).

use std::fmt;
use std::path::Path;

use git2::{Delta, DiffFindOptions, DiffOptions, ErrorCode, Patch, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::complexity::{count_decision_points, supports_structural};
use crate::critical::CriticalPathMatcher;
use crate::error::ExtractError;
use crate::normalize::normalize_path;
use crate::schema;
use crate::types::*;

/// What to diff: a revision against its first parent, or uncommitted work against HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitRef {
  WorkingTree,
  Commit(String),
}

impl CommitRef {
  /// `None`, blank, `working-tree` and `worktree` all mean the working tree.
  pub fn parse(reference: Option<&str>) -> Self {
    match reference.map(str::trim) {
      None | Some("") => Self::WorkingTree,
      Some(r) if r.eq_ignore_ascii_case("working-tree") || r.eq_ignore_ascii_case("worktree") => {
        Self::WorkingTree
      }
      Some(r) => Self::Commit(r.to_string()),
    }
  }
}

impl fmt::Display for CommitRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::WorkingTree => f.write_str("working-tree"),
      Self::Commit(rev) => f.write_str(rev),
    }
  }
}

/// Read the changes for `commit` out of the repository at `repo_path`. Never writes.
pub fn extract(
  repo_path: &Path,
  commit: &CommitRef,
  matcher: &CriticalPathMatcher,
) -> Result<ChangeSet, ExtractError> {
  let display_path = repo_path.display().to_string();
  if !repo_path.exists() {
    return Err(ExtractError::RepositoryUnavailable {
      path: display_path,
      reason: "path does not exist".into(),
    });
  }
  let repo = Repository::open(repo_path).map_err(|e| ExtractError::RepositoryUnavailable {
    path: display_path.clone(),
    reason: e.message().to_string(),
  })?;

  let mut opts = DiffOptions::new();
  opts.context_lines(0).include_untracked(false);

  let mut diff = match commit {
    CommitRef::Commit(rev) => {
      let not_found = || ExtractError::CommitNotFound {
        reference: rev.clone(),
      };
      let target = repo
        .revparse_single(rev)
        .and_then(|obj| obj.peel_to_commit())
        .map_err(|_| not_found())?;
      let tree = target.tree()?;
      // Root commits diff against the empty tree.
      let parent_tree = if target.parent_count() > 0 {
        Some(target.parent(0)?.tree()?)
      } else {
        None
      };
      repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?
    }
    CommitRef::WorkingTree => {
      let head_tree = match repo.head() {
        Ok(head) => Some(head.peel_to_tree()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
      };
      repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?
    }
  };

  let mut find = DiffFindOptions::new();
  find.renames(true);
  diff.find_similar(Some(&mut find))?;

  let mut records = Vec::with_capacity(diff.deltas().len());
  for idx in 0..diff.deltas().len() {
    let Some(delta) = diff.get_delta(idx) else {
      continue;
    };
    let change_type = match delta.status() {
      Delta::Added | Delta::Copied | Delta::Untracked => ChangeType::Added,
      Delta::Deleted => ChangeType::Deleted,
      Delta::Renamed => ChangeType::Renamed,
      Delta::Modified | Delta::Typechange => ChangeType::Modified,
      Delta::Unmodified | Delta::Ignored | Delta::Unreadable | Delta::Conflicted => continue,
    };

    let old_path = delta.old_file().path().map(|p| normalize_path(&p.to_string_lossy()));
    let new_path = delta.new_file().path().map(|p| normalize_path(&p.to_string_lossy()));
    let path = match change_type {
      ChangeType::Deleted => old_path.clone().or(new_path.clone()),
      _ => new_path.clone().or(old_path.clone()),
    };
    let Some(path) = path.filter(|p| !p.is_empty()) else {
      continue;
    };
    let previous_path = match change_type {
      ChangeType::Renamed => old_path.filter(|p| *p != path),
      _ => None,
    };

    let category = FileCategory::classify(&path);
    let stats = match Patch::from_diff(&diff, idx)? {
      Some(patch) => patch_stats(&patch, &path, category)?,
      None => PatchStats::default(),
    };
    let PatchStats {
      lines_added,
      lines_removed,
      control_flow,
      schema_changes,
    } = stats;

    debug!(
      path = %path,
      change = ?change_type,
      added = lines_added,
      removed = lines_removed,
      schema = schema_changes.len(),
      "extracted change"
    );

    records.push(ChangeRecord {
      category,
      is_critical: matcher.is_critical(&path),
      path,
      previous_path,
      lines_added,
      lines_removed,
      change_type,
      control_flow,
      schema_changes,
    });
  }

  let changes = ChangeSet::from_records(records);
  info!(
    repo = %display_path,
    commit = %commit,
    files = changes.len(),
    "extracted change set"
  );
  Ok(changes)
}

#[derive(Debug, Default)]
struct PatchStats {
  lines_added: u32,
  lines_removed: u32,
  control_flow: Option<ControlFlowDelta>,
  schema_changes: Vec<SchemaChange>,
}

/// Line counts, decision points per side for recognized languages, and the
/// DDL in added lines of database files.
fn patch_stats(patch: &Patch<'_>, path: &str, category: FileCategory) -> Result<PatchStats, git2::Error> {
  let (_, additions, deletions) = patch.line_stats()?;
  let mut stats = PatchStats {
    lines_added: u32::try_from(additions).unwrap_or(u32::MAX),
    lines_removed: u32::try_from(deletions).unwrap_or(u32::MAX),
    ..PatchStats::default()
  };
  if patch.delta().flags().is_binary() {
    return Ok(stats);
  }

  let structural = supports_structural(path);
  let database = category == FileCategory::Database;
  if !structural && !database {
    return Ok(stats);
  }

  let mut cf = ControlFlowDelta::default();
  let mut added_sql = String::new();
  for hunk in 0..patch.num_hunks() {
    for n in 0..patch.num_lines_in_hunk(hunk)? {
      let line = patch.line_in_hunk(hunk, n)?;
      let content = String::from_utf8_lossy(line.content());
      match line.origin() {
        '+' => {
          if database {
            added_sql.push_str(&content);
          }
          if structural {
            cf.added = cf.added.saturating_add(count_decision_points(path, &content));
          }
        }
        '-' if structural => cf.removed = cf.removed.saturating_add(count_decision_points(path, &content)),
        _ => {}
      }
    }
  }

  if structural {
    stats.control_flow = Some(cf);
  }
  if database {
    stats.schema_changes = schema::scan(path, &added_sql);
  }
  Ok(stats)
}
