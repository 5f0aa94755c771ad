use serde::Serialize;

/// Counters for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
  /// Documents looked at
  pub processed: usize,
  /// Documents with at least one reference rewritten and no failures
  pub migrated: usize,
  /// Documents with nothing to do, or only unresolvable references
  pub skipped: usize,
  /// Documents where at least one reference failed
  pub errors: usize,
  pub references_migrated: usize,
  pub references_skipped: usize,
  pub references_failed: usize,
}

impl MigrationStats {
  pub fn merge(&mut self, other: &MigrationStats) {
    self.processed += other.processed;
    self.migrated += other.migrated;
    self.skipped += other.skipped;
    self.errors += other.errors;
    self.references_migrated += other.references_migrated;
    self.references_skipped += other.references_skipped;
    self.references_failed += other.references_failed;
  }
}

/// A reference (or whole document) that failed to migrate
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
  pub collection: String,
  pub document_id: String,
  pub path: Option<String>,
  pub reference: Option<String>,
  pub error: String,
}

/// Result of a migration run over several collections
#[derive(Debug, Default, Serialize)]
pub struct MigrationRun {
  pub dry_run: bool,
  /// Per-collection stats, or the reason the collection could not be read
  pub collections: Vec<(String, Result<MigrationStats, String>)>,
  /// First failures, capped at the configured sample size
  pub failures: Vec<MigrationFailure>,
  /// Failures past the cap
  pub failures_dropped: usize,
}

impl MigrationRun {
  pub fn totals(&self) -> MigrationStats {
    let mut total = MigrationStats::default();
    for stats in self.collections.iter().filter_map(|(_, r)| r.as_ref().ok()) {
      total.merge(stats);
    }
    total
  }

  pub fn failed_collections(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .collections
      .iter()
      .filter_map(|(c, r)| r.as_ref().err().map(|e| (c.as_str(), e.as_str())))
  }

  pub fn stats(&self, collection: &str) -> Option<&MigrationStats> {
    self
      .collections
      .iter()
      .find(|(c, _)| c == collection)
      .and_then(|(_, r)| r.as_ref().ok())
  }
}
