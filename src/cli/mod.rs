//! Command line surface of the `vitrine` binary.

mod commands;
pub mod report;

pub use commands::run;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
  name = "vitrine",
  about = "Document store maintenance and asset migration jobs",
  version
)]
pub struct Cli {
  /// Config file (defaults to ./vitrine.yaml when present)
  #[arg(short, long, global = true, env = "VITRINE_CONFIG")]
  pub config: Option<String>,
  #[arg(long, global = true)]
  pub log_level: Option<String>,
  /// Use SQLite at this path instead of the configured backend
  #[arg(long, global = true)]
  pub sqlite: Option<String>,
  #[command(subcommand)]
  pub command: Commands,
}

/// Which documents a batch job looks at
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
  /// Comma separated collections (default: every registered collection)
  #[arg(long, value_delimiter = ',')]
  pub only: Vec<String>,
  /// Documents per collection
  #[arg(long, conflicts_with = "all")]
  pub limit: Option<usize>,
  /// Scan whole collections, ignoring the configured default limit
  #[arg(long)]
  pub all: bool,
}

impl Selection {
  /// Effective per-collection cap
  pub fn limit(&self, default: Option<usize>) -> Option<usize> {
    if self.all {
      None
    } else {
      self.limit.or(default)
    }
  }
}

#[derive(Subcommand)]
pub enum Commands {
  /// Create the database schema
  Init,
  /// List asset references found in documents
  Scan {
    #[command(flatten)]
    selection: Selection,
    /// Only report references in asset-like fields
    #[arg(long)]
    interesting: bool,
  },
  /// Move inline and legacy assets to object storage
  Migrate {
    #[command(flatten)]
    selection: Selection,
    /// Count what would be migrated without uploading or writing
    #[arg(long)]
    dry_run: bool,
  },
  /// Check that every referenced object exists
  Verify {
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
    /// Also probe the public URLs
    #[arg(long)]
    check_cdn: bool,
    #[arg(long)]
    workers: Option<usize>,
  },
  /// Print one document and its asset references
  Lookup {
    #[arg(long)]
    collection: String,
    #[arg(long)]
    id: String,
  },
  /// Delete every document a tenant owns
  Purge {
    #[arg(long)]
    owner: String,
    /// Required confirmation
    #[arg(long)]
    yes: bool,
  },
}

impl Commands {
  /// Whether the command reaches object storage
  pub fn needs_object_store(&self) -> bool {
    matches!(self, Self::Migrate { .. } | Self::Verify { .. })
  }
}
