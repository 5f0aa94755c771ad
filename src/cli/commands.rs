use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;

use super::report;
use super::{Cli, Commands, Selection};
use crate::assets::{scan_document, Classifier, ScanHit};
use crate::config::Config;
use crate::db::{Access, StoreClient};
use crate::migrate::{select_collections, MigrationOptions, Migrator};
use crate::storage::{self, Fetcher, HttpFetcher};
use crate::store::DocumentStore;
use crate::verify::{Verifier, VerifyOptions};

/// Execute a parsed command against a validated config
pub async fn run(cli: Cli, config: Config) -> Result<ExitCode, anyhow::Error> {
  let client = StoreClient::new(config.database.clone());
  match cli.command {
    Commands::Init => init(&client).await,
    Commands::Scan {
      selection,
      interesting,
    } => scan(&client, &config, &selection, interesting).await,
    Commands::Migrate { selection, dry_run } => migrate(&client, &config, &selection, dry_run).await,
    Commands::Verify {
      only,
      check_cdn,
      workers,
    } => verify(&client, &config, &only, check_cdn, workers).await,
    Commands::Lookup { collection, id } => lookup(&client, &config, &collection, &id).await,
    Commands::Purge { owner, yes } => purge(&client, &owner, yes).await,
  }
}

async fn init(client: &StoreClient) -> Result<ExitCode, anyhow::Error> {
  let backend = client.elevated().await?;
  let collections = backend.list_collections().await?;
  println!(
    "{} Schema ready ({} collections in use)",
    "✓".green(),
    collections.len()
  );
  Ok(ExitCode::SUCCESS)
}

async fn scan(
  client: &StoreClient,
  config: &Config,
  selection: &Selection,
  interesting: bool,
) -> Result<ExitCode, anyhow::Error> {
  let specs = select_collections(&selection.only)?;
  let store = DocumentStore::connect(client, Access::Restricted).await?;
  let classifier = Classifier::from_config(&config.assets)?;
  let limit = selection
    .limit(config.migration.default_limit)
    .unwrap_or(usize::MAX);

  let mut total = 0;
  for spec in specs {
    let docs = match store.get_collection(spec.name).await {
      Ok(docs) => docs,
      Err(e) => {
        tracing::error!(collection = spec.name, error = %e, "Skipping collection");
        println!("  {} {}: {}", "Collection Failed:".red(), spec.name, e);
        continue;
      }
    };
    let scanned = docs.len().min(limit);
    let hits: Vec<ScanHit> = docs
      .iter()
      .take(limit)
      .flat_map(|d| scan_document(&classifier, spec.name, d, interesting))
      .collect();
    total += hits.len();
    report::print_scan(spec.name, scanned, &hits);
  }
  println!("\n{} {}", "Total References:".bold(), total);
  Ok(ExitCode::SUCCESS)
}

async fn migrate(
  client: &StoreClient,
  config: &Config,
  selection: &Selection,
  dry_run: bool,
) -> Result<ExitCode, anyhow::Error> {
  let specs = select_collections(&selection.only)?;
  let classifier = Classifier::from_config(&config.assets)?;
  let store = DocumentStore::connect(client, Access::Elevated).await?;
  let objects = storage::from_config(&config.storage, &config.assets.public_base_url)?;
  let dry_run = dry_run || config.migration.dry_run;
  if !dry_run {
    objects.init().await?;
  }
  let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);

  let options = MigrationOptions {
    limit: selection.limit(config.migration.default_limit),
    dry_run,
    sample_size: config.verify.sample_size,
  };
  let migrator = Migrator::new(store, objects, fetcher, classifier, options);
  let run = migrator.run(&specs).await;
  report::print_migration(&run);
  Ok(ExitCode::SUCCESS)
}

async fn verify(
  client: &StoreClient,
  config: &Config,
  only: &[String],
  check_cdn: bool,
  workers: Option<usize>,
) -> Result<ExitCode, anyhow::Error> {
  let specs = select_collections(only)?;
  let names: Vec<&str> = specs.iter().map(|s| s.name).collect();
  let classifier = Classifier::from_config(&config.assets)?;
  let store = DocumentStore::connect(client, Access::Restricted).await?;
  let objects = storage::from_config(&config.storage, &config.assets.public_base_url)?;
  objects.init().await?;
  let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);

  let options = VerifyOptions {
    workers: workers.unwrap_or(config.verify.workers).max(1),
    sample_size: config.verify.sample_size,
    check_cdn: check_cdn || config.verify.check_cdn,
  };
  let report = Verifier::new(store, objects, fetcher, classifier, options)
    .run(&names)
    .await;
  report::print_verify(&report);

  Ok(if report.is_clean() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(1)
  })
}

async fn lookup(
  client: &StoreClient,
  config: &Config,
  collection: &str,
  id: &str,
) -> Result<ExitCode, anyhow::Error> {
  let store = DocumentStore::connect(client, Access::Restricted).await?;
  let classifier = Classifier::from_config(&config.assets)?;
  match store.get(collection, id).await? {
    Some(doc) => {
      let hits = scan_document(&classifier, collection, &doc, false);
      report::print_document(&doc, &hits)?;
      Ok(ExitCode::SUCCESS)
    }
    None => {
      eprintln!("{} {}/{}", "Not found:".red(), collection, id);
      Ok(ExitCode::from(1))
    }
  }
}

async fn purge(client: &StoreClient, owner: &str, yes: bool) -> Result<ExitCode, anyhow::Error> {
  if !yes {
    eprintln!(
      "{} purging {} deletes its documents in every collection; pass --yes to proceed",
      "Refusing:".red(),
      owner
    );
    return Ok(ExitCode::from(1));
  }
  let store = DocumentStore::connect(client, Access::Elevated).await?;
  let report = store.cascade_delete(owner).await?;
  report::print_cascade(owner, &report);
  Ok(if report.failures().next().is_none() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(1)
  })
}
