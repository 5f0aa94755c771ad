//! Console reports. Counter labels are stable so operators can grep them.

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use crate::assets::{truncate, ScanHit};
use crate::migrate::{MigrationRun, MigrationStats};
use crate::store::CascadeReport;
use crate::types::Document;
use crate::verify::VerifyReport;

fn table(header: Vec<&str>) -> Table {
  let mut table = Table::new();
  table
    .load_preset(UTF8_FULL)
    .set_content_arrangement(ContentArrangement::Dynamic)
    .set_header(header);
  table
}

fn heading(title: &str) {
  println!("\n{}", format!("== {} ==", title).as_str().bold());
}

fn counter(label: &str, value: usize) {
  println!("  {:<22} {}", label, value);
}

pub fn hits_table(hits: &[ScanHit]) -> Table {
  let mut t = table(vec!["Collection", "Document", "Field", "Kind", "Reference"]);
  for hit in hits {
    t.add_row(vec![
      hit.collection.clone(),
      hit.document_id.clone(),
      hit.path.to_string(),
      hit.kind.to_string(),
      truncate(&hit.reference, 80),
    ]);
  }
  t
}

pub fn print_scan(collection: &str, documents: usize, hits: &[ScanHit]) {
  heading(collection);
  counter("Documents Scanned:", documents);
  counter("References Found:", hits.len());
  if !hits.is_empty() {
    println!("{}", hits_table(hits));
  }
}

fn print_stats(stats: &MigrationStats) {
  counter("Total Processed:", stats.processed);
  println!("  {:<22} {}", "Success:".green(), stats.migrated);
  println!("  {:<22} {}", "Skipped:".yellow(), stats.skipped);
  println!("  {:<22} {}", "Errors:".red(), stats.errors);
  counter("References Migrated:", stats.references_migrated);
  counter("References Skipped:", stats.references_skipped);
  counter("References Failed:", stats.references_failed);
}

pub fn print_migration(run: &MigrationRun) {
  if run.dry_run {
    println!("{}", "Dry run: nothing was uploaded or written".yellow());
  }
  for (collection, result) in &run.collections {
    heading(collection);
    match result {
      Ok(stats) => print_stats(stats),
      Err(e) => println!("  {} {}", "Collection Failed:".red(), e),
    }
  }

  heading("Summary");
  print_stats(&run.totals());
  let failed = run.failed_collections().count();
  if failed > 0 {
    println!("  {:<22} {}", "Collections Failed:".red(), failed);
  }

  if !run.failures.is_empty() {
    println!("\n{}", "Sample failures:".bold());
    let mut t = table(vec!["Collection", "Document", "Field", "Reference", "Error"]);
    for f in &run.failures {
      t.add_row(vec![
        f.collection.clone(),
        f.document_id.clone(),
        f.path.clone().unwrap_or_default(),
        f.reference.clone().unwrap_or_default(),
        f.error.clone(),
      ]);
    }
    println!("{t}");
    if run.failures_dropped > 0 {
      println!("  ... and {} more", run.failures_dropped);
    }
  }
}

pub fn print_verify(report: &VerifyReport) {
  let mut t = table(vec!["Collection", "Documents", "Canonical", "Legacy", "Inline"]);
  for c in &report.collections {
    t.add_row(vec![
      c.collection.clone(),
      c.documents.to_string(),
      c.canonical.to_string(),
      c.legacy.to_string(),
      c.inline.to_string(),
    ]);
  }
  println!("{t}");
  for (collection, e) in &report.failed_collections {
    println!("  {} {}: {}", "Collection Failed:".red(), collection, e);
  }

  heading("Verification");
  counter("Documents Scanned:", report.documents_scanned);
  counter("URLs Scanned:", report.references_scanned);
  counter("Canonical:", report.canonical);
  counter("Legacy Remaining:", report.legacy);
  counter("Inline Remaining:", report.inline);
  counter("Unique Objects:", report.unique_objects);
  counter("Missing In Storage:", report.missing);
  if report.cdn_checked {
    counter("CDN Not Found:", report.cdn_missing);
  }
  counter("Probe Errors:", report.probe_errors);

  if !report.samples.is_empty() {
    println!("\n{}", "Sample problems:".bold());
    let mut t = table(vec!["Problem", "Collection", "Document", "Field", "URL", "Detail"]);
    for p in &report.samples {
      t.add_row(vec![
        p.kind.as_str().to_string(),
        p.collection.clone(),
        p.document_id.clone(),
        p.path.clone(),
        p.url.clone(),
        p.detail.clone().unwrap_or_default(),
      ]);
    }
    println!("{t}");
    if report.samples_dropped > 0 {
      println!("  ... and {} more", report.samples_dropped);
    }
  }

  if report.is_clean() {
    println!("\n{}", "CLEAN".green().bold());
  } else {
    println!("\n{}", "NOT CLEAN".red().bold());
  }
}

pub fn print_cascade(owner: &str, report: &CascadeReport) {
  heading(&format!("Purge {}", owner));
  let mut t = table(vec!["Collection", "Deleted"]);
  for (collection, result) in &report.results {
    let cell = match result {
      Ok(n) => n.to_string(),
      Err(e) => format!("error: {}", e),
    };
    t.add_row(vec![collection.clone(), cell]);
  }
  println!("{t}");
  counter("Total Deleted:", report.total());
  let failed = report.failures().count();
  if failed > 0 {
    println!("  {:<22} {}", "Errors:".red(), failed);
  }
}

pub fn print_document(doc: &Document, hits: &[ScanHit]) -> Result<(), serde_json::Error> {
  println!("{}", serde_json::to_string_pretty(&doc.to_value())?);
  println!(
    "{} {}  {} {}",
    "created:".dimmed(),
    doc.created_at.to_rfc3339(),
    "updated:".dimmed(),
    doc.updated_at.to_rfc3339()
  );
  if hits.is_empty() {
    println!("{}", "No asset references".dimmed());
  } else {
    println!("{}", hits_table(hits));
  }
  Ok(())
}
