//! Post-migration consistency checks.
//!
//! Collections are re-scanned, every referenced object is reduced to its
//! key and each distinct key is probed once against the object store (and,
//! on request, the public CDN) by a fixed pool of worker tasks.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::assets::{scan_document, truncate, AssetRef, Classifier, RefKind, ScanHit};
use crate::storage::{Fetcher, ObjectStore};
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
  pub workers: usize,
  pub sample_size: usize,
  /// Also HEAD every public URL
  pub check_cdn: bool,
}

impl Default for VerifyOptions {
  fn default() -> Self {
    Self {
      workers: 20,
      sample_size: 50,
      check_cdn: false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
  /// Reference still points at the previous provider
  Legacy,
  /// Reference still embeds its bytes
  Inline,
  /// No object under the expected key
  Missing,
  /// Public URL answered with a non-success status
  CdnNotFound,
  /// The probe itself failed
  ProbeFailed,
}

impl ProblemKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Legacy => "legacy",
      Self::Inline => "inline",
      Self::Missing => "missing",
      Self::CdnNotFound => "cdn",
      Self::ProbeFailed => "probe-failed",
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Problem {
  pub kind: ProblemKind,
  pub collection: String,
  pub document_id: String,
  pub path: String,
  pub url: String,
  pub detail: Option<String>,
}

/// Reference counts for one collection
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionTally {
  pub collection: String,
  pub documents: usize,
  pub legacy: usize,
  pub inline: usize,
  pub canonical: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
  pub documents_scanned: usize,
  pub references_scanned: usize,
  pub legacy: usize,
  pub inline: usize,
  pub canonical: usize,
  /// Distinct keys probed
  pub unique_objects: usize,
  pub missing: usize,
  pub cdn_checked: bool,
  pub cdn_missing: usize,
  pub probe_errors: usize,
  pub collections: Vec<CollectionTally>,
  pub failed_collections: Vec<(String, String)>,
  pub samples: Vec<Problem>,
  pub samples_dropped: usize,
}

impl VerifyReport {
  /// No residual references, nothing missing and nothing left unchecked
  pub fn is_clean(&self) -> bool {
    self.legacy == 0
      && self.inline == 0
      && self.missing == 0
      && self.cdn_missing == 0
      && self.probe_errors == 0
      && self.failed_collections.is_empty()
  }

  fn push_sample(&mut self, cap: usize, problem: Problem) {
    if self.samples.len() < cap {
      self.samples.push(problem);
    } else {
      self.samples_dropped += 1;
    }
  }
}

/// One distinct object to probe, with the first reference that named it
#[derive(Debug, Clone)]
struct Candidate {
  key: String,
  public_url: String,
  origin: ScanHit,
}

#[derive(Debug)]
struct ProbeOutcome {
  exists: Result<bool, String>,
  cdn: Option<Result<u16, String>>,
}

pub struct Verifier {
  store: DocumentStore,
  objects: Arc<dyn ObjectStore>,
  fetcher: Arc<dyn Fetcher>,
  classifier: Classifier,
  options: VerifyOptions,
}

impl Verifier {
  pub fn new(
    store: DocumentStore,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    options: VerifyOptions,
  ) -> Self {
    Self {
      store,
      objects,
      fetcher,
      classifier,
      options,
    }
  }

  pub async fn run(&self, collections: &[&str]) -> VerifyReport {
    let mut report = VerifyReport {
      cdn_checked: self.options.check_cdn,
      ..Default::default()
    };
    let cap = self.options.sample_size;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for &collection in collections {
      let docs = match self.store.get_collection(collection).await {
        Ok(docs) => docs,
        Err(e) => {
          tracing::error!(collection, error = %e, "Skipping collection");
          report
            .failed_collections
            .push((collection.to_string(), e.to_string()));
          continue;
        }
      };

      let mut tally = CollectionTally {
        collection: collection.to_string(),
        documents: docs.len(),
        ..Default::default()
      };
      for doc in &docs {
        for hit in scan_document(&self.classifier, collection, doc, false) {
          report.references_scanned += 1;
          let key = match hit.kind {
            RefKind::Inline => {
              tally.inline += 1;
              report.push_sample(cap, problem(ProblemKind::Inline, &hit, None));
              continue;
            }
            RefKind::Legacy => {
              tally.legacy += 1;
              report.push_sample(cap, problem(ProblemKind::Legacy, &hit, None));
              match self.classifier.parse(&hit.reference) {
                Ok(AssetRef::Legacy { object_name, .. }) => object_name,
                _ => continue,
              }
            }
            RefKind::Canonical => {
              tally.canonical += 1;
              match self.classifier.canonical_key(&hit.reference) {
                Some(key) => key.to_string(),
                None => continue,
              }
            }
          };
          if seen.contains_key(&key) {
            continue;
          }
          seen.insert(key.clone(), candidates.len());
          let public_url = match hit.kind {
            RefKind::Canonical => hit.reference.clone(),
            _ => self.objects.public_url(&key),
          };
          candidates.push(Candidate {
            key,
            public_url,
            origin: hit,
          });
        }
      }

      tracing::info!(
        collection,
        documents = tally.documents,
        legacy = tally.legacy,
        inline = tally.inline,
        canonical = tally.canonical,
        "Collection scanned"
      );
      report.documents_scanned += tally.documents;
      report.legacy += tally.legacy;
      report.inline += tally.inline;
      report.canonical += tally.canonical;
      report.collections.push(tally);
    }

    report.unique_objects = candidates.len();
    let outcomes = self.probe_all(candidates.clone()).await;

    for (candidate, outcome) in candidates.iter().zip(outcomes) {
      let Some(outcome) = outcome else {
        report.probe_errors += 1;
        report.push_sample(
          cap,
          problem(
            ProblemKind::ProbeFailed,
            &candidate.origin,
            Some("probe did not complete".into()),
          ),
        );
        continue;
      };
      match outcome.exists {
        Ok(true) => {}
        Ok(false) => {
          report.missing += 1;
          report.push_sample(
            cap,
            problem(
              ProblemKind::Missing,
              &candidate.origin,
              Some(candidate.key.clone()),
            ),
          );
        }
        Err(e) => {
          report.probe_errors += 1;
          report.push_sample(
            cap,
            problem(ProblemKind::ProbeFailed, &candidate.origin, Some(e)),
          );
        }
      }
      match outcome.cdn {
        Some(Ok(status)) if !(200..300).contains(&status) => {
          report.cdn_missing += 1;
          let mut p = problem(
            ProblemKind::CdnNotFound,
            &candidate.origin,
            Some(format!("HTTP {}", status)),
          );
          p.url = candidate.public_url.clone();
          report.push_sample(cap, p);
        }
        Some(Err(e)) => {
          report.probe_errors += 1;
          report.push_sample(
            cap,
            problem(ProblemKind::ProbeFailed, &candidate.origin, Some(e)),
          );
        }
        _ => {}
      }
    }

    tracing::info!(
      documents = report.documents_scanned,
      objects = report.unique_objects,
      missing = report.missing,
      legacy = report.legacy,
      inline = report.inline,
      "Verification finished"
    );
    report
  }

  /// Probe every candidate with a fixed pool of workers pulling indices
  /// from a shared cursor. Results come back indexed by candidate.
  async fn probe_all(&self, candidates: Vec<Candidate>) -> Vec<Option<ProbeOutcome>> {
    let total = candidates.len();
    let mut outcomes: Vec<Option<ProbeOutcome>> = (0..total).map(|_| None).collect();
    if total == 0 {
      return outcomes;
    }

    let candidates = Arc::new(candidates);
    let cursor = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ProbeOutcome)>();
    let workers = self.options.workers.clamp(1, total);
    tracing::debug!(workers, candidates = total, "Starting probe workers");

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
      let candidates = candidates.clone();
      let cursor = cursor.clone();
      let tx = tx.clone();
      let objects = self.objects.clone();
      let fetcher = self.fetcher.clone();
      let check_cdn = self.options.check_cdn;

      handles.push(tokio::spawn(async move {
        loop {
          let i = cursor.fetch_add(1, Ordering::SeqCst);
          let Some(candidate) = candidates.get(i) else {
            break;
          };
          let exists = objects
            .exists(&candidate.key)
            .await
            .map_err(|e| e.to_string());
          let cdn = if check_cdn {
            Some(
              fetcher
                .head(&candidate.public_url)
                .await
                .map_err(|e| e.to_string()),
            )
          } else {
            None
          };
          if tx.send((i, ProbeOutcome { exists, cdn })).is_err() {
            break;
          }
        }
      }));
    }
    drop(tx);

    while let Some((i, outcome)) = rx.recv().await {
      outcomes[i] = Some(outcome);
    }
    for handle in handles {
      if let Err(e) = handle.await {
        tracing::error!(error = %e, "Probe worker panicked");
      }
    }
    outcomes
  }
}

fn problem(kind: ProblemKind, hit: &ScanHit, detail: Option<String>) -> Problem {
  Problem {
    kind,
    collection: hit.collection.clone(),
    document_id: hit.document_id.clone(),
    path: hit.path.to_string(),
    url: truncate(&hit.reference, 120),
    detail,
  }
}
