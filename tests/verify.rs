//! Consistency verification tests

mod common;

use common::{classifier, data, legacy_url, Harness, CDN};
use serde_json::json;
use vitrine::db::Access;
use vitrine::storage::ObjectStore;
use vitrine::verify::{ProblemKind, Verifier, VerifyOptions, VerifyReport};

async fn verify(h: &Harness, collections: &[&str], options: VerifyOptions) -> VerifyReport {
  Verifier::new(
    h.store(Access::Restricted),
    h.objects(),
    h.fetcher(),
    classifier(),
    options,
  )
  .run(collections)
  .await
}

async fn put(h: &Harness, key: &str) -> String {
  h.objects.put(key, b"bytes", "image/png").await.unwrap();
  format!("{}/{}", CDN, key)
}

// =============================================================================
// Storage checks
// =============================================================================

#[tokio::test]
async fn test_clean_store() {
  let h = Harness::new(10).await;
  let url = put(&h, "products/b1/1_product_p1.png").await;
  h.store
    .create("products", data(json!({"businessId": "b1", "image": url})), Some("p1"))
    .await
    .unwrap();
  h.store
    .create("products", data(json!({"businessId": "b1", "name": "plain"})), Some("p2"))
    .await
    .unwrap();

  let report = verify(&h, &["products"], VerifyOptions::default()).await;
  assert_eq!(report.documents_scanned, 2);
  assert_eq!(report.references_scanned, 1);
  assert_eq!(report.canonical, 1);
  assert_eq!(report.unique_objects, 1);
  assert!(report.samples.is_empty());
  assert!(report.is_clean());
}

#[tokio::test]
async fn test_missing_object_reported() {
  let h = Harness::new(10).await;
  let url = format!("{}/products/b1/404_product_p1.png", CDN);
  h.store
    .create("products", data(json!({"businessId": "b1", "image": url})), Some("p1"))
    .await
    .unwrap();

  let report = verify(&h, &["products"], VerifyOptions::default()).await;
  assert_eq!(report.missing, 1);
  assert!(!report.is_clean());
  assert_eq!(report.samples.len(), 1);
  let sample = &report.samples[0];
  assert_eq!(sample.kind, ProblemKind::Missing);
  assert_eq!(sample.document_id, "p1");
  assert_eq!(sample.path, "image");
  assert_eq!(sample.url, url);
}

#[tokio::test]
async fn test_shared_objects_probed_once() {
  let h = Harness::new(2).await;
  let shared = put(&h, "gallery/b1/1_gallery.png").await;
  for i in 0..4 {
    h.store
      .create(
        "gallery",
        data(json!({"businessId": "b1", "images": [shared.clone(), shared.clone()]})),
        Some(&format!("g{}", i)),
      )
      .await
      .unwrap();
  }

  let report = verify(&h, &["gallery"], VerifyOptions::default()).await;
  assert_eq!(report.canonical, 8);
  assert_eq!(report.unique_objects, 1);
  assert!(report.is_clean());
}

#[tokio::test]
async fn test_residual_references_are_not_clean() {
  let h = Harness::new(10).await;
  h.store
    .create(
      "staff",
      data(json!({
        "businessId": "b1",
        "avatar": legacy_url("staff/ann.jpg"),
        "badge": "data:image/png;base64,AAAA"
      })),
      Some("s1"),
    )
    .await
    .unwrap();
  // Legacy object already copied under its original name
  h.objects.put("staff/ann.jpg", b"x", "image/jpeg").await.unwrap();

  let report = verify(&h, &["staff"], VerifyOptions::default()).await;
  assert_eq!(report.legacy, 1);
  assert_eq!(report.inline, 1);
  assert_eq!(report.missing, 0);
  assert_eq!(report.unique_objects, 1);
  assert!(!report.is_clean());

  let kinds: Vec<ProblemKind> = report.samples.iter().map(|p| p.kind).collect();
  assert!(kinds.contains(&ProblemKind::Legacy));
  assert!(kinds.contains(&ProblemKind::Inline));
}

#[tokio::test]
async fn test_many_objects_with_small_pool() {
  let h = Harness::new(5).await;
  for i in 0..30 {
    let url = if i % 10 == 0 {
      format!("{}/orders/b1/{}_order_o{}.png", CDN, i, i)
    } else {
      put(&h, &format!("orders/b1/{}_order_o{}.png", i, i)).await
    };
    h.store
      .create("orders", data(json!({"businessId": "b1", "file": url})), Some(&format!("o{:02}", i)))
      .await
      .unwrap();
  }

  let options = VerifyOptions {
    workers: 4,
    sample_size: 2,
    ..Default::default()
  };
  let report = verify(&h, &["orders"], options).await;
  assert_eq!(report.unique_objects, 30);
  assert_eq!(report.missing, 3);
  assert_eq!(report.probe_errors, 0);
  assert_eq!(report.samples.len(), 2);
  assert_eq!(report.samples_dropped, 1);
}

// =============================================================================
// CDN checks
// =============================================================================

#[tokio::test]
async fn test_cdn_probe_only_when_enabled() {
  let h = Harness::new(10).await;
  let ok = put(&h, "services/b1/1_service_s1.png").await;
  let stale = put(&h, "services/b1/2_service_s2.png").await;
  h.fetcher.head_status(&stale, 404);
  h.store
    .create("services", data(json!({"businessId": "b1", "image": ok})), Some("s1"))
    .await
    .unwrap();
  h.store
    .create("services", data(json!({"businessId": "b1", "image": stale})), Some("s2"))
    .await
    .unwrap();

  let report = verify(&h, &["services"], VerifyOptions::default()).await;
  assert!(!report.cdn_checked);
  assert_eq!(report.cdn_missing, 0);
  assert!(report.is_clean());

  let options = VerifyOptions {
    check_cdn: true,
    ..Default::default()
  };
  let report = verify(&h, &["services"], options).await;
  assert!(report.cdn_checked);
  assert_eq!(report.cdn_missing, 1);
  assert!(!report.is_clean());
  let sample = &report.samples[0];
  assert_eq!(sample.kind, ProblemKind::CdnNotFound);
  assert_eq!(sample.url, stale);
  assert_eq!(sample.document_id, "s2");
}

#[tokio::test]
async fn test_per_collection_tallies() {
  let h = Harness::new(10).await;
  let url = put(&h, "menu/b1/1_item_i1.png").await;
  h.store
    .create("menu_items", data(json!({"image": url})), Some("i1"))
    .await
    .unwrap();
  h.store
    .create("reviews", data(json!({"photo": "data:image/png;base64,AAAA"})), Some("r1"))
    .await
    .unwrap();

  let report = verify(&h, &["menu_items", "reviews", "rooms"], VerifyOptions::default()).await;
  assert_eq!(report.collections.len(), 3);
  let reviews = report
    .collections
    .iter()
    .find(|c| c.collection == "reviews")
    .unwrap();
  assert_eq!(reviews.documents, 1);
  assert_eq!(reviews.inline, 1);
  let rooms = report.collections.iter().find(|c| c.collection == "rooms").unwrap();
  assert_eq!(rooms.documents, 0);
  assert!(report.failed_collections.is_empty());
}

#[tokio::test]
async fn test_unreadable_collection_is_not_clean() {
  let (h, faulty) = Harness::faulty(10).await;
  let url = put(&h, "products/b1/1_product_p1.png").await;
  h.store
    .create("products", data(json!({"businessId": "b1", "image": url})), Some("p1"))
    .await
    .unwrap();
  h.store
    .create("staff", data(json!({"businessId": "b1"})), Some("s1"))
    .await
    .unwrap();
  faulty.fail_reads("staff");

  let report = verify(&h, &["staff", "products"], VerifyOptions::default()).await;
  assert_eq!(report.failed_collections.len(), 1);
  let (name, error) = &report.failed_collections[0];
  assert_eq!(name, "staff");
  assert!(error.contains("refused"));

  // The rest of the run still happens
  assert_eq!(report.collections.len(), 1);
  assert_eq!(report.documents_scanned, 1);
  assert_eq!(report.unique_objects, 1);
  assert_eq!(report.missing, 0);
  assert!(!report.is_clean());
}
