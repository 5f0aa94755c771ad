//! Static registry of the platform's collections.
//!
//! Each entry says how a document of that collection is tied to its tenant,
//! where its assets live in the bucket and whether it takes part in a tenant
//! cascade delete.

use serde_json::Value;
use std::collections::HashMap;

use crate::types::{Data, Document};

/// The privileged entity's collection name
pub const BUSINESSES: &str = "businesses";

/// Both spellings of the owner field found in historical data
pub const OWNER_FIELDS: [&str; 2] = ["businessId", "business_id"];

/// How a document resolves its owning tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerStrategy {
  /// The document is the tenant
  SelfId,
  /// One of [`OWNER_FIELDS`] on the document itself
  Fields,
  /// Inherited from a parent document referenced by `link_field`, falling
  /// back to [`OWNER_FIELDS`] when the document carries them directly
  Parent {
    collection: &'static str,
    link_field: &'static str,
  },
}

#[derive(Debug)]
pub struct CollectionSpec {
  pub name: &'static str,
  /// Object key prefix for this collection's assets
  pub module: &'static str,
  /// Asset label used when the field name says nothing more specific
  pub label: &'static str,
  /// Label-specific prefixes that replace `module`
  pub module_overrides: &'static [(&'static str, &'static str)],
  pub owner: OwnerStrategy,
  /// Whether rows carry a first-class, indexed owner column
  pub owner_column: bool,
  /// Whether a tenant cascade delete removes this collection's documents
  pub cascade: bool,
}

pub static COLLECTIONS: &[CollectionSpec] = &[
  CollectionSpec {
    name: BUSINESSES,
    module: "business",
    label: "asset",
    module_overrides: &[("logo", "logos"), ("cover", "covers")],
    owner: OwnerStrategy::SelfId,
    owner_column: false,
    cascade: false,
  },
  CollectionSpec {
    name: "products",
    module: "products",
    label: "product",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
  CollectionSpec {
    name: "product_categories",
    module: "products",
    label: "category",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
  CollectionSpec {
    name: "services",
    module: "services",
    label: "service",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
  CollectionSpec {
    name: "rooms",
    module: "hotel",
    label: "room",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
  CollectionSpec {
    name: "menu_categories",
    module: "menu",
    label: "category",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: false,
    cascade: true,
  },
  CollectionSpec {
    name: "menu_items",
    module: "menu",
    label: "item",
    module_overrides: &[],
    owner: OwnerStrategy::Parent {
      collection: "menu_categories",
      link_field: "categoryId",
    },
    owner_column: false,
    cascade: true,
  },
  CollectionSpec {
    name: "gallery",
    module: "gallery",
    label: "gallery",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: false,
    cascade: true,
  },
  CollectionSpec {
    name: "staff",
    module: "staff",
    label: "avatar",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: false,
    cascade: true,
  },
  CollectionSpec {
    name: "reviews",
    module: "reviews",
    label: "review",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: false,
    cascade: true,
  },
  CollectionSpec {
    name: "appointments",
    module: "appointments",
    label: "attachment",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
  CollectionSpec {
    name: "orders",
    module: "orders",
    label: "order",
    module_overrides: &[],
    owner: OwnerStrategy::Fields,
    owner_column: true,
    cascade: true,
  },
];

pub fn lookup(name: &str) -> Option<&'static CollectionSpec> {
  COLLECTIONS.iter().find(|c| c.name == name)
}

pub fn is_privileged(name: &str) -> bool {
  name == BUSINESSES
}

/// Collections removed by a tenant cascade, in registry order
pub fn cascade_collections() -> impl Iterator<Item = &'static CollectionSpec> {
  COLLECTIONS.iter().filter(|c| c.cascade)
}

/// Owner id stored directly on a document under either spelling
pub fn direct_owner(data: &Data) -> Option<&str> {
  OWNER_FIELDS
    .iter()
    .filter_map(|f| data.get(*f).and_then(Value::as_str))
    .find(|s| !s.is_empty())
}

/// Whether `data` names `owner_id` as its owner under either spelling
pub fn owned_by(data: &Data, owner_id: &str) -> bool {
  OWNER_FIELDS
    .iter()
    .any(|f| data.get(*f).and_then(Value::as_str) == Some(owner_id))
}

impl CollectionSpec {
  pub fn is_privileged(&self) -> bool {
    is_privileged(self.name)
  }

  /// Key prefix for an asset with the given label
  pub fn module_for(&self, label: &str) -> &'static str {
    self
      .module_overrides
      .iter()
      .find(|(l, _)| *l == label)
      .map_or(self.module, |&(_, m)| m)
  }

  /// Parent collection this one inherits its owner from
  pub fn parent(&self) -> Option<&'static str> {
    match self.owner {
      OwnerStrategy::Parent { collection, .. } => Some(collection),
      _ => None,
    }
  }

  pub fn resolve_owner(&self, doc: &Document, parents: &ParentLookup) -> Option<String> {
    match self.owner {
      OwnerStrategy::SelfId => Some(doc.id.clone()),
      OwnerStrategy::Fields => direct_owner(&doc.data).map(str::to_string),
      OwnerStrategy::Parent {
        collection,
        link_field,
      } => direct_owner(&doc.data).map(str::to_string).or_else(|| {
        doc
          .data
          .get(link_field)
          .and_then(Value::as_str)
          .and_then(|parent_id| parents.owner_of(collection, parent_id))
          .map(str::to_string)
      }),
    }
  }
}

/// Parent id -> owner id tables, loaded once per run
#[derive(Debug, Default)]
pub struct ParentLookup {
  owners: HashMap<&'static str, HashMap<String, String>>,
}

impl ParentLookup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Index the owners of a parent collection's documents
  pub fn insert(&mut self, collection: &'static str, docs: &[Document]) {
    let table = self.owners.entry(collection).or_default();
    for doc in docs {
      if let Some(owner) = direct_owner(&doc.data) {
        table.insert(doc.id.clone(), owner.to_string());
      }
    }
  }

  pub fn contains(&self, collection: &str) -> bool {
    self.owners.contains_key(collection)
  }

  pub fn owner_of(&self, collection: &str, parent_id: &str) -> Option<&str> {
    self
      .owners
      .get(collection)
      .and_then(|t| t.get(parent_id))
      .map(String::as_str)
  }
}
