//! In-memory document store.
//!
//! Documents live in a concurrent map keyed by doctype, each table kept in
//! insertion order. The store can be seeded from a JSON object mapping
//! doctype names to arrays of documents.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::files::short_hash;
use super::types::{DocType, Document, Query};
use super::DocumentStore;
use crate::duration::to_rfc3339;
use crate::error::StoreError;

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<DashMap<DocType, Vec<Document>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from seed data.
    ///
    /// `seed` is an object whose keys are doctype names and whose values are
    /// arrays of documents (each with at least a `name`).
    pub fn from_seed(seed: Value) -> Result<Self, StoreError> {
        let store = Self::new();
        let Value::Object(tables) = seed else {
            return Err(StoreError::Validation {
                doctype: DocType::User,
                reason: "seed must be an object keyed by doctype".to_string(),
            });
        };

        for (doctype_name, rows) in tables {
            let doctype = DocType::from_str(&doctype_name)
                .map_err(|_| StoreError::UnknownDocType(doctype_name.clone()))?;
            let Value::Array(rows) = rows else {
                return Err(StoreError::Validation {
                    doctype,
                    reason: "seed table must be an array".to_string(),
                });
            };
            for row in rows {
                let Value::Object(mut fields) = row else {
                    return Err(StoreError::Validation {
                        doctype,
                        reason: "seed row must be an object".to_string(),
                    });
                };
                let name = match fields.remove("name") {
                    Some(Value::String(name)) => name,
                    _ => String::new(),
                };
                fields.remove("doctype");
                store.insert(Document {
                    doctype,
                    name,
                    fields,
                })?;
            }
            debug!(doctype = %doctype, "Seeded table");
        }

        Ok(store)
    }

    /// Load seed data from a JSON file.
    #[instrument]
    pub fn load_seed_file(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        let store = Self::from_seed(serde_json::from_str(&text)?)?;
        info!(documents = store.len(), "Loaded seed data");
        Ok(store)
    }

    /// Total number of stored documents.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.value().len()).sum()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, doctype: DocType, name: &str) -> Result<Document, StoreError> {
        self.tables
            .get(&doctype)
            .and_then(|table| table.iter().find(|d| d.name == name).cloned())
            .ok_or_else(|| StoreError::NotFound {
                doctype,
                name: name.to_string(),
            })
    }

    fn list(&self, doctype: DocType, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .tables
            .get(&doctype)
            .map(|table| query.apply(table.iter()))
            .unwrap_or_default())
    }

    fn insert(&self, mut doc: Document) -> Result<Document, StoreError> {
        doc.fields.remove("name");
        doc.fields.remove("doctype");
        if !doc.is_set("creation") {
            doc.set("creation", to_rfc3339(OffsetDateTime::now_utc()));
        }

        let mut table = self.tables.entry(doc.doctype).or_default();
        if doc.name.is_empty() {
            loop {
                let candidate = short_hash();
                if !table.iter().any(|d| d.name == candidate) {
                    doc.name = candidate;
                    break;
                }
            }
        } else if table.iter().any(|d| d.name == doc.name) {
            return Err(StoreError::Validation {
                doctype: doc.doctype,
                reason: format!("{:?} already exists", doc.name),
            });
        }

        table.push(doc.clone());
        Ok(doc)
    }

    fn update(&self, doc: &Document) -> Result<(), StoreError> {
        let not_found = || StoreError::NotFound {
            doctype: doc.doctype,
            name: doc.name.clone(),
        };

        let mut table = self.tables.get_mut(&doc.doctype).ok_or_else(not_found)?;
        let slot = table
            .iter_mut()
            .find(|d| d.name == doc.name)
            .ok_or_else(not_found)?;
        *slot = doc.clone();
        Ok(())
    }

    fn delete_all(&self, doctype: DocType) -> Result<usize, StoreError> {
        Ok(self
            .tables
            .remove(&doctype)
            .map(|(_, table)| table.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_assigns_name_and_creation() {
        let store = MemoryStore::new();
        let doc = store
            .insert(Document::new(DocType::LiveLocation).with("latitude", 1.0))
            .unwrap();
        assert_eq!(doc.name.len(), 10);
        assert!(doc.is_set("creation"));
        assert_eq!(store.get(DocType::LiveLocation, &doc.name).unwrap(), doc);
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let store = MemoryStore::new();
        store.insert(Document::named(DocType::Item, "A")).unwrap();
        let err = store.insert(Document::named(DocType::Item, "A")).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(DocType::Item, "nope"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(!store.exists(DocType::Item, "nope").unwrap());
    }

    #[test]
    fn update_replaces_fields() {
        let store = MemoryStore::new();
        let mut doc = store
            .insert(Document::named(DocType::SpareItem, "SP-1").with("collected", "no"))
            .unwrap();
        doc.set("collected", "yes");
        store.update(&doc).unwrap();
        assert_eq!(
            store.get(DocType::SpareItem, "SP-1").unwrap().str("collected"),
            Some("yes")
        );

        let ghost = Document::named(DocType::SpareItem, "SP-2");
        assert!(matches!(store.update(&ghost), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn get_value_skips_unset_fields() {
        let store = MemoryStore::new();
        store
            .insert(Document::named(DocType::Punch, "P1").with("punch_out", ""))
            .unwrap();
        let q = Query::new().eq("name", "P1");
        assert_eq!(store.get_value(DocType::Punch, q.clone(), "punch_out").unwrap(), None);
        store
            .set_value(DocType::Punch, "P1", "punch_out", json!("2024-05-01T10:00:00Z"))
            .unwrap();
        assert_eq!(
            store.get_value(DocType::Punch, q, "punch_out").unwrap(),
            Some(json!("2024-05-01T10:00:00Z"))
        );
    }

    #[test]
    fn delete_all_reports_count() {
        let store = MemoryStore::new();
        store.insert(Document::new(DocType::SerialCardHistory)).unwrap();
        store.insert(Document::new(DocType::SerialCardHistory)).unwrap();
        assert_eq!(store.delete_all(DocType::SerialCardHistory).unwrap(), 2);
        assert_eq!(store.delete_all(DocType::SerialCardHistory).unwrap(), 0);
    }

    #[test]
    fn seed_loads_tables() {
        let store = MemoryStore::from_seed(json!({
            "User": [{"name": "tech@example.com", "api_key": "k", "api_secret": "s"}],
            "Item": [{"name": "FILTER", "custom_flag": "1"}]
        }))
        .unwrap();
        assert_eq!(store.len(), 2);
        let user = store.get(DocType::User, "tech@example.com").unwrap();
        assert_eq!(user.str("api_key"), Some("k"));
        assert!(user.get("name").is_none());
    }

    #[test]
    fn seed_rejects_unknown_doctype() {
        let err = MemoryStore::from_seed(json!({"Invoice": []})).unwrap_err();
        assert!(matches!(err, StoreError::UnknownDocType(name) if name == "Invoice"));
    }
}
