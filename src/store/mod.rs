//! Document and file storage.
//!
//! This module handles:
//! - The generic document model and list queries
//! - The [`DocumentStore`] trait the service is written against
//! - An in-memory store, seedable from JSON
//! - File storage for uploaded images

pub mod files;
pub mod memory;
pub mod types;

pub use files::{
    sniff_image_extension, unique_file_name, FileStore, LocalFileStore, MemoryFileStore,
};
pub use memory::MemoryStore;
pub use types::{compare_values, Condition, DocType, Document, Order, Query};

use serde_json::Value;

use crate::error::StoreError;

/// Persistence for generic documents.
///
/// Every operation can fail with [`StoreError::NotFound`] or
/// [`StoreError::Validation`].
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by name.
    fn get(&self, doctype: DocType, name: &str) -> Result<Document, StoreError>;

    /// List documents matching a query.
    fn list(&self, doctype: DocType, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Insert a document, assigning a name when it has none. Returns the
    /// stored document.
    fn insert(&self, doc: Document) -> Result<Document, StoreError>;

    /// Replace an existing document.
    fn update(&self, doc: &Document) -> Result<(), StoreError>;

    /// Delete every document of a kind, returning how many were removed.
    fn delete_all(&self, doctype: DocType) -> Result<usize, StoreError>;

    /// First document matching a query.
    fn first(&self, doctype: DocType, query: Query) -> Result<Option<Document>, StoreError> {
        Ok(self.list(doctype, &query.limit(1))?.into_iter().next())
    }

    /// A field of the first matching document, if that field is set.
    fn get_value(
        &self,
        doctype: DocType,
        query: Query,
        field: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .first(doctype, query)?
            .filter(|doc| doc.is_set(field))
            .and_then(|doc| doc.get(field).cloned()))
    }

    /// Set one field on an existing document.
    fn set_value(
        &self,
        doctype: DocType,
        name: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut doc = self.get(doctype, name)?;
        doc.set(field, value);
        self.update(&doc)
    }

    /// Whether a document exists.
    fn exists(&self, doctype: DocType, name: &str) -> Result<bool, StoreError> {
        match self.get(doctype, name) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
