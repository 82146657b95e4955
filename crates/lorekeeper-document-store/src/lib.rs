//! Lorekeeper Document Store: physical implementations of the
//! `DocumentStore` port.

pub mod in_memory;
pub mod pg_document_store;
pub mod schema;

pub use in_memory::InMemoryDocumentStore;
pub use pg_document_store::PgDocumentStore;
