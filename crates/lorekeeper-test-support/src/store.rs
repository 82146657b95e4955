//! Failing document store: exercises infrastructure error paths.

use async_trait::async_trait;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::store::{Document, DocumentStore};

/// A document store that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingDocumentStore;

fn refused() -> GameError {
    GameError::Infrastructure("connection refused".into())
}

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn get(&self, _owner: &OwnerId, _id: &str) -> Result<Option<Document>, GameError> {
        Err(refused())
    }

    async fn put(&self, _owner: &OwnerId, _id: &str, _document: Document) -> Result<(), GameError> {
        Err(refused())
    }

    async fn merge_patch(
        &self,
        _owner: &OwnerId,
        _id: &str,
        _patch: &Document,
    ) -> Result<Document, GameError> {
        Err(refused())
    }

    async fn delete(&self, _owner: &OwnerId, _id: &str) -> Result<bool, GameError> {
        Err(refused())
    }

    async fn list(
        &self,
        _owner: &OwnerId,
        _prefix: &str,
    ) -> Result<Vec<(String, Document)>, GameError> {
        Err(refused())
    }
}
