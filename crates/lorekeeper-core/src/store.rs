//! Document store port.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GameError;
use crate::ids::OwnerId;

/// A keyed JSON document.
pub type Document = Value;

/// Keyed JSON documents partitioned by owner.
///
/// All mutation goes through whole-document `put` or `merge_patch`; there are
/// no multi-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads a document. `Ok(None)` means "does not exist (yet)".
    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Document>, GameError>;

    /// Writes a whole document, replacing any previous version.
    async fn put(&self, owner: &OwnerId, id: &str, document: Document) -> Result<(), GameError>;

    /// Merges `patch` into the stored document (creating it if absent) using
    /// [`crate::merge::merge_patch`] and returns the merged result.
    async fn merge_patch(
        &self,
        owner: &OwnerId,
        id: &str,
        patch: &Document,
    ) -> Result<Document, GameError>;

    /// Deletes a document. Returns whether anything was removed.
    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, GameError>;

    /// Lists an owner's documents whose id starts with `prefix`, ordered by id.
    /// An empty prefix lists everything.
    async fn list(&self, owner: &OwnerId, prefix: &str)
    -> Result<Vec<(String, Document)>, GameError>;
}
