//! Process-local document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::merge;
use lorekeeper_core::store::{Document, DocumentStore};

type Partition = BTreeMap<String, Document>;

/// Keeps every owner's documents in memory. Used when no database is
/// configured and as the store behind most tests.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    partitions: RwLock<HashMap<OwnerId, Partition>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> GameError {
        GameError::Infrastructure("document store lock poisoned".into())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Document>, GameError> {
        let partitions = self.partitions.read().map_err(Self::poisoned)?;
        Ok(partitions
            .get(owner)
            .and_then(|partition| partition.get(id))
            .cloned())
    }

    async fn put(&self, owner: &OwnerId, id: &str, document: Document) -> Result<(), GameError> {
        let mut partitions = self.partitions.write().map_err(Self::poisoned)?;
        partitions
            .entry(owner.clone())
            .or_default()
            .insert(id.to_owned(), document);
        Ok(())
    }

    async fn merge_patch(
        &self,
        owner: &OwnerId,
        id: &str,
        patch: &Document,
    ) -> Result<Document, GameError> {
        let mut partitions = self.partitions.write().map_err(Self::poisoned)?;
        let partition = partitions.entry(owner.clone()).or_default();
        let document = merge::merged(partition.get(id), patch);
        partition.insert(id.to_owned(), document.clone());
        Ok(document)
    }

    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, GameError> {
        let mut partitions = self.partitions.write().map_err(Self::poisoned)?;
        Ok(partitions
            .get_mut(owner)
            .is_some_and(|partition| partition.remove(id).is_some()))
    }

    async fn list(
        &self,
        owner: &OwnerId,
        prefix: &str,
    ) -> Result<Vec<(String, Document)>, GameError> {
        let partitions = self.partitions.read().map_err(Self::poisoned)?;
        Ok(partitions
            .get(owner)
            .map(|partition| {
                partition
                    .range(prefix.to_owned()..)
                    .take_while(|(id, _)| id.starts_with(prefix))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
