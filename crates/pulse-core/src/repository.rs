// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Versioned entity repository abstraction.
//!
//! The registry persists its entities through the [`Repository`] trait: a
//! generic CRUD + query store with compare-and-swap semantics on update and
//! delete, driven by the opaque generation token each record carries. The
//! in-memory implementation provided here backs tests and single-process
//! deployments; production storage plugs in behind the same trait.
//!
//! # Concurrency
//!
//! The repository is the only serialization point for mutations of the same
//! entity id: losers of a concurrent update observe `OutOfDate` and must
//! re-fetch and retry. The registry takes no in-process locks.

use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, RegistryResult};
use crate::model::{
    DataSetWriter, DataSetWriterFilter, PublishedDataSetEvents, PublishedDataSetVariable,
    PublishedEventsFilter, PublishedVariableFilter, WriterGroup, WriterGroupFilter,
};
use crate::types::{DataSetWriterId, GenerationId, VariableId, WriterGroupId};

/// Default number of records per query page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_SIZE: usize = 1000;

// =============================================================================
// Entity Trait
// =============================================================================

/// A record the repository can store: identified, versioned, and filterable.
pub trait Entity: Clone + Send + Sync + 'static {
    /// The id type of this entity.
    type Id: Clone + Eq + Hash + Ord + fmt::Display + Send + Sync + 'static;

    /// The exact-match filter type for queries.
    type Filter: Default + Clone + Send + Sync + 'static;

    /// Entity kind name used in error messages.
    const KIND: &'static str;

    /// Returns the entity's id.
    fn id(&self) -> Self::Id;

    /// Returns the entity's current generation token.
    fn generation(&self) -> &GenerationId;

    /// Replaces the generation token.
    fn set_generation(&mut self, generation: GenerationId);

    /// Returns `true` if the entity matches every provided filter field.
    fn matches(&self, filter: &Self::Filter) -> bool;
}

// =============================================================================
// Continuation Token and Pages
// =============================================================================

/// Opaque continuation token for paged queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    fn from_offset(offset: usize) -> Self {
        Self(offset.to_string())
    }

    fn offset(&self) -> RegistryResult<usize> {
        self.0
            .parse()
            .map_err(|_| RegistryError::InvalidContinuation)
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The records in this page.
    pub items: Vec<T>,
    /// Token for fetching the next page; `None` when exhausted.
    pub continuation: Option<ContinuationToken>,
}

impl<T> Page<T> {
    /// Creates an empty final page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            continuation: None,
        }
    }

    /// Returns `true` if more pages follow.
    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

// =============================================================================
// Repository Trait
// =============================================================================

/// Generic versioned CRUD + query store.
///
/// Every mutation is generation-checked; queries are paged through opaque
/// continuation tokens.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a record with the same id is present.
    async fn add(&self, record: T) -> RegistryResult<T>;

    /// Looks up a record by id.
    async fn find(&self, id: &T::Id) -> RegistryResult<Option<T>>;

    /// Replaces a record whose stored generation equals `expected`.
    ///
    /// On success the record is stored with a freshly assigned generation,
    /// which is returned.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id is absent
    /// - `OutOfDate` if the stored generation differs from `expected`
    async fn update(&self, record: T, expected: &GenerationId) -> RegistryResult<T>;

    /// Deletes a record whose stored generation equals `expected`.
    ///
    /// Returns the deleted record.
    async fn delete(&self, id: &T::Id, expected: &GenerationId) -> RegistryResult<T>;

    /// Returns one page of records matching the filter, ordered by id.
    async fn query(
        &self,
        filter: &T::Filter,
        continuation: Option<&ContinuationToken>,
        page_size: Option<usize>,
    ) -> RegistryResult<Page<T>>;
}

/// Drains every page of a query, checking for cancellation between pages.
///
/// Returns the records collected so far when the token is cancelled.
pub async fn query_all<T: Entity>(
    repository: &dyn Repository<T>,
    filter: &T::Filter,
    cancel: &CancellationToken,
) -> RegistryResult<Vec<T>> {
    let mut records = Vec::new();
    let mut continuation: Option<ContinuationToken> = None;

    loop {
        if cancel.is_cancelled() {
            return Ok(records);
        }
        let page = repository
            .query(filter, continuation.as_ref(), Some(DEFAULT_PAGE_SIZE))
            .await?;
        records.extend(page.items);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(records),
        }
    }
}

// =============================================================================
// In-Memory Repository
// =============================================================================

/// DashMap-backed repository with CAS semantics.
///
/// Query ordering is by id so that continuation tokens stay stable while
/// unrelated records churn.
#[derive(Debug)]
pub struct InMemoryRepository<T: Entity> {
    records: DashMap<T::Id, T>,
}

impl<T: Entity> InMemoryRepository<T> {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn add(&self, mut record: T) -> RegistryResult<T> {
        record.set_generation(GenerationId::new());
        let id = record.id();
        match self.records.entry(id.clone()) {
            dashmap::Entry::Occupied(_) => Err(RegistryError::already_exists(T::KIND, id)),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn find(&self, id: &T::Id) -> RegistryResult<Option<T>> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn update(&self, mut record: T, expected: &GenerationId) -> RegistryResult<T> {
        let id = record.id();
        match self.records.entry(id.clone()) {
            dashmap::Entry::Vacant(_) => Err(RegistryError::not_found(T::KIND, id)),
            dashmap::Entry::Occupied(mut slot) => {
                if slot.get().generation() != expected {
                    return Err(RegistryError::out_of_date(T::KIND, id));
                }
                record.set_generation(GenerationId::new());
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn delete(&self, id: &T::Id, expected: &GenerationId) -> RegistryResult<T> {
        match self.records.entry(id.clone()) {
            dashmap::Entry::Vacant(_) => Err(RegistryError::not_found(T::KIND, id.clone())),
            dashmap::Entry::Occupied(slot) => {
                if slot.get().generation() != expected {
                    return Err(RegistryError::out_of_date(T::KIND, id.clone()));
                }
                Ok(slot.remove())
            }
        }
    }

    async fn query(
        &self,
        filter: &T::Filter,
        continuation: Option<&ContinuationToken>,
        page_size: Option<usize>,
    ) -> RegistryResult<Page<T>> {
        let offset = match continuation {
            Some(token) => token.offset()?,
            None => 0,
        };
        let size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut matching: Vec<T> = self
            .records
            .iter()
            .filter(|r| r.matches(filter))
            .map(|r| r.clone())
            .collect();
        matching.sort_by(|a, b| a.id().cmp(&b.id()));

        let total = matching.len();
        let items: Vec<T> = matching.into_iter().skip(offset).take(size).collect();
        let next = offset + items.len();
        let continuation = if next < total {
            Some(ContinuationToken::from_offset(next))
        } else {
            None
        };

        Ok(Page { items, continuation })
    }
}

// =============================================================================
// Entity Bindings
// =============================================================================

impl Entity for WriterGroup {
    type Id = WriterGroupId;
    type Filter = WriterGroupFilter;

    const KIND: &'static str = "writer group";

    fn id(&self) -> WriterGroupId {
        self.id.clone()
    }

    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    fn set_generation(&mut self, generation: GenerationId) {
        self.generation = generation;
    }

    fn matches(&self, filter: &WriterGroupFilter) -> bool {
        if let Some(name) = &filter.name {
            if self.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(site_id) = &filter.site_id {
            if self.site_id.as_ref() != Some(site_id) {
                return false;
            }
        }
        if let Some(state) = filter.state {
            if self.status.state != state {
                return false;
            }
        }
        true
    }
}

impl Entity for DataSetWriter {
    type Id = DataSetWriterId;
    type Filter = DataSetWriterFilter;

    const KIND: &'static str = "dataset writer";

    fn id(&self) -> DataSetWriterId {
        self.id.clone()
    }

    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    fn set_generation(&mut self, generation: GenerationId) {
        self.generation = generation;
    }

    fn matches(&self, filter: &DataSetWriterFilter) -> bool {
        if let Some(group_id) = &filter.writer_group_id {
            if &self.writer_group_id != group_id {
                return false;
            }
        }
        if let Some(endpoint_id) = &filter.endpoint_id {
            if &self.endpoint_id != endpoint_id {
                return false;
            }
        }
        true
    }
}

/// Composite key of a published variable: owning writer plus variable id.
///
/// Variable ids derived from node ids are only unique within one writer, so
/// the repository keys variables by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableKey {
    /// The owning dataset writer.
    pub writer_id: DataSetWriterId,
    /// The variable id within that writer.
    pub variable_id: VariableId,
}

impl VariableKey {
    /// Creates a new key.
    pub fn new(writer_id: DataSetWriterId, variable_id: VariableId) -> Self {
        Self {
            writer_id,
            variable_id,
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.writer_id, self.variable_id)
    }
}

impl Entity for PublishedDataSetVariable {
    type Id = VariableKey;
    type Filter = PublishedVariableFilter;

    const KIND: &'static str = "dataset variable";

    fn id(&self) -> VariableKey {
        VariableKey::new(self.writer_id.clone(), self.id.clone())
    }

    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    fn set_generation(&mut self, generation: GenerationId) {
        self.generation = generation;
    }

    fn matches(&self, filter: &PublishedVariableFilter) -> bool {
        if let Some(writer_id) = &filter.writer_id {
            if &self.writer_id != writer_id {
                return false;
            }
        }
        if let Some(node_id) = &filter.node_id {
            if &self.node_id != node_id {
                return false;
            }
        }
        true
    }
}

impl Entity for PublishedDataSetEvents {
    type Id = DataSetWriterId;
    type Filter = PublishedEventsFilter;

    const KIND: &'static str = "event dataset";

    fn id(&self) -> DataSetWriterId {
        self.writer_id.clone()
    }

    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    fn set_generation(&mut self, generation: GenerationId) {
        self.generation = generation;
    }

    fn matches(&self, filter: &PublishedEventsFilter) -> bool {
        match &filter.writer_id {
            Some(writer_id) => &self.writer_id == writer_id,
            None => true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WriterGroupRequest;
    use crate::types::WriterGroupState;

    fn group(id: &str) -> WriterGroup {
        WriterGroup::from_request(WriterGroupId::new(id), WriterGroupRequest::default())
    }

    #[tokio::test]
    async fn test_add_and_find() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        let stored = repo.add(group("g1")).await.unwrap();

        let found = repo.find(&WriterGroupId::new("g1")).await.unwrap().unwrap();
        assert_eq!(found.generation, stored.generation);
        assert!(repo.find(&WriterGroupId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        repo.add(group("g1")).await.unwrap();

        let err = repo.add(group("g1")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_cas() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        let stored = repo.add(group("g1")).await.unwrap();

        let mut changed = stored.clone();
        changed.name = Some("renamed".to_string());
        let updated = repo.update(changed, &stored.generation).await.unwrap();
        assert_ne!(updated.generation, stored.generation);

        // Stale generation must fail and leave the record unchanged.
        let mut stale = stored.clone();
        stale.name = Some("lost".to_string());
        let err = repo.update(stale, &stored.generation).await.unwrap_err();
        assert!(err.is_out_of_date());

        let current = repo.find(&WriterGroupId::new("g1")).await.unwrap().unwrap();
        assert_eq!(current.name.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_delete_cas() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        let stored = repo.add(group("g1")).await.unwrap();

        let err = repo
            .delete(&WriterGroupId::new("g1"), &GenerationId::new())
            .await
            .unwrap_err();
        assert!(err.is_out_of_date());

        repo.delete(&WriterGroupId::new("g1"), &stored.generation)
            .await
            .unwrap();
        assert!(repo.find(&WriterGroupId::new("g1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_paging() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        for i in 0..25 {
            repo.add(group(&format!("g{:02}", i))).await.unwrap();
        }

        let filter = WriterGroupFilter::default();
        let first = repo.query(&filter, None, Some(10)).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert!(first.has_more());

        let second = repo
            .query(&filter, first.continuation.as_ref(), Some(10))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 10);

        let third = repo
            .query(&filter, second.continuation.as_ref(), Some(10))
            .await
            .unwrap();
        assert_eq!(third.items.len(), 5);
        assert!(!third.has_more());

        // Pages must not overlap.
        assert_ne!(first.items[9].id, second.items[0].id);
    }

    #[tokio::test]
    async fn test_query_filter() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        let mut g = group("g1");
        g.name = Some("alpha".to_string());
        repo.add(g).await.unwrap();
        repo.add(group("g2")).await.unwrap();

        let filter = WriterGroupFilter {
            name: Some("alpha".to_string()),
            ..Default::default()
        };
        let page = repo.query(&filter, None, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, WriterGroupId::new("g1"));

        let filter = WriterGroupFilter {
            state: Some(WriterGroupState::Publishing),
            ..Default::default()
        };
        let page = repo.query(&filter, None, None).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_query_all_respects_cancellation() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        for i in 0..5 {
            repo.add(group(&format!("g{}", i))).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let all = query_all(&repo, &WriterGroupFilter::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        cancel.cancel();
        let none = query_all(&repo, &WriterGroupFilter::default(), &cancel)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_continuation() {
        let repo = InMemoryRepository::<WriterGroup>::new();
        let bogus = ContinuationToken("not-a-number".to_string());
        let err = repo
            .query(&WriterGroupFilter::default(), Some(&bogus), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidContinuation));
    }
}
