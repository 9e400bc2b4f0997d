// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The writer group registry: configuration authority for writer groups,
//! dataset writers, and published items.
//!
//! The registry persists through [`Repository`] implementations, emits an
//! event through the [`EventBroker`] after every successful mutation, and
//! takes no in-process locks: mutations on the same entity id are serialized
//! by the repository's compare-and-swap, and losers surface `OutOfDate`.
//!
//! This module holds the registry type and the writer-group operations;
//! writer/item operations, bulk import, and the runtime state-update path
//! live in the sibling modules.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pulse_core::broker::{EventBroker, WriterGroupEvent};
use pulse_core::endpoint::EndpointRegistry;
use pulse_core::error::{RegistryError, RegistryResult};
use pulse_core::model::{
    DataSetWriter, DataSetWriterFilter, PublishedDataSetEvents, PublishedDataSetVariable,
    WriterGroup, WriterGroupFilter, WriterGroupPatch, WriterGroupRequest,
};
use pulse_core::repository::{ContinuationToken, InMemoryRepository, Page, Repository};
use pulse_core::types::{
    DataSetWriterId, GenerationId, WriterGroupId, WriterGroupState, WriterGroupStatus,
};

use crate::patch;

/// Attempts for internal read-modify-write loops that carry no caller
/// generation (activation, state reports). Contention on a single group is
/// expected to be rare and short.
pub(crate) const MAX_CAS_RETRIES: usize = 5;

/// Name given to lazily created default groups.
pub const DEFAULT_GROUP_NAME: &str = "default";

// =============================================================================
// Registry
// =============================================================================

/// The writer group registry.
pub struct WriterGroupRegistry {
    pub(crate) groups: Arc<dyn Repository<WriterGroup>>,
    pub(crate) writers: Arc<dyn Repository<DataSetWriter>>,
    pub(crate) variables: Arc<dyn Repository<PublishedDataSetVariable>>,
    pub(crate) events: Arc<dyn Repository<PublishedDataSetEvents>>,
    pub(crate) endpoints: Arc<dyn EndpointRegistry>,
    pub(crate) broker: Arc<EventBroker>,
    pub(crate) cancel: CancellationToken,
}

impl WriterGroupRegistry {
    /// Creates a registry backed by in-memory repositories.
    pub fn in_memory(endpoints: Arc<dyn EndpointRegistry>, broker: Arc<EventBroker>) -> Self {
        Self::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            endpoints,
            broker,
        )
    }

    /// Creates a registry over the given repositories.
    pub fn new(
        groups: Arc<dyn Repository<WriterGroup>>,
        writers: Arc<dyn Repository<DataSetWriter>>,
        variables: Arc<dyn Repository<PublishedDataSetVariable>>,
        events: Arc<dyn Repository<PublishedDataSetEvents>>,
        endpoints: Arc<dyn EndpointRegistry>,
        broker: Arc<EventBroker>,
    ) -> Self {
        Self {
            groups,
            writers,
            variables,
            events,
            endpoints,
            broker,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the registry's event broker.
    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    /// Cancels long-running paged iterations (bulk removes, imports).
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // =========================================================================
    // Writer Group Operations
    // =========================================================================

    /// Adds a writer group. The group starts `Disabled`.
    pub async fn add_writer_group(
        &self,
        request: WriterGroupRequest,
    ) -> RegistryResult<WriterGroup> {
        self.insert_group(WriterGroupId::generate(), request).await
    }

    /// Inserts a group under a specific id (import and default-group paths).
    pub(crate) async fn insert_group(
        &self,
        id: WriterGroupId,
        request: WriterGroupRequest,
    ) -> RegistryResult<WriterGroup> {
        self.insert_group_as(id, request, WriterGroupEvent::Added).await
    }

    /// Inserts a group announced with the given event constructor. The
    /// lazy default-group path announces `Updated` rather than `Added`.
    pub(crate) async fn insert_group_as(
        &self,
        id: WriterGroupId,
        request: WriterGroupRequest,
        event: fn(WriterGroup) -> WriterGroupEvent,
    ) -> RegistryResult<WriterGroup> {
        let group = WriterGroup::from_request(id, request);
        let stored = self.groups.add(group).await?;
        info!(group_id = %stored.id, site = ?stored.site_id, "Writer group added");
        self.broker.notify_group(event(stored.clone())).await;
        Ok(stored)
    }

    /// Looks up a writer group.
    pub async fn get_writer_group(&self, id: &WriterGroupId) -> RegistryResult<WriterGroup> {
        self.require_group(id).await
    }

    /// Returns one page of writer groups matching the filter.
    pub async fn list_writer_groups(
        &self,
        filter: &WriterGroupFilter,
        continuation: Option<&ContinuationToken>,
        page_size: Option<usize>,
    ) -> RegistryResult<Page<WriterGroup>> {
        self.groups.query(filter, continuation, page_size).await
    }

    /// Applies a generation-checked patch to a writer group.
    ///
    /// Emits `Updated` only when at least one field actually changed; an
    /// effect-free patch returns the stored record without a generation bump.
    pub async fn update_writer_group(
        &self,
        id: &WriterGroupId,
        request: WriterGroupPatch,
        generation: &GenerationId,
    ) -> RegistryResult<WriterGroup> {
        let mut group = self.require_group(id).await?;
        if &group.generation != generation {
            return Err(RegistryError::out_of_date("writer group", id));
        }

        if !patch::apply_group_patch(&mut group, request) {
            debug!(group_id = %id, "Writer group patch had no effect");
            return Ok(group);
        }

        let updated = self.groups.update(group, generation).await?;
        info!(group_id = %id, "Writer group updated");
        self.broker
            .notify_group(WriterGroupEvent::Updated(updated.clone()))
            .await;
        Ok(updated)
    }

    /// Removes a writer group.
    ///
    /// # Errors
    ///
    /// `InvalidState` while any dataset writer still belongs to the group.
    pub async fn remove_writer_group(
        &self,
        id: &WriterGroupId,
        generation: &GenerationId,
    ) -> RegistryResult<()> {
        let filter = DataSetWriterFilter {
            writer_group_id: Some(id.clone()),
            ..Default::default()
        };
        let members = self.writers.query(&filter, None, Some(1)).await?;
        if !members.items.is_empty() {
            return Err(RegistryError::invalid_state(format!(
                "writer group '{}' still has dataset writers",
                id
            )));
        }

        self.groups.delete(id, generation).await?;
        info!(group_id = %id, "Writer group removed");
        self.broker
            .notify_group(WriterGroupEvent::Removed { id: id.clone() })
            .await;
        Ok(())
    }

    /// Activates a writer group: `Disabled` moves to `Pending`.
    ///
    /// Activating an already active group is a no-op; the stored record is
    /// returned unchanged, and no event is emitted.
    pub async fn activate_writer_group(&self, id: &WriterGroupId) -> RegistryResult<WriterGroup> {
        for _ in 0..MAX_CAS_RETRIES {
            let group = self.require_group(id).await?;
            if group.status.state.is_active() {
                debug!(group_id = %id, state = %group.status.state, "Group already active");
                return Ok(group);
            }

            let mut next = group.clone();
            next.status = WriterGroupStatus::new(WriterGroupState::Pending);
            match self.groups.update(next, &group.generation).await {
                Ok(updated) => {
                    info!(group_id = %id, "Writer group activated");
                    self.broker
                        .notify_group(WriterGroupEvent::Activated(updated.clone()))
                        .await;
                    self.broker
                        .notify_group(WriterGroupEvent::StateChanged {
                            id: id.clone(),
                            status: updated.status.clone(),
                        })
                        .await;
                    return Ok(updated);
                }
                Err(e) if e.is_out_of_date() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RegistryError::out_of_date("writer group", id))
    }

    /// Deactivates a writer group: any active state returns to `Disabled`.
    ///
    /// Deactivating a disabled group is a no-op.
    pub async fn deactivate_writer_group(&self, id: &WriterGroupId) -> RegistryResult<WriterGroup> {
        for _ in 0..MAX_CAS_RETRIES {
            let group = self.require_group(id).await?;
            if group.status.state == WriterGroupState::Disabled {
                debug!(group_id = %id, "Group already disabled");
                return Ok(group);
            }

            let mut next = group.clone();
            next.status = WriterGroupStatus::new(WriterGroupState::Disabled);
            match self.groups.update(next, &group.generation).await {
                Ok(updated) => {
                    info!(group_id = %id, "Writer group deactivated");
                    self.broker
                        .notify_group(WriterGroupEvent::Deactivated(updated.clone()))
                        .await;
                    self.broker
                        .notify_group(WriterGroupEvent::StateChanged {
                            id: id.clone(),
                            status: updated.status.clone(),
                        })
                        .await;
                    return Ok(updated);
                }
                Err(e) if e.is_out_of_date() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RegistryError::out_of_date("writer group", id))
    }

    // =========================================================================
    // Shared Lookups
    // =========================================================================

    pub(crate) async fn require_group(&self, id: &WriterGroupId) -> RegistryResult<WriterGroup> {
        self.groups
            .find(id)
            .await?
            .ok_or_else(|| RegistryError::not_found("writer group", id))
    }

    pub(crate) async fn require_writer(
        &self,
        id: &DataSetWriterId,
    ) -> RegistryResult<DataSetWriter> {
        self.writers
            .find(id)
            .await?
            .ok_or_else(|| RegistryError::not_found("dataset writer", id))
    }
}

impl std::fmt::Debug for WriterGroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterGroupRegistry").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry_with;
    use pulse_core::endpoint::Endpoint;

    #[tokio::test]
    async fn test_add_and_get_group() {
        let registry = registry_with(vec![]);
        let group = registry
            .add_writer_group(WriterGroupRequest {
                name: Some("TestGroup".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(group.status.state, WriterGroupState::Disabled);
        let fetched = registry.get_writer_group(&group.id).await.unwrap();
        assert_eq!(fetched.name.as_deref(), Some("TestGroup"));

        let err = registry
            .get_writer_group(&WriterGroupId::new("missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_requires_matching_generation() {
        let registry = registry_with(vec![]);
        let group = registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();

        let err = registry
            .update_writer_group(
                &group.id,
                WriterGroupPatch {
                    name: Some("x".to_string()),
                    ..Default::default()
                },
                &GenerationId::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_out_of_date());

        // Stored record unchanged after the failed update.
        let current = registry.get_writer_group(&group.id).await.unwrap();
        assert!(current.name.is_none());
        assert_eq!(current.generation, group.generation);
    }

    #[tokio::test]
    async fn test_no_op_patch_keeps_generation() {
        let registry = registry_with(vec![]);
        let group = registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();

        let after = registry
            .update_writer_group(&group.id, WriterGroupPatch::default(), &group.generation)
            .await
            .unwrap();
        assert_eq!(after.generation, group.generation);
    }

    #[tokio::test]
    async fn test_activation_state_machine() {
        let registry = registry_with(vec![]);
        let group = registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();
        assert_eq!(group.status.state, WriterGroupState::Disabled);

        // Disabled -> Pending, never straight to Publishing.
        let active = registry.activate_writer_group(&group.id).await.unwrap();
        assert_eq!(active.status.state, WriterGroupState::Pending);

        // Repeated activate is a no-op: state and stamp unchanged.
        let again = registry.activate_writer_group(&group.id).await.unwrap();
        assert_eq!(again.status, active.status);
        assert_eq!(again.generation, active.generation);

        let disabled = registry.deactivate_writer_group(&group.id).await.unwrap();
        assert_eq!(disabled.status.state, WriterGroupState::Disabled);

        let still = registry.deactivate_writer_group(&group.id).await.unwrap();
        assert_eq!(still.generation, disabled.generation);
    }

    #[tokio::test]
    async fn test_remove_group_guard() {
        use pulse_core::model::DataSetWriterRequest;
        use pulse_core::types::EndpointId;

        let registry = registry_with(vec![Endpoint::insecure("endpoint1", "opc.tcp://one")]);
        let group = registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();

        let mut request = DataSetWriterRequest::for_endpoint(EndpointId::new("endpoint1"));
        request.writer_group_id = Some(group.id.clone());
        let writer = registry.add_dataset_writer(request).await.unwrap();

        let err = registry
            .remove_writer_group(&group.id, &group.generation)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));

        registry
            .remove_dataset_writer(&writer.id, &writer.generation)
            .await
            .unwrap();
        registry
            .remove_writer_group(&group.id, &group.generation)
            .await
            .unwrap();
        assert!(registry.get_writer_group(&group.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_groups_by_state() {
        let registry = registry_with(vec![]);
        let a = registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();
        registry
            .add_writer_group(WriterGroupRequest::default())
            .await
            .unwrap();
        registry.activate_writer_group(&a.id).await.unwrap();

        let filter = WriterGroupFilter {
            state: Some(WriterGroupState::Pending),
            ..Default::default()
        };
        let page = registry.list_writer_groups(&filter, None, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, a.id);
    }
}
