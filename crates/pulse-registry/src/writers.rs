// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Dataset writer and published item operations.
//!
//! Covers writer CRUD (with lazy default-group creation), the per-writer
//! dataset CRUD for variables and the single event definition, and the batch
//! paths: bulk variable add with saga-style compensation, default-writer
//! upsert, and bulk remove by node id.
//!
//! A dataset writer publishes either variables or one event definition,
//! never both; both add paths enforce the exclusivity.

use tracing::{debug, info, warn};

use pulse_core::broker::{DataSetWriterEvent, PublishedItemEvent};
use pulse_core::error::{RegistryError, RegistryResult};
use pulse_core::model::{
    DataSetWriter, DataSetWriterFilter, DataSetWriterPatch, DataSetWriterRequest,
    PublishedDataSetEvents, PublishedDataSetVariable, PublishedEventsPatch, PublishedEventsRequest,
    PublishedVariableFilter, PublishedVariablePatch, PublishedVariableRequest, WriterGroup,
    WriterGroupRequest,
};
use pulse_core::repository::{query_all, ContinuationToken, Entity, Page, VariableKey};
use pulse_core::types::{
    DataSetWriterId, EndpointId, GenerationId, NodeId, SiteId, VariableId,
};

use crate::registry::{WriterGroupRegistry, DEFAULT_GROUP_NAME, MAX_CAS_RETRIES};

/// Upper bound on items per batch call.
pub const MAX_BATCH_SIZE: usize = 1000;

impl WriterGroupRegistry {
    // =========================================================================
    // Dataset Writer Operations
    // =========================================================================

    /// Adds a dataset writer.
    ///
    /// The endpoint must resolve. When a group id is supplied the group must
    /// exist and, if site-scoped, match the endpoint's site; when absent, a
    /// default group for the endpoint's site is created (and activated) or
    /// reused.
    pub async fn add_dataset_writer(
        &self,
        request: DataSetWriterRequest,
    ) -> RegistryResult<DataSetWriter> {
        let endpoint = self.endpoints.get_endpoint(&request.endpoint_id).await?;

        let group = match &request.writer_group_id {
            Some(group_id) => {
                let group = self.require_group(group_id).await?;
                if let Some(site) = &group.site_id {
                    if endpoint.site_id.as_ref() != Some(site) {
                        return Err(RegistryError::invalid_argument(format!(
                            "endpoint '{}' does not belong to site '{}' of group '{}'",
                            endpoint.id, site, group_id
                        )));
                    }
                }
                group
            }
            None => self.ensure_default_group(endpoint.site_id.clone()).await?,
        };

        let id = request
            .id
            .clone()
            .unwrap_or_else(DataSetWriterId::generate);
        let writer = DataSetWriter::from_request(id, group.id.clone(), request);
        let stored = self.writers.add(writer).await?;

        info!(writer_id = %stored.id, group_id = %stored.writer_group_id, "Dataset writer added");
        self.broker
            .notify_writer(DataSetWriterEvent::Added(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Looks up a dataset writer.
    pub async fn get_dataset_writer(&self, id: &DataSetWriterId) -> RegistryResult<DataSetWriter> {
        self.require_writer(id).await
    }

    /// Returns one page of dataset writers matching the filter.
    pub async fn list_dataset_writers(
        &self,
        filter: &DataSetWriterFilter,
        continuation: Option<&ContinuationToken>,
        page_size: Option<usize>,
    ) -> RegistryResult<Page<DataSetWriter>> {
        self.writers.query(filter, continuation, page_size).await
    }

    /// Applies a generation-checked patch to a dataset writer.
    pub async fn update_dataset_writer(
        &self,
        id: &DataSetWriterId,
        request: DataSetWriterPatch,
        generation: &GenerationId,
    ) -> RegistryResult<DataSetWriter> {
        let mut writer = self.require_writer(id).await?;
        if &writer.generation != generation {
            return Err(RegistryError::out_of_date("dataset writer", id));
        }

        // Moving a writer re-runs the site check against its endpoint.
        if let Some(group_id) = &request.writer_group_id {
            if group_id != &writer.writer_group_id {
                let group = self.require_group(group_id).await?;
                if let Some(site) = &group.site_id {
                    let endpoint = self.endpoints.get_endpoint(&writer.endpoint_id).await?;
                    if endpoint.site_id.as_ref() != Some(site) {
                        return Err(RegistryError::invalid_argument(format!(
                            "endpoint '{}' does not belong to site '{}' of group '{}'",
                            endpoint.id, site, group_id
                        )));
                    }
                }
            }
        }

        if !crate::patch::apply_writer_patch(&mut writer, request) {
            debug!(writer_id = %id, "Dataset writer patch had no effect");
            return Ok(writer);
        }

        let updated = self.writers.update(writer, generation).await?;
        info!(writer_id = %id, "Dataset writer updated");
        self.broker
            .notify_writer(DataSetWriterEvent::Updated(updated.clone()))
            .await;
        Ok(updated)
    }

    /// Removes a dataset writer and its published items.
    ///
    /// The generation is checked up front; item removal that follows is not
    /// transactional with the writer delete.
    pub async fn remove_dataset_writer(
        &self,
        id: &DataSetWriterId,
        generation: &GenerationId,
    ) -> RegistryResult<()> {
        let writer = self.require_writer(id).await?;
        if &writer.generation != generation {
            return Err(RegistryError::out_of_date("dataset writer", id));
        }

        let filter = PublishedVariableFilter {
            writer_id: Some(id.clone()),
            ..Default::default()
        };
        for variable in query_all(self.variables.as_ref(), &filter, &self.cancel).await? {
            let key = VariableKey::new(id.clone(), variable.id.clone());
            if self
                .variables
                .delete(&key, &variable.generation)
                .await
                .is_ok()
            {
                self.broker
                    .notify_item(PublishedItemEvent::VariableRemoved {
                        writer_id: id.clone(),
                        variable_id: variable.id,
                    })
                    .await;
            }
        }

        if let Some(events) = self.events.find(id).await? {
            if self.events.delete(id, &events.generation).await.is_ok() {
                self.broker
                    .notify_item(PublishedItemEvent::EventsRemoved {
                        writer_id: id.clone(),
                    })
                    .await;
            }
        }

        self.writers.delete(id, generation).await?;
        info!(writer_id = %id, group_id = %writer.writer_group_id, "Dataset writer removed");
        self.broker
            .notify_writer(DataSetWriterEvent::Removed {
                id: id.clone(),
                writer_group_id: writer.writer_group_id,
            })
            .await;
        Ok(())
    }

    // =========================================================================
    // Published Variable Operations
    // =========================================================================

    /// Adds (or upserts) one published variable on a writer.
    ///
    /// Ids derived from the node id make repeated adds of the same node an
    /// update-in-place; runtime state survives the upsert.
    pub async fn add_dataset_variable(
        &self,
        writer_id: &DataSetWriterId,
        request: PublishedVariableRequest,
    ) -> RegistryResult<PublishedDataSetVariable> {
        self.require_writer(writer_id).await?;
        if self.events.find(writer_id).await?.is_some() {
            return Err(RegistryError::invalid_state(format!(
                "dataset writer '{}' publishes an event dataset; variables are not allowed",
                writer_id
            )));
        }
        let variable = self.upsert_variable(writer_id, request).await?;
        self.notify_writer_touched(writer_id).await;
        Ok(variable)
    }

    /// Looks up one published variable.
    pub async fn get_dataset_variable(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
    ) -> RegistryResult<PublishedDataSetVariable> {
        let key = VariableKey::new(writer_id.clone(), variable_id.clone());
        self.variables
            .find(&key)
            .await?
            .ok_or_else(|| RegistryError::not_found("dataset variable", &key))
    }

    /// Returns one page of published variables matching the filter.
    pub async fn list_dataset_variables(
        &self,
        filter: &PublishedVariableFilter,
        continuation: Option<&ContinuationToken>,
        page_size: Option<usize>,
    ) -> RegistryResult<Page<PublishedDataSetVariable>> {
        self.variables.query(filter, continuation, page_size).await
    }

    /// Applies a generation-checked patch to a published variable.
    pub async fn update_dataset_variable(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
        request: PublishedVariablePatch,
        generation: &GenerationId,
    ) -> RegistryResult<PublishedDataSetVariable> {
        let mut variable = self.get_dataset_variable(writer_id, variable_id).await?;
        if &variable.generation != generation {
            return Err(RegistryError::out_of_date(
                "dataset variable",
                VariableKey::new(writer_id.clone(), variable_id.clone()),
            ));
        }

        if !crate::patch::apply_variable_patch(&mut variable, request) {
            return Ok(variable);
        }

        let updated = self.variables.update(variable, generation).await?;
        self.broker
            .notify_item(PublishedItemEvent::VariableUpdated(updated.clone()))
            .await;
        self.notify_writer_touched(writer_id).await;
        Ok(updated)
    }

    /// Removes one published variable.
    pub async fn remove_dataset_variable(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
        generation: &GenerationId,
    ) -> RegistryResult<()> {
        let key = VariableKey::new(writer_id.clone(), variable_id.clone());
        self.variables.delete(&key, generation).await?;
        self.broker
            .notify_item(PublishedItemEvent::VariableRemoved {
                writer_id: writer_id.clone(),
                variable_id: variable_id.clone(),
            })
            .await;
        self.notify_writer_touched(writer_id).await;
        Ok(())
    }

    /// Adds a batch of variables to a writer (max 1000 per call).
    ///
    /// Items are added independently; a per-item failure is recorded in its
    /// result slot and the loop continues. If the writer itself disappears
    /// mid-batch, the items this call added are compensated (deleted,
    /// best-effort, no isolation from concurrent readers) and the call fails
    /// `BatchFailed`.
    pub async fn add_dataset_variables(
        &self,
        writer_id: &DataSetWriterId,
        requests: Vec<PublishedVariableRequest>,
    ) -> RegistryResult<Vec<RegistryResult<PublishedDataSetVariable>>> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(RegistryError::invalid_argument(format!(
                "batch of {} exceeds the maximum of {} items",
                requests.len(),
                MAX_BATCH_SIZE
            )));
        }
        self.require_writer(writer_id).await?;
        if self.events.find(writer_id).await?.is_some() {
            return Err(RegistryError::invalid_state(format!(
                "dataset writer '{}' publishes an event dataset; variables are not allowed",
                writer_id
            )));
        }

        let mut results: Vec<RegistryResult<PublishedDataSetVariable>> = Vec::new();
        for request in requests {
            match self.upsert_variable(writer_id, request).await {
                Ok(variable) => results.push(Ok(variable)),
                Err(RegistryError::NotFound { entity, id })
                    if entity == <DataSetWriter as Entity>::KIND =>
                {
                    let succeeded = results.iter().filter(|r| r.is_ok()).count();
                    warn!(writer_id = %writer_id, succeeded, "Batch add failed; compensating");
                    self.compensate_batch(writer_id, &results).await;
                    return Err(RegistryError::BatchFailed {
                        succeeded,
                        message: format!("{} '{}' disappeared during batch add", entity, id),
                    });
                }
                Err(e) => {
                    debug!(writer_id = %writer_id, error = %e, "Batch item failed");
                    results.push(Err(e));
                }
            }
        }

        self.notify_writer_touched(writer_id).await;
        Ok(results)
    }

    /// Adds a batch of variables to the endpoint's default writer, creating
    /// the writer (and its default group) on first use.
    ///
    /// The default writer id equals the endpoint id, and variable ids derive
    /// from node ids, so repeated calls upsert rather than duplicate.
    pub async fn add_variables_to_default_writer(
        &self,
        endpoint_id: &EndpointId,
        requests: Vec<PublishedVariableRequest>,
    ) -> RegistryResult<(DataSetWriterId, Vec<RegistryResult<PublishedDataSetVariable>>)> {
        let writer = self.ensure_default_writer(endpoint_id).await?;
        let results = self.add_dataset_variables(&writer.id, requests).await?;
        Ok((writer.id, results))
    }

    /// Removes variables from a writer by published node id (max 1000 per
    /// call). Node-id matching is exact and case-sensitive.
    ///
    /// Each input gets its own result slot: the removed variable's id, or
    /// `NotFound` when no variable publishes that node.
    pub async fn remove_variables_by_node(
        &self,
        writer_id: &DataSetWriterId,
        node_ids: Vec<NodeId>,
    ) -> RegistryResult<Vec<RegistryResult<VariableId>>> {
        if node_ids.len() > MAX_BATCH_SIZE {
            return Err(RegistryError::invalid_argument(format!(
                "batch of {} exceeds the maximum of {} items",
                node_ids.len(),
                MAX_BATCH_SIZE
            )));
        }
        self.require_writer(writer_id).await?;

        let filter = PublishedVariableFilter {
            writer_id: Some(writer_id.clone()),
            ..Default::default()
        };
        let stored = query_all(self.variables.as_ref(), &filter, &self.cancel).await?;

        let mut results: Vec<RegistryResult<VariableId>> = Vec::new();
        let mut removed_any = false;
        for node_id in node_ids {
            let found = stored.iter().find(|v| v.node_id == node_id);
            match found {
                None => results.push(Err(RegistryError::not_found("dataset variable", &node_id))),
                Some(variable) => {
                    let key = VariableKey::new(writer_id.clone(), variable.id.clone());
                    match self.variables.delete(&key, &variable.generation).await {
                        Ok(_) => {
                            removed_any = true;
                            self.broker
                                .notify_item(PublishedItemEvent::VariableRemoved {
                                    writer_id: writer_id.clone(),
                                    variable_id: variable.id.clone(),
                                })
                                .await;
                            results.push(Ok(variable.id.clone()));
                        }
                        Err(e) => results.push(Err(e)),
                    }
                }
            }
        }

        if removed_any {
            self.notify_writer_touched(writer_id).await;
        }
        Ok(results)
    }

    // =========================================================================
    // Event Dataset Operations
    // =========================================================================

    /// Sets the event dataset a writer publishes.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the writer already publishes variables;
    /// `AlreadyExists` if an event dataset is already set (update it via
    /// patch instead).
    pub async fn add_event_dataset(
        &self,
        writer_id: &DataSetWriterId,
        request: PublishedEventsRequest,
    ) -> RegistryResult<PublishedDataSetEvents> {
        self.require_writer(writer_id).await?;
        let filter = PublishedVariableFilter {
            writer_id: Some(writer_id.clone()),
            ..Default::default()
        };
        let existing = self.variables.query(&filter, None, Some(1)).await?;
        if !existing.items.is_empty() {
            return Err(RegistryError::invalid_state(format!(
                "dataset writer '{}' publishes variables; an event dataset is not allowed",
                writer_id
            )));
        }

        let events = PublishedDataSetEvents::from_request(writer_id.clone(), request);
        let stored = self.events.add(events).await?;
        info!(writer_id = %writer_id, notifier = %stored.notifier, "Event dataset added");
        self.broker
            .notify_item(PublishedItemEvent::EventsAdded(stored.clone()))
            .await;
        self.notify_writer_touched(writer_id).await;
        Ok(stored)
    }

    /// Looks up a writer's event dataset.
    pub async fn get_event_dataset(
        &self,
        writer_id: &DataSetWriterId,
    ) -> RegistryResult<PublishedDataSetEvents> {
        self.events
            .find(writer_id)
            .await?
            .ok_or_else(|| RegistryError::not_found("event dataset", writer_id))
    }

    /// Applies a generation-checked patch to a writer's event dataset.
    pub async fn update_event_dataset(
        &self,
        writer_id: &DataSetWriterId,
        request: PublishedEventsPatch,
        generation: &GenerationId,
    ) -> RegistryResult<PublishedDataSetEvents> {
        let mut events = self.get_event_dataset(writer_id).await?;
        if &events.generation != generation {
            return Err(RegistryError::out_of_date("event dataset", writer_id));
        }

        if !crate::patch::apply_events_patch(&mut events, request) {
            return Ok(events);
        }

        let updated = self.events.update(events, generation).await?;
        self.broker
            .notify_item(PublishedItemEvent::EventsUpdated(updated.clone()))
            .await;
        self.notify_writer_touched(writer_id).await;
        Ok(updated)
    }

    /// Removes a writer's event dataset.
    pub async fn remove_event_dataset(
        &self,
        writer_id: &DataSetWriterId,
        generation: &GenerationId,
    ) -> RegistryResult<()> {
        self.events.delete(writer_id, generation).await?;
        self.broker
            .notify_item(PublishedItemEvent::EventsRemoved {
                writer_id: writer_id.clone(),
            })
            .await;
        self.notify_writer_touched(writer_id).await;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Finds or creates the default group for a site, activating it when
    /// freshly created. Auto-created groups must be active so that default
    /// writers publish without a separate activate call.
    pub(crate) async fn ensure_default_group(
        &self,
        site_id: Option<SiteId>,
    ) -> RegistryResult<WriterGroup> {
        let filter = pulse_core::model::WriterGroupFilter {
            name: Some(DEFAULT_GROUP_NAME.to_string()),
            ..Default::default()
        };
        let candidates = query_all(self.groups.as_ref(), &filter, &self.cancel).await?;
        if let Some(group) = candidates.into_iter().find(|g| g.site_id == site_id) {
            return Ok(group);
        }

        let created = self
            .insert_group_as(
                pulse_core::types::WriterGroupId::generate(),
                WriterGroupRequest {
                    name: Some(DEFAULT_GROUP_NAME.to_string()),
                    site_id: site_id.clone(),
                    ..Default::default()
                },
                pulse_core::broker::WriterGroupEvent::Updated,
            )
            .await?;
        info!(group_id = %created.id, site = ?site_id, "Default writer group created");
        self.activate_writer_group(&created.id).await
    }

    /// Finds or creates the default writer for an endpoint.
    pub(crate) async fn ensure_default_writer(
        &self,
        endpoint_id: &EndpointId,
    ) -> RegistryResult<DataSetWriter> {
        let writer_id = DataSetWriterId::from(endpoint_id);
        if let Some(writer) = self.writers.find(&writer_id).await? {
            return Ok(writer);
        }
        let mut request = DataSetWriterRequest::for_endpoint(endpoint_id.clone());
        request.id = Some(writer_id);
        self.add_dataset_writer(request).await
    }

    /// Inserts or updates one variable, preserving runtime state across the
    /// upsert. Emits the item-level event; the caller emits the writer event.
    async fn upsert_variable(
        &self,
        writer_id: &DataSetWriterId,
        request: PublishedVariableRequest,
    ) -> RegistryResult<PublishedDataSetVariable> {
        // Re-checked per item so a writer deleted mid-batch is caught.
        self.require_writer(writer_id).await?;

        let id = request
            .id
            .clone()
            .unwrap_or_else(|| VariableId::from_node_id(&request.node_id));
        let key = VariableKey::new(writer_id.clone(), id.clone());

        for _ in 0..MAX_CAS_RETRIES {
            match self.variables.find(&key).await? {
                None => {
                    let variable = PublishedDataSetVariable::from_request(
                        id.clone(),
                        writer_id.clone(),
                        request.clone(),
                    );
                    match self.variables.add(variable).await {
                        Ok(stored) => {
                            debug!(writer_id = %writer_id, variable_id = %id, node = %stored.node_id, "Variable added");
                            self.broker
                                .notify_item(PublishedItemEvent::VariableAdded(stored.clone()))
                                .await;
                            return Ok(stored);
                        }
                        // Lost the insert race; fall through to the update arm.
                        Err(e) if e.is_already_exists() => continue,
                        Err(e) => return Err(e),
                    }
                }
                Some(existing) => {
                    let mut replacement = PublishedDataSetVariable::from_request(
                        id.clone(),
                        writer_id.clone(),
                        request.clone(),
                    );
                    replacement.state = existing.state.clone();
                    match self.variables.update(replacement, &existing.generation).await {
                        Ok(stored) => {
                            debug!(writer_id = %writer_id, variable_id = %id, "Variable upserted");
                            self.broker
                                .notify_item(PublishedItemEvent::VariableUpdated(stored.clone()))
                                .await;
                            return Ok(stored);
                        }
                        Err(e) if e.is_out_of_date() || e.is_not_found() => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Err(RegistryError::out_of_date("dataset variable", &key))
    }

    /// Best-effort deletion of the variables a failed batch call added.
    async fn compensate_batch(
        &self,
        writer_id: &DataSetWriterId,
        results: &[RegistryResult<PublishedDataSetVariable>],
    ) {
        for variable in results.iter().flatten() {
            let key = VariableKey::new(writer_id.clone(), variable.id.clone());
            let current = match self.variables.find(&key).await {
                Ok(Some(v)) => v,
                _ => continue,
            };
            if let Err(e) = self.variables.delete(&key, &current.generation).await {
                warn!(variable = %key, error = %e, "Compensation delete failed");
            }
        }
    }

    /// Emits a writer `Updated` event after an item mutation so listeners
    /// reconfigure the writer's subscription. The writer record itself is
    /// not rewritten.
    async fn notify_writer_touched(&self, writer_id: &DataSetWriterId) {
        if let Ok(Some(writer)) = self.writers.find(writer_id).await {
            self.broker
                .notify_writer(DataSetWriterEvent::Updated(writer))
                .await;
        }
    }

}

// =============================================================================
// Tests
// =============================================================================
