// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime state-update path.
//!
//! Data-plane faults never travel up the management call chain: the engine
//! reports connectivity, per-item, and per-subscription status here, where
//! it is persisted into entity state (items) or fanned out directly
//! (writer-level source state) and delivered through the event broker.
//!
//! Reports race with configuration writes, so item updates run a short CAS
//! retry loop that re-reads the record and reapplies only the state part.
//! Reports for entities that no longer exist are dropped silently; the
//! reporting pipeline may lag behind a delete.

use chrono::Utc;
use tracing::{debug, warn};

use pulse_core::broker::{PublishedItemEvent, WriterGroupEvent};
use pulse_core::error::RegistryResult;
use pulse_core::model::{PublishedItemState, SourceState};
use pulse_core::repository::VariableKey;
use pulse_core::types::{
    DataSetWriterId, StatusCode, VariableId, WriterGroupId, WriterGroupState, WriterGroupStatus,
};

use crate::registry::{WriterGroupRegistry, MAX_CAS_RETRIES};

/// Same report modulo the change timestamp; repeated identical reports must
/// not bump generations or re-emit events.
fn same_report(current: &PublishedItemState, report: &PublishedItemState) -> bool {
    current.client_handle == report.client_handle
        && current.server_id == report.server_id
        && current.last_result == report.last_result
        && current.error_message == report.error_message
}

impl WriterGroupRegistry {
    /// Records a monitored-item status report for a published variable.
    pub async fn report_variable_state(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
        state: PublishedItemState,
    ) -> RegistryResult<()> {
        let key = VariableKey::new(writer_id.clone(), variable_id.clone());
        for _ in 0..MAX_CAS_RETRIES {
            let Some(mut variable) = self.variables.find(&key).await? else {
                debug!(variable = %key, "Dropping state report for removed variable");
                return Ok(());
            };
            if same_report(&variable.state, &state) {
                return Ok(());
            }
            let generation = variable.generation.clone();
            variable.state = state.clone();
            variable.state.last_result_change = Some(Utc::now());
            match self.variables.update(variable, &generation).await {
                Ok(stored) => {
                    self.broker
                        .notify_item(PublishedItemEvent::VariableStateChanged {
                            writer_id: writer_id.clone(),
                            variable_id: variable_id.clone(),
                            state: stored.state,
                        })
                        .await;
                    return Ok(());
                }
                Err(e) if e.is_out_of_date() || e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(variable = %key, "Variable state report lost to contention");
        Ok(())
    }

    /// Records a monitored-item status report for an event dataset.
    pub async fn report_events_state(
        &self,
        writer_id: &DataSetWriterId,
        state: PublishedItemState,
    ) -> RegistryResult<()> {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(mut events) = self.events.find(writer_id).await? else {
                debug!(writer_id = %writer_id, "Dropping state report for removed event dataset");
                return Ok(());
            };
            if same_report(&events.state, &state) {
                return Ok(());
            }
            let generation = events.generation.clone();
            events.state = state.clone();
            events.state.last_result_change = Some(Utc::now());
            match self.events.update(events, &generation).await {
                Ok(stored) => {
                    self.broker
                        .notify_item(PublishedItemEvent::EventsStateChanged {
                            writer_id: writer_id.clone(),
                            state: stored.state,
                        })
                        .await;
                    return Ok(());
                }
                Err(e) if e.is_out_of_date() || e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(writer_id = %writer_id, "Event dataset state report lost to contention");
        Ok(())
    }

    /// Publishes a writer-level source state (connectivity, subscription
    /// result). Not persisted; delivered through the broker only.
    pub async fn report_source_state(&self, writer_id: &DataSetWriterId, state: SourceState) {
        match self.writers.find(writer_id).await {
            Ok(Some(_)) => {
                self.broker
                    .notify_writer(pulse_core::broker::DataSetWriterEvent::SourceStateChanged {
                        writer_id: writer_id.clone(),
                        state,
                    })
                    .await;
            }
            Ok(None) => {
                debug!(writer_id = %writer_id, "Dropping source state for removed writer");
            }
            Err(e) => {
                warn!(writer_id = %writer_id, error = %e, "Source state lookup failed");
            }
        }
    }

    /// Records a group state observed by the engine (`Pending` while the
    /// pipeline is idle, `Publishing` once the first message flows).
    ///
    /// Reports against a `Disabled` group are ignored: the engine's pipeline
    /// may still be winding down after a deactivate, and its late reports
    /// must not resurrect the group.
    pub async fn report_writer_group_state(
        &self,
        group_id: &WriterGroupId,
        state: WriterGroupState,
    ) -> RegistryResult<()> {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(group) = self.groups.find(group_id).await? else {
                debug!(group_id = %group_id, "Dropping state report for removed group");
                return Ok(());
            };
            if group.status.state == WriterGroupState::Disabled {
                debug!(group_id = %group_id, reported = %state, "Ignoring report for disabled group");
                return Ok(());
            }
            if group.status.state == state {
                return Ok(());
            }

            let mut next = group.clone();
            next.status = WriterGroupStatus::new(state);
            match self.groups.update(next, &group.generation).await {
                Ok(updated) => {
                    debug!(group_id = %group_id, state = %state, "Group state reported");
                    self.broker
                        .notify_group(WriterGroupEvent::StateChanged {
                            id: group_id.clone(),
                            status: updated.status,
                        })
                        .await;
                    return Ok(());
                }
                Err(e) if e.is_out_of_date() || e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(group_id = %group_id, "Group state report lost to contention");
        Ok(())
    }

    /// Convenience for the engine's item callbacks: builds the item state
    /// from a raw status report.
    pub fn item_state_from_report(
        client_handle: Option<u32>,
        server_id: Option<u32>,
        result: StatusCode,
    ) -> PublishedItemState {
        PublishedItemState {
            client_handle,
            server_id,
            last_result: Some(result),
            error_message: if result.is_bad() {
                Some(result.to_string())
            } else {
                None
            },
            last_result_change: Some(Utc::now()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
