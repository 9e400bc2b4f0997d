// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry integration tests: optimistic concurrency, sentinel-clears
//! patching, lifecycle state, and the batch variable paths, exercised
//! through the public API and observed on the event tap.

use pulse_core::broker::{RegistryEvent, WriterGroupEvent};
use pulse_core::model::{DataSetWriterPatch, PublishedVariableFilter, WriterGroupPatch};
use pulse_core::types::{EndpointId, GenerationId, WriterGroupState};
use pulse_tests::prelude::*;

#[tokio::test]
async fn test_stale_generation_is_rejected_and_record_unchanged() {
    let (registry, _broker) = registry_only(vec![EndpointFixtures::global()]);

    let group = registry
        .add_writer_group(GroupBuilder::new().name("Line 4").build())
        .await
        .unwrap();

    // A generation that never belonged to the record.
    let err = registry
        .update_writer_group(
            &group.id,
            WriterGroupPatch {
                name: Some("clobbered".to_string()),
                ..Default::default()
            },
            &GenerationId::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_out_of_date());

    let stored = registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.name.as_deref(), Some("Line 4"));
    assert_eq!(stored.generation, group.generation);

    // The stale generation stays stale; the current one works.
    let updated = registry
        .update_writer_group(
            &group.id,
            WriterGroupPatch {
                name: Some("Line 5".to_string()),
                ..Default::default()
            },
            &group.generation,
        )
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Line 5"));
    assert_ne!(updated.generation, group.generation);

    let err = registry
        .update_writer_group(
            &group.id,
            WriterGroupPatch {
                name: Some("too late".to_string()),
                ..Default::default()
            },
            &group.generation,
        )
        .await
        .unwrap_err();
    assert!(err.is_out_of_date());
}

#[tokio::test]
async fn test_sentinel_values_clear_group_fields() {
    let (registry, _broker) = registry_only(vec![]);

    let group = registry
        .add_writer_group(GroupBuilder::new().name("Line 4").batch_size(25).build())
        .await
        .unwrap();
    assert_eq!(group.batch_size, Some(25));

    // Empty string and zero are the clear sentinels.
    let cleared = registry
        .update_writer_group(
            &group.id,
            WriterGroupPatch {
                name: Some(String::new()),
                batch_size: Some(0),
                ..Default::default()
            },
            &group.generation,
        )
        .await
        .unwrap();
    assert!(cleared.name.is_none());
    assert!(cleared.batch_size.is_none());

    // Clearing what is already unset is not a change: no generation bump.
    let again = registry
        .update_writer_group(
            &cleared.id,
            WriterGroupPatch {
                name: Some(String::new()),
                batch_size: Some(0),
                ..Default::default()
            },
            &cleared.generation,
        )
        .await
        .unwrap();
    assert_eq!(again.generation, cleared.generation);
}

#[tokio::test]
async fn test_writer_update_requires_current_generation() {
    let (registry, _broker) = registry_only(vec![EndpointFixtures::global()]);

    let writer = registry
        .add_dataset_writer(WriterBuilder::for_endpoint("endpoint1").build())
        .await
        .unwrap();

    let err = registry
        .update_dataset_writer(
            &writer.id,
            DataSetWriterPatch {
                dataset_name: Some("telemetry".to_string()),
                ..Default::default()
            },
            &GenerationId::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_out_of_date());

    let stored = registry.get_dataset_writer(&writer.id).await.unwrap();
    assert!(stored.dataset.name.is_none());
    assert_eq!(stored.generation, writer.generation);
}

#[tokio::test]
async fn test_group_removal_blocked_while_writers_remain() {
    let (registry, broker) = registry_only(vec![EndpointFixtures::global()]);

    let group = registry
        .add_writer_group(GroupBuilder::new().name("guarded").build())
        .await
        .unwrap();
    let writer = registry
        .add_dataset_writer(
            WriterBuilder::for_endpoint("endpoint1")
                .group(&group.id)
                .build(),
        )
        .await
        .unwrap();

    let err = registry
        .remove_writer_group(&group.id, &group.generation)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        pulse_core::error::RegistryError::InvalidState { .. }
    ));
    assert!(registry.get_writer_group(&group.id).await.is_ok());

    let mut tap = broker.subscribe();
    registry
        .remove_dataset_writer(&writer.id, &writer.generation)
        .await
        .unwrap();
    registry
        .remove_writer_group(&group.id, &group.generation)
        .await
        .unwrap();
    assert!(registry.get_writer_group(&group.id).await.is_err());

    // The removal is announced on the tap.
    loop {
        match tap.recv().await.unwrap() {
            RegistryEvent::Group(WriterGroupEvent::Removed { id }) if id == group.id => break,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_state_machine_ignores_reports_while_disabled() {
    let (registry, _broker) = registry_only(vec![]);

    let group = registry
        .add_writer_group(GroupBuilder::new().build())
        .await
        .unwrap();
    assert_eq!(group.status.state, WriterGroupState::Disabled);

    // Engine reports against a disabled group must not resurrect it.
    registry
        .report_writer_group_state(&group.id, WriterGroupState::Publishing)
        .await
        .unwrap();
    let stored = registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Disabled);

    // Disabled -> Pending on activate; the first message then reports
    // Publishing; deactivate returns to Disabled from any active state.
    let active = registry.activate_writer_group(&group.id).await.unwrap();
    assert_eq!(active.status.state, WriterGroupState::Pending);

    let repeat = registry.activate_writer_group(&group.id).await.unwrap();
    assert_eq!(repeat.generation, active.generation);

    registry
        .report_writer_group_state(&group.id, WriterGroupState::Publishing)
        .await
        .unwrap();
    let stored = registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Publishing);

    let disabled = registry.deactivate_writer_group(&group.id).await.unwrap();
    assert_eq!(disabled.status.state, WriterGroupState::Disabled);

    registry
        .report_writer_group_state(&group.id, WriterGroupState::Publishing)
        .await
        .unwrap();
    let stored = registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Disabled);
}

#[tokio::test]
async fn test_default_writer_upserts_repeated_nodes() {
    let (registry, _broker) = registry_only(vec![EndpointFixtures::global()]);
    let endpoint = EndpointId::new("endpoint1");

    let (writer_id, first) = registry
        .add_variables_to_default_writer(
            &endpoint,
            vec![VariableBuilder::for_node(CURRENT_TIME_NODE).build()],
        )
        .await
        .unwrap();
    assert_eq!(writer_id.as_str(), "endpoint1");
    assert!(first[0].is_ok());

    // Same node again, now with a display name: update-in-place.
    let (second_id, second) = registry
        .add_variables_to_default_writer(
            &endpoint,
            vec![VariableBuilder::for_node(CURRENT_TIME_NODE)
                .display_name("CurrentTime")
                .build()],
        )
        .await
        .unwrap();
    assert_eq!(second_id, writer_id);
    assert!(second[0].is_ok());

    let filter = PublishedVariableFilter {
        writer_id: Some(writer_id.clone()),
        ..Default::default()
    };
    let page = registry
        .list_dataset_variables(&filter, None, None)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].display_name.as_deref(), Some("CurrentTime"));

    // The lazily created default group is active without an explicit
    // activate call.
    let writer = registry.get_dataset_writer(&writer_id).await.unwrap();
    let group = registry
        .get_writer_group(&writer.writer_group_id)
        .await
        .unwrap();
    assert_eq!(group.name.as_deref(), Some("default"));
    assert_eq!(group.status.state, WriterGroupState::Pending);
}

#[tokio::test]
async fn test_bulk_add_and_remove_round_trip() {
    let (registry, _broker) = registry_only(vec![EndpointFixtures::global()]);

    let writer = registry
        .add_dataset_writer(WriterBuilder::for_endpoint("endpoint1").build())
        .await
        .unwrap();

    let nodes: Vec<_> = (0..25)
        .map(|i| node(&format!("ns=2;i={}", 1000 + i)))
        .collect();
    let requests = nodes
        .iter()
        .map(|n| VariableBuilder::for_node(&n.to_string()).build())
        .collect();
    let added = registry
        .add_dataset_variables(&writer.id, requests)
        .await
        .unwrap();
    assert_eq!(added.len(), 25);
    assert!(added.iter().all(|r| r.is_ok()));

    // Remove every node plus one that was never published: per-slot
    // results, the stranger gets NotFound, everything else is gone.
    let mut to_remove = nodes.clone();
    to_remove.push(node("ns=2;i=9999"));
    let removed = registry
        .remove_variables_by_node(&writer.id, to_remove)
        .await
        .unwrap();
    assert_eq!(removed.len(), 26);
    assert!(removed[..25].iter().all(|r| r.is_ok()));
    assert!(removed[25].as_ref().unwrap_err().is_not_found());

    let filter = PublishedVariableFilter {
        writer_id: Some(writer.id.clone()),
        ..Default::default()
    };
    let page = registry
        .list_dataset_variables(&filter, None, None)
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_runtime_state_survives_variable_upsert() {
    let (registry, _broker) = registry_only(vec![EndpointFixtures::global()]);

    let writer = registry
        .add_dataset_writer(WriterBuilder::for_endpoint("endpoint1").build())
        .await
        .unwrap();
    let variable = registry
        .add_dataset_variable(
            &writer.id,
            VariableBuilder::for_node(CURRENT_TIME_NODE).build(),
        )
        .await
        .unwrap();

    registry
        .report_variable_state(
            &writer.id,
            &variable.id,
            pulse_registry::WriterGroupRegistry::item_state_from_report(
                Some(1),
                Some(42),
                pulse_core::types::StatusCode::GOOD,
            ),
        )
        .await
        .unwrap();

    // Re-adding the same node replaces the configuration but keeps the
    // reported runtime state.
    registry
        .add_dataset_variable(
            &writer.id,
            VariableBuilder::for_node(CURRENT_TIME_NODE)
                .display_name("CurrentTime")
                .build(),
        )
        .await
        .unwrap();

    let stored = registry
        .get_dataset_variable(&writer.id, &variable.id)
        .await
        .unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("CurrentTime"));
    assert_eq!(stored.state.server_id, Some(42));
}
