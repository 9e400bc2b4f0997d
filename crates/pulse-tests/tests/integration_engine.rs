// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine integration tests: pipeline lifecycle, incremental writer
//! reconfiguration, settings propagation, and the outbound message path,
//! driven through registry mutations with the mock subscription stack.

use std::sync::Arc;

use pulse_core::model::{DataSetWriter, WriterGroup, WriterGroupPatch};
use pulse_core::types::{ConnectionState, WriterGroupState};
use pulse_engine::client::SubscriptionHandle;
use pulse_tests::prelude::*;

const SECOND_NODE: &str = "ns=2;s=Pump.Speed";

/// A group with one writer on `endpoint1` publishing CurrentTime, activated
/// so the harness engine has built its pipeline.
async fn connected_group(harness: &PulseHarness) -> (WriterGroup, DataSetWriter) {
    let group = harness
        .registry
        .add_writer_group(GroupBuilder::new().name("TestGroup").build())
        .await
        .unwrap();
    let writer = harness
        .registry
        .add_dataset_writer(
            WriterBuilder::for_endpoint("endpoint1")
                .group(&group.id)
                .build(),
        )
        .await
        .unwrap();
    harness
        .registry
        .add_dataset_variable(
            &writer.id,
            VariableBuilder::for_node(CURRENT_TIME_NODE)
                .display_name("CurrentTime")
                .build(),
        )
        .await
        .unwrap();

    let group = harness
        .registry
        .activate_writer_group(&group.id)
        .await
        .unwrap();
    (group, writer)
}

#[tokio::test]
async fn test_activation_builds_pipeline() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;

    assert!(harness.engine.is_connected(&group.id).await);
    assert_eq!(harness.client.create_count(), 1);

    let handle = harness.client.live_handle().expect("open subscription");
    let items = handle.applied_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].node_id.to_string(), CURRENT_TIME_NODE);
    assert_eq!(items[0].display_name.as_deref(), Some("CurrentTime"));
    assert!(handle.enabled());
}

#[tokio::test]
async fn test_not_enabled_subscription_is_not_activated() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    harness.client.create_disabled(true);
    let (group, _writer) = connected_group(&harness).await;

    // The stack enables such subscriptions from its keep-alive path;
    // activating here as well would race it.
    let handle = harness.client.live_handle().expect("open subscription");
    assert_eq!(handle.activate_count(), 0);
    assert!(!handle.enabled());

    // Items were applied and the pipeline is up regardless.
    assert_eq!(handle.applied_items().len(), 1);
    assert!(harness.engine.is_connected(&group.id).await);
}

#[tokio::test]
async fn test_deactivation_tears_down_sink_and_subscription() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;
    let handle = harness.client.live_handle().expect("open subscription");

    harness
        .registry
        .deactivate_writer_group(&group.id)
        .await
        .unwrap();

    assert!(!harness.engine.is_connected(&group.id).await);
    assert!(handle.is_closed());
    assert_eq!(handle.close_count(), 1);
    assert!(harness.sinks.sinks()[0].is_closed());
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, writer) = connected_group(&harness).await;
    let handle = harness.client.live_handle().expect("open subscription");

    harness
        .registry
        .deactivate_writer_group(&group.id)
        .await
        .unwrap();

    // Removing the writer and the group after deactivation walks the
    // teardown path again; the subscription must not be closed twice.
    harness
        .registry
        .remove_dataset_writer(&writer.id, &writer.generation)
        .await
        .unwrap();
    let group = harness.registry.get_writer_group(&group.id).await.unwrap();
    harness
        .registry
        .remove_writer_group(&group.id, &group.generation)
        .await
        .unwrap();

    assert_eq!(handle.close_count(), 1);
    assert!(!harness.engine.is_connected(&group.id).await);
}

#[tokio::test]
async fn test_sequence_numbers_are_strictly_monotonic() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;
    let handle = harness.client.live_handle().expect("open subscription");

    for i in 0..3 {
        handle
            .emit_value(CURRENT_TIME_NODE, serde_json::json!(format!("tick-{i}")))
            .await;
    }

    let messages = harness.sinks.messages();
    assert_eq!(messages.len(), 3);
    for (i, message) in messages.iter().enumerate() {
        assert_ua_data(message);
        assert_eq!(message.messages[0].sequence_number, i as u64 + 1);
    }

    // The first envelope moved the group to Publishing.
    let stored = harness.registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Publishing);
}

#[tokio::test]
async fn test_batch_size_update_reaches_live_sink() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;
    let handle = harness.client.live_handle().expect("open subscription");

    harness
        .registry
        .update_writer_group(
            &group.id,
            WriterGroupPatch {
                batch_size: Some(2),
                ..Default::default()
            },
            &group.generation,
        )
        .await
        .unwrap();

    handle
        .emit_value(CURRENT_TIME_NODE, serde_json::json!("first"))
        .await;
    // Buffered; nothing flushed yet.
    assert_eq!(harness.sinks.message_count(), 0);

    handle
        .emit_value(CURRENT_TIME_NODE, serde_json::json!("second"))
        .await;
    let messages = harness.sinks.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].messages.len(), 2);
}

#[tokio::test]
async fn test_writers_join_and_leave_live_pipeline() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;

    // A writer added to an active group connects without re-activation.
    let second = harness
        .registry
        .add_dataset_writer(
            WriterBuilder::for_endpoint("endpoint1")
                .id("pump-writer")
                .group(&group.id)
                .build(),
        )
        .await
        .unwrap();
    harness
        .registry
        .add_dataset_variable(&second.id, VariableBuilder::for_node(SECOND_NODE).build())
        .await
        .unwrap();

    let open: Vec<_> = harness
        .client
        .handles()
        .into_iter()
        .filter(|h| !h.is_closed())
        .collect();
    assert_eq!(open.len(), 2);
    assert!(open.iter().any(|h| h
        .applied_items()
        .iter()
        .any(|i| i.node_id.to_string() == SECOND_NODE)));

    // Removing it disposes only its subscription.
    let second = harness.registry.get_dataset_writer(&second.id).await.unwrap();
    harness
        .registry
        .remove_dataset_writer(&second.id, &second.generation)
        .await
        .unwrap();

    let open: Vec<_> = harness
        .client
        .handles()
        .into_iter()
        .filter(|h| !h.is_closed())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(
        open[0].applied_items()[0].node_id.to_string(),
        CURRENT_TIME_NODE
    );
    assert!(harness.engine.is_connected(&group.id).await);
}

#[tokio::test]
async fn test_variable_change_reconfigures_subscription() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (_group, writer) = connected_group(&harness).await;
    let first = harness.client.live_handle().expect("open subscription");

    // Adding a variable to a connected writer rebuilds its subscription
    // with the widened item set; the stale handle is closed.
    harness
        .registry
        .add_dataset_variable(&writer.id, VariableBuilder::for_node(SECOND_NODE).build())
        .await
        .unwrap();

    assert!(first.is_closed());
    let replacement = harness.client.live_handle().expect("replacement");
    assert_eq!(replacement.applied_items().len(), 2);
}

#[tokio::test]
async fn test_connection_failure_reported_as_source_state() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    harness.client.fail_connection(true);

    let mut tap = harness.events();
    let (group, writer) = connected_group(&harness).await;

    let state = expect_source_state(&mut tap, &writer.id).await;
    assert!(!state.is_healthy());
    assert_eq!(state.connection.state, ConnectionState::Failed);

    // The pipeline exists; the failed writer is just not part of it.
    assert!(harness.engine.is_connected(&group.id).await);
    assert_eq!(harness.sinks.message_count(), 0);
}

#[tokio::test]
async fn test_resync_reconnects_active_groups() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, _writer) = connected_group(&harness).await;
    let first = harness.client.live_handle().expect("open subscription");

    // A restart-shaped engine: same registry, fresh pipelines.
    let replacement = pulse_engine::WriterGroupEngine::new(
        Arc::clone(&harness.registry),
        harness.endpoints.clone(),
        harness.client.clone(),
        harness.sinks.clone(),
        TEST_PUBLISHER_ID,
    );
    replacement.resync().await;

    assert!(replacement.is_connected(&group.id).await);
    // The old engine's subscription is untouched; the new engine opened
    // its own.
    assert!(!first.is_closed());
    assert_eq!(harness.client.create_count(), 2);
}
