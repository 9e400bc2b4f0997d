// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end publishing scenarios: a CurrentTime pipeline producing
//! `ua-data` messages, monitored-item faults surfacing as persisted item
//! state, and event datasets against both sink flavors.

use std::time::Duration;

use pulse_core::broker::{PublishedItemEvent, RegistryEvent};
use pulse_core::model::{DataSetWriter, PublishedDataSetVariable, WriterGroup};
use pulse_core::types::{StatusCode, WriterGroupState};
use pulse_tests::prelude::*;

/// A group with one writer publishing the given node, not yet activated.
async fn variable_pipeline(
    harness: &PulseHarness,
    node_id: &str,
) -> (WriterGroup, DataSetWriter, PublishedDataSetVariable) {
    let group = harness
        .registry
        .add_writer_group(
            GroupBuilder::new()
                .name("TestGroup")
                .publishing_interval(Duration::from_secs(1))
                .build(),
        )
        .await
        .unwrap();
    let writer = harness
        .registry
        .add_dataset_writer(
            WriterBuilder::for_endpoint("endpoint1")
                .group(&group.id)
                .publishing_interval(Duration::from_secs(1))
                .build(),
        )
        .await
        .unwrap();
    let variable = harness
        .registry
        .add_dataset_variable(
            &writer.id,
            VariableBuilder::for_node(node_id)
                .display_name("CurrentTime")
                .build(),
        )
        .await
        .unwrap();
    (group, writer, variable)
}

#[tokio::test]
async fn test_current_time_pipeline_publishes_ua_data() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    let (group, writer, variable) = variable_pipeline(&harness, CURRENT_TIME_NODE).await;

    let mut tap = harness.events();
    harness
        .registry
        .activate_writer_group(&group.id)
        .await
        .unwrap();

    // Item apply result lands before activation completes, then the
    // session reports connected.
    let item_state = expect_variable_state(&mut tap, &writer.id).await;
    assert!(item_state.server_id.is_some());
    assert_eq!(item_state.last_result, Some(StatusCode::GOOD));
    assert!(!item_state.has_error());

    let source_state = expect_source_state(&mut tap, &writer.id).await;
    assert!(source_state.is_healthy());

    // The persisted variable carries the same runtime state.
    let stored = harness
        .registry
        .get_dataset_variable(&writer.id, &variable.id)
        .await
        .unwrap();
    assert_eq!(stored.state.server_id, item_state.server_id);

    // A sampled value flows out as one ua-data network message.
    let handle = harness.client.live_handle().expect("open subscription");
    handle
        .emit_value(CURRENT_TIME_NODE, serde_json::json!("2026-08-25T12:00:00Z"))
        .await;

    let messages = harness.sinks.messages();
    assert_eq!(messages.len(), 1);
    assert_ua_data(&messages[0]);
    assert_eq!(messages[0].publisher_id, TEST_PUBLISHER_ID);

    let json = serde_json::to_value(&messages[0]).unwrap();
    assert!(json["Messages"][0]["Payload"]["CurrentTime"]["Value"].is_string());

    expect_group_state(&mut tap, &group.id, WriterGroupState::Publishing).await;
    let stored = harness.registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Publishing);
}

#[tokio::test]
async fn test_unknown_node_persists_bad_item_state() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);
    harness.client.mark_bad_node(UNKNOWN_NODE);
    let (group, writer, variable) = variable_pipeline(&harness, UNKNOWN_NODE).await;

    let mut tap = harness.events();
    harness
        .registry
        .activate_writer_group(&group.id)
        .await
        .unwrap();

    let item_state = expect_variable_state(&mut tap, &writer.id).await;
    assert!(item_state.server_id.is_none());
    assert_eq!(item_state.last_result, Some(StatusCode::BAD_NODE_ID_UNKNOWN));
    assert!(item_state
        .error_message
        .as_deref()
        .unwrap()
        .contains("BadNodeIdUnknown"));

    // The subscription itself is fine; only the item is broken.
    let source_state = expect_source_state(&mut tap, &writer.id).await;
    assert!(source_state.is_healthy());

    let stored = harness
        .registry
        .get_dataset_variable(&writer.id, &variable.id)
        .await
        .unwrap();
    assert!(stored.state.has_error());
    assert_eq!(harness.sinks.message_count(), 0);
}

#[tokio::test]
async fn test_event_fields_reach_the_wire() {
    let harness = PulseHarness::new(vec![EndpointFixtures::plant_one()]);

    let group = harness
        .registry
        .add_writer_group(GroupBuilder::new().name("Alarms").build())
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
        .add_event_dataset(
            &writer.id,
            EventsBuilder::for_notifier(SERVER_NODE)
                .field("Message", &["Message"])
                .field("Severity", &["Severity"])
                .build(),
        )
        .await
        .unwrap();
    harness
        .registry
        .activate_writer_group(&group.id)
        .await
        .unwrap();

    let handle = harness.client.live_handle().expect("open subscription");
    handle
        .emit_event(vec![
            ("Message", serde_json::json!("coolant overheat")),
            ("Severity", serde_json::json!(800)),
        ])
        .await;

    let messages = harness.sinks.messages();
    assert_eq!(messages.len(), 1);
    assert_ua_data(&messages[0]);

    let json = serde_json::to_value(&messages[0]).unwrap();
    assert_eq!(
        json["Messages"][0]["Payload"]["Message"],
        "coolant overheat"
    );
    assert_eq!(json["Messages"][0]["Payload"]["Severity"], 800);
}

#[tokio::test]
async fn test_data_only_sink_rejects_event_payloads() {
    let harness = PulseHarness::data_only(vec![EndpointFixtures::plant_one()]);

    let group = harness
        .registry
        .add_writer_group(GroupBuilder::new().name("Alarms").build())
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
        .add_event_dataset(
            &writer.id,
            EventsBuilder::for_notifier(SERVER_NODE)
                .field("Message", &["Message"])
                .build(),
        )
        .await
        .unwrap();
    harness
        .registry
        .activate_writer_group(&group.id)
        .await
        .unwrap();

    let mut tap = harness.events();
    let handle = harness.client.live_handle().expect("open subscription");
    handle
        .emit_event(vec![("Message", serde_json::json!("dropped"))])
        .await;

    // The rejection is recorded on the event dataset's item state.
    loop {
        match tap.recv().await.unwrap() {
            RegistryEvent::Item(PublishedItemEvent::EventsStateChanged { writer_id, state })
                if writer_id == writer.id =>
            {
                assert_eq!(state.last_result, Some(StatusCode::BAD_NOT_SUPPORTED));
                break;
            }
            _ => continue,
        }
    }

    // Nothing reached the wire and the group never started publishing.
    assert_eq!(harness.sinks.message_count(), 0);
    let stored = harness.registry.get_writer_group(&group.id).await.unwrap();
    assert_eq!(stored.status.state, WriterGroupState::Pending);
}
