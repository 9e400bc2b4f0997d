// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Assertion Helpers
//!
//! Helpers for asserting on the registry event stream and on the `ua-data`
//! wire format.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use pulse_core::broker::{DataSetWriterEvent, PublishedItemEvent, RegistryEvent, WriterGroupEvent};
use pulse_core::message::NetworkMessage;
use pulse_core::model::{PublishedItemState, SourceState};
use pulse_core::types::{DataSetWriterId, WriterGroupId, WriterGroupState};

/// Default timeout for event-stream waits.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls an async condition until it holds or the timeout elapses.
///
/// # Panics
///
/// Panics with the description when the timeout elapses.
pub async fn eventually<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}: {}", EVENT_TIMEOUT, description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Asserts the `ua-data` JSON wire shape of a network message.
pub fn assert_ua_data(message: &NetworkMessage) {
    let json = serde_json::to_value(message).expect("network message must serialize");
    assert_eq!(json["MessageType"], "ua-data");
    assert!(json["MessageId"].is_string());
    let datasets = json["Messages"].as_array().expect("Messages array");
    assert!(!datasets.is_empty());
    for dataset in datasets {
        assert_eq!(dataset["MetaDataVersion"]["MajorVersion"], 1);
        assert!(dataset["SequenceNumber"].is_u64());
    }
}

/// Drains the event tap until a source-state event for the writer arrives.
///
/// # Panics
///
/// Panics when the tap closes or the timeout elapses first.
pub async fn expect_source_state(
    tap: &mut broadcast::Receiver<RegistryEvent>,
    writer_id: &DataSetWriterId,
) -> SourceState {
    let wait = async {
        loop {
            match tap.recv().await {
                Ok(RegistryEvent::Writer(DataSetWriterEvent::SourceStateChanged {
                    writer_id: id,
                    state,
                })) if &id == writer_id => return state,
                Ok(_) => continue,
                Err(e) => panic!("event tap closed: {}", e),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| panic!("no source-state event for writer '{}'", writer_id))
}

/// Drains the event tap until a variable-state event for the writer arrives.
pub async fn expect_variable_state(
    tap: &mut broadcast::Receiver<RegistryEvent>,
    writer_id: &DataSetWriterId,
) -> PublishedItemState {
    let wait = async {
        loop {
            match tap.recv().await {
                Ok(RegistryEvent::Item(PublishedItemEvent::VariableStateChanged {
                    writer_id: id,
                    state,
                    ..
                })) if &id == writer_id => return state,
                Ok(_) => continue,
                Err(e) => panic!("event tap closed: {}", e),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| panic!("no variable-state event for writer '{}'", writer_id))
}

/// Drains the event tap until the group reports the given state.
pub async fn expect_group_state(
    tap: &mut broadcast::Receiver<RegistryEvent>,
    group_id: &WriterGroupId,
    state: WriterGroupState,
) {
    let wait = async {
        loop {
            match tap.recv().await {
                Ok(RegistryEvent::Group(WriterGroupEvent::StateChanged { id, status }))
                    if &id == group_id && status.state == state =>
                {
                    return;
                }
                Ok(_) => continue,
                Err(e) => panic!("event tap closed: {}", e),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| panic!("group '{}' never reported {}", group_id, state))
}
