// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sentinel-clears patch application.
//!
//! Every patchable field follows one convention: `None` leaves the stored
//! value unchanged, the type's zero/empty value clears it to unset, and any
//! other value sets it. The per-field mapping:
//!
//! | Field kind                   | Clear sentinel      |
//! |------------------------------|---------------------|
//! | strings                      | `""`                |
//! | counts, masks, priorities    | `0`                 |
//! | floating-point values        | `0.0`               |
//! | durations                    | zero duration       |
//! | lists and maps               | empty               |
//! | settings structs             | all-fields-empty    |
//! | JSON values                  | `null`              |
//! | id references (trigger)      | `""`                |
//! | enums and booleans           | set-only, no clear  |
//!
//! Each `apply_*_patch` function returns whether any field actually changed,
//! which callers use to skip the write and the update event.

use pulse_core::model::{
    DataSetWriter, DataSetWriterPatch, PublishedDataSetEvents, PublishedDataSetVariable,
    PublishedEventsPatch, PublishedVariablePatch, WriterGroup, WriterGroupPatch,
};
use pulse_core::types::VariableId;

// =============================================================================
// Field Helpers
// =============================================================================

/// Applies a patch value where the type's default is the clear sentinel.
fn apply_zero_clears<T: Default + PartialEq>(field: &mut Option<T>, patch: Option<T>) -> bool {
    let Some(value) = patch else {
        return false;
    };
    let next = if value == T::default() { None } else { Some(value) };
    if *field == next {
        return false;
    }
    *field = next;
    true
}

/// Applies a set-only patch value (enums, booleans): no clear sentinel.
fn apply_set<T: PartialEq>(field: &mut Option<T>, patch: Option<T>) -> bool {
    let Some(value) = patch else {
        return false;
    };
    if field.as_ref() == Some(&value) {
        return false;
    }
    *field = Some(value);
    true
}

/// Applies an id reference where the empty id clears.
fn apply_id_clears(field: &mut Option<VariableId>, patch: Option<VariableId>) -> bool {
    let Some(value) = patch else {
        return false;
    };
    let next = if value.as_str().is_empty() {
        None
    } else {
        Some(value)
    };
    if *field == next {
        return false;
    }
    *field = next;
    true
}

/// Applies a JSON value where `null` clears.
fn apply_json_clears(
    field: &mut Option<serde_json::Value>,
    patch: Option<serde_json::Value>,
) -> bool {
    let Some(value) = patch else {
        return false;
    };
    let next = if value.is_null() { None } else { Some(value) };
    if *field == next {
        return false;
    }
    *field = next;
    true
}

// =============================================================================
// Entity Patches
// =============================================================================

/// Applies a writer group patch in place.
pub fn apply_group_patch(group: &mut WriterGroup, patch: WriterGroupPatch) -> bool {
    let mut changed = false;
    changed |= apply_zero_clears(&mut group.name, patch.name);
    changed |= apply_set(&mut group.encoding, patch.encoding);
    changed |= apply_zero_clears(&mut group.batch_size, patch.batch_size);
    changed |= apply_zero_clears(&mut group.publishing_interval, patch.publishing_interval);
    changed |= apply_zero_clears(&mut group.keep_alive_time, patch.keep_alive_time);
    changed |= apply_zero_clears(&mut group.priority, patch.priority);
    changed |= apply_zero_clears(&mut group.message_settings, patch.message_settings);
    changed
}

/// Applies a dataset writer patch in place.
///
/// The `writer_group_id` field is validated and applied by the registry
/// before this is called; it is consumed here only for change detection.
pub fn apply_writer_patch(writer: &mut DataSetWriter, patch: DataSetWriterPatch) -> bool {
    let mut changed = false;
    if let Some(group_id) = patch.writer_group_id {
        if writer.writer_group_id != group_id {
            writer.writer_group_id = group_id;
            changed = true;
        }
    }
    changed |= apply_zero_clears(&mut writer.key_frame_count, patch.key_frame_count);
    changed |= apply_zero_clears(&mut writer.key_frame_interval, patch.key_frame_interval);
    changed |= apply_zero_clears(
        &mut writer.dataset_field_content_mask,
        patch.dataset_field_content_mask,
    );
    changed |= apply_zero_clears(&mut writer.message_settings, patch.message_settings);
    changed |= apply_zero_clears(&mut writer.dataset.name, patch.dataset_name);
    changed |= apply_zero_clears(&mut writer.dataset.extension_fields, patch.extension_fields);
    changed |= apply_zero_clears(
        &mut writer.dataset.subscription_settings,
        patch.subscription_settings,
    );
    changed
}

/// Applies a published variable patch in place. Runtime state is untouched.
pub fn apply_variable_patch(
    variable: &mut PublishedDataSetVariable,
    patch: PublishedVariablePatch,
) -> bool {
    let mut changed = false;
    changed |= apply_zero_clears(&mut variable.display_name, patch.display_name);
    changed |= apply_zero_clears(&mut variable.sampling_interval, patch.sampling_interval);
    changed |= apply_zero_clears(&mut variable.heartbeat_interval, patch.heartbeat_interval);
    changed |= apply_set(&mut variable.deadband_type, patch.deadband_type);
    changed |= apply_zero_clears(&mut variable.deadband_value, patch.deadband_value);
    changed |= apply_set(&mut variable.data_change_trigger, patch.data_change_trigger);
    changed |= apply_set(&mut variable.discard_new, patch.discard_new);
    changed |= apply_zero_clears(&mut variable.queue_size, patch.queue_size);
    changed |= apply_set(&mut variable.monitoring_mode, patch.monitoring_mode);
    changed |= apply_id_clears(&mut variable.trigger_id, patch.trigger_id);
    changed |= apply_json_clears(&mut variable.substitute_value, patch.substitute_value);
    changed
}

/// Applies an event dataset patch in place. Runtime state is untouched.
pub fn apply_events_patch(events: &mut PublishedDataSetEvents, patch: PublishedEventsPatch) -> bool {
    let mut changed = false;
    if let Some(fields) = patch.selected_fields {
        if events.selected_fields != fields {
            events.selected_fields = fields;
            changed = true;
        }
    }
    changed |= apply_json_clears(&mut events.filter, patch.filter);
    changed |= apply_set(&mut events.monitoring_mode, patch.monitoring_mode);
    changed |= apply_zero_clears(&mut events.queue_size, patch.queue_size);
    changed |= apply_set(&mut events.discard_new, patch.discard_new);
    changed
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::model::{WriterGroupMessageSettings, WriterGroupRequest};
    use pulse_core::types::{MessageEncoding, WriterGroupId};
    use std::time::Duration;

    fn group() -> WriterGroup {
        WriterGroup::from_request(WriterGroupId::new("g1"), WriterGroupRequest::default())
    }

    #[test]
    fn test_none_leaves_unchanged() {
        let mut g = group();
        g.name = Some("alpha".to_string());
        g.batch_size = Some(10);

        let changed = apply_group_patch(&mut g, WriterGroupPatch::default());
        assert!(!changed);
        assert_eq!(g.name.as_deref(), Some("alpha"));
        assert_eq!(g.batch_size, Some(10));
    }

    #[test]
    fn test_set_then_clear_round_trip() {
        let mut g = group();

        let changed = apply_group_patch(
            &mut g,
            WriterGroupPatch {
                name: Some("alpha".to_string()),
                batch_size: Some(50),
                publishing_interval: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );
        assert!(changed);
        assert_eq!(g.name.as_deref(), Some("alpha"));
        assert_eq!(g.batch_size, Some(50));
        assert_eq!(g.publishing_interval, Some(Duration::from_secs(1)));

        // Zero/empty sentinels clear each field back to unset.
        let changed = apply_group_patch(
            &mut g,
            WriterGroupPatch {
                name: Some(String::new()),
                batch_size: Some(0),
                publishing_interval: Some(Duration::ZERO),
                ..Default::default()
            },
        );
        assert!(changed);
        assert!(g.name.is_none());
        assert!(g.batch_size.is_none());
        assert!(g.publishing_interval.is_none());
    }

    #[test]
    fn test_clearing_an_unset_field_is_not_a_change() {
        let mut g = group();
        let changed = apply_group_patch(
            &mut g,
            WriterGroupPatch {
                batch_size: Some(0),
                ..Default::default()
            },
        );
        assert!(!changed);
    }

    #[test]
    fn test_enum_is_set_only() {
        let mut g = group();
        assert!(apply_group_patch(
            &mut g,
            WriterGroupPatch {
                encoding: Some(MessageEncoding::Uadp),
                ..Default::default()
            },
        ));
        assert_eq!(g.encoding, Some(MessageEncoding::Uadp));

        // Same value again: no change.
        assert!(!apply_group_patch(
            &mut g,
            WriterGroupPatch {
                encoding: Some(MessageEncoding::Uadp),
                ..Default::default()
            },
        ));
    }

    #[test]
    fn test_default_settings_struct_clears() {
        let mut g = group();
        g.message_settings = Some(WriterGroupMessageSettings {
            group_version: Some(3),
            ..Default::default()
        });

        let changed = apply_group_patch(
            &mut g,
            WriterGroupPatch {
                message_settings: Some(WriterGroupMessageSettings::default()),
                ..Default::default()
            },
        );
        assert!(changed);
        assert!(g.message_settings.is_none());
    }

    #[test]
    fn test_variable_trigger_and_substitute_sentinels() {
        use pulse_core::model::PublishedVariableRequest;
        use pulse_core::types::{DataSetWriterId, NodeId};

        let node = NodeId::parse("i=2258").unwrap();
        let mut v = PublishedDataSetVariable::from_request(
            VariableId::from_node_id(&node),
            DataSetWriterId::new("w1"),
            PublishedVariableRequest::for_node(node),
        );

        assert!(apply_variable_patch(
            &mut v,
            PublishedVariablePatch {
                trigger_id: Some(VariableId::new("other")),
                substitute_value: Some(serde_json::json!(0)),
                ..Default::default()
            },
        ));
        assert!(v.trigger_id.is_some());
        // Zero is a real JSON value, not the null sentinel.
        assert_eq!(v.substitute_value, Some(serde_json::json!(0)));

        assert!(apply_variable_patch(
            &mut v,
            PublishedVariablePatch {
                trigger_id: Some(VariableId::new("")),
                substitute_value: Some(serde_json::Value::Null),
                ..Default::default()
            },
        ));
        assert!(v.trigger_id.is_none());
        assert!(v.substitute_value.is_none());
    }
}
