// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bulk import of a writer group definition with nested writers.
//!
//! One logical import may produce several groups: every nested writer is
//! resolved to an endpoint by (url, security mode, security policy), and the
//! endpoint's site decides which group the writer lands in. The first site
//! encountered claims the supplied group id; each further site gets a clone
//! of the group settings under a freshly generated id. On re-import the
//! supplied id stays pinned to its stored site, and writers for any other
//! site spawn sibling groups. Unresolvable writers are skipped with a
//! logged error, and every touched group is activated at the end.

use std::collections::BTreeMap;

use tracing::{info, warn};

use pulse_core::endpoint::EndpointQuery;
use pulse_core::error::RegistryResult;
use pulse_core::model::{
    DataSetWriterImport, DataSetWriterRequest, ImportResult, ImportedGroup, WriterGroup,
    WriterGroupImport,
};
use pulse_core::types::{DataSetWriterId, SiteId, WriterGroupId};

use crate::registry::WriterGroupRegistry;

impl WriterGroupRegistry {
    /// Imports a writer group definition, partitioning nested writers into
    /// one group per endpoint site.
    pub async fn import_writer_group(
        &self,
        import: WriterGroupImport,
    ) -> RegistryResult<ImportResult> {
        let base_id = import.id.clone().unwrap_or_else(WriterGroupId::generate);
        let existing_base = self.groups.find(&base_id).await?;

        // Site -> (group, writers placed there). BTreeMap keeps the result
        // deterministic for callers and tests.
        let mut by_site: BTreeMap<Option<SiteId>, (WriterGroup, Vec<DataSetWriterId>)> =
            BTreeMap::new();
        let mut skipped: Vec<String> = Vec::new();

        for writer_import in import.writers {
            let endpoint_url = writer_import.endpoint_url.clone();
            let endpoint = match self.resolve_import_endpoint(&writer_import).await? {
                Some(endpoint) => endpoint,
                None => {
                    warn!(url = %endpoint_url, "Import writer skipped: no matching endpoint");
                    skipped.push(endpoint_url);
                    continue;
                }
            };

            if writer_import.events.is_some() && !writer_import.variables.is_empty() {
                warn!(url = %endpoint_url, "Import writer skipped: both variables and events supplied");
                skipped.push(endpoint_url);
                continue;
            }

            let site = endpoint.site_id.clone();
            if !by_site.contains_key(&site) {
                let group = match &existing_base {
                    // Re-import: the supplied id is pinned to its stored
                    // site; any other site gets a sibling under a fresh id.
                    Some(base) if base.site_id == site => base.clone(),
                    Some(_) => {
                        self.create_import_group(
                            WriterGroupId::generate(),
                            &import.group,
                            site.clone(),
                        )
                        .await?
                    }
                    None => {
                        let group_id = if by_site.is_empty() {
                            base_id.clone()
                        } else {
                            WriterGroupId::generate()
                        };
                        self.create_import_group(group_id, &import.group, site.clone())
                            .await?
                    }
                };
                by_site.insert(site.clone(), (group, Vec::new()));
            }
            // Present by construction; the entry was just inserted above.
            let Some((group, placed)) = by_site.get_mut(&site) else {
                continue;
            };

            let writer_id = writer_import
                .id
                .clone()
                .unwrap_or_else(|| DataSetWriterId::from(&endpoint.id));
            let writer = self
                .upsert_import_writer(&writer_id, group.id.clone(), &endpoint.id, &writer_import)
                .await?;

            for variable in writer_import.variables {
                if let Err(e) = self.add_dataset_variable(&writer.id, variable).await {
                    warn!(writer_id = %writer.id, error = %e, "Import variable failed");
                }
            }
            if let Some(events) = writer_import.events {
                if let Err(e) = self.upsert_import_events(&writer.id, events).await {
                    warn!(writer_id = %writer.id, error = %e, "Import event dataset failed");
                }
            }

            placed.push(writer.id);
        }

        let mut result = ImportResult {
            groups: Vec::new(),
            skipped,
        };
        for (site, (group, writer_ids)) in by_site {
            self.activate_writer_group(&group.id).await?;
            result.groups.push(ImportedGroup {
                id: group.id,
                site_id: site,
                writer_ids,
            });
        }

        info!(
            groups = result.groups.len(),
            skipped = result.skipped.len(),
            "Writer group import finished"
        );
        Ok(result)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn resolve_import_endpoint(
        &self,
        writer_import: &DataSetWriterImport,
    ) -> RegistryResult<Option<pulse_core::endpoint::Endpoint>> {
        let query = EndpointQuery {
            url: writer_import.endpoint_url.clone(),
            security_mode: writer_import.security_mode,
            security_policy: writer_import.security_policy,
        };
        let mut matches = self.endpoints.query_endpoints(&query).await?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0))
        })
    }

    /// Creates a group from the imported settings scoped to the given site.
    async fn create_import_group(
        &self,
        id: WriterGroupId,
        settings: &pulse_core::model::WriterGroupRequest,
        site: Option<SiteId>,
    ) -> RegistryResult<WriterGroup> {
        let mut request = settings.clone();
        request.site_id = site;
        match self.insert_group(id.clone(), request).await {
            Ok(group) => Ok(group),
            // Concurrent import created it first.
            Err(e) if e.is_already_exists() => self.require_group(&id).await,
            Err(e) => Err(e),
        }
    }

    async fn upsert_import_writer(
        &self,
        writer_id: &DataSetWriterId,
        group_id: WriterGroupId,
        endpoint_id: &pulse_core::types::EndpointId,
        writer_import: &DataSetWriterImport,
    ) -> RegistryResult<pulse_core::model::DataSetWriter> {
        if let Some(existing) = self.writers.find(writer_id).await? {
            let patch = pulse_core::model::DataSetWriterPatch {
                writer_group_id: Some(group_id),
                dataset_name: writer_import
                    .dataset
                    .as_ref()
                    .and_then(|d| d.name.clone()),
                extension_fields: writer_import
                    .dataset
                    .as_ref()
                    .and_then(|d| d.extension_fields.clone()),
                subscription_settings: writer_import
                    .dataset
                    .as_ref()
                    .and_then(|d| d.subscription_settings.clone()),
                ..Default::default()
            };
            return self
                .update_dataset_writer(writer_id, patch, &existing.generation)
                .await;
        }

        let mut request = DataSetWriterRequest::for_endpoint(endpoint_id.clone());
        request.id = Some(writer_id.clone());
        request.writer_group_id = Some(group_id);
        request.dataset = writer_import.dataset.clone();
        self.add_dataset_writer(request).await
    }

    async fn upsert_import_events(
        &self,
        writer_id: &DataSetWriterId,
        request: pulse_core::model::PublishedEventsRequest,
    ) -> RegistryResult<()> {
        match self.add_event_dataset(writer_id, request.clone()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                let existing = self.get_event_dataset(writer_id).await?;
                let patch = pulse_core::model::PublishedEventsPatch {
                    selected_fields: Some(request.selected_fields),
                    filter: request.filter,
                    monitoring_mode: request.monitoring_mode,
                    queue_size: request.queue_size,
                    discard_new: request.discard_new,
                };
                self.update_event_dataset(writer_id, patch, &existing.generation)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
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
    use pulse_core::model::{PublishedVariableRequest, WriterGroupRequest};
    use pulse_core::types::{NodeId, WriterGroupState};

    fn two_site_endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::insecure("ep-a", "opc.tcp://a").with_site("plant-1"),
            Endpoint::insecure("ep-b", "opc.tcp://b").with_site("plant-2"),
        ]
    }

    fn writer_import(url: &str, nodes: &[&str]) -> DataSetWriterImport {
        DataSetWriterImport {
            endpoint_url: url.to_string(),
            security_mode: Default::default(),
            security_policy: Default::default(),
            id: None,
            dataset: None,
            variables: nodes
                .iter()
                .map(|n| PublishedVariableRequest::for_node(NodeId::parse(n).unwrap()))
                .collect(),
            events: None,
        }
    }

    #[tokio::test]
    async fn test_import_partitions_by_site() {
        let registry = registry_with(two_site_endpoints());
        let base = WriterGroupId::new("imported");

        let result = registry
            .import_writer_group(WriterGroupImport {
                id: Some(base.clone()),
                group: WriterGroupRequest {
                    name: Some("Line".to_string()),
                    ..Default::default()
                },
                writers: vec![
                    writer_import("opc.tcp://a", &["i=2258"]),
                    writer_import("opc.tcp://b", &["i=2258"]),
                ],
            })
            .await
            .unwrap();

        assert_eq!(result.groups.len(), 2);
        assert!(result.skipped.is_empty());

        // One of the groups keeps the supplied id; the other is fresh.
        let kept: Vec<_> = result.groups.iter().filter(|g| g.id == base).collect();
        assert_eq!(kept.len(), 1);

        for imported in &result.groups {
            let group = registry.get_writer_group(&imported.id).await.unwrap();
            assert_eq!(group.name.as_deref(), Some("Line"));
            assert_eq!(group.status.state, WriterGroupState::Pending);
            assert_eq!(imported.writer_ids.len(), 1);

            // The writer in each group belongs to that group's site.
            let writer = registry
                .get_dataset_writer(&imported.writer_ids[0])
                .await
                .unwrap();
            assert_eq!(writer.writer_group_id, imported.id);
        }

        let sites: Vec<_> = result.groups.iter().map(|g| g.site_id.clone()).collect();
        assert!(sites.contains(&Some(pulse_core::types::SiteId::new("plant-1"))));
        assert!(sites.contains(&Some(pulse_core::types::SiteId::new("plant-2"))));
    }

    #[tokio::test]
    async fn test_import_skips_unresolvable_endpoints() {
        let registry = registry_with(two_site_endpoints());
        let result = registry
            .import_writer_group(WriterGroupImport {
                id: None,
                group: WriterGroupRequest::default(),
                writers: vec![
                    writer_import("opc.tcp://a", &["i=2258"]),
                    writer_import("opc.tcp://nowhere", &["i=2258"]),
                ],
            })
            .await
            .unwrap();

        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.skipped, vec!["opc.tcp://nowhere".to_string()]);
    }

    #[tokio::test]
    async fn test_reimport_with_different_site_spawns_sibling() {
        let registry = registry_with(two_site_endpoints());
        let base = WriterGroupId::new("g-import");

        registry
            .import_writer_group(WriterGroupImport {
                id: Some(base.clone()),
                group: WriterGroupRequest {
                    name: Some("Line".to_string()),
                    ..Default::default()
                },
                writers: vec![writer_import("opc.tcp://a", &["i=2258"])],
            })
            .await
            .unwrap();

        // Same id, but the writer now resolves to the other site: the
        // stored group stays pinned to plant-1 and plant-2 gets a sibling
        // sharing the settings.
        let second = registry
            .import_writer_group(WriterGroupImport {
                id: Some(base.clone()),
                group: WriterGroupRequest {
                    name: Some("Line".to_string()),
                    ..Default::default()
                },
                writers: vec![writer_import("opc.tcp://b", &["i=2258"])],
            })
            .await
            .unwrap();

        assert_eq!(second.groups.len(), 1);
        assert!(second.skipped.is_empty());
        let sibling = &second.groups[0];
        assert_ne!(sibling.id, base);
        assert_eq!(
            sibling.site_id,
            Some(pulse_core::types::SiteId::new("plant-2"))
        );

        let original = registry.get_writer_group(&base).await.unwrap();
        assert_eq!(
            original.site_id,
            Some(pulse_core::types::SiteId::new("plant-1"))
        );
        let cloned = registry.get_writer_group(&sibling.id).await.unwrap();
        assert_eq!(cloned.name.as_deref(), Some("Line"));
        assert_eq!(cloned.status.state, WriterGroupState::Pending);
    }

    #[tokio::test]
    async fn test_reimport_upserts_writers() {
        let registry = registry_with(two_site_endpoints());
        let import = WriterGroupImport {
            id: Some(WriterGroupId::new("g-import")),
            group: WriterGroupRequest::default(),
            writers: vec![writer_import("opc.tcp://a", &["i=2258"])],
        };

        let first = registry.import_writer_group(import.clone()).await.unwrap();
        let second = registry.import_writer_group(import).await.unwrap();

        assert_eq!(first.groups[0].id, second.groups[0].id);
        assert_eq!(first.groups[0].writer_ids, second.groups[0].writer_ids);

        // Still exactly one variable on the writer after re-import.
        let filter = pulse_core::model::PublishedVariableFilter {
            writer_id: Some(first.groups[0].writer_ids[0].clone()),
            ..Default::default()
        };
        let page = registry
            .list_dataset_variables(&filter, None, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }
}
