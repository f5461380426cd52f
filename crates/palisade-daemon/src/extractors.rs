//! Metadata extractors turning observed workload facts into identity tags.

use std::collections::HashMap;

use palisade_core::monitor::{MetadataExtractor, WorkloadDescriptor, WorkloadRuntime};
use palisade_core::{CoreError, Result};

/// Extracts identity tags from container labels.
///
/// When the workload belongs to an orchestrator service (swarm-style), the
/// service labels take precedence over the container's own labels, so policy
/// follows the service definition rather than individual replicas. `image`
/// and `name` tags are always present.
pub struct LabelExtractor;

impl MetadataExtractor for LabelExtractor {
    fn extract(&self, descriptor: &WorkloadDescriptor) -> Result<WorkloadRuntime> {
        if descriptor.name.is_empty() {
            return Err(CoreError::Monitor(
                "descriptor carries no workload name".to_string(),
            ));
        }

        let mut tags = HashMap::new();
        tags.insert("image".to_string(), descriptor.image.clone());
        tags.insert("name".to_string(), descriptor.name.clone());

        let labels = descriptor
            .service_labels
            .as_ref()
            .unwrap_or(&descriptor.labels);
        for (k, v) in labels {
            tags.insert(k.clone(), v.clone());
        }

        let mut ip_addresses = HashMap::new();
        ip_addresses.insert("bridge".to_string(), "0.0.0.0/0".to_string());

        Ok(WorkloadRuntime {
            name: descriptor.name.clone(),
            pid: descriptor.pid,
            tags,
            ip_addresses,
        })
    }
}

/// Extracts identity tags for plain Linux processes.
pub struct ProcessExtractor;

impl MetadataExtractor for ProcessExtractor {
    fn extract(&self, descriptor: &WorkloadDescriptor) -> Result<WorkloadRuntime> {
        if descriptor.pid == 0 {
            return Err(CoreError::Monitor(
                "process descriptor carries no pid".to_string(),
            ));
        }

        let mut tags = HashMap::new();
        tags.insert("name".to_string(), descriptor.name.clone());
        tags.insert("pid".to_string(), descriptor.pid.to_string());
        for (k, v) in &descriptor.labels {
            tags.insert(k.clone(), v.clone());
        }

        Ok(WorkloadRuntime {
            name: descriptor.name.clone(),
            pid: descriptor.pid,
            tags,
            ip_addresses: HashMap::new(),
        })
    }
}
