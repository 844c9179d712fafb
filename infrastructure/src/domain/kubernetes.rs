//! Kubernetes / OpenShift target environment.
//!
//! A trimmed object model carrying only the fields the provisioners touch.
//! Pods point back to machines through annotations, never through references,
//! and `find_container` resolves a machine through that index.

use std::collections::BTreeMap;

use che_common::Warning;
use serde::{Deserialize, Serialize};

use crate::domain::environment::{
    ContainerEnvironment, InternalRecipe, MachineConfig, RuntimeEnvironment,
};
use crate::domain::error::InfrastructureError;

/// Restart policy every workspace pod must use.
pub const DEFAULT_RESTART_POLICY: &str = "Never";

/// Label carrying the workspace id on every object of a workspace.
pub const WORKSPACE_ID_LABEL: &str = "che.workspace_id";

/// Label carrying the original (un-prefixed) object name.
pub const ORIGINAL_NAME_LABEL: &str = "che.original_name";

const MACHINE_NAME_ANNOTATION_FMT_PREFIX: &str = "org.eclipse.che.container.";
const MACHINE_NAME_ANNOTATION_FMT_SUFFIX: &str = ".machine_name";

/// Annotation key linking a pod container to its machine.
#[must_use]
pub fn machine_name_annotation(container: &str) -> String {
    format!("{MACHINE_NAME_ANNOTATION_FMT_PREFIX}{container}{MACHINE_NAME_ANNOTATION_FMT_SUFFIX}")
}

const MAX_DNS_LABEL_LEN: usize = 63;

/// Lowercase RFC 1123 label derived from `name`: invalid characters become
/// `-`, leading and trailing dashes are dropped, length is capped at 63.
#[must_use]
pub fn dns_label(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut label: String = mapped.trim_matches('-').chars().take(MAX_DNS_LABEL_LEN).collect();
    while label.ends_with('-') {
        label.pop();
    }
    if label.is_empty() {
        "machine".to_string()
    } else {
        label
    }
}

/// Machine a pod container belongs to, from the pod annotations.
#[must_use]
pub fn machine_name<'a>(pod: &'a Pod, container: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .get(&machine_name_annotation(container))
        .map(String::as_str)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    pub container_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    pub metadata: ObjectMeta,
    pub host: String,
    pub path: String,
    pub service_name: String,
    pub service_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub metadata: ObjectMeta,
    pub host: String,
    pub service_name: String,
    pub target_port: u16,
    pub tls: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    pub data: BTreeMap<String, String>,
}

/// Where a machine runs inside the pod set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub pod: String,
    pub container: String,
}

/// Pods and the objects that make them reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesEnvironment {
    pub recipe: InternalRecipe,
    pub machines: BTreeMap<String, MachineConfig>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub pods: BTreeMap<String, Pod>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    #[serde(default)]
    pub ingresses: BTreeMap<String, Ingress>,
    #[serde(default)]
    pub routes: BTreeMap<String, Route>,
    #[serde(default)]
    pub config_maps: BTreeMap<String, ConfigMap>,
}

impl KubernetesEnvironment {
    pub fn new(recipe: InternalRecipe, machines: BTreeMap<String, MachineConfig>) -> Self {
        Self {
            recipe,
            machines,
            warnings: Vec::new(),
            pods: BTreeMap::new(),
            services: BTreeMap::new(),
            ingresses: BTreeMap::new(),
            routes: BTreeMap::new(),
            config_maps: BTreeMap::new(),
        }
    }

    /// Machine name → pod container index built from the annotations.
    #[must_use]
    pub fn container_index(&self) -> BTreeMap<String, ContainerRef> {
        let mut index = BTreeMap::new();
        for (pod_name, pod) in &self.pods {
            for container in &pod.spec.containers {
                if let Some(machine) = machine_name(pod, &container.name) {
                    index.insert(
                        machine.to_string(),
                        ContainerRef {
                            pod: pod_name.clone(),
                            container: container.name.clone(),
                        },
                    );
                }
            }
        }
        index
    }

    /// Resolve `machine` to its pod container.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MissingContainer`] when no annotated pod
    /// container belongs to the machine.
    pub fn find_container(&self, machine: &str) -> Result<ContainerRef, InfrastructureError> {
        self.container_index()
            .remove(machine)
            .ok_or_else(|| InfrastructureError::MissingContainer {
                machine: machine.to_string(),
            })
    }

    /// Check that every machine is backed by an annotated pod container.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MissingContainer`] for the first machine
    /// without one.
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        let index = self.container_index();
        match self.machines.keys().find(|m| !index.contains_key(*m)) {
            Some(machine) => Err(InfrastructureError::MissingContainer {
                machine: machine.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl RuntimeEnvironment for KubernetesEnvironment {
    fn recipe(&self) -> &InternalRecipe {
        &self.recipe
    }

    fn machines(&self) -> &BTreeMap<String, MachineConfig> {
        &self.machines
    }

    fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

impl ContainerEnvironment for KubernetesEnvironment {
    fn container_envs_mut(&mut self) -> Vec<&mut BTreeMap<String, String>> {
        self.pods
            .values_mut()
            .flat_map(|pod| pod.spec.containers.iter_mut())
            .map(|container| &mut container.env)
            .collect()
    }
}
