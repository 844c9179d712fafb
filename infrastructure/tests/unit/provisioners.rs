//! Full provisioning pipelines built from `InfraConfig`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use che_infra::application::converters::{
    DockerEnvironmentConverter, KubernetesEnvironmentConverter,
};
use che_infra::application::provisioners::{MACHINE_TOKEN_ENV, TRACING_ENDPOINT_ENV};
use che_infra::application::{EnvironmentConverter, docker_pipeline, kubernetes_pipeline};
use che_infra::domain::kubernetes::{ORIGINAL_NAME_LABEL, WORKSPACE_ID_LABEL};
use che_infra::domain::{
    InfraConfig, InfrastructureError, InternalEnvironment, InternalRecipe, KubernetesEnvironment,
    MachineConfig, RuntimeIdentity, ServerConfig, VolumeConfig,
};

use crate::mocks::StaticTokens;

fn identity() -> RuntimeIdentity {
    RuntimeIdentity::new("ws1", "default", "owner")
}

fn dev_machine() -> MachineConfig {
    MachineConfig {
        servers: IndexMap::from([
            (
                "ide".to_string(),
                ServerConfig::new("3100/tcp").with_protocol("http"),
            ),
            (
                "lsp".to_string(),
                ServerConfig::new("4000").with_attribute("internal", "true"),
            ),
        ]),
        volumes: IndexMap::from([(
            "projects".to_string(),
            VolumeConfig {
                path: "/projects".to_string(),
            },
        )]),
        attributes: BTreeMap::from([("memoryLimitBytes".to_string(), "1g".to_string())]),
        env: BTreeMap::new(),
    }
}

fn source() -> InternalEnvironment {
    InternalEnvironment::new(
        InternalRecipe::new("dockerimage", None, "eclipse/ubuntu_jdk8"),
        BTreeMap::from([("dev".to_string(), dev_machine())]),
    )
}

fn config() -> InfraConfig {
    InfraConfig {
        docker_network: Some("che-net".to_string()),
        ingress_domain: "apps.example.com".to_string(),
        tracing_endpoint: Some("http://collector:4317".to_string()),
        ..InfraConfig::default()
    }
}

// ── Docker ────────────────────────────────────────────────────────────────────

#[test]
fn docker_pipeline_applies_every_step() {
    let mut env = DockerEnvironmentConverter.convert(&source()).unwrap();
    docker_pipeline(&config(), Some(Arc::new(StaticTokens("tok"))))
        .provision(&mut env, &identity())
        .unwrap();

    let dev = &env.containers["dev"];
    assert_eq!(dev.mem_limit, Some(1024 * 1024 * 1024));
    assert!(dev.extra_hosts.contains(&"che-host:172.17.0.1".to_string()));
    assert_eq!(dev.networks, ["che-net"]);
    assert_eq!(dev.volumes, ["ws1_projects:/projects"]);
    assert!(dev.expose.contains(&"3100/tcp".to_string()));
    assert!(dev.expose.contains(&"4000/tcp".to_string()));
    assert_eq!(dev.labels["org.eclipse.che.server.ide.port"], "3100/tcp");
    assert_eq!(dev.environment[TRACING_ENDPOINT_ENV], "http://collector:4317");
    assert_eq!(dev.environment[MACHINE_TOKEN_ENV], "tok-ws1");
}

#[test]
fn docker_pipeline_is_idempotent() {
    let pipeline = docker_pipeline(&config(), Some(Arc::new(StaticTokens("tok"))));
    let mut once = DockerEnvironmentConverter.convert(&source()).unwrap();
    pipeline.provision(&mut once, &identity()).unwrap();
    let mut twice = once.clone();
    pipeline.provision(&mut twice, &identity()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn invalid_volume_name_stops_the_pipeline() {
    let mut source = source();
    source.machines.get_mut("dev").unwrap().volumes = IndexMap::from([(
        "Bad_Name".to_string(),
        VolumeConfig {
            path: "/data".to_string(),
        },
    )]);
    let mut env = DockerEnvironmentConverter.convert(&source).unwrap();
    let err = docker_pipeline(&config(), None)
        .provision(&mut env, &identity())
        .unwrap_err();
    assert_eq!(
        err,
        InfrastructureError::InvalidVolumeName {
            name: "Bad_Name".to_string()
        }
    );
}

#[test]
fn volumes_are_bound_in_declaration_order() {
    let document = "\
recipe:
  type: dockerimage
  content: alpine
machines:
  dev:
    volumes:
      zz: {path: /z}
      aa: {path: /a}
";
    let source: InternalEnvironment = serde_yaml::from_str(document).unwrap();
    let mut env = DockerEnvironmentConverter.convert(&source).unwrap();
    docker_pipeline(&config(), None)
        .provision(&mut env, &identity())
        .unwrap();
    assert_eq!(env.containers["dev"].volumes, ["ws1_zz:/z", "ws1_aa:/a"]);
}

// ── Kubernetes ────────────────────────────────────────────────────────────────

#[test]
fn kubernetes_pipeline_exposes_and_renames() {
    let mut env = KubernetesEnvironmentConverter.convert(&source()).unwrap();
    kubernetes_pipeline(&config(), Some(Arc::new(StaticTokens("tok"))))
        .provision(&mut env, &identity())
        .unwrap();

    let pod = &env.pods["ws1-dev"];
    assert_eq!(pod.metadata.labels[WORKSPACE_ID_LABEL], "ws1");
    assert_eq!(pod.metadata.labels[ORIGINAL_NAME_LABEL], "dev");
    assert_eq!(pod.spec.restart_policy.as_deref(), Some("Never"));
    let container = &pod.spec.containers[0];
    assert_eq!(container.memory_limit, Some(1024 * 1024 * 1024));
    assert_eq!(container.env[MACHINE_TOKEN_ENV], "tok-ws1");

    let service = &env.services["ws1-dev"];
    assert_eq!(service.selector[ORIGINAL_NAME_LABEL], "dev");
    assert_eq!(service.ports.len(), 2);

    assert_eq!(env.ingresses.len(), 1, "internal servers get no ingress");
    let ingress = &env.ingresses["ws1-dev-ide"];
    assert_eq!(ingress.service_name, "ws1-dev");
    assert_eq!(ingress.service_port, 3100);
    assert_eq!(ingress.host, "dev-ide-ws1.apps.example.com");
}

#[test]
fn kubernetes_pipeline_is_idempotent() {
    let pipeline = kubernetes_pipeline(&config(), Some(Arc::new(StaticTokens("tok"))));
    let mut once = KubernetesEnvironmentConverter.convert(&source()).unwrap();
    pipeline.provision(&mut once, &identity()).unwrap();
    let mut twice = once.clone();
    pipeline.provision(&mut twice, &identity()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn pipeline_without_tokens_skips_the_token_step() {
    let with = kubernetes_pipeline(&config(), Some(Arc::new(StaticTokens("tok"))));
    let without = kubernetes_pipeline(&config(), None);
    assert_eq!(with.len(), without.len() + 1);

    let mut env = KubernetesEnvironmentConverter.convert(&source()).unwrap();
    without.provision(&mut env, &identity()).unwrap();
    assert!(
        !env.pods["ws1-dev"].spec.containers[0]
            .env
            .contains_key(MACHINE_TOKEN_ENV)
    );
}

#[test]
fn machine_with_servers_and_no_pod_stops_the_pipeline() {
    let mut env = KubernetesEnvironment::new(
        InternalRecipe::new("kubernetes", None, ""),
        BTreeMap::from([(
            "dev".to_string(),
            MachineConfig {
                attributes: BTreeMap::new(),
                ..dev_machine()
            },
        )]),
    );
    let err = kubernetes_pipeline(&config(), None)
        .provision(&mut env, &identity())
        .unwrap_err();
    assert_eq!(
        err,
        InfrastructureError::MissingContainer {
            machine: "dev".to_string()
        }
    );
    assert!(env.services.is_empty());
}
