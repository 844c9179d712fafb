//! Recipe → target environment conversion through the dispatching converters.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use che_common::warning_codes;
use che_infra::application::converters::{
    DockerEnvironmentConverter, KubernetesEnvironmentConverter,
};
use che_infra::application::EnvironmentConverter;
use che_infra::domain::{InfrastructureError, InternalEnvironment, InternalRecipe, MachineConfig};

const COMPOSE: &str = "\
services:
  dev:
    image: eclipse/ubuntu_jdk8
    mem_limit: 2147483648
    environment:
      JAVA_OPTS: -Xmx1g
    expose:
      - \"8080\"
  db:
    image: postgres:16
    restart: always
  cache:
    image: valkey/valkey:8
";

fn internal(recipe_type: &str, content: &str, machines: &[&str]) -> InternalEnvironment {
    InternalEnvironment::new(
        InternalRecipe::new(recipe_type, None, content),
        machines
            .iter()
            .map(|name| ((*name).to_string(), MachineConfig::default()))
            .collect(),
    )
}

#[test]
fn docker_image_recipe_becomes_one_container() {
    let env = DockerEnvironmentConverter
        .convert(&internal("dockerimage", "eclipse/ubuntu_jdk8", &["dev"]))
        .unwrap();
    assert_eq!(env.containers.len(), 1);
    assert_eq!(env.containers["dev"].image.as_deref(), Some("eclipse/ubuntu_jdk8"));
}

#[test]
fn dockerfile_recipe_is_built() {
    let env = DockerEnvironmentConverter
        .convert(&internal("dockerfile", "FROM alpine", &["dev"]))
        .unwrap();
    let build = env.containers["dev"].build.as_ref().unwrap();
    assert_eq!(build.dockerfile_content.as_deref(), Some("FROM alpine"));
}

#[test]
fn compose_recipe_keeps_every_service() {
    let env = DockerEnvironmentConverter
        .convert(&internal("compose", COMPOSE, &["dev", "db"]))
        .unwrap();
    assert_eq!(
        env.containers.keys().collect::<Vec<_>>(),
        ["cache", "db", "dev"]
    );
    assert_eq!(env.containers["dev"].environment["JAVA_OPTS"], "-Xmx1g");
    assert_eq!(
        env.machines["dev"].memory_limit_bytes().unwrap(),
        Some(2_147_483_648)
    );
    assert!(
        env.warnings
            .iter()
            .any(|w| w.code == warning_codes::UNUSED_COMPOSE_SERVICE && w.message.contains("cache"))
    );
}

#[test]
fn compose_recipe_runs_on_kubernetes() {
    let env = KubernetesEnvironmentConverter
        .convert(&internal("compose", COMPOSE, &["dev", "db"]))
        .unwrap();
    assert_eq!(env.pods.len(), 3);
    let dev = &env.pods["dev"];
    assert_eq!(dev.spec.restart_policy.as_deref(), Some("Never"));
    assert_eq!(dev.spec.containers[0].ports[0].container_port, 8080);
    assert_eq!(dev.spec.containers[0].ports[0].protocol, "TCP");
    assert_eq!(env.pods["db"].spec.restart_policy.as_deref(), Some("Always"));
    assert!(env.find_container("db").is_ok());
}

#[test]
fn dockerfile_recipe_cannot_run_on_kubernetes() {
    let err = KubernetesEnvironmentConverter
        .convert(&internal("dockerfile", "FROM alpine", &["dev"]))
        .unwrap_err();
    assert!(matches!(err, InfrastructureError::InvalidRecipe(ref m) if m.contains("Dockerfile")));
}

#[test]
fn unknown_recipe_type_names_the_literal() {
    let err = DockerEnvironmentConverter
        .convert(&internal("helm", "", &["dev"]))
        .unwrap_err();
    assert!(err.to_string().contains("helm"));
}

#[test]
fn single_machine_recipes_reject_extra_machines() {
    let err = KubernetesEnvironmentConverter
        .convert(&internal("dockerimage", "alpine", &["a", "b", "c"]))
        .unwrap_err();
    assert_eq!(
        err,
        InfrastructureError::MultipleMachines {
            recipe_type: "dockerimage".to_string(),
            extra: vec!["b".to_string(), "c".to_string()],
        }
    );
}

#[test]
fn machine_without_compose_service_is_rejected() {
    let err = DockerEnvironmentConverter
        .convert(&internal("compose", COMPOSE, &["dev", "worker"]))
        .unwrap_err();
    assert_eq!(
        err,
        InfrastructureError::MissingContainer {
            machine: "worker".to_string()
        }
    );
}

#[test]
fn machine_env_overrides_compose_environment() {
    let mut source = internal("compose", COMPOSE, &["dev"]);
    source.machines.get_mut("dev").unwrap().env =
        BTreeMap::from([("JAVA_OPTS".to_string(), "-Xmx2g".to_string())]);
    let env = DockerEnvironmentConverter.convert(&source).unwrap();
    assert_eq!(env.containers["dev"].environment["JAVA_OPTS"], "-Xmx2g");
}

#[test]
fn services_sharing_a_pod_name_are_rejected_on_kubernetes() {
    let recipe = "services:\n  dev_1:\n    image: alpine\n  dev-1:\n    image: alpine\n";
    let err = KubernetesEnvironmentConverter
        .convert(&internal("compose", recipe, &["dev_1", "dev-1"]))
        .unwrap_err();
    assert_eq!(
        err,
        InfrastructureError::NameCollision {
            first: "dev-1".to_string(),
            second: "dev_1".to_string(),
            name: "dev-1".to_string(),
        }
    );
}

#[test]
fn compose_memory_limit_of_the_wrong_type_is_typed() {
    let recipe = "services:\n  dev:\n    image: alpine\n    mem_limit: true\n";
    let err = DockerEnvironmentConverter
        .convert(&internal("compose", recipe, &["dev"]))
        .unwrap_err();
    assert!(matches!(
        err,
        InfrastructureError::InvalidMemoryLimit { ref value } if value == "true"
    ));
}
