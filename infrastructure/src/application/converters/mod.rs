//! Environment converters: recipe + machines → target container set.

mod compose;
mod docker_image;
mod kubernetes;

pub use compose::ComposeConverter;
pub use docker_image::{DockerImageConverter, DockerfileConverter};
pub use kubernetes::{
    DockerEnvironmentConverter, DockerToKubernetesConverter, KubernetesDockerImageConverter,
    KubernetesEnvironmentConverter,
};
