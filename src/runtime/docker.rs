//! Docker-backed implementation of [`SandboxRuntime`] via bollard.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::service::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::session::{SessionStatus, LABEL_ID};

use super::{SandboxRuntime, SandboxSpec, SandboxSummary};

/// Talks to the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    pull_if_missing: bool,
}

impl DockerRuntime {
    /// Connects to the local daemon and verifies it responds.
    pub async fn connect(pull_if_missing: bool) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker. Is Docker running?")?;

        docker
            .ping()
            .await
            .context("Cannot ping Docker daemon. Is Docker running?")?;

        Ok(Self {
            docker,
            pull_if_missing,
        })
    }

    /// Pulls `image`, draining the progress stream.
    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(chunk) = stream.next().await {
            let progress = chunk.with_context(|| format!("Failed to pull image: {image}"))?;
            if let Some(error) = &progress.error {
                anyhow::bail!("Docker pull error: {error}");
            }
            if let Some(status) = &progress.status {
                debug!("pull: {}", status.trim());
            }
        }

        Ok(())
    }

    async fn try_create(&self, spec: &SandboxSpec) -> Result<String, bollard::errors::Error> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                build_container_config(spec),
            )
            .await?;

        for warning in &response.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ensure_network(&self, network: &str) -> Result<()> {
        let existing = self
            .docker
            .list_networks(Some(ListNetworksOptions {
                filters: HashMap::from([("name".to_string(), vec![network.to_string()])]),
            }))
            .await
            .context("Failed to list Docker networks")?;

        // The name filter matches substrings; check for the exact name
        if existing
            .iter()
            .any(|net| net.name.as_deref() == Some(network))
        {
            debug!("Network already exists: {}", network);
            return Ok(());
        }

        info!("Creating network: {}", network);
        match self
            .docker
            .create_network(CreateNetworkOptions {
                name: network.to_string(),
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(_) => Ok(()),
            // Lost a race with a concurrent create; the network exists
            Err(err) if is_server_status(&err, 409) => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to create network: {network}")),
        }
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String> {
        let id = match self.try_create(spec).await {
            Ok(id) => id,
            Err(err) if is_server_status(&err, 404) && self.pull_if_missing => {
                info!("Image not present locally: {}", spec.image);
                self.pull_image(&spec.image).await?;
                self.try_create(spec)
                    .await
                    .with_context(|| format!("Failed to create container: {}", spec.name))?
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to create container: {}", spec.name));
            }
        };

        self.docker
            .start_container::<String>(&id, None)
            .await
            .with_context(|| format!("Failed to start container: {}", spec.name))?;

        debug!("Started container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn inspect(&self, sandbox: &str) -> Result<Option<SessionStatus>> {
        match self
            .docker
            .inspect_container(sandbox, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => {
                let status = details
                    .state
                    .and_then(|state| state.status)
                    .map_or(SessionStatus::Unknown, map_container_state);
                Ok(Some(status))
            }
            Err(err) if is_server_status(&err, 404) => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to inspect container: {sandbox}"))
            }
        }
    }

    async fn stop(&self, sandbox: &str, grace: Duration) -> Result<()> {
        let timeout = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
        match self
            .docker
            .stop_container(sandbox, Some(StopContainerOptions { t: timeout }))
            .await
        {
            Ok(()) => Ok(()),
            // 404: already gone, 304: already stopped
            Err(err) if is_server_status(&err, 404) || is_server_status(&err, 304) => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to stop container: {sandbox}")),
        }
    }

    async fn remove(&self, sandbox: &str) -> Result<()> {
        match self
            .docker
            .remove_container(
                sandbox,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if is_server_status(&err, 404) => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to remove container: {sandbox}"))
            }
        }
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters: HashMap::from([("label".to_string(), vec![LABEL_ID.to_string()])]),
                ..Default::default()
            }))
            .await
            .context("Failed to list containers")?;

        let summaries = containers
            .into_iter()
            .filter_map(|container| {
                let runtime_ref = container.id?;
                let status = container
                    .state
                    .as_deref()
                    .map_or(SessionStatus::Unknown, SessionStatus::from_runtime_state);
                Some(SandboxSummary {
                    runtime_ref,
                    labels: container.labels.unwrap_or_default(),
                    status,
                })
            })
            .collect();

        Ok(summaries)
    }
}

/// Builds the container configuration for a sandbox spec.
fn build_container_config(spec: &SandboxSpec) -> ContainerConfig<String> {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for mapping in &spec.ports {
        let container_port = format!("{}/tcp", mapping.container);
        exposed_ports.insert(container_port.clone(), HashMap::new());
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(mapping.host.to_string()),
            }]),
        );
    }

    ContainerConfig {
        image: Some(spec.image.clone()),
        env: Some(env),
        labels: Some(spec.labels.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            network_mode: Some(spec.network.clone()),
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn map_container_state(status: ContainerStateStatusEnum) -> SessionStatus {
    match status {
        ContainerStateStatusEnum::RUNNING => SessionStatus::Running,
        ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD => SessionStatus::Exited,
        _ => SessionStatus::Unknown,
    }
}

fn is_server_status(err: &bollard::errors::Error, status: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == status
    )
}
