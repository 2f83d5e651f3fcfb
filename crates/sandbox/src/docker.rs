// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker-backed sandbox runtime (bollard).

use crate::runtime::{
    ManagedSandbox, SandboxError, SandboxRuntime, SandboxSpec, DESKTOP_CONTAINER_PORT,
    TOOL_CONTAINER_PORT,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use otto_core::{SandboxId, SandboxStatus, SessionId};
use std::collections::HashMap;
use std::time::Duration;

/// Label marking containers this plane owns.
const MANAGED_LABEL: &str = "ottobot.managed";
/// Label carrying the owning session id.
const SESSION_LABEL: &str = "ottobot.session";

/// Readiness probe interval.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Sandbox runtime over the local Docker daemon.
#[derive(Clone)]
pub struct DockerSandbox {
    docker: Docker,
    probe: reqwest::Client,
    /// Host the published desktop ports are reachable on
    probe_host: String,
}

impl DockerSandbox {
    pub fn connect(probe_host: impl Into<String>) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Runtime(format!("docker connect: {e}")))?;
        let probe = reqwest::Client::builder()
            .timeout(PROBE_INTERVAL)
            .build()
            .map_err(|e| SandboxError::Runtime(format!("probe client: {e}")))?;
        Ok(Self {
            docker,
            probe,
            probe_host: probe_host.into(),
        })
    }
}

fn runtime_err(op: &str, err: bollard::errors::Error) -> SandboxError {
    SandboxError::Runtime(format!("{op}: {err}"))
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

#[async_trait]
impl SandboxRuntime for DockerSandbox {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxId, SandboxError> {
        let desktop_key = format!("{DESKTOP_CONTAINER_PORT}/tcp");
        let tool_key = format!("{TOOL_CONTAINER_PORT}/tcp");

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            desktop_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.desktop_port.to_string()),
            }]),
        );
        port_bindings.insert(
            tool_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.tool_port.to_string()),
            }]),
        );

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        exposed_ports.insert(desktop_key, HashMap::new());
        exposed_ports.insert(tool_key, HashMap::new());

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(SESSION_LABEL.to_string(), spec.session_id.to_string());

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:/workspace",
                spec.workspace_host_dir().display()
            )]),
            port_bindings: Some(port_bindings),
            memory: Some(spec.memory_limit_bytes),
            cpu_shares: Some(spec.cpu_shares as i64),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            network_mode: spec.network.clone(),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env()),
            user: Some("ottobot".to_string()),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.container_name(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| runtime_err("create container", e))?;

        tracing::info!(
            session = %spec.session_id,
            sandbox = %created.id,
            image = %spec.image,
            "sandbox created"
        );
        Ok(SandboxId::new(created.id))
    }

    async fn start(&self, id: &SandboxId) -> Result<(), SandboxError> {
        match self
            .docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already started
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Err(SandboxError::NotFound(id.to_string())),
            Err(e) => Err(runtime_err("start container", e)),
        }
    }

    async fn stop(&self, id: &SandboxId, grace: Duration) -> Result<(), SandboxError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(id.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped; 404: already removed
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(runtime_err("stop container", e)),
        }
    }

    async fn remove(&self, id: &SandboxId) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(id.as_str(), Some(options))
            .await
        {
            Ok(()) => Ok(()),
            // 404: already removed; 409: removal already in progress
            Err(e) if matches!(status_code(&e), Some(404) | Some(409)) => Ok(()),
            Err(e) => Err(runtime_err("remove container", e)),
        }
    }

    async fn status(&self, id: &SandboxId) -> Result<SandboxStatus, SandboxError> {
        let inspected = match self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspected) => inspected,
            Err(e) if status_code(&e) == Some(404) => return Ok(SandboxStatus::Missing),
            Err(e) => return Err(runtime_err("inspect container", e)),
        };
        let state = inspected.state.as_ref();
        Ok(match state {
            Some(state) if state.running == Some(true) => SandboxStatus::Running,
            Some(state) if state.status == Some(bollard::models::ContainerStateStatusEnum::CREATED) => {
                SandboxStatus::Created
            }
            _ => SandboxStatus::Exited,
        })
    }

    async fn wait_for_desktop(
        &self,
        id: &SandboxId,
        desktop_port: u16,
        max: Duration,
    ) -> Result<(), SandboxError> {
        let url = format!("http://{}:{}/vnc.html", self.probe_host, desktop_port);
        let deadline = tokio::time::Instant::now() + max;

        loop {
            // Any HTTP response proves the port proxy is up
            if self.probe.head(&url).send().await.is_ok() {
                tracing::debug!(sandbox = %id, desktop_port, "desktop ready");
                return Ok(());
            }
            if self.status(id).await? == SandboxStatus::Exited {
                return Err(SandboxError::Runtime(format!(
                    "sandbox {id} exited while waiting for desktop"
                )));
            }
            if tokio::time::Instant::now() + PROBE_INTERVAL > deadline {
                return Err(SandboxError::ReadinessTimeout(max));
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSandbox>, SandboxError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{MANAGED_LABEL}=true")],
        );
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| runtime_err("list containers", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let sandbox_id = SandboxId::new(c.id?);
                let session_id = c
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(SESSION_LABEL))
                    .map(|sid| SessionId::new(sid.clone()));
                // Docker reports creation time in epoch seconds
                let created_at_ms = c.created.unwrap_or(0).max(0) as u64 * 1000;
                Some(ManagedSandbox {
                    sandbox_id,
                    session_id,
                    created_at_ms,
                })
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| runtime_err("ping", e))
    }
}
