//! bollard-backed [`ContainerRuntime`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::platform::{ContainerHandle, ImageCoordinates, PlatformVariant};
use crate::runtime::{APP_LABEL, ContainerRuntime, OS_LABEL, RuntimeError, ServiceLaunch};

/// Connect to the local Docker daemon.
///
/// Tries bollard's defaults (`DOCKER_HOST` or the platform socket) first, then
/// the Docker Desktop and rootless sockets on Unix.
pub async fn connect_docker() -> Result<Docker, RuntimeError> {
    if let Ok(docker) = Docker::connect_with_local_defaults()
        && docker.ping().await.is_ok()
    {
        return Ok(docker);
    }

    #[cfg(unix)]
    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let path = socket.to_string_lossy();
        if let Ok(docker) = Docker::connect_with_socket(&path, 120, bollard::API_DEFAULT_VERSION)
            && docker.ping().await.is_ok()
        {
            tracing::debug!("Connected to Docker via {}", path);
            return Ok(docker);
        }
    }

    Err(RuntimeError::DockerNotAvailable {
        reason: "no reachable Docker daemon (is Docker running?)".to_string(),
    })
}

#[cfg(unix)]
fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
    }
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock"));
    }
    sockets
}

/// Container runtime talking to a Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon and wrap the connection.
    pub async fn connect() -> Result<Self, RuntimeError> {
        Ok(Self::new(connect_docker().await?))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &ImageCoordinates) -> Result<String, RuntimeError> {
        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.repository.clone(),
            tag: image.tag.clone(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let reference = image.to_string();
        let inspected = self.docker.inspect_image(&reference).await.map_err(|e| {
            RuntimeError::ImagePullFailed {
                image: reference.clone(),
                reason: format!("pulled image cannot be inspected: {e}"),
            }
        })?;

        tracing::info!("Pulled image: {}", image);
        Ok(inspected.id.unwrap_or(reference))
    }

    async fn remove_container(&self, name: &str) -> Result<bool, RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => {
                tracing::debug!("Removed existing container {}", name);
                Ok(true)
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::ContainerRemovalFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn start_container_as_service(
        &self,
        launch: &ServiceLaunch,
    ) -> Result<ContainerHandle, RuntimeError> {
        let port_key = format!("{}/tcp", launch.container_port);
        let port_bindings = HashMap::from([(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(launch.host_port.to_string()),
            }]),
        )]);
        let exposed_ports: HashMap<String, HashMap<(), ()>> =
            HashMap::from([(port_key, HashMap::new())]);
        let labels = HashMap::from([
            (APP_LABEL.to_string(), launch.app_name.clone()),
            (OS_LABEL.to_string(), launch.variant.to_string()),
        ]);

        let config = Config {
            image: Some(launch.image_id.clone()),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: launch.container_name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::ContainerCreationFailed {
                name: launch.container_name.clone(),
                reason: e.to_string(),
            })?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::ContainerStartFailed {
                name: launch.container_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Started container {} ({}) on port {}",
            launch.container_name,
            response.id,
            launch.host_port
        );
        Ok(ContainerHandle::new(response.id))
    }

    async fn running_container_by_app_name(
        &self,
        app_name: &str,
        variant: PlatformVariant,
    ) -> Result<Option<ContainerHandle>, RuntimeError> {
        let filters = HashMap::from([
            (
                "label".to_string(),
                vec![
                    format!("{APP_LABEL}={app_name}"),
                    format!("{OS_LABEL}={variant}"),
                ],
            ),
            ("status".to_string(), vec!["running".to_string()]),
        ]);
        let options = ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::ContainerLookupFailed {
                reason: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .find_map(|c| c.id)
            .map(ContainerHandle::new))
    }

    async fn copy_file_to_container(
        &self,
        container: &ContainerHandle,
        host_path: &Path,
        dest_dir: &str,
    ) -> io::Result<()> {
        let (body, archiver) = archive_stream(host_path.to_path_buf());
        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };
        let uploaded = self
            .docker
            .upload_to_container_streaming(container.id(), Some(options), body)
            .await;
        let archived = archiver.await.map_err(io::Error::other)?;

        match (uploaded, archived) {
            // A dropped body surfaces as BrokenPipe on the archiver side.
            (_, Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
            (Err(e), _) => Err(io::Error::other(e)),
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

/// Chunk size of the tar stream sent to the daemon.
const ARCHIVE_CHUNK: usize = 64 * 1024;
/// Chunks buffered between the archiver thread and the upload.
const ARCHIVE_BACKLOG: usize = 4;

/// Pack a single host file into a tar archive under its file name, streamed
/// in chunks so the file is never held in memory as a whole.
///
/// The handle resolves once the archive is fully written, or with the first
/// I/O error encountered.
fn archive_stream(
    host_path: PathBuf,
) -> (
    impl Stream<Item = Bytes> + Send + 'static,
    JoinHandle<io::Result<()>>,
) {
    let (tx, rx) = mpsc::channel(ARCHIVE_BACKLOG);
    let archiver = tokio::task::spawn_blocking(move || {
        let name = host_path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", host_path.display()),
            )
        })?;
        let writer = io::BufWriter::with_capacity(ARCHIVE_CHUNK, ChunkSender(tx));
        let mut builder = tar::Builder::new(writer);
        builder.append_path_with_name(&host_path, name)?;
        builder.into_inner()?.flush()
    });
    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    (body, archiver)
}

/// Blocking writer forwarding each buffer to the upload stream.
struct ChunkSender(mpsc::Sender<Bytes>);

impl Write for ChunkSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "upload stream closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
