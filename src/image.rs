//! Base image materialization
//!
//! The worker's base filesystem is a flattened container image. Extraction is
//! delegated to an [`ImageExporter`] so environment setup can be exercised
//! without a container engine.

use crate::errors::{Result, WorkerError};
use bollard::errors::Error as BollardError;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{CreateContainerOptions, RemoveContainerOptionsBuilder};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::fs;
use std::future::Future;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tar::Archive;

/// Image used when none is given on the command line
pub const DEFAULT_BASE_IMAGE: &str = "debian:bookworm-slim";

const DOCKER_TIMEOUT_SECS: u64 = 120;
/// Export chunks buffered between the API stream and the unpacker
const CHUNK_BACKLOG: usize = 16;

/// Extracts the root filesystem of a container image into a directory
pub trait ImageExporter {
    fn export(&self, image: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DockerEndpoint {
    Local,
    UnixSocket(PathBuf),
}

/// Exporter talking to the Docker Engine API
#[derive(Debug, Clone)]
pub struct DockerExporter {
    endpoint: DockerEndpoint,
}

impl Default for DockerExporter {
    fn default() -> Self {
        Self {
            endpoint: DockerEndpoint::Local,
        }
    }
}

impl DockerExporter {
    /// Connect with the local defaults (`DOCKER_HOST` or the standard socket)
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect through a specific daemon socket
    pub fn with_socket(path: impl AsRef<Path>) -> Self {
        Self {
            endpoint: DockerEndpoint::UnixSocket(path.as_ref().to_path_buf()),
        }
    }

    fn client(&self) -> Result<Docker> {
        let connected = match &self.endpoint {
            DockerEndpoint::Local => Docker::connect_with_local_defaults(),
            DockerEndpoint::UnixSocket(path) => Docker::connect_with_socket(
                &path.to_string_lossy(),
                DOCKER_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
        };
        connected.map_err(|e| WorkerError::ImageExport(format!("Failed to connect to docker: {}", e)))
    }

    async fn export_async(&self, image: &str, dest: &Path) -> Result<()> {
        let docker = self.client()?;

        let created = docker
            .create_container(
                None::<CreateContainerOptions>,
                ContainerCreateBody {
                    image: Some(image.to_string()),
                    ..ContainerCreateBody::default()
                },
            )
            .await
            .map_err(|e| docker_error("create_container", image, e))?;
        debug!("Created export container {} from {}", created.id, image);

        let result = export_container(&docker, &created.id, dest).await;
        remove_container(&docker, &created.id).await;
        result
    }
}

impl ImageExporter for DockerExporter {
    fn export(&self, image: &str, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;

        info!("Exporting image {} to {}", image, dest.display());
        run_async(self.export_async(image, dest))
    }
}

fn run_async<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

fn docker_error(operation: &str, target: &str, source: BollardError) -> WorkerError {
    WorkerError::ImageExport(format!("{} {} failed: {}", operation, target, source))
}

/// Stream the container's filesystem into an unpacker running beside the
/// API stream
async fn export_container(docker: &Docker, id: &str, dest: &Path) -> Result<()> {
    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(CHUNK_BACKLOG);
    let target = dest.to_path_buf();
    let unpacker = thread::Builder::new()
        .name("image-unpack".to_string())
        .spawn(move || unpack(ChunkReader::new(rx), &target))?;

    let mut stream = Box::pin(docker.export_container(id));
    let mut stream_result = Ok(());
    while let Some(chunk) = stream.next().await {
        match chunk {
            // A closed channel means the unpacker gave up; its error wins
            Ok(bytes) => {
                if tx.send(bytes.to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                stream_result = Err(docker_error("export_container", id, e));
                break;
            }
        }
    }
    drop(tx);

    let unpacked = unpacker
        .join()
        .map_err(|_| WorkerError::ImageExport("image unpacker panicked".to_string()))?;
    stream_result?;
    unpacked.map_err(|e| {
        WorkerError::ImageExport(format!("unpacking into {} failed: {}", dest.display(), e))
    })
}

async fn remove_container(docker: &Docker, id: &str) {
    let options = RemoveContainerOptionsBuilder::new().force(true).build();
    match docker.remove_container(id, Some(options)).await {
        Ok(()) => debug!("Removed export container {}", id),
        Err(e) => warn!("Failed to remove export container {}: {}", id, e),
    }
}

fn unpack(reader: impl Read, dest: &Path) -> io::Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dest)
}

/// Blocking reader over chunks delivered through a channel; ends when the
/// sender is dropped
struct ChunkReader {
    chunks: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl ChunkReader {
    fn new(chunks: Receiver<Vec<u8>>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
