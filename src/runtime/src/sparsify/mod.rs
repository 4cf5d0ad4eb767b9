//! Sparsify clients.
//!
//! Reclaims unused space inside an image in place, either by running
//! virt-sparsify locally or by asking the libguestfs sidecar over its unix
//! socket. Either way a failure leaves the image as the tool left it.

pub mod proto;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imgport_core::config::{SparsifyConfig, SparsifyMode};
use imgport_core::error::{ImportError, Result};
use imgport_core::exec::ExecRequest;
use tokio::net::UnixStream;
use tokio::time::Instant;
use tonic::transport::{Endpoint, Uri};

use crate::exec::ProcessExecutor;
use proto::virt_sparsify_client::VirtSparsifyClient;

/// Placeholder authority; the connector ignores it and dials the socket.
const UDS_ENDPOINT: &str = "http://[::]:50051";

/// Lifecycle of one sparsify call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparsifyState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl SparsifyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for SparsifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Sparsify strategy.
#[async_trait]
pub trait Sparsifier: Send + Sync {
    fn mode(&self) -> SparsifyMode;

    async fn sparsify(&self, image: &Path) -> Result<()>;
}

/// Build the strategy selected by `config`.
pub fn from_config(
    config: &SparsifyConfig,
    executor: Arc<dyn ProcessExecutor>,
) -> Box<dyn Sparsifier> {
    match config.mode {
        SparsifyMode::Direct => Box::new(DirectSparsifier::from_config(config, executor)),
        SparsifyMode::Remote => Box::new(RemoteSparsifier::from_config(config)),
    }
}

/// Run `op`, logging the running and terminal states.
async fn track<F>(mode: SparsifyMode, image: &Path, op: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tracing::info!(
        mode = %mode,
        image = %image.display(),
        state = %SparsifyState::Running,
        "Sparsifying image"
    );
    let result = op.await;
    match &result {
        Ok(()) => tracing::info!(
            mode = %mode,
            image = %image.display(),
            state = %SparsifyState::Succeeded,
            "Sparsify finished"
        ),
        Err(e) => tracing::error!(
            mode = %mode,
            image = %image.display(),
            state = %SparsifyState::Failed,
            error = %e,
            "Sparsify failed"
        ),
    }
    result
}

/// Runs `virt-sparsify --in-place` on the local image.
pub struct DirectSparsifier {
    executor: Arc<dyn ProcessExecutor>,
    binary: String,
    backend: String,
}

impl DirectSparsifier {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self::from_config(&SparsifyConfig::default(), executor)
    }

    pub fn from_config(config: &SparsifyConfig, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            binary: config.binary.clone(),
            backend: config.backend.clone(),
        }
    }

    /// Request for `image`: in place, verbose, with tracing of guestfs calls.
    pub fn request(&self, image: &Path) -> ExecRequest {
        ExecRequest::new(
            self.binary.clone(),
            vec![
                "--in-place".to_string(),
                "-v".to_string(),
                "-x".to_string(),
                image.display().to_string(),
            ],
        )
        .env("LIBGUESTFS_BACKEND", self.backend.clone())
    }
}

#[async_trait]
impl Sparsifier for DirectSparsifier {
    fn mode(&self) -> SparsifyMode {
        SparsifyMode::Direct
    }

    async fn sparsify(&self, image: &Path) -> Result<()> {
        let request = self.request(image);
        track(self.mode(), image, async {
            self.executor
                .run(&request, &|line: &str| tracing::trace!(line, "virt-sparsify"))
                .await
                .map(|_| ())
        })
        .await
    }
}

/// Calls the sidecar's `Sparsify` RPC over a unix socket.
#[derive(Debug, Clone)]
pub struct RemoteSparsifier {
    socket_path: PathBuf,
    timeout: Duration,
}

impl RemoteSparsifier {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SparsifyConfig) -> Self {
        Self::new(config.socket_path.clone(), config.timeout())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }

    async fn connect(&self) -> Result<VirtSparsifyClient<tonic::transport::Channel>> {
        let connection_error = |message: String| ImportError::ConnectionError {
            endpoint: self.endpoint(),
            message,
        };

        let path = self.socket_path.clone();
        let channel = Endpoint::try_from(UDS_ENDPOINT)
            .map_err(|e| connection_error(e.to_string()))?
            .connect_with_connector(tower::service_fn(move |_: Uri| {
                UnixStream::connect(path.clone())
            }))
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        tracing::debug!(endpoint = %self.endpoint(), "Connected to sparsify sidecar");
        Ok(VirtSparsifyClient::new(channel))
    }

    /// Wait for `connect` until `deadline`. Running out of time while
    /// dialing is a connection failure, not a deadline on the call.
    async fn dial<T, F>(&self, deadline: Instant, connect: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout_at(deadline, connect)
            .await
            .map_err(|_| ImportError::ConnectionError {
                endpoint: self.endpoint(),
                message: format!("not connected within {:?}", self.timeout),
            })?
    }

    async fn call(&self, image: &Path) -> Result<()> {
        let path = image.display().to_string();
        let deadline_exceeded = || ImportError::DeadlineExceeded {
            operation: format!("sparsify of {}", path),
            timeout: self.timeout,
        };

        let deadline = Instant::now() + self.timeout;
        let mut client = self.dial(deadline, self.connect()).await?;
        let request = tonic::Request::new(proto::Image { path: path.clone() });
        match tokio::time::timeout_at(deadline, client.sparsify(request)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => match status.code() {
                tonic::Code::DeadlineExceeded => Err(deadline_exceeded()),
                _ => Err(ImportError::RpcError {
                    path: path.clone(),
                    status,
                }),
            },
            Err(_) => Err(deadline_exceeded()),
        }
    }
}

#[async_trait]
impl Sparsifier for RemoteSparsifier {
    fn mode(&self) -> SparsifyMode {
        SparsifyMode::Remote
    }

    async fn sparsify(&self, image: &Path) -> Result<()> {
        track(self.mode(), image, self.call(image)).await
    }
}
