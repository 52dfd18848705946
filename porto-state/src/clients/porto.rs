//! Client for the Porto daemon socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

use super::{ContainerState, Properties, Supervisor};
use crate::error::{Result, SupervisorError};
use crate::proto::container_request::Request;
use crate::proto::container_response::Response;
use crate::proto::{
    ContainerRequest, ContainerResponse, CreateRequest, DestroyRequest, ErrorCode,
    GetPropertiesRequest, GetStateRequest, ListRequest, SetPropertyRequest, StartRequest,
    StopRequest,
};
use crate::wire;

/// Default Porto socket.
pub const DEFAULT_SOCKET: &str = "/run/portod.socket";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection settings for [`PortoClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    /// Bound on connect + request + response for a single primitive.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One open supervisor connection. Dropping it closes the socket.
struct Connection {
    stream: UnixStream,
}

impl Connection {
    async fn open(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            SupervisorError::Connection(format!("{}: {}", socket_path.display(), e))
        })?;
        debug!(socket = %socket_path.display(), "Connected to supervisor");
        Ok(Self { stream })
    }

    async fn call(&mut self, request: ContainerRequest) -> Result<ContainerResponse> {
        wire::write_message(&mut self.stream, &request).await?;
        wire::read_message(&mut self.stream)
            .await?
            .ok_or_else(|| {
                SupervisorError::Connection("supervisor closed connection without response".into())
            })
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Supervisor connection shutdown failed");
        }
    }
}

/// Client for interacting with the Porto daemon.
///
/// Holds no connection between calls: every primitive connects, performs a
/// single request and disconnects.
#[derive(Debug, Clone)]
pub struct PortoClient {
    config: ClientConfig,
}

impl PortoClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform one round trip and map the response error code.
    ///
    /// `property` marks `SetProperty` calls for error mapping.
    async fn request(&self, request: Request, property: Option<&str>) -> Result<Option<Response>> {
        let socket_path = &self.config.socket_path;

        let exchange = async {
            let mut conn = Connection::open(socket_path).await?;
            let response = conn
                .call(ContainerRequest {
                    request: Some(request),
                })
                .await;
            conn.close().await;
            response
        };

        let response = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| {
                SupervisorError::Connection(format!(
                    "no response from {} within {:?}",
                    socket_path.display(),
                    self.config.timeout
                ))
            })??;

        if response.error != ErrorCode::Success as i32 {
            return Err(SupervisorError::from_response(
                response.error,
                response.error_msg,
                property,
            ));
        }

        Ok(response.response)
    }

    /// Perform a request whose successful response carries no payload.
    async fn command(&self, request: Request) -> Result<()> {
        self.request(request, None).await.map(|_| ())
    }
}

fn unexpected(response: Option<Response>) -> SupervisorError {
    SupervisorError::Connection(format!("unexpected response payload: {:?}", response))
}

#[async_trait]
impl Supervisor for PortoClient {
    async fn list(&self) -> Result<Vec<String>> {
        debug!("Listing containers");
        match self.request(Request::List(ListRequest {}), None).await? {
            Some(Response::List(list)) => Ok(list.names),
            other => Err(unexpected(other)),
        }
    }

    async fn get_state(&self, name: &str) -> Result<ContainerState> {
        debug!(container = %name, "Getting container state");
        let request = Request::GetState(GetStateRequest {
            name: name.to_string(),
        });
        match self.request(request, None).await? {
            Some(Response::GetState(state)) => Ok(ContainerState::from(state.state.as_str())),
            other => Err(unexpected(other)),
        }
    }

    async fn create(&self, name: &str) -> Result<()> {
        debug!(container = %name, "Creating container");
        self.command(Request::Create(CreateRequest {
            name: name.to_string(),
        }))
        .await
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        debug!(container = %name, "Destroying container");
        self.command(Request::Destroy(DestroyRequest {
            name: name.to_string(),
        }))
        .await
    }

    async fn start(&self, name: &str) -> Result<()> {
        debug!(container = %name, "Starting container");
        self.command(Request::Start(StartRequest {
            name: name.to_string(),
        }))
        .await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        debug!(container = %name, "Stopping container");
        self.command(Request::Stop(StopRequest {
            name: name.to_string(),
        }))
        .await
    }

    async fn set_property(&self, name: &str, key: &str, value: &str) -> Result<()> {
        debug!(container = %name, property = %key, "Setting container property");
        let request = Request::SetProperty(SetPropertyRequest {
            name: name.to_string(),
            property: key.to_string(),
            value: value.to_string(),
        });
        self.request(request, Some(key)).await.map(|_| ())
    }

    async fn get_properties(&self, name: &str) -> Result<Properties> {
        debug!(container = %name, "Getting container properties");
        let request = Request::GetProperties(GetPropertiesRequest {
            name: name.to_string(),
        });
        match self.request(request, None).await? {
            Some(Response::GetProperties(props)) => Ok(props.properties.into_iter().collect()),
            other => Err(unexpected(other)),
        }
    }
}
