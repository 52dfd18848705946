//! Fake Porto daemon for integration tests.
//!
//! Serves the supervisor protocol on a unix socket in a temp directory and
//! backs it with a [`MemorySupervisor`], so tests can assert on both the
//! wire behavior and the resulting call sequence.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use porto_state::proto::container_request::Request;
use porto_state::proto::container_response::Response;
use porto_state::proto::{
    ContainerRequest, ContainerResponse, ErrorCode, GetPropertiesResponse, GetStateResponse,
    ListResponse,
};
use porto_state::test_util::MemorySupervisor;
use porto_state::{wire, ClientConfig, PortoClient, Supervisor, SupervisorError};
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// Timeout used by clients built from the harness.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Running fake daemon. Stops when dropped.
pub struct FakePorto {
    pub socket_path: PathBuf,
    pub backend: Arc<MemorySupervisor>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
    _dir: TempDir,
}

impl FakePorto {
    pub async fn start() -> Self {
        Self::start_with(MemorySupervisor::new()).await
    }

    pub async fn start_with(backend: MemorySupervisor) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("portod.socket");
        let listener = UnixListener::bind(&socket_path).expect("bind fake porto socket");

        let backend = Arc::new(backend);
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = {
            let backend = Arc::clone(&backend);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(stream, Arc::clone(&backend)));
                }
            })
        };

        Self {
            socket_path,
            backend,
            connections,
            handle,
            _dir: dir,
        }
    }

    pub fn client(&self) -> PortoClient {
        PortoClient::new(ClientConfig {
            socket_path: self.socket_path.clone(),
            timeout: TEST_TIMEOUT,
        })
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakePorto {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(mut stream: UnixStream, backend: Arc<MemorySupervisor>) {
    while let Ok(Some(request)) = wire::read_message::<_, ContainerRequest>(&mut stream).await {
        let response = dispatch(&backend, request).await;
        if wire::write_message(&mut stream, &response).await.is_err() {
            break;
        }
    }
}

async fn dispatch(backend: &MemorySupervisor, request: ContainerRequest) -> ContainerResponse {
    let result = match request.request {
        Some(Request::List(_)) => backend
            .list()
            .await
            .map(|names| Some(Response::List(ListResponse { names }))),
        Some(Request::Create(r)) => backend.create(&r.name).await.map(|_| None),
        Some(Request::Destroy(r)) => backend.destroy(&r.name).await.map(|_| None),
        Some(Request::Start(r)) => backend.start(&r.name).await.map(|_| None),
        Some(Request::Stop(r)) => backend.stop(&r.name).await.map(|_| None),
        Some(Request::GetState(r)) => backend.get_state(&r.name).await.map(|state| {
            Some(Response::GetState(GetStateResponse {
                state: state.to_string(),
            }))
        }),
        Some(Request::SetProperty(r)) => backend
            .set_property(&r.name, &r.property, &r.value)
            .await
            .map(|_| None),
        Some(Request::GetProperties(r)) => {
            backend.get_properties(&r.name).await.map(|properties| {
                Some(Response::GetProperties(GetPropertiesResponse {
                    properties: properties.into_iter().collect(),
                }))
            })
        }
        None => {
            return error_response(ErrorCode::InvalidMethod as i32, "empty request".to_string())
        }
    };

    match result {
        Ok(response) => ContainerResponse {
            error: ErrorCode::Success as i32,
            error_msg: String::new(),
            response,
        },
        Err(e) => encode_error(e),
    }
}

fn error_response(code: i32, message: String) -> ContainerResponse {
    ContainerResponse {
        error: code,
        error_msg: message,
        response: None,
    }
}

fn encode_error(e: SupervisorError) -> ContainerResponse {
    match e {
        SupervisorError::NotFound(m) => error_response(ErrorCode::ContainerDoesNotExist as i32, m),
        SupervisorError::AlreadyExists(m) => {
            error_response(ErrorCode::ContainerAlreadyExists as i32, m)
        }
        SupervisorError::InvalidState(m) => error_response(ErrorCode::InvalidState as i32, m),
        SupervisorError::PropertyRejected { message, .. } => {
            error_response(ErrorCode::InvalidValue as i32, message)
        }
        SupervisorError::Supervisor { code, message } => error_response(code, message),
        SupervisorError::Connection(m) => error_response(ErrorCode::Unknown as i32, m),
    }
}

/// Socket that accepts connections and answers every request with
/// `response`, or never answers when `response` is `None`.
pub struct ScriptedPorto {
    pub socket_path: PathBuf,
    handle: JoinHandle<()>,
    _dir: TempDir,
}

impl ScriptedPorto {
    pub async fn start(response: Option<ContainerResponse>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("portod.socket");
        let listener = UnixListener::bind(&socket_path).expect("bind scripted socket");

        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let request =
                        wire::read_message::<_, ContainerRequest>(&mut stream).await;
                    match (request, response) {
                        (Ok(Some(_)), Some(response)) => {
                            let _ = wire::write_message(&mut stream, &response).await;
                        }
                        // Hold the connection open without answering
                        _ => tokio::time::sleep(Duration::from_secs(3600)).await,
                    }
                });
            }
        });

        Self {
            socket_path,
            handle,
            _dir: dir,
        }
    }

    pub fn client(&self, timeout: Duration) -> PortoClient {
        PortoClient::new(ClientConfig {
            socket_path: self.socket_path.clone(),
            timeout,
        })
    }
}

impl Drop for ScriptedPorto {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
