use core::error::Error;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tower::service_fn;

#[derive(Debug, Display)]
pub enum ConnectError {
    #[display("failed to connect to socket {path}")]
    Socket { path: String },
    #[display("invalid containerd namespace '{namespace}'")]
    InvalidNamespace { namespace: String },
}

impl Error for ConnectError {}

/// Opens a gRPC channel over the unix socket at `socket_path`.
///
/// # Errors
///
/// - [`ConnectError::Socket`] if the socket cannot be connected
pub async fn connect_uds(socket_path: &Path) -> Result<Channel, Report<ConnectError>> {
    let path: PathBuf = socket_path.to_path_buf();

    // The URI is a placeholder, the connector always dials the socket
    let channel = Endpoint::from_static("http://tonic")
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                match UnixStream::connect(path).await {
                    Ok(stream) => Ok(TokioIo::new(stream)),
                    Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
                }
            }
        }))
        .await
        .change_context_lazy(|| ConnectError::Socket {
            path: socket_path.display().to_string(),
        })?;

    Ok(channel)
}
