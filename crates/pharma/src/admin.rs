//! One-shot administrative requests over the daemon's Unix socket.
//!
//! The admin channel carries exactly one exchange per connection: write
//! the request frame, read the response frame, close. No session state
//! lives on this socket, so every call here is self-contained.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::debug;

use pharma_protocol::{read_message, write_message, AdminRequest, AdminResponse};

use crate::error::{ClientError, Result};

/// Sends one request and returns the daemon's answer.
pub async fn request(socket_path: &Path, request: &AdminRequest) -> Result<AdminResponse> {
    debug!(socket = %socket_path.display(), "opening admin connection");
    let mut stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                addr: socket_path.display().to_string(),
                source,
            })?;

    write_message(&mut stream, request).await?;

    match read_message::<_, AdminResponse>(&mut stream).await? {
        Some(response) => Ok(response),
        None => Err(ClientError::ConnectionClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_one_shot_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("admin.sock");

        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: Option<AdminRequest> = read_message(&mut stream).await.unwrap();
            assert!(matches!(request, Some(AdminRequest::Status)));
            write_message(
                &mut stream,
                &AdminResponse::Status {
                    farmacias_conectadas: vec!["central".to_string()],
                    total_conectadas: 1,
                },
            )
            .await
            .unwrap();
        });

        let response = request(&socket, &AdminRequest::Status).await.unwrap();
        match response {
            AdminResponse::Status {
                total_conectadas, ..
            } => assert_eq!(total_conectadas, 1),
            otro => panic!("Expected Status, got {otro:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_socket_is_a_connect_error() {
        let result = request(
            Path::new("/tmp/pharma-admin-test-missing.sock"),
            &AdminRequest::Estadisticas,
        )
        .await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
