//! Interactive pharmacy session over the daemon's TCP channel.
//!
//! The flow mirrors the wire contract: the first frame out is the
//! registration, the first frame back is either the status digest
//! (admitted) or a rejection. Once admitted, the loop interleaves typed
//! commands with frames pushed by the daemon; a dedicated reader task
//! decodes frames so a slow typist never stalls a half-read frame.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pharma_protocol::{
    read_message, write_message, ClientRequest, ErrorKind, FrameError, ServerMessage,
};

use crate::command::{parse_line, ConsoleCommand};
use crate::error::{ClientError, Result};
use crate::render;

/// Queue depth between the frame-reader task and the console loop.
const INBOUND_BUFFER: usize = 32;

/// How to reach the daemon and who to register as.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Daemon address, `host:port`.
    pub addr: String,

    /// Registered farmacia name asserted in the handshake.
    pub nombre: String,
}

/// Runs one interactive session until disconnect, revocation, or Ctrl-C.
pub async fn run(config: &ConnectConfig, shutdown: CancellationToken) -> Result<()> {
    info!(addr = %config.addr, nombre = %config.nombre, "connecting");
    let stream = TcpStream::connect(&config.addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: config.addr.clone(),
            source,
        })?;
    let (mut reader, mut writer) = stream.into_split();

    write_message(&mut writer, &ClientRequest::registro(&config.nombre)).await?;

    // The digest doubles as the admission receipt.
    match read_message::<_, ServerMessage>(&mut reader).await? {
        Some(ServerMessage::Resumen { resumen }) => {
            println!("Conectado como '{}'.", config.nombre);
            println!("{}", render::resumen_estado(&resumen));
            println!("Escribe 'ayuda' para ver los comandos.");
        }
        Some(ServerMessage::Rechazo { motivo, .. }) => {
            println!("Conexión rechazada: {motivo}");
            return Err(ClientError::Rejected(motivo));
        }
        Some(ServerMessage::Error { mensaje, .. }) => {
            println!("Error: {mensaje}");
            return Err(ClientError::Rejected(mensaje));
        }
        Some(otro) => {
            return Err(ClientError::UnexpectedResponse(format!("{otro:?}")));
        }
        None => return Err(ClientError::ConnectionClosed),
    }
    info!(nombre = %config.nombre, "session admitted");

    let (mut frames, reader_task) = spawn_frame_reader(reader);
    let result = console_loop(&mut writer, &mut frames, &shutdown).await;
    reader_task.abort();
    info!(nombre = %config.nombre, "session closed");
    result
}

/// Decodes frames off the socket and hands them to the console loop.
///
/// A decode or framing failure is forwarded once and ends the task; the
/// loop decides how loudly to fail.
fn spawn_frame_reader(
    mut reader: OwnedReadHalf,
) -> (
    mpsc::Receiver<std::result::Result<ServerMessage, FrameError>>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
    let handle = tokio::spawn(async move {
        loop {
            match read_message::<_, ServerMessage>(&mut reader).await {
                Ok(Some(message)) => {
                    if tx.send(Ok(message)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
    (rx, handle)
}

/// Alternates between typed lines and daemon frames until either side
/// says goodbye.
///
/// The daemon is free to push a notification between a command and its
/// response; both land on the same terminal in arrival order.
async fn console_loop(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    frames: &mut mpsc::Receiver<std::result::Result<ServerMessage, FrameError>>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("interrupted; sending goodbye");
                let _ = write_message(writer, &ClientRequest::Desconectar).await;
                return Ok(());
            }

            frame = frames.recv() => match frame {
                Some(Ok(message)) => {
                    println!("{}", render::server_message(&message));
                    match message {
                        ServerMessage::Despedida { .. } => return Ok(()),
                        ServerMessage::Error {
                            kind: ErrorKind::Desactivada,
                            ..
                        } => return Ok(()),
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "connection broke");
                    println!("Se perdió la conexión con el servidor.");
                    return Err(e.into());
                }
                None => {
                    println!("El servidor cerró la conexión.");
                    return Ok(());
                }
            },

            line = lines.next_line() => match line? {
                Some(line) => match parse_line(&line) {
                    Ok(ConsoleCommand::Nada) => {}
                    Ok(ConsoleCommand::Ayuda) => println!("{}", render::AYUDA),
                    Ok(ConsoleCommand::Send(request)) => {
                        write_message(writer, &request).await?;
                    }
                    Err(mensaje) => println!("{mensaje}"),
                },
                // Stdin closed (piped input ran out): leave politely.
                None => {
                    debug!("stdin closed; sending goodbye");
                    let _ = write_message(writer, &ClientRequest::Desconectar).await;
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A fake daemon that rejects every registration.
    async fn spawn_rejecting_daemon() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: Option<ClientRequest> = read_message(&mut stream).await.unwrap();
            assert!(matches!(request, Some(ClientRequest::Registro { .. })));
            write_message(&mut stream, &ServerMessage::rechazo("desconocida"))
                .await
                .unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_rejection_surfaces_as_error() {
        let addr = spawn_rejecting_daemon().await;
        let config = ConnectConfig {
            addr,
            nombre: "Fantasma".to_string(),
        };
        let result = run(&config, CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_a_connect_error() {
        // Bind a port, then free it so the connect is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = ConnectConfig {
            addr,
            nombre: "Central".to_string(),
        };
        let result = run(&config, CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_close_before_digest_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _: Option<ClientRequest> = read_message(&mut stream).await.unwrap();
            // Drop without answering.
        });

        let config = ConnectConfig {
            addr,
            nombre: "Central".to_string(),
        };
        let result = run(&config, CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
}
