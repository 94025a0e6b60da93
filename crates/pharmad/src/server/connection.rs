//! Connection handler for individual pharmacy clients.
//!
//! Each accepted TCP connection gets its own `ConnectionHandler` that:
//! - Runs the admission handshake (first frame must be `Registro`)
//! - Claims the farmacia's session slot in the registry
//! - Serves inventory and notification requests
//! - Interleaves pushed notifications with request/response traffic
//!
//! Inbound frames are read by a dedicated task and handed over through a
//! channel, so a pushed write never cancels a read mid-frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pharma_core::{Farmacia, FarmaciaId, MotivoBaja, NotificacionId, TipoNotificacion};
use pharma_protocol::{
    read_frame_limited, write_message, ClientRequest, ErrorKind, FrameError, ProtocolVersion,
    ServerMessage,
};
use pharma_store::{CambiosMedicamento, Store, StoreError};

use crate::registry::{RegistryError, RegistryHandle};
use crate::scheduler::{Job, SchedulerHandle};

use super::MAX_FRAME_BYTES;

/// Time allowed for the first frame; a socket that never registers is
/// dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue depth for notifications pushed to one session.
const OUTBOUND_BUFFER: usize = 32;

/// Queue depth between the frame-reader task and the session loop.
const INBOUND_BUFFER: usize = 8;

/// Rows returned by a history request.
const HISTORIAL_LIMIT: u32 = 50;

/// Errors that end a client connection abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("write timed out")]
    WriteTimeout,
}

/// A session that passed admission.
struct AdmittedSession {
    farmacia: Farmacia,
    identity: String,
    /// Notifications routed to this session by the registry.
    outbound: mpsc::Receiver<ServerMessage>,
    /// Cancelled when an administrative action revokes the session.
    token: CancellationToken,
}

/// Handler for a single pharmacy connection.
pub struct ConnectionHandler {
    store: Arc<dyn Store>,
    registry: RegistryHandle,
    scheduler: SchedulerHandle,
    /// Daemon-wide shutdown signal.
    shutdown: CancellationToken,
    peer: SocketAddr,
}

impl ConnectionHandler {
    pub fn new(
        store: Arc<dyn Store>,
        registry: RegistryHandle,
        scheduler: SchedulerHandle,
        shutdown: CancellationToken,
        peer: SocketAddr,
    ) -> Self {
        Self {
            store,
            registry,
            scheduler,
            shutdown,
            peer,
        }
    }

    /// Drives the connection from handshake to teardown.
    ///
    /// Rejections during admission are answered and reported as `Ok`;
    /// only transport-level failures surface as errors.
    pub async fn run(&self, stream: TcpStream) -> Result<(), ConnectionError> {
        debug!(peer = %self.peer, "connection opened");
        let (mut reader, mut writer) = stream.into_split();

        let Some(mut session) = self.handshake(&mut reader, &mut writer).await? else {
            return Ok(());
        };

        let (mut inbound, reader_task) = spawn_frame_reader(reader);
        let result = self.serve(&mut writer, &mut inbound, &mut session).await;
        reader_task.abort();

        // Idempotent: a revoked session is already gone from the registry.
        if let Err(e) = self.registry.remove(&session.identity).await {
            debug!(identity = %session.identity, error = %e, "session already released");
        }
        info!(farmacia = %session.farmacia.nombre, peer = %self.peer, "session closed");
        result
    }

    /// Validates the registration frame and claims the session slot.
    ///
    /// Returns `Ok(None)` when the client was rejected (the reason has
    /// already been written back) or disconnected before registering.
    async fn handshake(
        &self,
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
    ) -> Result<Option<AdmittedSession>, ConnectionError> {
        let leido = timeout(HANDSHAKE_TIMEOUT, read_frame_limited(reader, MAX_FRAME_BYTES))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)?;
        let payload = match leido? {
            Some(payload) => payload,
            None => {
                debug!(peer = %self.peer, "closed before registering");
                return Ok(None);
            }
        };

        let (protocol_version, nombre_farmacia) = match serde_json::from_slice(&payload) {
            Ok(ClientRequest::Registro {
                protocol_version,
                nombre_farmacia,
            }) => (protocol_version, nombre_farmacia),
            Ok(_) => {
                warn!(peer = %self.peer, "first frame was not a registration");
                send(
                    writer,
                    &ServerMessage::error(
                        ErrorKind::Protocol,
                        "El primer mensaje debe ser el registro de la farmacia.",
                    ),
                )
                .await?;
                return Ok(None);
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "unreadable registration frame");
                send(writer, &respuesta_no_reconocido(&payload)).await?;
                return Ok(None);
            }
        };

        let nombre = nombre_farmacia.trim();
        if nombre.is_empty() {
            send(
                writer,
                &ServerMessage::error(
                    ErrorKind::Validation,
                    "Nombre de farmacia vacío. Cerrando conexión.",
                ),
            )
            .await?;
            return Ok(None);
        }

        if !protocol_version.is_compatible_with(&ProtocolVersion::CURRENT) {
            info!(peer = %self.peer, version = %protocol_version, "rejected: incompatible protocol");
            send(
                writer,
                &ServerMessage::rechazo(format!(
                    "Versión de protocolo {protocol_version} incompatible con la versión del servidor {}.",
                    ProtocolVersion::CURRENT
                )),
            )
            .await?;
            return Ok(None);
        }

        let farmacia = match self.store.get_farmacia(nombre).await {
            Ok(Some(farmacia)) => farmacia,
            Ok(None) => {
                info!(peer = %self.peer, nombre, "rejected: unknown farmacia");
                send(
                    writer,
                    &ServerMessage::rechazo(format!(
                        "La farmacia '{nombre}' no está registrada en el sistema."
                    )),
                )
                .await?;
                return Ok(None);
            }
            Err(e) => {
                send(writer, &error_respuesta(&e)).await?;
                return Ok(None);
            }
        };

        if !farmacia.activo {
            info!(peer = %self.peer, farmacia = %farmacia.nombre, "rejected: farmacia deactivated");
            send(
                writer,
                &ServerMessage::rechazo(format!(
                    "La farmacia '{}' está desactivada.",
                    farmacia.nombre
                )),
            )
            .await?;
            return Ok(None);
        }

        let identity = farmacia.registry_key();
        let (outbound_tx, outbound) = mpsc::channel(OUTBOUND_BUFFER);
        let token = CancellationToken::new();
        match self
            .registry
            .admit(farmacia.id, identity.clone(), outbound_tx, token.clone())
            .await
        {
            Ok(()) => {}
            Err(RegistryError::DuplicateSession(_)) => {
                info!(peer = %self.peer, farmacia = %farmacia.nombre, "rejected: session already live");
                send(
                    writer,
                    &ServerMessage::rechazo(format!(
                        "Ya existe una sesión activa para la farmacia '{}'.",
                        farmacia.nombre
                    )),
                )
                .await?;
                return Ok(None);
            }
            Err(e) => {
                error!(peer = %self.peer, error = %e, "registry unavailable during admission");
                send(
                    writer,
                    &ServerMessage::error(ErrorKind::StoreUnavailable, "Error interno del servidor."),
                )
                .await?;
                return Ok(None);
            }
        }

        // The digest is the admission receipt. If it cannot be produced,
        // the slot is released instead of leaving a half-open session.
        let resumen = match self.store.resumen_estado(farmacia.id).await {
            Ok(resumen) => resumen,
            Err(e) => {
                let _ = self.registry.remove(&identity).await;
                send(writer, &error_respuesta(&e)).await?;
                return Ok(None);
            }
        };
        send(writer, &ServerMessage::resumen(resumen)).await?;

        info!(peer = %self.peer, farmacia = %farmacia.nombre, "session registered");
        Ok(Some(AdmittedSession {
            farmacia,
            identity,
            outbound,
            token,
        }))
    }

    /// Serves an admitted session until disconnect, revocation, or
    /// daemon shutdown.
    async fn serve(
        &self,
        writer: &mut OwnedWriteHalf,
        inbound: &mut mpsc::Receiver<Result<Vec<u8>, FrameError>>,
        session: &mut AdmittedSession,
    ) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                // Revocation outranks the push queue so a forced close
                // reports its reason before the channel drains to None.
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!(farmacia = %session.farmacia.nombre, "daemon shutting down; closing session");
                    return Ok(());
                }

                _ = session.token.cancelled() => {
                    send(
                        writer,
                        &ServerMessage::error(
                            ErrorKind::Desactivada,
                            "Tu farmacia fue desactivada por el administrador. Conexión cerrada.",
                        ),
                    )
                    .await?;
                    info!(farmacia = %session.farmacia.nombre, "session revoked");
                    return Ok(());
                }

                pushed = session.outbound.recv() => match pushed {
                    Some(message) => send(writer, &message).await?,
                    None => {
                        debug!(farmacia = %session.farmacia.nombre, "registry dropped the session");
                        return Ok(());
                    }
                },

                frame = inbound.recv() => match frame {
                    Some(Ok(payload)) => {
                        if !self.handle_frame(writer, &session.farmacia, &payload).await? {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        warn!(farmacia = %session.farmacia.nombre, error = %e, "framing broke; closing session");
                        return Err(e.into());
                    }
                    None => {
                        info!(farmacia = %session.farmacia.nombre, "client disconnected");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Decodes and answers one frame. Returns `false` when the client
    /// asked to disconnect.
    async fn handle_frame(
        &self,
        writer: &mut OwnedWriteHalf,
        farmacia: &Farmacia,
        payload: &[u8],
    ) -> Result<bool, ConnectionError> {
        let request: ClientRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(farmacia = %farmacia.nombre, error = %e, "unreadable frame");
                send(writer, &respuesta_no_reconocido(payload)).await?;
                return Ok(true);
            }
        };

        if matches!(request, ClientRequest::Desconectar) {
            send(writer, &ServerMessage::despedida("Hasta pronto.")).await?;
            info!(farmacia = %farmacia.nombre, "client said goodbye");
            return Ok(false);
        }

        let respuesta = self.dispatch(farmacia, request).await;
        send(writer, &respuesta).await?;
        Ok(true)
    }

    async fn dispatch(&self, farmacia: &Farmacia, request: ClientRequest) -> ServerMessage {
        let farmacia_id = farmacia.id;
        match request {
            ClientRequest::Registro { .. } => {
                ServerMessage::error(ErrorKind::Protocol, "La sesión ya fue registrada.")
            }

            ClientRequest::CrearMedicamento {
                codigo,
                nombre,
                fecha_vencimiento,
            } => match self
                .store
                .crear_medicamento(farmacia_id, &codigo, &nombre, fecha_vencimiento)
                .await
            {
                Ok(medicamento) => {
                    let mensaje = format!(
                        "Medicamento '{}' (código: {}) agregado al inventario.",
                        medicamento.nombre, medicamento.codigo
                    );
                    info!(farmacia = %farmacia.nombre, codigo = %medicamento.codigo, "medicamento created");
                    self.notificar_evento(
                        farmacia_id,
                        TipoNotificacion::Creacion,
                        &mensaje,
                        &medicamento.codigo,
                    );
                    ServerMessage::confirmacion(mensaje)
                }
                Err(e) => error_respuesta(&e),
            },

            ClientRequest::ListarMedicamentos => {
                match self.store.listar_medicamentos(farmacia_id).await {
                    Ok(medicamentos) => ServerMessage::Medicamentos { medicamentos },
                    Err(e) => error_respuesta(&e),
                }
            }

            ClientRequest::BuscarMedicamento { codigo } => {
                match self.store.buscar_medicamento(farmacia_id, &codigo).await {
                    Ok(Some(medicamento)) => ServerMessage::medicamento(medicamento),
                    Ok(None) => ServerMessage::error(
                        ErrorKind::NotFound,
                        format!("No existe ningún medicamento con el código '{codigo}'."),
                    ),
                    Err(e) => error_respuesta(&e),
                }
            }

            ClientRequest::ActualizarMedicamento {
                codigo,
                nombre,
                fecha_vencimiento,
            } => {
                let cambios = CambiosMedicamento {
                    nombre,
                    fecha_vencimiento,
                };
                match self
                    .store
                    .actualizar_medicamento(farmacia_id, &codigo, cambios)
                    .await
                {
                    Ok(medicamento) => {
                        let mensaje = format!(
                            "Medicamento '{}' actualizado en el inventario.",
                            medicamento.codigo
                        );
                        info!(farmacia = %farmacia.nombre, codigo = %medicamento.codigo, "medicamento updated");
                        self.notificar_evento(
                            farmacia_id,
                            TipoNotificacion::Actualizacion,
                            &mensaje,
                            &medicamento.codigo,
                        );
                        ServerMessage::confirmacion(mensaje)
                    }
                    Err(e) => error_respuesta(&e),
                }
            }

            ClientRequest::EliminarMedicamento { codigo } => {
                match self
                    .store
                    .eliminar_medicamento(farmacia_id, &codigo, MotivoBaja::EliminadoManual)
                    .await
                {
                    Ok(medicamento) => {
                        let mensaje = format!(
                            "Medicamento '{}' eliminado del inventario.",
                            medicamento.codigo
                        );
                        warn!(farmacia = %farmacia.nombre, codigo = %medicamento.codigo, "medicamento removed by the client");
                        self.notificar_evento(
                            farmacia_id,
                            TipoNotificacion::Eliminacion,
                            &mensaje,
                            &medicamento.codigo,
                        );
                        ServerMessage::confirmacion(mensaje)
                    }
                    Err(e) => error_respuesta(&e),
                }
            }

            ClientRequest::VerNotificaciones { solo_no_leidas } => {
                self.ver_notificaciones(farmacia_id, solo_no_leidas).await
            }

            ClientRequest::ConfigurarUmbral { umbral_dias } => {
                match self.store.configurar_umbral(farmacia_id, umbral_dias).await {
                    Ok(cambio) if cambio.cambiado() => {
                        info!(
                            farmacia = %farmacia.nombre,
                            anterior = cambio.anterior,
                            nuevo = cambio.nuevo,
                            "umbral updated"
                        );
                        ServerMessage::confirmacion(format!(
                            "Umbral actualizado de {} a {} días.",
                            cambio.anterior, cambio.nuevo
                        ))
                    }
                    Ok(cambio) => ServerMessage::confirmacion(format!(
                        "El umbral ya estaba configurado en {} días. No se realizaron cambios.",
                        cambio.nuevo
                    )),
                    Err(e) => error_respuesta(&e),
                }
            }

            ClientRequest::ResumenEstado => match self.store.resumen_estado(farmacia_id).await {
                Ok(resumen) => ServerMessage::resumen(resumen),
                Err(e) => error_respuesta(&e),
            },

            // Intercepted in handle_frame; kept for exhaustiveness.
            ClientRequest::Desconectar => ServerMessage::despedida("Hasta pronto."),
        }
    }

    /// Fetches the history and marks the returned rows read.
    async fn ver_notificaciones(
        &self,
        farmacia_id: FarmaciaId,
        solo_no_leidas: bool,
    ) -> ServerMessage {
        let notificaciones = match self
            .store
            .notificaciones_recientes(farmacia_id, solo_no_leidas, HISTORIAL_LIMIT)
            .await
        {
            Ok(notificaciones) => notificaciones,
            Err(e) => return error_respuesta(&e),
        };

        // Reading the history acknowledges exactly the rows handed over.
        let sin_leer: Vec<NotificacionId> = notificaciones
            .iter()
            .filter(|n| !n.leida)
            .map(|n| n.id)
            .collect();
        if !sin_leer.is_empty() {
            if let Err(e) = self.store.marcar_leidas(&sin_leer).await {
                warn!(error = %e, "history fetched but could not be marked read");
            }
        }

        ServerMessage::Notificaciones { notificaciones }
    }

    /// Queues the history entry for a CRUD event. The confirmation is
    /// already on its way; losing the notice only costs a history row.
    fn notificar_evento(
        &self,
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: &str,
        codigo: &str,
    ) {
        let job = Job::Notify {
            farmacia_id,
            tipo,
            mensaje: mensaje.to_string(),
            codigo: Some(codigo.to_string()),
        };
        if let Err(e) = self.scheduler.enqueue(job) {
            warn!(error = %e, "event notification dropped");
        }
    }
}

/// Moves frame reads onto their own task so the session loop can select
/// over pushes without cancelling a read mid-frame.
fn spawn_frame_reader<R>(
    mut reader: R,
) -> (mpsc::Receiver<Result<Vec<u8>, FrameError>>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
    let task = tokio::spawn(async move {
        loop {
            match read_frame_limited(&mut reader, MAX_FRAME_BYTES).await {
                Ok(Some(payload)) => {
                    if tx.send(Ok(payload)).await.is_err() {
                        break;
                    }
                }
                // Clean close; dropping the sender signals it.
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
    (rx, task)
}

async fn send(writer: &mut OwnedWriteHalf, message: &ServerMessage) -> Result<(), ConnectionError> {
    match timeout(WRITE_TIMEOUT, write_message(writer, message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Maps store failures onto the wire vocabulary. Internal faults are
/// logged in full and answered generically.
fn error_respuesta(error: &StoreError) -> ServerMessage {
    match error {
        StoreError::Validation(mensaje) => {
            ServerMessage::error(ErrorKind::Validation, mensaje.clone())
        }
        StoreError::NotFound(mensaje) => ServerMessage::error(ErrorKind::NotFound, mensaje.clone()),
        StoreError::Unavailable(_) => {
            ServerMessage::error(ErrorKind::StoreUnavailable, error.to_string())
        }
        StoreError::Migration(_) | StoreError::Database(_) => {
            error!(error = %error, "internal store failure");
            ServerMessage::error(ErrorKind::StoreUnavailable, "Error interno del servidor.")
        }
    }
}

/// Error for a frame that parsed as JSON with an unknown command, or did
/// not parse at all.
fn respuesta_no_reconocido(payload: &[u8]) -> ServerMessage {
    let comando = serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));
    match comando {
        Some(comando) => ServerMessage::error(
            ErrorKind::Protocol,
            format!("Comando '{comando}' no reconocido."),
        ),
        None => ServerMessage::error(ErrorKind::Protocol, "Mensaje no reconocido."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_respuesta_preserva_textos_de_validacion() {
        let error = StoreError::Validation("El código del medicamento no puede estar vacío.".into());
        let respuesta = error_respuesta(&error);
        match respuesta {
            ServerMessage::Error { kind, mensaje } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert_eq!(mensaje, "El código del medicamento no puede estar vacío.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn error_respuesta_oculta_fallas_internas() {
        let error = StoreError::Migration("no such table: medicamentos".into());
        match error_respuesta(&error) {
            ServerMessage::Error { kind, mensaje } => {
                assert_eq!(kind, ErrorKind::StoreUnavailable);
                assert_eq!(mensaje, "Error interno del servidor.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn comando_desconocido_se_nombra_en_la_respuesta() {
        let payload = br#"{"type": "reiniciar_servidor"}"#;
        match respuesta_no_reconocido(payload) {
            ServerMessage::Error { kind, mensaje } => {
                assert_eq!(kind, ErrorKind::Protocol);
                assert_eq!(mensaje, "Comando 'reiniciar_servidor' no reconocido.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn basura_no_json_recibe_respuesta_generica() {
        match respuesta_no_reconocido(b"\x00\x01garbage") {
            ServerMessage::Error { kind, mensaje } => {
                assert_eq!(kind, ErrorKind::Protocol);
                assert_eq!(mensaje, "Mensaje no reconocido.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn frame_reader_entrega_frames_y_eof() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (mut rx, _task) = spawn_frame_reader(server);

        write_message(&mut client, &ClientRequest::ListarMedicamentos)
            .await
            .expect("write frame");
        let payload = rx
            .recv()
            .await
            .expect("reader alive")
            .expect("frame decoded");
        let request: ClientRequest = serde_json::from_slice(&payload).expect("json");
        assert!(matches!(request, ClientRequest::ListarMedicamentos));

        drop(client);
        assert!(rx.recv().await.is_none(), "EOF closes the channel");
    }

    #[tokio::test]
    async fn frame_reader_reporta_frames_truncados() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (mut rx, _task) = spawn_frame_reader(server);

        use tokio::io::AsyncWriteExt;
        // Declares 100 bytes but delivers only 3.
        client
            .write_all(&[0, 0, 0, 100, b'a', b'b', b'c'])
            .await
            .expect("write partial frame");
        drop(client);

        match rx.recv().await {
            Some(Err(FrameError::Truncated { .. })) => {}
            other => panic!("expected truncated frame error, got {other:?}"),
        }
    }
}
