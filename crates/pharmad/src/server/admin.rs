//! Request handler for the administrative channel.
//!
//! One exchange per connection: read a single [`AdminRequest`] frame,
//! answer with one [`AdminResponse`] frame, close. The socket carries no
//! session state, so every command names its target farmacia explicitly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pharma_core::registry_key;
use pharma_protocol::{read_frame_limited, write_message, AdminRequest, AdminResponse, Tarea};
use pharma_store::{Store, StoreError};

use crate::registry::RegistryHandle;
use crate::scheduler::{Job, SchedulerHandle};

use super::MAX_FRAME_BYTES;

/// The console is local; a connection that stalls this long is dead.
const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves one console connection end to end.
pub(crate) async fn handle_connection(
    mut stream: UnixStream,
    store: Arc<dyn Store>,
    registry: RegistryHandle,
    scheduler: SchedulerHandle,
) {
    let payload = match timeout(ADMIN_TIMEOUT, read_frame_limited(&mut stream, MAX_FRAME_BYTES))
        .await
    {
        Ok(Ok(Some(payload))) => payload,
        // A probe that connects and closes without sending anything.
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            warn!(error = %e, "unreadable admin frame");
            return;
        }
        Err(_) => {
            warn!("admin connection timed out");
            return;
        }
    };

    let response = match serde_json::from_slice::<AdminRequest>(&payload) {
        Ok(request) => dispatch(request, &store, &registry, &scheduler).await,
        Err(e) => {
            debug!(error = %e, "unreadable admin request");
            respuesta_no_reconocida(&payload)
        }
    };

    match timeout(ADMIN_TIMEOUT, write_message(&mut stream, &response)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to answer the admin console"),
        Err(_) => warn!("admin response write timed out"),
    }
}

async fn dispatch(
    request: AdminRequest,
    store: &Arc<dyn Store>,
    registry: &RegistryHandle,
    scheduler: &SchedulerHandle,
) -> AdminResponse {
    match request {
        AdminRequest::CrearFarmacia { nombre } => match store.crear_farmacia(&nombre).await {
            Ok(farmacia) => {
                info!(farmacia = %farmacia.nombre, id = %farmacia.id, "farmacia created");
                AdminResponse::ok(format!(
                    "Farmacia '{}' creada con id={}.",
                    farmacia.nombre, farmacia.id
                ))
            }
            Err(e) => AdminResponse::error(texto_de_error(&e)),
        },

        AdminRequest::ListarFarmacias => match store.listar_farmacias().await {
            Ok(farmacias) => AdminResponse::Farmacias { farmacias },
            Err(e) => AdminResponse::error(texto_de_error(&e)),
        },

        AdminRequest::RenombrarFarmacia {
            nombre_actual,
            nombre_nuevo,
        } => {
            match store
                .renombrar_farmacia(&nombre_actual, &nombre_nuevo)
                .await
            {
                Ok(farmacia) => {
                    // Admission keys on the name, so a session admitted
                    // under the old spelling now holds a stale identity.
                    let identidad_vieja = registry_key(&nombre_actual);
                    if registry.force_close(&identidad_vieja).await {
                        warn!(identity = %identidad_vieja, "live session closed by rename");
                    }
                    info!(
                        anterior = %nombre_actual.trim(),
                        nuevo = %farmacia.nombre,
                        "farmacia renamed"
                    );
                    AdminResponse::ok(format!(
                        "Farmacia renombrada de '{}' a '{}'.",
                        nombre_actual.trim(),
                        farmacia.nombre
                    ))
                }
                Err(e) => AdminResponse::error(texto_de_error(&e)),
            }
        }

        AdminRequest::DesactivarFarmacia { nombre } => {
            match store.desactivar_farmacia(&nombre).await {
                Ok(cambio) if cambio.cambiado => {
                    let identidad = cambio.farmacia.registry_key();
                    if registry.force_close(&identidad).await {
                        warn!(
                            farmacia = %cambio.farmacia.nombre,
                            "deactivated farmacia had a live session; closed"
                        );
                    }
                    info!(farmacia = %cambio.farmacia.nombre, "farmacia deactivated");
                    AdminResponse::ok(format!(
                        "Farmacia '{}' desactivada.",
                        cambio.farmacia.nombre
                    ))
                }
                Ok(cambio) => AdminResponse::error(format!(
                    "La farmacia '{}' ya estaba desactivada.",
                    cambio.farmacia.nombre
                )),
                Err(e) => AdminResponse::error(texto_de_error(&e)),
            }
        }

        AdminRequest::ActivarFarmacia { nombre } => match store.activar_farmacia(&nombre).await {
            Ok(cambio) if cambio.cambiado => {
                info!(farmacia = %cambio.farmacia.nombre, "farmacia reactivated");
                AdminResponse::ok(format!(
                    "Farmacia '{}' reactivada exitosamente.",
                    cambio.farmacia.nombre
                ))
            }
            Ok(cambio) => AdminResponse::error(format!(
                "La farmacia '{}' ya estaba activa.",
                cambio.farmacia.nombre
            )),
            Err(e) => AdminResponse::error(texto_de_error(&e)),
        },

        AdminRequest::Estadisticas => {
            let hoy = Utc::now().date_naive();
            match store.estadisticas(hoy).await {
                Ok(estadisticas) => AdminResponse::Estadisticas { estadisticas },
                Err(e) => AdminResponse::error(texto_de_error(&e)),
            }
        }

        AdminRequest::Status => {
            let farmacias_conectadas = registry.connected().await;
            let total_conectadas = farmacias_conectadas.len();
            info!(total_conectadas, "status requested");
            AdminResponse::Status {
                farmacias_conectadas,
                total_conectadas,
            }
        }

        AdminRequest::RunTarea { tarea } => {
            let job = match tarea {
                Tarea::VerificarVencimientos => Job::ExpirationScan,
                Tarea::LimpiarNotificaciones => Job::PurgeNotificaciones,
            };
            // The reply names the internal task, which for the cleanup
            // alias differs from the request spelling.
            let nombre = job.nombre();
            match scheduler.enqueue(job) {
                Ok(()) => {
                    info!(tarea = %tarea, "task enqueued by the admin console");
                    AdminResponse::ok(format!("Tarea '{nombre}' encolada."))
                }
                Err(e) => {
                    warn!(tarea = %tarea, error = %e, "admin task rejected");
                    AdminResponse::error(format!("No se pudo encolar la tarea '{nombre}': {e}."))
                }
            }
        }
    }
}

/// The console is trusted, so internal faults keep their detail.
fn texto_de_error(error: &StoreError) -> String {
    match error {
        StoreError::Validation(mensaje) | StoreError::NotFound(mensaje) => mensaje.clone(),
        StoreError::Unavailable(_) => error.to_string(),
        StoreError::Migration(_) | StoreError::Database(_) => {
            format!("Error interno del servidor: {error}")
        }
    }
}

fn respuesta_no_reconocida(payload: &[u8]) -> AdminResponse {
    let accion = serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));
    match accion {
        Some(accion) => AdminResponse::error(format!("Acción '{accion}' no reconocida.")),
        None => AdminResponse::error("Acción no reconocida."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;
    use crate::config::SchedulerConfig;
    use crate::registry::spawn_registry;
    use crate::scheduler::spawn_scheduler;
    use pharma_store::SqliteStore;
    use tokio_util::sync::CancellationToken;

    async fn entorno() -> (Arc<dyn Store>, RegistryHandle, SchedulerHandle) {
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
        let registry = spawn_registry();
        let scheduler = spawn_scheduler(
            Arc::clone(&store),
            NotificationBus::new(),
            &SchedulerConfig::default(),
            CancellationToken::new(),
        );
        (store, registry, scheduler)
    }

    #[tokio::test]
    async fn crear_farmacia_responde_con_id() {
        let (store, registry, scheduler) = entorno().await;
        let respuesta = dispatch(
            AdminRequest::CrearFarmacia {
                nombre: "Central".into(),
            },
            &store,
            &registry,
            &scheduler,
        )
        .await;
        match respuesta {
            AdminResponse::Ok { mensaje } => {
                assert_eq!(mensaje, "Farmacia 'Central' creada con id=1.");
            }
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn desactivar_dos_veces_reporta_el_estado() {
        let (store, registry, scheduler) = entorno().await;
        store.crear_farmacia("Norte").await.expect("crear");

        let primera = dispatch(
            AdminRequest::DesactivarFarmacia {
                nombre: "Norte".into(),
            },
            &store,
            &registry,
            &scheduler,
        )
        .await;
        assert!(matches!(primera, AdminResponse::Ok { .. }));

        let segunda = dispatch(
            AdminRequest::DesactivarFarmacia {
                nombre: "Norte".into(),
            },
            &store,
            &registry,
            &scheduler,
        )
        .await;
        match segunda {
            AdminResponse::Error { mensaje } => {
                assert_eq!(mensaje, "La farmacia 'Norte' ya estaba desactivada.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_tarea_responde_con_el_nombre_interno() {
        let (store, registry, scheduler) = entorno().await;
        let respuesta = dispatch(
            AdminRequest::RunTarea {
                tarea: Tarea::LimpiarNotificaciones,
            },
            &store,
            &registry,
            &scheduler,
        )
        .await;
        match respuesta {
            AdminResponse::Ok { mensaje } => {
                assert_eq!(mensaje, "Tarea 'limpiar_notificaciones_antiguas' encolada.");
            }
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn accion_desconocida_se_nombra_en_la_respuesta() {
        match respuesta_no_reconocida(br#"{"type": "borrar_todo"}"#) {
            AdminResponse::Error { mensaje } => {
                assert_eq!(mensaje, "Acción 'borrar_todo' no reconocida.");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }
}
