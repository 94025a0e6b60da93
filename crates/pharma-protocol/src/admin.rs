//! Administrative-channel message types.
//!
//! The admin console speaks over the daemon's Unix socket with the same
//! frame codec as the client channel, but a one-shot exchange per
//! connection: one request frame, one response frame, close.

use pharma_core::{Estadisticas, Farmacia};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Background task an administrator can force-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tarea {
    VerificarVencimientos,
    LimpiarNotificaciones,
}

impl fmt::Display for Tarea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerificarVencimientos => write!(f, "verificar_vencimientos"),
            Self::LimpiarNotificaciones => write!(f, "limpiar_notificaciones"),
        }
    }
}

/// Commands accepted on the administrative channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminRequest {
    /// Register a new farmacia.
    CrearFarmacia { nombre: String },

    /// List every farmacia, active or not.
    ListarFarmacias,

    /// Rename an existing farmacia. A live session under the old name is
    /// force-closed.
    RenombrarFarmacia {
        nombre_actual: String,
        nombre_nuevo: String,
    },

    /// Deactivate a farmacia; a live session is force-closed first.
    DesactivarFarmacia { nombre: String },

    /// Reactivate a previously deactivated farmacia.
    ActivarFarmacia { nombre: String },

    /// System-wide aggregate counters.
    Estadisticas,

    /// Currently connected identities.
    Status,

    /// Enqueue a background task immediately.
    RunTarea { tarea: Tarea },
}

/// Replies on the administrative channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminResponse {
    /// The command succeeded.
    Ok { mensaje: String },

    /// Farmacia listing.
    Farmacias { farmacias: Vec<Farmacia> },

    /// Aggregate counters.
    Estadisticas { estadisticas: Estadisticas },

    /// Live-session snapshot.
    Status {
        farmacias_conectadas: Vec<String>,
        total_conectadas: usize,
    },

    /// The command failed; `mensaje` says why.
    Error { mensaje: String },
}

impl AdminResponse {
    /// Creates a success reply.
    pub fn ok(mensaje: impl Into<String>) -> Self {
        Self::Ok {
            mensaje: mensaje.into(),
        }
    }

    /// Creates a failure reply.
    pub fn error(mensaje: impl Into<String>) -> Self {
        Self::Error {
            mensaje: mensaje.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tarea_serialization() {
        let msg = AdminRequest::RunTarea {
            tarea: Tarea::VerificarVencimientos,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"run_tarea\""));
        assert!(json.contains("\"tarea\":\"verificar_vencimientos\""));
    }

    #[test]
    fn test_response_roundtrip() {
        let original = AdminResponse::Status {
            farmacias_conectadas: vec!["central".to_string(), "norte".to_string()],
            total_conectadas: 2,
        };
        let json = serde_json::to_string(&original).unwrap();
        let parsed: AdminResponse = serde_json::from_str(&json).unwrap();
        match parsed {
            AdminResponse::Status {
                farmacias_conectadas,
                total_conectadas,
            } => {
                assert_eq!(farmacias_conectadas.len(), 2);
                assert_eq!(total_conectadas, 2);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }
}
