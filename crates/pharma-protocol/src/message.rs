//! Client-channel message types.
//!
//! The wire vocabulary is a closed set of tagged variants validated at
//! decode time; an unrecognized tag fails deserialization and is answered
//! with a structured error, not a dropped connection.

use crate::version::ProtocolVersion;
use chrono::NaiveDate;
use pharma_core::{Medicamento, Notificacion, ResumenEstado};
use serde::{Deserialize, Serialize};

/// Requests sent by a pharmacy client to the daemon.
///
/// The first frame on a connection must be `Registro`; every other
/// variant is only valid once the session is admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Connection handshake: asserts the pharmacy identity by name.
    Registro {
        protocol_version: ProtocolVersion,
        nombre_farmacia: String,
    },

    /// Add an item to the inventory.
    CrearMedicamento {
        codigo: String,
        nombre: String,
        fecha_vencimiento: NaiveDate,
    },

    /// List the active inventory.
    ListarMedicamentos,

    /// Look up one active item by codigo.
    BuscarMedicamento { codigo: String },

    /// Update name and/or expiration date of an active item.
    ActualizarMedicamento {
        codigo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nombre: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fecha_vencimiento: Option<NaiveDate>,
    },

    /// Logically delete an active item.
    EliminarMedicamento { codigo: String },

    /// Fetch notification history, newest first (side effect: the
    /// returned rows are marked read).
    VerNotificaciones {
        #[serde(default)]
        solo_no_leidas: bool,
    },

    /// Change this farmacia's alert lead time.
    ConfigurarUmbral { umbral_dias: u32 },

    /// Fetch the status digest on demand.
    ResumenEstado,

    /// Graceful disconnect.
    Desconectar,
}

impl ClientRequest {
    /// Creates a registration handshake with the current protocol version.
    pub fn registro(nombre_farmacia: impl Into<String>) -> Self {
        Self::Registro {
            protocol_version: ProtocolVersion::CURRENT,
            nombre_farmacia: nombre_farmacia.into(),
        }
    }
}

/// Error categories a client can receive.
///
/// `Validation`, `NotFound`, and `Protocol` leave an admitted session
/// open; during admission any error closes the connection. `Desactivada`
/// always precedes a forced closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    StoreUnavailable,
    Desactivada,
    Protocol,
}

/// Messages sent from the daemon to a pharmacy client.
///
/// Command responses and pushed notifications share the one socket;
/// ordering between the two streams is not guaranteed, only pushed
/// notifications for the same farmacia preserve publish order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Admission rejected; the daemon closes the connection afterwards.
    Rechazo {
        motivo: String,
        /// Daemon's protocol version, so an outdated client can say so.
        protocol_version: ProtocolVersion,
    },

    /// Status digest, sent right after admission and on request.
    Resumen { resumen: ResumenEstado },

    /// Active inventory listing.
    Medicamentos { medicamentos: Vec<Medicamento> },

    /// Single-item lookup result.
    Medicamento { medicamento: Box<Medicamento> },

    /// A mutation or threshold change succeeded.
    Confirmacion { mensaje: String },

    /// Notification history listing.
    Notificaciones { notificaciones: Vec<Notificacion> },

    /// A notification pushed over the bus to this live session.
    Notificacion { notificacion: Box<Notificacion> },

    /// Structured error; see [`ErrorKind`] for connection impact.
    Error { kind: ErrorKind, mensaje: String },

    /// Acknowledges a graceful disconnect.
    Despedida { mensaje: String },
}

impl ServerMessage {
    /// Creates a rejection carrying the daemon's protocol version.
    pub fn rechazo(motivo: impl Into<String>) -> Self {
        Self::Rechazo {
            motivo: motivo.into(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Creates a digest message.
    pub fn resumen(resumen: ResumenEstado) -> Self {
        Self::Resumen { resumen }
    }

    /// Creates a single-item lookup response.
    pub fn medicamento(medicamento: Medicamento) -> Self {
        Self::Medicamento {
            medicamento: Box::new(medicamento),
        }
    }

    /// Creates a success confirmation.
    pub fn confirmacion(mensaje: impl Into<String>) -> Self {
        Self::Confirmacion {
            mensaje: mensaje.into(),
        }
    }

    /// Creates a pushed-notification message.
    pub fn notificacion(notificacion: Notificacion) -> Self {
        Self::Notificacion {
            notificacion: Box::new(notificacion),
        }
    }

    /// Creates a structured error response.
    pub fn error(kind: ErrorKind, mensaje: impl Into<String>) -> Self {
        Self::Error {
            kind,
            mensaje: mensaje.into(),
        }
    }

    /// Creates a disconnect acknowledgement.
    pub fn despedida(mensaje: impl Into<String>) -> Self {
        Self::Despedida {
            mensaje: mensaje.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registro_serialization() {
        let msg = ClientRequest::registro("Farmacia Central");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"registro\""));
        assert!(json.contains("\"nombre_farmacia\":\"Farmacia Central\""));
        assert!(json.contains("\"protocol_version\""));
    }

    #[test]
    fn test_request_roundtrip() {
        let original = ClientRequest::ActualizarMedicamento {
            codigo: "A-100".to_string(),
            nombre: None,
            fecha_vencimiento: NaiveDate::from_ymd_opt(2026, 12, 31),
        };
        let json = serde_json::to_string(&original).unwrap();
        // Omitted optional fields stay off the wire entirely.
        assert!(!json.contains("\"nombre\""));

        let parsed: ClientRequest = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientRequest::ActualizarMedicamento { codigo, nombre, .. } => {
                assert_eq!(codigo, "A-100");
                assert!(nombre.is_none());
            }
            other => panic!("Expected ActualizarMedicamento, got {other:?}"),
        }
    }

    #[test]
    fn test_ver_notificaciones_defaults() {
        let parsed: ClientRequest =
            serde_json::from_str("{\"type\":\"ver_notificaciones\"}").unwrap();
        assert!(matches!(
            parsed,
            ClientRequest::VerNotificaciones {
                solo_no_leidas: false
            }
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let result: Result<ClientRequest, _> =
            serde_json::from_str("{\"type\":\"drop_table\"}");
        assert!(result.is_err());
    }

    #[test]
    fn test_error_serialization() {
        let msg = ServerMessage::error(ErrorKind::Validation, "codigo duplicado");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"kind\":\"validation\""));
    }
}
