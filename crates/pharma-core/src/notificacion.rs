//! Notificacion entity and type tags.

use crate::farmacia::FarmaciaId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a notificacion row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificacionId(i64);

impl NotificacionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NotificacionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipoNotificacion {
    /// Medicamento created through the client channel.
    Creacion,
    /// Medicamento updated through the client channel.
    Actualizacion,
    /// Medicamento logically deleted through the client channel.
    Eliminacion,
    /// Expiration alert raised by the periodic scan.
    ProximoVencimiento,
    /// Coordinator-generated notice (automatic retirement and similar).
    Sistema,
}

impl TipoNotificacion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creacion => "creacion",
            Self::Actualizacion => "actualizacion",
            Self::Eliminacion => "eliminacion",
            Self::ProximoVencimiento => "proximo_vencimiento",
            Self::Sistema => "sistema",
        }
    }

    /// Parses the stored representation.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "creacion" => Some(Self::Creacion),
            "actualizacion" => Some(Self::Actualizacion),
            "eliminacion" => Some(Self::Eliminacion),
            "proximo_vencimiento" => Some(Self::ProximoVencimiento),
            "sistema" => Some(Self::Sistema),
            _ => None,
        }
    }
}

impl fmt::Display for TipoNotificacion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted notification.
///
/// Rows are written to the store *before* any bus publication: the bus is a
/// delivery accelerator, the store is the source of truth. `codigo` ties the
/// row to a medication when one is involved; for expiration alerts it forms
/// the per-day de-duplication key together with `farmacia_id` and the
/// calendar day of `creado_en`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notificacion {
    pub id: NotificacionId,
    pub farmacia_id: FarmaciaId,
    pub tipo: TipoNotificacion,
    pub mensaje: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    pub leida: bool,
    pub creado_en: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tipo_serde_tags() {
        let tipo: TipoNotificacion = serde_json::from_str("\"proximo_vencimiento\"").unwrap();
        assert_eq!(tipo, TipoNotificacion::ProximoVencimiento);
        assert_eq!(
            serde_json::to_string(&TipoNotificacion::Creacion).unwrap(),
            "\"creacion\""
        );
    }

    #[test]
    fn test_tipo_round_trip_all() {
        for tipo in [
            TipoNotificacion::Creacion,
            TipoNotificacion::Actualizacion,
            TipoNotificacion::Eliminacion,
            TipoNotificacion::ProximoVencimiento,
            TipoNotificacion::Sistema,
        ] {
            assert_eq!(TipoNotificacion::from_str_opt(tipo.as_str()), Some(tipo));
        }
    }
}
