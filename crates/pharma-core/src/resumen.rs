//! Status digest and system-wide statistics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An item retired automatically while its farmacia was disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VencidoAusente {
    pub nombre: String,
    pub fecha_vencimiento: NaiveDate,
}

/// Summary sent to a farmacia right after admission and on request.
///
/// `vencidos_mientras_ausente` lists the most recently auto-retired items
/// (newest expiration first, capped at 10) so a returning pharmacy sees
/// what expired during its absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumenEstado {
    pub medicamentos_activos: u64,
    pub notificaciones_no_leidas: u64,
    pub vencidos_mientras_ausente: Vec<VencidoAusente>,
}

/// Aggregate counters served to the administrative channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estadisticas {
    pub farmacias_activas: u64,
    pub medicamentos_activos: u64,
    /// Active items expiring within the global 7-day reference window.
    pub proximos_a_vencer: u64,
    /// Notifications created today.
    pub notificaciones_hoy: u64,
}
