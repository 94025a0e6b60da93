//! Medicamento entity, logical-deletion reasons, and expiry arithmetic.

use crate::farmacia::FarmaciaId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a medicamento row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicamentoId(i64);

impl MedicamentoId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MedicamentoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an active medicamento was logically deleted.
///
/// Set exactly once, when `activo` flips to false. There is no physical
/// deletion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivoBaja {
    /// Removed by the pharmacy itself through the client channel.
    EliminadoManual,
    /// Retired by the expiration scan after its date passed.
    VencidoAutomatico,
}

impl MotivoBaja {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EliminadoManual => "eliminado_manual",
            Self::VencidoAutomatico => "vencido_automatico",
        }
    }

    /// Parses the stored representation.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "eliminado_manual" => Some(Self::EliminadoManual),
            "vencido_automatico" => Some(Self::VencidoAutomatico),
            _ => None,
        }
    }
}

impl fmt::Display for MotivoBaja {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One inventory item belonging to a single farmacia.
///
/// `codigo` is unique among the *active* medicamentos of its farmacia; a
/// codigo freed by logical deletion may be assigned again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicamento {
    pub id: MedicamentoId,
    pub farmacia_id: FarmaciaId,
    pub codigo: String,
    pub nombre: String,
    pub fecha_vencimiento: NaiveDate,
    pub activo: bool,
    pub motivo_baja: Option<MotivoBaja>,
}

impl Medicamento {
    /// Days until expiration relative to `hoy`. Negative once expired.
    pub fn dias_restantes(&self, hoy: NaiveDate) -> i64 {
        self.fecha_vencimiento.signed_duration_since(hoy).num_days()
    }

    /// True when the expiration date has already passed.
    pub fn esta_vencido(&self, hoy: NaiveDate) -> bool {
        self.fecha_vencimiento < hoy
    }

    /// True when the item falls inside the alert window: not yet expired
    /// and expiring within `umbral_dias` days (inclusive).
    pub fn dentro_de_umbral(&self, umbral_dias: u32, hoy: NaiveDate) -> bool {
        let dias = self.dias_restantes(hoy);
        dias >= 0 && dias <= i64::from(umbral_dias)
    }
}

/// Row produced by the expiring-items query: an active medicamento of an
/// active farmacia whose date falls inside that farmacia's alert window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicamentoPorVencer {
    pub farmacia_id: FarmaciaId,
    pub codigo: String,
    pub nombre: String,
    pub fecha_vencimiento: NaiveDate,
    pub umbral_dias: u32,
    pub dias_restantes: i64,
}
