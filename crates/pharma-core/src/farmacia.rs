//! Farmacia entity and identity normalization.

use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default alert lead time, in days, applied to newly registered farmacias.
pub const DEFAULT_UMBRAL_DIAS: u32 = 7;

// ============================================================================
// Type-Safe Identifier
// ============================================================================

/// Unique identifier for a registered farmacia.
///
/// Wraps the store-assigned row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FarmaciaId(i64);

impl FarmaciaId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying numeric id.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FarmaciaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for FarmaciaId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Entity
// ============================================================================

/// A registered pharmacy tenant.
///
/// Owns its medicamento inventory and notification history. The `activo`
/// flag gates connection admission: an inactive farmacia is rejected at
/// connect time and excluded from expiration scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farmacia {
    pub id: FarmaciaId,

    /// Display name, stored trimmed. Lookups compare case-insensitively.
    pub nombre: String,

    /// Alert lead time in days: items expiring within this window trigger
    /// expiration-alert notifications.
    pub umbral_dias: u32,

    pub activo: bool,

    pub creado_en: DateTime<Utc>,
}

impl Farmacia {
    /// Key under which a live session for this farmacia is registered.
    pub fn registry_key(&self) -> String {
        registry_key(&self.nombre)
    }
}

/// Normalizes a farmacia name into the live-session registry key.
///
/// Trims surrounding whitespace and lowercases, so "  Central " and
/// "central" address the same session slot.
pub fn registry_key(nombre: &str) -> String {
    nombre.trim().to_lowercase()
}

/// Validates and normalizes a farmacia name supplied over the wire.
///
/// Returns the trimmed name, or an error when nothing remains after
/// trimming.
pub fn validar_nombre(nombre: &str) -> DomainResult<String> {
    let trimmed = nombre.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyField {
            field: "nombre_farmacia",
        });
    }
    Ok(trimmed.to_string())
}
