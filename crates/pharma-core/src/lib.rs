//! Pharma Core - Shared domain types for PharmaNotify
//!
//! This crate provides the domain types shared between the daemon
//! (pharmad), the store, and the console client (pharma).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod farmacia;
pub mod medicamento;
pub mod notificacion;
pub mod resumen;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use farmacia::{registry_key, Farmacia, FarmaciaId, DEFAULT_UMBRAL_DIAS};
pub use medicamento::{Medicamento, MedicamentoId, MedicamentoPorVencer, MotivoBaja};
pub use notificacion::{Notificacion, NotificacionId, TipoNotificacion};
pub use resumen::{Estadisticas, ResumenEstado, VencidoAusente};
