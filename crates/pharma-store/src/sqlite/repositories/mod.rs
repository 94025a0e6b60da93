//! Synchronous repositories over a raw connection.
//!
//! Each repository is a stateless namespace of associated functions
//! taking `&Connection`, so they compose inside one transaction when a
//! caller needs that.

pub mod agregados;
pub mod farmacias;
pub mod medicamentos;
pub mod notificaciones;

pub use agregados::AgregadoRepo;
pub use farmacias::FarmaciaRepo;
pub use medicamentos::MedicamentoRepo;
pub use notificaciones::NotificacionRepo;
