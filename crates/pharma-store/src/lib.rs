//! Pharma Store - Persistence layer for PharmaNotify
//!
//! Exposes the [`Store`] trait that the daemon's handlers and background
//! jobs are written against, plus the SQLite implementation behind it.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod sqlite;
pub mod store;

// Re-exports for convenience
pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use store::{CambiosMedicamento, EstadoCambio, Store, UmbralCambio};
