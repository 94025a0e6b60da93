//! The repository trait every store backend implements.
//!
//! Handlers and background jobs depend on this trait only, never on a
//! concrete backend, so integration tests can swap in an in-memory
//! database or a fault-injecting stub.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pharma_core::{
    Estadisticas, Farmacia, FarmaciaId, Medicamento, MedicamentoPorVencer, MotivoBaja,
    Notificacion, NotificacionId, ResumenEstado, TipoNotificacion,
};

use crate::error::StoreResult;

/// Outcome of an activate/deactivate request.
///
/// `cambiado` is false when the pharmacy was already in the requested
/// state, so callers can word their reply accordingly.
#[derive(Debug, Clone)]
pub struct EstadoCambio {
    pub farmacia: Farmacia,
    pub cambiado: bool,
}

/// Outcome of a threshold update. `anterior == nuevo` means no-op.
#[derive(Debug, Clone, Copy)]
pub struct UmbralCambio {
    pub anterior: u32,
    pub nuevo: u32,
}

impl UmbralCambio {
    pub fn cambiado(&self) -> bool {
        self.anterior != self.nuevo
    }
}

/// Field changes accepted by [`Store::actualizar_medicamento`].
/// At least one field must be set; the store rejects an empty update.
#[derive(Debug, Clone, Default)]
pub struct CambiosMedicamento {
    pub nombre: Option<String>,
    pub fecha_vencimiento: Option<NaiveDate>,
}

impl CambiosMedicamento {
    pub fn is_empty(&self) -> bool {
        self.nombre.is_none() && self.fecha_vencimiento.is_none()
    }
}

/// Persistence boundary for pharmacies, medications and notifications.
///
/// Date-sensitive queries take the reference date as an argument rather
/// than reading the clock, which keeps window arithmetic testable.
#[async_trait]
pub trait Store: Send + Sync {
    // Farmacias ----------------------------------------------------------

    /// Looks a pharmacy up by name. Matching trims surrounding
    /// whitespace and ignores case; the stored spelling is returned.
    async fn get_farmacia(&self, nombre: &str) -> StoreResult<Option<Farmacia>>;

    /// Creates an active pharmacy with the store's default threshold.
    /// Fails with `Validation` when the name is empty or taken.
    async fn crear_farmacia(&self, nombre: &str) -> StoreResult<Farmacia>;

    /// Every pharmacy, active ones first, each group alphabetically.
    async fn listar_farmacias(&self) -> StoreResult<Vec<Farmacia>>;

    /// Renames an active pharmacy. The new name must not collide with
    /// another pharmacy (case-insensitive).
    async fn renombrar_farmacia(
        &self,
        nombre_actual: &str,
        nombre_nuevo: &str,
    ) -> StoreResult<Farmacia>;

    async fn desactivar_farmacia(&self, nombre: &str) -> StoreResult<EstadoCambio>;

    async fn activar_farmacia(&self, nombre: &str) -> StoreResult<EstadoCambio>;

    /// Sets the expiry-alert threshold for an active pharmacy.
    async fn configurar_umbral(
        &self,
        farmacia_id: FarmaciaId,
        umbral_dias: u32,
    ) -> StoreResult<UmbralCambio>;

    // Medicamentos -------------------------------------------------------

    /// Active medications for one pharmacy, ordered by expiry date.
    async fn listar_medicamentos(&self, farmacia_id: FarmaciaId)
        -> StoreResult<Vec<Medicamento>>;

    async fn buscar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
    ) -> StoreResult<Option<Medicamento>>;

    /// Adds a medication. The code must not collide with another
    /// *active* medication of the same pharmacy; codes retired by a
    /// logical delete may be reused.
    async fn crear_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        nombre: &str,
        fecha_vencimiento: NaiveDate,
    ) -> StoreResult<Medicamento>;

    async fn actualizar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        cambios: CambiosMedicamento,
    ) -> StoreResult<Medicamento>;

    /// Logical delete: the row stays for history with `activo = false`
    /// and the given reason.
    async fn eliminar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        motivo: MotivoBaja,
    ) -> StoreResult<Medicamento>;

    /// Active medications of active pharmacies whose expiry date falls
    /// inside `[hoy, hoy + umbral]`, where `umbral` is each pharmacy's
    /// own threshold. Already-expired rows are excluded.
    async fn medicamentos_por_vencer(&self, hoy: NaiveDate)
        -> StoreResult<Vec<MedicamentoPorVencer>>;

    /// Active medications of active pharmacies with expiry strictly
    /// before `hoy`.
    async fn medicamentos_vencidos(&self, hoy: NaiveDate) -> StoreResult<Vec<Medicamento>>;

    // Notificaciones -----------------------------------------------------

    /// Persists a notification (unread). `codigo` ties expiry alerts to
    /// a medication for once-per-day suppression.
    async fn crear_notificacion(
        &self,
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: &str,
        codigo: Option<&str>,
    ) -> StoreResult<Notificacion>;

    /// Most recent notifications, newest first, capped at `limit`.
    async fn notificaciones_recientes(
        &self,
        farmacia_id: FarmaciaId,
        solo_no_leidas: bool,
        limit: u32,
    ) -> StoreResult<Vec<Notificacion>>;

    /// Marks the given notifications read. Returns how many rows changed.
    async fn marcar_leidas(&self, ids: &[NotificacionId]) -> StoreResult<u64>;

    /// True when an expiry alert for this medication already exists on
    /// the given calendar day.
    async fn existe_alerta_del_dia(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        dia: NaiveDate,
    ) -> StoreResult<bool>;

    /// Deletes read notifications created before `cutoff`. Returns how
    /// many rows were removed. Unread rows are never touched.
    async fn purgar_leidas_antes_de(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // Agregados ----------------------------------------------------------

    /// Connection digest for one pharmacy.
    async fn resumen_estado(&self, farmacia_id: FarmaciaId) -> StoreResult<ResumenEstado>;

    /// System-wide counters for the admin console.
    async fn estadisticas(&self, hoy: NaiveDate) -> StoreResult<Estadisticas>;
}
