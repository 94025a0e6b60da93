//! SQLite-backed [`Store`] implementation.
//!
//! The daemon is the only writer, so a single connection behind a mutex
//! is enough; every call hops to the blocking pool before touching it.
//! WAL mode plus a busy timeout covers the stray concurrent reader.

pub mod repositories;
pub mod schema;

mod rows;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pharma_core::{
    Estadisticas, Farmacia, FarmaciaId, Medicamento, MedicamentoPorVencer, MotivoBaja,
    Notificacion, NotificacionId, ResumenEstado, TipoNotificacion, DEFAULT_UMBRAL_DIAS,
};
use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::store::{CambiosMedicamento, EstadoCambio, Store, UmbralCambio};

use repositories::{AgregadoRepo, FarmaciaRepo, MedicamentoRepo, NotificacionRepo};

/// Shared handle to the SQLite database. Cloning is cheap.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    /// Threshold assigned to newly created pharmacies.
    default_umbral: u32,
}

impl SqliteStore {
    /// Opens (or creates) the database file and brings the schema up to
    /// date.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::prepare(conn, &path.display().to_string())
    }

    /// Fresh in-memory database. Used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn, ":memory:")
    }

    /// Overrides the threshold given to newly created pharmacies.
    pub fn with_default_umbral(mut self, umbral_dias: u32) -> Self {
        self.default_umbral = umbral_dias;
        self
    }

    fn prepare(conn: Connection, path: &str) -> StoreResult<Self> {
        schema::configure_connection(&conn)?;
        let applied = schema::run_migrations(&conn)?;
        info!(path, applied, "store abierto");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_umbral: DEFAULT_UMBRAL_DIAS,
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("conexión envenenada".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("tarea de base de datos abortada: {e}")))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_farmacia(&self, nombre: &str) -> StoreResult<Option<Farmacia>> {
        let nombre = nombre.to_owned();
        self.call(move |conn| FarmaciaRepo::get_by_nombre(conn, &nombre))
            .await
    }

    async fn crear_farmacia(&self, nombre: &str) -> StoreResult<Farmacia> {
        let nombre = nombre.to_owned();
        let umbral = self.default_umbral;
        self.call(move |conn| FarmaciaRepo::crear(conn, &nombre, umbral))
            .await
    }

    async fn listar_farmacias(&self) -> StoreResult<Vec<Farmacia>> {
        self.call(FarmaciaRepo::listar).await
    }

    async fn renombrar_farmacia(
        &self,
        nombre_actual: &str,
        nombre_nuevo: &str,
    ) -> StoreResult<Farmacia> {
        let (actual, nuevo) = (nombre_actual.to_owned(), nombre_nuevo.to_owned());
        self.call(move |conn| FarmaciaRepo::renombrar(conn, &actual, &nuevo))
            .await
    }

    async fn desactivar_farmacia(&self, nombre: &str) -> StoreResult<EstadoCambio> {
        let nombre = nombre.to_owned();
        self.call(move |conn| FarmaciaRepo::cambiar_activo(conn, &nombre, false))
            .await
    }

    async fn activar_farmacia(&self, nombre: &str) -> StoreResult<EstadoCambio> {
        let nombre = nombre.to_owned();
        self.call(move |conn| FarmaciaRepo::cambiar_activo(conn, &nombre, true))
            .await
    }

    async fn configurar_umbral(
        &self,
        farmacia_id: FarmaciaId,
        umbral_dias: u32,
    ) -> StoreResult<UmbralCambio> {
        self.call(move |conn| FarmaciaRepo::configurar_umbral(conn, farmacia_id, umbral_dias))
            .await
    }

    async fn listar_medicamentos(
        &self,
        farmacia_id: FarmaciaId,
    ) -> StoreResult<Vec<Medicamento>> {
        self.call(move |conn| MedicamentoRepo::listar(conn, farmacia_id))
            .await
    }

    async fn buscar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
    ) -> StoreResult<Option<Medicamento>> {
        let codigo = codigo.to_owned();
        self.call(move |conn| MedicamentoRepo::buscar(conn, farmacia_id, &codigo))
            .await
    }

    async fn crear_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        nombre: &str,
        fecha_vencimiento: NaiveDate,
    ) -> StoreResult<Medicamento> {
        let (codigo, nombre) = (codigo.to_owned(), nombre.to_owned());
        self.call(move |conn| {
            MedicamentoRepo::crear(conn, farmacia_id, &codigo, &nombre, fecha_vencimiento)
        })
        .await
    }

    async fn actualizar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        cambios: CambiosMedicamento,
    ) -> StoreResult<Medicamento> {
        let codigo = codigo.to_owned();
        self.call(move |conn| MedicamentoRepo::actualizar(conn, farmacia_id, &codigo, cambios))
            .await
    }

    async fn eliminar_medicamento(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        motivo: MotivoBaja,
    ) -> StoreResult<Medicamento> {
        let codigo = codigo.to_owned();
        self.call(move |conn| MedicamentoRepo::eliminar(conn, farmacia_id, &codigo, motivo))
            .await
    }

    async fn medicamentos_por_vencer(
        &self,
        hoy: NaiveDate,
    ) -> StoreResult<Vec<MedicamentoPorVencer>> {
        self.call(move |conn| MedicamentoRepo::por_vencer(conn, hoy))
            .await
    }

    async fn medicamentos_vencidos(&self, hoy: NaiveDate) -> StoreResult<Vec<Medicamento>> {
        self.call(move |conn| MedicamentoRepo::vencidos(conn, hoy))
            .await
    }

    async fn crear_notificacion(
        &self,
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: &str,
        codigo: Option<&str>,
    ) -> StoreResult<Notificacion> {
        let mensaje = mensaje.to_owned();
        let codigo = codigo.map(str::to_string);
        self.call(move |conn| {
            NotificacionRepo::crear(conn, farmacia_id, tipo, &mensaje, codigo.as_deref())
        })
        .await
    }

    async fn notificaciones_recientes(
        &self,
        farmacia_id: FarmaciaId,
        solo_no_leidas: bool,
        limit: u32,
    ) -> StoreResult<Vec<Notificacion>> {
        self.call(move |conn| {
            NotificacionRepo::recientes(conn, farmacia_id, solo_no_leidas, limit)
        })
        .await
    }

    async fn marcar_leidas(&self, ids: &[NotificacionId]) -> StoreResult<u64> {
        let ids = ids.to_vec();
        self.call(move |conn| NotificacionRepo::marcar_leidas(conn, &ids))
            .await
    }

    async fn existe_alerta_del_dia(
        &self,
        farmacia_id: FarmaciaId,
        codigo: &str,
        dia: NaiveDate,
    ) -> StoreResult<bool> {
        let codigo = codigo.to_owned();
        self.call(move |conn| {
            NotificacionRepo::existe_alerta_del_dia(conn, farmacia_id, &codigo, dia)
        })
        .await
    }

    async fn purgar_leidas_antes_de(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.call(move |conn| NotificacionRepo::purgar_leidas_antes_de(conn, cutoff))
            .await
    }

    async fn resumen_estado(&self, farmacia_id: FarmaciaId) -> StoreResult<ResumenEstado> {
        self.call(move |conn| AgregadoRepo::resumen_estado(conn, farmacia_id))
            .await
    }

    async fn estadisticas(&self, hoy: NaiveDate) -> StoreResult<Estadisticas> {
        self.call(move |conn| AgregadoRepo::estadisticas(conn, hoy))
            .await
    }
}
