//! Aggregate queries: the connection digest and admin statistics.
//!
//! Grouped in one place so counting rules stay consistent instead of
//! being re-derived wherever someone needs a number.

use chrono::NaiveDate;
use pharma_core::{Estadisticas, FarmaciaId, ResumenEstado, VencidoAusente, DEFAULT_UMBRAL_DIAS};
use rusqlite::{params, Connection};

use crate::error::StoreResult;
use crate::sqlite::rows::{fmt_fecha, parse_fecha};

pub struct AgregadoRepo;

impl AgregadoRepo {
    /// Digest sent right after a successful admission.
    ///
    /// The "expired while away" list only includes items retired by the
    /// automatic scan; manual deletions are old news to the pharmacy
    /// that made them.
    pub fn resumen_estado(
        conn: &Connection,
        farmacia_id: FarmaciaId,
    ) -> StoreResult<ResumenEstado> {
        let medicamentos_activos = conn.query_row(
            "SELECT COUNT(*) FROM medicamentos WHERE farmacia_id = ?1 AND activo = 1",
            params![farmacia_id.get()],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let notificaciones_no_leidas = conn.query_row(
            "SELECT COUNT(*) FROM notificaciones WHERE farmacia_id = ?1 AND leida = 0",
            params![farmacia_id.get()],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let mut stmt = conn.prepare(
            "SELECT nombre, fecha_vencimiento
               FROM medicamentos
              WHERE farmacia_id = ?1
                AND activo = 0
                AND motivo_baja = 'vencido_automatico'
              ORDER BY fecha_vencimiento DESC
              LIMIT 10",
        )?;
        let vencidos_mientras_ausente = stmt
            .query_map(params![farmacia_id.get()], |row| {
                let fecha_raw: String = row.get(1)?;
                Ok(VencidoAusente {
                    nombre: row.get(0)?,
                    fecha_vencimiento: parse_fecha(1, &fecha_raw)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ResumenEstado {
            medicamentos_activos,
            notificaciones_no_leidas,
            vencidos_mientras_ausente,
        })
    }

    /// System-wide counters for the admin console. The expiring count
    /// uses the default threshold as a fixed reference window, not each
    /// pharmacy's own setting.
    pub fn estadisticas(conn: &Connection, hoy: NaiveDate) -> StoreResult<Estadisticas> {
        let farmacias_activas = conn.query_row(
            "SELECT COUNT(*) FROM farmacias WHERE activo = 1",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let medicamentos_activos = conn.query_row(
            "SELECT COUNT(*) FROM medicamentos WHERE activo = 1",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let proximos_a_vencer = conn.query_row(
            "SELECT COUNT(*) FROM medicamentos
              WHERE activo = 1
                AND fecha_vencimiento >= ?1
                AND fecha_vencimiento <= date(?1, '+' || ?2 || ' days')",
            params![fmt_fecha(hoy), DEFAULT_UMBRAL_DIAS],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let notificaciones_hoy = conn.query_row(
            "SELECT COUNT(*) FROM notificaciones WHERE substr(creado_en, 1, 10) = ?1",
            params![fmt_fecha(hoy)],
            |row| row.get::<_, i64>(0),
        )? as u64;

        Ok(Estadisticas {
            farmacias_activas,
            medicamentos_activos,
            proximos_a_vencer,
            notificaciones_hoy,
        })
    }
}
