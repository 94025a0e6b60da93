//! Notificacion repository.
//!
//! Every notification is persisted here before anything is pushed to a
//! live session; a pharmacy that is offline finds the row waiting on
//! its next `ver_notificaciones`.

use chrono::{DateTime, NaiveDate, Utc};
use pharma_core::{FarmaciaId, Notificacion, NotificacionId, TipoNotificacion};
use rusqlite::{params, params_from_iter, Connection};

use crate::error::StoreResult;
use crate::sqlite::rows::{fmt_fecha, fmt_ts, notificacion_from_row, parse_ts};

const COLS: &str = "id, farmacia_id, tipo, mensaje, codigo, leida, creado_en";

pub struct NotificacionRepo;

impl NotificacionRepo {
    pub fn crear(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: &str,
        codigo: Option<&str>,
    ) -> StoreResult<Notificacion> {
        let ts = fmt_ts(Utc::now());
        conn.execute(
            "INSERT INTO notificaciones (farmacia_id, tipo, mensaje, codigo, leida, creado_en)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![farmacia_id.get(), tipo.as_str(), mensaje, codigo, ts],
        )?;

        Ok(Notificacion {
            id: NotificacionId::new(conn.last_insert_rowid()),
            farmacia_id,
            tipo,
            mensaje: mensaje.to_string(),
            codigo: codigo.map(str::to_string),
            leida: false,
            creado_en: parse_ts(0, &ts)?,
        })
    }

    /// Newest first. Ties on the stored timestamp break by row id, so
    /// rows created within the same millisecond still come back in
    /// reverse insertion order.
    pub fn recientes(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        solo_no_leidas: bool,
        limit: u32,
    ) -> StoreResult<Vec<Notificacion>> {
        let filtro = if solo_no_leidas { "AND leida = 0" } else { "" };
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM notificaciones
              WHERE farmacia_id = ?1 {filtro}
              ORDER BY creado_en DESC, id DESC
              LIMIT ?2"
        ))?;
        let notificaciones = stmt
            .query_map(params![farmacia_id.get(), limit], notificacion_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notificaciones)
    }

    /// Marks the given rows read. Rows already read do not count.
    pub fn marcar_leidas(conn: &Connection, ids: &[NotificacionId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE notificaciones SET leida = 1 WHERE leida = 0 AND id IN ({placeholders})"
        );
        let cambiadas = conn.execute(&sql, params_from_iter(ids.iter().map(|id| id.get())))?;
        Ok(cambiadas as u64)
    }

    /// True when an expiry alert for this medication was already created
    /// on the given calendar day. Other notification kinds never count,
    /// even when they carry the same codigo.
    pub fn existe_alerta_del_dia(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        codigo: &str,
        dia: NaiveDate,
    ) -> StoreResult<bool> {
        let existe = conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM notificaciones
                  WHERE farmacia_id = ?1
                    AND codigo = ?2
                    AND tipo = ?3
                    AND substr(creado_en, 1, 10) = ?4)",
            params![
                farmacia_id.get(),
                codigo.trim(),
                TipoNotificacion::ProximoVencimiento.as_str(),
                fmt_fecha(dia)
            ],
            |row| row.get(0),
        )?;
        Ok(existe)
    }

    /// Removes read rows older than the cutoff. Unread rows survive any
    /// retention window.
    pub fn purgar_leidas_antes_de(conn: &Connection, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let eliminadas = conn.execute(
            "DELETE FROM notificaciones WHERE leida = 1 AND creado_en < ?1",
            params![fmt_ts(cutoff)],
        )?;
        Ok(eliminadas as u64)
    }
}
