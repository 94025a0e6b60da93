//! Row-to-entity conversion shared by the repositories.
//!
//! Timestamps are stored as fixed-width UTC RFC 3339 text (millisecond
//! precision, `Z` suffix) so string comparison in SQL matches time
//! order. Plain dates use `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pharma_core::{
    Farmacia, FarmaciaId, Medicamento, MedicamentoId, MotivoBaja, Notificacion, NotificacionId,
    TipoNotificacion,
};
use rusqlite::types::Type;
use rusqlite::Row;

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn fmt_fecha(fecha: NaiveDate) -> String {
    fecha.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_fecha(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn bad_text(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, detail.into())
}

/// Column order: id, nombre, umbral_dias, activo, creado_en.
pub(crate) fn farmacia_from_row(row: &Row<'_>) -> rusqlite::Result<Farmacia> {
    let creado_raw: String = row.get(4)?;
    Ok(Farmacia {
        id: FarmaciaId::new(row.get(0)?),
        nombre: row.get(1)?,
        umbral_dias: row.get(2)?,
        activo: row.get(3)?,
        creado_en: parse_ts(4, &creado_raw)?,
    })
}

/// Column order: id, farmacia_id, codigo, nombre, fecha_vencimiento,
/// activo, motivo_baja.
pub(crate) fn medicamento_from_row(row: &Row<'_>) -> rusqlite::Result<Medicamento> {
    let fecha_raw: String = row.get(4)?;
    let motivo_raw: Option<String> = row.get(6)?;
    let motivo_baja = motivo_raw
        .map(|s| {
            MotivoBaja::from_str_opt(&s)
                .ok_or_else(|| bad_text(6, format!("motivo_baja desconocido: {s}")))
        })
        .transpose()?;

    Ok(Medicamento {
        id: MedicamentoId::new(row.get(0)?),
        farmacia_id: FarmaciaId::new(row.get(1)?),
        codigo: row.get(2)?,
        nombre: row.get(3)?,
        fecha_vencimiento: parse_fecha(4, &fecha_raw)?,
        activo: row.get(5)?,
        motivo_baja,
    })
}

/// Column order: id, farmacia_id, tipo, mensaje, codigo, leida, creado_en.
pub(crate) fn notificacion_from_row(row: &Row<'_>) -> rusqlite::Result<Notificacion> {
    let tipo_raw: String = row.get(2)?;
    let tipo = TipoNotificacion::from_str_opt(&tipo_raw)
        .ok_or_else(|| bad_text(2, format!("tipo de notificación desconocido: {tipo_raw}")))?;
    let creado_raw: String = row.get(6)?;

    Ok(Notificacion {
        id: NotificacionId::new(row.get(0)?),
        farmacia_id: FarmaciaId::new(row.get(1)?),
        tipo,
        mensaje: row.get(3)?,
        codigo: row.get(4)?,
        leida: row.get(5)?,
        creado_en: parse_ts(6, &creado_raw)?,
    })
}
