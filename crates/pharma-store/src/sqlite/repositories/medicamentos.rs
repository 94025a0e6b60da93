//! Medicamento repository.
//!
//! Deletion is always logical: rows flip to `activo = 0` with a reason
//! and stay behind for the connection digest. The unique index on
//! `(farmacia_id, codigo) WHERE activo = 1` enforces live-row
//! uniqueness even if two writers race past the lookup below.

use chrono::NaiveDate;
use pharma_core::{FarmaciaId, Medicamento, MedicamentoId, MedicamentoPorVencer, MotivoBaja};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::sqlite::rows::{fmt_fecha, medicamento_from_row, parse_fecha};
use crate::store::CambiosMedicamento;

const COLS: &str = "id, farmacia_id, codigo, nombre, fecha_vencimiento, activo, motivo_baja";

fn no_existe(codigo: &str) -> StoreError {
    StoreError::NotFound(format!(
        "No existe ningún medicamento con el código '{codigo}'."
    ))
}

pub struct MedicamentoRepo;

impl MedicamentoRepo {
    /// Active medications of one pharmacy, soonest expiry first.
    pub fn listar(conn: &Connection, farmacia_id: FarmaciaId) -> StoreResult<Vec<Medicamento>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM medicamentos
              WHERE farmacia_id = ?1 AND activo = 1
              ORDER BY fecha_vencimiento, codigo"
        ))?;
        let medicamentos = stmt
            .query_map(params![farmacia_id.get()], medicamento_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(medicamentos)
    }

    /// Finds an *active* medication by code. Logically deleted rows are
    /// invisible here.
    pub fn buscar(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        codigo: &str,
    ) -> StoreResult<Option<Medicamento>> {
        let medicamento = conn
            .query_row(
                &format!(
                    "SELECT {COLS} FROM medicamentos
                      WHERE farmacia_id = ?1 AND codigo = ?2 AND activo = 1"
                ),
                params![farmacia_id.get(), codigo.trim()],
                medicamento_from_row,
            )
            .optional()?;
        Ok(medicamento)
    }

    pub fn crear(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        codigo: &str,
        nombre: &str,
        fecha_vencimiento: NaiveDate,
    ) -> StoreResult<Medicamento> {
        let codigo = codigo.trim();
        if codigo.is_empty() {
            return Err(StoreError::Validation(
                "El código del medicamento no puede estar vacío.".to_string(),
            ));
        }
        let nombre = nombre.trim();
        if nombre.is_empty() {
            return Err(StoreError::Validation(
                "El nombre del medicamento no puede estar vacío.".to_string(),
            ));
        }
        if Self::buscar(conn, farmacia_id, codigo)?.is_some() {
            return Err(StoreError::Validation(format!(
                "Ya existe un medicamento activo con el código '{codigo}'."
            )));
        }

        conn.execute(
            "INSERT INTO medicamentos (farmacia_id, codigo, nombre, fecha_vencimiento)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                farmacia_id.get(),
                codigo,
                nombre,
                fmt_fecha(fecha_vencimiento)
            ],
        )?;

        Ok(Medicamento {
            id: MedicamentoId::new(conn.last_insert_rowid()),
            farmacia_id,
            codigo: codigo.to_string(),
            nombre: nombre.to_string(),
            fecha_vencimiento,
            activo: true,
            motivo_baja: None,
        })
    }

    pub fn actualizar(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        codigo: &str,
        cambios: CambiosMedicamento,
    ) -> StoreResult<Medicamento> {
        if cambios.is_empty() {
            return Err(StoreError::Validation(
                "No se indicó ningún campo para actualizar.".to_string(),
            ));
        }
        let actual =
            Self::buscar(conn, farmacia_id, codigo)?.ok_or_else(|| no_existe(codigo.trim()))?;

        let nombre = match cambios.nombre {
            Some(nombre) => {
                let nombre = nombre.trim().to_string();
                if nombre.is_empty() {
                    return Err(StoreError::Validation(
                        "El nombre del medicamento no puede estar vacío.".to_string(),
                    ));
                }
                nombre
            }
            None => actual.nombre.clone(),
        };
        let fecha_vencimiento = cambios.fecha_vencimiento.unwrap_or(actual.fecha_vencimiento);

        conn.execute(
            "UPDATE medicamentos SET nombre = ?1, fecha_vencimiento = ?2 WHERE id = ?3",
            params![nombre, fmt_fecha(fecha_vencimiento), actual.id.get()],
        )?;

        Ok(Medicamento {
            nombre,
            fecha_vencimiento,
            ..actual
        })
    }

    /// Logical delete with a recorded reason.
    pub fn eliminar(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        codigo: &str,
        motivo: MotivoBaja,
    ) -> StoreResult<Medicamento> {
        let actual =
            Self::buscar(conn, farmacia_id, codigo)?.ok_or_else(|| no_existe(codigo.trim()))?;

        conn.execute(
            "UPDATE medicamentos SET activo = 0, motivo_baja = ?1 WHERE id = ?2",
            params![motivo.as_str(), actual.id.get()],
        )?;

        Ok(Medicamento {
            activo: false,
            motivo_baja: Some(motivo),
            ..actual
        })
    }

    /// Expiring items across all active pharmacies, each judged against
    /// its own pharmacy's threshold: `hoy <= fecha <= hoy + umbral`.
    pub fn por_vencer(
        conn: &Connection,
        hoy: NaiveDate,
    ) -> StoreResult<Vec<MedicamentoPorVencer>> {
        let mut stmt = conn.prepare(
            "SELECT m.farmacia_id, m.codigo, m.nombre, m.fecha_vencimiento, f.umbral_dias
               FROM medicamentos m
               JOIN farmacias f ON f.id = m.farmacia_id
              WHERE m.activo = 1
                AND f.activo = 1
                AND m.fecha_vencimiento >= ?1
                AND m.fecha_vencimiento <= date(?1, '+' || f.umbral_dias || ' days')
              ORDER BY m.fecha_vencimiento, m.farmacia_id, m.codigo",
        )?;
        let filas = stmt
            .query_map(params![fmt_fecha(hoy)], |row| {
                let fecha_raw: String = row.get(3)?;
                let fecha_vencimiento = parse_fecha(3, &fecha_raw)?;
                Ok(MedicamentoPorVencer {
                    farmacia_id: FarmaciaId::new(row.get(0)?),
                    codigo: row.get(1)?,
                    nombre: row.get(2)?,
                    fecha_vencimiento,
                    umbral_dias: row.get(4)?,
                    dias_restantes: fecha_vencimiento.signed_duration_since(hoy).num_days(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(filas)
    }

    /// Items of active pharmacies whose date passed: `fecha < hoy`.
    pub fn vencidos(conn: &Connection, hoy: NaiveDate) -> StoreResult<Vec<Medicamento>> {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.farmacia_id, m.codigo, m.nombre, m.fecha_vencimiento,
                    m.activo, m.motivo_baja
               FROM medicamentos m
               JOIN farmacias f ON f.id = m.farmacia_id
              WHERE m.activo = 1
                AND f.activo = 1
                AND m.fecha_vencimiento < ?1
              ORDER BY m.farmacia_id, m.codigo",
        )?;
        let medicamentos = stmt
            .query_map(params![fmt_fecha(hoy)], medicamento_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(medicamentos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::repositories::farmacias::FarmaciaRepo;
    use crate::sqlite::schema;
    use pharma_core::{Farmacia, DEFAULT_UMBRAL_DIAS};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::configure_connection(&conn).unwrap();
        schema::run_migrations(&conn).unwrap();
        conn
    }

    fn farmacia(conn: &Connection, nombre: &str) -> Farmacia {
        FarmaciaRepo::crear(conn, nombre, DEFAULT_UMBRAL_DIAS).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn crear_y_buscar() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        let creado =
            MedicamentoRepo::crear(&conn, f.id, " A-100 ", " Ibuprofeno 400mg ", date(2026, 6, 1))
                .unwrap();
        assert_eq!(creado.codigo, "A-100");
        assert_eq!(creado.nombre, "Ibuprofeno 400mg");
        assert!(creado.activo);

        let hallado = MedicamentoRepo::buscar(&conn, f.id, "A-100").unwrap().unwrap();
        assert_eq!(hallado, creado);
        assert!(MedicamentoRepo::buscar(&conn, f.id, "B-1").unwrap().is_none());
    }

    #[test]
    fn crear_rejects_empty_fields() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        let sin_codigo = MedicamentoRepo::crear(&conn, f.id, "  ", "Algo", date(2026, 6, 1));
        assert!(matches!(sin_codigo, Err(StoreError::Validation(_))));
        let sin_nombre = MedicamentoRepo::crear(&conn, f.id, "A-1", " ", date(2026, 6, 1));
        assert!(matches!(sin_nombre, Err(StoreError::Validation(_))));
    }

    #[test]
    fn codigo_unico_solo_entre_activos() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        MedicamentoRepo::crear(&conn, f.id, "A-1", "Original", date(2026, 6, 1)).unwrap();

        let dup = MedicamentoRepo::crear(&conn, f.id, "A-1", "Copia", date(2026, 7, 1));
        assert!(matches!(dup, Err(StoreError::Validation(_))));

        // Same code under another pharmacy is fine.
        let otra = farmacia(&conn, "Del Sol");
        MedicamentoRepo::crear(&conn, otra.id, "A-1", "Ajeno", date(2026, 7, 1)).unwrap();

        // And the code frees up after a logical delete.
        MedicamentoRepo::eliminar(&conn, f.id, "A-1", MotivoBaja::EliminadoManual).unwrap();
        let reusado =
            MedicamentoRepo::crear(&conn, f.id, "A-1", "Sucesor", date(2026, 8, 1)).unwrap();
        assert_eq!(reusado.nombre, "Sucesor");
    }

    #[test]
    fn listar_excluye_inactivos_y_ordena_por_fecha() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        MedicamentoRepo::crear(&conn, f.id, "B-2", "Tardío", date(2026, 9, 1)).unwrap();
        MedicamentoRepo::crear(&conn, f.id, "A-1", "Pronto", date(2026, 6, 1)).unwrap();
        MedicamentoRepo::crear(&conn, f.id, "C-3", "Borrado", date(2026, 5, 1)).unwrap();
        MedicamentoRepo::eliminar(&conn, f.id, "C-3", MotivoBaja::EliminadoManual).unwrap();

        let codigos: Vec<String> = MedicamentoRepo::listar(&conn, f.id)
            .unwrap()
            .into_iter()
            .map(|m| m.codigo)
            .collect();
        assert_eq!(codigos, vec!["A-1", "B-2"]);
    }

    #[test]
    fn actualizar_parcial() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        MedicamentoRepo::crear(&conn, f.id, "A-1", "Original", date(2026, 6, 1)).unwrap();

        let solo_fecha = MedicamentoRepo::actualizar(
            &conn,
            f.id,
            "A-1",
            CambiosMedicamento {
                nombre: None,
                fecha_vencimiento: Some(date(2026, 12, 1)),
            },
        )
        .unwrap();
        assert_eq!(solo_fecha.nombre, "Original");
        assert_eq!(solo_fecha.fecha_vencimiento, date(2026, 12, 1));

        let solo_nombre = MedicamentoRepo::actualizar(
            &conn,
            f.id,
            "A-1",
            CambiosMedicamento {
                nombre: Some("Renovado".to_string()),
                fecha_vencimiento: None,
            },
        )
        .unwrap();
        assert_eq!(solo_nombre.nombre, "Renovado");
        assert_eq!(solo_nombre.fecha_vencimiento, date(2026, 12, 1));

        let vacio = MedicamentoRepo::actualizar(&conn, f.id, "A-1", CambiosMedicamento::default());
        assert!(matches!(vacio, Err(StoreError::Validation(_))));

        let perdido = MedicamentoRepo::actualizar(
            &conn,
            f.id,
            "Z-9",
            CambiosMedicamento {
                nombre: Some("x".to_string()),
                fecha_vencimiento: None,
            },
        );
        assert!(matches!(perdido, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn eliminar_registra_motivo_y_no_repite() {
        let conn = setup();
        let f = farmacia(&conn, "Central");
        MedicamentoRepo::crear(&conn, f.id, "A-1", "Algo", date(2026, 6, 1)).unwrap();

        let baja =
            MedicamentoRepo::eliminar(&conn, f.id, "A-1", MotivoBaja::VencidoAutomatico).unwrap();
        assert!(!baja.activo);
        assert_eq!(baja.motivo_baja, Some(MotivoBaja::VencidoAutomatico));

        let repetido = MedicamentoRepo::eliminar(&conn, f.id, "A-1", MotivoBaja::EliminadoManual);
        assert!(matches!(repetido, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn por_vencer_respeta_umbral_de_cada_farmacia() {
        let conn = setup();
        let hoy = date(2026, 3, 1);

        let amplia = farmacia(&conn, "Amplia");
        FarmaciaRepo::configurar_umbral(&conn, amplia.id, 10).unwrap();
        let estricta = farmacia(&conn, "Estricta");
        FarmaciaRepo::configurar_umbral(&conn, estricta.id, 3).unwrap();

        // Boundary: +10 inside for umbral 10, +11 outside.
        MedicamentoRepo::crear(&conn, amplia.id, "IN-10", "Límite", date(2026, 3, 11)).unwrap();
        MedicamentoRepo::crear(&conn, amplia.id, "OUT-11", "Fuera", date(2026, 3, 12)).unwrap();
        // Already expired: excluded even though it is "within" 10 days.
        MedicamentoRepo::crear(&conn, amplia.id, "EXP", "Pasado", date(2026, 2, 28)).unwrap();
        // Same-day expiry counts.
        MedicamentoRepo::crear(&conn, amplia.id, "HOY", "Justo", hoy).unwrap();
        // +5 is inside for umbral 10 but outside for umbral 3.
        MedicamentoRepo::crear(&conn, amplia.id, "A+5", "Dentro", date(2026, 3, 6)).unwrap();
        MedicamentoRepo::crear(&conn, estricta.id, "E+5", "Fuera", date(2026, 3, 6)).unwrap();

        let filas = MedicamentoRepo::por_vencer(&conn, hoy).unwrap();
        let codigos: Vec<&str> = filas.iter().map(|m| m.codigo.as_str()).collect();
        assert_eq!(codigos, vec!["HOY", "A+5", "IN-10"]);

        let limite = filas.iter().find(|m| m.codigo == "IN-10").unwrap();
        assert_eq!(limite.dias_restantes, 10);
        assert_eq!(limite.umbral_dias, 10);
    }

    #[test]
    fn por_vencer_ignora_farmacias_inactivas() {
        let conn = setup();
        let hoy = date(2026, 3, 1);
        let f = farmacia(&conn, "Cerrada");
        MedicamentoRepo::crear(&conn, f.id, "A-1", "Algo", date(2026, 3, 2)).unwrap();
        FarmaciaRepo::cambiar_activo(&conn, "Cerrada", false).unwrap();

        assert!(MedicamentoRepo::por_vencer(&conn, hoy).unwrap().is_empty());
    }

    #[test]
    fn vencidos_es_estricto() {
        let conn = setup();
        let hoy = date(2026, 3, 1);
        let f = farmacia(&conn, "Central");
        MedicamentoRepo::crear(&conn, f.id, "AYER", "Pasado", date(2026, 2, 28)).unwrap();
        MedicamentoRepo::crear(&conn, f.id, "HOY", "Justo", hoy).unwrap();

        let vencidos = MedicamentoRepo::vencidos(&conn, hoy).unwrap();
        assert_eq!(vencidos.len(), 1);
        assert_eq!(vencidos[0].codigo, "AYER");
    }
}
