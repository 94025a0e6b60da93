//! Farmacia repository.
//!
//! Name matching goes through the normalized column (`nombre_norm`),
//! which holds [`registry_key`] output. The session registry uses the
//! same function, so "is registered" and "may connect" agree on what a
//! name means.

use chrono::Utc;
use pharma_core::farmacia::validar_nombre;
use pharma_core::{registry_key, Farmacia, FarmaciaId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::sqlite::rows::{farmacia_from_row, fmt_ts, parse_ts};
use crate::store::{EstadoCambio, UmbralCambio};

const COLS: &str = "id, nombre, umbral_dias, activo, creado_en";

pub struct FarmaciaRepo;

impl FarmaciaRepo {
    /// Looks a pharmacy up by (normalized) name.
    pub fn get_by_nombre(conn: &Connection, nombre: &str) -> StoreResult<Option<Farmacia>> {
        let farmacia = conn
            .query_row(
                &format!("SELECT {COLS} FROM farmacias WHERE nombre_norm = ?1"),
                params![registry_key(nombre)],
                farmacia_from_row,
            )
            .optional()?;
        Ok(farmacia)
    }

    pub fn crear(conn: &Connection, nombre: &str, umbral_dias: u32) -> StoreResult<Farmacia> {
        let nombre = validar_nombre(nombre).map_err(|_| {
            StoreError::Validation("El nombre de la farmacia no puede estar vacío.".to_string())
        })?;
        if Self::get_by_nombre(conn, &nombre)?.is_some() {
            return Err(StoreError::Validation(format!(
                "Ya existe una farmacia con el nombre '{nombre}'."
            )));
        }

        let ts = fmt_ts(Utc::now());
        conn.execute(
            "INSERT INTO farmacias (nombre, nombre_norm, umbral_dias, activo, creado_en)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![nombre, registry_key(&nombre), umbral_dias, ts],
        )?;

        Ok(Farmacia {
            id: FarmaciaId::new(conn.last_insert_rowid()),
            nombre,
            umbral_dias,
            activo: true,
            creado_en: parse_ts(0, &ts)?,
        })
    }

    /// Active pharmacies first, each group alphabetically.
    pub fn listar(conn: &Connection) -> StoreResult<Vec<Farmacia>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM farmacias ORDER BY activo DESC, nombre_norm ASC"
        ))?;
        let farmacias = stmt
            .query_map([], farmacia_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(farmacias)
    }

    /// Renames an active pharmacy. Deactivated rows are not rename
    /// targets; reactivate first.
    pub fn renombrar(
        conn: &Connection,
        nombre_actual: &str,
        nombre_nuevo: &str,
    ) -> StoreResult<Farmacia> {
        let nombre_nuevo = validar_nombre(nombre_nuevo).map_err(|_| {
            StoreError::Validation("El nombre de la farmacia no puede estar vacío.".to_string())
        })?;
        let existente = Self::get_by_nombre(conn, nombre_actual)?
            .filter(|f| f.activo)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "No se encontró una farmacia activa con el nombre '{}'.",
                    nombre_actual.trim()
                ))
            })?;

        // A rename to the same normalized name just fixes the spelling.
        if let Some(otra) = Self::get_by_nombre(conn, &nombre_nuevo)? {
            if otra.id != existente.id {
                return Err(StoreError::Validation(format!(
                    "Ya existe una farmacia con el nombre '{nombre_nuevo}'."
                )));
            }
        }

        conn.execute(
            "UPDATE farmacias SET nombre = ?1, nombre_norm = ?2 WHERE id = ?3",
            params![nombre_nuevo, registry_key(&nombre_nuevo), existente.id.get()],
        )?;

        Ok(Farmacia {
            nombre: nombre_nuevo,
            ..existente
        })
    }

    /// Flips the active flag. `cambiado` is false when the pharmacy was
    /// already in the requested state.
    pub fn cambiar_activo(
        conn: &Connection,
        nombre: &str,
        activo: bool,
    ) -> StoreResult<EstadoCambio> {
        let farmacia = Self::get_by_nombre(conn, nombre)?.ok_or_else(|| {
            StoreError::NotFound(format!(
                "No existe ninguna farmacia con el nombre '{}'.",
                nombre.trim()
            ))
        })?;

        if farmacia.activo == activo {
            return Ok(EstadoCambio {
                farmacia,
                cambiado: false,
            });
        }

        conn.execute(
            "UPDATE farmacias SET activo = ?1 WHERE id = ?2",
            params![activo, farmacia.id.get()],
        )?;

        Ok(EstadoCambio {
            farmacia: Farmacia { activo, ..farmacia },
            cambiado: true,
        })
    }

    /// Updates the alert threshold of an active pharmacy.
    pub fn configurar_umbral(
        conn: &Connection,
        farmacia_id: FarmaciaId,
        umbral_dias: u32,
    ) -> StoreResult<UmbralCambio> {
        if umbral_dias == 0 {
            return Err(StoreError::Validation(
                "El umbral debe ser mayor que cero.".to_string(),
            ));
        }

        let anterior: Option<u32> = conn
            .query_row(
                "SELECT umbral_dias FROM farmacias WHERE id = ?1 AND activo = 1",
                params![farmacia_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let anterior = anterior.ok_or_else(|| {
            StoreError::NotFound("Farmacia no encontrada o inactiva.".to_string())
        })?;

        if anterior == umbral_dias {
            return Ok(UmbralCambio {
                anterior,
                nuevo: umbral_dias,
            });
        }

        conn.execute(
            "UPDATE farmacias SET umbral_dias = ?1 WHERE id = ?2 AND activo = 1",
            params![umbral_dias, farmacia_id.get()],
        )?;

        Ok(UmbralCambio {
            anterior,
            nuevo: umbral_dias,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::schema;
    use pharma_core::DEFAULT_UMBRAL_DIAS;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::configure_connection(&conn).unwrap();
        schema::run_migrations(&conn).unwrap();
        conn
    }

    fn crear(conn: &Connection, nombre: &str) -> Farmacia {
        FarmaciaRepo::crear(conn, nombre, DEFAULT_UMBRAL_DIAS).unwrap()
    }

    #[test]
    fn crear_applies_defaults() {
        let conn = setup();
        let farmacia = crear(&conn, "Farmacia Central");
        assert_eq!(farmacia.nombre, "Farmacia Central");
        assert_eq!(farmacia.umbral_dias, DEFAULT_UMBRAL_DIAS);
        assert!(farmacia.activo);

        let releida = FarmaciaRepo::get_by_nombre(&conn, "Farmacia Central")
            .unwrap()
            .unwrap();
        assert_eq!(releida, farmacia);
    }

    #[test]
    fn crear_honors_configured_umbral() {
        let conn = setup();
        let farmacia = FarmaciaRepo::crear(&conn, "Central", 14).unwrap();
        assert_eq!(farmacia.umbral_dias, 14);
    }

    #[test]
    fn crear_trims_and_rejects_empty() {
        let conn = setup();
        let farmacia = crear(&conn, "  Del Sol  ");
        assert_eq!(farmacia.nombre, "Del Sol");

        let err = FarmaciaRepo::crear(&conn, "   ", DEFAULT_UMBRAL_DIAS).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn crear_rejects_duplicate_ignoring_case_and_spaces() {
        let conn = setup();
        crear(&conn, "Central");
        let err = FarmaciaRepo::crear(&conn, "  CENTRAL ", DEFAULT_UMBRAL_DIAS).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(err.to_string().contains("Ya existe una farmacia"));
    }

    #[test]
    fn get_matches_loosely_but_returns_stored_spelling() {
        let conn = setup();
        crear(&conn, "Farmacia Del Sol");
        let encontrada = FarmaciaRepo::get_by_nombre(&conn, "  farmacia del sol ")
            .unwrap()
            .unwrap();
        assert_eq!(encontrada.nombre, "Farmacia Del Sol");
        assert!(FarmaciaRepo::get_by_nombre(&conn, "otra").unwrap().is_none());
    }

    #[test]
    fn renombrar_changes_spelling_and_rejects_collision() {
        let conn = setup();
        crear(&conn, "Vieja");
        crear(&conn, "Ocupada");

        let renombrada = FarmaciaRepo::renombrar(&conn, "vieja", "Nueva").unwrap();
        assert_eq!(renombrada.nombre, "Nueva");
        assert!(FarmaciaRepo::get_by_nombre(&conn, "Vieja").unwrap().is_none());

        let err = FarmaciaRepo::renombrar(&conn, "Nueva", "ocupada").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Same pharmacy, different capitalization: allowed.
        let respelled = FarmaciaRepo::renombrar(&conn, "nueva", "NUEVA").unwrap();
        assert_eq!(respelled.nombre, "NUEVA");
    }

    #[test]
    fn renombrar_skips_unknown_and_inactive() {
        let conn = setup();
        let err = FarmaciaRepo::renombrar(&conn, "fantasma", "Otra").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        crear(&conn, "Apagada");
        FarmaciaRepo::cambiar_activo(&conn, "Apagada", false).unwrap();
        let err = FarmaciaRepo::renombrar(&conn, "Apagada", "Encendida").unwrap_err();
        assert!(err
            .to_string()
            .contains("No se encontró una farmacia activa con el nombre 'Apagada'."));
    }

    #[test]
    fn cambiar_activo_reports_noop() {
        let conn = setup();
        crear(&conn, "Central");

        let primera = FarmaciaRepo::cambiar_activo(&conn, "Central", false).unwrap();
        assert!(primera.cambiado);
        assert!(!primera.farmacia.activo);

        let repetida = FarmaciaRepo::cambiar_activo(&conn, "Central", false).unwrap();
        assert!(!repetida.cambiado);

        let reactivada = FarmaciaRepo::cambiar_activo(&conn, "Central", true).unwrap();
        assert!(reactivada.cambiado);
        assert!(reactivada.farmacia.activo);
    }

    #[test]
    fn configurar_umbral_cases() {
        let conn = setup();
        let farmacia = crear(&conn, "Central");

        let cambio = FarmaciaRepo::configurar_umbral(&conn, farmacia.id, 15).unwrap();
        assert_eq!(cambio.anterior, DEFAULT_UMBRAL_DIAS);
        assert_eq!(cambio.nuevo, 15);
        assert!(cambio.cambiado());

        let noop = FarmaciaRepo::configurar_umbral(&conn, farmacia.id, 15).unwrap();
        assert!(!noop.cambiado());

        let zero = FarmaciaRepo::configurar_umbral(&conn, farmacia.id, 0).unwrap_err();
        assert!(matches!(zero, StoreError::Validation(_)));

        FarmaciaRepo::cambiar_activo(&conn, "Central", false).unwrap();
        let inactiva = FarmaciaRepo::configurar_umbral(&conn, farmacia.id, 10).unwrap_err();
        assert!(matches!(inactiva, StoreError::NotFound(_)));
    }

    #[test]
    fn listar_pone_activas_primero_y_ordena_por_nombre() {
        let conn = setup();
        crear(&conn, "Zeta");
        crear(&conn, "Alfa");
        crear(&conn, "media");
        FarmaciaRepo::cambiar_activo(&conn, "media", false).unwrap();

        let nombres: Vec<String> = FarmaciaRepo::listar(&conn)
            .unwrap()
            .into_iter()
            .map(|f| f.nombre)
            .collect();
        assert_eq!(nombres, vec!["Alfa", "Zeta", "media"]);
    }
}
