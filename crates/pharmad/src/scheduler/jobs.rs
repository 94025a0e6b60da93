//! Background job vocabulary and execution.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pharma_core::{FarmaciaId, MedicamentoPorVencer, MotivoBaja, TipoNotificacion};
use pharma_store::{Store, StoreError, StoreResult};
use tracing::{debug, info};

use crate::bus::NotificationBus;

/// A unit of background work.
#[derive(Debug, Clone)]
pub enum Job {
    /// Walk every active inventory: raise alerts for items inside their
    /// farmacia's alert window, retire items already expired.
    ExpirationScan,

    /// Delete read notifications older than the retention window.
    PurgeNotificaciones,

    /// Persist a notification for an inventory event, then publish it.
    Notify {
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: String,
        codigo: Option<String>,
    },
}

impl Job {
    /// Stable name used in logs and scheduler events.
    pub fn nombre(&self) -> &'static str {
        match self {
            Job::ExpirationScan => "verificar_vencimientos",
            Job::PurgeNotificaciones => "limpiar_notificaciones_antiguas",
            Job::Notify { .. } => "notificar_evento",
        }
    }
}

/// Everything a worker needs to execute jobs.
pub(crate) struct JobContext {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) bus: NotificationBus,
    pub(crate) retention_days: u32,
}

impl JobContext {
    pub(crate) async fn execute(&self, job: &Job) -> StoreResult<()> {
        match job {
            Job::ExpirationScan => self.expiration_scan().await,
            Job::PurgeNotificaciones => self.purge().await,
            Job::Notify {
                farmacia_id,
                tipo,
                mensaje,
                codigo,
            } => self.notify(*farmacia_id, *tipo, mensaje, codigo.as_deref()).await,
        }
    }

    /// Persists one notification, then publishes it. Persist-then-publish
    /// is what makes a missed live push recoverable from the history.
    async fn notify(
        &self,
        farmacia_id: FarmaciaId,
        tipo: TipoNotificacion,
        mensaje: &str,
        codigo: Option<&str>,
    ) -> StoreResult<()> {
        let notificacion = self
            .store
            .crear_notificacion(farmacia_id, tipo, mensaje, codigo)
            .await?;
        self.bus.publish(notificacion);
        Ok(())
    }

    async fn expiration_scan(&self) -> StoreResult<()> {
        // The store stamps rows in UTC, so the dedup day must be UTC too.
        let hoy = Utc::now().date_naive();

        let mut alertas = 0u64;
        for item in self.store.medicamentos_por_vencer(hoy).await? {
            // One alert per item per calendar day, across restarts and
            // overlapping runs.
            if self
                .store
                .existe_alerta_del_dia(item.farmacia_id, &item.codigo, hoy)
                .await?
            {
                continue;
            }
            let mensaje = mensaje_alerta(&item);
            self.notify(
                item.farmacia_id,
                TipoNotificacion::ProximoVencimiento,
                &mensaje,
                Some(&item.codigo),
            )
            .await?;
            alertas += 1;
        }

        let mut retirados = 0u64;
        for vencido in self.store.medicamentos_vencidos(hoy).await? {
            match self
                .store
                .eliminar_medicamento(
                    vencido.farmacia_id,
                    &vencido.codigo,
                    MotivoBaja::VencidoAutomatico,
                )
                .await
            {
                Ok(_) => {}
                // An overlapping run already retired it.
                Err(StoreError::NotFound(_)) => {
                    debug!(codigo = %vencido.codigo, "item already retired");
                    continue;
                }
                Err(e) => return Err(e),
            }

            let mensaje = format!(
                "El medicamento '{}' (código: {}) venció el {} y fue retirado automáticamente del inventario.",
                vencido.nombre, vencido.codigo, vencido.fecha_vencimiento
            );
            self.notify(
                vencido.farmacia_id,
                TipoNotificacion::Sistema,
                &mensaje,
                Some(&vencido.codigo),
            )
            .await?;
            retirados += 1;
        }

        info!(alertas, retirados, "expiration scan finished");
        Ok(())
    }

    async fn purge(&self) -> StoreResult<()> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let eliminadas = self.store.purgar_leidas_antes_de(cutoff).await?;
        info!(
            eliminadas,
            retention_days = self.retention_days,
            "old notifications purged"
        );
        Ok(())
    }
}

/// Alert message for an item inside its farmacia's alert window.
fn mensaje_alerta(item: &MedicamentoPorVencer) -> String {
    let cuando = match item.dias_restantes {
        0 => "hoy".to_string(),
        1 => "en 1 día".to_string(),
        n => format!("en {n} días"),
    };
    format!(
        "El medicamento '{}' (código: {}) vence {} ({}).",
        item.nombre, item.codigo, cuando, item.fecha_vencimiento
    )
}
