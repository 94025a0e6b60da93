//! Console rendering for daemon messages.
//!
//! Everything the user sees goes through here; the session and admin
//! loops only print what these functions return.

use pharma_core::{Estadisticas, Farmacia, Medicamento, Notificacion, ResumenEstado};
use pharma_protocol::{AdminResponse, ErrorKind, ServerMessage};

/// Command reference printed by `ayuda`.
pub const AYUDA: &str = "\
Comandos disponibles:
  crear <codigo> <nombre> <fecha AAAA-MM-DD>   Registrar un medicamento
  listar                                       Listar el inventario activo
  buscar <codigo>                              Buscar un medicamento
  actualizar <codigo> [nombre=<texto>] [fecha=<AAAA-MM-DD>]
  eliminar <codigo>                            Dar de baja un medicamento
  notificaciones [nuevas]                      Ver el historial (las marca leídas)
  umbral <dias>                                Cambiar los días de aviso
  resumen                                      Ver el resumen de estado
  salir                                        Desconectar";

/// Renders any server message for the console.
pub fn server_message(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::Rechazo { motivo, .. } => format!("Conexión rechazada: {motivo}"),
        ServerMessage::Resumen { resumen } => resumen_estado(resumen),
        ServerMessage::Medicamentos { medicamentos } => tabla_medicamentos(medicamentos),
        ServerMessage::Medicamento { medicamento } => fila_medicamento(medicamento),
        ServerMessage::Confirmacion { mensaje } => mensaje.clone(),
        ServerMessage::Notificaciones { notificaciones } => {
            tabla_notificaciones(notificaciones)
        }
        ServerMessage::Notificacion { notificacion } => notificacion_push(notificacion),
        ServerMessage::Error { kind, mensaje } => match kind {
            ErrorKind::Desactivada => format!("*** {mensaje}"),
            _ => format!("Error: {mensaje}"),
        },
        ServerMessage::Despedida { mensaje } => mensaje.clone(),
    }
}

/// Renders the status digest sent after admission and on `resumen`.
pub fn resumen_estado(resumen: &ResumenEstado) -> String {
    let mut out = format!(
        "=== Resumen de estado ===\n\
         Medicamentos activos:      {}\n\
         Notificaciones sin leer:   {}",
        resumen.medicamentos_activos, resumen.notificaciones_no_leidas
    );
    if !resumen.vencidos_mientras_ausente.is_empty() {
        out.push_str("\nVencidos durante tu ausencia:");
        for vencido in &resumen.vencidos_mientras_ausente {
            out.push_str(&format!(
                "\n  - {} (venció el {})",
                vencido.nombre, vencido.fecha_vencimiento
            ));
        }
    }
    out
}

fn tabla_medicamentos(medicamentos: &[Medicamento]) -> String {
    if medicamentos.is_empty() {
        return "No hay medicamentos activos.".to_string();
    }
    let mut out = format!("{:<12} {:<30} {}", "CODIGO", "NOMBRE", "VENCE");
    for m in medicamentos {
        out.push_str(&format!(
            "\n{:<12} {:<30} {}",
            m.codigo, m.nombre, m.fecha_vencimiento
        ));
    }
    out
}

fn fila_medicamento(m: &Medicamento) -> String {
    format!(
        "{} — {} (vence el {})",
        m.codigo, m.nombre, m.fecha_vencimiento
    )
}

fn tabla_notificaciones(notificaciones: &[Notificacion]) -> String {
    if notificaciones.is_empty() {
        return "No hay notificaciones.".to_string();
    }
    let mut out = format!("{} notificación(es):", notificaciones.len());
    for n in notificaciones {
        let marca = if n.leida { " " } else { "*" };
        out.push_str(&format!(
            "\n{marca} [{}] {} — {}",
            n.creado_en.format("%Y-%m-%d %H:%M"),
            n.tipo,
            n.mensaje
        ));
    }
    out
}

/// Renders a notification pushed over the bus, marked so it stands out
/// from command responses on the shared terminal.
pub fn notificacion_push(n: &Notificacion) -> String {
    format!(">>> [{}] {}", n.tipo, n.mensaje)
}

/// Renders any administrative response for the console.
pub fn admin_response(resp: &AdminResponse) -> String {
    match resp {
        AdminResponse::Ok { mensaje } => mensaje.clone(),
        AdminResponse::Farmacias { farmacias } => tabla_farmacias(farmacias),
        AdminResponse::Estadisticas { estadisticas } => tabla_estadisticas(estadisticas),
        AdminResponse::Status {
            farmacias_conectadas,
            total_conectadas,
        } => {
            if farmacias_conectadas.is_empty() {
                "No hay farmacias conectadas.".to_string()
            } else {
                format!(
                    "{total_conectadas} farmacia(s) conectada(s): {}",
                    farmacias_conectadas.join(", ")
                )
            }
        }
        AdminResponse::Error { mensaje } => format!("Error: {mensaje}"),
    }
}

fn tabla_farmacias(farmacias: &[Farmacia]) -> String {
    if farmacias.is_empty() {
        return "No hay farmacias registradas.".to_string();
    }
    let mut out = format!("{:<5} {:<30} {:<8} {}", "ID", "NOMBRE", "UMBRAL", "ESTADO");
    for f in farmacias {
        let estado = if f.activo { "activa" } else { "inactiva" };
        out.push_str(&format!(
            "\n{:<5} {:<30} {:<8} {}",
            f.id, f.nombre, f.umbral_dias, estado
        ));
    }
    out
}

fn tabla_estadisticas(e: &Estadisticas) -> String {
    format!(
        "=== Estadísticas ===\n\
         Farmacias activas:         {}\n\
         Medicamentos activos:      {}\n\
         Próximos a vencer (7d):    {}\n\
         Notificaciones de hoy:     {}",
        e.farmacias_activas, e.medicamentos_activos, e.proximos_a_vencer, e.notificaciones_hoy
    )
}
