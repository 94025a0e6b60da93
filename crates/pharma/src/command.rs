//! Parser for the interactive console's command lines.
//!
//! Each line the user types maps to one [`ClientRequest`] or a local
//! action (help, blank line). Parse failures return the message to show
//! the user; nothing malformed ever reaches the wire.

use chrono::NaiveDate;
use pharma_protocol::ClientRequest;

/// What a typed line asks the console to do.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    /// Send a request to the daemon.
    Send(ClientRequest),
    /// Print the command reference locally.
    Ayuda,
    /// Blank line; nothing to do.
    Nada,
}

/// Parses one console line. `Err` carries the user-facing message.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((verbo, resto)) = tokens.split_first() else {
        return Ok(ConsoleCommand::Nada);
    };

    match verbo.to_lowercase().as_str() {
        "ayuda" | "help" | "?" => Ok(ConsoleCommand::Ayuda),
        "crear" => parse_crear(resto).map(ConsoleCommand::Send),
        "listar" => sin_argumentos(resto, ClientRequest::ListarMedicamentos),
        "buscar" => parse_codigo(resto, "buscar")
            .map(|codigo| ConsoleCommand::Send(ClientRequest::BuscarMedicamento { codigo })),
        "actualizar" => parse_actualizar(resto).map(ConsoleCommand::Send),
        "eliminar" => parse_codigo(resto, "eliminar")
            .map(|codigo| ConsoleCommand::Send(ClientRequest::EliminarMedicamento { codigo })),
        "notificaciones" => parse_notificaciones(resto).map(ConsoleCommand::Send),
        "umbral" => parse_umbral(resto).map(ConsoleCommand::Send),
        "resumen" => sin_argumentos(resto, ClientRequest::ResumenEstado),
        "salir" => sin_argumentos(resto, ClientRequest::Desconectar),
        otro => Err(format!(
            "Comando desconocido: '{otro}'. Escribe 'ayuda' para ver los comandos."
        )),
    }
}

fn sin_argumentos(resto: &[&str], request: ClientRequest) -> Result<ConsoleCommand, String> {
    if resto.is_empty() {
        Ok(ConsoleCommand::Send(request))
    } else {
        Err("Este comando no lleva argumentos.".to_string())
    }
}

/// `crear <codigo> <nombre...> <fecha AAAA-MM-DD>` — the name may span
/// several words; the date is always the last token.
fn parse_crear(resto: &[&str]) -> Result<ClientRequest, String> {
    if resto.len() < 3 {
        return Err("Uso: crear <codigo> <nombre> <fecha AAAA-MM-DD>".to_string());
    }
    let (codigo, demas) = match resto.split_first() {
        Some(partes) => partes,
        None => return Err("Uso: crear <codigo> <nombre> <fecha AAAA-MM-DD>".to_string()),
    };
    let (fecha, nombre_tokens) = match demas.split_last() {
        Some(partes) => partes,
        None => return Err("Uso: crear <codigo> <nombre> <fecha AAAA-MM-DD>".to_string()),
    };
    Ok(ClientRequest::CrearMedicamento {
        codigo: codigo.to_string(),
        nombre: nombre_tokens.join(" "),
        fecha_vencimiento: parse_fecha(fecha)?,
    })
}

fn parse_codigo(resto: &[&str], verbo: &str) -> Result<String, String> {
    match resto {
        [codigo] => Ok(codigo.to_string()),
        _ => Err(format!("Uso: {verbo} <codigo>")),
    }
}

/// `actualizar <codigo> [nombre=<texto...>] [fecha=<AAAA-MM-DD>]` —
/// `nombre=` consumes following words until a `fecha=` token or the end
/// of the line.
fn parse_actualizar(resto: &[&str]) -> Result<ClientRequest, String> {
    const USO: &str = "Uso: actualizar <codigo> [nombre=<texto>] [fecha=<AAAA-MM-DD>]";

    let Some((codigo, args)) = resto.split_first() else {
        return Err(USO.to_string());
    };

    let mut nombre_tokens: Vec<&str> = Vec::new();
    let mut fecha = None;
    let mut en_nombre = false;

    for token in args {
        if let Some(valor) = token.strip_prefix("fecha=") {
            fecha = Some(parse_fecha(valor)?);
            en_nombre = false;
        } else if let Some(valor) = token.strip_prefix("nombre=") {
            nombre_tokens.clear();
            if !valor.is_empty() {
                nombre_tokens.push(valor);
            }
            en_nombre = true;
        } else if en_nombre {
            nombre_tokens.push(token);
        } else {
            return Err(format!("No entiendo '{token}'. {USO}"));
        }
    }

    let nombre = if nombre_tokens.is_empty() {
        None
    } else {
        Some(nombre_tokens.join(" "))
    };

    if nombre.is_none() && fecha.is_none() {
        return Err(format!("Indica al menos un campo a cambiar. {USO}"));
    }

    Ok(ClientRequest::ActualizarMedicamento {
        codigo: codigo.to_string(),
        nombre,
        fecha_vencimiento: fecha,
    })
}

/// `notificaciones [nuevas]` — `nuevas` limits the listing to unread.
fn parse_notificaciones(resto: &[&str]) -> Result<ClientRequest, String> {
    match resto {
        [] => Ok(ClientRequest::VerNotificaciones {
            solo_no_leidas: false,
        }),
        [filtro] if filtro.eq_ignore_ascii_case("nuevas") => Ok(ClientRequest::VerNotificaciones {
            solo_no_leidas: true,
        }),
        _ => Err("Uso: notificaciones [nuevas]".to_string()),
    }
}

fn parse_umbral(resto: &[&str]) -> Result<ClientRequest, String> {
    match resto {
        [dias] => {
            let umbral_dias: u32 = dias
                .parse()
                .map_err(|_| format!("'{dias}' no es un número de días válido."))?;
            Ok(ClientRequest::ConfigurarUmbral { umbral_dias })
        }
        _ => Err("Uso: umbral <dias>".to_string()),
    }
}

fn parse_fecha(valor: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(valor, "%Y-%m-%d")
        .map_err(|_| format!("Fecha inválida: '{valor}'. Usa el formato AAAA-MM-DD."))
}
