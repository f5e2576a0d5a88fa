//! Befehlsparser fuer das Zeilenprotokoll
//!
//! Eine Zeile ist entweder Chat-Text oder ein Befehl. Befehle beginnen mit
//! dem Marker `/`:
//!
//! ```text
//! /nick <name>         Namen setzen oder aendern
//! /msg <name> <text>   Private Nachricht
//! /who                 Verbundene Teilnehmer auflisten
//! /whoami              Eigenen Namen anzeigen
//! /help                Befehlsuebersicht
//! /ip                  Adresse des Servers anzeigen
//! /port                Port des Servers anzeigen
//! /quit                Verbindung beenden
//! ```
//!
//! Chat-Text, der selbst mit `/` beginnen soll, wird mit `//` escaped.
//! Jede andere Zeile mit fuehrendem `/` ist ein Syntaxfehler, sie wird nie
//! stillschweigend als Text verschickt.

use crate::error::{ProtokollFehler, ProtokollResult};

/// Marker fuer Befehle
pub const BEFEHLS_MARKER: char = '/';

/// Standard-maximale Namenslaenge in Zeichen
pub const DEFAULT_MAX_NAME_LAENGE: usize = 32;

/// Ein geparster Befehl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Befehl {
    /// `/nick <name>`
    Nick(String),
    /// `/msg <name> <text>`
    Msg { an: String, text: String },
    /// `/who`
    Who,
    /// `/whoami`
    WhoAmI,
    /// `/help`
    Help,
    /// `/ip`
    Ip,
    /// `/port`
    Port,
    /// `/quit`
    Quit,
}

/// Eine geparste Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    /// Chat-Text (bereits ent-escaped)
    Text(String),
    /// Befehl
    Befehl(Befehl),
}

/// Parst eine Eingabezeile (ohne Zeilenende)
///
/// Gibt `Ok(None)` fuer leere oder nur aus Leerzeichen bestehende Zeilen
/// zurueck; diese werden verworfen.
pub fn parse_line(zeile: &str) -> ProtokollResult<Option<Eingabe>> {
    if zeile.trim().is_empty() {
        return Ok(None);
    }

    let rest = match zeile.strip_prefix(BEFEHLS_MARKER) {
        Some(rest) => rest,
        None => return Ok(Some(Eingabe::Text(zeile.to_string()))),
    };

    // `//text` -> Chat-Text `/text`
    if rest.starts_with(BEFEHLS_MARKER) {
        return Ok(Some(Eingabe::Text(rest.to_string())));
    }

    let (wort, argumente) = match rest.split_once(char::is_whitespace) {
        Some((wort, argumente)) => (wort, argumente.trim()),
        None => (rest, ""),
    };
    if wort.is_empty() {
        return Err(ProtokollFehler::LeererBefehl);
    }

    let befehl = match wort.to_lowercase().as_str() {
        "nick" => {
            let mut teile = argumente.split_whitespace();
            match (teile.next(), teile.next()) {
                (Some(name), None) => Befehl::Nick(name.to_string()),
                _ => return Err(ProtokollFehler::Verwendung("/nick <name>")),
            }
        }
        "msg" => match argumente.split_once(char::is_whitespace) {
            Some((an, text)) if !text.trim().is_empty() => Befehl::Msg {
                an: an.to_string(),
                text: text.trim_start().to_string(),
            },
            _ => return Err(ProtokollFehler::Verwendung("/msg <name> <text>")),
        },
        "who" => ohne_argumente(argumente, Befehl::Who, "/who")?,
        "whoami" => ohne_argumente(argumente, Befehl::WhoAmI, "/whoami")?,
        "help" => ohne_argumente(argumente, Befehl::Help, "/help")?,
        "ip" => ohne_argumente(argumente, Befehl::Ip, "/ip")?,
        "port" => ohne_argumente(argumente, Befehl::Port, "/port")?,
        "quit" => ohne_argumente(argumente, Befehl::Quit, "/quit")?,
        _ => return Err(ProtokollFehler::UnbekannterBefehl(wort.to_string())),
    };

    Ok(Some(Eingabe::Befehl(befehl)))
}

fn ohne_argumente(
    argumente: &str,
    befehl: Befehl,
    verwendung: &'static str,
) -> ProtokollResult<Befehl> {
    if argumente.is_empty() {
        Ok(befehl)
    } else {
        Err(ProtokollFehler::Verwendung(verwendung))
    }
}

/// Prueft einen Anzeigenamen
///
/// Regeln: nicht leer, keine Leerzeichen, keine Steuerzeichen, beginnt nicht
/// mit dem Befehls-Marker, hoechstens `max_laenge` Zeichen.
pub fn name_pruefen(name: &str, max_laenge: usize) -> ProtokollResult<()> {
    if name.trim().is_empty() {
        return Err(ProtokollFehler::NameLeer);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ProtokollFehler::NameMitLeerzeichen);
    }
    if name.starts_with(BEFEHLS_MARKER) || name.chars().any(char::is_control) {
        return Err(ProtokollFehler::NameUngueltig);
    }
    if name.chars().count() > max_laenge {
        return Err(ProtokollFehler::NameZuLang { max: max_laenge });
    }
    Ok(())
}
