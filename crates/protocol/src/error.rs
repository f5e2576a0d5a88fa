//! Fehlertypen fuer das Zeilenprotokoll

use thiserror::Error;

/// Syntax- und Validierungsfehler einer eingehenden Zeile
///
/// Alle Varianten sind fuer die Session behebbar: der Client bekommt
/// `! <grund>` zurueck und die Verbindung bleibt offen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtokollFehler {
    #[error("Unbekannter Befehl: /{0}")]
    UnbekannterBefehl(String),

    #[error("Leerer Befehl")]
    LeererBefehl,

    #[error("Falsche Verwendung, erwartet: {0}")]
    Verwendung(&'static str),

    #[error("Name ist leer")]
    NameLeer,

    #[error("Name enthaelt Leerzeichen")]
    NameMitLeerzeichen,

    #[error("Name enthaelt ungueltige Zeichen")]
    NameUngueltig,

    #[error("Name zu lang (Maximum: {max} Zeichen)")]
    NameZuLang { max: usize },

    #[error("Zeile zu lang ({laenge} Bytes)")]
    ZeileZuLang { laenge: usize },

    #[error("Zeile ist kein gueltiges UTF-8")]
    UngueltigesUtf8,
}

impl ProtokollFehler {
    /// Begruendung fuer die Ablehnungszeile `! <grund>` an den Client
    pub fn grund(&self) -> String {
        match self {
            Self::UnbekannterBefehl(befehl) => format!("unknown command: /{befehl}"),
            Self::LeererBefehl => "empty command".to_string(),
            Self::Verwendung(verwendung) => format!("usage: {verwendung}"),
            Self::NameLeer => "name is blank".to_string(),
            Self::NameMitLeerzeichen => "name contains spaces".to_string(),
            Self::NameUngueltig => "name contains invalid characters".to_string(),
            Self::NameZuLang { max } => format!("name too long (max {max} characters)"),
            Self::ZeileZuLang { .. } => "line too long".to_string(),
            Self::UngueltigesUtf8 => "invalid utf-8".to_string(),
        }
    }
}

pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
