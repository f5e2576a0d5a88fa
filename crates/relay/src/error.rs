//! Fehlertypen fuer den Relay-Service
//!
//! Alle Varianten werden innerhalb der betroffenen Session behandelt: der
//! Client bekommt eine Ablehnungszeile `! <grund>`, die Verbindung bleibt
//! (ausser bei `ServerVoll` und `Herunterfahren`) bestehen.

use plauder_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer den Relay-Service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Syntax- oder Validierungsfehler der Eingabezeile
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Name ist bereits an eine andere Session vergeben
    #[error("Name bereits vergeben: {0}")]
    NameVergeben(String),

    /// Aktion erfordert einen registrierten Namen
    #[error("Session hat noch keinen Namen")]
    KeinName,

    /// Umbenennung auf den aktuellen Namen
    #[error("Session heisst bereits {0}")]
    BereitsBenannt(String),

    /// Empfaenger einer privaten Nachricht ist nicht verbunden
    #[error("Unbekannter Empfaenger: {0}")]
    UnbekannterEmpfaenger(String),

    /// Maximale Anzahl gleichzeitiger Verbindungen erreicht
    #[error("Server ist voll")]
    ServerVoll,

    /// Server wird heruntergefahren
    #[error("Server wird heruntergefahren")]
    Herunterfahren,
}

impl RelayError {
    /// Begruendung fuer die Ablehnungszeile an den Client
    pub fn grund(&self) -> String {
        match self {
            Self::Protokoll(fehler) => fehler.grund(),
            Self::NameVergeben(_) => "name taken".to_string(),
            Self::KeinName => "set a name first with /nick <name>".to_string(),
            Self::BereitsBenannt(name) => format!("you are already known as {name}"),
            Self::UnbekannterEmpfaenger(name) => format!("no such user: {name}"),
            Self::ServerVoll => "server full".to_string(),
            Self::Herunterfahren => "server shutting down".to_string(),
        }
    }

    /// Ablehnungszeile `! <grund>` fuer den Client
    pub fn zeile(&self) -> String {
        plauder_protocol::format::ablehnung(&self.grund())
    }
}

/// Result-Typ fuer den Relay-Service
pub type RelayResult<T> = Result<T, RelayError>;
