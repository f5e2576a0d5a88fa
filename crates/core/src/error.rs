//! Fehlertypen fuer Plauder
//!
//! Zentraler Fehler-Enum fuer Fehler, die den ganzen Prozess betreffen
//! (Start, Konfiguration). Fehler einzelner Sessions bleiben im Relay-Crate
//! und verlassen den Session-Task nie.

use thiserror::Error;

/// Globaler Result-Alias fuer Plauder
pub type Result<T> = std::result::Result<T, PlauderError>;

/// Prozessweite Fehler im Plauder-System
#[derive(Debug, Error)]
pub enum PlauderError {
    /// Socket konnte nicht gebunden werden (Adresse belegt, keine Rechte)
    #[error("Bind auf {adresse} fehlgeschlagen: {grund}")]
    Bind { adresse: String, grund: String },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PlauderError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Bind-Fehler aus Adresse und IO-Fehler
    pub fn bind(adresse: impl Into<String>, fehler: &std::io::Error) -> Self {
        Self::Bind {
            adresse: adresse.into(),
            grund: fehler.to_string(),
        }
    }
}
