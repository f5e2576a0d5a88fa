//! Gemeinsame Identifikationstypen fuer Plauder
//!
//! IDs verwenden das Newtype-Pattern, damit eine Session-ID nicht mit einer
//! beliebigen UUID verwechselt werden kann.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer Client-Session
///
/// Wird beim Accept vergeben und bleibt ueber Umbenennungen hinweg stabil.
/// Der Anzeigename ist veraenderlich, die SessionId nicht.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}
