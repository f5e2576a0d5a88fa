//! plauder-relay – TCP-Sessions, Namens-Registry und Broadcast
//!
//! Dieser Crate implementiert den Kern des Chat-Servers: er nimmt
//! TCP-Verbindungen an, fuehrt pro Verbindung eine Session und verteilt
//! Chat-Events an alle aktiven Teilnehmer.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (ChatServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task, einziger Leser/Schreiber)
//!     |
//!     v
//! Sitzung
//!     |  State Machine: Verbindend -> Registrierend -> Aktiv -> Schliessend -> Geschlossen
//!     |
//!     v
//! EventBroadcaster ---> Send-Queue jeder aktiven Sitzung
//!     |
//!     v
//! Registry – Wer ist aktiv, unter welchem Namen
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server_state;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{EventBroadcaster, QueueGrenzen, SendeQueue, SessionHandle};
pub use connection::ClientConnection;
pub use error::{RelayError, RelayResult};
pub use registry::Registry;
pub use server_state::{ChatConfig, ChatState};
pub use session::{SessionZustand, Sitzung};
pub use tcp::ChatServer;
