//! plauder-protocol – Zeilenprotokoll des Chat-Servers
//!
//! - `wire`: tokio-util Codec fuer newline-terminierte UTF-8-Zeilen
//! - `parser`: Eingabezeile -> Chat-Text oder Befehl
//! - `format`: Events und Hinweise -> Ausgabezeilen

pub mod error;
pub mod format;
pub mod parser;
pub mod wire;

pub use error::{ProtokollFehler, ProtokollResult};
pub use parser::{name_pruefen, parse_line, Befehl, Eingabe};
pub use wire::{Eingang, ZeilenCodec};
