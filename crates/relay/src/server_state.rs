//! Gemeinsamer Server-Zustand fuer den Relay-Service
//!
//! Haelt Konfiguration, Registry und Broadcaster als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use plauder_protocol::parser::DEFAULT_MAX_NAME_LAENGE;
use plauder_protocol::wire::DEFAULT_MAX_ZEILEN_LAENGE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broadcast::{EventBroadcaster, QueueGrenzen};
use crate::registry::Registry;

/// Konfiguration fuer den Relay-Service
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Willkommensnachricht (wird als `* <text>` beim Verbinden gesendet)
    pub willkommen: Option<String>,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: usize,
    /// Maximale Laenge einer Eingabezeile in Bytes
    pub max_zeilen_laenge: usize,
    /// Maximale Laenge eines Namens in Zeichen
    pub max_name_laenge: usize,
    /// Rueckstand einer Send-Queue, ab dem Absender gebremst werden
    pub sende_queue_drossel: usize,
    /// Rueckstand einer Send-Queue, ab dem der Empfaenger getrennt wird
    pub sende_queue_maximum: usize,
    /// Maximale Dauer eines einzelnen Schreibvorgangs auf den Socket
    pub schreib_timeout_ms: u64,
    /// Zeit zum Leeren der Send-Queue beim geordneten Schliessen
    pub drain_timeout_ms: u64,
    /// Wartezeit auf laufende Sessions beim Herunterfahren
    pub shutdown_grace_sek: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_name: "Plauder".to_string(),
            willkommen: None,
            max_clients: 512,
            max_zeilen_laenge: DEFAULT_MAX_ZEILEN_LAENGE,
            max_name_laenge: DEFAULT_MAX_NAME_LAENGE,
            sende_queue_drossel: 256,
            sende_queue_maximum: 16_384,
            schreib_timeout_ms: 10_000,
            drain_timeout_ms: 1_000,
            shutdown_grace_sek: 5,
        }
    }
}

impl ChatConfig {
    pub fn queue_grenzen(&self) -> QueueGrenzen {
        QueueGrenzen {
            drossel_ab: self.sende_queue_drossel,
            maximum: self.sende_queue_maximum.max(self.sende_queue_drossel + 1),
        }
    }

    pub fn schreib_timeout(&self) -> Duration {
        Duration::from_millis(self.schreib_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_sek)
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct ChatState {
    /// Server-Konfiguration
    pub config: Arc<ChatConfig>,
    /// Namens-Registry (wer ist aktiv)
    pub registry: Registry,
    /// Event-Broadcaster (Zeilen an Sessions verteilen)
    pub broadcaster: EventBroadcaster,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
    /// Offene Verbindungen (auch solche ohne Namen)
    verbindungen: AtomicUsize,
}

impl ChatState {
    /// Erstellt einen neuen ChatState
    pub fn neu(config: ChatConfig) -> Arc<Self> {
        let registry = Registry::neu();
        Arc::new(Self {
            config: Arc::new(config),
            broadcaster: EventBroadcaster::neu(registry.clone()),
            registry,
            start_time: Instant::now(),
            verbindungen: AtomicUsize::new(0),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Anzahl offener Verbindungen
    pub fn verbindungen(&self) -> usize {
        self.verbindungen.load(Ordering::Acquire)
    }

    /// Belegt einen Verbindungsplatz, sofern `max_clients` nicht erreicht ist
    ///
    /// Der Platz wird freigegeben, wenn der zurueckgegebene Guard gedroppt wird.
    pub fn platz_belegen(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        let max = self.config.max_clients;
        self.verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |aktuell| {
                (aktuell < max).then_some(aktuell + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                state: Arc::clone(self),
            })
    }
}

/// RAII-Guard fuer einen belegten Verbindungsplatz
pub struct VerbindungsPlatz {
    state: Arc<ChatState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.verbindungen.fetch_sub(1, Ordering::AcqRel);
    }
}
