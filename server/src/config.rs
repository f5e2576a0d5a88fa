//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use plauder_core::PlauderError;
use plauder_relay::ChatConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Limits und Timeouts pro Session
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: usize,
    /// Willkommensnachricht (optional)
    pub willkommen: Option<String>,
    /// Wartezeit auf offene Sessions beim Herunterfahren
    pub shutdown_grace_sek: u64,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Plauder".into(),
            max_clients: 512,
            willkommen: None,
            shutdown_grace_sek: 5,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den TCP-Listener
    pub bind_adresse: String,
    /// Port fuer den TCP-Listener
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 4000,
        }
    }
}

/// Limits und Timeouts pro Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Maximale Laenge einer Eingabezeile in Bytes
    pub max_zeilen_laenge: usize,
    /// Maximale Laenge eines Namens in Zeichen
    pub max_name_laenge: usize,
    /// Rueckstand, ab dem Absender gebremst werden
    pub sende_queue_drossel: usize,
    /// Rueckstand, ab dem ein Empfaenger getrennt wird
    pub sende_queue_maximum: usize,
    /// Haengt ein Schreibvorgang laenger, wird der Client getrennt
    pub schreib_timeout_ms: u64,
    /// Zeit zum Leeren der Send-Queue beim geordneten Schliessen
    pub drain_timeout_ms: u64,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        let chat = ChatConfig::default();
        Self {
            max_zeilen_laenge: chat.max_zeilen_laenge,
            max_name_laenge: chat.max_name_laenge,
            sende_queue_drossel: chat.sende_queue_drossel,
            sende_queue_maximum: chat.sende_queue_maximum,
            schreib_timeout_ms: chat.schreib_timeout_ms,
            drain_timeout_ms: chat.drain_timeout_ms,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Ueberschreibt den TCP-Port mit einem Kommandozeilen-Argument
    ///
    /// Erlaubt sind Ports von 1 bis 65535.
    pub fn port_ueberschreiben(&mut self, argument: &str) -> Result<(), PlauderError> {
        let port: u16 = argument
            .trim()
            .parse()
            .map_err(|_| PlauderError::Konfiguration(format!("ungueltiger Port '{argument}'")))?;
        if port == 0 {
            return Err(PlauderError::Konfiguration(
                "Port muss zwischen 1 und 65535 liegen".into(),
            ));
        }
        self.netzwerk.tcp_port = port;
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Leitet die Relay-Konfiguration ab
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            server_name: self.server.name.clone(),
            willkommen: self.server.willkommen.clone(),
            max_clients: self.server.max_clients,
            max_zeilen_laenge: self.sitzung.max_zeilen_laenge,
            max_name_laenge: self.sitzung.max_name_laenge,
            sende_queue_drossel: self.sitzung.sende_queue_drossel,
            sende_queue_maximum: self.sitzung.sende_queue_maximum,
            schreib_timeout_ms: self.sitzung.schreib_timeout_ms,
            drain_timeout_ms: self.sitzung.drain_timeout_ms,
            shutdown_grace_sek: self.server.shutdown_grace_sek,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.tcp_port, 4000);
        assert_eq!(cfg.sitzung.max_zeilen_laenge, 4096);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:4000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Server"
            max_clients = 100
            willkommen = "Hallo"

            [netzwerk]
            tcp_port = 10000

            [sitzung]
            max_name_laenge = 16
            schreib_timeout_ms = 2500
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.sitzung.sende_queue_drossel, 256);
        assert_eq!(cfg.sitzung.sende_queue_maximum, 16_384);

        let chat = cfg.chat_config();
        assert_eq!(chat.max_name_laenge, 16);
        assert_eq!(chat.willkommen.as_deref(), Some("Hallo"));
        assert_eq!(chat.shutdown_grace_sek, 5);
        assert_eq!(chat.schreib_timeout(), std::time::Duration::from_millis(2500));
    }

    #[test]
    fn unbekannter_schluessel_wird_ignoriert_falscher_typ_nicht() {
        assert!(toml::from_str::<ServerConfig>("[server]\nfarbe = \"blau\"").is_ok());
        assert!(toml::from_str::<ServerConfig>("[netzwerk]\ntcp_port = \"hoch\"").is_err());
    }

    #[test]
    fn port_ueberschreiben() {
        let mut cfg = ServerConfig::default();
        cfg.port_ueberschreiben("5555").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 5555);

        for ungueltig in ["0", "65536", "-1", "abc", ""] {
            assert!(
                matches!(
                    cfg.port_ueberschreiben(ungueltig),
                    Err(PlauderError::Konfiguration(_))
                ),
                "'{ungueltig}' sollte abgelehnt werden"
            );
        }
        assert_eq!(cfg.netzwerk.tcp_port, 5555);
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/plauder.toml").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 4000);
    }
}
