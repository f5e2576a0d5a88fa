//! plauder-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use config::ServerConfig;
use plauder_core::PlauderError;
use plauder_relay::{ChatServer, ChatState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Server und laeuft bis Ctrl-C / SIGTERM
    pub async fn starten(self) -> Result<(), PlauderError> {
        self.starten_bis(shutdown_signal()).await
    }

    /// Startet den Server und laeuft bis `signal` abgeschlossen ist
    ///
    /// Reihenfolge:
    /// 1. TCP-Listener binden (Fehler beendet den Prozess)
    /// 2. Verbindungen annehmen bis zum Signal
    /// 3. Listener schliessen, Sessions benachrichtigen und einsammeln
    pub async fn starten_bis<F>(self, signal: F) -> Result<(), PlauderError>
    where
        F: Future<Output = Result<(), PlauderError>>,
    {
        let adresse = self.config.tcp_bind_adresse();
        let bind_addr = bind_adresse_aufloesen(&adresse).await?;

        let state = ChatState::neu(self.config.chat_config());
        let server = ChatServer::binden(Arc::clone(&state), bind_addr)
            .await
            .map_err(|e| PlauderError::bind(&adresse, &e))?;

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %server.lokale_adresse(),
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut listener = tokio::spawn(server.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::select! {
            ergebnis = signal => {
                ergebnis?;
                tracing::info!(
                    verbindungen = state.verbindungen(),
                    uptime_sek = state.uptime_sek(),
                    "Shutdown-Signal empfangen, Server wird beendet"
                );
                let _ = shutdown_tx.send(true);
                listener_auswerten(listener.await)
            }
            ergebnis = &mut listener => {
                tracing::error!("Listener hat sich unerwartet beendet");
                listener_auswerten(ergebnis)
            }
        }
    }
}

async fn bind_adresse_aufloesen(adresse: &str) -> Result<SocketAddr, PlauderError> {
    tokio::net::lookup_host(adresse)
        .await
        .map_err(|e| PlauderError::bind(adresse, &e))?
        .next()
        .ok_or_else(|| {
            PlauderError::Konfiguration(format!("Bind-Adresse '{adresse}' nicht aufloesbar"))
        })
}

fn listener_auswerten(
    ergebnis: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), PlauderError> {
    match ergebnis {
        Ok(Ok(())) => {
            tracing::info!("Server beendet");
            Ok(())
        }
        Ok(Err(e)) => Err(PlauderError::intern(format!("Listener-Fehler: {e}"))),
        Err(e) => Err(PlauderError::intern(format!("Listener-Task abgestuerzt: {e}"))),
    }
}

/// Wartet auf Ctrl-C oder SIGTERM
#[cfg(unix)]
pub async fn shutdown_signal() -> Result<(), PlauderError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| PlauderError::intern(format!("SIGTERM-Handler: {e}")))?;
    tokio::select! {
        ergebnis = tokio::signal::ctrl_c() => {
            ergebnis.map_err(|e| PlauderError::intern(format!("Ctrl-C-Handler: {e}")))
        }
        _ = sigterm.recv() => Ok(()),
    }
}

/// Wartet auf Ctrl-C
#[cfg(not(unix))]
pub async fn shutdown_signal() -> Result<(), PlauderError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| PlauderError::intern(format!("Ctrl-C-Handler: {e}")))
}
