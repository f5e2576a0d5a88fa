//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `ChatServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//!
//! ## Herunterfahren
//! 1. Listener schliessen (keine neuen Verbindungen)
//! 2. Alle Sessions ueber einen internen `watch`-Kanal benachrichtigen
//! 3. Bis zu `shutdown_grace_sek` auf die Session-Tasks warten
//! 4. Verbleibende Tasks abbrechen

use futures_util::SinkExt;
use plauder_protocol::ZeilenCodec;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::connection::ClientConnection;
use crate::error::RelayError;
use crate::server_state::ChatState;

/// Zeit, die eine abgelehnte Verbindung fuer die Ablehnungszeile bekommt
const ABLEHNUNGS_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP-Chat-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
/// Jede Verbindung laeuft als eigener Task in einem `JoinSet`.
pub struct ChatServer {
    state: Arc<ChatState>,
    listener: TcpListener,
    lokale_adresse: SocketAddr,
}

impl ChatServer {
    /// Bindet den TCP-Socket
    ///
    /// Port 0 waehlt einen freien Port, siehe `lokale_adresse`.
    pub async fn binden(state: Arc<ChatState>, bind_addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        let lokale_adresse = listener.local_addr()?;
        Ok(Self {
            state,
            listener,
            lokale_adresse,
        })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.lokale_adresse
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    ///
    /// Kehrt erst zurueck, wenn alle Session-Tasks beendet oder nach Ablauf
    /// der Grace-Periode abgebrochen wurden.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> io::Result<()> {
        let (sitzungen_tx, sitzungen_rx) = watch::channel(false);
        let mut tasks: JoinSet<()> = JoinSet::new();

        tracing::info!(
            adresse = %self.lokale_adresse,
            server = %self.state.config.server_name,
            "TCP Chat-Server gestartet"
        );

        if !*shutdown_rx.borrow_and_update() {
            loop {
                tokio::select! {
                    // Neue eingehende Verbindung
                    result = self.listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                self.annehmen(stream, peer_addr, &mut tasks, &sitzungen_rx);
                            }
                            Err(e) => {
                                tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                                tokio::time::sleep(Duration::from_millis(10)).await;
                            }
                        }
                    }

                    // Beendete Session-Tasks einsammeln
                    Some(ergebnis) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = ergebnis {
                            tracing::error!(fehler = %e, "Session-Task fehlgeschlagen");
                        }
                    }

                    // Shutdown-Signal
                    ergebnis = shutdown_rx.changed() => {
                        if ergebnis.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Chat-Server: Shutdown-Signal empfangen");
                            break;
                        }
                    }
                }
            }
        }

        let ChatServer {
            state, listener, ..
        } = self;
        drop(listener);

        tracing::info!(offen = tasks.len(), "Listener geschlossen, Sessions werden beendet");
        // Fehler nur wenn keine Session mehr lauscht
        let _ = sitzungen_tx.send(true);

        let grace = state.config.shutdown_grace();
        if tokio::time::timeout(grace, alle_einsammeln(&mut tasks)).await.is_err() {
            tracing::warn!(
                verbleibend = tasks.len(),
                grace_sek = grace.as_secs(),
                "Grace-Periode abgelaufen, Sessions werden abgebrochen"
            );
            tasks.abort_all();
            alle_einsammeln(&mut tasks).await;
        }

        tracing::info!("TCP Chat-Server gestoppt");
        Ok(())
    }

    /// Startet den Task fuer eine akzeptierte Verbindung
    fn annehmen(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        tasks: &mut JoinSet<()>,
        shutdown_rx: &watch::Receiver<bool>,
    ) {
        // Client-Limit pruefen
        let Some(platz) = self.state.platz_belegen() else {
            tracing::warn!(
                peer = %peer_addr,
                max = self.state.config.max_clients,
                "Server voll, Verbindung abgelehnt"
            );
            tokio::spawn(voll_ablehnen(stream, peer_addr));
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

        let server_adresse = stream.local_addr().unwrap_or(self.lokale_adresse);
        let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr, server_adresse);
        let shutdown_rx = shutdown_rx.clone();
        tasks.spawn(async move {
            let _platz = platz;
            verbindung.verarbeiten(stream, shutdown_rx).await;
        });
    }
}

/// Wartet auf alle Tasks im Set
async fn alle_einsammeln(tasks: &mut JoinSet<()>) {
    while let Some(ergebnis) = tasks.join_next().await {
        if let Err(e) = ergebnis {
            if e.is_panic() {
                tracing::error!(fehler = %e, "Session-Task ist abgestuerzt");
            }
        }
    }
}

/// Sendet `! server full` und schliesst die Verbindung
async fn voll_ablehnen(stream: TcpStream, peer_addr: SocketAddr) {
    let mut framed = Framed::new(stream, ZeilenCodec::new());
    match tokio::time::timeout(ABLEHNUNGS_TIMEOUT, ablehnung_senden(&mut framed)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer_addr, fehler = %e, "Ablehnung nicht zugestellt");
        }
        Err(_) => {
            tracing::debug!(peer = %peer_addr, "Timeout beim Senden der Ablehnung");
        }
    }
}

async fn ablehnung_senden(framed: &mut Framed<TcpStream, ZeilenCodec>) -> io::Result<()> {
    framed.send(RelayError::ServerVoll.zeile()).await?;
    framed.close().await
}
