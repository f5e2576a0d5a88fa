//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task ist der einzige Leser und der einzige Schreiber des
//! Sockets: Broadcasts und Antworten landen in der Send-Queue der Session und
//! werden hier nacheinander geschrieben.
//!
//! ## Verbindungsende
//! - `/quit`, Shutdown: Send-Queue wird (mit Timeout) geleert, dann FIN
//! - EOF, Lese-/Schreibfehler, Abbruch durch den Broadcaster: Queue wird
//!   verworfen
//! - Ein Schreibvorgang haengt laenger als `schreib_timeout_ms`: der Client
//!   liest nicht mehr, die Verbindung wird wie ein Transportfehler behandelt
//!
//! In allen Faellen wird der Name freigegeben und `Left` verteilt, bevor der
//! Task endet.
//!
//! ## Backpressure
//! Meldet die Sitzung nach einer Eingabe einen gestauten Empfaenger, liest
//! der Task keine weiteren Zeilen dieses Clients, bis der Empfaenger
//! aufgeholt hat. Die eigene Send-Queue wird dabei weiter geschrieben.

use futures_util::{SinkExt, StreamExt};
use plauder_core::SessionId;
use plauder_protocol::{format, ZeilenCodec};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::broadcast::{SendeQueue, SessionHandle};
use crate::error::RelayError;
use crate::server_state::ChatState;
use crate::session::{Folge, Sitzung};

// ---------------------------------------------------------------------------
// Verbindungsende
// ---------------------------------------------------------------------------

/// Wie die Lese-/Schreibschleife verlassen wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ende {
    /// Client hat `/quit` gesendet
    Quit,
    /// Server wird heruntergefahren
    Herunterfahren,
    /// Transport ist nicht mehr nutzbar (EOF, I/O-Fehler, Abbruch)
    Abgebrochen,
}

impl Ende {
    fn queue_leeren(self) -> bool {
        matches!(self, Ende::Quit | Ende::Herunterfahren)
    }
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Client-Verbindung
///
/// Liest Zeilen via `ZeilenCodec`, reicht sie an die `Sitzung` weiter und
/// schreibt die Send-Queue auf den Socket.
pub struct ClientConnection {
    state: Arc<ChatState>,
    peer_addr: SocketAddr,
    server_adresse: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    ///
    /// `server_adresse` ist die lokale Adresse der Verbindung und wird von
    /// `/ip` und `/port` gemeldet.
    pub fn neu(state: Arc<ChatState>, peer_addr: SocketAddr, server_adresse: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            server_adresse,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client die Verbindung beendet, der Transport ausfaellt
    /// oder `shutdown_rx` `true` meldet.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let config = Arc::clone(&self.state.config);
        let broadcaster = self.state.broadcaster.clone();

        let codec = ZeilenCodec::with_max_laenge(config.max_zeilen_laenge);
        let mut framed = Framed::new(stream, codec);
        let (handle, mut sende_queue) =
            SessionHandle::neu(SessionId::new(), config.queue_grenzen());
        let abbruch = handle.abbruch().clone();
        let mut sitzung = Sitzung::neu(
            handle.clone(),
            broadcaster.clone(),
            config.max_name_laenge,
            self.server_adresse,
        );
        let mut stau: Option<SessionHandle> = None;

        tracing::info!(peer = %peer_addr, session = %sitzung.id(), "Neue Verbindung");

        if let Some(text) = &config.willkommen {
            broadcaster.an_session_senden(&handle, format::hinweis(text));
        }

        let ende = if *shutdown_rx.borrow_and_update() {
            Ende::Herunterfahren
        } else {
            loop {
                tokio::select! {
                    // Broadcaster hat die Session getrennt (Queue geschlossen oder uebervoll)
                    _ = abbruch.cancelled() => {
                        tracing::debug!(peer = %peer_addr, "Session vom Broadcaster getrennt");
                        break Ende::Abgebrochen;
                    }

                    // Shutdown-Signal
                    ergebnis = shutdown_rx.changed() => {
                        if ergebnis.is_err() || *shutdown_rx.borrow() {
                            tracing::info!(
                                peer = %peer_addr,
                                "Shutdown-Signal, Verbindung wird getrennt"
                            );
                            break Ende::Herunterfahren;
                        }
                    }

                    // Gestauter Empfaenger hat aufgeholt
                    _ = stau_abwarten(stau.as_ref()), if stau.is_some() => {
                        tracing::trace!(peer = %peer_addr, "Stau abgebaut, lese weiter");
                        stau = None;
                    }

                    // Eingehende Zeile vom Client
                    eingang = framed.next(), if stau.is_none() => {
                        match eingang {
                            Some(Ok(eingang)) => {
                                tracing::trace!(peer = %peer_addr, "Zeile empfangen");
                                if sitzung.eingang_verarbeiten(eingang) == Folge::Beenden {
                                    break Ende::Quit;
                                }
                                stau = sitzung.stau_nehmen();
                            }
                            Some(Err(e)) => {
                                tracing::warn!(peer = %peer_addr, fehler = %e, "Lesefehler");
                                break Ende::Abgebrochen;
                            }
                            None => {
                                tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                                break Ende::Abgebrochen;
                            }
                        }
                    }

                    // Ausgehende Zeile aus der Send-Queue
                    Some(zeile) = sende_queue.recv() => {
                        let schreiben = tokio::time::timeout(
                            config.schreib_timeout(),
                            framed.send(zeile),
                        );
                        let gesendet = tokio::select! {
                            ergebnis = schreiben => ergebnis.unwrap_or_else(|_| {
                                Err(io::Error::new(io::ErrorKind::TimedOut, "Client liest nicht"))
                            }),
                            _ = abbruch.cancelled() => Err(io::ErrorKind::ConnectionAborted.into()),
                        };
                        if let Err(e) = gesendet {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                            break Ende::Abgebrochen;
                        }
                    }
                }
            }
        };

        // Name freigeben und Left verteilen, danach kommen keine Events mehr
        sitzung.schliessen();

        if ende == Ende::Herunterfahren {
            broadcaster.an_session_senden(&handle, RelayError::Herunterfahren.zeile());
        }

        if ende.queue_leeren() {
            let leeren = queue_leeren(&mut framed, &mut sende_queue);
            match tokio::time::timeout(config.drain_timeout(), leeren).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(
                        peer = %peer_addr,
                        fehler = %e,
                        "Leeren der Send-Queue fehlgeschlagen"
                    );
                }
                Err(_) => {
                    tracing::debug!(peer = %peer_addr, "Timeout beim Leeren der Send-Queue");
                }
            }
        }

        sitzung.abschliessen();
        tracing::info!(peer = %peer_addr, ende = ?ende, "Verbindungs-Task beendet");
    }
}

/// Wartet bis der gestaute Empfaenger aufgeholt hat
async fn stau_abwarten(stau: Option<&SessionHandle>) {
    match stau {
        Some(empfaenger) => empfaenger.abgebaut().await,
        None => std::future::pending().await,
    }
}

/// Schreibt alle noch wartenden Zeilen und schliesst die Schreibseite
async fn queue_leeren<S>(
    framed: &mut Framed<S, ZeilenCodec>,
    sende_queue: &mut SendeQueue,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(zeile) = sende_queue.try_recv() {
        framed.feed(zeile).await?;
    }
    framed.close().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
