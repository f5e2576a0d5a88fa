//! Sitzung – Zustandsautomat einer Client-Session
//!
//! Die Sitzung kennt keine Sockets. Sie bekommt dekodierte Eingaben von der
//! `ClientConnection`, spricht mit Registry und Broadcaster und schreibt
//! Antworten ausschliesslich ueber die eigene Send-Queue.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Registrierend -> Aktiv -> Schliessend -> Geschlossen
//!     |              ^   |                    ^
//!     |              +---+ (Name vergeben)    |
//!     +-------------------- Disconnect -------+
//! ```

use plauder_core::{ChatEvent, SessionId};
use std::net::SocketAddr;
use plauder_protocol::{
    format, name_pruefen, parse_line, Befehl, Eingabe, Eingang, ProtokollFehler,
};

use crate::broadcast::{EventBroadcaster, SessionHandle};
use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// Sitzungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Client-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Verbunden, noch kein Name beansprucht
    Verbindend,
    /// Name beansprucht, Reservierung noch nicht gelungen
    Registrierend,
    /// Name reserviert, nimmt am Chat teil
    Aktiv,
    /// Wird geschlossen (Registry-Eintrag freigegeben, Left verteilt)
    Schliessend,
    /// Endzustand
    Geschlossen,
}

/// Was die Verbindung nach einer Eingabe tun soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folge {
    /// Weiterlesen
    Weiter,
    /// Verbindung schliessen
    Beenden,
}

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

/// Protokoll- und Lebenszykluslogik einer Client-Session
pub struct Sitzung {
    handle: SessionHandle,
    broadcaster: EventBroadcaster,
    zustand: SessionZustand,
    name: Option<String>,
    max_name_laenge: usize,
    /// Adresse, unter der der Client den Server erreicht hat
    server_adresse: SocketAddr,
    /// Empfaenger, auf den vor der naechsten Eingabe gewartet wird
    stau: Option<SessionHandle>,
}

impl Sitzung {
    /// Erstellt eine neue Sitzung im Zustand `Verbindend`
    pub fn neu(
        handle: SessionHandle,
        broadcaster: EventBroadcaster,
        max_name_laenge: usize,
        server_adresse: SocketAddr,
    ) -> Self {
        Self {
            handle,
            broadcaster,
            zustand: SessionZustand::Verbindend,
            name: None,
            max_name_laenge,
            server_adresse,
            stau: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn zustand(&self) -> SessionZustand {
        self.zustand
    }

    /// Aktueller Anzeigename (nur im Zustand `Aktiv` gesetzt)
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Gestauter Empfaenger der letzten Eingabe
    ///
    /// Die Verbindung soll erst weiterlesen, wenn er aufgeholt hat.
    pub fn stau_nehmen(&mut self) -> Option<SessionHandle> {
        self.stau.take()
    }

    /// Verarbeitet eine dekodierte Eingabe des Codecs
    pub fn eingang_verarbeiten(&mut self, eingang: Eingang) -> Folge {
        match eingang {
            Eingang::Zeile(zeile) => self.zeile_verarbeiten(&zeile),
            Eingang::ZuLang { laenge } => {
                tracing::debug!(session = %self.id(), laenge, "Zeile zu lang");
                self.ablehnen(&ProtokollFehler::ZeileZuLang { laenge }.into());
                Folge::Weiter
            }
            Eingang::Ungueltig => {
                self.ablehnen(&ProtokollFehler::UngueltigesUtf8.into());
                Folge::Weiter
            }
        }
    }

    /// Verarbeitet eine Eingabezeile
    pub fn zeile_verarbeiten(&mut self, zeile: &str) -> Folge {
        if matches!(
            self.zustand,
            SessionZustand::Schliessend | SessionZustand::Geschlossen
        ) {
            return Folge::Beenden;
        }

        let ergebnis = match parse_line(zeile) {
            Ok(None) => Ok(Folge::Weiter),
            Ok(Some(Eingabe::Text(text))) => self.nachricht(text).map(|_| Folge::Weiter),
            Ok(Some(Eingabe::Befehl(befehl))) => self.befehl(befehl),
            Err(fehler) => Err(fehler.into()),
        };

        match ergebnis {
            Ok(folge) => folge,
            Err(fehler) => {
                tracing::debug!(session = %self.id(), fehler = %fehler, "Eingabe abgelehnt");
                self.ablehnen(&fehler);
                Folge::Weiter
            }
        }
    }

    /// Beginnt das Schliessen: Registry-Eintrag freigeben, `Left` verteilen
    ///
    /// Idempotent. Danach erreichen die Session keine Events mehr, die
    /// Send-Queue kann geleert werden.
    pub fn schliessen(&mut self) {
        if matches!(
            self.zustand,
            SessionZustand::Schliessend | SessionZustand::Geschlossen
        ) {
            return;
        }

        let war_aktiv = self.zustand == SessionZustand::Aktiv;
        self.zustand = SessionZustand::Schliessend;

        if war_aktiv {
            if let Some(name) = self.name.take() {
                self.broadcaster.verlassen(&name);
                tracing::info!(
                    session = %self.id(),
                    name = %name,
                    "Teilnehmer hat den Chat verlassen"
                );
            }
        }
    }

    /// Schliesst die Sitzung endgueltig
    ///
    /// Ruft bei Bedarf `schliessen` auf. Auf einer geschlossenen Sitzung ein
    /// No-op.
    pub fn abschliessen(&mut self) {
        if self.zustand == SessionZustand::Geschlossen {
            return;
        }
        self.schliessen();
        self.zustand = SessionZustand::Geschlossen;
        self.handle.trennen();
    }

    // -----------------------------------------------------------------------
    // Eingaben
    // -----------------------------------------------------------------------

    fn nachricht(&mut self, text: String) -> RelayResult<()> {
        let name = self.aktiver_name()?.to_string();
        self.broadcaster
            .verteilen(ChatEvent::message(name, text), Some(self.id()));
        self.stau = self.broadcaster.stau_suchen(self.id());
        Ok(())
    }

    fn befehl(&mut self, befehl: Befehl) -> RelayResult<Folge> {
        match befehl {
            Befehl::Nick(name) => self.nick(name)?,
            Befehl::Msg { an, text } => self.privat(&an, &text)?,
            Befehl::Who => {
                let namen = self.broadcaster.registry().namen();
                self.antworten(format::teilnehmer_zeile(&namen));
            }
            Befehl::WhoAmI => {
                let name = self.aktiver_name()?.to_string();
                self.antworten(format::hinweis(&format!("you are {name}")));
            }
            Befehl::Ip => self.antworten(format::adresse_zeile(self.server_adresse.ip())),
            Befehl::Port => self.antworten(format::port_zeile(self.server_adresse.port())),
            Befehl::Help => self.antworten(format::hilfe_zeile()),
            Befehl::Quit => {
                tracing::debug!(session = %self.id(), "Quit angefordert");
                return Ok(Folge::Beenden);
            }
        }
        Ok(Folge::Weiter)
    }

    fn nick(&mut self, neu: String) -> RelayResult<()> {
        name_pruefen(&neu, self.max_name_laenge)?;

        match self.zustand {
            SessionZustand::Verbindend | SessionZustand::Registrierend => {
                self.zustand = SessionZustand::Registrierend;
                if !self.broadcaster.beitreten(&neu, self.handle.clone()) {
                    return Err(RelayError::NameVergeben(neu));
                }
                tracing::info!(
                    session = %self.id(),
                    name = %neu,
                    "Teilnehmer ist dem Chat beigetreten"
                );
                self.zustand = SessionZustand::Aktiv;
                self.name = Some(neu);
                Ok(())
            }
            SessionZustand::Aktiv => {
                let alt = self.aktiver_name()?.to_string();
                if alt == neu {
                    return Err(RelayError::BereitsBenannt(alt));
                }
                if !self.broadcaster.umbenennen(&alt, &neu) {
                    return Err(RelayError::NameVergeben(neu));
                }
                tracing::info!(
                    session = %self.id(),
                    alt = %alt,
                    neu = %neu,
                    "Teilnehmer umbenannt"
                );
                self.name = Some(neu);
                Ok(())
            }
            SessionZustand::Schliessend | SessionZustand::Geschlossen => Ok(()),
        }
    }

    fn privat(&mut self, an: &str, text: &str) -> RelayResult<()> {
        let von = self.aktiver_name()?.to_string();
        let (_, empfaenger) = self
            .broadcaster
            .registry()
            .nachschlagen(an)
            .ok_or_else(|| RelayError::UnbekannterEmpfaenger(an.to_string()))?;
        self.broadcaster
            .an_session_senden(&empfaenger, format::privat_zeile(&von, text));
        if empfaenger.id != self.id() && empfaenger.ist_gestaut() {
            self.stau = Some(empfaenger);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn aktiver_name(&self) -> RelayResult<&str> {
        match (self.zustand, self.name.as_deref()) {
            (SessionZustand::Aktiv, Some(name)) => Ok(name),
            _ => Err(RelayError::KeinName),
        }
    }

    fn antworten(&self, zeile: String) {
        self.broadcaster.an_session_senden(&self.handle, zeile);
    }

    fn ablehnen(&self, fehler: &RelayError) {
        self.antworten(fehler.zeile());
    }
}

impl Drop for Sitzung {
    fn drop(&mut self) {
        // Auch bei abgebrochener Task darf kein Registry-Eintrag zurueckbleiben
        self.abschliessen();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
