//! Chat-Events
//!
//! Ein `ChatEvent` beschreibt etwas, das im Chat passiert ist und an andere
//! Teilnehmer verteilt wird. Events sind nach der Erzeugung unveraenderlich
//! und werden vom Broadcast-Router konsumiert.
//!
//! `VerteiltesEvent` ist die Huelle, die der Router an Abonnenten (z.B. eine
//! Praesentationsschicht) weitergibt: Sequenznummer in Ankunftsreihenfolge
//! plus Zeitstempel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse, die an Chat-Teilnehmer verteilt werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Ein Teilnehmer hat einen Namen reserviert und ist jetzt aktiv
    Joined { name: String },
    /// Ein aktiver Teilnehmer hat den Chat verlassen
    Left { name: String },
    /// Ein aktiver Teilnehmer hat seinen Namen geaendert
    Renamed { alt: String, neu: String },
    /// Chat-Nachricht eines aktiven Teilnehmers
    Message { von: String, text: String },
}

impl ChatEvent {
    /// Erstellt ein `Joined`-Event
    pub fn joined(name: impl Into<String>) -> Self {
        Self::Joined { name: name.into() }
    }

    /// Erstellt ein `Left`-Event
    pub fn left(name: impl Into<String>) -> Self {
        Self::Left { name: name.into() }
    }

    /// Erstellt ein `Renamed`-Event
    pub fn renamed(alt: impl Into<String>, neu: impl Into<String>) -> Self {
        Self::Renamed {
            alt: alt.into(),
            neu: neu.into(),
        }
    }

    /// Erstellt ein `Message`-Event
    pub fn message(von: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            von: von.into(),
            text: text.into(),
        }
    }

    /// Gibt true zurueck wenn das Event eine Chat-Nachricht ist
    ///
    /// Nachrichten werden nicht an den Absender zurueckgespiegelt.
    pub fn ist_nachricht(&self) -> bool {
        matches!(self, Self::Message { .. })
    }
}

/// Ein vom Router verteiltes Event inklusive Reihenfolge-Information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerteiltesEvent {
    /// Monoton steigende Sequenznummer (Ankunftsreihenfolge am Router)
    pub sequenz: u64,
    /// Zeitpunkt der Verteilung
    pub zeitpunkt: DateTime<Utc>,
    /// Das eigentliche Event
    pub event: ChatEvent,
}

impl VerteiltesEvent {
    /// Verpackt ein Event mit Sequenznummer und aktuellem Zeitstempel
    pub fn neu(sequenz: u64, event: ChatEvent) -> Self {
        Self {
            sequenz,
            zeitpunkt: Utc::now(),
            event,
        }
    }
}
