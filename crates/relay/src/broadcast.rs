//! Event-Broadcaster – Verteilt Chat-Events an alle aktiven Sessions
//!
//! Der EventBroadcaster ist der Broadcast-Router: er bestimmt fuer jedes
//! Event die Empfaenger aus der Registry und reiht die serialisierte Zeile in
//! die Send-Queue jeder Empfaenger-Session ein.
//!
//! ## Reihenfolge
//! Der gesamte Fan-out eines Events (Snapshot, Einreihen, Abonnenten)
//! laeuft unter dem Sequenz-Lock des Broadcasters. Events sind damit total
//! nach Ankunft am Router geordnet, und jede FIFO-Queue behaelt diese
//! Ordnung. Auch Beitritt, Umbenennung und Austritt aendern die Registry
//! unter diesem Lock: eine Session empfaengt genau die Events, die waehrend
//! ihrer Mitgliedschaft verteilt werden.
//!
//! Lock-Reihenfolge: Broadcaster -> Registry. Die Registry nimmt den
//! Broadcaster-Lock nie.
//!
//! ## Zustellung
//! Einreihen blockiert nie: die Send-Queue jeder Session ist unbeschraenkt,
//! ihr Rueckstand wird gezaehlt. Waechst der Rueckstand eines Empfaengers
//! ueber `drossel_ab`, liest die Verbindung des Absenders keine weiteren
//! Zeilen, bis der Empfaenger aufgeholt hat (Backpressure ueber TCP).
//! Getrennt wird ein Empfaenger nur, wenn seine Queue geschlossen ist oder
//! der Rueckstand `maximum` erreicht. Haengende Schreibvorgaenge erkennt die
//! Verbindung selbst ueber `schreib_timeout_ms`.

use parking_lot::Mutex;
use plauder_core::{ChatEvent, SessionId, VerteiltesEvent};
use plauder_protocol::format;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse des Broadcast-Kanals fuer Event-Abonnenten
const EVENT_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Grenzen fuer den Rueckstand einer Send-Queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueGrenzen {
    /// Ab diesem Rueckstand wird der Absender gebremst
    pub drossel_ab: usize,
    /// Ab diesem Rueckstand wird der Empfaenger getrennt
    pub maximum: usize,
}

impl Default for QueueGrenzen {
    fn default() -> Self {
        Self {
            drossel_ab: 256,
            maximum: 16_384,
        }
    }
}

impl QueueGrenzen {
    /// Rueckstand, bis zu dem ein gebremster Absender wartet
    fn niedrigwasser(&self) -> usize {
        self.drossel_ab / 2
    }
}

#[derive(Debug)]
struct Rueckstand {
    zeilen: AtomicUsize,
    grenzen: QueueGrenzen,
    abgebaut: Notify,
}

/// Handle auf die Send-Queue und das Abbruch-Signal einer Session
///
/// Haelt die Verbindung selbst nicht am Leben. Die Session-Task ist der
/// einzige Schreiber ihres Sockets und liest diese Queue.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::UnboundedSender<String>,
    rueckstand: Arc<Rueckstand>,
    abbruch: CancellationToken,
}

impl SessionHandle {
    /// Erstellt ein Handle und die zugehoerige Lese-Seite der Send-Queue
    pub fn neu(id: SessionId, grenzen: QueueGrenzen) -> (Self, SendeQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rueckstand = Arc::new(Rueckstand {
            zeilen: AtomicUsize::new(0),
            grenzen,
            abgebaut: Notify::new(),
        });
        let handle = Self {
            id,
            tx,
            rueckstand: Arc::clone(&rueckstand),
            abbruch: CancellationToken::new(),
        };
        (handle, SendeQueue { rx, rueckstand })
    }

    /// Reiht eine Zeile nicht-blockierend in die Send-Queue ein
    ///
    /// Gibt `false` zurueck wenn die Queue geschlossen ist oder der
    /// Rueckstand das Maximum erreicht hat.
    pub fn senden(&self, zeile: String) -> bool {
        let maximum = self.rueckstand.grenzen.maximum;
        if self.rueckstand() >= maximum {
            tracing::warn!(session = %self.id, maximum, "Rueckstand zu gross – Zeile verworfen");
            return false;
        }

        // Vor dem Einreihen zaehlen, der Leser zieht sofort wieder ab
        self.rueckstand.zeilen.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(zeile).is_err() {
            self.rueckstand.zeilen.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(session = %self.id, "Send-Queue geschlossen (Client getrennt)");
            return false;
        }
        true
    }

    /// Anzahl eingereihter, noch nicht geschriebener Zeilen
    pub fn rueckstand(&self) -> usize {
        self.rueckstand.zeilen.load(Ordering::Acquire)
    }

    /// Prueft ob Absender auf diese Session warten sollen
    pub fn ist_gestaut(&self) -> bool {
        self.rueckstand() > self.rueckstand.grenzen.drossel_ab
    }

    /// Wartet bis der Rueckstand abgebaut oder die Session getrennt ist
    pub async fn abgebaut(&self) {
        let niedrigwasser = self.rueckstand.grenzen.niedrigwasser();
        loop {
            let benachrichtigt = self.rueckstand.abgebaut.notified();
            tokio::pin!(benachrichtigt);
            benachrichtigt.as_mut().enable();

            if self.rueckstand() <= niedrigwasser || self.ist_getrennt() {
                return;
            }
            tokio::select! {
                _ = benachrichtigt => {}
                _ = self.abbruch.cancelled() => return,
            }
        }
    }

    /// Signalisiert der Session, dass sie sich schliessen soll
    pub fn trennen(&self) {
        self.abbruch.cancel();
    }

    /// Prueft ob die Session zum Schliessen aufgefordert wurde
    pub fn ist_getrennt(&self) -> bool {
        self.abbruch.is_cancelled()
    }

    /// Abbruch-Token, auf das die Session-Task wartet
    pub fn abbruch(&self) -> &CancellationToken {
        &self.abbruch
    }
}

/// Lese-Seite der Send-Queue, gehoert der Session-Task
#[derive(Debug)]
pub struct SendeQueue {
    rx: mpsc::UnboundedReceiver<String>,
    rueckstand: Arc<Rueckstand>,
}

impl SendeQueue {
    /// Wartet auf die naechste Zeile
    ///
    /// Abbruchsicher: eine Zeile ist erst entnommen, wenn das Future fertig ist.
    pub async fn recv(&mut self) -> Option<String> {
        let zeile = self.rx.recv().await?;
        self.entnommen();
        Some(zeile)
    }

    /// Nimmt die naechste Zeile, falls eine wartet
    pub fn try_recv(&mut self) -> Option<String> {
        let zeile = self.rx.try_recv().ok()?;
        self.entnommen();
        Some(zeile)
    }

    fn entnommen(&self) {
        let vorher = self.rueckstand.zeilen.fetch_sub(1, Ordering::AcqRel);
        if vorher.saturating_sub(1) <= self.rueckstand.grenzen.niedrigwasser() {
            self.rueckstand.abgebaut.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcast-Router fuer alle aktiven Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Mitgliedschaft (wer bekommt Events)
    registry: Registry,
    /// Sequenz-Lock: ordnet alle Fan-outs, zaehlt verteilte Events
    sequenz: Mutex<u64>,
    /// Broadcast-Sender fuer Abonnenten (Praesentationsschicht)
    event_tx: broadcast::Sender<VerteiltesEvent>,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster ueber der gegebenen Registry
    pub fn neu(registry: Registry) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(EventBroadcasterInner {
                registry,
                sequenz: Mutex::new(0),
                event_tx,
            }),
        }
    }

    /// Gibt die Registry zurueck, ueber der der Broadcaster verteilt
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Verteilt ein Event an alle aktiven Sessions
    ///
    /// Chat-Nachrichten werden nicht an `ursprung` zurueckgespiegelt.
    /// Gibt die Anzahl der erfolgreichen Zustellungen zurueck.
    pub fn verteilen(&self, event: ChatEvent, ursprung: Option<SessionId>) -> usize {
        let mut sequenz = self.inner.sequenz.lock();
        self.verteilen_gesperrt(&mut sequenz, event, ursprung)
    }

    /// Reserviert `name` und verteilt bei Erfolg `Joined`
    ///
    /// Die neue Session empfaengt ihr eigenes `Joined` als erstes Event.
    pub fn beitreten(&self, name: &str, handle: SessionHandle) -> bool {
        let mut sequenz = self.inner.sequenz.lock();
        if !self.inner.registry.reservieren(name, handle) {
            return false;
        }
        self.verteilen_gesperrt(&mut sequenz, ChatEvent::joined(name), None);
        true
    }

    /// Benennt atomar um und verteilt bei Erfolg `Renamed`
    pub fn umbenennen(&self, alt: &str, neu: &str) -> bool {
        let mut sequenz = self.inner.sequenz.lock();
        if !self.inner.registry.umbenennen(alt, neu) {
            return false;
        }
        self.verteilen_gesperrt(&mut sequenz, ChatEvent::renamed(alt, neu), None);
        true
    }

    /// Gibt `name` frei und verteilt `Left` an die verbleibenden Sessions
    ///
    /// Bleibt genau ein Teilnehmer uebrig, bekommt er einen Hinweis, dass er
    /// jetzt allein ist.
    pub fn verlassen(&self, name: &str) -> bool {
        let mut sequenz = self.inner.sequenz.lock();
        if !self.inner.registry.freigeben(name) {
            return false;
        }
        self.verteilen_gesperrt(&mut sequenz, ChatEvent::left(name), None);

        let verbleibend = self.inner.registry.snapshot();
        if let [letzter] = verbleibend.as_slice() {
            Self::zustellen(letzter, format::hinweis("you are alone now"));
        }
        true
    }

    /// Sendet eine einzelne Zeile an eine Session (private Nachricht, Antwort)
    ///
    /// Laeuft unter demselben Lock wie der Fan-out und ist damit relativ zu
    /// allen Events geordnet.
    pub fn an_session_senden(&self, handle: &SessionHandle, zeile: String) -> bool {
        let _sequenz = self.inner.sequenz.lock();
        Self::zustellen(handle, zeile)
    }

    /// Sucht den am staerksten gestauten Teilnehmer ausser `ausser`
    ///
    /// Die Verbindung von `ausser` liest keine neuen Zeilen, bis dieser
    /// Teilnehmer aufgeholt hat.
    pub fn stau_suchen(&self, ausser: SessionId) -> Option<SessionHandle> {
        self.inner
            .registry
            .snapshot()
            .into_iter()
            .filter(|handle| handle.id != ausser && handle.ist_gestaut())
            .max_by_key(SessionHandle::rueckstand)
    }

    /// Anzahl bisher verteilter Events
    pub fn verteilt(&self) -> u64 {
        *self.inner.sequenz.lock()
    }

    /// Abonniert alle verteilten Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<VerteiltesEvent> {
        self.inner.event_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn verteilen_gesperrt(
        &self,
        sequenz: &mut u64,
        event: ChatEvent,
        ursprung: Option<SessionId>,
    ) -> usize {
        *sequenz += 1;
        let zeile = format::event_zeile(&event);
        let ausgeschlossen = if event.ist_nachricht() { ursprung } else { None };

        let mut zugestellt = 0;
        for handle in self.inner.registry.snapshot() {
            if Some(handle.id) == ausgeschlossen {
                continue;
            }
            if Self::zustellen(&handle, zeile.clone()) {
                zugestellt += 1;
            }
        }

        tracing::trace!(sequenz = *sequenz, zugestellt, zeile = %zeile, "Event verteilt");
        let _ = self
            .inner
            .event_tx
            .send(VerteiltesEvent::neu(*sequenz, event));
        zugestellt
    }

    /// Zustellung mit Trennung bei Fehlschlag
    fn zustellen(handle: &SessionHandle, zeile: String) -> bool {
        if handle.senden(zeile) {
            true
        } else {
            handle.trennen();
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn session() -> (SessionHandle, SendeQueue) {
        SessionHandle::neu(SessionId::new(), QueueGrenzen::default())
    }

    fn begrenzt(drossel_ab: usize, maximum: usize) -> (SessionHandle, SendeQueue) {
        SessionHandle::neu(SessionId::new(), QueueGrenzen { drossel_ab, maximum })
    }

    fn alle_zeilen(rx: &mut SendeQueue) -> Vec<String> {
        let mut zeilen = Vec::new();
        while let Some(z) = rx.try_recv() {
            zeilen.push(z);
        }
        zeilen
    }

    #[test]
    fn beitritt_geht_an_alle_inklusive_neuer_session() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, mut rx_alice) = session();
        let (bob, mut rx_bob) = session();

        assert!(broadcaster.beitreten("alice", alice));
        assert!(broadcaster.beitreten("bob", bob));

        assert_eq!(
            alle_zeilen(&mut rx_alice),
            vec!["* alice has joined", "* bob has joined"]
        );
        assert_eq!(alle_zeilen(&mut rx_bob), vec!["* bob has joined"]);
    }

    #[test]
    fn beitritt_mit_vergebenem_namen_verteilt_nichts() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, mut rx_alice) = session();
        let (zweite, mut rx_zweite) = session();

        broadcaster.beitreten("alice", alice);
        alle_zeilen(&mut rx_alice);

        assert!(!broadcaster.beitreten("alice", zweite));
        assert!(alle_zeilen(&mut rx_alice).is_empty());
        assert!(alle_zeilen(&mut rx_zweite).is_empty());
        assert_eq!(broadcaster.verteilt(), 1);
    }

    #[test]
    fn nachricht_ohne_echo_an_absender() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, mut rx_alice) = session();
        let (bob, mut rx_bob) = session();
        let alice_id = alice.id;
        broadcaster.beitreten("alice", alice);
        broadcaster.beitreten("bob", bob);
        alle_zeilen(&mut rx_alice);
        alle_zeilen(&mut rx_bob);

        let zugestellt =
            broadcaster.verteilen(ChatEvent::message("alice", "hello"), Some(alice_id));

        assert_eq!(zugestellt, 1);
        assert_eq!(alle_zeilen(&mut rx_bob), vec!["alice: hello"]);
        assert!(alle_zeilen(&mut rx_alice).is_empty(), "Kein Echo an den Absender");
    }

    #[test]
    fn umbenennen_geht_an_alle() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, mut rx_alice) = session();
        let (bob, mut rx_bob) = session();
        broadcaster.beitreten("alice", alice);
        broadcaster.beitreten("bob", bob);
        alle_zeilen(&mut rx_alice);
        alle_zeilen(&mut rx_bob);

        assert!(broadcaster.umbenennen("alice", "alicia"));
        assert_eq!(alle_zeilen(&mut rx_alice), vec!["* alice is now known as alicia"]);
        assert_eq!(alle_zeilen(&mut rx_bob), vec!["* alice is now known as alicia"]);

        assert!(!broadcaster.umbenennen("bob", "alicia"));
        assert!(alle_zeilen(&mut rx_bob).is_empty());
    }

    #[test]
    fn verlassen_benachrichtigt_verbleibende() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, mut rx_alice) = session();
        let (bob, mut rx_bob) = session();
        let (carol, mut rx_carol) = session();
        broadcaster.beitreten("alice", alice);
        broadcaster.beitreten("bob", bob);
        broadcaster.beitreten("carol", carol);
        alle_zeilen(&mut rx_alice);
        alle_zeilen(&mut rx_bob);
        alle_zeilen(&mut rx_carol);

        assert!(broadcaster.verlassen("carol"));
        assert!(alle_zeilen(&mut rx_carol).is_empty());
        assert_eq!(alle_zeilen(&mut rx_bob), vec!["* carol has left"]);

        assert!(broadcaster.verlassen("bob"));
        assert_eq!(
            alle_zeilen(&mut rx_alice),
            vec!["* carol has left", "* bob has left", "* you are alone now"]
        );
        assert!(!broadcaster.verlassen("bob"), "Zweites Verlassen ist ein No-op");
    }

    #[test]
    fn langer_ansturm_trennt_niemanden() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (alice, _rx_alice) = session();
        let (bob, mut rx_bob) = session();
        let alice_id = alice.id;
        let bob_kontrolle = bob.clone();
        broadcaster.beitreten("alice", alice);
        broadcaster.beitreten("bob", bob);
        alle_zeilen(&mut rx_bob);

        for i in 0..1000 {
            broadcaster.verteilen(ChatEvent::message("alice", format!("m{i}")), Some(alice_id));
        }

        assert!(!bob_kontrolle.ist_getrennt());
        assert!(bob_kontrolle.ist_gestaut());
        assert_eq!(bob_kontrolle.rueckstand(), 1000);
        assert_eq!(
            broadcaster.stau_suchen(alice_id).map(|h| h.id),
            Some(bob_kontrolle.id)
        );

        let zeilen = alle_zeilen(&mut rx_bob);
        assert_eq!(zeilen.len(), 1000);
        assert_eq!(zeilen[999], "alice: m999");
        assert_eq!(bob_kontrolle.rueckstand(), 0);
        assert!(broadcaster.stau_suchen(alice_id).is_none());
    }

    #[test]
    fn maximaler_rueckstand_trennt_nur_den_empfaenger() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (langsam, _rx_langsam) = begrenzt(1, 2);
        let (schnell, mut rx_schnell) = session();
        let langsam_kontrolle = langsam.clone();
        let schnell_kontrolle = schnell.clone();

        broadcaster.beitreten("langsam", langsam);
        broadcaster.beitreten("schnell", schnell);
        assert!(!langsam_kontrolle.ist_getrennt());

        broadcaster.verteilen(ChatEvent::message("x", "y"), None);
        assert!(langsam_kontrolle.ist_getrennt());
        assert!(!schnell_kontrolle.ist_getrennt());
        assert_eq!(
            alle_zeilen(&mut rx_schnell),
            vec!["* schnell has joined", "x: y"]
        );
    }

    #[tokio::test]
    async fn abgebaut_wartet_auf_den_leser() {
        let (handle, mut rx) = begrenzt(4, 100);
        for i in 0..10 {
            assert!(handle.senden(i.to_string()));
        }
        assert!(handle.ist_gestaut());

        let wartend = tokio::spawn({
            let handle = handle.clone();
            async move { handle.abgebaut().await }
        });
        tokio::task::yield_now().await;
        assert!(!wartend.is_finished());

        // Niedrigwasser ist 2
        for _ in 0..8 {
            rx.recv().await.unwrap();
        }
        tokio::time::timeout(std::time::Duration::from_secs(2), wartend)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.rueckstand(), 2);
    }

    #[tokio::test]
    async fn abgebaut_endet_bei_trennung() {
        let (handle, _rx) = begrenzt(1, 100);
        handle.senden("a".into());
        handle.senden("b".into());
        handle.senden("c".into());

        let wartend = tokio::spawn({
            let handle = handle.clone();
            async move { handle.abgebaut().await }
        });
        handle.trennen();
        tokio::time::timeout(std::time::Duration::from_secs(2), wartend)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn geschlossene_queue_trennt_empfaenger() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (weg, rx_weg) = session();
        let kontrolle = weg.clone();
        drop(rx_weg);

        broadcaster.beitreten("weg", weg);
        assert!(kontrolle.ist_getrennt());
    }

    #[test]
    fn reihenfolge_ist_fuer_alle_empfaenger_gleich() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (a, mut rx_a) = session();
        let (b, mut rx_b) = session();
        broadcaster.beitreten("a", a);
        broadcaster.beitreten("b", b);

        let sender: Vec<_> = (0..4)
            .map(|t| {
                let broadcaster = broadcaster.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        broadcaster.verteilen(
                            ChatEvent::message(format!("t{t}"), i.to_string()),
                            None,
                        );
                    }
                })
            })
            .collect();
        for t in sender {
            t.join().unwrap();
        }

        let zeilen_a = alle_zeilen(&mut rx_a);
        let zeilen_b = alle_zeilen(&mut rx_b);
        // a hat zusaetzlich das Joined von b gesehen
        assert_eq!(zeilen_a[0], "* a has joined");
        assert_eq!(zeilen_a[1..], zeilen_b[..]);
        assert_eq!(zeilen_b.len(), 1 + 4 * 200);
    }

    #[tokio::test]
    async fn abonnenten_sehen_sequenz_in_ankunftsreihenfolge() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let mut events = broadcaster.events_abonnieren();
        let (alice, _rx) = session();

        broadcaster.beitreten("alice", alice);
        broadcaster.verteilen(ChatEvent::message("alice", "hi"), None);
        broadcaster.verlassen("alice");

        let e1 = events.recv().await.unwrap();
        let e2 = events.recv().await.unwrap();
        let e3 = events.recv().await.unwrap();
        assert_eq!((e1.sequenz, e2.sequenz, e3.sequenz), (1, 2, 3));
        assert_eq!(e1.event, ChatEvent::joined("alice"));
        assert_eq!(e3.event, ChatEvent::left("alice"));
    }

    #[test]
    fn an_session_senden() {
        let broadcaster = EventBroadcaster::neu(Registry::neu());
        let (h, mut rx) = session();
        assert!(broadcaster.an_session_senden(&h, "* [pm] bob: psst".into()));
        assert_eq!(alle_zeilen(&mut rx), vec!["* [pm] bob: psst"]);
    }
}
