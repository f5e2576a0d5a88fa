//! Registry – Wer ist aktiv, unter welchem Namen
//!
//! Prozessweite Tabelle aller aktiven Sessions, indiziert nach Anzeigename.
//! Einzige Quelle der Wahrheit fuer "wer ist verbunden".
//!
//! ## Synchronisation
//! Die gesamte Tabelle liegt hinter genau einem `parking_lot::Mutex`.
//! `reservieren`, `freigeben`, `umbenennen` und `snapshot` sind damit
//! gegeneinander linearisierbar: zwei gleichzeitige Reservierungen desselben
//! Namens koennen nicht beide gelingen, und ein Snapshot sieht nie eine halb
//! ausgefuehrte Umbenennung. Der Lock wird nur fuer die Tabellenoperation
//! gehalten, nie ueber I/O oder `.await`.
//!
//! ## Namensvergleich
//! Namen werden ohne Beachtung der Gross-/Kleinschreibung verglichen
//! (`Alice` kollidiert mit `alice`). Der Anzeigename behaelt die
//! Schreibweise, mit der er reserviert wurde.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::broadcast::SessionHandle;

/// Eintrag der Registry
///
/// Haelt nur einen nicht-besitzenden Handle: die Registry verwaltet die
/// Mitgliedschaft, nicht die Lebensdauer der Verbindung.
#[derive(Debug, Clone)]
struct Eintrag {
    anzeigename: String,
    handle: SessionHandle,
}

/// Namens-Registry aller aktiven Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Eintrag>>>,
}

/// Normalisierter Tabellenschluessel eines Anzeigenamens
fn schluessel(name: &str) -> String {
    name.to_lowercase()
}

impl Registry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Reserviert `name` fuer die Session hinter `handle`
    ///
    /// Atomares Test-and-Set: gibt `true` zurueck genau dann, wenn der Name
    /// frei war und der Eintrag angelegt wurde.
    pub fn reservieren(&self, name: &str, handle: SessionHandle) -> bool {
        let mut tabelle = self.inner.lock();
        match tabelle.entry(schluessel(name)) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(frei) => {
                frei.insert(Eintrag {
                    anzeigename: name.to_string(),
                    handle,
                });
                true
            }
        }
    }

    /// Gibt `name` frei
    ///
    /// Idempotent: gibt `true` zurueck wenn ein Eintrag entfernt wurde.
    pub fn freigeben(&self, name: &str) -> bool {
        self.inner.lock().remove(&schluessel(name)).is_some()
    }

    /// Benennt `alt` atomar in `neu` um
    ///
    /// Schlaegt ohne Seiteneffekt fehl, wenn `alt` nicht existiert oder `neu`
    /// bereits einer anderen Session gehoert. Eine reine Aenderung der
    /// Schreibweise (`alice` -> `Alice`) ist erlaubt.
    pub fn umbenennen(&self, alt: &str, neu: &str) -> bool {
        let alt_schluessel = schluessel(alt);
        let neu_schluessel = schluessel(neu);
        let mut tabelle = self.inner.lock();

        if alt_schluessel == neu_schluessel {
            return match tabelle.get_mut(&alt_schluessel) {
                Some(eintrag) => {
                    eintrag.anzeigename = neu.to_string();
                    true
                }
                None => false,
            };
        }

        if tabelle.contains_key(&neu_schluessel) {
            return false;
        }
        match tabelle.remove(&alt_schluessel) {
            Some(mut eintrag) => {
                eintrag.anzeigename = neu.to_string();
                tabelle.insert(neu_schluessel, eintrag);
                true
            }
            None => false,
        }
    }

    /// Handles aller aktiven Sessions (fuer den Broadcast-Fan-out)
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.inner
            .lock()
            .values()
            .map(|eintrag| eintrag.handle.clone())
            .collect()
    }

    /// Alphabetisch sortierte Anzeigenamen aller aktiven Sessions
    pub fn namen(&self) -> Vec<String> {
        let mut namen: Vec<String> = self
            .inner
            .lock()
            .values()
            .map(|eintrag| eintrag.anzeigename.clone())
            .collect();
        namen.sort_by_key(|name| schluessel(name));
        namen
    }

    /// Handle und Anzeigename der Session mit diesem Namen
    pub fn nachschlagen(&self, name: &str) -> Option<(String, SessionHandle)> {
        self.inner
            .lock()
            .get(&schluessel(name))
            .map(|eintrag| (eintrag.anzeigename.clone(), eintrag.handle.clone()))
    }

    /// Prueft ob ein Name vergeben ist
    pub fn enthaelt(&self, name: &str) -> bool {
        self.inner.lock().contains_key(&schluessel(name))
    }

    /// Anzahl aktiver Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use plauder_core::SessionId;
    use std::sync::Barrier;
    use std::thread;

    fn handle() -> SessionHandle {
        SessionHandle::neu(SessionId::new(), Default::default()).0
    }

    #[test]
    fn reservieren_und_freigeben() {
        let registry = Registry::neu();

        assert!(registry.reservieren("alice", handle()));
        assert!(registry.enthaelt("alice"));
        assert_eq!(registry.anzahl(), 1);

        assert!(registry.freigeben("alice"));
        assert!(!registry.enthaelt("alice"));
        assert!(!registry.freigeben("alice"), "Zweite Freigabe ist ein No-op");
    }

    #[test]
    fn doppelte_reservierung_schlaegt_fehl() {
        let registry = Registry::neu();
        assert!(registry.reservieren("alice", handle()));
        assert!(!registry.reservieren("alice", handle()));
        assert!(!registry.reservieren("ALICE", handle()), "Vergleich ohne Gross-/Kleinschreibung");
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn gleichzeitige_reservierungen_nur_eine_gewinnt() {
        let registry = Registry::neu();
        let threads = 16;
        let barriere = Arc::new(Barrier::new(threads));

        let ergebnisse: Vec<bool> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                let barriere = Arc::clone(&barriere);
                thread::spawn(move || {
                    barriere.wait();
                    registry.reservieren("umkaempft", handle())
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect();

        assert_eq!(ergebnisse.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn umbenennen_erfolgreich() {
        let registry = Registry::neu();
        let h = handle();
        let id = h.id;
        registry.reservieren("alice", h);

        assert!(registry.umbenennen("alice", "alicia"));
        assert!(!registry.enthaelt("alice"));
        let (name, handle) = registry.nachschlagen("alicia").unwrap();
        assert_eq!(name, "alicia");
        assert_eq!(handle.id, id, "Umbenennung behaelt die Session");
    }

    #[test]
    fn umbenennen_auf_vergebenen_namen_aendert_nichts() {
        let registry = Registry::neu();
        registry.reservieren("alice", handle());
        registry.reservieren("bob", handle());

        assert!(!registry.umbenennen("bob", "Alice"));
        assert_eq!(registry.namen(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn umbenennen_unbekannter_name() {
        let registry = Registry::neu();
        assert!(!registry.umbenennen("niemand", "jemand"));
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn umbenennen_nur_schreibweise() {
        let registry = Registry::neu();
        registry.reservieren("alice", handle());
        assert!(registry.umbenennen("alice", "Alice"));
        assert_eq!(registry.namen(), vec!["Alice".to_string()]);
    }

    #[test]
    fn snapshot_sieht_nie_halbe_umbenennung() {
        let registry = Registry::neu();
        registry.reservieren("a", handle());

        let umbenenner = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..2_000 {
                    assert!(registry.umbenennen("a", "b"));
                    assert!(registry.umbenennen("b", "a"));
                }
            })
        };

        for _ in 0..2_000 {
            assert_eq!(registry.snapshot().len(), 1);
            assert_eq!(registry.namen().len(), 1);
        }
        umbenenner.join().unwrap();
    }

    #[test]
    fn namen_sind_sortiert() {
        let registry = Registry::neu();
        registry.reservieren("charlie", handle());
        registry.reservieren("Bob", handle());
        registry.reservieren("alice", handle());
        assert_eq!(registry.namen(), vec!["alice", "Bob", "charlie"]);
    }

    #[test]
    fn clone_teilt_inneren_state() {
        let r1 = Registry::neu();
        let r2 = r1.clone();
        r1.reservieren("shared", handle());
        assert!(r2.enthaelt("shared"));
    }
}
