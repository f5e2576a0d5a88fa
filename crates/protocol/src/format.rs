//! Ausgabeformat – serialisiert Events und Hinweise in Protokollzeilen
//!
//! ```text
//! * <name> has joined
//! * <name> has left
//! * <alt> is now known as <neu>
//! <name>: <text>
//! ! <grund>
//! ```
//!
//! Zeilen werden ohne `\n` erzeugt; das Zeilenende setzt der `ZeilenCodec`.

use plauder_core::ChatEvent;
use std::net::IpAddr;

/// Praefix fuer Server-Hinweise und Event-Zeilen
pub const HINWEIS_PRAEFIX: &str = "* ";

/// Praefix fuer Ablehnungen (nur an den ausloesenden Client)
pub const ABLEHNUNGS_PRAEFIX: &str = "! ";

/// Serialisiert ein Event in seine Protokollzeile
pub fn event_zeile(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Joined { name } => format!("{HINWEIS_PRAEFIX}{name} has joined"),
        ChatEvent::Left { name } => format!("{HINWEIS_PRAEFIX}{name} has left"),
        ChatEvent::Renamed { alt, neu } => {
            format!("{HINWEIS_PRAEFIX}{alt} is now known as {neu}")
        }
        ChatEvent::Message { von, text } => format!("{von}: {text}"),
    }
}

/// Ablehnungszeile `! <grund>`
pub fn ablehnung(grund: &str) -> String {
    format!("{ABLEHNUNGS_PRAEFIX}{grund}")
}

/// Hinweiszeile `* <text>`
pub fn hinweis(text: &str) -> String {
    format!("{HINWEIS_PRAEFIX}{text}")
}

/// Zeile fuer den Empfaenger einer privaten Nachricht
pub fn privat_zeile(von: &str, text: &str) -> String {
    format!("{HINWEIS_PRAEFIX}[pm] {von}: {text}")
}

/// Antwort auf `/who`
pub fn teilnehmer_zeile(namen: &[String]) -> String {
    format!("{HINWEIS_PRAEFIX}online: {}", namen.join(", "))
}

/// Antwort auf `/ip`
pub fn adresse_zeile(adresse: IpAddr) -> String {
    format!("{HINWEIS_PRAEFIX}server address: {adresse}")
}

/// Antwort auf `/port`
pub fn port_zeile(port: u16) -> String {
    format!("{HINWEIS_PRAEFIX}server port: {port}")
}

/// Antwort auf `/help`
pub fn hilfe_zeile() -> String {
    hinweis(concat!(
        "commands: /nick <name>, /msg <name> <text>, /who, /whoami, /ip, /port, /help, /quit ",
        "(start a line with // to send text beginning with /)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_zeilen() {
        assert_eq!(event_zeile(&ChatEvent::joined("alice")), "* alice has joined");
        assert_eq!(event_zeile(&ChatEvent::left("alice")), "* alice has left");
        assert_eq!(
            event_zeile(&ChatEvent::renamed("alice", "alicia")),
            "* alice is now known as alicia"
        );
        assert_eq!(
            event_zeile(&ChatEvent::message("alice", "hello")),
            "alice: hello"
        );
    }

    #[test]
    fn ablehnung_und_hinweis() {
        assert_eq!(ablehnung("name taken"), "! name taken");
        assert_eq!(hinweis("you are alice"), "* you are alice");
        assert_eq!(privat_zeile("bob", "psst"), "* [pm] bob: psst");
    }

    #[test]
    fn server_adresse_und_port() {
        let adresse: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(adresse_zeile(adresse), "* server address: 127.0.0.1");
        assert_eq!(port_zeile(4000), "* server port: 4000");
    }

    #[test]
    fn teilnehmer_liste() {
        let namen = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(teilnehmer_zeile(&namen), "* online: alice, bob");
    }

    #[test]
    fn hilfe_nennt_alle_befehle() {
        let zeile = hilfe_zeile();
        for befehl in ["/nick", "/msg", "/who", "/whoami", "/ip", "/port", "/help", "/quit"] {
            assert!(zeile.contains(befehl), "{befehl} fehlt in der Hilfe");
        }
    }
}
