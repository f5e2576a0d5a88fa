//! Wire-Format fuer TCP-Verbindungen
//!
//! Zeilenbasiertes Protokoll: UTF-8-Text, jede Zeile mit `\n` abgeschlossen.
//! Ein optionales `\r` vor dem Zeilenende wird entfernt.
//!
//! ## Ueberlange Zeilen
//!
//! Zeilen ueber `max_laenge` Bytes beenden die Verbindung nicht. Der Codec
//! verwirft sie bis zum naechsten Zeilenende und liefert stattdessen
//! `Eingang::ZuLang`, damit die Session dem Client einen Fehler senden kann.
//! Ebenso wird ungueltiges UTF-8 als `Eingang::Ungueltig` gemeldet.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge in Bytes (ohne Zeilenende)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 4096;

// ---------------------------------------------------------------------------
// Eingang
// ---------------------------------------------------------------------------

/// Ergebnis des Dekodierens einer eingehenden Zeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingang {
    /// Vollstaendige, gueltige Zeile ohne Zeilenende
    Zeile(String),
    /// Zeile ueberschritt das Limit und wurde verworfen
    ZuLang { laenge: usize },
    /// Zeile war kein gueltiges UTF-8 und wurde verworfen
    Ungueltig,
}

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer das zeilenbasierte Chat-Protokoll
///
/// Implementiert `Decoder` (liefert `Eingang`) und `Encoder<String>`
/// (haengt `\n` an) fuer `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes
    max_laenge: usize,
    /// Ab diesem Index im Buffer wurde bereits nach `\n` gesucht
    suche_ab: usize,
    /// True solange der Rest einer ueberlangen Zeile verworfen wird
    verwerfen: bool,
    /// Bisher verworfene Bytes der aktuellen ueberlangen Zeile
    verworfen: usize,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_laenge(DEFAULT_MAX_ZEILEN_LAENGE)
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_laenge(max_laenge: usize) -> Self {
        Self {
            max_laenge,
            suche_ab: 0,
            verwerfen: false,
            verworfen: 0,
        }
    }

    /// Gibt die konfigurierte maximale Zeilenlaenge zurueck
    pub fn max_laenge(&self) -> usize {
        self.max_laenge
    }

    fn zeile_auswerten(&self, bytes: &[u8]) -> Eingang {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        if bytes.len() > self.max_laenge {
            return Eingang::ZuLang {
                laenge: bytes.len(),
            };
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Eingang::Zeile(s.to_string()),
            Err(_) => Eingang::Ungueltig,
        }
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ZeilenCodec {
    type Item = Eingang;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.verwerfen {
            return match src.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let laenge = self.verworfen + pos;
                    src.advance(pos + 1);
                    self.verwerfen = false;
                    self.verworfen = 0;
                    tracing::debug!(laenge, "Ueberlange Zeile verworfen");
                    Ok(Some(Eingang::ZuLang { laenge }))
                }
                None => {
                    self.verworfen += src.len();
                    src.clear();
                    Ok(None)
                }
            };
        }

        let offset = self.suche_ab.min(src.len());
        match src[offset..].iter().position(|b| *b == b'\n') {
            Some(rel) => {
                let pos = offset + rel;
                self.suche_ab = 0;
                let zeile = src.split_to(pos + 1);
                Ok(Some(self.zeile_auswerten(&zeile[..pos])))
            }
            None => {
                // +1 fuer ein moegliches `\r` direkt vor dem noch fehlenden `\n`
                if src.len() > self.max_laenge + 1 {
                    self.verwerfen = true;
                    self.verworfen = src.len();
                    self.suche_ab = 0;
                    src.clear();
                } else {
                    self.suche_ab = src.len();
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(eingang) = self.decode(src)? {
            return Ok(Some(eingang));
        }

        // Letzte Zeile ohne abschliessendes `\n`
        if self.verwerfen {
            let laenge = self.verworfen;
            self.verwerfen = false;
            self.verworfen = 0;
            return Ok(Some(Eingang::ZuLang { laenge }));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.suche_ab = 0;
        let rest = src.split_to(src.len());
        Ok(Some(self.zeile_auswerten(&rest)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<String> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Ausgehende Zeile enthaelt einen Zeilenumbruch",
            ));
        }

        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn zeile(s: &str) -> Option<Eingang> {
        Some(Eingang::Zeile(s.to_string()))
    }

    #[test]
    fn einzelne_zeile_dekodieren() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from("hallo welt\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("hallo welt"));
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_wird_entfernt() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from("/nick alice\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("/nick alice"));
    }

    #[test]
    fn unvollstaendige_zeile_wartet() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from("hal");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"lo\nrest");
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("hallo"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"rest");
    }

    #[test]
    fn mehrere_zeilen_im_buffer() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from("eins\nzwei\n\ndrei\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("eins"));
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("zwei"));
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile(""));
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("drei"));
        assert!(buf.is_empty());
    }

    #[test]
    fn ueberlange_vollstaendige_zeile() {
        let mut codec = ZeilenCodec::with_max_laenge(8);
        let mut buf = BytesMut::from("0123456789\nok\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Eingang::ZuLang { laenge: 10 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("ok"));
    }

    #[test]
    fn ueberlange_zeile_ueber_mehrere_reads() {
        let mut codec = ZeilenCodec::with_max_laenge(4);
        let mut buf = BytesMut::from("abcdefgh");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty(), "Verworfene Bytes duerfen nicht gepuffert bleiben");

        buf.extend_from_slice(b"ijk\nnach\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Eingang::ZuLang { laenge: 11 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("nach"));
    }

    #[test]
    fn zeile_genau_am_limit_ist_gueltig() {
        let mut codec = ZeilenCodec::with_max_laenge(4);
        let mut buf = BytesMut::from("abcd\r");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("abcd"));
    }

    #[test]
    fn ungueltiges_utf8() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from(&b"\xff\xfe\nok\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Eingang::Ungueltig));
        assert_eq!(codec.decode(&mut buf).unwrap(), zeile("ok"));
    }

    #[test]
    fn letzte_zeile_ohne_newline_bei_eof() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from("tschuess");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), zeile("tschuess"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_haengt_newline_an() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("* alice has joined".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"* alice has joined\n");
    }

    #[test]
    fn encode_lehnt_zeilenumbruch_ab() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.encode("a\nb".to_string(), &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn default_max_laenge() {
        assert_eq!(ZeilenCodec::new().max_laenge(), DEFAULT_MAX_ZEILEN_LAENGE);
    }
}
