//! Warteschlangen-Eintraege und ihr Drahtformat
//!
//! Eintraege werden als eine Textzeile aus Schluessel-Wert-Paaren
//! marshalliert; dasselbe Format laeuft durch das Protokoll (`queue`,
//! `playing`, `recent`) und durch die Persistenzdatei.

use musikbox_core::{spalten, zitieren, EintragsId, SpaltOptionen};

use crate::fehler::QueueFehler;

/// Zustand eines Eintrags
///
/// `Started`/`Paused` kann hoechstens ein Eintrag gleichzeitig tragen;
/// `Ok`/`Scratched`/`Failed` sind final und fuehren in die Liste der
/// kuerzlich gespielten Titel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbspielStatus {
    /// Noch nicht gespielt
    Unplayed,
    /// Spielt gerade
    Started,
    /// Gestartet, aber pausiert
    Paused,
    /// Fehlerfrei zu Ende gespielt
    Ok,
    /// Abgewuergt
    Scratched,
    /// Abspielen fehlgeschlagen
    Failed,
    /// Unterbrochen weil der Server beendet wurde
    Quitting,
    /// Kein Dekoder fuer das Format gefunden
    NoPlayer,
    /// Eintrag ist selbst ein Scratch-Jingle (Altbestand)
    IsScratch,
}

impl AbspielStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Unplayed => "unplayed",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Ok => "ok",
            Self::Scratched => "scratched",
            Self::Failed => "failed",
            Self::Quitting => "quitting",
            Self::NoPlayer => "no_player",
            Self::IsScratch => "isscratch",
        }
    }

    pub fn parsen(s: &str) -> Option<Self> {
        match s {
            "unplayed" => Some(Self::Unplayed),
            "started" => Some(Self::Started),
            "paused" => Some(Self::Paused),
            "ok" => Some(Self::Ok),
            "scratched" => Some(Self::Scratched),
            "failed" => Some(Self::Failed),
            "quitting" => Some(Self::Quitting),
            "no_player" => Some(Self::NoPlayer),
            "isscratch" => Some(Self::IsScratch),
            _ => None,
        }
    }

    /// Final heisst: der Eintrag kehrt nie in die Warteschlange zurueck
    pub fn ist_final(&self) -> bool {
        matches!(
            self,
            Self::Ok | Self::Scratched | Self::Failed | Self::Quitting | Self::NoPlayer
        )
    }
}

/// Woher ein Eintrag stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Herkunft {
    /// Von einem Benutzer ausgesucht
    Picked,
    /// Vom Zufallswaehler nachgelegt
    Random,
    /// Scratch-Jingle
    Scratch,
    /// Zufallstitel, nachtraeglich von einem Benutzer adoptiert
    Adopted,
    /// Von einem geplanten Ereignis eingereiht
    Scheduled,
}

impl Herkunft {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Picked => "picked",
            Self::Random => "random",
            Self::Scratch => "scratch",
            Self::Adopted => "adopted",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn parsen(s: &str) -> Option<Self> {
        match s {
            "picked" => Some(Self::Picked),
            "random" => Some(Self::Random),
            "scratch" => Some(Self::Scratch),
            "adopted" => Some(Self::Adopted),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Ein Eintrag der Warteschlange
///
/// Der Dekoder-Kindprozess haengt nicht am Eintrag selbst; die
/// Abspiel-Pipeline fuehrt ihn unter der Eintrags-ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEintrag {
    /// Eindeutige ID (prozesslebenslang kollisionsfrei)
    pub id: EintragsId,
    /// Aufgeloester Titelpfad
    pub titel: String,
    /// Einreicher; `None` bei Zufallsherkunft
    pub absender: Option<String>,
    /// Einreichzeitpunkt (Unix-Sekunden)
    pub eingereiht_am: i64,
    /// Erwarteter Startzeitpunkt, sofern berechnet
    pub erwartet: Option<i64>,
    /// Tatsaechlicher Startzeitpunkt
    pub gespielt_am: Option<i64>,
    /// Aktueller Zustand
    pub status: AbspielStatus,
    /// Herkunft
    pub herkunft: Herkunft,
    /// Wer den Eintrag abgewuergt hat
    pub gekratzt_von: Option<String>,
    /// Exit-Status des Dekoders nach Abschluss
    pub exit_status: i64,
    /// Bisher gespielte Frames
    pub frames_bisher: u64,
    /// Letzter Pausenbeginn (Unix-Sekunden)
    pub zuletzt_pausiert: Option<i64>,
    /// Letzte Fortsetzung (Unix-Sekunden)
    pub zuletzt_fortgesetzt: Option<i64>,
    /// Gespielte Frames bis zur letzten Pause
    pub frames_bis_pause: u64,
    /// Dekoder laeuft bereits
    pub vorbereitet: bool,
}

impl QueueEintrag {
    pub fn neu(
        id: EintragsId,
        titel: String,
        absender: Option<String>,
        herkunft: Herkunft,
        eingereiht_am: i64,
    ) -> Self {
        Self {
            id,
            titel,
            absender,
            eingereiht_am,
            erwartet: None,
            gespielt_am: None,
            status: AbspielStatus::Unplayed,
            herkunft,
            gekratzt_von: None,
            exit_status: 0,
            frames_bisher: 0,
            zuletzt_pausiert: None,
            zuletzt_fortgesetzt: None,
            frames_bis_pause: 0,
            vorbereitet: false,
        }
    }

    /// Marshalliert den Eintrag als eine Textzeile
    pub fn marshallieren(&self) -> String {
        let mut teile: Vec<String> = Vec::with_capacity(16);
        let mut feld = |k: &str, v: &str| {
            teile.push(k.to_string());
            teile.push(zitieren(v));
        };
        feld("track", &self.titel);
        if let Some(absender) = &self.absender {
            feld("submitter", absender);
        }
        feld("when", &self.eingereiht_am.to_string());
        if let Some(erwartet) = self.erwartet {
            feld("expected", &erwartet.to_string());
        }
        if let Some(gespielt) = self.gespielt_am {
            feld("played", &gespielt.to_string());
        }
        feld("state", self.status.als_str());
        feld("origin", self.herkunft.als_str());
        if let Some(wer) = &self.gekratzt_von {
            feld("scratched", wer);
        }
        feld("wstat", &self.exit_status.to_string());
        feld("sofar", &self.frames_bisher.to_string());
        feld("id", self.id.as_str());
        teile.join(" ")
    }

    /// Stellt einen Eintrag aus einer marshallierten Zeile wieder her
    pub fn entmarshallieren(zeile: &str) -> Result<Self, QueueFehler> {
        let tokens = spalten(zeile, SpaltOptionen::protokoll())
            .map_err(|e| QueueFehler::Marshalling(e.to_string()))?;
        if tokens.len() % 2 != 0 {
            return Err(QueueFehler::Marshalling(
                "ungerade Token-Anzahl".to_string(),
            ));
        }

        let mut eintrag = QueueEintrag::neu(
            EintragsId::aus_string(""),
            String::new(),
            None,
            Herkunft::Picked,
            0,
        );
        let mut id_gesehen = false;
        let mut titel_gesehen = false;

        for paar in tokens.chunks(2) {
            let (schluessel, wert) = (paar[0].as_str(), paar[1].as_str());
            match schluessel {
                "track" => {
                    eintrag.titel = wert.to_string();
                    titel_gesehen = true;
                }
                "submitter" => eintrag.absender = Some(wert.to_string()),
                "when" => eintrag.eingereiht_am = zahl(schluessel, wert)?,
                "expected" => eintrag.erwartet = Some(zahl(schluessel, wert)?),
                "played" => eintrag.gespielt_am = Some(zahl(schluessel, wert)?),
                "state" => {
                    eintrag.status = AbspielStatus::parsen(wert).ok_or_else(|| {
                        QueueFehler::Marshalling(format!("unbekannter Zustand '{wert}'"))
                    })?;
                }
                "origin" => {
                    eintrag.herkunft = Herkunft::parsen(wert).ok_or_else(|| {
                        QueueFehler::Marshalling(format!("unbekannte Herkunft '{wert}'"))
                    })?;
                }
                "scratched" => eintrag.gekratzt_von = Some(wert.to_string()),
                "wstat" => eintrag.exit_status = zahl(schluessel, wert)?,
                "sofar" => eintrag.frames_bisher = zahl(schluessel, wert)? as u64,
                "id" => {
                    eintrag.id = EintragsId::aus_string(wert);
                    id_gesehen = true;
                }
                // Unbekannte Schluessel ueberlesen (Vorwaertskompatibilitaet)
                _ => {}
            }
        }

        if !id_gesehen || !titel_gesehen {
            return Err(QueueFehler::Marshalling("id oder track fehlt".to_string()));
        }
        Ok(eintrag)
    }
}

fn zahl(schluessel: &str, wert: &str) -> Result<i64, QueueFehler> {
    wert.parse::<i64>()
        .map_err(|_| QueueFehler::Marshalling(format!("'{wert}' ist keine Zahl ({schluessel})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beispiel() -> QueueEintrag {
        let mut e = QueueEintrag::neu(
            EintragsId::aus_string("abc_7"),
            "tracks/abba/arrival/dancing-queen.ogg".into(),
            Some("alice".into()),
            Herkunft::Picked,
            1_700_000_000,
        );
        e.status = AbspielStatus::Started;
        e.gespielt_am = Some(1_700_000_100);
        e.frames_bisher = 44_100;
        e
    }

    #[test]
    fn marshalling_roundtrip() {
        let original = beispiel();
        let zeile = original.marshallieren();
        let zurueck = QueueEintrag::entmarshallieren(&zeile).expect("muss parsen");
        assert_eq!(zurueck.id, original.id);
        assert_eq!(zurueck.titel, original.titel);
        assert_eq!(zurueck.absender, original.absender);
        assert_eq!(zurueck.status, original.status);
        assert_eq!(zurueck.herkunft, original.herkunft);
        assert_eq!(zurueck.frames_bisher, original.frames_bisher);
    }

    #[test]
    fn titel_mit_blank_wird_gequotet() {
        let mut e = beispiel();
        e.titel = "tracks/various/der gute titel.ogg".into();
        let zeile = e.marshallieren();
        let zurueck = QueueEintrag::entmarshallieren(&zeile).unwrap();
        assert_eq!(zurueck.titel, e.titel);
    }

    #[test]
    fn zufallseintrag_ohne_absender() {
        let e = QueueEintrag::neu(
            EintragsId::aus_string("x_1"),
            "tracks/a.ogg".into(),
            None,
            Herkunft::Random,
            0,
        );
        let zeile = e.marshallieren();
        assert!(!zeile.contains("submitter"));
        let zurueck = QueueEintrag::entmarshallieren(&zeile).unwrap();
        assert_eq!(zurueck.absender, None);
        assert_eq!(zurueck.herkunft, Herkunft::Random);
    }

    #[test]
    fn kaputte_zeile_ist_fehler() {
        assert!(QueueEintrag::entmarshallieren("track").is_err());
        assert!(QueueEintrag::entmarshallieren("state started").is_err());
        assert!(QueueEintrag::entmarshallieren("id x track t state komisch").is_err());
    }

    #[test]
    fn finale_zustaende() {
        for s in [
            AbspielStatus::Ok,
            AbspielStatus::Scratched,
            AbspielStatus::Failed,
            AbspielStatus::Quitting,
            AbspielStatus::NoPlayer,
        ] {
            assert!(s.ist_final());
        }
        for s in [
            AbspielStatus::Unplayed,
            AbspielStatus::Started,
            AbspielStatus::Paused,
        ] {
            assert!(!s.ist_final());
        }
    }
}
